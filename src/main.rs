//! `streamwatch` CLI - classify URLs and find streams in web pages

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::warn;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use url::Url;

use streamwatch::{
    Classifier, Document, DomScanner, HtmlPage, HtmlSnapshot, MonitoringSession, PageClient,
    RuleSet, StreamMonitor, StreamRecord, TokioTimer, Verdict, WatchConfig,
};

#[derive(Parser)]
#[command(name = "streamwatch")]
#[command(about = "Discover and classify streaming media URLs")]
#[command(version)]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one or more URLs
    Classify {
        /// URLs to classify
        #[arg(required = true)]
        urls: Vec<String>,

        /// Show which rule decided
        #[arg(short, long)]
        explain: bool,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan a page (URL or local HTML file) for streams
    Scan {
        /// Page URL to fetch
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        url: Option<String>,

        /// Local HTML file instead of a URL
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Base URL for relative links in --file
        #[arg(short, long)]
        base: Option<String>,

        /// Registry capacity (overrides config)
        #[arg(long)]
        max_streams: Option<usize>,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-fetch and sweep a page periodically, printing new streams
    Watch {
        /// Page URL to watch
        url: String,

        /// Sweep interval in milliseconds (overrides config)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },

    /// List the built-in classification rules
    Rules {
        /// Compare against the older console-script rule table
        #[arg(long)]
        diff: bool,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Classify { urls, explain, json } => {
            cmd_classify(&urls, explain, json)?;
        }
        Commands::Scan {
            url,
            file,
            base,
            max_streams,
            json,
        } => {
            cmd_scan(url.as_deref(), file, base.as_deref(), max_streams, json).await?;
        }
        Commands::Watch {
            url,
            interval_ms,
            duration_secs,
        } => {
            cmd_watch(&url, interval_ms, duration_secs).await?;
        }
        Commands::Rules { diff, json } => {
            cmd_rules(diff, json)?;
        }
    }

    Ok(())
}

fn load_config(max_streams: Option<usize>, interval_ms: Option<u64>) -> Result<WatchConfig> {
    let mut config = WatchConfig::load().context("failed to load configuration")?;
    if let Some(max_streams) = max_streams {
        config.max_streams = max_streams;
    }
    if let Some(interval_ms) = interval_ms {
        config.scan_interval_ms = interval_ms;
    }
    config.validate().context("invalid option")?;
    Ok(config)
}

fn verdict_label(verdict: &Verdict<'_>) -> &'static str {
    match verdict {
        Verdict::Matched { kind, .. } => kind.as_str(),
        Verdict::Blocked { .. } => "blocked",
        Verdict::Unmatched => "none",
        Verdict::Malformed => "malformed",
    }
}

fn cmd_classify(urls: &[String], explain: bool, json: bool) -> Result<()> {
    let config = load_config(None, None)?;
    let classifier = Classifier::with_rules(Arc::new(config.rule_set()?));

    if json {
        let results: Vec<_> = urls
            .iter()
            .map(|url| {
                let verdict = classifier.explain(url);
                json!({
                    "url": url,
                    "type": verdict.kind(),
                    "verdict": verdict_label(&verdict),
                    "rule": verdict.rule(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for url in urls {
        let verdict = classifier.explain(url);
        let label = verdict_label(&verdict);
        match verdict.rule() {
            Some(rule) if explain => println!("{label}\t{url}\t[{rule}]"),
            _ => println!("{label}\t{url}"),
        }
    }
    Ok(())
}

async fn cmd_scan(
    url: Option<&str>,
    file: Option<PathBuf>,
    base: Option<&str>,
    max_streams: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(max_streams, None)?;
    let session = MonitoringSession::from_config(&config)?;
    session.start();

    let (source, page) = match (url, file) {
        (_, Some(path)) => {
            let html = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let base = base
                .map(Url::parse)
                .transpose()
                .context("invalid --base URL")?;
            (path.display().to_string(), HtmlPage::parse(&html, base))
        }
        (Some(url), None) => {
            let url = Url::parse(url).with_context(|| format!("invalid URL: {url}"))?;
            let mut client = PageClient::new()?;
            client.install(&session);
            let fetched = client
                .fetch_page(&url)
                .await
                .with_context(|| format!("failed to fetch {url}"))?;
            (fetched.url.to_string(), HtmlPage::parse(&fetched.body, Some(fetched.url)))
        }
        (None, None) => bail!("either a URL or --file is required"),
    };

    let summary = DomScanner::new(session.clone()).full_sweep(&page);
    let streams = session.list();

    if json {
        let report = json!({
            "source": source,
            "base": page.base_url().map(Url::as_str),
            "summary": summary,
            "stats": session.stats(),
            "streams": streams,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("🔍 Scanned: {source}");
    println!(
        "   {} candidates, {} streams, {} errors\n",
        summary.candidates,
        streams.len(),
        summary.errors
    );
    for record in &streams {
        print_record(record);
    }
    Ok(())
}

async fn cmd_watch(url: &str, interval_ms: Option<u64>, duration_secs: Option<u64>) -> Result<()> {
    let config = load_config(None, interval_ms)?;
    let interval = Duration::from_millis(config.scan_interval_ms);
    let url = Url::parse(url).with_context(|| format!("invalid URL: {url}"))?;

    let session = MonitoringSession::from_config(&config)?;
    let mut client = PageClient::new()?;
    client.install(&session);

    let snapshot = HtmlSnapshot::new();
    let monitor = StreamMonitor::new(
        session,
        TokioTimer::new(tokio::runtime::Handle::current()),
        Arc::new(snapshot.clone()),
        interval,
    );
    monitor.subscribe(print_record);

    println!("👀 Watching {url} every {}ms (Ctrl-C to stop)\n", interval.as_millis());
    refresh(&client, &url, &snapshot).await;
    monitor.start();

    let deadline = duration_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        let until_deadline = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = ticker.tick() => refresh(&client, &url, &snapshot).await,
            _ = until_deadline => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    monitor.stop();
    let stats = monitor.stats();
    println!(
        "\n📊 {} streams ({} observed, {} duplicates, {} over capacity)",
        stats.streams, stats.observed, stats.duplicates, stats.capacity_rejections
    );
    Ok(())
}

async fn refresh(client: &PageClient, url: &Url, snapshot: &HtmlSnapshot) {
    match client.fetch_page(url).await {
        Ok(page) => snapshot.update(page.body, Some(page.url)),
        Err(e) => warn!("Refresh failed: {e}"),
    }
}

fn cmd_rules(diff: bool, json: bool) -> Result<()> {
    let canonical = RuleSet::canonical();

    if diff {
        let report = canonical.divergences(&RuleSet::console_variant());
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("📋 {} differences from the console rule table:\n", report.len());
            for divergence in &report {
                println!("   {divergence}");
            }
        }
        return Ok(());
    }

    if json {
        let rules: Vec<_> = canonical
            .rules()
            .iter()
            .map(|rule| {
                json!({
                    "name": rule.name(),
                    "class": rule.class(),
                    "type": rule.kind(),
                    "pattern": rule.pattern(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    for rule in canonical.rules() {
        let kind = rule.kind().map_or("-", |kind| kind.as_str());
        println!(
            "{:<8} {:<6} {:<24} {}",
            rule.class().as_str(),
            kind,
            rule.name(),
            rule.pattern()
        );
    }
    Ok(())
}

fn print_record(record: &StreamRecord) {
    println!("🎬 [{}] {}", record.kind, record.title);
    println!("   {}", record.url);
}
