//! Benchmarks for URL classification and full-document sweeps.
//!
//! Measures rule evaluation across the deny and allow classes, and the
//! cost of sweeping a parsed page.
//!
//! Run with: `cargo bench --bench classify_bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use streamwatch::{Classifier, DomScanner, HtmlPage, MonitoringSession};
use url::Url;

// ---------------------------------------------------------------------------
// URL datasets
// ---------------------------------------------------------------------------

/// URLs accepted by an allow class.
const STREAM_URLS: &[&str] = &[
    "https://cdn.example.com/live/master.m3u8?token=abc",
    "https://cdn.example.com/hls/channel1/index",
    "https://media.example.com/vod/movie_1080p.mp4",
    "https://media.example.com/dash/manifest.mpd",
];

/// URLs rejected by a deny rule.
const DENIED_URLS: &[&str] = &[
    "https://cdn.example.com/segments/seg-004.ts",
    "https://cdn.example.com/live/subtitle/en.vtt",
    "https://static.example.com/app.js?v=3",
    "https://static.example.com/logo.png",
];

/// URLs no rule matches; every class is evaluated.
const UNMATCHED_URLS: &[&str] = &[
    "https://www.example.com/",
    "https://api.example.com/v1/users?page=2",
    "https://www.example.com/blog/2024/05/some-long-article-title",
];

fn page_html() -> String {
    let mut html = String::from("<html><body>");
    for i in 0..200 {
        html.push_str(&format!(
            r#"<div class="card"><a href="/watch/{i}">item {i}</a><img src="/thumb/{i}.jpg"></div>"#
        ));
    }
    html.push_str(r#"<video src="/live/master.m3u8"></video>"#);
    html.push_str(r#"<div class="video-player" data-hls="https://cdn.example.com/hls/x"></div>"#);
    html.push_str("</body></html>");
    html
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_classify(c: &mut Criterion) {
    let classifier = Classifier::new();
    let mut group = c.benchmark_group("classify");

    group.bench_function("stream", |b| {
        b.iter(|| {
            for url in STREAM_URLS {
                black_box(classifier.classify(black_box(url)));
            }
        });
    });

    group.bench_function("denied", |b| {
        b.iter(|| {
            for url in DENIED_URLS {
                black_box(classifier.classify(black_box(url)));
            }
        });
    });

    group.bench_function("unmatched", |b| {
        b.iter(|| {
            for url in UNMATCHED_URLS {
                black_box(classifier.classify(black_box(url)));
            }
        });
    });

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let html = page_html();
    let base = Url::parse("https://www.example.com/").ok();
    let page = HtmlPage::parse(&html, base.clone());

    c.bench_function("sweep/parse_and_scan", |b| {
        b.iter(|| {
            let session = MonitoringSession::new();
            session.start();
            let page = HtmlPage::parse(black_box(&html), base.clone());
            black_box(DomScanner::new(session).full_sweep(&page));
        });
    });

    c.bench_function("sweep/scan_only", |b| {
        b.iter(|| {
            let session = MonitoringSession::new();
            session.start();
            black_box(DomScanner::new(session).full_sweep(&page));
        });
    });
}

criterion_group!(benches, bench_classify, bench_sweep);
criterion_main!(benches);
