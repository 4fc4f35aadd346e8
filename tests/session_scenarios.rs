//! End-to-end scenarios through the public API: classifier, interceptor,
//! registry, scanner and session working together.

use std::sync::{Arc, Mutex};

use streamwatch::{
    intercept, Classifier, DiscoverySource, DomScanner, Fetch, HostPrimitive, HtmlPage,
    InstallOutcome, Intercepted, ManualTimer, MonitoringSession, PageContext, RejectReason,
    RuleClass, RuleSet, StreamKind, StreamMonitor, StreamRegistry, XhrOpen, XhrOpenArgs,
};
use url::Url;

/// Fetch double: succeeds for `https` URLs, fails for anything else.
#[derive(Default)]
struct PageFetch {
    requests: Mutex<Vec<String>>,
}

impl HostPrimitive for PageFetch {}

impl Fetch for PageFetch {
    type Request = String;
    type Output = Result<String, String>;

    fn call(&self, request: String) -> Self::Output {
        self.requests.lock().unwrap().push(request.clone());
        if request.starts_with("https://") {
            Ok(format!("body of {request}"))
        } else {
            Err(format!("refused {request}"))
        }
    }
}

#[derive(Default)]
struct PageXhr {
    opened: Mutex<Vec<XhrOpenArgs>>,
}

impl HostPrimitive for PageXhr {}

impl XhrOpen for PageXhr {
    type Output = ();

    fn open(&self, args: XhrOpenArgs) {
        self.opened.lock().unwrap().push(args);
    }
}

fn installed_session(max_streams: usize) -> (MonitoringSession, Intercepted<PageFetch>) {
    let session = MonitoringSession::with_capacity(max_streams);
    let mut fetch = Intercepted::passthrough(PageFetch::default());
    assert_eq!(session.install_fetch(&mut fetch), InstallOutcome::Installed);
    session.start();
    (session, fetch)
}

// ─── Classifier ──────────────────────────────────────────────────────────────

#[test]
fn master_playlist_is_m3u8() {
    let classifier = Classifier::new();
    assert_eq!(
        classifier.classify("https://cdn.example.com/live/master.m3u8?token=abc"),
        Some(StreamKind::M3u8)
    );
}

#[test]
fn segment_file_is_denied() {
    let classifier = Classifier::new();
    assert_eq!(classifier.classify("https://cdn.example.com/segments/seg-004.ts"), None);
}

#[test]
fn deny_wins_over_every_allow_class() {
    let classifier = Classifier::new();
    for url in [
        "https://cdn.test/hls/segment-12.m3u8",
        "https://cdn.test/live/subtitle/en.m3u8",
        "https://cdn.test/video/chunk_7.mp4",
        "blob:https://site.test/5e1c",
    ] {
        assert_eq!(classifier.classify(url), None, "{url} should be denied");
    }
}

#[test]
fn classification_is_deterministic() {
    let classifier = Classifier::new();
    let urls = [
        "https://a.test/x.m3u8",
        "https://a.test/hls/stream",
        "https://a.test/x.mp4?dl=1",
        "https://a.test/x.mpd",
        "not a url",
    ];
    let first: Vec<_> = urls.iter().map(|u| classifier.classify(u)).collect();
    let second: Vec<_> = urls.iter().map(|u| classifier.classify(u)).collect();
    assert_eq!(first, second);
}

#[test]
fn canonical_and_console_tables_are_reported_not_merged() {
    let canonical = RuleSet::canonical();
    let report = canonical.divergences(&RuleSet::console_variant());
    assert!(!report.is_empty());
    assert!(canonical.class_rules(RuleClass::Blocked).count() > 0);
    assert!(canonical.rules().iter().all(|rule| rule.name() != "keyword:live"));
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[test]
fn repeated_url_is_stored_once_with_first_timestamp() {
    let mut registry = StreamRegistry::default();
    let first = registry.insert("https://a/video.mp4", StreamKind::Video);
    let discovered_at = first.record().unwrap().discovered_at;

    for _ in 0..5 {
        let again = registry.insert("https://a/video.mp4", StreamKind::Video);
        assert_eq!(again.reason(), Some(RejectReason::Duplicate));
    }

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("https://a/video.mp4").unwrap().discovered_at, discovered_at);
}

#[test]
fn third_distinct_url_hits_capacity() {
    let mut registry = StreamRegistry::new(2);
    registry.insert("https://a/1.mp4", StreamKind::Video);
    registry.insert("https://a/2.m3u8", StreamKind::M3u8);
    let before: Vec<_> = registry.list().cloned().collect();

    let third = registry.insert("https://a/3.mpd", StreamKind::Dash);

    assert_eq!(third.reason(), Some(RejectReason::Capacity));
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.list().cloned().collect::<Vec<_>>(), before);
}

// ─── Interceptor ─────────────────────────────────────────────────────────────

#[test]
fn intercepted_fetch_is_transparent() {
    let (session, fetch) = installed_session(10);

    let ok = fetch.call("https://cdn.test/live/master.m3u8".to_string());
    let err = fetch.call("ftp://cdn.test/clip.mp4".to_string());

    assert_eq!(ok, Ok("body of https://cdn.test/live/master.m3u8".to_string()));
    assert_eq!(err, Err("refused ftp://cdn.test/clip.mp4".to_string()));
    assert_eq!(
        *fetch.inner().requests.lock().unwrap(),
        vec!["https://cdn.test/live/master.m3u8", "ftp://cdn.test/clip.mp4"]
    );
    // The failing call was still observed
    assert_eq!(session.len(), 2);
}

#[test]
fn xhr_open_keeps_all_arguments() {
    let session = MonitoringSession::new();
    session.start();
    let mut xhr = Intercepted::passthrough(PageXhr::default());
    session.install_xhr(&mut xhr);

    let args = XhrOpenArgs::new("POST", "https://api.test/hls/token")
        .with_async(true)
        .with_credentials("u", "p");
    xhr.open(args.clone());

    assert_eq!(*xhr.inner().opened.lock().unwrap(), vec![args]);
    assert_eq!(session.list()[0].source, DiscoverySource::Xhr);
}

#[test]
fn stop_then_start_scenario() {
    let (session, fetch) = installed_session(10);

    session.stop();
    let _ = fetch.call("https://cdn.test/live/master.m3u8".to_string());
    assert_eq!(session.len(), 0);
    assert!(fetch.is_installed());

    session.start();
    let _ = fetch.call("https://cdn.test/live/master.m3u8".to_string());
    assert_eq!(session.len(), 1);
}

#[test]
fn wrapping_twice_never_double_observes() {
    let seen = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&seen);
    let once = intercept(
        PageFetch::default(),
        Arc::new(move |_: &str, _| *counter.lock().unwrap() += 1),
    );
    let twice = intercept(once, Arc::new(|_: &str, _| panic!("second observer ran")));

    let _ = twice.call("https://a.test/x.mp4".to_string());
    assert_eq!(*seen.lock().unwrap(), 1);
}

// ─── Scanner and monitor ─────────────────────────────────────────────────────

#[test]
fn scanner_and_interceptor_share_one_catalog() {
    let (session, fetch) = installed_session(10);
    let _ = fetch.call("https://cdn.test/live/master.m3u8".to_string());

    let page = HtmlPage::parse(
        r#"<video src="https://cdn.test/live/master.m3u8"></video>
           <div data-url="https://cdn.test/clip.webm"></div>"#,
        Url::parse("https://site.test/").ok(),
    );
    let summary = DomScanner::new(session.clone()).full_sweep(&page);

    assert_eq!(summary.inserted, 1);
    let sources: Vec<_> = session.list().iter().map(|r| r.source).collect();
    assert_eq!(sources, vec![DiscoverySource::Fetch, DiscoverySource::Sweep]);
}

#[test]
fn incremental_fragment_scan() {
    let (session, _) = installed_session(10);
    let fragment = HtmlPage::parse_fragment(
        r#"<div class="player"><video><source src="/v/a.mp4"></video></div>"#,
        Url::parse("https://site.test/").ok(),
    );

    let summary = DomScanner::new(session.clone()).on_insertion(&fragment.root());

    assert_eq!(summary.inserted, 1);
    assert_eq!(session.list()[0].url, "https://site.test/v/a.mp4");
}

#[test]
fn monitor_lifecycle_with_host_timer() {
    let timer = ManualTimer::new();
    let snapshot = streamwatch::HtmlSnapshot::new();
    snapshot.update(r#"<a href="https://cdn.test/a.m3u8">a</a>"#, None);
    let monitor = StreamMonitor::new(
        MonitoringSession::new(),
        timer.clone(),
        Arc::new(snapshot.clone()),
        std::time::Duration::from_secs(3),
    );

    let added = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&added);
    monitor.subscribe(move |record| sink.lock().unwrap().push(record.url.clone()));

    monitor.start();
    snapshot.update(r#"<a href="https://cdn.test/b.mp4">b</a>"#, None);
    timer.tick();
    monitor.stop();

    snapshot.update(r#"<a href="https://cdn.test/c.mp4">c</a>"#, None);
    assert_eq!(timer.tick(), 0);

    assert_eq!(
        *added.lock().unwrap(),
        vec!["https://cdn.test/a.m3u8", "https://cdn.test/b.mp4"]
    );
    assert_eq!(monitor.list().len(), 2);
}

#[test]
fn page_context_keeps_first_session() {
    let page = PageContext::new();
    let first = page.init(MonitoringSession::new).clone();
    first.start();
    let again = page.init(|| MonitoringSession::with_capacity(1));
    assert!(again.is_active());
    assert_eq!(again.stats().max_streams, 100);
}
