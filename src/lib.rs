//! `streamwatch` - streaming-media detection engine
//!
//! Observes a page's outbound requests and DOM to discover streaming
//! resources (HLS playlists, DASH manifests, progressive media files),
//! classifies them with ordered pattern rules, and keeps a de-duplicated,
//! bounded catalog.
//!
//! # Pieces
//!
//! - **Rules / Classifier**: deny rules first, then `m3u8` > `hls` > `video`;
//!   first match wins.
//! - **Interceptor**: transparent decorator over fetch- and XHR-style
//!   primitives. Results and errors pass through untouched.
//! - **DOM Scanner**: incremental (inserted subtrees), media events and
//!   periodic full sweeps over a DOM capability interface.
//! - **Registry**: insertion-ordered, capacity-bounded, keyed by URL.
//! - **Session / Monitor**: `active` flag, statistics, listeners and the
//!   sweep timer.
//!
//! # Example
//!
//! ```rust
//! use streamwatch::{DiscoverySource, MonitoringSession, StreamKind};
//!
//! let session = MonitoringSession::new();
//! session.start();
//! session.subscribe(|record| println!("new stream: {}", record.url));
//!
//! session.observe("https://cdn.example.com/live/master.m3u8?token=abc", DiscoverySource::Fetch);
//! session.observe("https://cdn.example.com/segments/seg-004.ts", DiscoverySource::Fetch);
//!
//! let streams = session.list();
//! assert_eq!(streams.len(), 1);
//! assert_eq!(streams[0].kind, StreamKind::M3u8);
//! ```

pub mod classify;
pub mod client;
pub mod config;
pub mod dom;
pub mod error;
pub mod interceptor;
pub mod monitor;
pub mod registry;
pub mod rules;
pub mod scanner;
pub mod script_probe;
pub mod session;
pub mod timer;
pub mod title;

pub use classify::{Classifier, StreamKind, Verdict};
pub use client::{FetchedPage, PageClient};
pub use config::{RuleConfig, WatchConfig};
pub use dom::{Document, DomElement, DomError, HtmlPage};
pub use error::{Result, WatchError};
pub use interceptor::{
    intercept, Fetch, HostPrimitive, InstallOutcome, Intercepted, Observer, RequestTarget,
    XhrOpen, XhrOpenArgs,
};
pub use monitor::{HtmlSnapshot, StreamMonitor, SweepSource};
pub use registry::{
    DiscoverySource, InsertOutcome, RejectReason, StreamRecord, StreamRegistry,
    DEFAULT_MAX_STREAMS,
};
pub use rules::{PatternRule, RuleClass, RuleDivergence, RuleSet};
pub use scanner::{DomScanner, SweepSummary};
pub use session::{MonitoringSession, PageContext, SessionStats};
pub use timer::{IntervalTimer, ManualTimer, TimerHandle, TokioTimer};

/// Version of streamwatch
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
