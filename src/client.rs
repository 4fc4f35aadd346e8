//! HTTP page loader
//!
//! Loads pages for the CLI through an [`Intercepted`] `reqwest::Client`,
//! so the page request itself is reported to the session like any other
//! fetch.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::Result;
use crate::interceptor::{Fetch, InstallOutcome, Intercepted};
use crate::session::MonitoringSession;

const USER_AGENT: &str = concat!("streamwatch/", env!("CARGO_PKG_VERSION"));

/// A fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects; relative links resolve against it.
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// reqwest client behind an interceptor slot
pub struct PageClient {
    slot: Intercepted<Client>,
}

impl PageClient {
    /// Client with default timeouts.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            // Let the server negotiate HTTP/2
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .zstd(true)
            .gzip(true)
            .deflate(true)
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            slot: Intercepted::passthrough(client),
        })
    }

    /// Report every request this client makes to `session`.
    pub fn install(&mut self, session: &MonitoringSession) -> InstallOutcome {
        session.install_fetch(&mut self.slot)
    }

    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.slot.is_installed()
    }

    /// GET `url` and return its body as text.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_page(&self, url: &Url) -> Result<FetchedPage> {
        let request = self.slot.inner().get(url.clone()).build()?;
        debug!("Fetching page");

        let response = self.slot.call(request).await?.error_for_status()?;
        let status = response.status();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        info!(
            status = %status,
            version = ?response.version(),
            "Response received"
        );

        let body = response.text().await?;
        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    /// The underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        self.slot.inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_unobserved_client() {
        let client = PageClient::new().unwrap();
        assert!(!client.is_observed());
    }

    #[test]
    fn install_goes_through_the_session_guard() {
        let session = MonitoringSession::new();
        let mut first = PageClient::new().unwrap();
        let mut second = PageClient::new().unwrap();

        assert_eq!(first.install(&session), InstallOutcome::Installed);
        assert_eq!(first.install(&session), InstallOutcome::AlreadyInstalled);
        assert_eq!(second.install(&session), InstallOutcome::AlreadyInstalled);
        assert!(first.is_observed());
        assert!(!second.is_observed());
    }

    #[tokio::test]
    async fn failed_request_still_reports_the_url() {
        let session = MonitoringSession::new();
        session.start();
        let mut client = PageClient::with_timeout(Duration::from_secs(2)).unwrap();
        client.install(&session);

        // Port 9 (discard) on localhost is closed, so this fails fast
        let url = Url::parse("http://127.0.0.1:9/live/master.m3u8").unwrap();
        let result = client.fetch_page(&url).await;

        assert!(result.is_err());
        assert!(session.contains("http://127.0.0.1:9/live/master.m3u8"));
    }
}
