//! Transparent observation of outbound requests.
//!
//! A host's network primitives are modelled as two traits: [`Fetch`] (a
//! fetch-style call taking one request value) and [`XhrOpen`] (an XHR-style
//! `open` taking method, URL and optional trailing arguments). The
//! decorator [`Intercepted`] implements the same trait as the primitive it
//! wraps. Before forwarding, it hands the request URL to an [`Observer`];
//! the request itself, the call's result and any error are passed through
//! untouched.
//!
//! ## Lifecycle
//!
//! ```text
//! Intercepted::passthrough(p)   host keeps its primitive in the slot
//!        │ install(observer)    once; a second install is a no-op
//!        ▼
//!   observe → forward           every call
//!        │ uninstall()
//!        ▼
//!   forward                     back to plain pass-through
//! ```
//!
//! Observation failures never reach the caller. A panic inside the
//! observer is caught and logged, and the call still goes through.

use std::any::Any;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error, warn};
use url::Url;

use crate::registry::DiscoverySource;

/// Callback receiving every observed request URL
pub type Observer = Arc<dyn Fn(&str, DiscoverySource) + Send + Sync>;

/// Anything that carries a request URL
pub trait RequestTarget {
    /// The request URL, or `None` if it cannot be extracted.
    fn target_url(&self) -> Option<Cow<'_, str>>;
}

impl RequestTarget for str {
    fn target_url(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self))
    }
}

impl RequestTarget for String {
    fn target_url(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.as_str()))
    }
}

impl<T: RequestTarget + ?Sized> RequestTarget for &T {
    fn target_url(&self) -> Option<Cow<'_, str>> {
        (**self).target_url()
    }
}

impl RequestTarget for Url {
    fn target_url(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.as_str()))
    }
}

impl RequestTarget for reqwest::Request {
    fn target_url(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.url().as_str()))
    }
}

impl<B> RequestTarget for http::Request<B> {
    fn target_url(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Owned(self.uri().to_string()))
    }
}

/// Common surface of wrappable host primitives
pub trait HostPrimitive {
    /// Whether this primitive already observes its calls.
    fn is_intercepted(&self) -> bool {
        false
    }
}

/// A fetch-style network primitive
pub trait Fetch: HostPrimitive {
    type Request: RequestTarget;
    /// Whatever the primitive returns: a response, a `Result`, a future.
    type Output;

    fn call(&self, request: Self::Request) -> Self::Output;
}

/// Arguments of an XHR-style `open` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XhrOpenArgs {
    pub method: String,
    pub url: String,
    /// Trailing `async` flag, if the caller passed one.
    pub is_async: Option<bool>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl XhrOpenArgs {
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            is_async: None,
            user: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = Some(is_async);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }
}

/// An XHR-style `open` primitive
pub trait XhrOpen: HostPrimitive {
    type Output;

    fn open(&self, args: XhrOpenArgs) -> Self::Output;
}

/// Result of installing an observer into a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    /// This slot (or this session) already has an observer.
    AlreadyInstalled,
    /// The primitive inside the slot is already wrapped by someone else.
    WrappedElsewhere,
}

/// Observing decorator around a host primitive
///
/// Doubles as the guarded slot the host keeps its primitive in: without an
/// observer it is a plain pass-through.
pub struct Intercepted<P> {
    inner: P,
    observer: Option<Observer>,
}

/// Wrap `original` so every call is reported to `observer` first.
///
/// Wrapping a primitive that is already intercepted yields a pass-through
/// wrapper instead, so calls are never observed twice.
pub fn intercept<P: HostPrimitive>(original: P, observer: Observer) -> Intercepted<P> {
    let mut wrapped = Intercepted::passthrough(original);
    wrapped.install(observer);
    wrapped
}

impl<P> Intercepted<P> {
    /// Slot holding `inner` with no observer installed.
    pub fn passthrough(inner: P) -> Self {
        Self {
            inner,
            observer: None,
        }
    }

    /// Remove the observer. Returns `true` if one was installed.
    pub fn uninstall(&mut self) -> bool {
        self.observer.take().is_some()
    }

    pub fn is_installed(&self) -> bool {
        self.observer.is_some()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: HostPrimitive> Intercepted<P> {
    /// Install `observer`. Idempotent: an existing observer is kept.
    pub fn install(&mut self, observer: Observer) -> InstallOutcome {
        if self.observer.is_some() {
            debug!("Interceptor already installed; keeping existing observer");
            return InstallOutcome::AlreadyInstalled;
        }
        if self.inner.is_intercepted() {
            warn!("Primitive is already wrapped by another interceptor; not wrapping again");
            return InstallOutcome::WrappedElsewhere;
        }
        self.observer = Some(observer);
        InstallOutcome::Installed
    }
}

impl<P: HostPrimitive> HostPrimitive for Intercepted<P> {
    fn is_intercepted(&self) -> bool {
        self.observer.is_some() || self.inner.is_intercepted()
    }
}

impl<F: Fetch> Fetch for Intercepted<F> {
    type Request = F::Request;
    type Output = F::Output;

    fn call(&self, request: Self::Request) -> Self::Output {
        if let Some(observer) = &self.observer {
            observe(observer, &request, DiscoverySource::Fetch);
        }
        self.inner.call(request)
    }
}

impl<X: XhrOpen> XhrOpen for Intercepted<X> {
    type Output = X::Output;

    fn open(&self, args: XhrOpenArgs) -> Self::Output {
        if let Some(observer) = &self.observer {
            observe(observer, args.url.as_str(), DiscoverySource::Xhr);
        }
        self.inner.open(args)
    }
}

fn observe<R: RequestTarget + ?Sized>(observer: &Observer, request: &R, source: DiscoverySource) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match request.target_url() {
        Some(url) => observer(&url, source),
        None => debug!("No URL on {} request; skipped", source),
    }));

    if let Err(payload) = outcome {
        error!(
            "{} observer failed: {}; request forwarded unchanged",
            source,
            panic_message(payload.as_ref())
        );
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

impl HostPrimitive for reqwest::Client {}

/// `reqwest` as a real fetch primitive.
impl Fetch for reqwest::Client {
    type Request = reqwest::Request;
    type Output = BoxFuture<'static, reqwest::Result<reqwest::Response>>;

    fn call(&self, request: reqwest::Request) -> Self::Output {
        let client = self.clone();
        Box::pin(async move { client.execute(request).await })
    }
}
