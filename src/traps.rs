//! Blocking traps: network and runtime evidence that a widget was blocked.
//!
//! The host forwards failures it observes on the page as [`TrapSignal`]s.
//! A signal maps to a provider through the static domain table or the
//! provider's global symbol; the detector decides whether it is relevant.

use crate::error::Result;
use crate::provider::Provider;
use tracing::{debug, warn};

/// Network hooks the host installs to observe fetch and XHR failures.
///
/// Failing to install one never aborts the detector: the corresponding
/// channel is disabled and the error-event trap keeps working.
pub trait NetworkHooks {
    /// Wrap `fetch` so that rejections are reported as [`TrapSignal::FetchFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot patch `fetch`.
    fn patch_fetch(&mut self) -> Result<()>;

    /// Wrap XHR so that `error` events are reported as [`TrapSignal::XhrFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot patch XHR.
    fn patch_xhr(&mut self) -> Result<()>;
}

/// Hooks for hosts that observe no network traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNetworkHooks;

impl NetworkHooks for NoNetworkHooks {
    fn patch_fetch(&mut self) -> Result<()> {
        Err(crate::Error::Network("fetch is not observable on this host".to_string()))
    }

    fn patch_xhr(&mut self) -> Result<()> {
        Err(crate::Error::Network("XHR is not observable on this host".to_string()))
    }
}

/// A failure observed on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapSignal {
    /// An `error` event on a resource element.
    ResourceError {
        /// Tag of the failing element.
        tag: String,
        /// Its `src` or `href`.
        url: String,
    },
    /// A rejected `fetch`.
    FetchFailed {
        /// Request URL.
        url: String,
    },
    /// An XHR `error` event.
    XhrFailed {
        /// Request URL.
        url: String,
    },
    /// An uncaught error message.
    RuntimeError {
        /// Error message.
        message: String,
    },
}

/// Candidate blocked verdict derived from a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapVerdict {
    /// Provider the evidence points at.
    pub provider: Provider,
    /// Reason code, e.g. `stripe_resource_blocked`.
    pub reason: String,
    /// The failing URL or error message.
    pub details: String,
}

impl TrapSignal {
    /// Map the signal to a provider verdict, if it concerns one.
    #[must_use]
    pub fn verdict(&self) -> Option<TrapVerdict> {
        let (provider, suffix, details) = match self {
            Self::ResourceError { tag, url } => {
                let tag = tag.to_ascii_lowercase();
                if !matches!(tag.as_str(), "script" | "iframe" | "img" | "link") {
                    return None;
                }
                (Provider::from_url(url)?, "resource_blocked", url)
            }
            Self::FetchFailed { url } => (Provider::from_url(url)?, "fetch_blocked", url),
            Self::XhrFailed { url } => (Provider::from_url(url)?, "xhr_blocked", url),
            Self::RuntimeError { message } => {
                (Provider::from_runtime_error(message)?, "runtime_error", message)
            }
        };
        Some(TrapVerdict {
            provider,
            reason: format!("{provider}_{suffix}"),
            details: details.clone(),
        })
    }
}

/// Which trap channels are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrapSet {
    /// Fetch failures are observed.
    pub fetch: bool,
    /// XHR failures are observed.
    pub xhr: bool,
}

impl TrapSet {
    /// Install the network hooks, degrading on failure.
    pub fn install(hooks: &mut dyn NetworkHooks) -> Self {
        let fetch = match hooks.patch_fetch() {
            Ok(()) => true,
            Err(e) => {
                warn!("fetch trap unavailable, relying on error events: {e}");
                false
            }
        };
        let xhr = match hooks.patch_xhr() {
            Ok(()) => true,
            Err(e) => {
                warn!("XHR trap unavailable, relying on error events: {e}");
                false
            }
        };
        debug!("traps installed: fetch={fetch}, xhr={xhr}");
        Self { fetch, xhr }
    }

    /// Whether a signal arrives through a live channel.
    #[must_use]
    pub const fn accepts(&self, signal: &TrapSignal) -> bool {
        match signal {
            TrapSignal::ResourceError { .. } | TrapSignal::RuntimeError { .. } => true,
            TrapSignal::FetchFailed { .. } => self.fetch,
            TrapSignal::XhrFailed { .. } => self.xhr,
        }
    }
}
