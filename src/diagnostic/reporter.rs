//! One-shot diagnostic reporting.

use super::snapshot::DiagnosticSnapshot;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends blocked diagnostics somewhere. Implementations must not block and
/// must swallow their own failures.
pub trait DiagnosticReporter: Send + Sync + std::fmt::Debug {
    /// Dispatch a snapshot.
    fn report(&self, snapshot: &DiagnosticSnapshot);
}

/// Reporter that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl DiagnosticReporter for NoopReporter {
    fn report(&self, snapshot: &DiagnosticSnapshot) {
        debug!("diagnostic report dropped: {}", snapshot.reason);
    }
}

#[derive(Serialize)]
struct ReportBody<'a> {
    token: &'a str,
    diag: &'a DiagnosticSnapshot,
}

/// POSTs `{token, diag}` to the collector on the ambient tokio runtime.
#[derive(Debug, Clone)]
pub struct HttpReporter {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpReporter {
    /// Create a reporter for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Network`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REPORT_TIMEOUT)
            .build()
            .map_err(|e| crate::Error::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
        })
    }

    /// Collector URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl DiagnosticReporter for HttpReporter {
    fn report(&self, snapshot: &DiagnosticSnapshot) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime, diagnostic report for {} dropped", snapshot.reason);
            return;
        };
        let request = self.client.post(&self.endpoint).json(&ReportBody {
            token: &self.token,
            diag: snapshot,
        });
        let reason = snapshot.reason.clone();
        handle.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("diagnostic {reason} accepted");
                }
                Ok(resp) => debug!("diagnostic {reason} refused: {}", resp.status()),
                Err(e) => debug!("diagnostic {reason} not delivered: {e}"),
            }
        });
    }
}
