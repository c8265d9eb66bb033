//! Validation, capping and persistence of incoming diagnostics.

use super::store::{DiagnosticStore, StoredDiagnostic};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info};

/// Most top-level fields kept from a diagnostic.
pub const MAX_FIELDS: usize = 60;

/// Largest serialised diagnostic kept, in bytes.
pub const MAX_STORED_BYTES: usize = 10_000;

/// Strings are never shrunk below this many characters.
const MIN_STRING_CHARS: usize = 16;

/// What the endpoint did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOutcome {
    /// The diagnostic was stored.
    Stored {
        /// Its reason code, when present.
        reason: Option<String>,
    },
    /// The request was valid but carried nothing to store.
    Ignored,
    /// The request was refused.
    Rejected,
}

/// HTTP answer of the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResponse {
    /// Status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
    /// What happened.
    pub outcome: EndpointOutcome,
}

impl EndpointResponse {
    /// An error answer `{ok: false, error: code}`.
    #[must_use]
    pub fn error(status: u16, code: &str) -> Self {
        Self {
            status,
            body: json!({ "ok": false, "error": code }),
            outcome: EndpointOutcome::Rejected,
        }
    }

    fn ignored() -> Self {
        Self {
            status: 200,
            body: json!({ "ok": true, "ignored": true }),
            outcome: EndpointOutcome::Ignored,
        }
    }

    fn stored(reason: Option<String>) -> Self {
        Self {
            status: 200,
            body: json!({ "ok": true }),
            outcome: EndpointOutcome::Stored { reason },
        }
    }

    /// Machine-readable error code of an error answer.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

/// The diagnostic endpoint.
#[derive(Debug, Clone)]
pub struct DiagnosticEndpoint {
    path: String,
    token: String,
    store: Arc<dyn DiagnosticStore>,
}

impl DiagnosticEndpoint {
    /// Create an endpoint answering on `path`. An empty token refuses everything.
    #[must_use]
    pub fn new(path: impl Into<String>, token: impl Into<String>, store: Arc<dyn DiagnosticStore>) -> Self {
        Self {
            path: path.into(),
            token: token.into(),
            store,
        }
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Handle one request.
    #[must_use]
    pub fn handle(&self, method: &str, path: &str, body: &[u8]) -> EndpointResponse {
        if path != self.path {
            return EndpointResponse::error(404, "not_found");
        }
        if !method.eq_ignore_ascii_case("POST") {
            return EndpointResponse::error(405, "method_not_allowed");
        }
        let Ok(Value::Object(mut payload)) = serde_json::from_slice::<Value>(body) else {
            return EndpointResponse::error(400, "invalid_json");
        };
        if !self.token_matches(payload.get("token").and_then(Value::as_str).unwrap_or("")) {
            debug!("diagnostic refused: bad token");
            return EndpointResponse::error(403, "forbidden");
        }
        let diag = match payload.remove("diag") {
            Some(Value::Object(diag)) if !diag.is_empty() => diag,
            _ => return EndpointResponse::error(400, "missing_diag"),
        };
        if diag.get("status").and_then(Value::as_str) != Some("blocked") {
            return EndpointResponse::ignored();
        }

        let diag = cap_diagnostic(diag);
        let reason = diag.get("reason").and_then(Value::as_str).map(str::to_string);
        let record = StoredDiagnostic {
            diag,
            received_at: Utc::now(),
        };
        match self.store.save(&record) {
            Ok(()) => {
                info!("diagnostic stored: {}", reason.as_deref().unwrap_or("unknown reason"));
                EndpointResponse::stored(reason)
            }
            Err(e) => {
                error!("failed to store diagnostic: {e}");
                EndpointResponse::error(500, "server_error")
            }
        }
    }

    fn token_matches(&self, given: &str) -> bool {
        !self.token.is_empty() && bool::from(given.as_bytes().ct_eq(self.token.as_bytes()))
    }
}

/// Keep the first [`MAX_FIELDS`] fields, then shrink the longest strings and
/// finally drop trailing fields until the object fits [`MAX_STORED_BYTES`].
#[must_use]
pub fn cap_diagnostic(diag: Map<String, Value>) -> Map<String, Value> {
    let mut capped: Map<String, Value> = diag.into_iter().take(MAX_FIELDS).collect();
    while serialized_len(&capped) > MAX_STORED_BYTES {
        let longest = capped
            .values_mut()
            .filter_map(|v| match v {
                Value::String(s) if s.chars().count() > MIN_STRING_CHARS => Some(s),
                _ => None,
            })
            .max_by_key(|s| s.chars().count());
        if let Some(s) = longest {
            let keep = (s.chars().count() / 2).max(MIN_STRING_CHARS);
            let mut short: String = s.chars().take(keep - 1).collect();
            short.push('…');
            *s = short;
            continue;
        }
        let Some(last) = capped.keys().last().cloned() else {
            break;
        };
        capped.remove(&last);
    }
    capped
}

fn serialized_len(map: &Map<String, Value>) -> usize {
    serde_json::to_vec(map).map_or(usize::MAX, |v| v.len())
}
