//! Error types for payguard.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by payguard.
///
/// Detection verdicts (timeouts, blocked resources) are detector state, not
/// errors. These variants cover configuration, plumbing and the collector.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or saved.
    #[error("configuration error: {0}")]
    Config(String),

    /// A CSS selector could not be parsed.
    #[error("invalid selector `{selector}`: {reason}")]
    Selector {
        /// The offending selector text.
        selector: String,
        /// What went wrong.
        reason: String,
    },

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Diagnostic store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Network failure (report upload, collector socket).
    #[error("network error: {0}")]
    Network(String),

    /// Clipboard write failure.
    #[error("clipboard error: {0}")]
    Clipboard(String),
}
