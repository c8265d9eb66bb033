//! Verification sessions.

use crate::config::TimingConfig;
use crate::provider::Provider;
use std::fmt;

/// Identifier of a verification session. Never reused within a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What started a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    /// Pointer-down on an option.
    PointerDown,
    /// Click on an option.
    Click,
    /// `change` event on the radio.
    Change,
    /// Option already checked when the detector attached.
    Init,
    /// A re-evaluation found the selected widget gone.
    Reevaluation,
}

impl SessionSource {
    /// Short label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PointerDown => "pointerdown",
            Self::Click => "click",
            Self::Change => "change",
            Self::Init => "init",
            Self::Reevaluation => "reevaluation",
        }
    }
}

/// A live readiness polling session for one option.
///
/// At most one exists per detector. Ticks carry the session id and are
/// dropped when it no longer matches the live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSession {
    /// Session identifier.
    pub id: SessionId,
    /// DOM id of the option being verified.
    pub option_id: String,
    /// Provider currently expected for the option.
    pub provider: Provider,
    /// Start time, ms since epoch.
    pub started_at: u64,
    /// Delay before the first check.
    pub first_delay_ms: u64,
    /// Delay between checks.
    pub retry_interval_ms: u64,
    /// Time without readiness after which the widget counts as blocked.
    pub timeout_ms: u64,
    /// What started the session.
    pub source: SessionSource,
}

impl VerificationSession {
    /// Build a session with timing taken from configuration. Sessions started
    /// by a re-evaluation run for the grace period instead of the timeout.
    #[must_use]
    pub fn new(
        id: SessionId,
        option_id: String,
        provider: Provider,
        started_at: u64,
        first_delay_ms: u64,
        timing: &TimingConfig,
        source: SessionSource,
    ) -> Self {
        Self {
            id,
            option_id,
            provider,
            started_at,
            first_delay_ms,
            retry_interval_ms: timing.retry_interval_ms,
            timeout_ms: match source {
                SessionSource::Reevaluation => timing.grace_period_ms,
                _ => timing.timeout_ms,
            },
            source,
        }
    }

    /// Milliseconds since the session started.
    #[must_use]
    pub const fn elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.started_at)
    }

    /// Whether the session ran out of time.
    #[must_use]
    pub const fn timed_out(&self, now: u64) -> bool {
        self.elapsed(now) >= self.timeout_ms
    }
}
