//! Detector and collector event system.

use crate::provider::Provider;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Events emitted by the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    /// The detector was attached to a page.
    Attached {
        /// Whether it will act on this page.
        active: bool,
    },

    /// A verification session started.
    VerificationStarted {
        /// Session identifier.
        session: u64,
        /// Selected option id.
        option_id: String,
        /// Provider being verified.
        provider: Provider,
    },

    /// A session was superseded or abandoned.
    VerificationCancelled {
        /// Session identifier.
        session: u64,
    },

    /// The widget was found ready.
    WidgetReady {
        /// Provider whose widget rendered.
        provider: Provider,
    },

    /// A blocked verdict was surfaced.
    Blocked {
        /// Blocked provider.
        provider: Provider,
        /// Reason code.
        reason: String,
    },

    /// A blocked verdict was withheld because the shopper dismissed it.
    Suppressed {
        /// Blocked provider.
        provider: Provider,
        /// Reason code.
        reason: String,
    },

    /// The shopper dismissed the warning.
    Dismissed {
        /// Provider of the dismissed warning.
        provider: Provider,
    },

    /// The detector returned to idle.
    Idle,

    /// A diagnostic report was dispatched.
    DiagnosticReported {
        /// Reason code of the reported snapshot.
        reason: String,
    },
}

/// Events emitted by the diagnostic collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorEvent {
    /// The collector is accepting requests.
    Started {
        /// Bound address.
        addr: SocketAddr,
    },

    /// A diagnostic was stored.
    DiagnosticStored {
        /// Reason code, when present.
        reason: Option<String>,
    },

    /// A valid diagnostic without a blocked status was ignored.
    DiagnosticIgnored,

    /// A request was rejected.
    Rejected {
        /// HTTP status.
        status: u16,
        /// Machine-readable error code.
        error: String,
    },

    /// The collector is shutting down.
    ShuttingDown,
}

/// Channel for receiving detector events.
pub type DetectorEventsChannel = broadcast::Receiver<DetectorEvent>;

/// Sender for detector events.
pub type DetectorEventsSender = broadcast::Sender<DetectorEvent>;

/// Channel for receiving collector events.
pub type CollectorEventsChannel = broadcast::Receiver<CollectorEvent>;

/// Sender for collector events.
pub type CollectorEventsSender = broadcast::Sender<CollectorEvent>;

/// Create a new detector event channel pair.
#[must_use]
pub fn create_event_channel() -> (DetectorEventsSender, DetectorEventsChannel) {
    broadcast::channel(256)
}

/// Create a new collector event channel pair.
#[must_use]
pub fn create_collector_channel() -> (CollectorEventsSender, CollectorEventsChannel) {
    broadcast::channel(256)
}
