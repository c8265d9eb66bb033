//! # payguard
//!
//! Detects, inside a checkout page, whether a third-party payment widget
//! (card-field iframe, SDK button, redirect form) failed to mount because a
//! script blocker or a Content-Security-Policy rule suppressed it, warns the
//! shopper, and holds back order confirmation until the widget renders or is
//! confirmed blocked.
//!
//! ## Architecture
//!
//! The page is modelled as an in-memory [`dom::Document`] that a host keeps
//! in sync with the real page. A [`Detector`] is driven by explicit host
//! calls (user events, mutations, trap signals, due timers) against an
//! injectable [`clock::Clock`]:
//!
//! ```text
//! events ──▶ classifier ──▶ detector ──▶ readiness (polled)
//!                              │   ▲
//!                              │   └── traps (network / runtime failures)
//!                              ▼
//!                  presentation + diagnostic ──▶ collector
//! ```
//!
//! The [`collector`] module is the server side: it validates and stores the
//! most recent blocked diagnostic and is served by the `payguard-collector`
//! binary.
//!
//! ## Example
//!
//! ```
//! use payguard::{Detector, DetectorConfig, Document, PageKind, Phase};
//! use payguard::traps::NoNetworkHooks;
//!
//! let mut doc = Document::new();
//! let mut detector = Detector::new(DetectorConfig::default());
//! detector.attach(&mut doc, PageKind::Checkout, &mut NoNetworkHooks);
//! assert_eq!(detector.phase(), Phase::Idle);
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod classifier;
pub mod clock;
pub mod collector;
pub mod config;
pub mod detector;
pub mod diagnostic;
pub mod dom;
pub mod error;
pub mod event;
pub mod presentation;
pub mod provider;
pub mod readiness;
pub mod scope;
pub mod traps;

pub use classifier::{classify, EnvironmentMode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collector::{CollectorBuilder, DiagnosticEndpoint, RunningCollector};
pub use config::{CollectorConfig, DetectorConfig, PageKind, TimingConfig};
pub use detector::{ClickOutcome, Detector, DetectorState, Phase, SubmitDecision};
pub use diagnostic::DiagnosticSnapshot;
pub use dom::{Document, NodeId};
pub use error::{Error, Result};
pub use event::{CollectorEvent, DetectorEvent};
pub use provider::Provider;
pub use readiness::is_ready;
pub use scope::{LastChoice, PaymentOptionRef, ScopeSet};
pub use traps::TrapSignal;
