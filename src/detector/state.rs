//! Detector state, suppression and grace bookkeeping.

use crate::provider::Provider;
use std::collections::BTreeMap;

/// Offset used to mark a provider caught by a trap as already past its
/// grace period.
const SEEN_LONG_AGO_MS: u64 = 99_999;

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing to report; confirmation enabled.
    #[default]
    Idle,
    /// A widget is being verified; confirmation disabled.
    Verifying,
    /// A widget is considered blocked; warnings shown.
    Blocked,
}

/// Code path that produced a blocked verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictPath {
    /// Verification or re-verification timeout.
    Timeout,
    /// Resource, fetch, XHR or runtime-error trap.
    Trap,
    /// Blank payment step.
    Blank,
}

/// Observable detector state. Mutated only by the detector's transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetectorState {
    /// Current phase.
    pub phase: Phase,
    /// Provider being verified or blocked.
    pub provider: Option<Provider>,
    /// Reason code of the blocked verdict.
    pub reason: String,
    /// Details of the blocked verdict.
    pub details: String,
    /// Message currently shown to the shopper.
    pub message: String,
    /// Path of the blocked verdict.
    pub path: Option<VerdictPath>,
    /// Time of the last phase change, ms since epoch.
    pub last_change_at: u64,
}

impl DetectorState {
    /// Whether submission must be prevented.
    #[must_use]
    pub fn blocks_submission(&self) -> bool {
        self.phase != Phase::Idle
    }
}

/// A dismissed verdict that must not be surfaced again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suppression {
    /// Dismissed provider.
    pub provider: Provider,
    /// Path of the dismissed verdict.
    pub path: VerdictPath,
}

impl Suppression {
    /// Whether a verdict is covered by this suppression.
    #[must_use]
    pub fn covers(&self, provider: Provider, path: VerdictPath) -> bool {
        self.provider == provider && self.path == path
    }
}

/// First-seen timestamps per provider, used for grace periods.
#[derive(Debug, Clone, Default)]
pub struct ProviderAgeTable {
    first_seen: BTreeMap<Provider, u64>,
}

impl ProviderAgeTable {
    /// Age of a provider, recording it as first seen now if unknown.
    pub fn age(&mut self, provider: Provider, now: u64) -> u64 {
        let first = *self.first_seen.entry(provider).or_insert(now);
        now.saturating_sub(first)
    }

    /// Record a synthetic "seen long ago" timestamp unless one exists.
    pub fn mark_seen_long_ago(&mut self, provider: Provider, now: u64) {
        self.first_seen
            .entry(provider)
            .or_insert_with(|| now.saturating_sub(SEEN_LONG_AGO_MS));
    }

    /// Forget a provider.
    pub fn reset(&mut self, provider: Provider) {
        self.first_seen.remove(&provider);
    }

    /// First-seen timestamp, if any.
    #[must_use]
    pub fn first_seen(&self, provider: Provider) -> Option<u64> {
        self.first_seen.get(&provider).copied()
    }
}
