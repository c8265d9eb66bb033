//! Deterministic timer queue.
//!
//! The detector never sleeps. It records due times here and the host calls
//! [`super::Detector::run_due_timers`] whenever its clock has moved.

use super::session::SessionId;

/// Handle of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What a timer does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// Readiness check of a session.
    Tick(SessionId),
    /// Show the "preparing" notice of a session.
    VerifyingNotice(SessionId),
    /// Debounced re-evaluation.
    Debounce,
    /// Periodic re-evaluation, rescheduled until the given time.
    Sweep {
        /// Last time a sweep may be scheduled.
        until: u64,
    },
    /// Start verifying an option checked at attach time.
    Preselect {
        /// DOM id of that option.
        option_id: String,
    },
    /// Restore the copy button label.
    CopiedLabel {
        /// Label to restore.
        label: String,
    },
}

impl TimerKind {
    /// Session the timer belongs to, if any.
    #[must_use]
    pub const fn session(&self) -> Option<SessionId> {
        match self {
            Self::Tick(id) | Self::VerifyingNotice(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Timer {
    id: TimerId,
    due: u64,
    kind: TimerKind,
}

/// Pending timers ordered by due time, then scheduling order.
#[derive(Debug, Clone, Default)]
pub struct TimerQueue {
    next_id: u64,
    timers: Vec<Timer>,
}

impl TimerQueue {
    /// Schedule a timer.
    pub fn schedule(&mut self, due: u64, kind: TimerKind) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.push(Timer { id, due, kind });
        id
    }

    /// Cancel a timer. Unknown ids are ignored.
    pub fn cancel(&mut self, id: TimerId) {
        self.timers.retain(|t| t.id != id);
    }

    /// Cancel every timer matching `predicate`. Returns how many were removed.
    pub fn cancel_where(&mut self, predicate: impl Fn(&TimerKind) -> bool) -> usize {
        let before = self.timers.len();
        self.timers.retain(|t| !predicate(&t.kind));
        before - self.timers.len()
    }

    /// Cancel every timer of a session.
    pub fn cancel_session(&mut self, session: SessionId) -> usize {
        self.cancel_where(|k| k.session() == Some(session))
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<TimerKind> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= now)
            .min_by_key(|(_, t)| (t.due, t.id))
            .map(|(i, _)| i)?;
        Some(self.timers.remove(index).kind)
    }

    /// Earliest due time.
    #[must_use]
    pub fn next_due(&self) -> Option<u64> {
        self.timers.iter().map(|t| t.due).min()
    }

    /// Pending timer kinds, in no particular order.
    pub fn pending(&self) -> impl Iterator<Item = &TimerKind> {
        self.timers.iter().map(|t| &t.kind)
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timer is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
