//! Verification state machine.
//!
//! The [`Detector`] owns the lifecycle idle → verifying → blocked → idle for
//! one page. Hosts drive it with explicit calls:
//!
//! - [`Detector::attach`] once per page load,
//! - [`Detector::on_pointer_down`], [`Detector::on_click`],
//!   [`Detector::on_change`] and [`Detector::on_submit`] for user events,
//! - [`Detector::on_mutation`] after DOM changes,
//! - [`Detector::on_trap`] for network and runtime failures,
//! - [`Detector::run_due_timers`] whenever the clock moved.
//!
//! All state changes go through `start_verification`, `block` and
//! `go_idle`. Lifecycle events are published on a broadcast channel.

mod session;
mod state;
mod timers;

pub use session::{SessionId, SessionSource, VerificationSession};
pub use state::{DetectorState, Phase, ProviderAgeTable, Suppression, VerdictPath};
pub use timers::{TimerId, TimerKind, TimerQueue};

use crate::classifier::{classify, page_providers, EnvironmentMode};
use crate::clock::{Clock, SystemClock};
use crate::config::{DetectorConfig, PageKind};
use crate::diagnostic::{
    copy_with_fallback, Clipboard, DiagnosticReporter, DiagnosticSnapshot, HttpReporter,
    NoClipboard, NoopReporter, PageContext, SnapshotExtras, MAX_REPORT_BYTES,
};
use crate::dom::{Document, NodeId};
use crate::event::{create_event_channel, DetectorEvent, DetectorEventsChannel, DetectorEventsSender};
use crate::presentation::{
    BlockedView, Presentation, BANNER_CLOSE_ID, COPIED_LABEL, COPY_CLASS, COPY_LABEL, INLINE_ID,
    RELOAD_CLASS,
};
use crate::provider::Provider;
use crate::readiness::is_ready;
use crate::scope::{
    input_from_target, is_payment_input, options_blank, payment_step_root, selected_input,
    LastChoice, PaymentOptionRef, ScopeSet,
};
use crate::traps::{NetworkHooks, TrapSet, TrapSignal};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reason code of the blank payment step verdict.
pub const BLANK_REASON: &str = "payment_options_blank";

/// What a click resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The banner close button dismissed the warning.
    Dismissed,
    /// A reload button was clicked; the host should reload the page.
    ReloadRequested,
    /// The copy button was clicked; `true` when the summary was copied.
    Copied(bool),
    /// A payment option was chosen.
    Choice,
    /// Nothing to do.
    Ignored,
}

/// Whether a form submission may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitDecision {
    /// Let the submission through.
    Allow,
    /// Prevent it.
    Prevent {
        /// Element id the host should scroll into view.
        scroll_to: Option<&'static str>,
    },
}

/// A blocked verdict about to be applied.
#[derive(Debug, Clone)]
struct Verdict {
    provider: Provider,
    reason: String,
    details: String,
    path: VerdictPath,
    extras: SnapshotExtras,
}

impl Verdict {
    fn timeout(doc: &Document, provider: Provider, found: &str) -> Self {
        Self {
            provider,
            reason: format!("{provider}_timeout"),
            details: "widget_missing".to_string(),
            path: VerdictPath::Timeout,
            extras: SnapshotExtras {
                expected: provider.wire_name().to_string(),
                found: found.to_string(),
                widget_ready: Some(false),
                globals_present: Some(provider.globals_present(doc)),
            },
        }
    }
}

/// Checkout payment-widget blocker detector for one page.
pub struct Detector {
    config: DetectorConfig,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    presentation: Presentation,
    state: DetectorState,
    session: Option<VerificationSession>,
    timers: TimerQueue,
    debounce: Option<TimerId>,
    ages: ProviderAgeTable,
    age_provider: Option<Provider>,
    suppression: Option<Suppression>,
    snapshot: Option<DiagnosticSnapshot>,
    report_sent: bool,
    last_choice: Option<LastChoice>,
    chosen_here: bool,
    warning_held: bool,
    last_pointer_down: Option<u64>,
    mode: EnvironmentMode,
    active: bool,
    traps: TrapSet,
    next_session: u64,
    events_tx: DetectorEventsSender,
    reporter: Box<dyn DiagnosticReporter>,
    clipboard: Box<dyn Clipboard>,
    clipboard_fallback: Box<dyn Clipboard>,
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector")
            .field("active", &self.active)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("session", &self.session)
            .field("pending_timers", &self.timers.len())
            .field("suppression", &self.suppression)
            .finish_non_exhaustive()
    }
}

impl Detector {
    /// Create a detector. Reports go over HTTP when reporting is enabled.
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        let reporter: Box<dyn DiagnosticReporter> = if config.reporting_enabled() {
            let endpoint = config.diagnostic.endpoint_url.clone().unwrap_or_default();
            let token = config.diagnostic.token.clone().unwrap_or_default();
            match HttpReporter::new(endpoint, token) {
                Ok(reporter) => Box::new(reporter),
                Err(e) => {
                    warn!("diagnostic reporting disabled: {e}");
                    Box::new(NoopReporter)
                }
            }
        } else {
            Box::new(NoopReporter)
        };
        let (events_tx, _) = create_event_channel();
        Self {
            presentation: Presentation::new(&config),
            config,
            clock: Arc::new(SystemClock),
            rng: StdRng::from_entropy(),
            state: DetectorState::default(),
            session: None,
            timers: TimerQueue::default(),
            debounce: None,
            ages: ProviderAgeTable::default(),
            age_provider: None,
            suppression: None,
            snapshot: None,
            report_sent: false,
            last_choice: None,
            chosen_here: false,
            warning_held: false,
            last_pointer_down: None,
            mode: EnvironmentMode::Standalone,
            active: false,
            traps: TrapSet::default(),
            next_session: 0,
            events_tx,
            reporter,
            clipboard: Box::new(NoClipboard),
            clipboard_fallback: Box::new(NoClipboard),
        }
    }

    /// Use another clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use another diagnostic reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn DiagnosticReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Use host clipboards for the copy button.
    #[must_use]
    pub fn with_clipboard(mut self, primary: Box<dyn Clipboard>, fallback: Box<dyn Clipboard>) -> Self {
        self.clipboard = primary;
        self.clipboard_fallback = fallback;
        self
    }

    /// Seed the first-check jitter.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Attach to a page: create surfaces, install traps, schedule the
    /// post-attach sweep and the pre-selected option check.
    pub fn attach(&mut self, doc: &mut Document, page: PageKind, hooks: &mut dyn NetworkHooks) {
        self.active = self.config.should_run_on(page);
        self.emit(DetectorEvent::Attached { active: self.active });
        if !self.active {
            info!("payguard inactive on {page:?} page");
            return;
        }
        self.mode = EnvironmentMode::detect(doc);
        self.presentation.ensure_surfaces(doc);
        self.presentation.hide_all(doc);
        self.traps = TrapSet::install(hooks);

        let now = self.now();
        let timing = self.config.timing;
        self.timers.schedule(
            now + timing.sweep_interval_ms,
            TimerKind::Sweep {
                until: now + timing.sweep_window_ms,
            },
        );
        self.schedule_debounce(now);
        if let Some(option) = selected_input(doc).and_then(|input| PaymentOptionRef::from_input(doc, input)) {
            self.remember(&option, now);
            self.timers.schedule(
                now + timing.preselect_delay_ms,
                TimerKind::Preselect { option_id: option.id },
            );
        }
        info!(
            "payguard v{} attached ({:?} mode)",
            env!("CARGO_PKG_VERSION"),
            self.mode
        );
    }

    /// Restore a last choice persisted by the host. Returns whether it was valid.
    pub fn restore_last_choice(&mut self, raw: &str) -> bool {
        match LastChoice::from_json(raw) {
            Some(choice) => {
                debug!("restored last choice {}", choice.id);
                self.last_choice = Some(choice);
                true
            }
            None => false,
        }
    }

    /// The option the shopper last interacted with.
    #[must_use]
    pub fn last_choice(&self) -> Option<&LastChoice> {
        self.last_choice.as_ref()
    }

    /// Pointer-down on an element.
    pub fn on_pointer_down(&mut self, doc: &mut Document, target: NodeId) {
        if !self.active {
            return;
        }
        let Some(input) = input_from_target(doc, target) else {
            return;
        };
        self.last_pointer_down = Some(self.now());
        self.handle_choice(doc, input, SessionSource::PointerDown);
    }

    /// Click on an element: control buttons, then payment options.
    pub fn on_click(&mut self, doc: &mut Document, target: NodeId) -> ClickOutcome {
        if !self.active {
            return ClickOutcome::Ignored;
        }
        if doc.closest(target, &format!("#{BANNER_CLOSE_ID}")).is_some() {
            self.dismiss(doc);
            return ClickOutcome::Dismissed;
        }
        if doc.closest(target, &format!(".{RELOAD_CLASS}")).is_some() {
            info!("reload requested by shopper");
            return ClickOutcome::ReloadRequested;
        }
        if doc.closest(target, &format!(".{COPY_CLASS}")).is_some() {
            return ClickOutcome::Copied(self.copy_diagnostic(doc));
        }
        let Some(input) = input_from_target(doc, target) else {
            return ClickOutcome::Ignored;
        };
        let now = self.now();
        if self
            .last_pointer_down
            .is_some_and(|at| now.saturating_sub(at) < self.config.timing.click_dedup_ms)
        {
            debug!("click right after pointer-down ignored");
            return ClickOutcome::Ignored;
        }
        self.handle_choice(doc, input, SessionSource::Click);
        ClickOutcome::Choice
    }

    /// `change` event on an element.
    pub fn on_change(&mut self, doc: &mut Document, target: NodeId) {
        if !self.active || !is_payment_input(doc, target) {
            return;
        }
        self.handle_choice(doc, target, SessionSource::Change);
    }

    /// The document changed.
    pub fn on_mutation(&mut self, _doc: &Document) {
        if self.active {
            let now = self.now();
            self.schedule_debounce(now);
        }
    }

    /// A form submission. Prevented while verifying or blocked.
    pub fn on_submit(&mut self, doc: &mut Document) -> SubmitDecision {
        if !self.active || !self.state.blocks_submission() {
            return SubmitDecision::Allow;
        }
        let option = self.current_option(doc);
        match self.state.phase {
            Phase::Blocked => {
                if let Some(provider) = self.state.provider {
                    let view = BlockedView {
                        message: &self.state.message,
                        provider,
                        reason: &self.state.reason,
                        details: &self.state.details,
                    };
                    self.presentation.show_blocked(doc, &view, option.as_ref());
                }
            }
            Phase::Verifying if self.warning_held => {}
            Phase::Verifying => {
                if let Some(session) = &self.session {
                    self.timers.cancel_where(|k| *k == TimerKind::VerifyingNotice(session.id));
                }
                self.presentation
                    .show_verifying(doc, &self.state.message, option.as_ref());
            }
            Phase::Idle => {}
        }
        Presentation::set_confirmation_disabled(doc, true, &self.state.message);
        info!("submission prevented while {:?}", self.state.phase);
        SubmitDecision::Prevent {
            scroll_to: self.config.show_inline.then_some(INLINE_ID),
        }
    }

    /// A failure observed by the host.
    pub fn on_trap(&mut self, doc: &mut Document, signal: &TrapSignal) {
        if !self.active {
            return;
        }
        if !self.traps.accepts(signal) {
            debug!("trap signal on an uninstalled channel ignored");
            return;
        }
        let Some(trap) = signal.verdict() else {
            return;
        };
        if !self.trap_relevant(doc, trap.provider) {
            debug!("{} ignored: {} is not in use", trap.reason, trap.provider);
            return;
        }
        let now = self.now();
        self.ages.mark_seen_long_ago(trap.provider, now);
        let verdict = Verdict {
            provider: trap.provider,
            extras: SnapshotExtras {
                expected: trap.provider.wire_name().to_string(),
                found: trap.reason.clone(),
                widget_ready: None,
                globals_present: Some(trap.provider.globals_present(doc)),
            },
            reason: trap.reason,
            details: trap.details,
            path: VerdictPath::Trap,
        };
        self.block(doc, verdict);
    }

    /// Dismiss the current warning. The verdict is suppressed until the
    /// provider changes or another path produces a verdict.
    pub fn dismiss(&mut self, doc: &mut Document) {
        if !self.active {
            return;
        }
        if self.state.phase == Phase::Blocked {
            if let (Some(provider), Some(path)) = (self.state.provider, self.state.path) {
                self.suppression = Some(Suppression { provider, path });
                info!("{} warning dismissed ({path:?})", provider);
                self.emit(DetectorEvent::Dismissed { provider });
            }
        }
        self.go_idle(doc);
    }

    /// Fire every timer due at the current clock time. Returns how many fired.
    pub fn run_due_timers(&mut self, doc: &mut Document) -> usize {
        let now = self.now();
        let mut fired = 0;
        while let Some(kind) = self.timers.pop_due(now) {
            fired += 1;
            self.fire(doc, kind, now);
        }
        fired
    }

    /// Earliest pending timer due time.
    #[must_use]
    pub fn next_timer_due(&self) -> Option<u64> {
        self.timers.next_due()
    }

    /// Pending timers.
    pub fn pending_timers(&self) -> impl Iterator<Item = &TimerKind> {
        self.timers.pending()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Live verification session.
    #[must_use]
    pub const fn session(&self) -> Option<&VerificationSession> {
        self.session.as_ref()
    }

    /// Snapshot of the last blocked verdict.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&DiagnosticSnapshot> {
        self.snapshot.as_ref()
    }

    /// When grace bookkeeping first saw `provider` in use, ms since epoch.
    #[must_use]
    pub fn provider_first_seen(&self, provider: Provider) -> Option<u64> {
        self.ages.first_seen(provider)
    }

    /// Environment mode detected at attach time.
    #[must_use]
    pub const fn mode(&self) -> EnvironmentMode {
        self.mode
    }

    /// Whether the detector acts on this page.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the current blocked episode was reported.
    #[must_use]
    pub const fn report_sent(&self) -> bool {
        self.report_sent
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> DetectorEventsChannel {
        self.events_tx.subscribe()
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    fn emit(&self, event: DetectorEvent) {
        // No subscriber is not an error.
        let _ = self.events_tx.send(event);
    }

    fn log_transition(&self, from: Phase, to: Phase, detail: &str) {
        if self.config.debug {
            info!("{from:?} -> {to:?}: {detail}");
        } else {
            debug!("{from:?} -> {to:?}: {detail}");
        }
    }

    fn set_phase(&mut self, phase: Phase, now: u64, detail: &str) {
        let from = self.state.phase;
        if from != phase {
            self.state.phase = phase;
            self.state.last_change_at = now;
            self.log_transition(from, phase, detail);
        }
    }

    fn remember(&mut self, option: &PaymentOptionRef, now: u64) {
        self.last_choice = Some(LastChoice {
            id: option.id.clone(),
            module_name: option.module_name.clone(),
            ts: now,
        });
    }

    fn schedule_debounce(&mut self, now: u64) {
        if let Some(pending) = self.debounce.take() {
            self.timers.cancel(pending);
        }
        self.debounce = Some(
            self.timers
                .schedule(now + self.config.timing.debounce_ms, TimerKind::Debounce),
        );
    }

    /// The checked option, else the last option interacted with.
    fn current_option(&self, doc: &Document) -> Option<PaymentOptionRef> {
        selected_input(doc)
            .or_else(|| {
                self.last_choice
                    .as_ref()
                    .and_then(|c| doc.get_element_by_id(&c.id))
                    .filter(|n| is_payment_input(doc, *n))
            })
            .and_then(|input| PaymentOptionRef::from_input(doc, input))
    }

    fn handle_choice(&mut self, doc: &mut Document, input: NodeId, source: SessionSource) {
        let Some(option) = PaymentOptionRef::from_input(doc, input) else {
            return;
        };
        let now = self.now();
        self.remember(&option, now);
        self.chosen_here = true;
        self.start_verification(doc, &option, source);
        self.schedule_debounce(now);
    }

    /// Record the provider in use, resetting grace bookkeeping and lifting
    /// suppression when it changed.
    fn track_provider(&mut self, provider: Provider, now: u64) {
        if self.age_provider != Some(provider) {
            if let Some(previous) = self.age_provider.replace(provider) {
                self.ages.reset(previous);
            }
            if self.suppression.is_some_and(|s| s.provider != provider) {
                debug!("suppression lifted, provider changed to {provider}");
                self.suppression = None;
            }
        }
        self.ages.age(provider, now);
    }

    /// The shopper moved to an option without a widget.
    fn release_provider(&mut self) {
        if let Some(previous) = self.age_provider.take() {
            debug!("grace bookkeeping for {previous} reset");
            self.ages.reset(previous);
        }
    }

    fn cancel_session(&mut self) {
        if let Some(old) = self.session.take() {
            self.timers.cancel_session(old.id);
            debug!("session {} for {} cancelled", old.id, old.option_id);
            self.emit(DetectorEvent::VerificationCancelled { session: old.id.0 });
        }
    }

    fn start_verification(&mut self, doc: &mut Document, option: &PaymentOptionRef, source: SessionSource) {
        if self.session.as_ref().is_some_and(|s| s.option_id == option.id) {
            debug!("{} already being verified", option.id);
            return;
        }
        self.cancel_session();
        let mut hold_warning = false;
        if self.state.phase == Phase::Blocked {
            hold_warning = self
                .snapshot
                .as_ref()
                .is_some_and(|s| s.payment_option_id == option.id);
            if !hold_warning {
                self.go_idle(doc);
            }
        }

        let now = self.now();
        let scopes = ScopeSet::resolve(doc, Some(option));
        let Some(provider) = classify(doc, option, &scopes, self.mode) else {
            debug!("{} needs no widget", option.id);
            self.release_provider();
            if self.state.phase != Phase::Idle {
                self.go_idle(doc);
            }
            return;
        };
        self.track_provider(provider, now);
        if is_ready(doc, provider, Some(option), &scopes) {
            debug!("{provider} widget already ready for {}", option.id);
            if self.state.phase != Phase::Idle {
                self.go_idle(doc);
            }
            return;
        }

        let timing = self.config.timing;
        let low = timing.first_check_min_ms.min(timing.first_check_max_ms);
        let high = timing.first_check_max_ms.max(timing.first_check_min_ms);
        let first_delay = self.rng.gen_range(low..=high);
        self.next_session += 1;
        let session = VerificationSession::new(
            SessionId(self.next_session),
            option.id.clone(),
            provider,
            now,
            first_delay,
            &timing,
            source,
        );
        let id = session.id;

        self.set_phase(Phase::Verifying, now, &format!("{provider} selected ({})", source.as_str()));
        self.state.provider = Some(provider);
        self.state.reason.clear();
        self.state.details.clear();
        self.state.path = None;
        self.state.message = provider.verifying_message();
        self.warning_held = hold_warning;
        Presentation::set_confirmation_disabled(doc, true, &self.state.message);
        if hold_warning {
            debug!("re-checking blocked {}, warning kept until the new verdict", option.id);
        } else if Presentation::is_verifying_visible(doc) {
            self.presentation
                .show_verifying(doc, &self.state.message, Some(option));
        } else {
            self.timers
                .schedule(now + timing.verifying_notice_delay_ms, TimerKind::VerifyingNotice(id));
        }
        self.timers.schedule(now + first_delay, TimerKind::Tick(id));
        debug!("session {id} verifying {provider} for {}, first check in {first_delay}ms", option.id);
        self.emit(DetectorEvent::VerificationStarted {
            session: id.0,
            option_id: option.id.clone(),
            provider,
        });
        self.session = Some(session);
    }

    fn fire(&mut self, doc: &mut Document, kind: TimerKind, now: u64) {
        match kind {
            TimerKind::Tick(id) => self.tick(doc, id, now),
            TimerKind::VerifyingNotice(id) => {
                let live = self.session.as_ref().filter(|s| s.id == id).map(|s| s.option_id.clone());
                if let (Some(option_id), Phase::Verifying) = (live, self.state.phase) {
                    let option = doc
                        .get_element_by_id(&option_id)
                        .and_then(|input| PaymentOptionRef::from_input(doc, input));
                    self.presentation
                        .show_verifying(doc, &self.state.message, option.as_ref());
                }
            }
            TimerKind::Debounce => {
                self.debounce = None;
                self.evaluate(doc, now);
            }
            TimerKind::Sweep { until } => {
                self.evaluate(doc, now);
                let next = now + self.config.timing.sweep_interval_ms.max(1);
                if next <= until {
                    self.timers.schedule(next, TimerKind::Sweep { until });
                }
            }
            TimerKind::Preselect { option_id } => {
                let still_checked = selected_input(doc).filter(|input| doc.id(*input) == Some(option_id.as_str()));
                if let Some(input) = still_checked {
                    self.handle_choice(doc, input, SessionSource::Init);
                }
            }
            TimerKind::CopiedLabel { label } => Presentation::set_copy_label(doc, &label),
        }
    }

    fn tick(&mut self, doc: &mut Document, id: SessionId, now: u64) {
        let Some(session) = self.session.clone().filter(|s| s.id == id) else {
            debug!("stale tick for session {id} dropped");
            return;
        };
        let option = doc
            .get_element_by_id(&session.option_id)
            .filter(|n| is_payment_input(doc, *n))
            .and_then(|n| PaymentOptionRef::from_input(doc, n));
        let Some(option) = option else {
            debug!("option {} left the page", session.option_id);
            self.go_idle(doc);
            return;
        };
        let scopes = ScopeSet::resolve(doc, Some(&option));
        let provider = classify(doc, &option, &scopes, self.mode).unwrap_or(session.provider);
        if provider != session.provider {
            debug!("session {id}: provider {} -> {provider}", session.provider);
            if let Some(live) = self.session.as_mut() {
                live.provider = provider;
            }
            self.track_provider(provider, now);
            self.state.provider = Some(provider);
            self.state.message = provider.verifying_message();
            if Presentation::is_verifying_visible(doc) {
                self.presentation
                    .show_verifying(doc, &self.state.message, Some(&option));
            }
        }

        if is_ready(doc, provider, Some(&option), &scopes) {
            info!("{provider} widget ready after {}ms", session.elapsed(now));
            self.emit(DetectorEvent::WidgetReady { provider });
            self.go_idle(doc);
            return;
        }
        if session.timed_out(now) {
            self.session = None;
            self.timers.cancel_session(id);
            let verdict = Verdict::timeout(doc, provider, "missing_after_timeout");
            self.block(doc, verdict);
            return;
        }
        self.timers
            .schedule(now + session.retry_interval_ms.max(1), TimerKind::Tick(id));
    }

    /// Re-evaluate the page: blank step rule, recovery, and re-verification
    /// of a selected widget that went missing.
    fn evaluate(&mut self, doc: &mut Document, now: u64) {
        let step = payment_step_root(doc);
        if step.is_some_and(|s| !doc.is_visible(s)) {
            if self.state.phase != Phase::Idle {
                debug!("payment step hidden");
                self.go_idle(doc);
            }
            return;
        }

        if self.mode == EnvironmentMode::PsCheckout {
            if let Some(step) = step {
                if options_blank(doc, step) {
                    if !(self.state.phase == Phase::Blocked && self.state.reason == BLANK_REASON) {
                        let verdict = Verdict {
                            provider: Provider::PsCheckout,
                            reason: BLANK_REASON.to_string(),
                            details: "no_visible_payment_option".to_string(),
                            path: VerdictPath::Blank,
                            extras: SnapshotExtras {
                                expected: "payment options".to_string(),
                                found: "none_visible".to_string(),
                                widget_ready: Some(false),
                                globals_present: Some(Provider::PsCheckout.globals_present(doc)),
                            },
                        };
                        self.block(doc, verdict);
                    }
                    return;
                }
                if self.state.phase == Phase::Blocked && self.state.path == Some(VerdictPath::Blank) {
                    info!("payment options visible again");
                    self.go_idle(doc);
                }
            }
        }

        let Some(option) = self.current_option(doc) else {
            return;
        };
        let scopes = ScopeSet::resolve(doc, Some(&option));
        let Some(provider) = classify(doc, &option, &scopes, self.mode) else {
            self.release_provider();
            if self.state.phase != Phase::Idle && self.state.path != Some(VerdictPath::Trap) {
                self.go_idle(doc);
            }
            return;
        };
        self.track_provider(provider, now);
        let ready = is_ready(doc, provider, Some(&option), &scopes);

        match self.state.phase {
            Phase::Verifying => {
                let own_session = self.session.as_ref().is_some_and(|s| s.option_id == option.id);
                if own_session && ready {
                    info!("{provider} widget ready");
                    self.emit(DetectorEvent::WidgetReady { provider });
                    self.go_idle(doc);
                }
            }
            Phase::Blocked => {
                if ready && self.state.provider == Some(provider) {
                    info!("{provider} widget recovered");
                    self.emit(DetectorEvent::WidgetReady { provider });
                    self.go_idle(doc);
                } else {
                    Presentation::set_confirmation_disabled(doc, true, &self.state.message);
                }
            }
            Phase::Idle => {
                if self.session.is_none() && !ready && self.may_reverify(doc, &option, provider) {
                    info!("{provider} widget missing for {}, verifying again", option.id);
                    self.start_verification(doc, &option, SessionSource::Reevaluation);
                }
            }
        }
    }

    /// Whether an idle re-evaluation may start a session for `option`: the
    /// shopper checked it or chose it on this page, no pre-selection check
    /// is pending, and a dismissed timeout verdict is not being re-raised.
    fn may_reverify(&self, doc: &Document, option: &PaymentOptionRef, provider: Provider) -> bool {
        let checked = selected_input(doc).is_some_and(|input| doc.id(input) == Some(option.id.as_str()));
        let chosen = self.chosen_here && self.last_choice.as_ref().is_some_and(|c| c.id == option.id);
        let preselect_pending = self
            .timers
            .pending()
            .any(|k| matches!(k, TimerKind::Preselect { .. }));
        let dismissed = self
            .suppression
            .is_some_and(|s| s.covers(provider, VerdictPath::Timeout));
        (checked || chosen) && !preselect_pending && !dismissed
    }

    fn block(&mut self, doc: &mut Document, verdict: Verdict) {
        let now = self.now();
        if self
            .suppression
            .is_some_and(|s| s.covers(verdict.provider, verdict.path))
        {
            debug!("{} suppressed after dismissal", verdict.reason);
            if self.state.phase != Phase::Idle {
                self.go_idle(doc);
            }
            self.emit(DetectorEvent::Suppressed {
                provider: verdict.provider,
                reason: verdict.reason,
            });
            return;
        }
        if self.state.phase == Phase::Blocked
            && self.state.provider == Some(verdict.provider)
            && self.state.reason == verdict.reason
        {
            return;
        }
        self.cancel_session();
        self.warning_held = false;

        let provider = verdict.provider;
        let message = provider.blocked_message(&self.config.messages);
        self.set_phase(Phase::Blocked, now, &verdict.reason);
        self.state.provider = Some(provider);
        self.state.reason.clone_from(&verdict.reason);
        self.state.details.clone_from(&verdict.details);
        self.state.message.clone_from(&message);
        self.state.path = Some(verdict.path);

        let option = self.current_option(doc);
        let snapshot = DiagnosticSnapshot::capture(
            provider,
            &verdict.reason,
            &verdict.details,
            verdict.extras,
            PageContext {
                url: doc.url(),
                ua: doc.user_agent(),
                payment_option_id: option.as_ref().map_or("", |o| o.id.as_str()),
                module_name: option.as_ref().map_or("", |o| o.module_name.as_str()),
                now_ms: now,
            },
        )
        .capped(MAX_REPORT_BYTES);
        if self.config.reporting_enabled() && !self.report_sent {
            self.reporter.report(&snapshot);
            self.report_sent = true;
            self.emit(DetectorEvent::DiagnosticReported {
                reason: verdict.reason.clone(),
            });
        }
        self.snapshot = Some(snapshot);

        let view = BlockedView {
            message: &message,
            provider,
            reason: &verdict.reason,
            details: &verdict.details,
        };
        self.presentation.show_blocked(doc, &view, option.as_ref());
        Presentation::set_confirmation_disabled(doc, true, &message);
        warn!("{provider} payment widget blocked: {} ({})", verdict.reason, verdict.details);
        self.emit(DetectorEvent::Blocked {
            provider,
            reason: verdict.reason,
        });
    }

    fn go_idle(&mut self, doc: &mut Document) {
        let now = self.now();
        self.cancel_session();
        let was = self.state.phase;
        self.state = DetectorState {
            last_change_at: self.state.last_change_at,
            ..DetectorState::default()
        };
        self.warning_held = false;
        self.presentation.hide_all(doc);
        Presentation::set_confirmation_disabled(doc, false, "");
        self.report_sent = false;
        if was != Phase::Idle {
            self.state.last_change_at = now;
            self.log_transition(was, Phase::Idle, "cleared");
            self.emit(DetectorEvent::Idle);
        }
    }

    /// Whether a trap for `provider` concerns the shopper's checkout.
    fn trap_relevant(&self, doc: &Document, provider: Provider) -> bool {
        let current = self.current_option(doc).and_then(|option| {
            let scopes = ScopeSet::resolve(doc, Some(&option));
            classify(doc, &option, &scopes, self.mode)
        });
        match current {
            Some(current) => current == provider,
            None => {
                self.mode == EnvironmentMode::Standalone && page_providers(doc) == [provider]
            }
        }
    }

    fn copy_diagnostic(&mut self, doc: &mut Document) -> bool {
        let Some(summary) = self.snapshot.as_ref().map(|s| s.summary.clone()) else {
            return false;
        };
        let copied = copy_with_fallback(
            self.clipboard.as_mut(),
            self.clipboard_fallback.as_mut(),
            &summary,
        );
        if copied {
            Presentation::set_copy_label(doc, COPIED_LABEL);
            self.timers
                .cancel_where(|k| matches!(k, TimerKind::CopiedLabel { .. }));
            let now = self.now();
            self.timers.schedule(
                now + self.config.timing.copied_label_ms,
                TimerKind::CopiedLabel {
                    label: COPY_LABEL.to_string(),
                },
            );
        }
        copied
    }
}
