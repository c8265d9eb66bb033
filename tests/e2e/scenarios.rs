//! Detector scenarios over simulated checkout pages.
//!
//! Every test drives a [`TestHarness`] on a [`ManualClock`], so timings
//! are exact: the first readiness check lands between 220 and 400 ms after
//! a selection, then every 250 ms until the 4.5 s timeout.
//!
//! [`ManualClock`]: payguard::ManualClock

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{CheckoutPage, OptionNodes, TestHarness, WorkingHooks};
use payguard::config::{DetectorConfig, DiagnosticEndpointConfig, MessageConfig};
use payguard::detector::{ClickOutcome, Phase, SessionId, SessionSource, SubmitDecision, TimerKind};
use payguard::presentation::{Presentation, BANNER_CLOSE_ID, INLINE_ID};
use payguard::{DetectorEvent, NodeId, Provider, TimingConfig, TrapSignal};
use proptest::prelude::*;

fn stripe_page() -> (CheckoutPage, OptionNodes) {
    let mut page = CheckoutPage::new();
    let stripe = page.add_option("stripe_official", "Pay by card");
    (page, stripe)
}

fn resource_error(url: &str) -> TrapSignal {
    TrapSignal::ResourceError {
        tag: "script".to_string(),
        url: url.to_string(),
    }
}

/// Drive a Stripe selection into the timeout verdict.
fn stripe_blocked() -> (TestHarness, OptionNodes) {
    let (page, stripe) = stripe_page();
    let mut harness = TestHarness::attach(page);
    harness.select(stripe);
    harness.advance(5_000);
    assert_eq!(harness.detector.phase(), Phase::Blocked);
    (harness, stripe)
}

/// A Stripe option whose card field never renders is blocked once the
/// timeout elapses, with the order button held back.
#[test]
fn test_stripe_timeout_blocks_confirmation() {
    let (page, stripe) = stripe_page();
    let mut harness = TestHarness::attach(page);
    harness.select(stripe);

    assert_eq!(harness.detector.phase(), Phase::Verifying);
    assert!(Presentation::is_confirmation_disabled(&harness.page.doc));

    harness.advance(4_400);
    assert_eq!(harness.detector.phase(), Phase::Verifying);
    assert!(Presentation::is_verifying_visible(&harness.page.doc));

    harness.advance(600);
    let state = harness.detector.state();
    assert_eq!(state.phase, Phase::Blocked);
    assert_eq!(state.provider, Some(Provider::Stripe));
    assert_eq!(state.reason, "stripe_timeout");
    assert_eq!(state.details, "widget_missing");
    assert!(harness.detector.session().is_none());

    let doc = &harness.page.doc;
    assert!(Presentation::is_confirmation_disabled(doc));
    assert!(Presentation::is_banner_visible(doc));
    assert_eq!(
        Presentation::inline_message(doc),
        Some(Provider::Stripe.blocked_message(&MessageConfig::default()))
    );

    let snapshot = harness.detector.snapshot().unwrap();
    assert_eq!(snapshot.status, "blocked");
    assert_eq!(snapshot.payment_option_id, "payment-option-1");
    assert_eq!(snapshot.module_name, "stripe_official");
    assert_eq!(snapshot.expected, "stripe");
    assert_eq!(snapshot.found, "missing_after_timeout");
    assert_eq!(snapshot.widget_ready, Some(false));
    assert_eq!(snapshot.globals_present, Some(false));
    assert!(snapshot.summary.contains("stripe_timeout"));
}

/// A widget that renders while verifying ends the session without a warning.
#[test]
fn test_late_widget_clears_verification() {
    let (page, stripe) = stripe_page();
    let mut harness = TestHarness::attach(page);
    harness.select(stripe);
    harness.advance(1_000);
    assert_eq!(harness.detector.phase(), Phase::Verifying);

    harness.page.mount_stripe(stripe);
    harness.mutated();
    harness.advance(300);

    assert_eq!(harness.detector.phase(), Phase::Idle);
    assert!(harness.detector.session().is_none());
    assert!(!Presentation::is_confirmation_disabled(&harness.page.doc));
    assert!(!Presentation::is_verifying_visible(&harness.page.doc));
    let events = harness.events();
    assert!(events.contains(&DetectorEvent::WidgetReady {
        provider: Provider::Stripe
    }));
    assert!(!events.iter().any(|e| matches!(e, DetectorEvent::Blocked { .. })));
}

/// Selecting an option whose widget is already there never verifies.
#[test]
fn test_ready_widget_on_selection_stays_idle() {
    let (mut page, stripe) = stripe_page();
    page.mount_stripe(stripe);
    let mut harness = TestHarness::attach(page);
    harness.select(stripe);
    harness.advance(6_000);

    assert_eq!(harness.detector.phase(), Phase::Idle);
    assert!(!Presentation::is_confirmation_disabled(&harness.page.doc));
    assert!(!harness
        .events()
        .iter()
        .any(|e| matches!(e, DetectorEvent::VerificationStarted { .. })));
}

/// A classic PayPal redirect form does not need the SDK and is left alone.
#[test]
fn test_paypal_redirect_integration_stays_idle() {
    let mut page = CheckoutPage::new();
    let paypal = page.add_option("paypal", "PayPal");
    let form = page.doc.append_element(
        paypal.additional,
        "form",
        &[("action", "https://www.paypal.com/cgi-bin/webscr"), ("method", "post")],
    );
    page.doc.append_element(form, "button", &[("type", "submit")]);

    let mut harness = TestHarness::attach(page);
    harness.select(paypal);
    harness.advance(6_000);

    assert_eq!(harness.detector.phase(), Phase::Idle);
    assert!(harness.detector.snapshot().is_none());
    assert!(!Presentation::is_confirmation_disabled(&harness.page.doc));
}

/// A failed Revolut script load blocks immediately, without waiting for the timeout.
#[test]
fn test_revolut_resource_error_blocks_immediately() {
    let mut page = CheckoutPage::new();
    page.add_option("stripe_official", "Card");
    let revolut = page.add_option("revolut", "Revolut Pay");
    page.add_script("https://merchant.revolut.com/embed.js");
    let mut harness = TestHarness::attach(page);
    harness.select(revolut);
    harness.advance(100);

    let url = "https://merchant.revolut.com/embed.js";
    harness.detector.on_trap(&mut harness.page.doc, &resource_error(url));

    let state = harness.detector.state();
    assert_eq!(state.phase, Phase::Blocked);
    assert_eq!(state.reason, "revolut_resource_blocked");
    assert_eq!(state.details, url);
    assert!(harness.detector.session().is_none());
    assert!(!harness
        .detector
        .pending_timers()
        .any(|k| matches!(k, TimerKind::Tick(_))));
    assert_eq!(harness.detector.snapshot().unwrap().found, "revolut_resource_blocked");
}

/// Evidence about a provider the shopper is not using is ignored.
#[test]
fn test_trap_for_unselected_provider_is_ignored() {
    let (page, stripe) = stripe_page();
    let mut harness = TestHarness::attach(page);
    harness.select(stripe);

    let signal = resource_error("https://www.paypal.com/sdk/js?client-id=abc");
    harness.detector.on_trap(&mut harness.page.doc, &signal);
    assert_eq!(harness.detector.phase(), Phase::Verifying);

    let runtime = TrapSignal::RuntimeError {
        message: "ReferenceError: RevolutCheckout is not defined".to_string(),
    };
    harness.detector.on_trap(&mut harness.page.doc, &runtime);
    assert_eq!(harness.detector.phase(), Phase::Verifying);

    let runtime = TrapSignal::RuntimeError {
        message: "ReferenceError: Stripe is not defined".to_string(),
    };
    harness.detector.on_trap(&mut harness.page.doc, &runtime);
    assert_eq!(harness.detector.state().reason, "stripe_runtime_error");
}

/// Switching options cancels the previous session and its pending work.
#[test]
fn test_switching_options_cancels_previous_session() {
    let mut page = CheckoutPage::new();
    let stripe = page.add_option("stripe_official", "Card");
    let revolut = page.add_option("revolut", "Revolut Pay");
    let mut harness = TestHarness::attach(page);

    harness.select(stripe);
    harness.advance(300);
    harness.select(revolut);

    let session = harness.detector.session().unwrap();
    assert_eq!(session.id, SessionId(2));
    assert_eq!(session.option_id, "payment-option-2");
    assert_eq!(session.provider, Provider::Revolut);
    assert!(harness
        .detector
        .pending_timers()
        .all(|k| k.session().map_or(true, |id| id == SessionId(2))));

    let events = harness.events();
    let cancelled = events
        .iter()
        .position(|e| *e == DetectorEvent::VerificationCancelled { session: 1 })
        .unwrap();
    let restarted = events
        .iter()
        .position(|e| {
            *e == DetectorEvent::VerificationStarted {
                session: 2,
                option_id: "payment-option-2".to_string(),
                provider: Provider::Revolut,
            }
        })
        .unwrap();
    assert!(cancelled < restarted);

    // The Stripe notice (due at 700 ms) was cancelled; Revolut's is due at 1000 ms.
    harness.advance_to(900);
    assert!(!Presentation::is_verifying_visible(&harness.page.doc));
    harness.advance_to(1_000);
    assert!(Presentation::is_verifying_visible(&harness.page.doc));
    assert_eq!(
        Presentation::inline_message(&harness.page.doc),
        Some(Provider::Revolut.verifying_message())
    );
}

/// Re-selecting the option under verification keeps the live session.
#[test]
fn test_repeated_selection_keeps_session() {
    let (page, stripe) = stripe_page();
    let mut harness = TestHarness::attach(page);
    harness.detector.on_pointer_down(&mut harness.page.doc, stripe.input);
    harness.advance(50);
    assert_eq!(
        harness.detector.on_click(&mut harness.page.doc, stripe.input),
        ClickOutcome::Ignored
    );
    harness.advance(400);
    harness.select(stripe);

    let session = harness.detector.session().unwrap();
    assert_eq!(session.id, SessionId(1));
    assert_eq!(session.source, SessionSource::PointerDown);
}

/// A dismissed timeout warning stays away for the same provider and path,
/// while new evidence of another kind still surfaces.
#[test]
fn test_dismissal_suppresses_same_verdict() {
    let (mut harness, _) = stripe_blocked();
    let close = harness.page.doc.get_element_by_id(BANNER_CLOSE_ID).unwrap();
    assert_eq!(
        harness.detector.on_click(&mut harness.page.doc, close),
        ClickOutcome::Dismissed
    );
    assert_eq!(harness.detector.phase(), Phase::Idle);
    assert!(!Presentation::is_banner_visible(&harness.page.doc));
    assert!(!Presentation::is_confirmation_disabled(&harness.page.doc));

    harness.advance(3_000);
    assert_eq!(harness.detector.phase(), Phase::Idle);
    let events = harness.events();
    assert!(events.contains(&DetectorEvent::Dismissed {
        provider: Provider::Stripe
    }));
    assert!(events.contains(&DetectorEvent::Suppressed {
        provider: Provider::Stripe,
        reason: "stripe_timeout".to_string(),
    }));

    let signal = resource_error("https://js.stripe.com/v3/");
    harness.detector.on_trap(&mut harness.page.doc, &signal);
    assert_eq!(harness.detector.phase(), Phase::Blocked);
    assert_eq!(harness.detector.state().reason, "stripe_resource_blocked");
}

/// Remove the Stripe card element that holds `iframe`.
fn unmount_stripe(harness: &mut TestHarness, iframe: NodeId) {
    let element = harness.page.doc.parent(iframe).unwrap();
    assert!(harness.page.doc.remove(element));
    harness.mutated();
}

/// A theme that re-renders the card field re-verifies the selected option
/// instead of flagging it, and the remounted field ends the check quietly.
#[test]
fn test_remounted_widget_is_reverified() {
    let (mut page, stripe) = stripe_page();
    let iframe = page.mount_stripe(stripe);
    let mut harness = TestHarness::attach(page);
    harness.select(stripe);
    harness.advance(20_000);
    assert_eq!(harness.detector.phase(), Phase::Idle);
    harness.events();

    unmount_stripe(&mut harness, iframe);
    harness.advance(300);
    assert_eq!(harness.detector.phase(), Phase::Verifying);
    let session = harness.detector.session().unwrap();
    assert_eq!(session.source, SessionSource::Reevaluation);
    assert_eq!(session.option_id, "payment-option-1");
    assert!(Presentation::is_confirmation_disabled(&harness.page.doc));

    harness.advance(1_000);
    harness.page.mount_stripe(stripe);
    harness.mutated();
    harness.advance(300);

    assert_eq!(harness.detector.phase(), Phase::Idle);
    assert!(!Presentation::is_confirmation_disabled(&harness.page.doc));
    let events = harness.events();
    assert!(events.iter().any(|e| matches!(e, DetectorEvent::VerificationStarted { .. })));
    assert!(events.contains(&DetectorEvent::WidgetReady {
        provider: Provider::Stripe
    }));
    assert!(!events.iter().any(|e| matches!(e, DetectorEvent::Blocked { .. })));
}

/// A widget that stays gone is blocked once the grace period runs out.
#[test]
fn test_missing_widget_blocks_after_grace_period() {
    let config = DetectorConfig {
        timing: TimingConfig {
            grace_period_ms: 8_000,
            ..TimingConfig::default()
        },
        ..DetectorConfig::default()
    };
    let (mut page, stripe) = stripe_page();
    let iframe = page.mount_stripe(stripe);
    let mut harness = TestHarness::attach_with(page, config, &mut payguard::traps::NoNetworkHooks);
    harness.select(stripe);
    harness.advance(2_000);

    unmount_stripe(&mut harness, iframe);
    harness.advance(300);
    assert_eq!(harness.detector.phase(), Phase::Verifying);

    harness.advance(7_000);
    assert_eq!(harness.detector.phase(), Phase::Verifying);
    harness.advance(1_500);
    let state = harness.detector.state();
    assert_eq!(state.phase, Phase::Blocked);
    assert_eq!(state.reason, "stripe_timeout");
    assert_eq!(harness.detector.snapshot().unwrap().found, "missing_after_timeout");
}

/// A choice restored from an earlier page view is not re-verified unless
/// the shopper picks it again.
#[test]
fn test_restored_choice_is_not_reverified() {
    let (page, _) = stripe_page();
    let stored = r#"{"id":"payment-option-1","module_name":"stripe_official"}"#;
    let mut harness = TestHarness::attach_custom(
        page,
        DetectorConfig::default(),
        &mut payguard::traps::NoNetworkHooks,
        |mut detector| {
            assert!(detector.restore_last_choice(stored));
            detector
        },
    );
    harness.mutated();
    harness.advance(10_000);

    assert_eq!(harness.detector.phase(), Phase::Idle);
    assert!(harness.detector.session().is_none());
    assert!(!harness
        .events()
        .iter()
        .any(|e| matches!(e, DetectorEvent::VerificationStarted { .. })));
}

/// In aggregator mode a step whose options are all hidden is blank, but a
/// step without option markup is still loading.
#[test]
fn test_blank_payment_step_in_aggregator_mode() {
    let mut page = CheckoutPage::new();
    let paypal = page.add_option("ps_checkout-paypal", "PayPal");
    let card = page.add_option("ps_checkout-card", "Card");
    let mut harness = TestHarness::attach(page);
    harness.advance(300);
    assert_eq!(harness.detector.phase(), Phase::Idle);

    for option in [paypal, card] {
        harness.page.doc.set_style(option.container, "display", "none");
    }
    harness.mutated();
    harness.advance(300);

    let state = harness.detector.state();
    assert_eq!(state.phase, Phase::Blocked);
    assert_eq!(state.provider, Some(Provider::PsCheckout));
    assert_eq!(state.reason, "payment_options_blank");
    assert_eq!(
        Presentation::inline_message(&harness.page.doc),
        Some(Provider::PsCheckout.blocked_message(&MessageConfig::default()))
    );

    for option in [paypal, card] {
        harness.page.doc.set_style(option.container, "display", "block");
    }
    harness.mutated();
    harness.advance(300);
    assert_eq!(harness.detector.phase(), Phase::Idle);

    for option in [paypal, card] {
        harness.page.doc.detach(option.container);
    }
    harness.mutated();
    harness.advance(2_000);
    assert_eq!(harness.detector.phase(), Phase::Idle);
}

/// Outside aggregator mode hidden options are not a verdict.
#[test]
fn test_hidden_options_ignored_in_standalone_mode() {
    let (page, stripe) = stripe_page();
    let mut harness = TestHarness::attach(page);
    harness.page.doc.set_style(stripe.container, "display", "none");
    harness.mutated();
    harness.advance(2_000);
    assert_eq!(harness.detector.phase(), Phase::Idle);
}

/// Hiding the payment step abandons any verification.
#[test]
fn test_hidden_payment_step_goes_idle() {
    let (page, stripe) = stripe_page();
    let mut harness = TestHarness::attach(page);
    harness.select(stripe);
    harness.advance(500);

    let step = harness.page.step;
    harness.page.doc.set_style(step, "display", "none");
    harness.mutated();
    harness.advance(300);

    assert_eq!(harness.detector.phase(), Phase::Idle);
    assert!(harness.detector.session().is_none());
}

/// Submissions are held back while blocked and released after recovery.
#[test]
fn test_submit_guard_follows_recovery() {
    let (mut harness, stripe) = stripe_blocked();
    assert_eq!(
        harness.detector.on_submit(&mut harness.page.doc),
        SubmitDecision::Prevent {
            scroll_to: Some(INLINE_ID)
        }
    );

    harness.page.mount_stripe(stripe);
    harness.mutated();
    harness.advance(300);

    assert_eq!(harness.detector.phase(), Phase::Idle);
    assert_eq!(harness.detector.on_submit(&mut harness.page.doc), SubmitDecision::Allow);
    assert!(!Presentation::is_confirmation_disabled(&harness.page.doc));
    let confirm = harness.page.confirm;
    assert!(!harness.page.doc.has_attr(confirm, "disabled"));
}

/// An option checked before the detector attached is verified after a delay.
#[test]
fn test_preselected_option_is_verified_after_delay() {
    let (mut page, stripe) = stripe_page();
    page.check(stripe);
    let mut harness = TestHarness::attach(page);

    harness.advance(400);
    assert!(harness.detector.session().is_none());
    harness.advance_to(500);
    let session = harness.detector.session().unwrap();
    assert_eq!(session.source, SessionSource::Init);
    assert_eq!(session.option_id, "payment-option-1");
}

/// Themes that swallow the radio click still get verified through the label,
/// and traps use the remembered choice.
#[test]
fn test_label_click_without_checked_radio() {
    let (page, stripe) = stripe_page();
    let mut harness = TestHarness::attach(page);

    let label = stripe.label;
    assert_eq!(
        harness.detector.on_click(&mut harness.page.doc, label),
        ClickOutcome::Choice
    );
    assert_eq!(harness.detector.phase(), Phase::Verifying);
    assert_eq!(harness.detector.last_choice().unwrap().id, "payment-option-1");

    let signal = resource_error("https://js.stripe.com/v3/");
    harness.detector.on_trap(&mut harness.page.doc, &signal);
    assert_eq!(harness.detector.state().reason, "stripe_resource_blocked");
    assert_eq!(
        harness.detector.snapshot().unwrap().payment_option_id,
        "payment-option-1"
    );
}

/// With nothing selected, network evidence counts only when one provider is on the page.
#[test]
fn test_sole_page_provider_fetch_trap() {
    let signal = TrapSignal::FetchFailed {
        url: "https://api.stripe.com/v1/tokens".to_string(),
    };

    let mut page = CheckoutPage::new();
    page.add_script("https://js.stripe.com/v3/");
    let mut harness = TestHarness::attach_with(page, DetectorConfig::default(), &mut WorkingHooks);
    harness.detector.on_trap(&mut harness.page.doc, &signal);
    assert_eq!(harness.detector.state().reason, "stripe_fetch_blocked");

    // Without a fetch hook the signal cannot be trusted.
    let mut page = CheckoutPage::new();
    page.add_script("https://js.stripe.com/v3/");
    let mut harness = TestHarness::attach(page);
    harness.detector.on_trap(&mut harness.page.doc, &signal);
    assert_eq!(harness.detector.phase(), Phase::Idle);

    // Two candidate providers: ambiguous.
    let mut page = CheckoutPage::new();
    page.add_script("https://js.stripe.com/v3/");
    page.add_script("https://www.paypal.com/sdk/js?client-id=abc");
    let mut harness = TestHarness::attach_with(page, DetectorConfig::default(), &mut WorkingHooks);
    harness.detector.on_trap(&mut harness.page.doc, &signal);
    assert_eq!(harness.detector.phase(), Phase::Idle);
}

/// One report per blocked episode, a new one after recovery.
#[test]
fn test_report_sent_once_per_episode() {
    let config = DetectorConfig {
        debug: true,
        diagnostic: DiagnosticEndpointConfig {
            endpoint_url: Some("https://collector.example/diagnostic".to_string()),
            token: Some("secret".to_string()),
        },
        ..DetectorConfig::default()
    };
    let mut page = CheckoutPage::new();
    let stripe = page.add_option("stripe_official", "Card");
    let revolut = page.add_option("revolut", "Revolut Pay");
    let mut harness = TestHarness::attach_with(page, config, &mut payguard::traps::NoNetworkHooks);

    harness.select(stripe);
    harness.advance(5_000);
    assert!(harness.detector.report_sent());
    let signal = resource_error("https://js.stripe.com/v3/");
    harness.detector.on_trap(&mut harness.page.doc, &signal);
    assert_eq!(harness.detector.state().reason, "stripe_resource_blocked");
    assert_eq!(harness.reporter.reasons(), vec!["stripe_timeout"]);

    harness.page.mount_stripe(stripe);
    harness.mutated();
    harness.advance(300);
    assert_eq!(harness.detector.phase(), Phase::Idle);
    assert!(!harness.detector.report_sent());

    harness.select(revolut);
    harness.advance(5_000);
    assert_eq!(harness.reporter.reasons(), vec!["stripe_timeout", "revolut_timeout"]);
}

/// Without debug mode nothing is reported.
#[test]
fn test_no_report_without_debug() {
    let (harness, _) = stripe_blocked();
    assert!(harness.reporter.reasons().is_empty());
    assert!(!harness.detector.report_sent());
}

#[derive(Debug, Clone)]
enum Op {
    Select(usize),
    Advance(u64),
    Mount(usize),
    Unmount(usize),
    Trap(usize),
    Dismiss,
    Submit,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..4usize).prop_map(Op::Select),
        (0..2_000u64).prop_map(Op::Advance),
        (0..3usize).prop_map(Op::Mount),
        (0..3usize).prop_map(Op::Unmount),
        (0..3usize).prop_map(Op::Trap),
        Just(Op::Dismiss),
        Just(Op::Submit),
    ]
}

const TRAP_URLS: [&str; 3] = [
    "https://js.stripe.com/v3/",
    "https://merchant.revolut.com/embed.js",
    "https://www.paypal.com/sdk/js?client-id=abc",
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever the shopper does, the detector keeps its state coherent and
    /// never reports a timeout it did not verify first.
    #[test]
    fn test_state_invariants_hold(ops in prop::collection::vec(op(), 1..24)) {
        let mut page = CheckoutPage::new();
        page.add_script("https://www.paypal.com/sdk/js?client-id=abc");
        let options = [
            page.add_option("stripe_official", "Card"),
            page.add_option("revolut", "Revolut Pay"),
            page.add_option("paypal", "PayPal"),
            page.add_option("ps_checkpayment", "Pay by cheque"),
        ];
        let mut harness = TestHarness::attach(page);
        let mut verifying = false;

        for op in ops {
            match op {
                Op::Select(i) => harness.select(options[i]),
                Op::Advance(ms) => harness.advance(ms),
                Op::Mount(i) => {
                    let option = options[i];
                    match i {
                        0 => { harness.page.mount_stripe(option); }
                        1 => { harness.page.mount_revolut(option); }
                        _ => {
                            harness.page.doc.append_element(
                                option.additional,
                                "iframe",
                                &[("name", "__zoid__paypal_buttons__abc")],
                            );
                        }
                    }
                    harness.mutated();
                }
                Op::Unmount(i) => {
                    let panel = options[i].additional;
                    for child in harness.page.doc.children(panel).to_vec() {
                        prop_assert!(harness.page.doc.remove(child));
                    }
                    harness.mutated();
                }
                Op::Trap(i) => harness.detector.on_trap(&mut harness.page.doc, &resource_error(TRAP_URLS[i])),
                Op::Dismiss => harness.detector.dismiss(&mut harness.page.doc),
                Op::Submit => {
                    let decision = harness.detector.on_submit(&mut harness.page.doc);
                    let held = harness.detector.phase() != Phase::Idle;
                    prop_assert_eq!(decision != SubmitDecision::Allow, held);
                }
            }

            for event in harness.events() {
                match event {
                    DetectorEvent::VerificationStarted { .. } => verifying = true,
                    DetectorEvent::Idle => verifying = false,
                    DetectorEvent::Blocked { reason, .. } => {
                        if reason.ends_with("_timeout") {
                            prop_assert!(verifying, "{} without verification", reason);
                        }
                        verifying = false;
                    }
                    _ => {}
                }
            }

            let detector = &harness.detector;
            let doc = &harness.page.doc;
            let live = detector.session().map(|s| s.id);
            prop_assert_eq!(live.is_some(), detector.phase() == Phase::Verifying);
            prop_assert!(detector
                .pending_timers()
                .all(|k| k.session().map_or(true, |id| Some(id) == live)));
            match detector.phase() {
                Phase::Idle => {
                    prop_assert!(!Presentation::is_confirmation_disabled(doc));
                    prop_assert!(!Presentation::is_banner_visible(doc));
                    prop_assert!(!Presentation::is_inline_visible(doc));
                }
                Phase::Verifying => prop_assert!(Presentation::is_confirmation_disabled(doc)),
                Phase::Blocked => {
                    prop_assert!(Presentation::is_confirmation_disabled(doc));
                    prop_assert!(detector.snapshot().is_some());
                    prop_assert!(Presentation::is_banner_visible(doc));
                }
            }
        }
    }
}
