//! Checkout page harness for end-to-end detector tests.
//!
//! `CheckoutPage` builds checkout documents the way storefront themes lay
//! them out; `TestHarness` drives a `Detector` over such a page with a
//! `ManualClock`, firing timers at their exact due times.

use parking_lot::Mutex;
use payguard::config::{DetectorConfig, PageKind};
use payguard::detector::Detector;
use payguard::diagnostic::{DiagnosticReporter, DiagnosticSnapshot};
use payguard::dom::{Document, NodeId};
use payguard::event::{DetectorEvent, DetectorEventsChannel};
use payguard::traps::{NetworkHooks, NoNetworkHooks};
use payguard::ManualClock;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;

/// Start of simulated time.
pub const START_MS: u64 = 1_700_000_000_000;

/// One payment option of a checkout page.
#[derive(Debug, Clone, Copy)]
pub struct OptionNodes {
    /// The radio.
    pub input: NodeId,
    /// `<id>-container`.
    pub container: NodeId,
    /// `<id>-additional-information`.
    pub additional: NodeId,
    /// Its `label[for]`.
    pub label: NodeId,
}

/// A checkout document under construction.
pub struct CheckoutPage {
    /// The document.
    pub doc: Document,
    /// Payment step root.
    pub step: NodeId,
    /// Order confirmation button.
    pub confirm: NodeId,
    options: Vec<OptionNodes>,
}

impl CheckoutPage {
    /// An empty payment step with a confirmation button.
    pub fn new() -> Self {
        let mut doc = Document::new();
        doc.set_url("https://shop.example/en/order");
        doc.set_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0");
        let body = doc.body();
        let step = doc.append_element(body, "section", &[("id", "checkout-payment-step")]);
        let wrapper = doc.append_element(body, "div", &[("id", "payment-confirmation")]);
        let confirm = doc.append_element(wrapper, "button", &[("type", "submit"), ("class", "btn btn-primary")]);
        Self {
            doc,
            step,
            confirm,
            options: Vec::new(),
        }
    }

    /// Add `payment-option-<n>` with its companion elements.
    pub fn add_option(&mut self, module: &str, label: &str) -> OptionNodes {
        let id = format!("payment-option-{}", self.options.len() + 1);
        let container = self.doc.append_element(
            self.step,
            "div",
            &[("id", format!("{id}-container").as_str()), ("class", "payment-option")],
        );
        let input = self.doc.append_element(
            container,
            "input",
            &[
                ("type", "radio"),
                ("name", "payment-option"),
                ("id", id.as_str()),
                ("data-module-name", module),
            ],
        );
        let label_node = self.doc.append_element(container, "label", &[("for", id.as_str())]);
        self.doc.set_text(label_node, label);
        let additional = self.doc.append_element(
            self.step,
            "div",
            &[("id", format!("{id}-additional-information").as_str())],
        );
        let nodes = OptionNodes {
            input,
            container,
            additional,
            label: label_node,
        };
        self.options.push(nodes);
        nodes
    }

    /// Check one radio and uncheck the others.
    pub fn check(&mut self, option: OptionNodes) {
        for other in &self.options {
            self.doc.remove_attr(other.input, "checked");
        }
        self.doc.set_attr(option.input, "checked", "checked");
    }

    /// Add a script to the document head.
    pub fn add_script(&mut self, src: &str) -> NodeId {
        let head = self.doc.head();
        self.doc.append_element(head, "script", &[("src", src)])
    }

    /// Render a Stripe card element into the option's panel.
    pub fn mount_stripe(&mut self, option: OptionNodes) -> NodeId {
        let element = self
            .doc
            .append_element(option.additional, "div", &[("class", "StripeElement")]);
        self.doc.append_element(
            element,
            "iframe",
            &[("name", "__privateStripeFrame1"), ("src", "https://js.stripe.com/v3/elements-inner-card.html")],
        )
    }

    /// Render the Revolut card field into the option's panel.
    pub fn mount_revolut(&mut self, option: OptionNodes) -> NodeId {
        let host = self
            .doc
            .append_element(option.additional, "div", &[("id", "revolut_card")]);
        self.doc
            .append_element(host, "iframe", &[("src", "https://merchant.revolut.com/embed/card")])
    }
}

/// Reporter that records every snapshot it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<DiagnosticSnapshot>>>,
}

impl RecordingReporter {
    /// Reasons of the recorded reports, in order.
    pub fn reasons(&self) -> Vec<String> {
        self.reports.lock().iter().map(|s| s.reason.clone()).collect()
    }
}

impl DiagnosticReporter for RecordingReporter {
    fn report(&self, snapshot: &DiagnosticSnapshot) {
        self.reports.lock().push(snapshot.clone());
    }
}

/// Hooks that patch fetch and XHR successfully.
#[derive(Debug, Default)]
pub struct WorkingHooks;

impl NetworkHooks for WorkingHooks {
    fn patch_fetch(&mut self) -> payguard::Result<()> {
        Ok(())
    }

    fn patch_xhr(&mut self) -> payguard::Result<()> {
        Ok(())
    }
}

/// A detector attached to a checkout page.
pub struct TestHarness {
    /// The page.
    pub page: CheckoutPage,
    /// Simulated time.
    pub clock: ManualClock,
    /// The detector under test.
    pub detector: Detector,
    /// Reports the detector sent.
    pub reporter: RecordingReporter,
    events: DetectorEventsChannel,
}

impl TestHarness {
    /// Attach a default-configured detector without network hooks.
    pub fn attach(page: CheckoutPage) -> Self {
        Self::attach_with(page, DetectorConfig::default(), &mut NoNetworkHooks)
    }

    /// Attach a detector with the given configuration and hooks.
    pub fn attach_with(page: CheckoutPage, config: DetectorConfig, hooks: &mut dyn NetworkHooks) -> Self {
        Self::attach_custom(page, config, hooks, |detector| detector)
    }

    /// Attach a detector after letting `customize` adjust it.
    pub fn attach_custom(
        mut page: CheckoutPage,
        config: DetectorConfig,
        hooks: &mut dyn NetworkHooks,
        customize: impl FnOnce(Detector) -> Detector,
    ) -> Self {
        let clock = ManualClock::new(START_MS);
        let reporter = RecordingReporter::default();
        let detector = Detector::new(config)
            .with_clock(Arc::new(clock.clone()))
            .with_reporter(Box::new(reporter.clone()))
            .with_seed(42);
        let mut detector = customize(detector);
        let events = detector.subscribe();
        detector.attach(&mut page.doc, PageKind::Checkout, hooks);
        Self {
            page,
            clock,
            detector,
            reporter,
            events,
        }
    }

    /// Milliseconds since the harness started.
    pub fn elapsed(&self) -> u64 {
        use payguard::Clock;
        self.clock.now_ms() - START_MS
    }

    /// Move time forward by `ms`, firing every timer at its due time.
    pub fn advance(&mut self, ms: u64) {
        use payguard::Clock;
        let target = self.clock.now_ms() + ms;
        while let Some(due) = self.detector.next_timer_due().filter(|due| *due <= target) {
            if due > self.clock.now_ms() {
                self.clock.set(due);
            }
            self.detector.run_due_timers(&mut self.page.doc);
        }
        self.clock.set(target);
    }

    /// Move time forward to `ms` after the harness started.
    pub fn advance_to(&mut self, ms: u64) {
        let elapsed = self.elapsed();
        self.advance(ms.saturating_sub(elapsed));
    }

    /// Check an option and deliver its `change` event.
    pub fn select(&mut self, option: OptionNodes) {
        self.page.check(option);
        self.detector.on_change(&mut self.page.doc, option.input);
    }

    /// Tell the detector the document changed.
    pub fn mutated(&mut self) {
        self.detector.on_mutation(&self.page.doc);
    }

    /// Events emitted since the last call.
    pub fn events(&mut self) -> Vec<DetectorEvent> {
        let mut seen = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => seen.push(event),
                Err(TryRecvError::Lagged(_)) => {}
                Err(_) => return seen,
            }
        }
    }
}
