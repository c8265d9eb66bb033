//! Payment options, their scopes, and payment-step structure.
//!
//! A payment option is a radio `input[name="payment-option"]`. The checkout
//! markup gives each option companion elements by id convention:
//! `<id>-container`, `pay-with-<id>-form` and `<id>-additional-information`.
//! Provider and readiness lookups run over these subtrees only.

use crate::dom::{Document, NodeId};
use serde::{Deserialize, Serialize};

/// Selector of every payment-option radio.
pub const PAYMENT_OPTION_INPUT: &str = r#"input[name="payment-option"]"#;

/// Candidate payment step roots, first match wins.
const STEP_ROOTS: [&str; 4] = [
    "#checkout-payment-step",
    "#payment",
    ".checkout-step.-payment",
    r#".checkout-step[data-step="payment"]"#,
];

/// Reference to a payment option radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOptionRef {
    /// DOM id of the radio.
    pub id: String,
    /// Opaque `data-module-name` supplied by the checkout markup.
    pub module_name: String,
}

impl PaymentOptionRef {
    /// Build a reference from a radio element. Radios without an id are ignored.
    #[must_use]
    pub fn from_input(doc: &Document, input: NodeId) -> Option<Self> {
        let id = doc.id(input)?.to_string();
        Some(Self {
            id,
            module_name: doc.attr(input, "data-module-name").unwrap_or_default().to_string(),
        })
    }

    /// Lowercased module name.
    #[must_use]
    pub fn module_name_lower(&self) -> String {
        self.module_name.to_lowercase()
    }

    /// The radio element, when it is still a payment option in the document.
    #[must_use]
    pub fn input(&self, doc: &Document) -> Option<NodeId> {
        doc.get_element_by_id(&self.id)
            .filter(|node| is_payment_input(doc, *node))
    }
}

/// The option the shopper last interacted with.
///
/// Used when a theme intercepts the click and the radio is not checked yet.
/// Hosts may persist it (e.g. in session storage) as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastChoice {
    /// DOM id of the radio.
    pub id: String,
    /// Module name at the time of the choice.
    #[serde(default)]
    pub module_name: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub ts: u64,
}

impl LastChoice {
    /// Serialise for host storage.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serialization`] if encoding fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore from host storage. Malformed or id-less input yields `None`.
    #[must_use]
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str::<Self>(raw)
            .ok()
            .filter(|choice| !choice.id.is_empty())
    }
}

/// Subtrees belonging to one payment option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSet {
    /// Payment step root, if the page has one.
    pub step: Option<NodeId>,
    /// `<id>-container`.
    pub container: Option<NodeId>,
    /// `pay-with-<id>-form`.
    pub form: Option<NodeId>,
    /// `<id>-additional-information`.
    pub additional: Option<NodeId>,
    scopes: Vec<NodeId>,
}

impl ScopeSet {
    /// Resolve the scopes of an option. Without an option, or when no
    /// companion element exists, the step root (then the body) is the scope.
    #[must_use]
    pub fn resolve(doc: &Document, option: Option<&PaymentOptionRef>) -> Self {
        let step = payment_step_root(doc);
        let fallback = step.unwrap_or_else(|| doc.body());
        let Some(option) = option else {
            return Self {
                step,
                container: None,
                form: None,
                additional: None,
                scopes: vec![fallback],
            };
        };
        let container = doc.get_element_by_id(&format!("{}-container", option.id));
        let form = doc.get_element_by_id(&format!("pay-with-{}-form", option.id));
        let additional = doc.get_element_by_id(&format!("{}-additional-information", option.id));
        let mut scopes: Vec<NodeId> = [container, form, additional].into_iter().flatten().collect();
        if scopes.is_empty() {
            scopes.push(fallback);
        }
        Self {
            step,
            container,
            form,
            additional,
            scopes,
        }
    }

    /// Scope roots in order.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.scopes
    }

    /// First resolved companion element, else the fallback scope.
    #[must_use]
    pub fn primary(&self) -> NodeId {
        self.scopes[0]
    }

    /// Whether any scope contains an element matching `selector`.
    #[must_use]
    pub fn contains(&self, doc: &Document, selector: &str) -> bool {
        self.scopes
            .iter()
            .any(|scope| doc.query_selector(*scope, selector).is_some())
    }

    /// Whether any scope contains a visible element matching `selector`.
    #[must_use]
    pub fn contains_visible(&self, doc: &Document, selector: &str) -> bool {
        self.scopes.iter().any(|scope| doc.has_visible(*scope, selector))
    }
}

/// The payment step root element.
#[must_use]
pub fn payment_step_root(doc: &Document) -> Option<NodeId> {
    STEP_ROOTS.iter().find_map(|sel| doc.query_document(sel))
}

/// Whether `node` is a payment-option radio.
#[must_use]
pub fn is_payment_input(doc: &Document, node: NodeId) -> bool {
    doc.tag_name(node) == "input" && doc.attr(node, "name") == Some("payment-option")
}

/// The checked payment-option radio.
#[must_use]
pub fn selected_input(doc: &Document) -> Option<NodeId> {
    doc.query_document(r#"input[name="payment-option"]:checked"#)
}

/// The visual container of an option radio.
#[must_use]
pub fn option_container(doc: &Document, input: NodeId) -> Option<NodeId> {
    doc.id(input)
        .and_then(|id| doc.get_element_by_id(&format!("{id}-container")))
        .or_else(|| doc.closest(input, ".payment-option"))
}

/// Resolve the payment-option radio an interaction target belongs to.
///
/// Themes bind handlers on the radio itself, on its `label[for]`, on the
/// `.payment-option` wrapper, or on the `<id>-container` element.
#[must_use]
pub fn input_from_target(doc: &Document, target: NodeId) -> Option<NodeId> {
    if is_payment_input(doc, target) {
        return Some(target);
    }
    if let Some(label) = doc.closest(target, "label[for]") {
        let by_for = doc
            .attr(label, "for")
            .and_then(|id| doc.get_element_by_id(id))
            .filter(|node| is_payment_input(doc, *node));
        if by_for.is_some() {
            return by_for;
        }
    }
    if let Some(option) = doc.closest(target, ".payment-option") {
        if let Some(input) = doc.query_selector(option, PAYMENT_OPTION_INPUT) {
            return Some(input);
        }
    }
    let container = doc.closest(target, r#"[id$="-container"]"#)?;
    let candidate = doc.id(container)?.strip_suffix("-container")?;
    doc.get_element_by_id(candidate)
        .filter(|node| is_payment_input(doc, *node))
}

/// Number of payment options the shopper can currently see.
#[must_use]
pub fn count_visible_options(doc: &Document, step: NodeId) -> usize {
    let wrappers = doc
        .query_selector_all(step, ".payment-option")
        .into_iter()
        .filter(|n| doc.is_visible(*n))
        .count();
    if wrappers > 0 {
        return wrappers;
    }
    doc.query_selector_all(step, PAYMENT_OPTION_INPUT)
        .into_iter()
        .filter(|input| match option_container(doc, *input) {
            Some(container) if doc.is_visible(container) => true,
            _ => doc.is_visible(*input),
        })
        .count()
}

/// Whether the step contains any payment-option markup at all.
#[must_use]
pub fn has_option_markup(doc: &Document, step: NodeId) -> bool {
    doc.query_selector(step, PAYMENT_OPTION_INPUT).is_some()
        || doc.query_selector(step, ".payment-option").is_some()
}

/// Option markup exists but none of it is visible.
///
/// No markup at all means the step is still loading and is not blank.
#[must_use]
pub fn options_blank(doc: &Document, step: NodeId) -> bool {
    has_option_markup(doc, step) && count_visible_options(doc, step) == 0
}
