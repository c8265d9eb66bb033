//! Provider classification of a payment option.

use crate::dom::{Document, NodeId};
use crate::provider::Provider;
use crate::scope::{PaymentOptionRef, ScopeSet, PAYMENT_OPTION_INPUT};
use tracing::debug;

/// Card-payment vocabulary, including localised variants.
const CARD_WORDS: [&str; 10] = [
    "card", "carte", "credit", "crédit", "debit", "débit", "tarjeta", "karte", "carta", "kaart",
];

/// Script source fragments of known payment gateways.
pub(crate) const PAYMENT_DOMAINS: [&str; 9] = [
    "paypal",
    "stripe",
    "revolut",
    "braintree",
    "adyen",
    "mollie",
    "checkout.com",
    "square",
    "klarna",
];

const WIDGET_PLACEHOLDERS: &str = r#"[id*="card"], [id*="payment-element"], [id*="widget"], [class*="card-field"], [class*="payment-widget"]"#;

const ADDITIONAL_INFO_PLACEHOLDERS: &str = r#"[id*="card"], [id*="payment"], [id*="widget"], [data-payment], [class*="card"], [class*="payment-form"]"#;

/// Whether the checkout runs inside the PrestaShop Checkout aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentMode {
    /// Options are rendered by the aggregator.
    PsCheckout,
    /// Independent payment modules.
    Standalone,
}

impl EnvironmentMode {
    /// Detect the mode from structural markers.
    #[must_use]
    pub fn detect(doc: &Document) -> Self {
        let marker = format!(r#"{PAYMENT_OPTION_INPUT}[data-module-name^="ps_checkout"], .ps_checkout-payment-option"#);
        if doc.query_document(&marker).is_some() {
            Self::PsCheckout
        } else {
            Self::Standalone
        }
    }
}

/// Classify a payment option. First match wins; `None` means the option
/// does not need a script-rendered widget.
#[must_use]
pub fn classify(
    doc: &Document,
    option: &PaymentOptionRef,
    scopes: &ScopeSet,
    mode: EnvironmentMode,
) -> Option<Provider> {
    let module = option.module_name_lower();
    let id = option.id.to_lowercase();

    // Aggregator module names embed provider keywords (ps_checkout-paypal).
    if module.contains("ps_checkout") || module.contains("prestashop checkout") {
        debug!("classify {}: ps_checkout by module name", option.id);
        return Some(Provider::PsCheckout);
    }

    for provider in [Provider::Revolut, Provider::Stripe, Provider::Paypal] {
        let profile = provider.profile();
        let by_keyword = profile
            .keyword
            .is_some_and(|k| module.contains(k) || id.contains(k));
        let in_scope = profile
            .scope_markers
            .is_some_and(|sel| scopes.contains(doc, sel));
        if by_keyword || in_scope {
            debug!(
                "classify {}: {provider} (keyword={by_keyword}, markup={in_scope})",
                option.id
            );
            return Some(provider);
        }
    }

    if mode == EnvironmentMode::PsCheckout {
        if let Some(markers) = Provider::PsCheckout.profile().scope_markers {
            if scopes.contains(doc, markers) {
                debug!("classify {}: ps_checkout by in-scope markup", option.id);
                return Some(Provider::PsCheckout);
            }
        }
    }

    let label = option_label(doc, option).to_lowercase();
    if CARD_WORDS
        .iter()
        .any(|w| module.contains(w) || label.contains(w))
    {
        let found = page_providers(doc)
            .first()
            .copied()
            .unwrap_or(Provider::Generic);
        debug!("classify {}: card vocabulary, page marker -> {found}", option.id);
        return Some(found);
    }

    if expects_widget(doc, scopes) {
        debug!("classify {}: generic, option expects a widget", option.id);
        return Some(Provider::Generic);
    }

    debug!("classify {}: no provider", option.id);
    None
}

/// Providers whose scripts or markup appear anywhere on the page, in classification order.
#[must_use]
pub fn page_providers(doc: &Document) -> Vec<Provider> {
    [Provider::Revolut, Provider::Stripe, Provider::Paypal]
        .into_iter()
        .filter(|p| {
            p.profile()
                .page_marker
                .is_some_and(|sel| doc.query_document(sel).is_some())
        })
        .collect()
}

/// Text of the `label[for=<id>]` elements of an option.
fn option_label(doc: &Document, option: &PaymentOptionRef) -> String {
    doc.query_selector_all(doc.root(), "label[for]")
        .into_iter()
        .filter(|l| doc.attr(*l, "for") == Some(option.id.as_str()))
        .map(|l| doc.text_content(l))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether the option's scope looks like it hosts a script-rendered widget.
fn expects_widget(doc: &Document, scopes: &ScopeSet) -> bool {
    let payment_script = |scope: NodeId| {
        doc.query_selector_all(scope, "script[src]")
            .into_iter()
            .filter_map(|s| doc.attr(s, "src"))
            .any(|src| {
                let src = src.to_lowercase();
                PAYMENT_DOMAINS.iter().any(|d| src.contains(d))
            })
    };
    let in_scopes = scopes.roots().iter().any(|scope| {
        payment_script(*scope) || doc.query_selector(*scope, WIDGET_PLACEHOLDERS).is_some()
    });
    if in_scopes {
        return true;
    }
    scopes.additional.is_some_and(|panel| {
        doc.query_selector(panel, "script[src]").is_some()
            || doc.query_selector(panel, ADDITIONAL_INFO_PLACEHOLDERS).is_some()
    })
}
