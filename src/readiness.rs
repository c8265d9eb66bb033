//! Widget readiness predicates.
//!
//! Each predicate needs positive evidence of rendered, usable UI: an iframe
//! or a real input. Script tags and empty containers never count, because
//! blockers leave that markup in place while stopping the network load that
//! would populate it.
//!
//! All functions here are pure over the document.

use crate::dom::Document;
use crate::provider::Provider;
use crate::scope::{count_visible_options, PaymentOptionRef, ScopeSet};

const REVOLUT_FRAMES: &str =
    r#"iframe[src*="merchant.revolut.com"], #revolut_card iframe, iframe[data-revolut]"#;

const STRIPE_FRAMES: &str = r#".StripeElement iframe, .__PrivateStripeElement iframe, iframe[src*="js.stripe.com"], iframe[src*="stripe.com"], iframe[name*="stripe"], iframe[title*="Stripe"]"#;

const STRIPE_INPUTS: &str = r#"input[data-stripe], .StripeElement input, [data-stripe-element] input"#;

const PAYPAL_FRAMES: &str = r#"iframe[name^="__zoid__paypal"], iframe[src*="paypal.com"], iframe[src*="paypalobjects.com"], iframe[name*="paypal"]"#;

const PAYPAL_SDK_SCRIPT: &str = r#"script[src*="paypal.com/sdk/js"]"#;

const PAYPAL_FORM_SUBMIT: &str =
    r#"form[action*="paypal"] button[type="submit"], form[action*="paypal"] input[type="submit"]"#;

const PAYPAL_MODULE_LINK: &str = r#"a[href*="module/paypal"]"#;

const PS_CHECKOUT_CARD_FRAMES: &str = r#"iframe[name^="__zoid__paypal_card_"], div[id^="zoid-paypal-card-"] iframe"#;

const PS_CHECKOUT_BUTTON_FRAMES: &str = r#"iframe[name^="__zoid__paypal_buttons__"], div[id^="zoid-paypal-buttons-"] iframe, div[id^="zoid-paypal-applepay-"] iframe, div[id^="zoid-paypal-googlepay-"] iframe"#;

const GENERIC_FRAMES: &str = r#"iframe[src*="paypal"], iframe[src*="stripe"], iframe[src*="revolut"], iframe[src*="braintree"], iframe[src*="adyen"], iframe[src*="mollie"], iframe[src*="checkout.com"], iframe[src*="klarna"]"#;

const GENERIC_CARD_INPUTS: &str = r#"input[autocomplete="cc-number"], input[name*="card"], input[id*="card-number"], input[placeholder*="card"], input[type="tel"][maxlength="19"]"#;

/// Whether `provider`'s widget has rendered usable UI for the option.
#[must_use]
pub fn is_ready(
    doc: &Document,
    provider: Provider,
    option: Option<&PaymentOptionRef>,
    scopes: &ScopeSet,
) -> bool {
    match provider {
        Provider::Revolut => scopes.contains_visible(doc, REVOLUT_FRAMES),
        Provider::Stripe => {
            scopes.contains_visible(doc, STRIPE_FRAMES) || scopes.contains_visible(doc, STRIPE_INPUTS)
        }
        Provider::Paypal => paypal_ready(doc, scopes),
        Provider::PsCheckout => ps_checkout_ready(doc, option, scopes),
        Provider::Generic => {
            scopes.contains_visible(doc, GENERIC_FRAMES)
                || scopes.contains_visible(doc, GENERIC_CARD_INPUTS)
                || scopes
                    .additional
                    .is_some_and(|panel| doc.has_visible(panel, "iframe"))
        }
    }
}

fn paypal_ready(doc: &Document, scopes: &ScopeSet) -> bool {
    non_js_paypal(doc, scopes) || scopes.contains_visible(doc, PAYPAL_FRAMES)
}

/// A classic redirect integration that does not depend on the SDK.
fn non_js_paypal(doc: &Document, scopes: &ScopeSet) -> bool {
    if doc.query_document(PAYPAL_SDK_SCRIPT).is_some() {
        return false;
    }
    if scopes.contains_visible(doc, PAYPAL_FRAMES) {
        return false;
    }
    scopes.contains_visible(doc, PAYPAL_FORM_SUBMIT) || scopes.contains_visible(doc, PAYPAL_MODULE_LINK)
}

fn ps_checkout_ready(doc: &Document, option: Option<&PaymentOptionRef>, scopes: &ScopeSet) -> bool {
    // Popup flows render no iframe until clicked; visible options suffice.
    if scopes
        .step
        .is_some_and(|step| count_visible_options(doc, step) > 0)
    {
        return true;
    }
    let module = option.map(PaymentOptionRef::module_name_lower).unwrap_or_default();
    let frames = if module.contains("card") {
        PS_CHECKOUT_CARD_FRAMES
    } else {
        PS_CHECKOUT_BUTTON_FRAMES
    };
    // These selectors exclude marketing iframes, so a page-wide lookup is safe.
    scopes.contains(doc, frames) || doc.query_document(frames).is_some()
}
