//! Payment provider identities and their static profiles.
//!
//! Every provider-specific constant (keywords, markup markers, network
//! domains, global symbols, message templates) lives in exactly one
//! [`ProviderProfile`], reached through [`Provider::profile`].

use crate::config::MessageConfig;
use crate::dom::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A payment integration the detector knows how to verify.
///
/// Classification returns `Option<Provider>`; `None` means the option does
/// not depend on a script-rendered widget and is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Revolut card field.
    Revolut,
    /// Stripe Elements.
    Stripe,
    /// PayPal SDK buttons or redirect integration.
    Paypal,
    /// PrestaShop Checkout aggregator.
    PsCheckout,
    /// Unidentified card/payment widget.
    Generic,
}

/// Static description of a provider.
#[derive(Debug)]
pub struct ProviderProfile {
    /// Wire name used in reason codes and diagnostics.
    pub wire_name: &'static str,
    /// Human-readable name.
    pub display_name: &'static str,
    /// Keyword matched against module names and option ids.
    pub keyword: Option<&'static str>,
    /// Provider markup that ties an option's scope to this provider.
    pub scope_markers: Option<&'static str>,
    /// Page-wide script/markup selector used by the card-vocabulary heuristic.
    pub page_marker: Option<&'static str>,
    /// Network domains served by this provider (host suffix match).
    pub domains: &'static [&'static str],
    /// Global symbols the provider SDK defines once loaded.
    pub globals: &'static [&'static str],
    /// Symbol named by "X is not defined" errors when the SDK failed to load.
    pub runtime_symbol: Option<&'static str>,
    /// Blocked message; `None` falls back to the configured blocker message.
    pub blocked_message: Option<&'static str>,
    /// "Preparing" notice shown while verifying.
    pub verifying_message: &'static str,
}

const REVOLUT: ProviderProfile = ProviderProfile {
    wire_name: "revolut",
    display_name: "Revolut",
    keyword: Some("revolut"),
    scope_markers: Some(r#"#revolut_card, [id*="revolut"]"#),
    page_marker: Some(r#"script[src*="revolut"], #revolut_card, [id*="revolut"]"#),
    domains: &["revolut.com"],
    globals: &["RevolutCheckout"],
    runtime_symbol: Some("RevolutCheckout"),
    blocked_message: Some(
        "The Revolut card field is not showing: your browser, an extension (NoScript, AdBlock, \
         anti-tracker) or a security rule (CSP) is blocking scripts or frames required for \
         payment (Revolut). Allow them, then reload the page.",
    ),
    verifying_message: "Preparing the Revolut card field…",
};

const STRIPE: ProviderProfile = ProviderProfile {
    wire_name: "stripe",
    display_name: "Stripe",
    keyword: Some("stripe"),
    scope_markers: Some(
        "#stripe-payment-element, #payment-element, .StripeElement, [data-stripe-element]",
    ),
    page_marker: Some(r#"script[src*="stripe"], .StripeElement, [id*="stripe"]"#),
    domains: &["stripe.com", "stripe.network"],
    globals: &["Stripe", "stripe"],
    runtime_symbol: Some("Stripe"),
    blocked_message: Some(
        "The Stripe card field is not showing: your browser, an extension (NoScript, AdBlock, \
         anti-tracker) or a security rule (CSP) is blocking scripts or frames required for \
         payment (Stripe). Allow them, then reload the page.",
    ),
    verifying_message: "Preparing the Stripe card field…",
};

const PAYPAL: ProviderProfile = ProviderProfile {
    wire_name: "paypal",
    display_name: "PayPal",
    keyword: Some("paypal"),
    scope_markers: Some("#paypal-buttons, #paypal-button-container, .paypal-buttons"),
    page_marker: Some(r#"script[src*="paypal"], [id*="paypal"]"#),
    domains: &["paypal.com", "paypalobjects.com"],
    globals: &["paypal"],
    runtime_symbol: Some("paypal"),
    blocked_message: Some(
        "PayPal cannot load: your browser, an extension (NoScript, AdBlock, anti-tracker) or a \
         security rule (CSP) is blocking scripts or frames required for payment (PayPal). \
         Allow them, then reload the page.",
    ),
    verifying_message: "Preparing PayPal…",
};

const PS_CHECKOUT: ProviderProfile = ProviderProfile {
    wire_name: "ps_checkout",
    display_name: "PrestaShop Checkout",
    keyword: None,
    scope_markers: Some(
        r#"#ps_checkout-payment-container, #ps_checkout-payment, [id*="ps_checkout"], form[action*="/module/ps_checkout/"], script[src*="/modules/ps_checkout/"], script[src*="ps_checkout"], script[src*="paypal.com/sdk/js"][data-namespace*="ps_checkout"]"#,
    ),
    page_marker: None,
    domains: &["braintreegateway.com"],
    globals: &[],
    runtime_symbol: None,
    blocked_message: Some(
        "PrestaShop Checkout cannot load: your browser, an extension (NoScript, AdBlock, \
         anti-tracker) or a security rule (CSP) is blocking scripts or frames required for \
         payment (PrestaShop Checkout). Allow them, then reload the page.",
    ),
    verifying_message: "Preparing PrestaShop Checkout…",
};

const GENERIC: ProviderProfile = ProviderProfile {
    wire_name: "generic",
    display_name: "payment method",
    keyword: None,
    scope_markers: None,
    page_marker: None,
    domains: &[],
    globals: &[],
    runtime_symbol: None,
    blocked_message: None,
    verifying_message: "Preparing the payment method…",
};

/// Suffix appended to every "preparing" notice.
pub const VERIFYING_SUFFIX: &str = " If this stays stuck, an explanation will appear here.";

impl Provider {
    /// All providers, in classification order.
    pub const ALL: [Self; 5] = [
        Self::Revolut,
        Self::Stripe,
        Self::Paypal,
        Self::PsCheckout,
        Self::Generic,
    ];

    /// The static profile of this provider.
    #[must_use]
    pub const fn profile(self) -> &'static ProviderProfile {
        match self {
            Self::Revolut => &REVOLUT,
            Self::Stripe => &STRIPE,
            Self::Paypal => &PAYPAL,
            Self::PsCheckout => &PS_CHECKOUT,
            Self::Generic => &GENERIC,
        }
    }

    /// Wire name (`revolut`, `stripe`, `paypal`, `ps_checkout`, `generic`).
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        self.profile().wire_name
    }

    /// Map a resource URL to the provider serving it.
    ///
    /// Relative or unparsable URLs map to nothing.
    #[must_use]
    pub fn from_url(raw: &str) -> Option<Self> {
        let parsed = url::Url::parse(raw.trim()).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| {
            p.profile().domains.iter().any(|d| {
                host == *d
                    || host
                        .strip_suffix(d)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
        })
    }

    /// Map an uncaught error message like "Stripe is not defined" to a provider.
    #[must_use]
    pub fn from_runtime_error(message: &str) -> Option<Self> {
        let message = message.to_lowercase();
        if !message.contains("not defined") {
            return None;
        }
        Self::ALL.into_iter().find(|p| {
            p.profile()
                .runtime_symbol
                .is_some_and(|s| message.contains(&s.to_lowercase()))
        })
    }

    /// Whether the provider's SDK is loaded on the page.
    ///
    /// Distinguishes "script never loaded" from "script loaded but the widget
    /// never rendered". For the aggregator this is structural.
    #[must_use]
    pub fn globals_present(self, doc: &Document) -> bool {
        match self {
            Self::PsCheckout => {
                doc.query_document(r#"input[name="payment-option"][data-module-name^="ps_checkout"]"#)
                    .is_some()
                    || doc
                        .query_document("#payment_binaries .js-payment-binary.ps_checkout")
                        .is_some()
            }
            other => other.profile().globals.iter().any(|g| doc.has_global(g)),
        }
    }

    /// Shopper-facing blocked message, honouring configured overrides.
    #[must_use]
    pub fn blocked_message(self, messages: &MessageConfig) -> String {
        messages
            .providers
            .get(&self)
            .filter(|m| !m.trim().is_empty())
            .map(String::as_str)
            .or(self.profile().blocked_message)
            .unwrap_or(&messages.blocker)
            .to_string()
    }

    /// "Preparing" notice shown while the widget is verified.
    #[must_use]
    pub fn verifying_message(self) -> String {
        format!("{}{VERIFYING_SUFFIX}", self.profile().verifying_message)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}
