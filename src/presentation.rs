//! Warning surfaces and order-confirmation control disabling.
//!
//! Surfaces are created once per document and toggled with the `hidden`
//! attribute afterwards. Every operation is idempotent.

use crate::config::DetectorConfig;
use crate::dom::{Document, NodeId};
use crate::provider::Provider;
use crate::scope::{PaymentOptionRef, ScopeSet};
use tracing::debug;

/// Banner element id.
pub const BANNER_ID: &str = "payguard-banner";
/// Banner message element id.
pub const BANNER_MESSAGE_ID: &str = "payguard-banner-message";
/// Banner close button id.
pub const BANNER_CLOSE_ID: &str = "payguard-banner-close";
/// Banner support link id.
pub const BANNER_SUPPORT_ID: &str = "payguard-support-link";
/// Inline panel id.
pub const INLINE_ID: &str = "payguard-inline";
/// Inline message element id.
pub const INLINE_MESSAGE_ID: &str = "payguard-inline-message";
/// Inline support link id.
pub const INLINE_SUPPORT_ID: &str = "payguard-inline-support";
/// Class of reload buttons.
pub const RELOAD_CLASS: &str = "payguard-reload";
/// Class of the copy-diagnostic button.
pub const COPY_CLASS: &str = "payguard-copy-diagnostic";
/// Marker carried by controls this crate disabled.
pub const DISABLED_MARKER: &str = "data-payguard-disabled";
/// Marker carried by controls whose `title` this crate added.
pub const TITLE_MARKER: &str = "data-payguard-title";

/// Label of the copy button at rest.
pub const COPY_LABEL: &str = "Copy diagnostic";
/// Label of the copy button after a successful copy.
pub const COPIED_LABEL: &str = "Copied";

const RELOAD_LABEL: &str = "Reload the page";
const SUPPORT_LABEL: &str = "Contact support";

const CONFIRM_CONTROLS: &str = r#"#payment-confirmation button, #payment-confirmation input[type="submit"], button[name="confirmOrder"], button.js-confirm-order, button[data-link-action="confirm-order"], #order-confirmation button[type="submit"], #confirm_order, button[name="confirm_order"], button[id*="confirm_order"]"#;

const CONFIRM_LINKS: &str = "#payment-confirmation a";

/// Whether the inline panel shows a blocked warning or the "preparing" notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InlineMode {
    Blocked,
    Verifying,
}

impl InlineMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Verifying => "verifying",
        }
    }

    const fn classes(self) -> &'static str {
        match self {
            Self::Blocked => "alert alert-danger payguard-inline",
            Self::Verifying => "alert alert-info payguard-inline",
        }
    }
}

/// A blocked verdict as rendered on the surfaces.
#[derive(Debug, Clone, Copy)]
pub struct BlockedView<'a> {
    /// Shopper-facing message.
    pub message: &'a str,
    /// Blocked provider.
    pub provider: Provider,
    /// Reason code.
    pub reason: &'a str,
    /// Details.
    pub details: &'a str,
}

/// Renders warnings into the document.
#[derive(Debug, Clone)]
pub struct Presentation {
    show_banner: bool,
    show_inline: bool,
    support_url: Option<String>,
}

impl Presentation {
    /// Create an adapter from detector configuration.
    #[must_use]
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            show_banner: config.show_banner,
            show_inline: config.show_inline,
            support_url: config.support_url.clone().filter(|u| !u.trim().is_empty()),
        }
    }

    /// Create the banner and inline panel if missing. Returns `(banner, inline)`.
    pub fn ensure_surfaces(&self, doc: &mut Document) -> (NodeId, NodeId) {
        (self.ensure_banner(doc), self.ensure_inline(doc))
    }

    fn ensure_banner(&self, doc: &mut Document) -> NodeId {
        if let Some(banner) = doc.get_element_by_id(BANNER_ID) {
            return banner;
        }
        let banner = doc.create_element("div");
        doc.set_attr(banner, "id", BANNER_ID);
        doc.set_attr(banner, "class", "alert alert-danger payguard-banner");
        doc.set_attr(banner, "role", "alert");
        doc.set_attr(banner, "style", "position: fixed; top: 0; left: 0; right: 0; z-index: 99999");
        doc.set_attr(banner, "hidden", "");
        let body = doc.body();
        doc.prepend_child(body, banner);

        doc.append_element(banner, "span", &[("id", BANNER_MESSAGE_ID)]);
        let reload = doc.append_element(banner, "button", &[("type", "button"), ("class", RELOAD_CLASS)]);
        doc.set_text(reload, RELOAD_LABEL);
        if let Some(url) = &self.support_url {
            let link = doc.append_element(
                banner,
                "a",
                &[("id", BANNER_SUPPORT_ID), ("href", url.as_str()), ("target", "_blank")],
            );
            doc.set_text(link, SUPPORT_LABEL);
        }
        let close = doc.append_element(
            banner,
            "button",
            &[("type", "button"), ("id", BANNER_CLOSE_ID), ("aria-label", "Close")],
        );
        doc.set_text(close, "×");
        debug!("banner created");
        banner
    }

    fn ensure_inline(&self, doc: &mut Document) -> NodeId {
        if let Some(inline) = doc.get_element_by_id(INLINE_ID) {
            return inline;
        }
        let body = doc.body();
        let inline = doc.append_element(
            body,
            "div",
            &[
                ("id", INLINE_ID),
                ("class", InlineMode::Blocked.classes()),
                ("role", "alert"),
                ("hidden", ""),
            ],
        );
        doc.append_element(inline, "p", &[("id", INLINE_MESSAGE_ID)]);
        let reload = doc.append_element(inline, "button", &[("type", "button"), ("class", RELOAD_CLASS)]);
        doc.set_text(reload, RELOAD_LABEL);
        let copy = doc.append_element(inline, "button", &[("type", "button"), ("class", COPY_CLASS)]);
        doc.set_text(copy, COPY_LABEL);
        if let Some(url) = &self.support_url {
            let link = doc.append_element(
                inline,
                "a",
                &[("id", INLINE_SUPPORT_ID), ("href", url.as_str()), ("target", "_blank")],
            );
            doc.set_text(link, SUPPORT_LABEL);
        }
        inline
    }

    /// Move the inline panel next to the option: after its visible
    /// additional-information panel, else after its visible form, else into
    /// its container, else into the payment step, else into the body.
    fn place_inline(doc: &mut Document, inline: NodeId, option: Option<&PaymentOptionRef>) {
        let scopes = ScopeSet::resolve(doc, option);
        let after = [scopes.additional, scopes.form]
            .into_iter()
            .flatten()
            .find(|n| doc.is_visible(*n) && !doc.is_ancestor(inline, *n));
        if let Some(reference) = after {
            if doc.next_sibling(reference) == Some(inline) || doc.insert_after(reference, inline) {
                return;
            }
        }
        let parent = scopes
            .container
            .or(scopes.step)
            .unwrap_or_else(|| doc.body());
        if doc.parent(inline) != Some(parent) {
            doc.append_child(parent, inline);
        }
    }

    /// Render a blocked verdict on the enabled surfaces.
    pub fn show_blocked(&self, doc: &mut Document, view: &BlockedView<'_>, option: Option<&PaymentOptionRef>) {
        let (banner, inline) = self.ensure_surfaces(doc);
        if let Some(message) = doc.get_element_by_id(BANNER_MESSAGE_ID) {
            doc.set_text(message, view.message);
        }
        if self.show_banner {
            doc.remove_attr(banner, "hidden");
        } else {
            doc.set_attr(banner, "hidden", "");
        }

        Self::set_inline_mode(doc, inline, InlineMode::Blocked, view.message);
        doc.set_attr(inline, "data-payguard-provider", view.provider.wire_name());
        doc.set_attr(inline, "data-payguard-reason", view.reason);
        doc.set_attr(inline, "data-payguard-details", view.details);
        doc.set_attr(inline, "data-payguard-version", env!("CARGO_PKG_VERSION"));
        if self.show_inline {
            Self::place_inline(doc, inline, option);
            doc.remove_attr(inline, "hidden");
        } else {
            doc.set_attr(inline, "hidden", "");
        }
    }

    /// Show (or relabel) the "preparing" notice in the inline panel.
    pub fn show_verifying(&self, doc: &mut Document, message: &str, option: Option<&PaymentOptionRef>) {
        let (banner, inline) = self.ensure_surfaces(doc);
        doc.set_attr(banner, "hidden", "");
        Self::set_inline_mode(doc, inline, InlineMode::Verifying, message);
        for attr in ["data-payguard-provider", "data-payguard-reason", "data-payguard-details"] {
            doc.remove_attr(inline, attr);
        }
        if self.show_inline {
            Self::place_inline(doc, inline, option);
            doc.remove_attr(inline, "hidden");
        }
    }

    /// Hide the inline panel if it shows the "preparing" notice.
    pub fn hide_verifying(&self, doc: &mut Document) {
        if let Some(inline) = doc.get_element_by_id(INLINE_ID) {
            if doc.attr(inline, "data-payguard-mode") == Some(InlineMode::Verifying.as_str()) {
                doc.set_attr(inline, "hidden", "");
            }
        }
    }

    /// Hide every surface.
    pub fn hide_all(&self, doc: &mut Document) {
        for id in [BANNER_ID, INLINE_ID] {
            if let Some(node) = doc.get_element_by_id(id) {
                doc.set_attr(node, "hidden", "");
            }
        }
    }

    /// Whether the "preparing" notice is currently shown.
    #[must_use]
    pub fn is_verifying_visible(doc: &Document) -> bool {
        doc.get_element_by_id(INLINE_ID).is_some_and(|inline| {
            doc.attr(inline, "data-payguard-mode") == Some(InlineMode::Verifying.as_str())
                && doc.is_visible(inline)
        })
    }

    /// Whether the inline panel is shown.
    #[must_use]
    pub fn is_inline_visible(doc: &Document) -> bool {
        doc.get_element_by_id(INLINE_ID).is_some_and(|n| doc.is_visible(n))
    }

    /// Whether the banner is shown.
    #[must_use]
    pub fn is_banner_visible(doc: &Document) -> bool {
        doc.get_element_by_id(BANNER_ID).is_some_and(|n| doc.is_visible(n))
    }

    /// Text of the inline message.
    #[must_use]
    pub fn inline_message(doc: &Document) -> Option<String> {
        doc.get_element_by_id(INLINE_MESSAGE_ID).map(|n| doc.text_content(n))
    }

    /// Relabel the copy button.
    pub fn set_copy_label(doc: &mut Document, label: &str) {
        for button in doc.query_selector_all(doc.root(), &format!(".{COPY_CLASS}")) {
            doc.set_text(button, label);
        }
    }

    fn set_inline_mode(doc: &mut Document, inline: NodeId, mode: InlineMode, message: &str) {
        doc.set_attr(inline, "class", mode.classes());
        doc.set_attr(inline, "data-payguard-mode", mode.as_str());
        if let Some(text) = doc.get_element_by_id(INLINE_MESSAGE_ID) {
            doc.set_text(text, message);
        }
        if let Some(copy) = doc.query_selector(inline, &format!(".{COPY_CLASS}")) {
            match mode {
                InlineMode::Blocked => doc.remove_attr(copy, "hidden"),
                InlineMode::Verifying => doc.set_attr(copy, "hidden", ""),
            }
        }
    }

    /// Disable or re-enable the order-confirmation controls.
    ///
    /// Re-enabling only touches controls carrying [`DISABLED_MARKER`], so
    /// controls the theme disabled itself stay disabled. A theme's own
    /// `title` is never replaced; only titles marked with [`TITLE_MARKER`]
    /// are updated or removed.
    pub fn set_confirmation_disabled(doc: &mut Document, disabled: bool, title: &str) {
        let root = doc.root();
        if !disabled {
            for node in doc.query_selector_all(root, &format!("[{DISABLED_MARKER}]")) {
                if doc.has_attr(node, TITLE_MARKER) {
                    doc.remove_attr(node, "title");
                }
                for attr in [DISABLED_MARKER, TITLE_MARKER, "disabled", "aria-disabled"] {
                    doc.remove_attr(node, attr);
                }
                doc.set_style(node, "pointer-events", "");
                doc.set_style(node, "opacity", "");
            }
            return;
        }
        for node in doc.query_selector_all(root, CONFIRM_CONTROLS) {
            if doc.has_attr(node, "disabled") && !doc.has_attr(node, DISABLED_MARKER) {
                continue;
            }
            doc.set_attr(node, "disabled", "disabled");
            doc.set_attr(node, "aria-disabled", "true");
            doc.set_attr(node, DISABLED_MARKER, "1");
            Self::set_own_title(doc, node, title);
        }
        for link in doc.query_selector_all(root, CONFIRM_LINKS) {
            doc.set_attr(link, DISABLED_MARKER, "1");
            doc.set_attr(link, "aria-disabled", "true");
            Self::set_own_title(doc, link, title);
            doc.set_style(link, "pointer-events", "none");
            doc.set_style(link, "opacity", "0.6");
        }
    }

    fn set_own_title(doc: &mut Document, node: NodeId, title: &str) {
        let theme_title = doc.attr(node, "title").is_some_and(|t| !t.is_empty())
            && !doc.has_attr(node, TITLE_MARKER);
        if theme_title || title.is_empty() {
            return;
        }
        doc.set_attr(node, "title", title);
        doc.set_attr(node, TITLE_MARKER, "1");
    }

    /// Whether any confirmation control is currently disabled by this crate.
    #[must_use]
    pub fn is_confirmation_disabled(doc: &Document) -> bool {
        doc.query_document(&format!("[{DISABLED_MARKER}]")).is_some()
    }
}
