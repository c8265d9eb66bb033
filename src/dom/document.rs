//! Arena-backed mutable document tree.
//!
//! Elements live in a [`SlotMap`]; a [`NodeId`] stays valid until its
//! element is removed, and a removed slot is reused by later elements.
//! Accessors treat a stale or foreign handle as an element with no data.

use super::selector::{Combinator, Complex, Compound, SelectorList};
use slotmap::{new_key_type, SlotMap};
use std::collections::BTreeSet;
use tracing::warn;

new_key_type! {
    /// Handle to an element in a [`Document`].
    pub struct NodeId;
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    styles: Vec<(String, String)>,
    text: String,
    zero_size: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            styles: Vec::new(),
            text: String::new(),
            zero_size: false,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Element-only document model of a checkout page.
///
/// Besides the element tree it carries the page-level facts the detector
/// reads: the page URL, the user agent, and which global script symbols
/// (e.g. `Stripe`, `paypal`) are currently defined.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    url: String,
    user_agent: String,
    globals: BTreeSet<String>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty `<html><head/><body/></html>` document.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new("html"));
        let mut doc = Self {
            nodes,
            root,
            head: root,
            body: root,
            url: String::new(),
            user_agent: String::new(),
            globals: BTreeSet::new(),
        };
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.append_child(doc.root, head);
        doc.append_child(doc.root, body);
        doc.head = head;
        doc.body = body;
        doc
    }

    /// The `<html>` element.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `<head>` element.
    #[must_use]
    pub fn head(&self) -> NodeId {
        self.head
    }

    /// The `<body>` element.
    #[must_use]
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Page URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Set the page URL.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// Browser user agent.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Set the browser user agent.
    pub fn set_user_agent(&mut self, ua: impl Into<String>) {
        self.user_agent = ua.into();
    }

    /// Record that a global symbol is defined on the page.
    pub fn define_global(&mut self, name: impl Into<String>) {
        self.globals.insert(name.into());
    }

    /// Record that a global symbol is no longer defined.
    pub fn remove_global(&mut self, name: &str) {
        self.globals.remove(name);
    }

    /// Whether a global symbol is defined.
    #[must_use]
    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    // ------------------------------------------------------------------
    // Tree construction
    // ------------------------------------------------------------------

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.insert(Node::new(tag))
    }

    /// Whether the handle refers to a live element of this document.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Number of live elements, attached or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the document holds no element. Never true for a document
    /// built with [`Document::new`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create an element with attributes and append it to `parent`.
    pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let node = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attr(node, name, value);
        }
        self.append_child(parent, node);
        node
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` as the first child of `parent`.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        let first = self.children(parent).first().copied();
        self.insert_before(parent, child, first);
    }

    /// Insert `child` into `parent` before `reference` (or at the end).
    ///
    /// Inserting a node into its own subtree is ignored.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if !self.contains(parent) || !self.contains(child) {
            warn!("refusing to insert a stale node");
            return;
        }
        if child == parent || self.is_ancestor(child, parent) {
            warn!("refusing to insert a node into its own subtree");
            return;
        }
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(parent) {
            let siblings = &mut node.children;
            let index = reference
                .and_then(|r| siblings.iter().position(|c| *c == r))
                .unwrap_or(siblings.len());
            siblings.insert(index, child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
    }

    /// Insert `child` immediately after `reference` under the same parent.
    ///
    /// Returns `false` when `reference` has no parent.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) -> bool {
        let Some(parent) = self.parent(reference) else {
            return false;
        };
        if child == reference {
            return true;
        }
        self.detach(child);
        let next = self.next_sibling(reference);
        self.insert_before(parent, child, next);
        true
    }

    /// Remove a node from its parent. The node stays valid and can be re-inserted.
    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.nodes.get_mut(node).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|c| *c != node);
        }
    }

    /// Detach a node and free it together with its subtree. Handles into the
    /// removed subtree become stale. Returns `false` for a stale handle or
    /// for the document's own `html`, `head` and `body` elements.
    pub fn remove(&mut self, node: NodeId) -> bool {
        if !self.contains(node) || [self.root, self.head, self.body].contains(&node) {
            return false;
        }
        self.detach(node);
        let mut doomed = self.descendants(node);
        doomed.push(node);
        for id in doomed {
            self.nodes.remove(id);
        }
        true
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Parent element.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    /// Child elements in order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node).map_or(&[], |n| n.children.as_slice())
    }

    /// Following sibling.
    #[must_use]
    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }

    /// Preceding sibling.
    #[must_use]
    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index.checked_sub(1)?).copied()
    }

    /// Whether `ancestor` is a strict ancestor of `node`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Whether the node is attached to the document root.
    #[must_use]
    pub fn is_connected(&self, node: NodeId) -> bool {
        node == self.root || self.is_ancestor(self.root, node)
    }

    /// Pre-order descendants of `scope`, excluding `scope` itself.
    #[must_use]
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    // ------------------------------------------------------------------
    // Element data
    // ------------------------------------------------------------------

    /// Lowercased tag name; empty for a stale handle.
    #[must_use]
    pub fn tag_name(&self, node: NodeId) -> &str {
        self.nodes.get(node).map_or("", |n| n.tag.as_str())
    }

    /// Attribute value.
    #[must_use]
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(node)?
            .attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether an attribute is present.
    #[must_use]
    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    /// Set an attribute. Setting `style` replaces the inline style declarations.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(element) = self.nodes.get_mut(node) else {
            return;
        };
        let name = name.to_ascii_lowercase();
        if name == "style" {
            element.styles = parse_inline_style(value);
        }
        let attrs = &mut element.attrs;
        if let Some(slot) = attrs.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value.to_string();
        } else {
            attrs.push((name, value.to_string()));
        }
    }

    /// Remove an attribute.
    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        let Some(element) = self.nodes.get_mut(node) else {
            return;
        };
        if name.eq_ignore_ascii_case("style") {
            element.styles.clear();
        }
        element.attrs.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// The `id` attribute, when non-empty.
    #[must_use]
    pub fn id(&self, node: NodeId) -> Option<&str> {
        self.attr(node, "id").filter(|id| !id.is_empty())
    }

    /// Whether the element carries a class.
    #[must_use]
    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|w| w == class))
    }

    /// Own text.
    #[must_use]
    pub fn text(&self, node: NodeId) -> &str {
        self.nodes.get(node).map_or("", |n| n.text.as_str())
    }

    /// Replace own text.
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) {
        if let Some(element) = self.nodes.get_mut(node) {
            element.text = text.into();
        }
    }

    /// Own text followed by descendant text, space separated.
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        std::iter::once(node)
            .chain(self.descendants(node))
            .map(|n| self.text(n).trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Inline style property value.
    #[must_use]
    pub fn style(&self, node: NodeId, property: &str) -> Option<&str> {
        self.nodes
            .get(node)?
            .styles
            .iter()
            .find(|(p, _)| p == property)
            .map(|(_, v)| v.as_str())
    }

    /// Set an inline style property; an empty value removes it.
    pub fn set_style(&mut self, node: NodeId, property: &str, value: &str) {
        let Some(element) = self.nodes.get_mut(node) else {
            return;
        };
        let styles = &mut element.styles;
        styles.retain(|(p, _)| p != property);
        if !value.is_empty() {
            styles.push((property.to_string(), value.to_string()));
        }
    }

    /// Mark the element as laid out with a zero-sized box.
    pub fn set_zero_size(&mut self, node: NodeId, zero: bool) {
        if let Some(element) = self.nodes.get_mut(node) {
            element.zero_size = zero;
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// First connected element with the given id, in document order.
    #[must_use]
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        self.descendants(self.root)
            .into_iter()
            .find(|n| self.attr(*n, "id") == Some(id))
    }

    /// First descendant of `scope` matching `selector`.
    #[must_use]
    pub fn query_selector(&self, scope: NodeId, selector: &str) -> Option<NodeId> {
        let list = parse_or_warn(selector)?;
        self.descendants(scope)
            .into_iter()
            .find(|n| self.matches_list(*n, &list))
    }

    /// All descendants of `scope` matching `selector`, in document order.
    #[must_use]
    pub fn query_selector_all(&self, scope: NodeId, selector: &str) -> Vec<NodeId> {
        let Some(list) = parse_or_warn(selector) else {
            return Vec::new();
        };
        self.descendants(scope)
            .into_iter()
            .filter(|n| self.matches_list(*n, &list))
            .collect()
    }

    /// First element anywhere in the document matching `selector`.
    #[must_use]
    pub fn query_document(&self, selector: &str) -> Option<NodeId> {
        self.query_selector(self.root, selector)
    }

    /// Whether `node` matches `selector`.
    #[must_use]
    pub fn matches(&self, node: NodeId, selector: &str) -> bool {
        parse_or_warn(selector).is_some_and(|list| self.matches_list(node, &list))
    }

    /// Nearest inclusive ancestor of `node` matching `selector`.
    #[must_use]
    pub fn closest(&self, node: NodeId, selector: &str) -> Option<NodeId> {
        let list = parse_or_warn(selector)?;
        let mut current = Some(node);
        while let Some(n) = current {
            if self.matches_list(n, &list) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    /// Whether any visible descendant of `scope` matches `selector`.
    #[must_use]
    pub fn has_visible(&self, scope: NodeId, selector: &str) -> bool {
        self.query_selector_all(scope, selector)
            .into_iter()
            .any(|n| self.is_visible(n))
    }

    /// Approximation of rendered visibility.
    ///
    /// An element is visible when it is connected, neither it nor an
    /// ancestor is `display: none` or `hidden`, the nearest declared
    /// `visibility` is not `hidden`/`collapse`, its own opacity is not zero,
    /// and it was not laid out with a zero-sized box.
    #[must_use]
    pub fn is_visible(&self, node: NodeId) -> bool {
        if !self.is_connected(node) || self.nodes.get(node).map_or(true, |n| n.zero_size) {
            return false;
        }
        if self.tag_name(node) == "input"
            && self
                .attr(node, "type")
                .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
        {
            return false;
        }
        if self
            .style(node, "opacity")
            .and_then(|o| o.trim().parse::<f64>().ok())
            .is_some_and(|o| o <= 0.0)
        {
            return false;
        }
        let mut visibility_decided = false;
        let mut current = Some(node);
        while let Some(n) = current {
            if self.style(n, "display") == Some("none") || self.has_attr(n, "hidden") {
                return false;
            }
            if !visibility_decided {
                if let Some(v) = self.style(n, "visibility") {
                    if v == "hidden" || v == "collapse" {
                        return false;
                    }
                    visibility_decided = true;
                }
            }
            current = self.parent(n);
        }
        true
    }

    fn matches_list(&self, node: NodeId, list: &SelectorList) -> bool {
        list.alternatives
            .iter()
            .any(|complex| self.matches_complex(node, complex, complex.compounds.len() - 1))
    }

    fn matches_complex(&self, node: NodeId, complex: &Complex, index: usize) -> bool {
        if !self.matches_compound(node, &complex.compounds[index]) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match complex.combinators[index - 1] {
            Combinator::Child => self
                .parent(node)
                .is_some_and(|p| self.matches_complex(p, complex, index - 1)),
            Combinator::Descendant => {
                let mut current = self.parent(node);
                while let Some(a) = current {
                    if self.matches_complex(a, complex, index - 1) {
                        return true;
                    }
                    current = self.parent(a);
                }
                false
            }
        }
    }

    fn matches_compound(&self, node: NodeId, compound: &Compound) -> bool {
        if compound.tag.as_deref().is_some_and(|t| t != self.tag_name(node)) {
            return false;
        }
        if !compound.ids.iter().all(|id| self.attr(node, "id") == Some(id.as_str())) {
            return false;
        }
        if !compound.classes.iter().all(|c| self.has_class(node, c)) {
            return false;
        }
        if compound.checked && !self.has_attr(node, "checked") {
            return false;
        }
        compound
            .attrs
            .iter()
            .all(|a| a.matches(self.attr(node, &a.name)))
    }
}

fn parse_or_warn(selector: &str) -> Option<SelectorList> {
    match SelectorList::parse(selector) {
        Ok(list) => Some(list),
        Err(e) => {
            warn!("{e}");
            None
        }
    }
}

fn parse_inline_style(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .filter_map(|decl| {
            let (prop, val) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let val = val.trim().to_string();
            (!prop.is_empty() && !val.is_empty()).then_some((prop, val))
        })
        .collect()
}
