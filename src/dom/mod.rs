//! Arena-backed document model.
//!
//! `Document` is the page the tracker observes: an element tree with the
//! attribute/property split browsers use for form controls (`value`,
//! `checked` and `selected` start out reflecting their attributes and diverge
//! once the user or a script sets them), mutation records for child-list
//! changes under `<body>`, and the bits of window state the field actions
//! touch (focus, text selection, scroll target).
//!
//! Removed nodes stay in the arena. Like detached DOM nodes they keep their
//! subtree and form state, so their values can still be read after removal.

mod parse;
pub mod selector;
mod serialize;

use url::Url;

use crate::error::SelectorError;
use selector::{SelectorList, SelectorTarget};

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// One child-list change, as delivered to a mutation observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// The parent whose children changed
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
struct ElementData {
    tag: String,
    attributes: Vec<(String, String)>,
    /// Dirty value set through the `value` property
    value: Option<String>,
    checked: Option<bool>,
    selected: Option<bool>,
    selection: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Elements that never have children or an end tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone)]
pub struct Document {
    url: Url,
    nodes: Vec<Node>,
    observing: bool,
    records: Vec<MutationRecord>,
    focused: Option<NodeId>,
    scrolled_to: Option<NodeId>,
}

impl Document {
    /// An empty `<html><head></head><body></body></html>` document.
    pub fn new(url: Url) -> Self {
        let mut doc = Self::bare(url);
        let html = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.attach(doc.root(), html);
        doc.attach(html, head);
        doc.attach(html, body);
        doc
    }

    /// Parse a full HTML document served at `url`.
    pub fn parse(url: Url, html: &str) -> Self {
        let mut doc = Self::bare(url);
        parse::import_document(&mut doc, html);
        doc
    }

    /// Read and parse an HTML file, served at `url`.
    pub fn from_file(url: Url, path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let html = std::fs::read_to_string(path)?;
        Ok(Self::parse(url, &html))
    }

    fn bare(url: Url) -> Self {
        Self {
            url,
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
            observing: false,
            records: Vec::new(),
            focused: None,
            scrolled_to: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    /// The document node itself.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn body(&self) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&n| self.tag_name(n) == Some("body"))
    }

    // --- tree structure ---

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_string()))
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node.0).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// All descendants of `node` in tree order, excluding `node`.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root(), node)
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Nearest inclusive ancestor with the given tag.
    pub fn closest(&self, node: NodeId, tag: &str) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(n) = current {
            if self.tag_name(n) == Some(tag) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes[child.0].parent.take()?;
        self.nodes[parent.0].children.retain(|&c| c != child);
        if self.focused.is_some_and(|f| self.is_inclusive_ancestor(child, f)) {
            self.focused = None;
        }
        Some(parent)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent` before `reference` (at the end when `None`).
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if self.nodes[child.0].parent.is_some() {
            self.remove(child);
        }
        let index = reference
            .and_then(|r| self.children(parent).iter().position(|&c| c == r))
            .unwrap_or(self.children(parent).len());
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, child);
        self.record(parent, vec![child], Vec::new());
    }

    /// Detach `node` from its parent; it keeps its subtree and state.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.detach(node) {
            self.record(parent, Vec::new(), vec![node]);
        }
    }

    /// Parse `html` as a fragment and append the result to `parent`.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let added = parse::import_fragment(self, html);
        for &node in &added {
            self.attach(parent, node);
        }
        self.record(parent, added.clone(), Vec::new());
        added
    }

    /// Replace the children of `node` with the parsed fragment.
    pub fn set_inner_html(&mut self, node: NodeId, html: &str) {
        let removed: Vec<NodeId> = self.children(node).to_vec();
        for &child in &removed {
            self.detach(child);
        }
        let added = parse::import_fragment(self, html);
        for &child in &added {
            self.attach(node, child);
        }
        self.record(node, added, removed);
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        serialize::inner_html(self, node)
    }

    pub fn text_content(&self, node: NodeId) -> String {
        match self.nodes.get(node.0).map(|n| &n.data) {
            Some(NodeData::Text(text)) => text.clone(),
            Some(_) => self
                .descendants(node)
                .into_iter()
                .filter_map(|n| match &self.nodes[n.0].data {
                    NodeData::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            None => String::new(),
        }
    }

    pub(crate) fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    // --- mutation observation ---

    /// Start or stop collecting child-list records for the `<body>` subtree.
    pub fn observe(&mut self, enabled: bool) {
        self.observing = enabled;
        if !enabled {
            self.records.clear();
        }
    }

    pub fn has_pending_records(&self) -> bool {
        !self.records.is_empty()
    }

    /// Hand over the records collected since the last call.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    fn record(&mut self, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        if !self.observing || (added.is_empty() && removed.is_empty()) {
            return;
        }
        let observed = self
            .body()
            .is_some_and(|body| self.is_inclusive_ancestor(body, target));
        if observed {
            self.records.push(MutationRecord {
                target,
                added,
                removed,
            });
        }
    }

    // --- attributes ---

    fn element(&self, node: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(node.0)?.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    /// Lowercase tag name of an element.
    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|el| el.tag.as_str())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?
            .attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self, node: NodeId) -> &[(String, String)] {
        self.element(node).map(|el| el.attributes.as_slice()).unwrap_or(&[])
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if let Some(el) = self.element_mut(node) {
            match el.attributes.iter_mut().find(|(k, _)| *k == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => el.attributes.push((name, value.to_string())),
            }
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(el) = self.element_mut(node) {
            el.attributes.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        }
    }

    // --- form control state ---

    /// The `type` of an `<input>`, lowercased, defaulting to `text`.
    pub fn input_type(&self, node: NodeId) -> String {
        self.attribute(node, "type")
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text".to_string())
    }

    /// The `value` property of a form control.
    pub fn value(&self, node: NodeId) -> String {
        let Some(el) = self.element(node) else {
            return String::new();
        };
        match el.tag.as_str() {
            "input" => el
                .value
                .clone()
                .or_else(|| self.attribute(node, "value").map(str::to_string))
                .unwrap_or_default(),
            "textarea" => el.value.clone().unwrap_or_else(|| self.text_content(node)),
            "option" => self
                .attribute(node, "value")
                .map(str::to_string)
                .unwrap_or_else(|| collapse_whitespace(&self.text_content(node))),
            "select" => self
                .options(node)
                .into_iter()
                .find(|&o| self.selected(o))
                .map(|o| self.value(o))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Set the `value` property; for a `<select>` this selects the matching option.
    pub fn set_value(&mut self, node: NodeId, value: &str) {
        match self.tag_name(node) {
            Some("input") | Some("textarea") => {
                if let Some(el) = self.element_mut(node) {
                    el.value = Some(value.to_string());
                    el.selection = None;
                }
            }
            Some("select") => {
                let target = self
                    .options(node)
                    .into_iter()
                    .find(|&o| self.value(o) == value);
                for option in self.options(node) {
                    if let Some(el) = self.element_mut(option) {
                        el.selected = Some(Some(option) == target);
                    }
                }
            }
            _ => {}
        }
    }

    pub fn checked(&self, node: NodeId) -> bool {
        self.element(node)
            .and_then(|el| el.checked)
            .unwrap_or_else(|| self.has_attribute(node, "checked"))
    }

    /// Set the `checked` property; checking a radio unchecks the rest of its group.
    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        if checked && self.tag_name(node) == Some("input") && self.input_type(node) == "radio" {
            for other in self.radio_group(node) {
                if other != node {
                    if let Some(el) = self.element_mut(other) {
                        el.checked = Some(false);
                    }
                }
            }
        }
        if let Some(el) = self.element_mut(node) {
            el.checked = Some(checked);
        }
    }

    fn radio_group(&self, radio: NodeId) -> Vec<NodeId> {
        let Some(name) = self.attribute(radio, "name").filter(|n| !n.is_empty()) else {
            return Vec::new();
        };
        let owner = self.closest(radio, "form");
        let scope = owner.unwrap_or_else(|| self.tree_root(radio));
        self.descendants(scope)
            .into_iter()
            .filter(|&n| {
                self.tag_name(n) == Some("input")
                    && self.input_type(n) == "radio"
                    && self.attribute(n, "name") == Some(name)
                    && self.closest(n, "form") == owner
            })
            .collect()
    }

    fn tree_root(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// The `<option>` elements of a `<select>`, in tree order.
    pub fn options(&self, select: NodeId) -> Vec<NodeId> {
        self.descendants(select)
            .into_iter()
            .filter(|&n| self.tag_name(n) == Some("option"))
            .collect()
    }

    pub fn selected(&self, option: NodeId) -> bool {
        self.element(option)
            .and_then(|el| el.selected)
            .unwrap_or_else(|| self.has_attribute(option, "selected"))
    }

    /// Set an option's selectedness; a single-choice select keeps one option selected.
    pub fn set_selected(&mut self, option: NodeId, selected: bool) {
        if selected {
            if let Some(select) = self.closest(option, "select") {
                if !self.has_attribute(select, "multiple") {
                    for other in self.options(select) {
                        if let Some(el) = self.element_mut(other) {
                            el.selected = Some(false);
                        }
                    }
                }
            }
        }
        if let Some(el) = self.element_mut(option) {
            el.selected = Some(selected);
        }
    }

    /// Rough equivalent of `Element.checkVisibility()`.
    pub fn is_visible(&self, node: NodeId) -> bool {
        if !self.is_connected(node) {
            return false;
        }
        if self.tag_name(node) == Some("input") && self.input_type(node) == "hidden" {
            return false;
        }
        let mut current = Some(node);
        while let Some(n) = current {
            if self.is_element(n) {
                if self.has_attribute(n, "hidden") {
                    return false;
                }
                if let Some(style) = self.attribute(n, "style") {
                    let style: String = style
                        .chars()
                        .filter(|c| !c.is_whitespace())
                        .collect::<String>()
                        .to_ascii_lowercase();
                    if style.contains("display:none") || style.contains("visibility:hidden") {
                        return false;
                    }
                }
            }
            current = self.parent(n);
        }
        true
    }

    // --- focus, selection, scrolling ---

    pub fn focus(&mut self, node: NodeId) {
        if self.is_connected(node) && self.is_element(node) {
            self.focused = Some(node);
        }
    }

    pub fn active_element(&self) -> Option<NodeId> {
        self.focused
    }

    /// Select the whole text of an input or textarea.
    pub fn select_text(&mut self, node: NodeId) {
        let len = self.value(node).chars().count();
        if let Some(el) = self.element_mut(node) {
            el.selection = Some((0, len));
        }
    }

    pub fn selection_range(&self, node: NodeId) -> Option<(usize, usize)> {
        self.element(node).and_then(|el| el.selection)
    }

    pub fn scroll_into_view(&mut self, node: NodeId) {
        if self.is_connected(node) {
            self.scrolled_to = Some(node);
        }
    }

    /// The element most recently scrolled into view.
    pub fn scrolled_to(&self) -> Option<NodeId> {
        self.scrolled_to
    }

    // --- queries ---

    /// All connected elements matching `selector`, in tree order.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        QueryScope::live(self).query_all(selector)
    }

    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, SelectorError> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    /// Descendants of `root` (excluding `root`) matching `selector`.
    pub fn query_within(&self, root: NodeId, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        let list = SelectorList::parse(selector)?;
        let scope = QueryScope::live(self);
        Ok(self
            .descendants(root)
            .into_iter()
            .filter(|&n| list.matches(&scope, n))
            .collect())
    }
}

/// The view of a document a query runs against.
///
/// A live scope is just the connected tree. Nodes removed by a mutation batch
/// can be put back at their former parents, so selectors for them are
/// evaluated against the document as it was just before they were detached.
#[derive(Debug, Clone)]
pub struct QueryScope<'a> {
    doc: &'a Document,
    /// (detached subtree root, former parent)
    reattached: Vec<(NodeId, NodeId)>,
}

impl<'a> QueryScope<'a> {
    pub fn live(doc: &'a Document) -> Self {
        Self {
            doc,
            reattached: Vec::new(),
        }
    }

    pub fn with_reattached(doc: &'a Document, reattached: Vec<(NodeId, NodeId)>) -> Self {
        Self { doc, reattached }
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.reattached
            .iter()
            .find(|(root, _)| *root == node)
            .map(|&(_, parent)| parent)
            .or_else(|| self.doc.parent(node))
    }

    /// Nearest inclusive ancestor with the given tag, following reattachments.
    pub fn closest(&self, node: NodeId, tag: &str) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(n) = current {
            if self.doc.tag_name(n) == Some(tag) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    pub fn query_all(&self, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        let list = SelectorList::parse(selector)?;
        let mut candidates = self.doc.descendants(self.doc.root());
        for &(root, _) in &self.reattached {
            if self.doc.is_connected(root) {
                continue;
            }
            candidates.push(root);
            candidates.extend(self.doc.descendants(root));
        }
        let mut seen = std::collections::HashSet::new();
        Ok(candidates
            .into_iter()
            .filter(|&n| seen.insert(n) && list.matches(self, n))
            .collect())
    }
}

impl SelectorTarget for QueryScope<'_> {
    fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.doc.tag_name(node)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.doc.attribute(node, name)
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|&p| self.doc.is_element(p))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
