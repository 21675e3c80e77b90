//! Form fields: classification, discovery, and the persisted value encoding.
//!
//! Encodings stored in a [`PageRecord`]:
//! - text input, textarea: the raw value; an empty value removes the entry
//! - checkbox, radio: `"checked"` or `""`
//! - option: `"selected"` or `""`
//! - content-editable: the inner HTML; empty removes the entry
//!
//! A `<select>` has no entry of its own, its options carry the state.

use log::debug;

use crate::dom::{Document, NodeId};
use crate::store::PageRecord;

pub const CHECKED: &str = "checked";
pub const SELECTED: &str = "selected";

/// `<input>` types that are never tracked.
pub const EXCLUDED_INPUT_TYPES: &[&str] = &[
    "password", "hidden", "file", "submit", "button", "reset", "image",
];

/// The closed set of element kinds the tracker knows how to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    TextInput,
    TextArea,
    Checkbox,
    Radio,
    Select,
    Option,
    ContentEditable,
}

impl FieldKind {
    /// Classify an element, `None` when it is not a tracked field.
    pub fn of(doc: &Document, node: NodeId) -> Option<FieldKind> {
        match doc.tag_name(node)? {
            "input" => {
                let ty = doc.input_type(node);
                match ty.as_str() {
                    "checkbox" => Some(FieldKind::Checkbox),
                    "radio" => Some(FieldKind::Radio),
                    t if EXCLUDED_INPUT_TYPES.contains(&t) => None,
                    _ => Some(FieldKind::TextInput),
                }
            }
            "textarea" => Some(FieldKind::TextArea),
            "select" => Some(FieldKind::Select),
            "option" => Some(FieldKind::Option),
            _ if is_content_editable(doc, node) => Some(FieldKind::ContentEditable),
            _ => None,
        }
    }

    /// Text-like fields keep a page or user supplied value on automatic restore.
    pub fn is_text_like(self) -> bool {
        matches!(
            self,
            FieldKind::TextInput | FieldKind::TextArea | FieldKind::ContentEditable
        )
    }

    /// Whether the selector gets a `[value="…"]` part to tell siblings apart.
    pub fn disambiguates_by_value(self) -> bool {
        matches!(self, FieldKind::Checkbox | FieldKind::Radio | FieldKind::Option)
    }
}

fn is_content_editable(doc: &Document, node: NodeId) -> bool {
    matches!(
        doc.attribute(node, "contenteditable")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref(),
        Some("" | "true" | "plaintext-only")
    )
}

/// The encoded value a field would be persisted with.
pub fn encode_value(doc: &Document, node: NodeId, kind: FieldKind) -> Option<String> {
    match kind {
        FieldKind::TextInput | FieldKind::TextArea => Some(doc.value(node)),
        FieldKind::Checkbox | FieldKind::Radio => Some(flag(doc.checked(node), CHECKED)),
        FieldKind::Option => Some(flag(doc.selected(node), SELECTED)),
        FieldKind::ContentEditable => Some(doc.inner_html(node)),
        FieldKind::Select => None,
    }
}

fn flag(on: bool, word: &str) -> String {
    if on {
        word.to_string()
    } else {
        String::new()
    }
}

/// Write a field's current value into `record` under `selector`.
pub fn persist(doc: &Document, node: NodeId, kind: FieldKind, selector: &str, record: &mut PageRecord) {
    let Some(value) = encode_value(doc, node, kind) else {
        debug!("{} keeps no value of its own, skipping", selector);
        return;
    };
    let empty = match kind {
        FieldKind::ContentEditable => value.trim().is_empty(),
        _ => kind.is_text_like() && value.is_empty(),
    };
    if empty {
        if record.remove(selector).is_some() {
            debug!("removed persisted value for {}", selector);
        }
        return;
    }
    debug!("persisted {:?} for {}", kind, selector);
    record.insert(selector.to_string(), value);
}

/// Write a saved value back into a field.
///
/// Without `overwrite`, text-like fields that already hold something are left
/// alone. Returns whether the field actually changed.
pub fn restore(doc: &mut Document, node: NodeId, kind: FieldKind, value: &str, overwrite: bool) -> bool {
    match kind {
        FieldKind::Option => {
            let to = value == SELECTED;
            if doc.selected(node) == to {
                return false;
            }
            doc.set_selected(node, to);
        }
        FieldKind::Checkbox | FieldKind::Radio => {
            let to = value == CHECKED;
            if doc.checked(node) == to {
                return false;
            }
            doc.set_checked(node, to);
        }
        FieldKind::TextInput | FieldKind::TextArea => {
            let from = doc.value(node);
            if (!overwrite && !from.is_empty()) || from == value {
                return false;
            }
            doc.set_value(node, value);
        }
        FieldKind::ContentEditable => {
            let from = doc.inner_html(node);
            if (!overwrite && !from.trim().is_empty()) || from == value {
                return false;
            }
            doc.set_inner_html(node, value);
        }
        FieldKind::Select => return false,
    }
    debug!("restored {:?} to {:?}", kind, node);
    true
}

fn inclusive_descendants(doc: &Document, root: NodeId) -> Vec<NodeId> {
    let mut nodes = vec![root];
    nodes.extend(doc.descendants(root));
    nodes
}

/// Elements under `root` (inclusive) that fire `change`: text-like inputs,
/// checkboxes, radios, textareas and selects.
pub fn find_changeable(doc: &Document, root: NodeId) -> Vec<NodeId> {
    inclusive_descendants(doc, root)
        .into_iter()
        .filter(|&n| {
            matches!(
                FieldKind::of(doc, n),
                Some(
                    FieldKind::TextInput
                        | FieldKind::TextArea
                        | FieldKind::Checkbox
                        | FieldKind::Radio
                        | FieldKind::Select
                )
            )
        })
        .collect()
}

/// Content-editable regions under `root` (inclusive).
pub fn find_content_editable(doc: &Document, root: NodeId) -> Vec<NodeId> {
    inclusive_descendants(doc, root)
        .into_iter()
        .filter(|&n| FieldKind::of(doc, n) == Some(FieldKind::ContentEditable))
        .collect()
}

pub fn find_forms(doc: &Document, root: NodeId) -> Vec<NodeId> {
    inclusive_descendants(doc, root)
        .into_iter()
        .filter(|&n| doc.tag_name(n) == Some("form"))
        .collect()
}

/// Every persistable field under `root`: changeable elements with selects
/// expanded into their options, stray options whose select sits above
/// `root`, then content-editable regions.
pub fn find_fields(doc: &Document, root: NodeId) -> Vec<(NodeId, FieldKind)> {
    let mut out = Vec::new();
    for node in find_changeable(doc, root) {
        match FieldKind::of(doc, node) {
            Some(FieldKind::Select) => out.extend(
                doc.options(node)
                    .into_iter()
                    .map(|option| (option, FieldKind::Option)),
            ),
            Some(kind) => out.push((node, kind)),
            None => {}
        }
    }
    // options added into a select that lives outside `root`
    for node in inclusive_descendants(doc, root) {
        if doc.tag_name(node) == Some("option")
            && !out.iter().any(|(n, _)| *n == node)
            && doc.closest(node, "select").is_some()
        {
            out.push((node, FieldKind::Option));
        }
    }
    out.extend(
        find_content_editable(doc, root)
            .into_iter()
            .map(|node| (node, FieldKind::ContentEditable)),
    );
    out
}
