//! Selector derivation.
//!
//! A field's selector is built from what the markup offers, most specific
//! first: an id, then a name (or Google's `jsname`) scoped by the enclosing
//! form or select, then type/value attributes. The result is only accepted if
//! querying the document with it finds exactly this field, so an ambiguous
//! selector can never read or write the wrong element.

use log::{debug, error, warn};

use crate::dom::selector::is_identifier;
use crate::dom::{Document, NodeId, QueryScope};
use crate::field::FieldKind;

/// Derive the selector of a connected field.
pub fn derive_selector(doc: &Document, field: NodeId) -> Option<String> {
    derive_selector_in(&QueryScope::live(doc), field)
}

/// Derive a selector against an explicit scope (used for removed subtrees).
pub fn derive_selector_in(scope: &QueryScope<'_>, field: NodeId) -> Option<String> {
    let selector = build_selector(scope, field)?;
    match scope.query_all(&selector) {
        Err(e) => {
            error!("invalid selector: {}", e);
            None
        }
        Ok(matches) if matches.as_slice() == [field] => Some(selector),
        Ok(matches) => {
            warn!(
                "selector matches {} elements instead of one: {}",
                matches.len(),
                selector
            );
            None
        }
    }
}

/// Derive the selector of a field removed by the current mutation batch.
///
/// The selector is built with the field back at its former position. It is
/// accepted when it identifies the field there, or else when it resolves to a
/// single connected element, as happens when a page swaps a subtree for an
/// identical copy in one batch.
pub fn derive_removed_selector(scope: &QueryScope<'_>, field: NodeId) -> Option<String> {
    let selector = build_selector(scope, field)?;
    match scope.query_all(&selector) {
        Err(e) => {
            error!("invalid selector: {}", e);
            return None;
        }
        Ok(matches) if matches.as_slice() == [field] => return Some(selector),
        Ok(_) => {}
    }
    match scope.document().query_selector_all(&selector) {
        Ok(live) if live.len() == 1 => {
            debug!("removed field resolves to its replacement: {}", selector);
            Some(selector)
        }
        Ok(live) => {
            warn!(
                "removed field selector matches {} live elements: {}",
                live.len(),
                selector
            );
            None
        }
        Err(e) => {
            error!("invalid selector: {}", e);
            None
        }
    }
}

/// Assemble the selector text without validating it.
pub fn build_selector(scope: &QueryScope<'_>, field: NodeId) -> Option<String> {
    let doc = scope.document();
    let kind = FieldKind::of(doc, field)?;
    let tag = doc.tag_name(field)?;

    let mut parts = Vec::new();
    if let Some(prefix) = ancestor_prefix(scope, field, kind) {
        parts.push(prefix);
    }

    let mut element = tag.to_string();
    if let Some(id) = id_selector(doc, field) {
        element.push_str(&id);
    } else {
        if let Some(ty) = doc.attribute(field, "type") {
            element.push_str(&format!("[type=\"{}\"]", ty));
        }
        if kind.disambiguates_by_value() {
            if let Some(value) = doc.attribute(field, "value").filter(|v| !v.is_empty()) {
                element.push_str(&format!("[value=\"{}\"]", value));
            }
        }
        if let Some(name) = name_selector(doc, field) {
            element.push_str(&name);
        }
    }
    parts.push(element);

    Some(parts.join(" "))
}

fn ancestor_prefix(scope: &QueryScope<'_>, field: NodeId, kind: FieldKind) -> Option<String> {
    let doc = scope.document();
    let start = scope.parent(field)?;
    if kind == FieldKind::Option {
        if let Some(select) = scope.closest(start, "select") {
            if let Some(prefix) = scoping_selector(doc, select) {
                return Some(prefix);
            }
        }
    }
    let form = scope.closest(start, "form")?;
    scoping_selector(doc, form)
}

fn scoping_selector(doc: &Document, ancestor: NodeId) -> Option<String> {
    if let Some(id) = id_selector(doc, ancestor) {
        return Some(id);
    }
    let name = name_selector(doc, ancestor)?;
    Some(format!("{}{}", doc.tag_name(ancestor)?, name))
}

/// `#id` when the id is a valid identifier, `[id="…"]` otherwise.
fn id_selector(doc: &Document, node: NodeId) -> Option<String> {
    let id = doc.attribute(node, "id").filter(|id| !id.is_empty())?;
    if is_identifier(id) {
        Some(format!("#{}", id))
    } else {
        Some(format!("[id=\"{}\"]", id))
    }
}

fn name_selector(doc: &Document, node: NodeId) -> Option<String> {
    if let Some(name) = doc.attribute(node, "name").filter(|n| !n.is_empty()) {
        return Some(format!("[name=\"{}\"]", name));
    }
    // non-standard, but common in Google properties
    doc.attribute(node, "jsname")
        .filter(|n| !n.is_empty())
        .map(|n| format!("[jsname=\"{}\"]", n))
}
