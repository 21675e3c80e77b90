//! `innerHTML` serialization.

use super::{Document, NodeId, VOID_ELEMENTS};

pub(super) fn inner_html(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    for &child in doc.children(node) {
        write_node(doc, child, &mut out);
    }
    out
}

fn write_node(doc: &Document, node: NodeId, out: &mut String) {
    if let Some(text) = doc.text(node) {
        escape_text(text, out);
        return;
    }
    let Some(tag) = doc.tag_name(node) else {
        return;
    };
    out.push('<');
    out.push_str(tag);
    for (name, value) in doc.attributes(node) {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attribute(value, out);
        out.push('"');
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&tag) {
        return;
    }
    for &child in doc.children(node) {
        write_node(doc, child, out);
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{A0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{A0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}
