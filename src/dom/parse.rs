//! HTML import through `scraper`.
//!
//! scraper/html5ever do the tokenizing and tree construction; the resulting
//! tree is copied into the document arena so it can be mutated afterwards.

use scraper::{ElementRef, Html, Node};

use super::{Document, NodeId};

pub(super) fn import_document(doc: &mut Document, html: &str) {
    let parsed = Html::parse_document(html);
    let root = doc.root();
    let html_el = import_element(doc, parsed.root_element());
    doc.attach(root, html_el);
}

/// Parse `html` in a `<body>` context and return the detached top-level nodes.
pub(super) fn import_fragment(doc: &mut Document, html: &str) -> Vec<NodeId> {
    let parsed = Html::parse_fragment(html);
    // parse_fragment wraps the fragment in a synthetic <html> element
    let wrapper = parsed.root_element();
    let mut out = Vec::new();
    for child in wrapper.children() {
        match child.value() {
            Node::Text(text) => {
                let content: &str = text;
                out.push(doc.create_text(content));
            }
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    out.push(import_element(doc, el));
                }
            }
            _ => {}
        }
    }
    out
}

fn import_element(doc: &mut Document, source: ElementRef<'_>) -> NodeId {
    let id = doc.create_element(source.value().name());
    for (name, value) in source.value().attrs() {
        doc.set_attribute(id, name, value);
    }
    for child in source.children() {
        let imported = match child.value() {
            Node::Text(text) => {
                let content: &str = text;
                Some(doc.create_text(content))
            }
            Node::Element(_) => ElementRef::wrap(child).map(|el| import_element(doc, el)),
            _ => None,
        };
        if let Some(node) = imported {
            doc.attach(id, node);
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn fragment_nodes_come_back_detached() {
        let mut doc = Document::new(Url::parse("https://example.com/").unwrap());
        let nodes = import_fragment(&mut doc, "<select name=\"country\"><option>FR</option></select>text");
        assert_eq!(nodes.len(), 2);
        assert_eq!(doc.tag_name(nodes[0]), Some("select"));
        assert_eq!(doc.text(nodes[1]), Some("text"));
        assert!(!doc.is_connected(nodes[0]));
    }

    #[test]
    fn attributes_are_copied() {
        let doc = Document::parse(
            Url::parse("https://example.com/").unwrap(),
            r#"<form id="login"><input type="email" name="email"></form>"#,
        );
        let input = doc.query_selector("input").unwrap().unwrap();
        assert_eq!(doc.attribute(input, "type"), Some("email"));
        assert_eq!(doc.closest(input, "form").and_then(|f| doc.attribute(f, "id")), Some("login"));
    }
}
