use std::collections::HashSet;

use log::debug;

use super::FormTracker;
use crate::derive::{derive_removed_selector, derive_selector};
use crate::dom::{Document, MutationRecord, NodeId, QueryScope};
use crate::field::{self, find_fields, FieldKind};
use crate::Result;

impl FormTracker {
    /// Process one batch of child-list records.
    ///
    /// Added subtrees are wired and, with the gate open, restored. Removed
    /// subtrees still hold their values, which are captured under selectors
    /// evaluated as if each subtree were back at its former parent, or under
    /// the selector of an identical replacement added in the same batch. The
    /// page record is loaded once and saved at most once per batch.
    pub fn handle_mutations(&mut self, doc: &mut Document, records: Vec<MutationRecord>) -> Result<()> {
        let mut seen = HashSet::new();
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut reattached = Vec::new();

        for record in &records {
            for &node in &record.added {
                if !doc.is_element(node) || !doc.is_connected(node) {
                    continue;
                }
                self.wire(doc, node);
                added.extend(find_fields(doc, node).into_iter().filter(|(n, _)| seen.insert(*n)));
            }
            for &node in &record.removed {
                if !doc.is_element(node) || doc.is_connected(node) {
                    continue;
                }
                reattached.push((node, record.target));
                removed.extend(find_fields(doc, node).into_iter().filter(|(n, _)| seen.insert(*n)));
            }
        }
        if added.is_empty() && removed.is_empty() {
            return Ok(());
        }

        let added: Vec<(NodeId, FieldKind, String)> = added
            .into_iter()
            .filter_map(|(node, kind)| derive_selector(doc, node).map(|s| (node, kind, s)))
            .collect();
        let removed: Vec<(NodeId, FieldKind, String)> = {
            let scope = QueryScope::with_reattached(doc, reattached);
            removed
                .into_iter()
                .filter_map(|(node, kind)| derive_removed_selector(&scope, node).map(|s| (node, kind, s)))
                .collect()
        };
        debug!(
            "mutation batch: {} added, {} removed fields",
            added.len(),
            removed.len()
        );

        let key = self.page_key(doc);
        let mut page = self.store.load(&key);

        if self.gate.is_open() {
            for (node, kind, selector) in &added {
                let Some(value) = page.get(selector) else {
                    continue;
                };
                if field::restore(doc, *node, *kind, value, false) {
                    self.mark_restored(selector);
                }
            }
        }

        if removed.is_empty() || self.clearing {
            return Ok(());
        }
        for (node, kind, selector) in &removed {
            if self.submitted.contains(selector) {
                continue;
            }
            field::persist(doc, *node, *kind, selector, &mut page);
        }
        self.store.save(&key, &page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::HostBridge;
    use crate::platform::MemoryStorage;
    use crate::TrackerConfig;
    use url::Url;

    fn setup(html: &str) -> (Document, FormTracker) {
        let mut doc = Document::parse(Url::parse("https://example.com/app").unwrap(), html);
        let mut t = FormTracker::new(TrackerConfig::default(), HostBridge::detached())
            .with_storage(MemoryStorage::new());
        t.attach(&mut doc);
        (doc, t)
    }

    fn deliver(doc: &mut Document, t: &mut FormTracker) {
        let records = doc.take_records();
        t.handle_mutations(doc, records).unwrap();
    }

    #[test]
    fn added_select_is_restored_without_change_event() {
        let (mut doc, mut t) = setup(r#"<form id="f"></form>"#);
        let key = t.page_key(&doc);
        let mut page = t.store.load(&key);
        page.insert(
            "select[name=\"country\"] option[value=\"de\"]".to_string(),
            "selected".to_string(),
        );
        t.store.save(&key, &page).unwrap();
        t.set_capability(&mut doc, Some(true));

        let form = doc.query_selector("#f").unwrap().unwrap();
        doc.append_html(
            form,
            r#"<select name="country"><option value="fr">France</option><option value="de">Germany</option></select>"#,
        );
        deliver(&mut doc, &mut t);

        let select = doc.query_selector("select").unwrap().unwrap();
        assert_eq!(doc.value(select), "de");
        assert!(t.is_wired(select, crate::tracker::EventKind::Change));
        assert_eq!(t.restored().len(), 1);
    }

    #[test]
    fn closed_gate_leaves_added_fields_alone() {
        let (mut doc, mut t) = setup("<div id=\"root\"></div>");
        let key = t.page_key(&doc);
        let mut page = t.store.load(&key);
        page.insert("input[name=\"q\"]".to_string(), "saved".to_string());
        t.store.save(&key, &page).unwrap();

        let root = doc.query_selector("#root").unwrap().unwrap();
        doc.append_html(root, r#"<input name="q">"#);
        deliver(&mut doc, &mut t);
        let q = doc.query_selector("input").unwrap().unwrap();
        assert_eq!(doc.value(q), "");
    }

    #[test]
    fn removed_fields_are_captured_once() {
        let (mut doc, mut t) = setup(r#"<form id="f"><div id="step"><input name="a"><textarea name="b"></textarea></div></form>"#);
        let a = doc.query_selector("input").unwrap().unwrap();
        let b = doc.query_selector("textarea").unwrap().unwrap();
        doc.set_value(a, "first");
        doc.set_value(b, "second");
        let step = doc.query_selector("#step").unwrap().unwrap();
        doc.remove(step);
        deliver(&mut doc, &mut t);

        let page = t.store.load(&t.page_key(&doc));
        assert_eq!(page.get("#f input[name=\"a\"]"), Some("first"));
        assert_eq!(page.get("#f textarea[name=\"b\"]"), Some("second"));
    }

    #[test]
    fn swapped_subtree_keeps_the_typed_value() {
        let (mut doc, mut t) = setup(r#"<form id="f"><div class="step"><input name="a"></div></form>"#);
        let a = doc.query_selector("input").unwrap().unwrap();
        doc.set_value(a, "typed");
        let form = doc.query_selector("#f").unwrap().unwrap();
        let step = doc.query_selector(".step").unwrap().unwrap();
        doc.remove(step);
        doc.append_html(form, r#"<div class="step"><input name="a"></div>"#);
        deliver(&mut doc, &mut t);

        let page = t.store.load(&t.page_key(&doc));
        assert_eq!(page.get("#f input[name=\"a\"]"), Some("typed"));
        let replacement = doc.query_selector("input").unwrap().unwrap();
        assert_ne!(replacement, a);
        assert!(t.is_wired(replacement, crate::tracker::EventKind::Change));
    }

    #[test]
    fn moved_nodes_are_not_captured_as_removed() {
        let (mut doc, mut t) = setup(r#"<div id="a"><input name="x"></div><div id="b"></div>"#);
        let x = doc.query_selector("input").unwrap().unwrap();
        let b = doc.query_selector("#b").unwrap().unwrap();
        doc.set_value(x, "kept");
        doc.append_child(b, x);
        deliver(&mut doc, &mut t);
        assert!(t.store.load(&t.page_key(&doc)).is_empty());
    }
}
