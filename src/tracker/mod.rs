//! The per-page form state tracker.
//!
//! One [`FormTracker`] exists per loaded document. It owns everything that
//! lives for the page's lifetime (pending selectors, the restored set, the
//! capability gate, the wipe flag) and is handed the document on every call,
//! so no element handle outlives a single event, mutation batch or flush.

mod actions;
mod watcher;

use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::bridge::HostBridge;
use crate::debounce::Debouncer;
use crate::derive::derive_selector;
use crate::dom::{Document, NodeId};
use crate::field::{self, find_changeable, find_content_editable, find_fields, find_forms, FieldKind};
use crate::gate::{Capability, CapabilityGate};
use crate::platform::{IdleQueue, IdleScheduler, MemoryStorage, PageStorage, RecordingWindow, TimeoutScheduler, Window};
use crate::store::{PageKey, PersistenceStore};
use crate::{Result, TrackerConfig};

/// DOM events the tracker listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `change` on inputs, textareas and selects
    Change,
    /// `input` on content-editable regions
    Input,
    /// `submit` on forms
    Submit,
}

pub struct FormTracker {
    config: TrackerConfig,
    store: PersistenceStore,
    debouncer: Debouncer,
    window: Box<dyn Window>,
    bridge: HostBridge,
    gate: CapabilityGate,
    /// Selectors written by a restore, in first-restore order
    restored: Vec<String>,
    listeners: HashSet<(NodeId, EventKind)>,
    /// Selectors wiped by a submit and not changed since
    submitted: BTreeSet<String>,
    clearing: bool,
}

impl FormTracker {
    /// A tracker on in-memory storage with a window that declines every
    /// confirmation. Use the `with_*` methods to swap collaborators.
    pub fn new(config: TrackerConfig, bridge: HostBridge) -> Self {
        let scheduler: Box<dyn IdleScheduler> = if config.idle_callback {
            Box::new(IdleQueue::new())
        } else {
            Box::new(TimeoutScheduler::new(Duration::from_millis(
                config.idle_fallback_delay_ms,
            )))
        };
        Self {
            config,
            store: PersistenceStore::new(MemoryStorage::new()),
            debouncer: Debouncer::boxed(scheduler),
            window: Box::new(RecordingWindow::default()),
            bridge,
            gate: CapabilityGate::new(),
            restored: Vec::new(),
            listeners: HashSet::new(),
            submitted: BTreeSet::new(),
            clearing: false,
        }
    }

    pub fn with_storage(mut self, storage: impl PageStorage + 'static) -> Self {
        self.store = PersistenceStore::new(storage);
        self
    }

    pub fn with_scheduler(mut self, scheduler: impl IdleScheduler + 'static) -> Self {
        self.debouncer = Debouncer::new(scheduler);
        self
    }

    pub fn with_window(mut self, window: impl Window + 'static) -> Self {
        self.window = Box::new(window);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &PersistenceStore {
        &self.store
    }

    pub fn capability(&self) -> Capability {
        self.gate.state()
    }

    /// Selectors restored so far, in the order they were first restored.
    pub fn restored(&self) -> &[String] {
        &self.restored
    }

    pub fn pending(&self) -> Vec<String> {
        self.debouncer.pending().map(str::to_string).collect()
    }

    pub fn is_clearing(&self) -> bool {
        self.clearing
    }

    pub fn is_wired(&self, node: NodeId, event: EventKind) -> bool {
        self.listeners.contains(&(node, event))
    }

    pub fn page_key(&self, doc: &Document) -> PageKey {
        PageKey::new(&self.config.key_prefix, doc.url())
    }

    /// Wire the body and start observing it.
    pub fn attach(&mut self, doc: &mut Document) {
        if let Some(body) = doc.body() {
            self.wire(doc, body);
        }
        doc.observe(true);
    }

    /// Page load: attach, then resolve the capability (which restores the
    /// page when it comes back active).
    pub async fn initialize(&mut self, doc: &mut Document) -> Capability {
        self.attach(doc);
        self.refresh_capability(doc).await
    }

    /// Ask the host for the capability and apply the answer. A failed query
    /// leaves the gate `Unknown`.
    pub async fn refresh_capability(&mut self, doc: &mut Document) -> Capability {
        let answer = match self.bridge.check_active_subscription().await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("capability query failed: {}", e);
                None
            }
        };
        self.set_capability(doc, answer);
        self.gate.state()
    }

    /// Update the gate; restores the whole page when it opens. Returns the
    /// number of fields restored.
    pub fn set_capability(&mut self, doc: &mut Document, active: Option<bool>) -> usize {
        if self.gate.resolve(active) {
            self.restore_all(doc)
        } else {
            0
        }
    }

    /// Restore every saved entry that resolves to a field. No-op unless the
    /// gate is open.
    pub fn restore_all(&mut self, doc: &mut Document) -> usize {
        if !self.gate.is_open() {
            debug!("restore skipped, capability {:?}", self.gate.state());
            return 0;
        }
        let record = self.store.load(&self.page_key(doc));
        let mut count = 0;
        for (selector, value) in record.iter() {
            let Some((node, kind)) = resolve_field(doc, selector) else {
                continue;
            };
            if field::restore(doc, node, kind, value, false) {
                self.mark_restored(selector);
                count += 1;
            }
        }
        debug!("restored {} of {} saved fields", count, record.len());
        count
    }

    /// Deliver a DOM event. Events on elements the tracker never wired are
    /// ignored.
    pub fn handle_event(&mut self, doc: &Document, target: NodeId, event: EventKind) -> Result<()> {
        if !self.is_wired(target, event) {
            return Ok(());
        }
        match event {
            EventKind::Change | EventKind::Input => {
                let selectors = changed_selectors(doc, target);
                for selector in &selectors {
                    self.submitted.remove(selector);
                }
                self.debouncer.queue(selectors);
                Ok(())
            }
            EventKind::Submit => self.wipe_form(doc, target),
        }
    }

    pub fn has_scheduled_flush(&self) -> bool {
        self.debouncer.is_scheduled()
    }

    pub fn next_idle_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    /// Give the tracker an idle period. Returns whether a flush ran.
    pub fn run_idle(&mut self, doc: &Document, now: Instant) -> Result<bool> {
        match self.debouncer.poll(now) {
            Some(pending) => {
                self.flush(doc, pending)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Synchronously capture every field on the page.
    pub fn on_page_hide(&mut self, doc: &Document) -> Result<()> {
        self.debouncer.cancel();
        if self.clearing {
            return Ok(());
        }
        let Some(body) = doc.body() else {
            return Ok(());
        };
        let key = self.page_key(doc);
        let mut record = self.store.load(&key);
        for (node, kind) in find_fields(doc, body) {
            let Some(selector) = derive_selector(doc, node) else {
                continue;
            };
            if self.submitted.contains(&selector) {
                continue;
            }
            field::persist(doc, node, kind, &selector, &mut record);
        }
        self.store.save(&key, &record)
    }

    fn flush(&mut self, doc: &Document, pending: BTreeSet<String>) -> Result<()> {
        if self.clearing || pending.is_empty() {
            return Ok(());
        }
        let key = self.page_key(doc);
        let mut record = self.store.load(&key);
        for selector in &pending {
            match resolve_field(doc, selector) {
                Some((node, kind)) => field::persist(doc, node, kind, selector, &mut record),
                None => debug!("{} left the page before its flush", selector),
            }
        }
        self.store.save(&key, &record)
    }

    fn wipe_form(&mut self, doc: &Document, form: NodeId) -> Result<()> {
        let key = self.page_key(doc);
        let mut record = self.store.load(&key);
        let mut wiped = 0;
        for (node, _) in find_fields(doc, form) {
            let Some(selector) = derive_selector(doc, node) else {
                continue;
            };
            if record.remove(&selector).is_some() {
                wiped += 1;
            }
            self.debouncer.discard(&selector);
            self.submitted.insert(selector);
        }
        debug!("submit wiped {} saved fields", wiped);
        if wiped > 0 {
            self.store.save(&key, &record)?;
        }
        Ok(())
    }

    /// Register listeners on every qualifying element under `root`.
    fn wire(&mut self, doc: &Document, root: NodeId) {
        for node in find_changeable(doc, root) {
            self.listeners.insert((node, EventKind::Change));
        }
        for node in find_content_editable(doc, root) {
            self.listeners.insert((node, EventKind::Input));
        }
        for form in find_forms(doc, root) {
            self.listeners.insert((form, EventKind::Submit));
        }
    }

    fn mark_restored(&mut self, selector: &str) {
        if !self.restored.iter().any(|s| s == selector) {
            self.restored.push(selector.to_string());
        }
    }
}

/// Selectors a change on `target` dirties: a select contributes its options.
fn changed_selectors(doc: &Document, target: NodeId) -> Vec<String> {
    let nodes = match FieldKind::of(doc, target) {
        Some(FieldKind::Select) => doc.options(target),
        Some(_) => vec![target],
        None => Vec::new(),
    };
    nodes
        .into_iter()
        .filter_map(|node| derive_selector(doc, node))
        .collect()
}

/// Re-resolve a stored selector to a live field.
fn resolve_field(doc: &Document, selector: &str) -> Option<(NodeId, FieldKind)> {
    match doc.query_selector(selector) {
        Ok(Some(node)) => FieldKind::of(doc, node).map(|kind| (node, kind)),
        Ok(None) => None,
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PageStorage;
    use url::Url;

    const LOGIN: &str = r#"<form id="login"><input type="email" name="email"><input type="checkbox" name="keep" value="1"></form>"#;
    const EMAIL: &str = "#login input[type=\"email\"][name=\"email\"]";

    fn page(html: &str) -> Document {
        Document::parse(Url::parse("https://example.com/login").unwrap(), html)
    }

    fn tracker(storage: &MemoryStorage) -> FormTracker {
        FormTracker::new(TrackerConfig::default(), HostBridge::detached()).with_storage(storage.clone())
    }

    fn node(doc: &Document, selector: &str) -> NodeId {
        doc.query_selector(selector).unwrap().unwrap()
    }

    #[test]
    fn attach_wires_fields_and_forms() {
        let mut doc = page(r#"<form id="f"><input name="a"><input type="password" name="p"><select name="s"><option>x</option></select></form><div contenteditable="true"></div>"#);
        let mut t = tracker(&MemoryStorage::new());
        t.attach(&mut doc);
        assert!(t.is_wired(node(&doc, "input[name=\"a\"]"), EventKind::Change));
        assert!(!t.is_wired(node(&doc, "input[name=\"p\"]"), EventKind::Change));
        assert!(t.is_wired(node(&doc, "select"), EventKind::Change));
        assert!(t.is_wired(node(&doc, "div"), EventKind::Input));
        assert!(t.is_wired(node(&doc, "#f"), EventKind::Submit));
    }

    #[test]
    fn change_queues_and_idle_flushes() {
        let storage = MemoryStorage::new();
        let mut doc = page(LOGIN);
        let mut t = tracker(&storage);
        t.attach(&mut doc);
        let email = node(&doc, "input[name=\"email\"]");
        doc.set_value(email, "alice@example.com");
        t.handle_event(&doc, email, EventKind::Change).unwrap();
        assert_eq!(t.pending(), vec![EMAIL.to_string()]);
        assert!(storage.keys().is_empty());

        assert!(t.run_idle(&doc, Instant::now()).unwrap());
        let record = t.store().load(&t.page_key(&doc));
        assert_eq!(record.get(EMAIL), Some("alice@example.com"));
        assert!(t.pending().is_empty());
    }

    #[test]
    fn unwired_targets_are_ignored() {
        let mut doc = page(LOGIN);
        let mut t = tracker(&MemoryStorage::new());
        let email = node(&doc, "input[name=\"email\"]");
        t.handle_event(&doc, email, EventKind::Change).unwrap();
        assert!(!t.has_scheduled_flush());
        t.attach(&mut doc);
        t.handle_event(&doc, email, EventKind::Input).unwrap();
        assert!(!t.has_scheduled_flush());
    }

    #[test]
    fn restore_all_waits_for_the_gate() {
        let storage = MemoryStorage::new();
        let mut doc = page(LOGIN);
        let mut t = tracker(&storage);
        let mut record = crate::store::PageRecord::default();
        record.insert(EMAIL.to_string(), "bob@example.com".to_string());
        let key = t.page_key(&doc);
        storage
            .set_item(key.as_str(), &serde_json::to_string(&record).unwrap())
            .unwrap();

        assert_eq!(t.restore_all(&mut doc), 0);
        assert_eq!(t.set_capability(&mut doc, Some(false)), 0);
        assert_eq!(doc.value(node(&doc, "input[name=\"email\"]")), "");

        assert_eq!(t.set_capability(&mut doc, Some(true)), 1);
        assert_eq!(doc.value(node(&doc, "input[name=\"email\"]")), "bob@example.com");
        assert_eq!(t.restored(), &[EMAIL.to_string()]);
        // already open, no second pass
        assert_eq!(t.set_capability(&mut doc, Some(true)), 0);
    }

    #[test]
    fn page_hide_skips_submitted_until_changed() {
        let storage = MemoryStorage::new();
        let mut doc = page(LOGIN);
        let mut t = tracker(&storage);
        t.attach(&mut doc);
        let email = node(&doc, "input[name=\"email\"]");
        let form = node(&doc, "#login");
        doc.set_value(email, "a@b.c");
        t.on_page_hide(&doc).unwrap();
        assert_eq!(t.store().load(&t.page_key(&doc)).get(EMAIL), Some("a@b.c"));

        t.handle_event(&doc, form, EventKind::Submit).unwrap();
        assert!(t.store().load(&t.page_key(&doc)).get(EMAIL).is_none());
        t.on_page_hide(&doc).unwrap();
        assert!(t.store().load(&t.page_key(&doc)).get(EMAIL).is_none());

        t.handle_event(&doc, email, EventKind::Change).unwrap();
        t.on_page_hide(&doc).unwrap();
        assert_eq!(t.store().load(&t.page_key(&doc)).get(EMAIL), Some("a@b.c"));
    }

    #[test]
    fn flush_skips_selectors_that_left_the_page() {
        let mut doc = page(LOGIN);
        let mut t = tracker(&MemoryStorage::new());
        t.attach(&mut doc);
        let email = node(&doc, "input[name=\"email\"]");
        doc.set_value(email, "x@y.z");
        t.handle_event(&doc, email, EventKind::Change).unwrap();
        doc.remove(email);
        assert!(t.run_idle(&doc, Instant::now()).unwrap());
        assert!(t.store().load(&t.page_key(&doc)).is_empty());
    }
}
