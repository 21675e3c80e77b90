//! Drives one page the way a browser tab would: user input becomes DOM
//! changes plus events, mutation records are delivered after every task,
//! and idle periods fire the tracker's scheduled flush.

use std::time::Instant;

use log::warn;
use serde_json::Value;

use crate::bridge::{InboundMessage, MainPayload};
use crate::dom::{Document, NodeId};
use crate::gate::Capability;
use crate::tracker::{EventKind, FormTracker};
use crate::{Error, Result};

pub struct PageRuntime {
    doc: Document,
    tracker: FormTracker,
}

impl PageRuntime {
    pub fn new(doc: Document, tracker: FormTracker) -> Self {
        Self { doc, tracker }
    }

    /// Load the page: attach the tracker and resolve the capability.
    pub async fn load(doc: Document, tracker: FormTracker) -> Self {
        let mut page = Self::new(doc, tracker);
        page.tracker.initialize(&mut page.doc).await;
        page
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Mutable access for page scripts. Changes are seen by the tracker on
    /// the next [`deliver_mutations`](Self::deliver_mutations).
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn tracker(&self) -> &FormTracker {
        &self.tracker
    }

    pub fn capability(&self) -> Capability {
        self.tracker.capability()
    }

    pub fn into_parts(self) -> (Document, FormTracker) {
        (self.doc, self.tracker)
    }

    pub fn find(&self, selector: &str) -> Result<NodeId> {
        self.doc
            .query_selector(selector)?
            .ok_or_else(|| Error::Other(format!("no element matches {}", selector)))
    }

    pub fn value_of(&self, selector: &str) -> Result<String> {
        Ok(self.doc.value(self.find(selector)?))
    }

    /// Hand pending mutation records to the tracker.
    pub fn deliver_mutations(&mut self) -> Result<()> {
        if !self.doc.has_pending_records() {
            return Ok(());
        }
        let records = self.doc.take_records();
        self.tracker.handle_mutations(&mut self.doc, records)
    }

    /// Dispatch an event at `target`, then deliver any mutations it caused.
    pub fn dispatch(&mut self, target: NodeId, event: EventKind) -> Result<()> {
        self.deliver_mutations()?;
        self.tracker.handle_event(&self.doc, target, event)?;
        self.deliver_mutations()
    }

    /// Type into an input or textarea and commit (`change`).
    pub fn type_text(&mut self, selector: &str, text: &str) -> Result<()> {
        let node = self.find(selector)?;
        self.doc.set_value(node, text);
        self.dispatch(node, EventKind::Change)
    }

    pub fn set_checked(&mut self, selector: &str, checked: bool) -> Result<()> {
        let node = self.find(selector)?;
        self.doc.set_checked(node, checked);
        self.dispatch(node, EventKind::Change)
    }

    /// Pick the option with `value` in a select.
    pub fn select_option(&mut self, selector: &str, value: &str) -> Result<()> {
        let select = self.find(selector)?;
        let option = self
            .doc
            .options(select)
            .into_iter()
            .find(|&o| self.doc.value(o) == value)
            .ok_or_else(|| Error::Other(format!("{} has no option {}", selector, value)))?;
        self.doc.set_selected(option, true);
        self.dispatch(select, EventKind::Change)
    }

    /// Replace a content-editable region's content (`input`).
    pub fn edit_content(&mut self, selector: &str, html: &str) -> Result<()> {
        let node = self.find(selector)?;
        self.doc.set_inner_html(node, html);
        self.dispatch(node, EventKind::Input)
    }

    pub fn submit(&mut self, selector: &str) -> Result<()> {
        let form = self.find(selector)?;
        self.dispatch(form, EventKind::Submit)
    }

    /// One idle period at `now`. Returns whether a flush ran.
    pub fn run_idle_at(&mut self, now: Instant) -> Result<bool> {
        self.deliver_mutations()?;
        let flushed = self.tracker.run_idle(&self.doc, now)?;
        self.deliver_mutations()?;
        Ok(flushed)
    }

    pub fn run_idle(&mut self) -> Result<bool> {
        self.run_idle_at(Instant::now())
    }

    /// Deliver mutations and run idle periods until no flush is scheduled.
    pub fn settle(&mut self) -> Result<()> {
        self.deliver_mutations()?;
        while self.tracker.has_scheduled_flush() {
            let now = match self.tracker.next_idle_deadline() {
                Some(deadline) => deadline.max(Instant::now()),
                None => Instant::now(),
            };
            if !self.run_idle_at(now)? {
                break;
            }
        }
        Ok(())
    }

    /// Deliver a host command.
    pub async fn message(&mut self, message: InboundMessage) -> Result<Option<MainPayload>> {
        self.deliver_mutations()?;
        let reply = self.tracker.handle_message(&mut self.doc, message).await?;
        self.deliver_mutations()?;
        Ok(reply)
    }

    /// Deliver a raw JSON command. Unknown actions are logged and ignored.
    pub async fn message_json(&mut self, raw: &str) -> Result<Option<Value>> {
        let message = match InboundMessage::from_json(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("{}", e);
                return Ok(None);
            }
        };
        match self.message(message).await? {
            Some(payload) => Ok(Some(serde_json::to_value(payload)?)),
            None => Ok(None),
        }
    }

    /// The page is going away: capture everything synchronously.
    pub fn page_hide(&mut self) -> Result<()> {
        self.deliver_mutations()?;
        self.tracker.on_page_hide(&self.doc)
    }
}
