use log::{debug, info};

use super::{resolve_field, FormTracker};
use crate::bridge::{ClipboardKind, ElementReport, InboundMessage, MainPayload, Presence};
use crate::derive::derive_selector;
use crate::dom::{Document, NodeId};
use crate::field::{self, find_fields, FieldKind};
use crate::Result;

impl FormTracker {
    /// Handle a command from the host. `getSaved` and `forgetElement` answer
    /// with a snapshot; everything else has no response.
    pub async fn handle_message(&mut self, doc: &mut Document, message: InboundMessage) -> Result<Option<MainPayload>> {
        debug!("message {:?}", message);
        match message {
            InboundMessage::Clear => {
                self.clear_page(doc)?;
                Ok(None)
            }
            InboundMessage::GetSaved => Ok(Some(self.snapshot(doc))),
            InboundMessage::FocusElement { selector } => {
                if let Ok(Some(node)) = doc.query_selector(&selector) {
                    focus_field(doc, node);
                }
                Ok(None)
            }
            InboundMessage::FillElement { selector } => {
                self.fill_element(doc, &selector).await;
                Ok(None)
            }
            InboundMessage::CopyElement { selector } => {
                self.copy_element(doc, &selector).await?;
                Ok(None)
            }
            InboundMessage::ForgetElement { selector } => {
                self.forget_element(doc, &selector)?;
                Ok(Some(self.snapshot(doc)))
            }
            InboundMessage::SubscriptionActive {
                subscription_active,
            } => {
                self.set_capability(doc, Some(subscription_active));
                Ok(None)
            }
            InboundMessage::OpenApp => {
                self.window.navigate(&self.config.activation_url);
                Ok(None)
            }
        }
    }

    /// Every saved selector plus every identifiable field on the page, saved
    /// ones first.
    pub fn snapshot(&self, doc: &Document) -> MainPayload {
        let page = self.store.load(&self.page_key(doc));
        let present: Vec<(String, NodeId)> = match doc.body() {
            Some(body) => find_fields(doc, body)
                .into_iter()
                .filter_map(|(node, _)| derive_selector(doc, node).map(|s| (s, node)))
                .collect(),
            None => Vec::new(),
        };

        let mut selectors: Vec<&str> = page.selectors().collect();
        for (selector, _) in &present {
            if !selectors.contains(&selector.as_str()) {
                selectors.push(selector);
            }
        }

        let elements = selectors
            .into_iter()
            .map(|selector| {
                let element = present
                    .iter()
                    .find(|(s, _)| s == selector)
                    .map(|&(_, node)| node)
                    .or_else(|| doc.query_selector(selector).ok().flatten());
                ElementReport {
                    selector: selector.to_string(),
                    presence: element.map(|node| {
                        if doc.is_visible(node) {
                            Presence::Visible
                        } else {
                            Presence::Present
                        }
                    }),
                    saved_content: page.get(selector).map(str::to_string),
                    restored: self.restored.iter().any(|s| s == selector),
                }
            })
            .collect();
        MainPayload { elements }
    }

    /// Ask before wiping; on yes, drop the page record, stop persisting and
    /// reload.
    fn clear_page(&mut self, doc: &Document) -> Result<()> {
        if !self.window.confirm(&self.config.clear_prompt) {
            debug!("wipe declined");
            return Ok(());
        }
        let key = self.page_key(doc);
        self.store.clear(&key)?;
        info!("wiped saved form data for {}", key);
        self.clearing = true;
        self.debouncer.cancel();
        self.window.reload();
        Ok(())
    }

    /// Re-check the capability; alert the user when it is missing.
    async fn require_capability(&mut self, doc: &mut Document) -> bool {
        self.refresh_capability(doc).await;
        if !self.gate.is_open() {
            self.window.alert(&self.config.inactive_alert);
            return false;
        }
        true
    }

    async fn fill_element(&mut self, doc: &mut Document, selector: &str) {
        if !self.require_capability(doc).await {
            return;
        }
        let Some((node, kind)) = resolve_field(doc, selector) else {
            return;
        };
        let page = self.store.load(&self.page_key(doc));
        if let Some(value) = page.get(selector) {
            if field::restore(doc, node, kind, value, true) {
                self.mark_restored(selector);
            }
        }
        focus_field(doc, node);
    }

    async fn copy_element(&mut self, doc: &mut Document, selector: &str) -> Result<()> {
        if !self.require_capability(doc).await {
            return Ok(());
        }
        let page = self.store.load(&self.page_key(doc));
        let Some(value) = page.get(selector) else {
            debug!("nothing saved for {}", selector);
            return Ok(());
        };
        let kind = match resolve_field(doc, selector) {
            Some((_, FieldKind::ContentEditable)) => ClipboardKind::Html,
            _ => ClipboardKind::Text,
        };
        self.bridge.copy_to_clipboard(kind, value.to_string())
    }

    fn forget_element(&mut self, doc: &Document, selector: &str) -> Result<()> {
        let key = self.page_key(doc);
        let mut page = self.store.load(&key);
        page.remove(selector);
        self.store.save(&key, &page)
    }
}

/// Scroll to the centre, focus, and select the text of inputs and textareas.
fn focus_field(doc: &mut Document, node: NodeId) {
    doc.scroll_into_view(node);
    doc.focus(node);
    if matches!(doc.tag_name(node), Some("input" | "textarea")) {
        doc.select_text(node);
    }
}
