//! Messages exchanged with the host (popup and background) and the channel
//! that carries them.
//!
//! The tracker side holds a cloneable [`HostBridge`]; the host side owns the
//! receiving end and answers requests through a `oneshot` reply.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::{Error, Result};

/// Host → tracker commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum InboundMessage {
    Clear,
    GetSaved,
    FocusElement {
        selector: String,
    },
    FillElement {
        selector: String,
    },
    CopyElement {
        selector: String,
    },
    ForgetElement {
        selector: String,
    },
    SubscriptionActive {
        #[serde(rename = "subscriptionActive")]
        subscription_active: bool,
    },
    OpenApp,
}

impl InboundMessage {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::Parse(format!("unexpected message {}: {}", raw, e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardKind {
    Text,
    Html,
}

/// Tracker → host messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum OutboundMessage {
    CheckActiveSubscription,
    CopyToClipboard {
        #[serde(rename = "type")]
        kind: ClipboardKind,
        data: String,
    },
}

/// Reply to [`OutboundMessage::CheckActiveSubscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    #[serde(rename = "subscriptionActive")]
    pub subscription_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Visible,
    Present,
}

/// One row of the popup's field list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementReport {
    pub selector: String,
    /// `null` when no element matches
    #[serde(rename = "presense")]
    pub presence: Option<Presence>,
    #[serde(
        rename = "savedContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub saved_content: Option<String>,
    pub restored: bool,
}

/// Snapshot sent in response to `getSaved` and `forgetElement`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainPayload {
    pub elements: Vec<ElementReport>,
}

impl MainPayload {
    pub fn get(&self, selector: &str) -> Option<&ElementReport> {
        self.elements.iter().find(|e| e.selector == selector)
    }
}

/// A message on its way to the host, with a reply slot when one is awaited.
#[derive(Debug)]
pub struct HostRequest {
    pub message: OutboundMessage,
    reply: Option<oneshot::Sender<Value>>,
}

impl HostRequest {
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Answer the request. Returns `false` when nobody is waiting.
    pub fn respond(self, value: Value) -> bool {
        match self.reply {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostBridge {
    tx: mpsc::UnboundedSender<HostRequest>,
}

impl HostBridge {
    /// A bridge and the receiver the host reads requests from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A bridge with no host behind it: every send fails.
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Send and wait for the host's reply.
    pub async fn request(&self, message: OutboundMessage) -> Result<Value> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(HostRequest {
                message,
                reply: Some(reply_tx),
            })
            .map_err(|e| Error::Bridge(format!("host unreachable: {}", e)))?;
        reply_rx
            .await
            .map_err(|e| Error::Bridge(format!("host dropped the request: {}", e)))
    }

    /// Fire and forget.
    pub fn notify(&self, message: OutboundMessage) -> Result<()> {
        self.tx
            .send(HostRequest {
                message,
                reply: None,
            })
            .map_err(|e| Error::Bridge(format!("host unreachable: {}", e)))
    }

    /// Ask whether the subscription is active. `Ok(None)` when the host
    /// answered without a status.
    pub async fn check_active_subscription(&self) -> Result<Option<bool>> {
        let reply = self
            .request(OutboundMessage::CheckActiveSubscription)
            .await?;
        if reply.is_null() {
            return Ok(None);
        }
        let status: SubscriptionStatus = serde_json::from_value(reply)?;
        Ok(Some(status.subscription_active))
    }

    pub fn copy_to_clipboard(&self, kind: ClipboardKind, data: String) -> Result<()> {
        self.notify(OutboundMessage::CopyToClipboard { kind, data })
    }
}

#[derive(Debug, Default)]
struct ScriptedInner {
    subscription: Option<bool>,
    checks: usize,
    clipboard: Vec<(ClipboardKind, String)>,
}

/// Host stand-in: answers subscription checks from a scripted value and
/// records clipboard requests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHost {
    inner: Arc<Mutex<ScriptedInner>>,
}

impl ScriptedHost {
    /// `None` makes the host answer checks with `null`.
    pub fn new(subscription: Option<bool>) -> Self {
        let host = Self::default();
        host.set_subscription(subscription);
        host
    }

    pub fn set_subscription(&self, subscription: Option<bool>) {
        self.lock().subscription = subscription;
    }

    pub fn checks(&self) -> usize {
        self.lock().checks
    }

    pub fn clipboard(&self) -> Vec<(ClipboardKind, String)> {
        self.lock().clipboard.clone()
    }

    pub fn handle(&self, request: HostRequest) {
        match request.message {
            OutboundMessage::CheckActiveSubscription => {
                let answer = {
                    let mut inner = self.lock();
                    inner.checks += 1;
                    match inner.subscription {
                        Some(active) => serde_json::json!({ "subscriptionActive": active }),
                        None => Value::Null,
                    }
                };
                request.respond(answer);
            }
            OutboundMessage::CopyToClipboard { kind, ref data } => {
                self.lock().clipboard.push((kind, data.clone()));
            }
        }
    }

    /// Answer requests from `rx` on a background task until every bridge is
    /// dropped.
    pub fn serve(self, mut rx: mpsc::UnboundedReceiver<HostRequest>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                self.handle(request);
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, ScriptedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_wire_format() {
        let m = InboundMessage::from_json(r##"{"action":"fillElement","selector":"#a"}"##).unwrap();
        assert_eq!(
            m,
            InboundMessage::FillElement {
                selector: "#a".into()
            }
        );
        let m = InboundMessage::from_json(r#"{"action":"subscriptionActive","subscriptionActive":true}"#)
            .unwrap();
        assert_eq!(
            m,
            InboundMessage::SubscriptionActive {
                subscription_active: true
            }
        );
        assert_eq!(
            InboundMessage::from_json(r#"{"action":"getSaved"}"#).unwrap(),
            InboundMessage::GetSaved
        );
        assert!(matches!(
            InboundMessage::from_json(r#"{"action":"dance"}"#),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn outbound_and_payload_wire_format() {
        let copy = OutboundMessage::CopyToClipboard {
            kind: ClipboardKind::Html,
            data: "<b>x</b>".into(),
        };
        assert_eq!(
            serde_json::to_value(&copy).unwrap(),
            json!({"action": "copyToClipboard", "type": "html", "data": "<b>x</b>"})
        );

        let payload = MainPayload {
            elements: vec![
                ElementReport {
                    selector: "#a".into(),
                    presence: None,
                    saved_content: Some("v".into()),
                    restored: false,
                },
                ElementReport {
                    selector: "#b".into(),
                    presence: Some(Presence::Visible),
                    saved_content: None,
                    restored: true,
                },
            ],
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"elements": [
                {"selector": "#a", "presense": null, "savedContent": "v", "restored": false},
                {"selector": "#b", "presense": "visible", "restored": true},
            ]})
        );
    }

    #[test]
    fn detached_bridge_fails_sends() {
        let bridge = HostBridge::detached();
        assert!(matches!(
            bridge.copy_to_clipboard(ClipboardKind::Text, "x".into()),
            Err(Error::Bridge(_))
        ));
    }
}
