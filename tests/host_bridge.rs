use formkeeper::bridge::{ClipboardKind, HostRequest, OutboundMessage};
use formkeeper::platform::{MemoryStorage, PageStorage, RecordingWindow};
use formkeeper::{
    Capability, Document, FormTracker, HostBridge, PageRecord, PageRuntime, ScriptedHost, TrackerConfig,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use url::Url;

const HTML: &str = r#"<form id="contact"><input name="subject"><textarea name="body"></textarea></form>"#;
const SUBJECT: &str = r#"#contact input[name="subject"]"#;

fn seeded_storage() -> MemoryStorage {
    let record: PageRecord = [
        (SUBJECT.to_string(), "Hello".to_string()),
        ("#contact textarea[name=\"body\"]".to_string(), "Long text".to_string()),
    ]
    .into_iter()
    .collect();
    let storage = MemoryStorage::new();
    storage
        .set_item(
            "form-saver-https://example.com/contact",
            &serde_json::to_string(&record).unwrap(),
        )
        .unwrap();
    storage
}

fn tracker(bridge: HostBridge, storage: &MemoryStorage) -> FormTracker {
    FormTracker::new(TrackerConfig::default(), bridge)
        .with_storage(storage.clone())
        .with_window(RecordingWindow::default())
}

fn doc() -> Document {
    Document::parse(Url::parse("https://example.com/contact").unwrap(), HTML)
}

#[tokio::test]
async fn capability_query_round_trip() {
    let (bridge, rx) = HostBridge::channel();
    let host = ScriptedHost::new(Some(true));
    host.clone().serve(rx);
    assert_eq!(bridge.check_active_subscription().await.unwrap(), Some(true));
    host.set_subscription(None);
    assert_eq!(bridge.check_active_subscription().await.unwrap(), None);
    assert_eq!(host.checks(), 2);
}

#[tokio::test]
async fn hand_written_host_can_answer() {
    let (bridge, mut rx) = HostBridge::channel();
    let host = tokio::spawn(async move {
        let request: HostRequest = rx.recv().await.unwrap();
        assert_eq!(request.message, OutboundMessage::CheckActiveSubscription);
        assert!(request.expects_reply());
        request.respond(json!({ "subscriptionActive": false, "echo": "ignored" }));
    });
    assert_eq!(bridge.check_active_subscription().await.unwrap(), Some(false));
    host.await.unwrap();
}

#[tokio::test]
async fn malformed_or_missing_answers_leave_the_gate_unknown() {
    let storage = seeded_storage();

    let (bridge, mut rx) = HostBridge::channel();
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            request.respond(Value::String("yes".into()));
        }
    });
    let page = PageRuntime::load(doc(), tracker(bridge, &storage)).await;
    assert_eq!(page.capability(), Capability::Unknown);
    assert_eq!(page.value_of("input").unwrap(), "");

    let (bridge, rx) = HostBridge::channel();
    drop(rx);
    let page = PageRuntime::load(doc(), tracker(bridge, &storage)).await;
    assert_eq!(page.capability(), Capability::Unknown);

    let (bridge, mut rx) = HostBridge::channel();
    tokio::spawn(async move {
        // drop every request unanswered
        while let Some(request) = rx.recv().await {
            drop(request);
        }
    });
    let page = PageRuntime::load(doc(), tracker(bridge, &storage)).await;
    assert_eq!(page.capability(), Capability::Unknown);
}

#[tokio::test]
async fn subscription_message_opens_the_gate_and_restores() {
    let storage = seeded_storage();
    let (bridge, rx) = HostBridge::channel();
    ScriptedHost::new(Some(false)).serve(rx);
    let mut page = PageRuntime::load(doc(), tracker(bridge, &storage)).await;
    assert_eq!(page.capability(), Capability::Inactive);
    assert_eq!(page.value_of("input").unwrap(), "");

    page.message_json(r#"{"action":"subscriptionActive","subscriptionActive":true}"#)
        .await
        .unwrap();
    assert_eq!(page.capability(), Capability::Active);
    assert_eq!(page.value_of("input").unwrap(), "Hello");
    assert_eq!(page.value_of("textarea").unwrap(), "Long text");
}

#[tokio::test]
async fn get_saved_reply_is_popup_json() {
    let storage = seeded_storage();
    let (bridge, rx) = HostBridge::channel();
    ScriptedHost::new(Some(true)).serve(rx);
    let mut page = PageRuntime::load(doc(), tracker(bridge, &storage)).await;

    let reply = page.message_json(r#"{"action":"getSaved"}"#).await.unwrap().unwrap();
    assert_eq!(
        reply,
        json!({ "elements": [
            { "selector": SUBJECT, "presense": "visible", "savedContent": "Hello", "restored": true },
            { "selector": "#contact textarea[name=\"body\"]", "presense": "visible", "savedContent": "Long text", "restored": true },
        ]})
    );

    assert!(page.message_json(r#"{"action":"dance"}"#).await.unwrap().is_none());
    assert!(page.message_json(r#"{"action":"focusElement"}"#).await.unwrap().is_none());
}

#[tokio::test]
async fn copy_goes_to_the_host_clipboard() {
    let storage = seeded_storage();
    let (bridge, mut rx) = HostBridge::channel();
    let (copies_tx, mut copies) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            if let OutboundMessage::CopyToClipboard { kind, data } = &request.message {
                copies_tx.send((*kind, data.clone())).unwrap();
                continue;
            }
            request.respond(json!({ "subscriptionActive": true }));
        }
    });
    let mut page = PageRuntime::load(doc(), tracker(bridge, &storage)).await;
    page.message_json(&json!({ "action": "copyElement", "selector": SUBJECT }).to_string())
        .await
        .unwrap();
    assert_eq!(
        copies.recv().await.unwrap(),
        (ClipboardKind::Text, "Hello".to_string())
    );
}
