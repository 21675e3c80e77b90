//! Walks a login form through an accidental reload and a submit.
//! Run with: cargo run --example reload_recovery

use formkeeper::platform::{MemoryStorage, RecordingWindow};
use formkeeper::{Document, FormTracker, HostBridge, PageRuntime, ScriptedHost, TrackerConfig};
use url::Url;

const PAGE: &str = r#"
<form id="signup">
  <input type="email" name="email">
  <input type="password" name="password">
  <textarea name="about"></textarea>
  <select name="plan"><option value="free">Free</option><option value="pro">Pro</option></select>
</form>"#;

async fn open(storage: &MemoryStorage, host: &ScriptedHost) -> anyhow::Result<PageRuntime> {
    let (bridge, rx) = HostBridge::channel();
    host.clone().serve(rx);
    let tracker = FormTracker::new(TrackerConfig::default(), bridge)
        .with_storage(storage.clone())
        .with_window(RecordingWindow::answering(true));
    let doc = Document::parse(Url::parse("https://example.com/signup")?, PAGE);
    Ok(PageRuntime::load(doc, tracker).await)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let storage = MemoryStorage::new();
    let host = ScriptedHost::new(Some(true));

    let mut page = open(&storage, &host).await?;
    println!("Capability: {:?}", page.capability());
    page.type_text("input[name=\"email\"]", "ada@example.com")?;
    page.type_text("input[name=\"password\"]", "correct horse")?;
    page.type_text("textarea", "Writes programs for engines.")?;
    page.select_option("select", "pro")?;
    page.settle()?;
    page.page_hide()?;
    println!("Reloading...\n");

    let mut page = open(&storage, &host).await?;
    for selector in ["input[name=\"email\"]", "input[name=\"password\"]", "textarea", "select"] {
        println!("  {:<26} {:?}", selector, page.value_of(selector)?);
    }
    println!("Restored: {:?}\n", page.tracker().restored());

    if let Some(saved) = page.message_json(r#"{"action":"getSaved"}"#).await? {
        println!("Popup view:\n{}\n", serde_json::to_string_pretty(&saved)?);
    }

    page.submit("#signup")?;
    page.page_hide()?;
    let page = open(&storage, &host).await?;
    println!("After submit, email is {:?}", page.value_of("input[name=\"email\"]")?);
    Ok(())
}
