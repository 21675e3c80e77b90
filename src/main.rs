use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use url::Url;

use formkeeper::derive::derive_selector;
use formkeeper::field::find_fields;
use formkeeper::platform::JsonFileStorage;
use formkeeper::{Document, PageKey, PersistenceStore, TrackerConfig};

#[derive(Parser)]
#[command(name = "formkeeper", version, about = "Inspect pages and saved form state")]
struct Cli {
    /// JSON file the saved pages live in
    #[arg(long, global = true, default_value = "formkeeper-store.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a page's fields with their derived selectors
    Inspect {
        /// HTML file or http(s) URL
        source: String,
        /// Page URL to key a local file under
        #[arg(long)]
        url: Option<String>,
    },
    /// Print what is saved for a page
    Saved { url: String },
    /// Forget one saved field
    Forget { url: String, selector: String },
    /// Wipe everything saved for a page
    Clear { url: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = TrackerConfig::default();
    let mut store = PersistenceStore::new(JsonFileStorage::new(&cli.store));

    match cli.command {
        Command::Inspect { source, url } => {
            let doc = load_page(&source, url.as_deref())?;
            let key = PageKey::new(&config.key_prefix, doc.url());
            let saved = store.load(&key);
            let Some(body) = doc.body() else {
                bail!("{} has no body", source);
            };
            for (node, kind) in find_fields(&doc, body) {
                let selector = derive_selector(&doc, node);
                let visibility = if doc.is_visible(node) { "visible" } else { "hidden" };
                let saved_value = selector.as_deref().and_then(|s| saved.get(s));
                println!(
                    "{:<16} {:<8} {}{}",
                    format!("{:?}", kind),
                    visibility,
                    selector.as_deref().unwrap_or("(unidentifiable)"),
                    saved_value.map(|v| format!("  = {:?}", v)).unwrap_or_default()
                );
            }
        }
        Command::Saved { url } => {
            let key = page_key(&config, &url)?;
            let record = store.load(&key);
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Forget { url, selector } => {
            let key = page_key(&config, &url)?;
            let mut record = store.load(&key);
            if record.remove(&selector).is_none() {
                bail!("nothing saved for {} on {}", selector, url);
            }
            store.save(&key, &record)?;
        }
        Command::Clear { url } => {
            let key = page_key(&config, &url)?;
            store.clear(&key)?;
        }
    }
    Ok(())
}

fn page_key(config: &TrackerConfig, url: &str) -> anyhow::Result<PageKey> {
    let url = Url::parse(url).with_context(|| format!("invalid page URL {}", url))?;
    Ok(PageKey::new(&config.key_prefix, &url))
}

fn load_page(source: &str, url: Option<&str>) -> anyhow::Result<Document> {
    if let Ok(remote) = Url::parse(source) {
        if matches!(remote.scheme(), "http" | "https") {
            return fetch_page(remote);
        }
    }
    let path = Path::new(source);
    let url = match url {
        Some(url) => Url::parse(url).with_context(|| format!("invalid page URL {}", url))?,
        None => {
            let absolute = path
                .canonicalize()
                .with_context(|| format!("cannot open {}", source))?;
            Url::from_file_path(&absolute)
                .map_err(|_| anyhow::anyhow!("cannot turn {} into a URL", absolute.display()))?
        }
    };
    Ok(Document::from_file(url, path)?)
}

#[cfg(feature = "fetch")]
fn fetch_page(url: Url) -> anyhow::Result<Document> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("formkeeper/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let response = client.get(url.clone()).send()?.error_for_status()?;
    let final_url = response.url().clone();
    let html = response.text()?;
    Ok(Document::parse(final_url, &html))
}

#[cfg(not(feature = "fetch"))]
fn fetch_page(url: Url) -> anyhow::Result<Document> {
    bail!("fetching {} needs the `fetch` feature", url)
}
