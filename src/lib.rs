//! FormKeeper form state tracker
//!
//! Keeps what a user typed into a page's forms across accidental reloads and
//! navigations, without cooperation from the page.
//!
//! # Features
//!
//! - **Stable selectors**: fields are identified by a selector derived from
//!   their markup and accepted only when it matches the field alone
//! - **Per-page records**: one JSON object per page URL in page storage
//! - **Live pages**: fields added or removed after load are restored and
//!   captured as they come and go
//! - **Idle flushes**: bursts of changes are written once, during idle time
//! - **Capability gate**: restores wait for an active subscription, saving never does
//!
//! # Example
//!
//! ```
//! use formkeeper::{derive_selector, Document};
//! use url::Url;
//!
//! let url = Url::parse("https://example.com/login").unwrap();
//! let doc = Document::parse(url, r#"<form id="login"><input type="email" name="email"></form>"#);
//! let input = doc.query_selector("input").unwrap().unwrap();
//! assert_eq!(
//!     derive_selector(&doc, input).as_deref(),
//!     Some(r#"#login input[type="email"][name="email"]"#)
//! );
//! ```

pub mod error;
pub use error::{Error, Result, SelectorError};

pub mod bridge;
pub mod debounce;
pub mod derive;
pub mod dom;
pub mod field;
pub mod gate;
pub mod platform;
pub mod runtime;
pub mod store;
pub mod tracker;

pub use bridge::{HostBridge, InboundMessage, MainPayload, OutboundMessage, ScriptedHost};
pub use derive::derive_selector;
pub use dom::{Document, NodeId};
pub use field::FieldKind;
pub use gate::{Capability, CapabilityGate};
pub use runtime::PageRuntime;
pub use store::{PageKey, PageRecord, PersistenceStore};
pub use tracker::{EventKind, FormTracker};

/// Configuration of a [`FormTracker`]
///
/// # Examples
///
/// ```
/// let cfg = formkeeper::TrackerConfig::default();
/// assert_eq!(cfg.key_prefix, "form-saver-");
/// ```
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Prefix of the storage key; the page URL is appended
    pub key_prefix: String,
    /// Where `openApp` sends the page
    pub activation_url: String,
    /// Confirmation shown before wiping a page
    pub clear_prompt: String,
    /// Alert shown when fill or copy lacks the capability
    pub inactive_alert: String,
    /// Whether the page offers an idle callback API
    pub idle_callback: bool,
    /// Delay of the timer used instead of idle callbacks, in milliseconds
    pub idle_fallback_delay_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            key_prefix: store::DEFAULT_KEY_PREFIX.to_string(),
            activation_url: "form-keeper://activate".to_string(),
            clear_prompt: "Clear saved form data for this page and reload?".to_string(),
            inactive_alert: "Please activate FormKeeper to use this feature".to_string(),
            idle_callback: true,
            idle_fallback_delay_ms: 1,
        }
    }
}
