//! Page records and their persistence.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::platform::PageStorage;
use crate::Result;

/// Default prefix of every storage key.
pub const DEFAULT_KEY_PREFIX: &str = "form-saver-";

/// Storage key of one page: prefix followed by the full page URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey(String);

impl PageKey {
    pub fn new(prefix: &str, url: &Url) -> Self {
        PageKey(format!("{}{}", prefix, url.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selector → encoded value for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageRecord(BTreeMap<String, String>);

impl PageRecord {
    pub fn get(&self, selector: &str) -> Option<&str> {
        self.0.get(selector).map(String::as_str)
    }

    pub fn insert(&mut self, selector: String, value: String) -> Option<String> {
        self.0.insert(selector, value)
    }

    pub fn remove(&mut self, selector: &str) -> Option<String> {
        self.0.remove(selector)
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.0.contains_key(selector)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<(String, String)> for PageRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        PageRecord(iter.into_iter().collect())
    }
}

/// Reads and writes page records as JSON in a [`PageStorage`].
pub struct PersistenceStore {
    storage: Box<dyn PageStorage>,
}

impl PersistenceStore {
    pub fn new(storage: impl PageStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
        }
    }

    /// Load a page's record. Missing or malformed data is an empty record.
    pub fn load(&self, key: &PageKey) -> PageRecord {
        let Some(raw) = self.storage.get_item(key.as_str()) else {
            return PageRecord::default();
        };
        match serde_json::from_str::<Option<PageRecord>>(&raw) {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                warn!("ignoring malformed record under {}: {}", key, e);
                PageRecord::default()
            }
        }
    }

    /// Overwrite a page's record.
    pub fn save(&mut self, key: &PageKey, record: &PageRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.storage.set_item(key.as_str(), &json)?;
        debug!("saved {} entries under {}", record.len(), key);
        Ok(())
    }

    pub fn clear(&mut self, key: &PageKey) -> Result<()> {
        self.storage.remove_item(key.as_str())
    }

    pub fn storage(&self) -> &dyn PageStorage {
        self.storage.as_ref()
    }
}
