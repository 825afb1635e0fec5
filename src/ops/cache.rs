//! Implementation of `quay cache`.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::core::{FetchKey, Integrity};
use crate::sources::cache::{CacheEntry, CacheStore};

/// One published entry, as reported to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheListing {
    pub key: FetchKey,
    pub name: String,
    pub version: String,
    pub source: String,
    pub integrity: Integrity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub fetched_at: u64,
    pub path: PathBuf,
}

impl From<&CacheEntry> for CacheListing {
    fn from(entry: &CacheEntry) -> Self {
        let meta = entry.meta();
        CacheListing {
            key: meta.key.clone(),
            name: meta.name.clone(),
            version: meta.version.clone(),
            source: meta.source.clone(),
            integrity: meta.integrity.clone(),
            revision: meta.revision.clone(),
            fetched_at: entry.fetched_at(),
            path: entry.path().to_path_buf(),
        }
    }
}

impl CacheListing {
    /// Single-line human form: `name@version  source  key`.
    pub fn summary(&self) -> String {
        match &self.revision {
            Some(rev) => format!(
                "{}@{}  {} ({})  {}",
                self.name,
                self.version,
                self.source,
                &rev[..rev.len().min(12)],
                self.key
            ),
            None => format!("{}@{}  {}  {}", self.name, self.version, self.source, self.key),
        }
    }
}

/// List every published entry, sorted by package name then version.
pub fn list_entries(store: &CacheStore) -> Result<Vec<CacheListing>> {
    let mut listings: Vec<CacheListing> = store.entries()?.iter().map(CacheListing::from).collect();
    listings.sort_by(|a, b| (&a.name, &a.version, &a.key).cmp(&(&b.name, &b.version, &b.key)));
    Ok(listings)
}
