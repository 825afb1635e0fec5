//! Content-addressed package cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/
//! ├── v1/
//! │   └── <key>/
//! │       ├── entry.json     # EntryMeta
//! │       └── package/       # the package tree
//! └── tmp/
//!     ├── <key>.XXXXXX/      # staging, one per publish attempt
//!     └── run-XXXXXX/        # scratch for non-cacheable results
//! ```
//!
//! An entry becomes visible only through a single directory rename from
//! `tmp/` into `v1/`, so readers never observe a partial entry. When two
//! publishers race on one key the first rename wins and later staged
//! content is discarded. Staging directories are [`TempDir`]s, so every
//! exit path (including panics) removes them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, TempDir};

use crate::core::{FetchKey, Integrity, PackageReference};
use crate::util::fs::{ensure_dir, remove_dir_all_if_exists};

/// Directory holding published entries; bumped with the entry format.
pub const LAYOUT_VERSION: &str = "v1";

const ENTRY_FILE: &str = "entry.json";
const PACKAGE_DIR: &str = "package";
const TMP_DIR: &str = "tmp";

/// The persisted record of a published entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: FetchKey,
    pub name: String,
    pub version: String,
    pub source: String,
    /// Integrity reported to callers (archive hash for tarballs)
    pub integrity: Integrity,
    /// Hash of the unpacked tree, used to re-verify the entry
    pub tree_integrity: Integrity,
    /// Resolved commit for git-backed entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Seconds since the Unix epoch
    pub fetched_at: u64,
}

/// A published, immutable cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    path: PathBuf,
    meta: EntryMeta,
}

impl CacheEntry {
    pub fn key(&self) -> &FetchKey {
        &self.meta.key
    }

    /// The package tree.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn integrity(&self) -> &Integrity {
        &self.meta.integrity
    }

    pub fn tree_integrity(&self) -> &Integrity {
        &self.meta.tree_integrity
    }

    pub fn revision(&self) -> Option<&str> {
        self.meta.revision.as_deref()
    }

    pub fn fetched_at(&self) -> u64 {
        self.meta.fetched_at
    }

    pub fn meta(&self) -> &EntryMeta {
        &self.meta
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Absent,
    Present(CacheEntry),
    /// The entry failed verification and has been evicted.
    Corrupt { reason: String },
}

/// A private directory being filled for one publish attempt.
#[derive(Debug)]
pub struct Staging {
    key: FetchKey,
    dir: TempDir,
}

impl Staging {
    /// Where the fetcher writes the package tree.
    pub fn package_dir(&self) -> PathBuf {
        self.dir.path().join(PACKAGE_DIR)
    }
}

/// Result of re-verifying every entry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: usize,
    /// Evicted entries and why
    pub corrupt: Vec<(FetchKey, String)>,
}

/// The shared on-disk store.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    scratch: TempDir,
    scratch_counter: AtomicU64,
    verify_on_lookup: bool,
}

impl CacheStore {
    /// Open (creating if needed) the store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_dir(&root.join(LAYOUT_VERSION))?;
        ensure_dir(&root.join(TMP_DIR))?;

        let scratch = Builder::new()
            .prefix("run-")
            .tempdir_in(root.join(TMP_DIR))
            .with_context(|| format!("failed to create scratch area in {}", root.display()))?;

        Ok(CacheStore {
            root,
            scratch,
            scratch_counter: AtomicU64::new(0),
            verify_on_lookup: false,
        })
    }

    /// Re-hash every entry's tree on lookup.
    pub fn with_verify_on_lookup(mut self, verify: bool) -> Self {
        self.verify_on_lookup = verify;
        self
    }

    /// Get the cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entries_dir(&self) -> PathBuf {
        self.root.join(LAYOUT_VERSION)
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    /// Where an entry is (or would be) published.
    pub fn entry_dir(&self, key: &FetchKey) -> PathBuf {
        self.entries_dir().join(key.as_str())
    }

    /// Find a published entry.
    pub fn lookup(&self, key: &FetchKey) -> Result<Lookup> {
        let dir = self.entry_dir(key);
        if !dir.exists() {
            return Ok(Lookup::Absent);
        }

        let checked = read_entry(&dir).and_then(|entry| {
            if !self.verify_on_lookup {
                return Ok(entry);
            }
            let actual = Integrity::of_tree(entry.path()).map_err(|e| format!("{:#}", e))?;
            match actual.verify(entry.tree_integrity()) {
                Ok(()) => Ok(entry),
                Err(mismatch) => Err(format!(
                    "tree hash is {}, recorded {}",
                    mismatch.actual, mismatch.expected
                )),
            }
        });

        match checked {
            Ok(entry) => {
                tracing::debug!("Cache hit for {}", key);
                Ok(Lookup::Present(entry))
            }
            Err(reason) => {
                tracing::warn!("Evicting corrupt cache entry {}: {}", key, reason);
                self.evict(key)?;
                Ok(Lookup::Corrupt { reason })
            }
        }
    }

    /// Start a publish attempt.
    pub fn begin_publish(&self, key: &FetchKey) -> Result<Staging> {
        let dir = Builder::new()
            .prefix(&format!("{}.", key))
            .tempdir_in(self.tmp_dir())
            .with_context(|| format!("failed to create staging directory for {}", key))?;

        let staging = Staging {
            key: key.clone(),
            dir,
        };
        ensure_dir(&staging.package_dir())?;
        Ok(staging)
    }

    /// Atomically publish staged content.
    ///
    /// If the key was published meanwhile, the existing entry is returned
    /// and the staged content is discarded.
    pub fn commit_publish(
        &self,
        staging: Staging,
        reference: &PackageReference,
        integrity: &Integrity,
        revision: Option<&str>,
    ) -> Result<CacheEntry> {
        let tree_integrity = Integrity::of_tree(&staging.package_dir())?;
        let meta = EntryMeta {
            key: staging.key.clone(),
            name: reference.name().to_string(),
            version: reference.version().to_string(),
            source: reference.source().to_string(),
            integrity: integrity.clone(),
            tree_integrity,
            revision: revision.map(str::to_string),
            fetched_at: now_secs(),
        };

        let json = serde_json::to_string_pretty(&meta).context("failed to serialize cache entry")?;
        fs::write(staging.dir.path().join(ENTRY_FILE), json)
            .with_context(|| format!("failed to write cache entry for {}", staging.key))?;

        let target = self.entry_dir(&staging.key);
        match fs::rename(staging.dir.path(), &target) {
            Ok(()) => {
                tracing::debug!("Published {} to {}", staging.key, target.display());
                // The TempDir guard now points at nothing; dropping it is a no-op
                drop(staging);
                Ok(CacheEntry {
                    path: target.join(PACKAGE_DIR),
                    meta,
                })
            }
            Err(err) if target.join(ENTRY_FILE).is_file() => {
                tracing::debug!(
                    "{} was published concurrently, discarding staged copy ({})",
                    staging.key,
                    err
                );
                drop(staging);
                read_entry(&target).map_err(|reason| anyhow::anyhow!(reason))
            }
            Err(err) => Err(err).with_context(|| {
                format!("failed to publish cache entry to {}", target.display())
            }),
        }
    }

    /// Discard a publish attempt.
    pub fn abort_publish(&self, staging: Staging) {
        tracing::debug!("Discarding staged content for {}", staging.key);
        drop(staging);
    }

    /// A fresh run-scoped directory for content that is never published.
    ///
    /// Removed when the store is dropped.
    pub fn scratch_dir(&self, key: &FetchKey) -> Result<PathBuf> {
        let n = self.scratch_counter.fetch_add(1, Ordering::Relaxed);
        let dir = self.scratch.path().join(format!("{}-{}", key, n));
        ensure_dir(&dir)?;
        Ok(dir)
    }

    /// List published entries, sorted by key.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let dir = self.entries_dir();
        let mut entries = Vec::new();

        for item in fs::read_dir(&dir)
            .with_context(|| format!("failed to read cache directory: {}", dir.display()))?
        {
            let item = item?;
            let name = item.file_name();
            let Some(key) = name.to_str().and_then(FetchKey::from_dir_name) else {
                continue;
            };
            match read_entry(&item.path()) {
                Ok(entry) => entries.push(entry),
                Err(reason) => tracing::warn!("Skipping unreadable cache entry {}: {}", key, reason),
            }
        }

        entries.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(entries)
    }

    /// Remove one entry. Returns whether it existed.
    pub fn evict(&self, key: &FetchKey) -> Result<bool> {
        let dir = self.entry_dir(key);

        // Move out of view first so no reader sees a half-deleted entry
        let trash = Builder::new()
            .prefix("evict-")
            .tempdir_in(self.tmp_dir())
            .context("failed to create eviction directory")?;

        match fs::rename(&dir, trash.path().join(key.as_str())) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("failed to evict {}", dir.display())),
        }
    }

    /// Remove every entry and stale temporary directory. Returns the number
    /// of entries removed.
    pub fn clean(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(self.entries_dir())? {
            let name = entry?.file_name();
            if let Some(key) = name.to_str().and_then(FetchKey::from_dir_name) {
                if self.evict(&key)? {
                    removed += 1;
                }
            }
        }

        for entry in fs::read_dir(self.tmp_dir())? {
            let path = entry?.path();
            if path != self.scratch.path() {
                remove_dir_all_if_exists(&path)?;
            }
        }

        Ok(removed)
    }

    /// Re-hash every entry, evicting the ones that no longer match.
    pub fn verify_all(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();

        for entry in self.entries()? {
            report.checked += 1;
            let reason = match Integrity::of_tree(entry.path()) {
                Ok(actual) => match actual.verify(entry.tree_integrity()) {
                    Ok(()) => continue,
                    Err(mismatch) => format!(
                        "tree hash is {}, recorded {}",
                        mismatch.actual, mismatch.expected
                    ),
                },
                Err(e) => format!("{:#}", e),
            };

            tracing::warn!("Evicting corrupt cache entry {}: {}", entry.key(), reason);
            self.evict(entry.key())?;
            report.corrupt.push((entry.key().clone(), reason));
        }

        Ok(report)
    }
}

/// Read an entry directory. Errors are corruption reasons.
fn read_entry(dir: &Path) -> Result<CacheEntry, String> {
    let record = dir.join(ENTRY_FILE);
    let contents = fs::read_to_string(&record)
        .map_err(|e| format!("cannot read {}: {}", record.display(), e))?;
    let meta: EntryMeta = serde_json::from_str(&contents)
        .map_err(|e| format!("malformed {}: {}", record.display(), e))?;

    let path = dir.join(PACKAGE_DIR);
    if !path.is_dir() {
        return Err(format!("missing package directory {}", path.display()));
    }

    Ok(CacheEntry { path, meta })
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SourceDescriptor;
    use crate::test_support::{package, write_tree};
    use tempfile::TempDir;

    fn reference() -> PackageReference {
        package(
            "left-pad",
            "1.0.0",
            SourceDescriptor::parse("tarball+https://x/left-pad-1.0.0.tgz").unwrap(),
        )
    }

    fn publish(store: &CacheStore, files: &[(&str, &str)]) -> CacheEntry {
        let reference = reference();
        let key = FetchKey::for_reference(&reference);
        let staging = store.begin_publish(&key).unwrap();
        write_tree(&staging.package_dir(), files);
        store
            .commit_publish(staging, &reference, &Integrity::of_bytes(b"archive"), None)
            .unwrap()
    }

    #[test]
    fn test_publish_then_lookup() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        let key = FetchKey::for_reference(&reference());

        assert_eq!(store.lookup(&key).unwrap(), Lookup::Absent);

        let entry = publish(&store, &[("index.js", "module.exports = 1")]);
        assert_eq!(entry.key(), &key);
        assert!(entry.path().join("index.js").exists());
        assert_eq!(entry.integrity(), &Integrity::of_bytes(b"archive"));

        match store.lookup(&key).unwrap() {
            Lookup::Present(found) => assert_eq!(found, entry),
            other => panic!("expected entry, got {:?}", other),
        }

        // Entries survive reopening the store
        drop(store);
        let reopened = CacheStore::open(tmp.path()).unwrap();
        assert!(matches!(reopened.lookup(&key).unwrap(), Lookup::Present(_)));
    }

    #[test]
    fn test_first_publisher_wins() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        let reference = reference();
        let key = FetchKey::for_reference(&reference);

        let first = store.begin_publish(&key).unwrap();
        let second = store.begin_publish(&key).unwrap();
        write_tree(&first.package_dir(), &[("a.txt", "first")]);
        write_tree(&second.package_dir(), &[("a.txt", "second")]);

        let integrity = Integrity::of_bytes(b"x");
        let a = store.commit_publish(first, &reference, &integrity, None).unwrap();
        let b = store.commit_publish(second, &reference, &integrity, None).unwrap();

        assert_eq!(a.path(), b.path());
        assert_eq!(fs::read_to_string(b.path().join("a.txt")).unwrap(), "first");
    }

    #[test]
    fn test_abort_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        let key = FetchKey::for_reference(&reference());

        let staging = store.begin_publish(&key).unwrap();
        let staged = staging.package_dir();
        write_tree(&staged, &[("a.txt", "partial")]);
        store.abort_publish(staging);

        assert!(!staged.exists());
        assert_eq!(store.lookup(&key).unwrap(), Lookup::Absent);
    }

    #[test]
    fn test_corrupt_entry_is_evicted() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path())
            .unwrap()
            .with_verify_on_lookup(true);
        let entry = publish(&store, &[("index.js", "module.exports = 1")]);

        fs::write(entry.path().join("index.js"), "tampered").unwrap();

        assert!(matches!(
            store.lookup(entry.key()).unwrap(),
            Lookup::Corrupt { .. }
        ));
        assert_eq!(store.lookup(entry.key()).unwrap(), Lookup::Absent);
    }

    #[test]
    fn test_missing_record_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        let entry = publish(&store, &[("index.js", "x")]);

        fs::remove_file(store.entry_dir(entry.key()).join(ENTRY_FILE)).unwrap();

        assert!(matches!(
            store.lookup(entry.key()).unwrap(),
            Lookup::Corrupt { .. }
        ));
        assert!(!store.entry_dir(entry.key()).exists());
    }

    #[test]
    fn test_scratch_is_run_scoped() {
        let tmp = TempDir::new().unwrap();
        let key = FetchKey::for_reference(&reference());

        let (first, second) = {
            let store = CacheStore::open(tmp.path()).unwrap();
            let first = store.scratch_dir(&key).unwrap();
            let second = store.scratch_dir(&key).unwrap();
            assert!(first.exists());
            assert_ne!(first, second);
            (first, second)
        };

        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[test]
    fn test_entries_evict_and_clean() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        let entry = publish(&store, &[("index.js", "x")]);

        let listed = store.entries().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].meta().name, "left-pad");

        assert!(store.evict(entry.key()).unwrap());
        assert!(!store.evict(entry.key()).unwrap());
        assert!(store.entries().unwrap().is_empty());

        publish(&store, &[("index.js", "x")]);
        assert_eq!(store.clean().unwrap(), 1);
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_verify_all_reports_tampering() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        let entry = publish(&store, &[("index.js", "x")]);

        assert_eq!(store.verify_all().unwrap().corrupt.len(), 0);

        fs::write(entry.path().join("extra.js"), "injected").unwrap();
        let report = store.verify_all().unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.corrupt.len(), 1);
        assert_eq!(&report.corrupt[0].0, entry.key());
        assert_eq!(store.lookup(entry.key()).unwrap(), Lookup::Absent);
    }
}
