//! Fetch keys - the stable identity of one logical fetch.
//!
//! A key is derived from the package name, version and canonical source
//! descriptor. Git sources that were re-resolved from a branch or tag also
//! mix in the concrete commit, so a moved branch yields a new key instead of
//! reusing stale content.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::PackageReference;
use crate::util::hash::Fingerprint;

/// Bumped whenever the key derivation or the cached layout changes.
const KEY_VERSION: &str = "quay-fetch-key-1";

/// A stable identifier for cache addressing and fetch deduplication.
///
/// Rendered as `<name>-<version>-<16 hex chars>` so cache directories stay
/// readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchKey(String);

impl FetchKey {
    /// The key of a reference as requested, before any pinning.
    pub fn for_reference(reference: &PackageReference) -> Self {
        Self::derive(reference, None)
    }

    /// The key of a reference pinned to a concrete revision.
    pub fn pinned(reference: &PackageReference, revision: &str) -> Self {
        Self::derive(reference, Some(revision))
    }

    fn derive(reference: &PackageReference, revision: Option<&str>) -> Self {
        let mut fp = Fingerprint::new();
        fp.update_str(KEY_VERSION)
            .update_str(reference.name())
            .update_str(&reference.version().to_string())
            .update_str(&reference.source().to_string())
            .update_opt(revision);

        FetchKey(format!(
            "{}-{}-{}",
            sanitize(reference.name()),
            sanitize(&reference.version().to_string()),
            fp.finish_short()
        ))
    }

    /// Rebuild a key from a cache directory name.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let (_, hash) = name.rsplit_once('-')?;
        let valid = hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit());
        valid.then(|| FetchKey(name.to_string()))
    }

    /// Get the key as a string (also its directory name).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Keep only characters that are safe in a directory name.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
