//! Integrity hashes - HOW we know fetched content is the content we wanted.
//!
//! An [`Integrity`] is a SHA-256 digest rendered as `sha256:<hex>`. It is
//! computed either over an exact artifact (a downloaded archive) or over a
//! canonical walk of an unpacked package tree.
//!
//! Tree hashing visits entries in file-name order within each directory and
//! hashes relative paths (always `/`-separated), the entry type, file bytes
//! and symlink targets. Timestamps, permissions and ownership are ignored, so
//! identical content yields identical hashes on every platform.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::{DirEntry, WalkDir};

use crate::util::hash::{sha256_bytes, sha256_file, update_from_reader};

/// The only supported digest algorithm.
pub const ALGORITHM: &str = "sha256";

/// Directory names never included in a tree hash.
const IGNORED_DIRS: &[&str] = &[".git"];

/// A content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Integrity {
    /// Lowercase hex digest
    digest: String,
}

/// Two digests disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: Integrity,
    pub actual: Integrity,
}

impl Integrity {
    /// Build an integrity from a hex digest.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("invalid {} digest '{}': expected hex characters", ALGORITHM, hex);
        }
        Ok(Integrity {
            digest: hex.to_ascii_lowercase(),
        })
    }

    /// Hash an in-memory artifact.
    pub fn of_bytes(data: &[u8]) -> Self {
        Integrity {
            digest: sha256_bytes(data),
        }
    }

    /// Hash a single file's bytes.
    pub fn of_file(path: &Path) -> Result<Self> {
        Ok(Integrity {
            digest: sha256_file(path)?,
        })
    }

    /// Hash a directory tree in canonical order.
    pub fn of_tree(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("cannot hash tree: {} is not a directory", root.display());
        }

        let mut hasher = Sha256::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_ignored(e));

        for entry in walker {
            let entry =
                entry.with_context(|| format!("failed to walk directory: {}", root.display()))?;
            let relative = canonical_relative(root, entry.path())?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                hasher.update(b"d\0");
                hasher.update(relative.as_bytes());
                hasher.update(b"\0");
            } else if file_type.is_symlink() {
                let target = std::fs::read_link(entry.path()).with_context(|| {
                    format!("failed to read symlink: {}", entry.path().display())
                })?;
                hasher.update(b"l\0");
                hasher.update(relative.as_bytes());
                hasher.update(b"\0");
                hasher.update(target.to_string_lossy().replace('\\', "/").as_bytes());
                hasher.update(b"\0");
            } else {
                let len = entry
                    .metadata()
                    .with_context(|| format!("failed to stat: {}", entry.path().display()))?
                    .len();
                hasher.update(b"f\0");
                hasher.update(relative.as_bytes());
                hasher.update(b"\0");
                hasher.update(len.to_le_bytes());

                let file = File::open(entry.path()).with_context(|| {
                    format!("failed to open file for hashing: {}", entry.path().display())
                })?;
                update_from_reader(&mut hasher, BufReader::new(file)).with_context(|| {
                    format!("failed to read file for hashing: {}", entry.path().display())
                })?;
            }
        }

        Ok(Integrity {
            digest: hex::encode(hasher.finalize()),
        })
    }

    /// Get the hex digest.
    pub fn hex(&self) -> &str {
        &self.digest
    }

    /// Compare against an expected digest.
    pub fn verify(&self, expected: &Integrity) -> std::result::Result<(), Mismatch> {
        if self == expected {
            Ok(())
        } else {
            Err(Mismatch {
                expected: expected.clone(),
                actual: self.clone(),
            })
        }
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

/// Render a path relative to `root` with `/` separators.
fn canonical_relative(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    Ok(parts.join("/"))
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", ALGORITHM, self.digest)
    }
}

impl FromStr for Integrity {
    type Err = anyhow::Error;

    /// Accepts `sha256:<hex>` and `sha256-<hex>`.
    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, digest) = s
            .split_once(':')
            .or_else(|| s.split_once('-'))
            .ok_or_else(|| anyhow::anyhow!("invalid integrity '{}': missing algorithm", s))?;

        if !algorithm.eq_ignore_ascii_case(ALGORITHM) {
            bail!(
                "unsupported integrity algorithm '{}' (only {} is supported)",
                algorithm,
                ALGORITHM
            );
        }

        Integrity::from_hex(digest)
    }
}

impl Serialize for Integrity {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Integrity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
    }

    #[test]
    fn test_of_bytes_format() {
        let integrity = Integrity::of_bytes(b"hello");
        assert_eq!(
            integrity.to_string(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_parse() {
        let a: Integrity = "sha256:ABC123".parse().unwrap();
        let b: Integrity = "sha256-abc123".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hex(), "abc123");

        assert!("md5:abc123".parse::<Integrity>().is_err());
        assert!("sha256:xyz".parse::<Integrity>().is_err());
        assert!("abc123".parse::<Integrity>().is_err());
    }

    #[test]
    fn test_verify() {
        let actual = Integrity::of_bytes(b"payload");
        assert!(actual.verify(&actual.clone()).is_ok());

        let expected: Integrity = "sha256:def456".parse().unwrap();
        let mismatch = actual.verify(&expected).unwrap_err();
        assert_eq!(mismatch.expected, expected);
        assert_eq!(mismatch.actual, actual);
    }

    #[test]
    fn test_tree_hash_independent_of_creation_order() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");

        write_tree(&a, &[("src/lib.c", "int x;"), ("README", "hi"), ("z/y.txt", "y")]);
        write_tree(&b, &[("z/y.txt", "y"), ("README", "hi"), ("src/lib.c", "int x;")]);

        assert_eq!(
            Integrity::of_tree(&a).unwrap(),
            Integrity::of_tree(&b).unwrap()
        );
    }

    #[test]
    fn test_tree_hash_detects_content_and_path_changes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("pkg");
        write_tree(&root, &[("index.js", "module.exports = 1;")]);
        let original = Integrity::of_tree(&root).unwrap();

        fs::write(root.join("index.js"), "module.exports = 2;").unwrap();
        let edited = Integrity::of_tree(&root).unwrap();
        assert_ne!(original, edited);

        fs::rename(root.join("index.js"), root.join("main.js")).unwrap();
        let renamed = Integrity::of_tree(&root).unwrap();
        assert_ne!(edited, renamed);
    }

    #[test]
    fn test_tree_hash_ignores_git_dir() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("pkg");
        write_tree(&root, &[("lib.rs", "fn main() {}")]);
        let before = Integrity::of_tree(&root).unwrap();

        write_tree(&root, &[(".git/HEAD", "ref: refs/heads/main")]);
        assert_eq!(before, Integrity::of_tree(&root).unwrap());
    }

    #[test]
    fn test_serde_roundtrip_as_string() {
        let integrity = Integrity::of_bytes(b"x");
        let json = serde_json::to_string(&integrity).unwrap();
        assert_eq!(json, format!("\"{}\"", integrity));
        let back: Integrity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, integrity);
    }
}
