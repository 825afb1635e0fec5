//! Test fixtures for common test scenarios.
//!
//! Archive builders and package trees used across the fetcher, cache and
//! coordinator tests.

use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use semver::Version;
use tar::{Builder, EntryType, Header};

use crate::core::{PackageReference, SourceDescriptor};

/// One entry of a generated archive.
#[derive(Debug, Clone)]
pub struct TarEntry {
    pub path: String,
    pub kind: TarEntryKind,
}

#[derive(Debug, Clone)]
pub enum TarEntryKind {
    File(Vec<u8>),
    Dir,
    Symlink(String),
}

impl TarEntry {
    pub fn file(path: &str, content: impl Into<Vec<u8>>) -> Self {
        TarEntry {
            path: path.to_string(),
            kind: TarEntryKind::File(content.into()),
        }
    }

    pub fn dir(path: &str) -> Self {
        TarEntry {
            path: path.to_string(),
            kind: TarEntryKind::Dir,
        }
    }

    pub fn symlink(path: &str, target: &str) -> Self {
        TarEntry {
            path: path.to_string(),
            kind: TarEntryKind::Symlink(target.to_string()),
        }
    }
}

fn append_entries<W: std::io::Write>(builder: &mut Builder<W>, entries: &[TarEntry]) {
    for entry in entries {
        let mut header = Header::new_gnu();
        match &entry.kind {
            TarEntryKind::File(content) => {
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_entry_type(EntryType::Regular);
                header.set_cksum();
                builder
                    .append_data(&mut header, &entry.path, content.as_slice())
                    .unwrap();
            }
            TarEntryKind::Dir => {
                header.set_size(0);
                header.set_mode(0o755);
                header.set_entry_type(EntryType::Directory);
                header.set_cksum();
                builder
                    .append_data(&mut header, &entry.path, std::io::empty())
                    .unwrap();
            }
            TarEntryKind::Symlink(target) => {
                header.set_size(0);
                header.set_mode(0o777);
                header.set_entry_type(EntryType::Symlink);
                builder
                    .append_link(&mut header, &entry.path, target)
                    .unwrap();
            }
        }
    }
}

/// Build a gzip-compressed tarball in memory.
pub fn tarball(entries: &[TarEntry]) -> Vec<u8> {
    let mut data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut data, Compression::default());
        let mut builder = Builder::new(encoder);
        append_entries(&mut builder, entries);
        builder.into_inner().unwrap().finish().unwrap();
    }
    data
}

/// Build an uncompressed tarball in memory.
pub fn plain_tar(entries: &[TarEntry]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    append_entries(&mut builder, entries);
    builder.into_inner().unwrap()
}

/// The archive most tests fetch: an npm-style `package/` root.
pub fn left_pad_tarball() -> Vec<u8> {
    tarball(&[
        TarEntry::dir("package/"),
        TarEntry::file(
            "package/package.json",
            r#"{"name":"left-pad","version":"1.0.0"}"#,
        ),
        TarEntry::file("package/index.js", "module.exports = leftPad;"),
    ])
}

/// Write files (relative path, content) under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }
}

/// A reference to `name@version` from `source`.
pub fn package(name: &str, version: &str, source: SourceDescriptor) -> PackageReference {
    PackageReference::new(name, Version::parse(version).unwrap(), source)
}
