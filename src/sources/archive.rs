//! Tarball extraction.
//!
//! Supports `.tar.gz`/`.tgz` and plain `.tar` archives (detected by the gzip
//! magic bytes). Every entry is checked before it is written: absolute
//! paths and `..` components are rejected, symlink targets must stay inside
//! the destination, and nothing is ever written through a symlink.

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::util::fs::ensure_dir;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Leading directory handling during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strip<'a> {
    /// Extract paths as they are.
    None,
    /// Remove this leading directory (e.g. `zlib-1.3.1`).
    Prefix(&'a str),
    /// If every entry lives under one top-level directory, remove it.
    SingleRoot,
}

/// Extract an archive into `dest`, creating it if needed.
pub fn extract_tarball(data: &[u8], dest: &Path, strip: Strip<'_>) -> Result<()> {
    let prefix: Option<PathBuf> = match strip {
        Strip::None => None,
        Strip::Prefix(prefix) => {
            let prefix = prefix.trim_matches('/');
            (!prefix.is_empty()).then(|| PathBuf::from(prefix))
        }
        Strip::SingleRoot => single_root(data)?,
    };

    ensure_dir(dest)?;

    let mut archive = open(data);
    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_type = entry.header().entry_type();
        if is_metadata(entry_type) {
            continue;
        }

        let entry_path = entry.path().context("failed to get entry path")?.into_owned();
        let relative = match strip_path(&entry_path, prefix.as_deref())? {
            Some(relative) => relative,
            None => continue,
        };
        let output_path = dest.join(&relative);

        ensure_no_symlink_in_path(dest, &relative)?;
        if let Some(parent) = output_path.parent() {
            ensure_dir(parent)?;
        }

        match entry_type {
            EntryType::Directory => ensure_dir(&output_path)?,
            EntryType::Regular | EntryType::Continuous => {
                entry.unpack(&output_path).with_context(|| {
                    format!("failed to extract file: {}", output_path.display())
                })?;
            }
            EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .context("failed to read symlink target")?
                    .map(|t| t.into_owned());
                if let Some(target) = target {
                    if !stays_inside(&relative, &target) {
                        bail!(
                            "tarball symlink {} points outside the package: {}",
                            entry_path.display(),
                            target.display()
                        );
                    }
                    create_symlink(&target, &output_path)?;
                }
            }
            EntryType::Link => {
                // Hard links name another entry in the same archive
                let target = entry
                    .link_name()
                    .context("failed to read hard link target")?
                    .map(|t| t.into_owned());
                let source = match target {
                    Some(target) => match strip_path(&target, prefix.as_deref())? {
                        Some(rel) => rel,
                        None => continue,
                    },
                    None => continue,
                };
                ensure_no_symlink_in_path(dest, &source)?;
                let source = dest.join(source);
                let is_file = fs::symlink_metadata(&source)
                    .map(|meta| meta.is_file())
                    .unwrap_or(false);
                if !is_file {
                    bail!(
                        "tarball hard link {} does not name an extracted file: {}",
                        entry_path.display(),
                        source.display()
                    );
                }
                fs::copy(&source, &output_path).with_context(|| {
                    format!("failed to extract hard link: {}", output_path.display())
                })?;
            }
            other => {
                tracing::debug!(
                    "Skipping unsupported entry type {:?}: {}",
                    other,
                    entry_path.display()
                );
            }
        }
    }

    Ok(())
}

fn open(data: &[u8]) -> Archive<Box<dyn Read + '_>> {
    let reader: Box<dyn Read + '_> = if data.starts_with(&GZIP_MAGIC) {
        Box::new(GzDecoder::new(Cursor::new(data)))
    } else {
        Box::new(Cursor::new(data))
    };
    Archive::new(reader)
}

fn is_metadata(entry_type: EntryType) -> bool {
    matches!(
        entry_type,
        EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName | EntryType::GNULongLink
    )
}

/// Find the one top-level directory every entry lives under, if any.
fn single_root(data: &[u8]) -> Result<Option<PathBuf>> {
    let mut root: Option<PathBuf> = None;
    let mut nested = false;

    let mut archive = open(data);
    for entry in archive.entries().context("failed to read tarball entries")? {
        let entry = entry.context("failed to read tarball entry")?;
        if is_metadata(entry.header().entry_type()) {
            continue;
        }

        let path = entry.path().context("failed to get entry path")?;
        let mut components = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir));

        let first = match components.next() {
            Some(Component::Normal(first)) => PathBuf::from(first),
            _ => return Ok(None),
        };

        let is_dir = entry.header().entry_type() == EntryType::Directory;
        if components.next().is_some() {
            nested = true;
        } else if !is_dir {
            // A file at the top level
            return Ok(None);
        }

        match &root {
            Some(existing) if *existing != first => return Ok(None),
            Some(_) => {}
            None => root = Some(first),
        }
    }

    Ok(root.filter(|_| nested))
}

/// Validate an entry path and remove the prefix. `None` means skip the entry.
fn strip_path(path: &Path, prefix: Option<&Path>) -> Result<Option<PathBuf>> {
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("tarball entry escapes destination directory: {}", path.display());
            }
        }
    }

    let relative = match prefix {
        Some(prefix) => match relative.strip_prefix(prefix) {
            Ok(stripped) => stripped.to_path_buf(),
            // Entries outside the prefix keep their path
            Err(_) => relative,
        },
        None => relative,
    };

    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}

/// Refuse paths that would be written through an existing symlink.
///
/// Every prefix of `relative` (the entry itself included) is checked, since
/// creating parents or unpacking follows links out of `dest`.
fn ensure_no_symlink_in_path(dest: &Path, relative: &Path) -> Result<()> {
    let mut current = dest.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => bail!(
                "tarball entry {} would be written through symlink {}",
                relative.display(),
                current.display()
            ),
            Ok(_) => {}
            // Nothing below a missing path exists yet
            Err(_) => break,
        }
    }
    Ok(())
}

/// Whether a symlink at `link` (relative to the destination) resolves to a
/// path inside the destination, judged lexically.
fn stays_inside(link: &Path, target: &Path) -> bool {
    let mut depth = link
        .parent()
        .map(|parent| parent.components().count())
        .unwrap_or(0);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(up) => depth = up,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("failed to create symlink: {}", link.display()))
}

#[cfg(windows)]
fn create_symlink(_target: &Path, link: &Path) -> Result<()> {
    tracing::debug!("Skipping symlink on Windows: {}", link.display());
    Ok(())
}
