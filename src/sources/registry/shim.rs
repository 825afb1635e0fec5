//! Shim file parsing for registry packages.
//!
//! A shim is a small TOML document in a registry index describing where a
//! published version's artifact actually lives: an archive (with an
//! optional checksum) or a git repository pinned to a full commit.

use anyhow::{bail, Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::source::is_full_commit;
use crate::core::Integrity;

/// A parsed shim file from a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shim {
    /// Package metadata
    pub package: ShimPackage,

    /// Source specification (archive or git)
    pub source: ShimSource,
}

/// Package metadata in a shim file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShimPackage {
    pub name: String,

    /// Exact version
    pub version: String,
}

/// Source specification - where to fetch the actual code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShimSource {
    #[serde(default)]
    pub archive: Option<ArchiveSource>,

    #[serde(default)]
    pub git: Option<GitSource>,
}

/// Archive source specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSource {
    /// Download URL
    pub url: String,

    /// Hash of the archive bytes, `sha256:<hex>` or bare hex
    #[serde(default)]
    pub checksum: Option<String>,

    /// Directory prefix to strip from the archive (e.g., "zlib-1.3.1")
    #[serde(default)]
    pub strip_prefix: Option<String>,
}

/// Git source specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSource {
    /// Git repository URL
    pub url: String,

    /// Full commit SHA (40 hex chars) - tags/branches not allowed
    pub rev: String,
}

/// A shim's artifact, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Archive {
        url: Url,
        checksum: Option<Integrity>,
        strip_prefix: Option<String>,
    },
    Git {
        url: Url,
        rev: String,
    },
}

impl Shim {
    /// Parse and validate a shim. `origin` names the document in errors.
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        let shim: Shim = toml::from_str(content)
            .with_context(|| format!("failed to parse shim file: {}", origin))?;

        shim.validate()
            .with_context(|| format!("invalid shim file: {}", origin))?;
        Ok(shim)
    }

    /// Validate the shim file contents.
    pub fn validate(&self) -> Result<()> {
        validate_package_name(&self.package.name)?;

        Version::parse(&self.package.version)
            .with_context(|| format!("invalid version '{}' in shim", self.package.version))?;

        self.artifact().map(|_| ())
    }

    /// The validated artifact this shim points at.
    pub fn artifact(&self) -> Result<Artifact> {
        match (&self.source.archive, &self.source.git) {
            (Some(_), Some(_)) => bail!("shim cannot specify both archive and git sources"),
            (None, None) => bail!("shim must specify either an archive or a git source"),
            (Some(archive), None) => {
                let url = Url::parse(&archive.url)
                    .with_context(|| format!("invalid archive URL '{}' in shim", archive.url))?;
                let checksum = archive
                    .checksum
                    .as_deref()
                    .map(parse_checksum)
                    .transpose()?;
                Ok(Artifact::Archive {
                    url,
                    checksum,
                    strip_prefix: archive.strip_prefix.clone(),
                })
            }
            (None, Some(git)) => {
                if !is_full_commit(&git.rev) {
                    bail!("git rev must be a full 40-character SHA, got '{}'", git.rev);
                }
                let url = Url::parse(&git.url)
                    .with_context(|| format!("invalid git URL '{}' in shim", git.url))?;
                Ok(Artifact::Git {
                    url,
                    rev: git.rev.to_ascii_lowercase(),
                })
            }
        }
    }

    /// Check that this shim describes exactly `name@version`.
    pub fn matches(&self, name: &str, version: &Version) -> Result<()> {
        if self.package.name != name {
            bail!(
                "shim name mismatch: expected '{}', found '{}'",
                name,
                self.package.name
            );
        }
        if Version::parse(&self.package.version).ok().as_ref() != Some(version) {
            bail!(
                "shim version mismatch: expected '{}', found '{}'",
                version,
                self.package.version
            );
        }
        Ok(())
    }
}

fn parse_checksum(checksum: &str) -> Result<Integrity> {
    if checksum.contains(':') {
        checksum.parse()
    } else {
        Integrity::from_hex(checksum)
    }
}

/// Validate a registry package name.
///
/// Package names must be:
/// - Lowercase only
/// - Characters: [a-z0-9._-]
/// - Non-empty
/// - First character must be [a-z0-9]
pub fn validate_package_name(name: &str) -> Result<()> {
    let Some(first_char) = name.chars().next() else {
        bail!("package name cannot be empty");
    };

    if !first_char.is_ascii_lowercase() && !first_char.is_ascii_digit() {
        bail!(
            "invalid package name '{}': must start with [a-z0-9]",
            name
        );
    }

    for c in name.chars() {
        if !matches!(c, 'a'..='z' | '0'..='9' | '.' | '_' | '-') {
            bail!(
                "invalid package name '{}': only [a-z0-9._-] allowed, found '{}'",
                name,
                c
            );
        }
    }

    Ok(())
}

/// Compute the shim path for a package name and version.
///
/// Algorithm:
/// - letter = first char of name
/// - path = <letter>/<name>/<version>.toml
///
/// Examples:
/// - zlib 1.3.1 -> z/zlib/1.3.1.toml
/// - left-pad 1.0.0 -> l/left-pad/1.0.0.toml
pub fn shim_path(name: &str, version: &Version) -> Result<String> {
    validate_package_name(name)?;

    let first_char = &name[..1];
    Ok(format!("{}/{}/{}.toml", first_char, name, version))
}
