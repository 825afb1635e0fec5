//! Source descriptors - WHERE a package's content comes from.
//!
//! A [`SourceDescriptor`] is a closed set of origins. Its tag selects the
//! fetcher that knows how to acquire content from that origin.
//!
//! Descriptors have a canonical string form used in lockfiles and on the
//! command line:
//!
//! - `copy+<path>`
//! - `git+<url>` with an optional `?branch=`, `?tag=` or `?rev=` query
//! - `tarball+<url or path>` with an optional `#sha256:<hex>` fragment
//! - `workspace+<path>`
//! - `registry+<registry>/<package>@<version>`

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::core::Integrity;

/// Error parsing a source descriptor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceParseError {
    #[error("unsupported source kind `{0}`")]
    UnsupportedKind(String),

    #[error("invalid source `{input}`: {reason}")]
    Invalid { input: String, reason: String },
}

impl SourceParseError {
    fn invalid(input: &str, reason: impl fmt::Display) -> Self {
        SourceParseError::Invalid {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// The kind of package source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Local directory copied into a per-run area
    Copy,
    /// Git repository
    Git,
    /// Archive file, local or remote
    Tarball,
    /// Sibling package in the same monorepo
    Workspace,
    /// Foreign package registry
    Registry,
}

impl SourceKind {
    /// All kinds, in tag order.
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Copy,
        SourceKind::Git,
        SourceKind::Tarball,
        SourceKind::Workspace,
        SourceKind::Registry,
    ];

    /// The tag used in the canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Copy => "copy",
            SourceKind::Git => "git",
            SourceKind::Tarball => "tarball",
            SourceKind::Workspace => "workspace",
            SourceKind::Registry => "registry",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = SourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SourceParseError::UnsupportedKind(s.to_string()))
    }
}

/// Git reference specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitReference {
    /// Default branch (usually main/master)
    DefaultBranch,
    /// Specific branch
    Branch(String),
    /// Specific tag
    Tag(String),
    /// Specific revision (commit hash)
    Rev(String),
}

impl Default for GitReference {
    fn default() -> Self {
        GitReference::DefaultBranch
    }
}

impl GitReference {
    /// The pinned commit, if this reference is a full commit hash.
    pub fn pinned_commit(&self) -> Option<&str> {
        match self {
            GitReference::Rev(rev) if is_full_commit(rev) => Some(rev),
            _ => None,
        }
    }

    fn parse_query(query: &str) -> GitReference {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "branch" => return GitReference::Branch(value.into_owned()),
                "tag" => return GitReference::Tag(value.into_owned()),
                "rev" => return GitReference::Rev(value.into_owned()),
                _ => {}
            }
        }
        GitReference::DefaultBranch
    }
}

impl fmt::Display for GitReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitReference::DefaultBranch => write!(f, "HEAD"),
            GitReference::Branch(b) => write!(f, "branch {}", b),
            GitReference::Tag(t) => write!(f, "tag {}", t),
            GitReference::Rev(r) => write!(f, "rev {}", r),
        }
    }
}

/// Check whether a string is a full 40-character commit hash.
pub fn is_full_commit(rev: &str) -> bool {
    rev.len() == 40 && rev.chars().all(|c| c.is_ascii_hexdigit())
}

/// Where a tarball lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TarballLocation {
    /// Remote archive (http or https)
    Url(Url),
    /// Archive on the local filesystem
    Path(PathBuf),
}

impl TarballLocation {
    /// Parse a location, treating anything that is not an http(s) or file URL
    /// as a filesystem path.
    pub fn parse(s: &str) -> Self {
        match Url::parse(s) {
            Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => TarballLocation::Path(path),
                Err(()) => TarballLocation::Url(url),
            },
            Ok(url) if matches!(url.scheme(), "http" | "https") => TarballLocation::Url(url),
            _ => TarballLocation::Path(PathBuf::from(s)),
        }
    }
}

impl fmt::Display for TarballLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TarballLocation::Url(url) => write!(f, "{}", url),
            TarballLocation::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A tagged description of a package's origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceDescriptor {
    /// Local directory, copied fresh on every run
    Copy { path: PathBuf },

    /// Git repository at a branch, tag or commit
    Git { url: Url, reference: GitReference },

    /// Archive, optionally pinned to an expected hash of its bytes
    Tarball {
        location: TarballLocation,
        integrity: Option<Integrity>,
    },

    /// Sibling package in the working tree
    Workspace { path: PathBuf },

    /// Published version in a named registry
    Registry {
        registry: String,
        package: String,
        version: Version,
    },
}

impl SourceDescriptor {
    /// Create a copy source.
    pub fn copy(path: impl Into<PathBuf>) -> Self {
        SourceDescriptor::Copy { path: path.into() }
    }

    /// Create a git source.
    pub fn git(url: Url, reference: GitReference) -> Self {
        SourceDescriptor::Git { url, reference }
    }

    /// Create a tarball source.
    pub fn tarball(location: TarballLocation, integrity: Option<Integrity>) -> Self {
        SourceDescriptor::Tarball {
            location,
            integrity,
        }
    }

    /// Create a workspace source.
    pub fn workspace(path: impl Into<PathBuf>) -> Self {
        SourceDescriptor::Workspace { path: path.into() }
    }

    /// Create a registry source.
    pub fn registry(registry: impl Into<String>, package: impl Into<String>, version: Version) -> Self {
        SourceDescriptor::Registry {
            registry: registry.into(),
            package: package.into(),
            version,
        }
    }

    /// Get the source kind.
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Copy { .. } => SourceKind::Copy,
            SourceDescriptor::Git { .. } => SourceKind::Git,
            SourceDescriptor::Tarball { .. } => SourceKind::Tarball,
            SourceDescriptor::Workspace { .. } => SourceKind::Workspace,
            SourceDescriptor::Registry { .. } => SourceKind::Registry,
        }
    }

    /// Get the local path for path-based sources.
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            SourceDescriptor::Copy { path } | SourceDescriptor::Workspace { path } => Some(path),
            SourceDescriptor::Tarball {
                location: TarballLocation::Path(path),
                ..
            } => Some(path),
            _ => None,
        }
    }

    /// Parse a descriptor from its canonical string form.
    pub fn parse(s: &str) -> Result<Self, SourceParseError> {
        let (kind_str, rest) = s
            .split_once('+')
            .ok_or_else(|| SourceParseError::invalid(s, "missing kind prefix"))?;

        let kind: SourceKind = kind_str.parse()?;

        if rest.is_empty() {
            return Err(SourceParseError::invalid(s, "missing location"));
        }

        match kind {
            SourceKind::Copy => Ok(SourceDescriptor::copy(rest)),
            SourceKind::Workspace => Ok(SourceDescriptor::workspace(rest)),
            SourceKind::Git => {
                let mut url = Url::parse(rest).map_err(|e| SourceParseError::invalid(s, e))?;
                let reference = url
                    .query()
                    .map(GitReference::parse_query)
                    .unwrap_or_default();
                // The reference is stored separately from the URL
                url.set_query(None);
                url.set_fragment(None);
                Ok(SourceDescriptor::git(url, reference))
            }
            SourceKind::Tarball => {
                let (location, integrity) = match rest.rsplit_once('#') {
                    Some((location, fragment)) => {
                        let integrity = fragment
                            .parse::<Integrity>()
                            .map_err(|e| SourceParseError::invalid(s, e))?;
                        (location, Some(integrity))
                    }
                    None => (rest, None),
                };
                Ok(SourceDescriptor::tarball(
                    TarballLocation::parse(location),
                    integrity,
                ))
            }
            SourceKind::Registry => {
                let (registry, spec) = rest
                    .split_once('/')
                    .ok_or_else(|| SourceParseError::invalid(s, "expected <registry>/<package>@<version>"))?;
                let (package, version) = spec
                    .rsplit_once('@')
                    .ok_or_else(|| SourceParseError::invalid(s, "missing @<version>"))?;
                if registry.is_empty() || package.is_empty() {
                    return Err(SourceParseError::invalid(s, "empty registry or package name"));
                }
                let version = Version::parse(version).map_err(|e| SourceParseError::invalid(s, e))?;
                Ok(SourceDescriptor::registry(registry, package, version))
            }
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Copy { path } => write!(f, "copy+{}", path.display()),
            SourceDescriptor::Workspace { path } => write!(f, "workspace+{}", path.display()),
            SourceDescriptor::Git { url, reference } => {
                let mut url = url.clone();
                match reference {
                    GitReference::DefaultBranch => {}
                    GitReference::Branch(b) => {
                        url.query_pairs_mut().append_pair("branch", b);
                    }
                    GitReference::Tag(t) => {
                        url.query_pairs_mut().append_pair("tag", t);
                    }
                    GitReference::Rev(r) => {
                        url.query_pairs_mut().append_pair("rev", r);
                    }
                }
                write!(f, "git+{}", url)
            }
            SourceDescriptor::Tarball {
                location,
                integrity,
            } => {
                write!(f, "tarball+{}", location)?;
                if let Some(integrity) = integrity {
                    write!(f, "#{}", integrity)?;
                }
                Ok(())
            }
            SourceDescriptor::Registry {
                registry,
                package,
                version,
            } => write!(f, "registry+{}/{}@{}", registry, package, version),
        }
    }
}

impl FromStr for SourceDescriptor {
    type Err = SourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceDescriptor::parse(s)
    }
}

impl Serialize for SourceDescriptor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SourceDescriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SourceDescriptor::parse(&s).map_err(serde::de::Error::custom)
    }
}
