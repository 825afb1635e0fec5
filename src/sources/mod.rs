//! Package sources.
//!
//! Each source kind has a [`Fetcher`] that knows how to pin a reference to
//! a cache key and materialize its content into a directory. The
//! [`Dispatcher`] maps a descriptor's kind to its fetcher.

pub mod archive;
pub mod cache;
pub mod copy;
pub mod errors;
pub mod git;
pub mod http;
pub mod registry;
pub mod tarball;
pub mod vcs;
pub mod workspace;

use std::path::{Path, PathBuf};

use semver::Version;
use serde::Serialize;

use crate::core::{FetchKey, Integrity, PackageReference, SourceDescriptor, SourceKind};
use crate::util::Config;

pub use cache::{CacheEntry, CacheStore, Lookup};
pub use copy::CopyFetcher;
pub use errors::{FetchError, QuayResult, RemoteError};
pub use git::GitFetcher;
pub use http::{HttpClient, ReqwestClient};
pub use registry::RegistryFetcher;
pub use tarball::TarballFetcher;
pub use vcs::{Git2Client, VcsClient};
pub use workspace::WorkspaceFetcher;

/// Everything a fetcher may use besides its inputs.
#[derive(Clone, Copy)]
pub struct FetchContext<'a> {
    pub config: &'a Config,
    pub http: &'a dyn HttpClient,
    pub vcs: &'a dyn VcsClient,
}

impl<'a> FetchContext<'a> {
    pub fn new(config: &'a Config, http: &'a dyn HttpClient, vcs: &'a dyn VcsClient) -> Self {
        FetchContext { config, http, vcs }
    }

    /// Whether network access is disabled.
    pub fn offline(&self) -> bool {
        self.config.net.offline
    }
}

/// A reference pinned to its cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pinned {
    /// Cache key; for git sources this includes the resolved commit
    pub key: FetchKey,
    /// Concrete revision the key was derived from
    pub revision: Option<String>,
    /// Artifact hash the key was derived from, for content that can change
    /// under an unchanged descriptor
    pub content: Option<Integrity>,
}

impl Pinned {
    /// Pin a source whose content is fully determined by its descriptor.
    pub fn unrevised(reference: &PackageReference) -> Self {
        Pinned {
            key: FetchKey::for_reference(reference),
            revision: None,
            content: None,
        }
    }

    /// Pin a source to a concrete revision.
    pub fn at_revision(reference: &PackageReference, revision: &str) -> Self {
        Pinned {
            key: FetchKey::pinned(reference, revision),
            revision: Some(revision.to_string()),
            content: None,
        }
    }

    /// Pin a source to the hash of the artifact it currently names.
    pub fn by_content(reference: &PackageReference, content: Integrity) -> Self {
        Pinned {
            key: FetchKey::pinned(reference, &content.to_string()),
            revision: None,
            content: Some(content),
        }
    }
}

/// What a fetch hands back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    pub key: FetchKey,
    pub resolved_version: Version,
    /// Ready-to-use package tree
    pub cached_path: PathBuf,
    pub integrity: Integrity,
    pub should_be_cached: bool,
    /// Resolved commit for git-backed content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// Acquires content for one source kind.
pub trait Fetcher: Send + Sync {
    /// The kind this fetcher handles.
    fn kind(&self) -> SourceKind;

    /// Whether results may be published to the shared cache.
    fn should_be_cached(&self) -> bool;

    /// Whether content is used where it already lives. Such fetchers are
    /// handed the origin as `dest` and never write to it.
    fn in_place(&self) -> bool {
        false
    }

    /// Derive the cache key, resolving mutable references if needed.
    fn pin(&self, reference: &PackageReference, ctx: &FetchContext<'_>) -> QuayResult<Pinned>;

    /// Write the package tree into `dest` (a directory owned by the caller
    /// for this attempt) and report its integrity.
    fn fetch(
        &self,
        reference: &PackageReference,
        pinned: &Pinned,
        dest: &Path,
        ctx: &FetchContext<'_>,
    ) -> QuayResult<FetchResult>;
}

/// The error for a descriptor routed to the wrong fetcher.
pub(crate) fn kind_mismatch(reference: &PackageReference, expected: SourceKind) -> FetchError {
    FetchError::unsupported(
        reference,
        format!(
            "expected a {} source, got {}",
            expected,
            reference.source().kind()
        ),
    )
}

/// Maps source kinds to fetchers.
#[derive(Debug, Default)]
pub struct Dispatcher {
    copy: CopyFetcher,
    git: GitFetcher,
    tarball: TarballFetcher,
    workspace: WorkspaceFetcher,
    registry: RegistryFetcher,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    /// Get the fetcher for a kind.
    pub fn fetcher(&self, kind: SourceKind) -> &dyn Fetcher {
        match kind {
            SourceKind::Copy => &self.copy,
            SourceKind::Git => &self.git,
            SourceKind::Tarball => &self.tarball,
            SourceKind::Workspace => &self.workspace,
            SourceKind::Registry => &self.registry,
        }
    }

    /// Get the fetcher for a descriptor.
    pub fn for_source(&self, source: &SourceDescriptor) -> &dyn Fetcher {
        self.fetcher(source.kind())
    }
}
