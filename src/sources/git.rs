//! Git source - packages from git repositories.
//!
//! A reference naming a full commit is already pinned and never touches the
//! remote. Branches, tags and the default branch can move, so they are
//! resolved on every pin and the resulting commit becomes part of the cache
//! key.

use std::path::Path;

use url::Url;

use crate::core::{Integrity, PackageReference, SourceDescriptor, SourceKind};
use crate::sources::{
    kind_mismatch, FetchContext, FetchError, FetchResult, Fetcher, Pinned, QuayResult,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct GitFetcher;

impl Fetcher for GitFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Git
    }

    fn should_be_cached(&self) -> bool {
        true
    }

    fn pin(&self, reference: &PackageReference, ctx: &FetchContext<'_>) -> QuayResult<Pinned> {
        let SourceDescriptor::Git {
            url,
            reference: git_ref,
        } = reference.source()
        else {
            return Err(kind_mismatch(reference, SourceKind::Git));
        };

        if let Some(commit) = git_ref.pinned_commit() {
            return Ok(Pinned::at_revision(reference, commit));
        }

        if ctx.offline() {
            return Err(FetchError::not_found(
                reference,
                format!("offline: cannot resolve {} of {}", git_ref, url),
            ));
        }

        let commit = ctx
            .vcs
            .resolve_ref(url, git_ref)
            .map_err(|e| FetchError::from_remote(reference, e))?;
        tracing::debug!("Resolved {} of {} to {}", git_ref, url, commit);

        Ok(Pinned::at_revision(reference, &commit))
    }

    fn fetch(
        &self,
        reference: &PackageReference,
        pinned: &Pinned,
        dest: &Path,
        ctx: &FetchContext<'_>,
    ) -> QuayResult<FetchResult> {
        let SourceDescriptor::Git { url, .. } = reference.source() else {
            return Err(kind_mismatch(reference, SourceKind::Git));
        };

        let commit = pinned.revision.as_deref().ok_or_else(|| {
            FetchError::unsupported(reference, "git fetch requires a pinned commit")
        })?;

        let integrity = checkout_commit(reference, url, commit, dest, ctx)?;

        Ok(FetchResult {
            key: pinned.key.clone(),
            resolved_version: reference.version().clone(),
            cached_path: dest.to_path_buf(),
            integrity,
            should_be_cached: true,
            revision: Some(commit.to_string()),
        })
    }
}

/// Materialize `commit` into `dest` and hash the resulting tree.
pub(crate) fn checkout_commit(
    reference: &PackageReference,
    url: &Url,
    commit: &str,
    dest: &Path,
    ctx: &FetchContext<'_>,
) -> QuayResult<Integrity> {
    if ctx.offline() {
        return Err(FetchError::not_found(
            reference,
            format!("offline and {} is not cached", url),
        ));
    }

    ctx.vcs
        .checkout(url, commit, dest)
        .map_err(|e| FetchError::from_remote(reference, e))?;

    Integrity::of_tree(dest).map_err(|e| FetchError::io(reference, e))
}
