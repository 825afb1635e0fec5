//! Workspace source - a sibling package in the same working tree.
//!
//! The package is used in place. Its tree hash is recorded for reporting but
//! never checked, and nothing is copied or published.

use std::path::Path;

use crate::core::{Integrity, PackageReference, SourceDescriptor, SourceKind};
use crate::sources::{kind_mismatch, FetchContext, FetchError, FetchResult, Fetcher, Pinned, QuayResult};

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkspaceFetcher;

impl Fetcher for WorkspaceFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Workspace
    }

    fn should_be_cached(&self) -> bool {
        false
    }

    fn in_place(&self) -> bool {
        true
    }

    fn pin(&self, reference: &PackageReference, _ctx: &FetchContext<'_>) -> QuayResult<Pinned> {
        match reference.source() {
            SourceDescriptor::Workspace { .. } => Ok(Pinned::unrevised(reference)),
            _ => Err(kind_mismatch(reference, SourceKind::Workspace)),
        }
    }

    fn fetch(
        &self,
        reference: &PackageReference,
        pinned: &Pinned,
        _dest: &Path,
        _ctx: &FetchContext<'_>,
    ) -> QuayResult<FetchResult> {
        let SourceDescriptor::Workspace { path } = reference.source() else {
            return Err(kind_mismatch(reference, SourceKind::Workspace));
        };

        let path = path.canonicalize().map_err(|e| {
            FetchError::not_found(reference, format!("{}: {}", path.display(), e))
        })?;
        if !path.is_dir() {
            return Err(FetchError::not_found(
                reference,
                format!("{} is not a directory", path.display()),
            ));
        }

        let integrity = Integrity::of_tree(&path).map_err(|e| FetchError::io(reference, e))?;
        tracing::debug!("Using workspace member {} in place", path.display());

        Ok(FetchResult {
            key: pinned.key.clone(),
            resolved_version: reference.version().clone(),
            cached_path: path,
            integrity,
            should_be_cached: false,
            revision: None,
        })
    }
}
