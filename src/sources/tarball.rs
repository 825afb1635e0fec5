//! Tarball source - archives from a URL or the local filesystem.
//!
//! The integrity of a tarball is the hash of the archive bytes. When an
//! expected hash is given, the bytes are checked before anything is
//! extracted; a mismatch never reaches the destination directory.
//!
//! A local archive without an expected hash can change on disk under the
//! same path, so its key is pinned to the archive's current hash.

use std::io;
use std::path::Path;

use crate::core::{Integrity, PackageReference, SourceDescriptor, SourceKind, TarballLocation};
use crate::sources::archive::{extract_tarball, Strip};
use crate::sources::{
    kind_mismatch, FetchContext, FetchError, FetchResult, Fetcher, Pinned, QuayResult,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct TarballFetcher;

impl Fetcher for TarballFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Tarball
    }

    fn should_be_cached(&self) -> bool {
        true
    }

    fn pin(&self, reference: &PackageReference, _ctx: &FetchContext<'_>) -> QuayResult<Pinned> {
        match reference.source() {
            SourceDescriptor::Tarball {
                location: TarballLocation::Path(path),
                integrity: None,
            } => {
                let content = Integrity::of_file(path).map_err(|e| {
                    let missing = e
                        .downcast_ref::<io::Error>()
                        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound);
                    let reason = format!("{:#}", e);
                    if missing {
                        FetchError::not_found(reference, reason)
                    } else {
                        FetchError::transient(reference, reason)
                    }
                })?;
                tracing::debug!("Pinned {} to {}", path.display(), content);
                Ok(Pinned::by_content(reference, content))
            }
            SourceDescriptor::Tarball { .. } => Ok(Pinned::unrevised(reference)),
            _ => Err(kind_mismatch(reference, SourceKind::Tarball)),
        }
    }

    fn fetch(
        &self,
        reference: &PackageReference,
        pinned: &Pinned,
        dest: &Path,
        ctx: &FetchContext<'_>,
    ) -> QuayResult<FetchResult> {
        let SourceDescriptor::Tarball {
            location,
            integrity: expected,
        } = reference.source()
        else {
            return Err(kind_mismatch(reference, SourceKind::Tarball));
        };

        // A content pin fails if the archive changed since it was pinned
        let expected = expected.as_ref().or(pinned.content.as_ref());
        let data = read_archive(reference, location, ctx)?;
        let integrity = unpack_verified(reference, &data, expected, dest, Strip::SingleRoot)?;

        Ok(FetchResult {
            key: pinned.key.clone(),
            resolved_version: reference.version().clone(),
            cached_path: dest.to_path_buf(),
            integrity,
            should_be_cached: true,
            revision: None,
        })
    }
}

/// Load archive bytes from wherever they live.
pub(crate) fn read_archive(
    reference: &PackageReference,
    location: &TarballLocation,
    ctx: &FetchContext<'_>,
) -> QuayResult<Vec<u8>> {
    match location {
        TarballLocation::Url(url) => {
            if ctx.offline() {
                return Err(FetchError::not_found(
                    reference,
                    format!("offline and {} is not cached", url),
                ));
            }
            tracing::info!("Downloading {}", url);
            ctx.http
                .download(url)
                .map_err(|e| FetchError::from_remote(reference, e))
        }
        TarballLocation::Path(path) => std::fs::read(path).map_err(|e| {
            let reason = format!("{}: {}", path.display(), e);
            if e.kind() == io::ErrorKind::NotFound {
                FetchError::not_found(reference, reason)
            } else {
                FetchError::transient(reference, reason)
            }
        }),
    }
}

/// Hash the archive, check it against `expected`, then extract into `dest`.
pub(crate) fn unpack_verified(
    reference: &PackageReference,
    data: &[u8],
    expected: Option<&Integrity>,
    dest: &Path,
    strip: Strip<'_>,
) -> QuayResult<Integrity> {
    let actual = Integrity::of_bytes(data);

    if let Some(expected) = expected {
        actual.verify(expected).map_err(|mismatch| {
            FetchError::integrity_mismatch(reference, mismatch.expected, mismatch.actual)
        })?;
        tracing::debug!("Archive hash verified: {}", actual);
    }

    // Undecodable bytes are as unusable as a wrong hash
    extract_tarball(data, dest, strip).map_err(|e| {
        FetchError::unsupported(reference, format!("cannot extract archive: {:#}", e))
    })?;

    Ok(actual)
}
