//! Copy source - a local directory snapshotted on every run.
//!
//! The directory may change between runs, so results are never published
//! to the shared cache; each run copies into its own scratch area.

use std::path::Path;

use crate::core::{Integrity, PackageReference, SourceDescriptor, SourceKind};
use crate::sources::{kind_mismatch, FetchContext, FetchError, FetchResult, Fetcher, Pinned, QuayResult};
use crate::util::fs::copy_dir_all;

#[derive(Debug, Default, Clone, Copy)]
pub struct CopyFetcher;

impl Fetcher for CopyFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Copy
    }

    fn should_be_cached(&self) -> bool {
        false
    }

    fn pin(&self, reference: &PackageReference, _ctx: &FetchContext<'_>) -> QuayResult<Pinned> {
        match reference.source() {
            SourceDescriptor::Copy { .. } => Ok(Pinned::unrevised(reference)),
            _ => Err(kind_mismatch(reference, SourceKind::Copy)),
        }
    }

    fn fetch(
        &self,
        reference: &PackageReference,
        pinned: &Pinned,
        dest: &Path,
        _ctx: &FetchContext<'_>,
    ) -> QuayResult<FetchResult> {
        let SourceDescriptor::Copy { path } = reference.source() else {
            return Err(kind_mismatch(reference, SourceKind::Copy));
        };

        if !path.is_dir() {
            return Err(FetchError::not_found(
                reference,
                format!("{} is not a directory", path.display()),
            ));
        }

        tracing::debug!("Copying {} to {}", path.display(), dest.display());
        copy_dir_all(path, dest).map_err(|e| FetchError::io(reference, e))?;
        let integrity = Integrity::of_tree(dest).map_err(|e| FetchError::io(reference, e))?;

        Ok(FetchResult {
            key: pinned.key.clone(),
            resolved_version: reference.version().clone(),
            cached_path: dest.to_path_buf(),
            integrity,
            should_be_cached: false,
            revision: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{package, write_tree, MockHttpClient, MockVcsClient};
    use crate::util::Config;
    use tempfile::TempDir;

    #[test]
    fn test_copy_snapshots_directory() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("left-pad");
        write_tree(&src, &[("index.js", "module.exports = 1"), ("lib/util.js", "")]);
        let dest = tmp.path().join("dest");

        let (config, http, vcs) = (Config::default(), MockHttpClient::new(), MockVcsClient::new());
        let ctx = FetchContext::new(&config, &http, &vcs);
        let reference = package("left-pad", "1.0.0", SourceDescriptor::copy(&src));

        let pinned = CopyFetcher.pin(&reference, &ctx).unwrap();
        let result = CopyFetcher.fetch(&reference, &pinned, &dest, &ctx).unwrap();

        assert_eq!(result.cached_path, dest);
        assert!(!result.should_be_cached);
        assert!(dest.join("lib/util.js").exists());
        assert_eq!(result.integrity, Integrity::of_tree(&src).unwrap());

        // Later edits to the origin do not leak into the snapshot
        std::fs::write(src.join("index.js"), "changed").unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.join("index.js")).unwrap(),
            "module.exports = 1"
        );
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let (config, http, vcs) = (Config::default(), MockHttpClient::new(), MockVcsClient::new());
        let ctx = FetchContext::new(&config, &http, &vcs);
        let reference = package("gone", "1.0.0", SourceDescriptor::copy(tmp.path().join("gone")));

        let pinned = CopyFetcher.pin(&reference, &ctx).unwrap();
        let err = CopyFetcher
            .fetch(&reference, &pinned, &tmp.path().join("dest"), &ctx)
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn test_wrong_kind_is_unsupported() {
        let (config, http, vcs) = (Config::default(), MockHttpClient::new(), MockVcsClient::new());
        let ctx = FetchContext::new(&config, &http, &vcs);
        let reference = package("x", "1.0.0", SourceDescriptor::workspace("packages/x"));

        assert!(matches!(
            CopyFetcher.pin(&reference, &ctx),
            Err(FetchError::Unsupported { .. })
        ));
    }
}
