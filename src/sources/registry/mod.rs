//! Registry source - published versions from a named package registry.
//!
//! A registry is an index of shim files that point at the actual artifacts.
//! Registries are configured by name:
//!
//! ```toml
//! [registries.opam]
//! index = "https://example.com/opam-index"
//! ```
//!
//! # Index Structure
//!
//! ```text
//! index/
//! ├── z/
//! │   └── zlib/
//! │       └── 1.3.1.toml         # Shim files
//! └── l/
//!     └── left-pad/
//!         └── 1.0.0.toml
//! ```
//!
//! The index may be served over http(s) or live on the local filesystem.

pub mod shim;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use url::Url;

use crate::core::{PackageReference, SourceDescriptor, SourceKind, TarballLocation};
use crate::sources::archive::Strip;
use crate::sources::git::checkout_commit;
use crate::sources::tarball::{read_archive, unpack_verified};
use crate::sources::{
    kind_mismatch, FetchContext, FetchError, FetchResult, Fetcher, Pinned, QuayResult,
};

pub use shim::{shim_path, validate_package_name, Artifact, Shim};

/// Where a registry's index lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryIndex {
    Remote(Url),
    Local(PathBuf),
}

impl RegistryIndex {
    /// Parse a configured index location.
    pub fn parse(index: &str) -> Self {
        match TarballLocation::parse(index) {
            TarballLocation::Url(url) => RegistryIndex::Remote(url),
            TarballLocation::Path(path) => RegistryIndex::Local(path),
        }
    }

    /// Read the shim at `relative` (a `/`-separated shim path).
    ///
    /// `Ok(None)` means the index has no such shim.
    fn read(&self, relative: &str, ctx: &FetchContext<'_>) -> anyhow::Result<Option<String>> {
        match self {
            RegistryIndex::Local(root) => {
                let path = root.join(relative);
                match std::fs::read_to_string(&path) {
                    Ok(content) => Ok(Some(content)),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e)
                        .with_context(|| format!("failed to read shim: {}", path.display())),
                }
            }
            RegistryIndex::Remote(base) => {
                let url = join_url(base, relative)?;
                tracing::debug!("Fetching shim {}", url);
                match ctx.http.download(&url) {
                    Ok(bytes) => String::from_utf8(bytes)
                        .map(Some)
                        .with_context(|| format!("shim at {} is not UTF-8", url)),
                    Err(crate::sources::RemoteError::NotFound(_)) => Ok(None),
                    Err(e) => Err(anyhow::anyhow!(e)),
                }
            }
        }
    }

    fn display(&self) -> String {
        match self {
            RegistryIndex::Remote(url) => url.to_string(),
            RegistryIndex::Local(path) => path.display().to_string(),
        }
    }
}

/// Join a relative path onto a base URL, treating the base as a directory.
fn join_url(base: &Url, relative: &str) -> anyhow::Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(relative)
        .with_context(|| format!("invalid shim URL {}{}", base, relative))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryFetcher;

impl RegistryFetcher {
    fn index(
        &self,
        reference: &PackageReference,
        registry: &str,
        ctx: &FetchContext<'_>,
    ) -> QuayResult<RegistryIndex> {
        ctx.config
            .registry(registry)
            .map(|config| RegistryIndex::parse(&config.index))
            .ok_or_else(|| {
                FetchError::unsupported(reference, format!("unknown registry `{}`", registry))
            })
    }

    /// Find and validate the shim for the descriptor's package.
    fn load_shim(
        &self,
        reference: &PackageReference,
        index: &RegistryIndex,
        package: &str,
        version: &semver::Version,
        ctx: &FetchContext<'_>,
    ) -> QuayResult<Shim> {
        let relative = shim_path(package, version)
            .map_err(|e| FetchError::unsupported(reference, format!("{:#}", e)))?;

        let content = index
            .read(&relative, ctx)
            .map_err(|e| FetchError::io(reference, e))?
            .ok_or_else(|| {
                FetchError::not_found(
                    reference,
                    format!("{}@{} is not in registry index {}", package, version, index.display()),
                )
            })?;

        let shim = Shim::parse(&content, &relative)
            .map_err(|e| FetchError::unsupported(reference, format!("{:#}", e)))?;
        shim.matches(package, version)
            .map_err(|e| FetchError::not_found(reference, format!("{:#}", e)))?;
        Ok(shim)
    }
}

impl Fetcher for RegistryFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Registry
    }

    fn should_be_cached(&self) -> bool {
        true
    }

    fn pin(&self, reference: &PackageReference, ctx: &FetchContext<'_>) -> QuayResult<Pinned> {
        let SourceDescriptor::Registry { registry, .. } = reference.source() else {
            return Err(kind_mismatch(reference, SourceKind::Registry));
        };

        // Published versions are immutable; only the registry must exist
        self.index(reference, registry, ctx)?;
        Ok(Pinned::unrevised(reference))
    }

    fn fetch(
        &self,
        reference: &PackageReference,
        pinned: &Pinned,
        dest: &Path,
        ctx: &FetchContext<'_>,
    ) -> QuayResult<FetchResult> {
        let SourceDescriptor::Registry {
            registry,
            package,
            version,
        } = reference.source()
        else {
            return Err(kind_mismatch(reference, SourceKind::Registry));
        };

        let index = self.index(reference, registry, ctx)?;
        if ctx.offline() {
            return Err(FetchError::not_found(
                reference,
                format!("offline and {}/{}@{} is not cached", registry, package, version),
            ));
        }

        let shim = self.load_shim(reference, &index, package, version, ctx)?;
        let artifact = shim
            .artifact()
            .map_err(|e| FetchError::unsupported(reference, format!("{:#}", e)))?;

        let (integrity, revision) = match artifact {
            Artifact::Archive {
                url,
                checksum,
                strip_prefix,
            } => {
                let data = read_archive(reference, &TarballLocation::parse(url.as_str()), ctx)?;
                let strip = match strip_prefix.as_deref() {
                    Some(prefix) => Strip::Prefix(prefix),
                    None => Strip::SingleRoot,
                };
                let integrity = unpack_verified(reference, &data, checksum.as_ref(), dest, strip)?;
                (integrity, None)
            }
            Artifact::Git { url, rev } => {
                let integrity = checkout_commit(reference, &url, &rev, dest, ctx)?;
                (integrity, Some(rev))
            }
        };

        tracing::info!("Fetched {}/{}@{}", registry, package, version);

        Ok(FetchResult {
            key: pinned.key.clone(),
            resolved_version: reference.version().clone(),
            cached_path: dest.to_path_buf(),
            integrity,
            should_be_cached: true,
            revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Integrity;
    use crate::test_support::{
        left_pad_tarball, package, write_tree, MockHttpClient, MockHttpResponse, MockVcsClient,
    };
    use crate::util::Config;
    use semver::Version;
    use tempfile::TempDir;

    const ARCHIVE: &str = "https://cdn.example.com/left-pad-1.0.0.tgz";
    const COMMIT: &str = "04f42ceca40f73e2978b50e93806c2a18c1281fc";

    fn registry_ref() -> PackageReference {
        package(
            "left-pad",
            "1.0.0",
            SourceDescriptor::registry("npm", "left-pad", Version::new(1, 0, 0)),
        )
    }

    fn archive_shim(checksum: &Integrity) -> String {
        format!(
            "[package]\nname = \"left-pad\"\nversion = \"1.0.0\"\n\n[source.archive]\nurl = \"{}\"\nchecksum = \"{}\"\n",
            ARCHIVE, checksum
        )
    }

    #[test]
    fn test_local_index_archive() {
        let tmp = TempDir::new().unwrap();
        let index = tmp.path().join("index");
        let data = left_pad_tarball();
        write_tree(&index, &[("l/left-pad/1.0.0.toml", &archive_shim(&Integrity::of_bytes(&data)))]);

        let config = Config::default().with_registry("npm", index.to_string_lossy());
        let (http, vcs) = (MockHttpClient::new(), MockVcsClient::new());
        http.mock_url(ARCHIVE, MockHttpResponse::ok(data.clone()));
        let ctx = FetchContext::new(&config, &http, &vcs);

        let dest = tmp.path().join("dest");
        let reference = registry_ref();
        let pinned = RegistryFetcher.pin(&reference, &ctx).unwrap();
        let result = RegistryFetcher.fetch(&reference, &pinned, &dest, &ctx).unwrap();

        assert_eq!(result.integrity, Integrity::of_bytes(&data));
        assert_eq!(result.resolved_version, Version::new(1, 0, 0));
        assert!(dest.join("index.js").exists());
    }

    #[test]
    fn test_remote_index_checksum_mismatch() {
        let tmp = TempDir::new().unwrap();
        let config = Config::default().with_registry("npm", "https://index.example.com/npm");
        let (http, vcs) = (MockHttpClient::new(), MockVcsClient::new());
        http.mock_url(
            "https://index.example.com/npm/l/left-pad/1.0.0.toml",
            MockHttpResponse::ok(archive_shim(&Integrity::of_bytes(b"other"))),
        );
        http.mock_url(ARCHIVE, MockHttpResponse::ok(left_pad_tarball()));
        let ctx = FetchContext::new(&config, &http, &vcs);

        let reference = registry_ref();
        let pinned = RegistryFetcher.pin(&reference, &ctx).unwrap();
        let err = RegistryFetcher
            .fetch(&reference, &pinned, tmp.path(), &ctx)
            .unwrap_err();
        assert!(matches!(err, FetchError::IntegrityMismatch { .. }));
    }

    #[test]
    fn test_git_shim() {
        let tmp = TempDir::new().unwrap();
        let index = tmp.path().join("index");
        let shim = format!(
            "[package]\nname = \"left-pad\"\nversion = \"1.0.0\"\n\n[source.git]\nurl = \"https://github.com/left-pad/left-pad\"\nrev = \"{}\"\n",
            COMMIT
        );
        write_tree(&index, &[("l/left-pad/1.0.0.toml", &shim)]);

        let config = Config::default().with_registry("npm", index.to_string_lossy());
        let (http, vcs) = (MockHttpClient::new(), MockVcsClient::new());
        vcs.add_commit("https://github.com/left-pad/left-pad", COMMIT, &[("index.js", "x")]);
        let ctx = FetchContext::new(&config, &http, &vcs);

        let dest = tmp.path().join("dest");
        let reference = registry_ref();
        let pinned = RegistryFetcher.pin(&reference, &ctx).unwrap();
        let result = RegistryFetcher.fetch(&reference, &pinned, &dest, &ctx).unwrap();

        assert_eq!(result.revision.as_deref(), Some(COMMIT));
        assert_eq!(vcs.resolve_count(), 0);
        assert!(dest.join("index.js").exists());
    }

    #[test]
    fn test_unknown_registry_is_unsupported() {
        let (config, http, vcs) = (Config::default(), MockHttpClient::new(), MockVcsClient::new());
        let ctx = FetchContext::new(&config, &http, &vcs);

        let err = RegistryFetcher.pin(&registry_ref(), &ctx).unwrap_err();
        assert!(matches!(err, FetchError::Unsupported { .. }));
        assert!(err.to_string().contains("unknown registry `npm`"));
    }

    #[test]
    fn test_missing_or_mismatched_shim_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let index = tmp.path().join("index");
        let config = Config::default().with_registry("npm", index.to_string_lossy());
        let (http, vcs) = (MockHttpClient::new(), MockVcsClient::new());
        let ctx = FetchContext::new(&config, &http, &vcs);
        let reference = registry_ref();
        let pinned = RegistryFetcher.pin(&reference, &ctx).unwrap();

        let err = RegistryFetcher
            .fetch(&reference, &pinned, tmp.path(), &ctx)
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));

        // A shim filed under the right path but describing another version
        let wrong = archive_shim(&Integrity::of_bytes(b"x")).replace("1.0.0\"\n\n", "1.0.1\"\n\n");
        write_tree(&index, &[("l/left-pad/1.0.0.toml", &wrong)]);
        let err = RegistryFetcher
            .fetch(&reference, &pinned, tmp.path(), &ctx)
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn test_join_url_treats_base_as_directory() {
        let base = Url::parse("https://index.example.com/npm").unwrap();
        assert_eq!(
            join_url(&base, "l/left-pad/1.0.0.toml").unwrap().as_str(),
            "https://index.example.com/npm/l/left-pad/1.0.0.toml"
        );
    }
}
