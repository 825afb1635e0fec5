//! Quay - package-source acquisition for package managers
//!
//! This crate turns resolved package references into verified, ready-to-use
//! directories. It fetches from local paths, git repositories, tarballs,
//! workspace members and package registries, deduplicates concurrent
//! requests, and keeps a content-addressed cache shared across runs.

pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

/// Test utilities and mocks for Quay unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides mock HTTP and VCS clients and archive
/// builders.
#[cfg(test)]
pub mod test_support;

pub use core::{FetchKey, Integrity, PackageReference, SourceDescriptor};
pub use ops::FetchCoordinator;
pub use sources::{FetchError, FetchResult};
pub use util::context::GlobalContext;
