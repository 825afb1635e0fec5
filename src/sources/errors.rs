//! Fetch error types and diagnostics.

use std::fmt;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::{FetchKey, Integrity, PackageReference, SourceParseError};
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Result of a fetch operation.
pub type QuayResult<T> = Result<T, FetchError>;

/// Error from an outward collaborator (HTTP client or VCS tool).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote answered, and the thing is not there.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote could not be reached or failed mid-transfer.
    #[error("{0}")]
    Transient(String),
}

/// Error acquiring a package.
///
/// `Clone` so a single outcome can be handed to every waiter of an
/// in-flight fetch.
#[derive(Debug, Clone, Error, MietteDiagnostic)]
pub enum FetchError {
    #[error("could not find `{package}`: {reason}")]
    #[diagnostic(code(quay::fetch::not_found))]
    NotFound { package: String, reason: String },

    #[error("integrity mismatch for `{package}`: expected {expected}, found {actual}")]
    #[diagnostic(
        code(quay::fetch::integrity_mismatch),
        help("the artifact differs from the pinned hash; it was not extracted")
    )]
    IntegrityMismatch {
        package: String,
        expected: Integrity,
        actual: Integrity,
    },

    #[error("failed to fetch `{package}`: {reason}")]
    #[diagnostic(code(quay::fetch::transient_io))]
    TransientIo { package: String, reason: String },

    #[error("unsupported source for `{package}`: {reason}")]
    #[diagnostic(code(quay::fetch::unsupported))]
    Unsupported { package: String, reason: String },

    #[error("corrupt cache entry `{key}` for `{package}`: {reason}")]
    #[diagnostic(
        code(quay::cache::corrupt),
        help("the entry has been evicted; fetching again will repopulate it")
    )]
    CorruptCache {
        package: String,
        key: FetchKey,
        reason: String,
    },
}

impl FetchError {
    /// The package could not be located at its origin.
    pub fn not_found(package: &PackageReference, reason: impl fmt::Display) -> Self {
        FetchError::NotFound {
            package: package.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Fetched content hashed to something other than what was pinned.
    pub fn integrity_mismatch(
        package: &PackageReference,
        expected: Integrity,
        actual: Integrity,
    ) -> Self {
        FetchError::IntegrityMismatch {
            package: package.to_string(),
            expected,
            actual,
        }
    }

    /// Network or filesystem failure.
    ///
    /// `anyhow` chains are flattened with `{:#}` so the cause survives.
    pub fn transient(package: &PackageReference, reason: impl fmt::Display) -> Self {
        FetchError::TransientIo {
            package: package.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Wrap an internal `anyhow` error as a transient failure.
    pub fn io(package: &PackageReference, err: anyhow::Error) -> Self {
        Self::transient(package, format!("{:#}", err))
    }

    /// The descriptor cannot be handled.
    pub fn unsupported(package: &PackageReference, reason: impl fmt::Display) -> Self {
        FetchError::Unsupported {
            package: package.to_string(),
            reason: reason.to_string(),
        }
    }

    /// A source string that could not be turned into a descriptor.
    ///
    /// There is no reference yet, so the package is named by name and version.
    pub fn unparsable_source(name: &str, version: &str, err: &SourceParseError) -> Self {
        FetchError::Unsupported {
            package: format!("{}@{}", name, version),
            reason: err.to_string(),
        }
    }

    /// A published entry failed re-verification.
    pub fn corrupt_cache(
        package: &PackageReference,
        key: FetchKey,
        reason: impl fmt::Display,
    ) -> Self {
        FetchError::CorruptCache {
            package: package.to_string(),
            key,
            reason: reason.to_string(),
        }
    }

    /// Map an outward collaborator's error.
    pub fn from_remote(package: &PackageReference, err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(reason) => Self::not_found(package, reason),
            RemoteError::Transient(reason) => Self::transient(package, reason),
        }
    }

    /// The package this error concerns, as `name@version (source)`.
    pub fn package(&self) -> &str {
        match self {
            FetchError::NotFound { package, .. }
            | FetchError::IntegrityMismatch { package, .. }
            | FetchError::TransientIo { package, .. }
            | FetchError::Unsupported { package, .. }
            | FetchError::CorruptCache { package, .. } => package,
        }
    }

    /// Whether retrying the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::TransientIo { .. })
    }

    /// Whether the install must stop rather than continue with other packages.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::IntegrityMismatch { .. } | FetchError::CorruptCache { .. }
        )
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            FetchError::NotFound { package, reason } => {
                let diag = Diagnostic::error(format!("could not find `{}`", package))
                    .with_context(reason.clone());
                if reason.contains("offline") {
                    diag.with_suggestion(suggestions::OFFLINE)
                } else {
                    diag.with_suggestion(suggestions::UNSUPPORTED)
                }
            }

            FetchError::IntegrityMismatch {
                package,
                expected,
                actual,
            } => Diagnostic::error(format!("integrity mismatch for `{}`", package))
                .with_context(format!("expected {}", expected))
                .with_context(format!("found    {}", actual))
                .with_suggestion(suggestions::INTEGRITY),

            FetchError::TransientIo { package, reason } => {
                Diagnostic::error(format!("failed to fetch `{}`", package))
                    .with_context(reason.clone())
                    .with_suggestion(suggestions::FETCH_FAILED)
            }

            FetchError::Unsupported { package, reason } => {
                let diag = Diagnostic::error(format!("unsupported source for `{}`", package))
                    .with_context(reason.clone());
                if reason.contains("unknown registry") {
                    diag.with_suggestion(suggestions::UNKNOWN_REGISTRY)
                } else {
                    diag.with_suggestion(suggestions::UNSUPPORTED)
                }
            }

            FetchError::CorruptCache {
                package,
                key,
                reason,
            } => Diagnostic::error(format!("corrupt cache entry for `{}`", package))
                .with_context(format!("key {}", key))
                .with_context(reason.clone())
                .with_suggestion(suggestions::CORRUPT_CACHE),
        }
    }
}
