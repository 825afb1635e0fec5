//! Core data types for package acquisition.

pub mod fetch_key;
pub mod integrity;
pub mod package_ref;
pub mod source;

pub use fetch_key::FetchKey;
pub use integrity::Integrity;
pub use package_ref::PackageReference;
pub use source::{GitReference, SourceDescriptor, SourceKind, SourceParseError, TarballLocation};
