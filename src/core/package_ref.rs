//! Package references - WHAT the resolver wants fetched.

use std::fmt;

use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::SourceDescriptor;

/// A resolved package: exact name, exact version, and origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageReference {
    name: String,
    version: Version,
    source: SourceDescriptor,
}

impl PackageReference {
    /// Create a new package reference.
    pub fn new(name: impl Into<String>, version: Version, source: SourceDescriptor) -> Self {
        PackageReference {
            name: name.into(),
            version,
            source,
        }
    }

    /// Parse a reference from its string parts, as given on the command line.
    pub fn parse(name: &str, version: &str, source: &str) -> Result<Self> {
        let version = Version::parse(version)
            .with_context(|| format!("invalid version `{}` for `{}`", version, name))?;
        let source = SourceDescriptor::parse(source)?;
        Ok(PackageReference::new(name, version, source))
    }

    /// Get the package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the exact version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Get the source descriptor.
    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.version, self.source)
    }
}
