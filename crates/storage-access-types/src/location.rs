//! Typed storage locations.
//!
//! A location string is classified once at the API boundary; from then on
//! it travels as a [`Location`] so backends never sniff strings again.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{StorageError, StorageResult};

/// Which backend owns a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Internal,
    External,
    Unknown,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Internal => "internal",
            StorageType::External => "external",
            StorageType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Path relative to the sandbox root, already normalized.
    /// The empty string is the root itself.
    Internal(String),
    /// Opaque document-provider URI (`content://…`).
    External(String),
}

impl Location {
    /// Build an internal location, normalizing the relative path.
    ///
    /// Fails with `InvalidLocation` if the path climbs above the root.
    pub fn internal(path: &str) -> StorageResult<Self> {
        normalize_relative(path).map(Location::Internal)
    }

    /// Build an external location from a URI string.
    pub fn external(uri: impl Into<String>) -> Self {
        Location::External(uri.into())
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Location::Internal(_) => StorageType::Internal,
            Location::External(_) => StorageType::External,
        }
    }

    /// The relative path or URI carried by this location.
    pub fn as_str(&self) -> &str {
        match self {
            Location::Internal(path) => path,
            Location::External(uri) => uri,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Location::Internal(_))
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Location::External(_))
    }

    /// Join a child name onto an internal location.
    ///
    /// External locations cannot be joined lexically; the provider issues
    /// child URIs.
    pub fn join(&self, name: &str) -> StorageResult<Location> {
        match self {
            Location::Internal(path) if path.is_empty() => Location::internal(name),
            Location::Internal(path) => Location::internal(&format!("{path}/{name}")),
            Location::External(uri) => Err(StorageError::Unsupported(format!(
                "cannot join '{name}' onto document URI {uri}"
            ))),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.storage_type(), self.as_str())
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Normalize a sandbox-relative path.
///
/// Leading `/`, empty segments and `.` are dropped and `a/../b` collapses
/// to `b`. A `..` that would leave the root is rejected.
pub fn normalize_relative(path: &str) -> StorageResult<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(StorageError::InvalidLocation(format!(
                        "path escapes the sandbox root: {path}"
                    )));
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}
