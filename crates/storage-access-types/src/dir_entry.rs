//! Directory entry types returned by listings.

use serde::Serialize;

use crate::error::{StorageError, StorageResult};
use crate::location::Location;

/// One node of a directory listing.
///
/// Trees of entries are built fresh for every listing call and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Display name of the node.
    pub name: String,
    /// Typed location of the node.
    #[serde(skip)]
    pub location: Location,
    /// The location rendered as a URI (`file://` or `content://`).
    pub uri: String,
    pub is_directory: bool,
    pub is_file: bool,
    /// File size in bytes; for directories, the aggregated total when
    /// size and count were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Number of entries below a directory, counted across every level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u32>,
    /// True when `includes` reflects everything this node's depth budget
    /// allowed. False means the caller must list this node again to go deeper.
    #[serde(rename = "isChildrenLoaded")]
    pub children_loaded: bool,
    /// Children in provider enumeration order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub includes: Option<Vec<DirectoryEntry>>,
}

impl DirectoryEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, location: Location, uri: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            location,
            uri: uri.into(),
            is_directory: false,
            is_file: true,
            size: Some(size),
            total_count: None,
            children_loaded: true,
            includes: None,
        }
    }

    /// Create a directory entry whose children have not been loaded.
    pub fn directory(name: impl Into<String>, location: Location, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location,
            uri: uri.into(),
            is_directory: true,
            is_file: false,
            size: None,
            total_count: None,
            children_loaded: false,
            includes: None,
        }
    }

    /// Attach fully loaded children.
    pub fn with_includes(mut self, includes: Vec<DirectoryEntry>) -> Self {
        self.includes = Some(includes);
        self.children_loaded = true;
        self
    }

    /// Attach aggregated totals to a directory.
    pub fn with_totals(mut self, total_size: u64, total_count: u32) -> Self {
        self.size = Some(total_size);
        self.total_count = Some(total_count);
        self
    }

    /// Aggregated size of a directory, or the size of a file.
    pub fn total_size(&self) -> Option<u64> {
        self.size
    }

    /// Find a direct child by name.
    pub fn child(&self, name: &str) -> Option<&DirectoryEntry> {
        self.includes
            .as_deref()
            .and_then(|children| children.iter().find(|c| c.name == name))
    }

    /// Names of the direct children, in order.
    pub fn child_names(&self) -> Vec<&str> {
        self.includes
            .as_deref()
            .map(|children| children.iter().map(|c| c.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Visit this entry and every materialized descendant with its depth
    /// relative to this entry.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a DirectoryEntry, u32)) {
        self.visit_at(0, f);
    }

    fn visit_at<'a>(&'a self, depth: u32, f: &mut impl FnMut(&'a DirectoryEntry, u32)) {
        f(self, depth);
        if let Some(children) = &self.includes {
            for child in children {
                child.visit_at(depth + 1, f);
            }
        }
    }
}

/// How deep a listing materializes `includes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListDepth {
    /// Recurse to the true leaves.
    #[default]
    Unbounded,
    /// Materialize children down to this relative depth.
    Limited(u32),
}

impl ListDepth {
    /// Convert the wire encoding: `-1` is unbounded, `n >= 0` is limited.
    pub fn from_raw(raw: i32) -> StorageResult<Self> {
        match raw {
            -1 => Ok(ListDepth::Unbounded),
            n if n >= 0 => Ok(ListDepth::Limited(n as u32)),
            n => Err(StorageError::InvalidLocation(format!(
                "max depth must be -1 or non-negative, got {n}"
            ))),
        }
    }

    /// Whether a directory at `depth` gets its children materialized.
    pub fn materializes(&self, depth: u32) -> bool {
        match self {
            ListDepth::Unbounded => true,
            ListDepth::Limited(max) => depth < *max,
        }
    }
}
