//! Dispatch results whose shape depends on the backend that served them.

use serde::Serialize;

use crate::dir_entry::DirectoryEntry;

/// Result of a mutating call.
///
/// Internal storage keeps its legacy boolean contract; external storage
/// returns the URI the provider issued for the new node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Flag(bool),
    Uri(String),
}

impl Outcome {
    /// True for `Flag(true)` and for any issued URI.
    pub fn succeeded(&self) -> bool {
        match self {
            Outcome::Flag(ok) => *ok,
            Outcome::Uri(_) => true,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Outcome::Flag(_) => None,
            Outcome::Uri(uri) => Some(uri),
        }
    }
}

/// Result of `list_files`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Listing {
    /// Single level of an internal directory.
    Flat(Vec<DirectoryEntry>),
    /// Depth-bounded tree rooted at an external directory.
    Tree(DirectoryEntry),
}

impl Listing {
    pub fn into_tree(self) -> Option<DirectoryEntry> {
        match self {
            Listing::Tree(root) => Some(root),
            Listing::Flat(_) => None,
        }
    }

    pub fn into_flat(self) -> Option<Vec<DirectoryEntry>> {
        match self {
            Listing::Flat(entries) => Some(entries),
            Listing::Tree(_) => None,
        }
    }
}
