//! Document providers: the content-query interface behind external storage.
//!
//! The external backend never touches a filesystem directly. Every node is
//! reached through a [`DocumentProvider`], addressed by a [`DocumentUri`]:
//!
//! - **MemoryProvider**: in-memory document tree, used by tests and demos
//! - **LocalProvider**: a host directory exposed as a document tree
//!
//! Providers enforce the tree grant: a URI whose document lies outside its
//! tree is refused with `PermissionDenied`.

mod local;
mod memory;

pub use local::LocalProvider;
pub use memory::MemoryProvider;

use async_trait::async_trait;
use std::io;

use crate::uri::{DocumentUri, is_within};

/// MIME type providers report for directories.
pub const MIME_TYPE_DIR: &str = "vnd.android.document/directory";

/// Wildcard MIME type: let the provider pick from the display name.
pub const MIME_WILDCARD: &str = "*/*";

/// Default authority of the external-storage provider.
pub const EXTERNAL_STORAGE_AUTHORITY: &str = "com.android.externalstorage.documents";

/// One row of a provider query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    /// URI of the node, inside the tree it was reached through.
    pub uri: DocumentUri,
    pub display_name: String,
    pub mime_type: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

impl DocumentInfo {
    pub fn is_directory(&self) -> bool {
        self.mime_type == MIME_TYPE_DIR
    }

    pub fn document_id(&self) -> &str {
        self.uri.document_id()
    }
}

/// Content-query interface of a document provider.
///
/// Errors are plain `io::Error`s; the external backend maps them onto the
/// storage error taxonomy.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Authority this provider answers for.
    fn authority(&self) -> &str;

    /// Look up a single node.
    async fn query(&self, uri: &DocumentUri) -> io::Result<DocumentInfo>;

    /// Children of a directory, in the provider's enumeration order.
    async fn children(&self, uri: &DocumentUri) -> io::Result<Vec<DocumentInfo>>;

    /// Read the whole content of a document.
    async fn read(&self, uri: &DocumentUri) -> io::Result<Vec<u8>>;

    /// Truncate an existing document and write `data`.
    async fn write(&self, uri: &DocumentUri, data: &[u8]) -> io::Result<()>;

    /// Create a child of `parent`.
    ///
    /// The provider picks the final display name (colliding names get a
    /// ` (n)` suffix) and, for [`MIME_WILDCARD`], the MIME type.
    async fn create(
        &self,
        parent: &DocumentUri,
        mime_type: &str,
        display_name: &str,
    ) -> io::Result<DocumentUri>;

    /// Delete a node; directories are removed with everything below them.
    async fn delete(&self, uri: &DocumentUri) -> io::Result<()>;
}

/// Refuse URIs minted for another provider.
pub(crate) fn check_authority(authority: &str, uri: &DocumentUri) -> io::Result<()> {
    if uri.authority() != authority {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("unknown authority: {}", uri.authority()),
        ));
    }
    Ok(())
}

/// Document ID addressed by `uri`, after checking it lies inside the
/// URI's tree grant.
pub(crate) fn scoped_document_id(uri: &DocumentUri) -> io::Result<&str> {
    let doc = uri.document_id();
    match uri.tree_document_id() {
        Some(tree) if !is_within(tree, doc) => Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("document {doc} is outside tree {tree}"),
        )),
        _ => Ok(doc),
    }
}

/// MIME type guessed from a display name's extension.
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Resolve `desired` against existing sibling names the way the platform
/// provider does: `a.txt` → `a (1).txt` → `a (2).txt`. Directories keep
/// the whole name as the stem.
pub(crate) fn unique_name(desired: &str, is_directory: bool, taken: impl Fn(&str) -> bool) -> String {
    if !taken(desired) {
        return desired.to_string();
    }
    let (stem, ext) = match desired.rsplit_once('.') {
        Some((stem, ext)) if !is_directory && !stem.is_empty() => (stem, Some(ext)),
        _ => (desired, None),
    };
    let mut n = 1u32;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Reject names that would smuggle path structure into a document ID.
pub(crate) fn check_display_name(name: &str) -> io::Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid display name: {name:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name() {
        let taken = ["a.txt", "a (1).txt", "dir", ".nomedia"];
        let is_taken = |n: &str| taken.contains(&n);
        assert_eq!(unique_name("b.txt", false, is_taken), "b.txt");
        assert_eq!(unique_name("a.txt", false, is_taken), "a (2).txt");
        assert_eq!(unique_name("dir", true, is_taken), "dir (1)");
        assert_eq!(unique_name(".nomedia", false, is_taken), ".nomedia (1)");
    }

    #[test]
    fn test_mime_for_name() {
        assert_eq!(mime_for_name("a.TXT"), "text/plain");
        assert_eq!(mime_for_name("photo.jpg"), "image/jpeg");
        assert_eq!(mime_for_name("noext"), "application/octet-stream");
    }

    #[test]
    fn test_scoped_document_id() {
        let tree = DocumentUri::tree(EXTERNAL_STORAGE_AUTHORITY, "primary:Docs");
        assert_eq!(scoped_document_id(&tree).unwrap(), "primary:Docs");
        assert!(scoped_document_id(&tree.child_in_tree("primary:Docs/a")).is_ok());

        let escaped = tree.child_in_tree("primary:Other");
        let err = scoped_document_id(&escaped).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_check_display_name() {
        assert!(check_display_name("a.txt").is_ok());
        assert!(check_display_name("a/b").is_err());
        assert!(check_display_name("..").is_err());
        assert!(check_display_name("").is_err());
    }
}
