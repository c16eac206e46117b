//! Host-directory document provider.
//!
//! Exposes a real directory as a document tree. Document IDs follow the
//! external-storage convention `<root>:<relative/path>`, so a tree rooted at
//! `/home/amy/phone` answers `primary:DCIM/a.jpg` from
//! `/home/amy/phone/DCIM/a.jpg`.

use super::{
    DocumentInfo, DocumentProvider, EXTERNAL_STORAGE_AUTHORITY, MIME_TYPE_DIR,
    check_authority, check_display_name, mime_for_name, scoped_document_id, unique_name,
};
use crate::uri::{DocumentUri, child_document_id};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use storage_access_types::normalize_relative;
use tokio::fs;

/// Document provider backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    authority: String,
    root: PathBuf,
    root_id: String,
}

impl LocalProvider {
    /// Expose `root` as volume `primary` of the external-storage authority.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_authority(root, EXTERNAL_STORAGE_AUTHORITY, "primary")
    }

    pub fn with_authority(root: impl Into<PathBuf>, authority: impl Into<String>, volume: &str) -> Self {
        Self {
            authority: authority.into(),
            root: root.into(),
            root_id: format!("{volume}:"),
        }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tree URI granting access to a path relative to the root.
    pub fn tree_uri(&self, path: &str) -> io::Result<DocumentUri> {
        let rel = normalize_relative(path)
            .map_err(|e| io::Error::new(io::ErrorKind::PermissionDenied, e.to_string()))?;
        Ok(DocumentUri::tree(self.authority.clone(), format!("{}{rel}", self.root_id)))
    }

    /// Resolve a document ID to a path within the root.
    ///
    /// Returns an error if the ID belongs to another volume or escapes the
    /// root (via `..`).
    fn resolve(&self, document_id: &str) -> io::Result<PathBuf> {
        let rel = document_id.strip_prefix(&self.root_id).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("document {document_id} is not on volume {}", self.root_id),
            )
        })?;
        let rel = normalize_relative(rel).map_err(|e| {
            io::Error::new(io::ErrorKind::PermissionDenied, e.to_string())
        })?;
        Ok(if rel.is_empty() { self.root.clone() } else { self.root.join(rel) })
    }

    async fn info(&self, reached_through: &DocumentUri, id: &str, path: &Path) -> io::Result<DocumentInfo> {
        let meta = fs::metadata(path).await?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.trim_end_matches(':').to_string());
        let (mime_type, size) = if meta.is_dir() {
            (MIME_TYPE_DIR, 0)
        } else {
            (mime_for_name(&display_name), meta.len())
        };
        Ok(DocumentInfo {
            uri: reached_through.child_in_tree(id),
            display_name,
            mime_type: mime_type.to_string(),
            size,
        })
    }
}

#[async_trait]
impl DocumentProvider for LocalProvider {
    fn authority(&self) -> &str {
        &self.authority
    }

    async fn query(&self, uri: &DocumentUri) -> io::Result<DocumentInfo> {
        check_authority(&self.authority, uri)?;
        let id = scoped_document_id(uri)?;
        let path = self.resolve(id)?;
        self.info(uri, id, &path).await
    }

    async fn children(&self, uri: &DocumentUri) -> io::Result<Vec<DocumentInfo>> {
        check_authority(&self.authority, uri)?;
        let id = scoped_document_id(uri)?;
        let path = self.resolve(id)?;

        let mut names = Vec::new();
        let mut dir = fs::read_dir(&path).await?;
        while let Some(entry) = dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        let mut children = Vec::with_capacity(names.len());
        for name in names {
            let child_id = child_document_id(id, &name);
            match self.info(uri, &child_id, &path.join(&name)).await {
                Ok(info) => children.push(info),
                // Removed while we were enumerating.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(children)
    }

    async fn read(&self, uri: &DocumentUri) -> io::Result<Vec<u8>> {
        check_authority(&self.authority, uri)?;
        let path = self.resolve(scoped_document_id(uri)?)?;
        fs::read(&path).await
    }

    async fn write(&self, uri: &DocumentUri, data: &[u8]) -> io::Result<()> {
        check_authority(&self.authority, uri)?;
        let path = self.resolve(scoped_document_id(uri)?)?;
        let meta = fs::metadata(&path).await?;
        if meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            ));
        }
        fs::write(&path, data).await
    }

    async fn create(
        &self,
        parent: &DocumentUri,
        mime_type: &str,
        display_name: &str,
    ) -> io::Result<DocumentUri> {
        check_authority(&self.authority, parent)?;
        check_display_name(display_name)?;
        let parent_id = scoped_document_id(parent)?;
        let parent_path = self.resolve(parent_id)?;
        if !fs::metadata(&parent_path).await?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {parent_id}"),
            ));
        }

        let is_directory = mime_type == MIME_TYPE_DIR;
        let name = unique_name(display_name, is_directory, |n| parent_path.join(n).exists());
        let path = parent_path.join(&name);
        if is_directory {
            fs::create_dir(&path).await?;
        } else {
            // The extension decides the MIME type on the next query.
            fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await?;
        }
        Ok(parent.child_in_tree(child_document_id(parent_id, &name)))
    }

    async fn delete(&self, uri: &DocumentUri) -> io::Result<()> {
        check_authority(&self.authority, uri)?;
        let id = scoped_document_id(uri)?;
        if id == self.root_id {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot delete the volume root",
            ));
        }
        let path = self.resolve(id)?;
        let meta = fs::metadata(&path).await?;
        if meta.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MIME_WILDCARD;
    use tempfile::TempDir;

    async fn setup() -> (LocalProvider, TempDir) {
        let dir = TempDir::new().unwrap();
        (LocalProvider::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn test_create_write_read() {
        let (provider, _dir) = setup().await;
        let root = provider.tree_uri("").unwrap();

        let docs = provider.create(&root, MIME_TYPE_DIR, "Docs").await.unwrap();
        assert_eq!(docs.document_id(), "primary:Docs");

        let file = provider.create(&docs, MIME_WILDCARD, "a.txt").await.unwrap();
        provider.write(&file, b"hello").await.unwrap();
        assert_eq!(provider.read(&file).await.unwrap(), b"hello");

        let info = provider.query(&file).await.unwrap();
        assert_eq!(info.display_name, "a.txt");
        assert_eq!(info.mime_type, "text/plain");
        assert_eq!(info.size, 5);
    }

    #[tokio::test]
    async fn test_children_sorted_by_name() {
        let (provider, dir) = setup().await;
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();

        let children = provider.children(&provider.tree_uri("").unwrap()).await.unwrap();
        let names: Vec<_> = children.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c"]);
        assert!(children[2].is_directory());
        assert_eq!(children[0].document_id(), "primary:a.txt");
    }

    #[tokio::test]
    async fn test_collision_renames() {
        let (provider, dir) = setup().await;
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let root = provider.tree_uri("").unwrap();

        let uri = provider.create(&root, MIME_WILDCARD, "a.txt").await.unwrap();
        assert_eq!(uri.document_id(), "primary:a (1).txt");
        assert!(dir.path().join("a (1).txt").exists());
    }

    #[tokio::test]
    async fn test_delete_directory_recursively() {
        let (provider, dir) = setup().await;
        std::fs::create_dir_all(dir.path().join("x/y")).unwrap();
        std::fs::write(dir.path().join("x/y/z.txt"), b"z").unwrap();

        let x = provider.tree_uri("x").unwrap();
        provider.delete(&x).await.unwrap();
        assert!(!dir.path().join("x").exists());
    }

    #[tokio::test]
    async fn test_path_escape_blocked() {
        let (provider, _dir) = setup().await;

        let uri = DocumentUri::document(EXTERNAL_STORAGE_AUTHORITY, "primary:../../etc/passwd");
        let err = provider.read(&uri).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        assert!(provider.tree_uri("../up").is_err());
    }

    #[tokio::test]
    async fn test_foreign_volume_not_found() {
        let (provider, _dir) = setup().await;
        let uri = DocumentUri::document(EXTERNAL_STORAGE_AUTHORITY, "sdcard:a.txt");
        let err = provider.query(&uri).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
