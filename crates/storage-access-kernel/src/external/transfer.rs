//! Directory moves between document trees.
//!
//! Providers have no rename-across-parents, so a move copies everything
//! below the source into the destination and then deletes the source. A
//! failure while copying leaves a partial destination and an untouched
//! source.

use std::future::Future;
use std::pin::Pin;

use storage_access_types::{StorageError, StorageResult};

use super::{ExternalBackend, provider_error};
use crate::provider::{DocumentInfo, MIME_TYPE_DIR};
use crate::uri::{DocumentUri, is_within};

type CopyFuture<'a> = Pin<Box<dyn Future<Output = StorageResult<usize>> + Send + 'a>>;

impl ExternalBackend {
    /// Move the contents of directory `source` into directory `dest`.
    ///
    /// `dest` ends up with the structure that was below `source`; names
    /// already taken in `dest` get the provider's collision suffix. Returns
    /// the destination URI.
    pub async fn move_directory(&self, source: &str, dest: &str) -> StorageResult<String> {
        let (src, _) = self.directory(source, "source directory").await?;
        let (dst, _) = self.directory(dest, "destination directory").await?;
        if is_within(src.document_id(), dst.document_id()) {
            return Err(StorageError::Unsupported(format!(
                "cannot move {source} into itself ({dest})"
            )));
        }

        let copied = self.copy_children(&src, &dst).await?;

        self.provider
            .delete(&src)
            .await
            .map_err(|e| provider_error(format!("copied, but could not delete source {source}"), e))?;
        tracing::info!(%source, %dest, documents = copied, "directory moved");
        Ok(dst.to_string())
    }

    async fn create_dir_in(&self, parent: &DocumentUri, name: &str) -> StorageResult<DocumentUri> {
        self.provider
            .create(parent, MIME_TYPE_DIR, name)
            .await
            .map_err(|e| StorageError::CreationFailed(format!("could not create directory {name} in {parent}: {e}")))
    }

    /// Copy everything below `from` into the existing directory `to`.
    fn copy_children<'a>(&'a self, from: &'a DocumentUri, to: &'a DocumentUri) -> CopyFuture<'a> {
        Box::pin(async move {
            let children = self
                .provider
                .children(from)
                .await
                .map_err(|e| provider_error(from, e))?;
            let mut copied = 0;
            for child in children {
                if child.is_directory() {
                    let dir = self.create_dir_in(to, &child.display_name).await?;
                    copied += 1 + self.copy_children(&child.uri, &dir).await?;
                } else {
                    self.copy_file(&child, to).await?;
                    copied += 1;
                }
            }
            Ok(copied)
        })
    }

    async fn copy_file(&self, file: &DocumentInfo, to: &DocumentUri) -> StorageResult<()> {
        let created = self
            .provider
            .create(to, &file.mime_type, &file.display_name)
            .await
            .map_err(|e| {
                StorageError::CreationFailed(format!("could not create {} in {to}: {e}", file.display_name))
            })?;
        let bytes = self
            .provider
            .read(&file.uri)
            .await
            .map_err(|e| provider_error(&file.uri, e))?;
        self.provider
            .write(&created, &bytes)
            .await
            .map_err(|e| provider_error(&created, e))
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use async_trait::async_trait;

    use storage_access_types::ListDepth;

    use super::*;
    use crate::external::tests::backend;
    use crate::provider::{DocumentProvider, MemoryProvider};

    fn seeded() -> Arc<MemoryProvider> {
        let provider = Arc::new(MemoryProvider::new());
        provider.put_file("Src/a.txt", b"alpha").unwrap();
        provider.put_file("Src/sub/b.json", b"{}").unwrap();
        provider.mkdir_all("Src/empty").unwrap();
        provider.mkdir_all("Dest").unwrap();
        provider
    }

    #[tokio::test]
    async fn test_move_copies_then_deletes() {
        let provider = seeded();
        let ext = backend(provider.clone());
        let src = provider.tree_uri("Src").to_string();
        let dest = provider.tree_uri("Dest").to_string();

        let moved = ext.move_directory(&src, &dest).await.unwrap();
        assert_eq!(moved, dest);

        assert!(!provider.contains("Src"));
        assert!(!provider.contains("Dest/Src"));
        assert!(provider.contains("Dest/empty"));
        let b = provider.tree_uri("Dest/sub/b.json");
        assert_eq!(provider.read(&b).await.unwrap(), b"{}");
        let info = provider.query(&b).await.unwrap();
        assert_eq!(info.mime_type, "application/json");
        let a = provider.tree_uri("Dest/a.txt");
        assert_eq!(provider.read(&a).await.unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn test_move_destination_mirrors_source_children() {
        let provider = seeded();
        let ext = backend(provider.clone());
        let src = provider.tree_uri("Src").to_string();
        let dest = provider.tree_uri("Dest").to_string();

        let before = ext.list(&src, ListDepth::Unbounded, true).await.unwrap();
        ext.move_directory(&src, &dest).await.unwrap();
        let after = ext.list(&dest, ListDepth::Unbounded, true).await.unwrap();

        assert_eq!(after.child_names(), vec!["a.txt", "sub", "empty"]);
        assert_eq!(after.child_names(), before.child_names());
        assert_eq!(after.size, before.size);
        assert_eq!(after.total_count, before.total_count);
    }

    #[tokio::test]
    async fn test_move_into_itself_is_refused() {
        let provider = seeded();
        let ext = backend(provider.clone());
        let src = provider.tree_uri("Src").to_string();
        let inner = provider.tree_uri("Src/sub").to_string();

        for dest in [&src, &inner] {
            assert!(matches!(
                ext.move_directory(&src, dest).await,
                Err(StorageError::Unsupported(_))
            ));
        }
        assert!(provider.contains("Src/sub/b.json"));
    }

    #[tokio::test]
    async fn test_move_requires_directories() {
        let provider = seeded();
        let ext = backend(provider.clone());
        let file = provider.tree_uri("Src/a.txt").to_string();
        let dest = provider.tree_uri("Dest").to_string();
        let missing = provider.tree_uri("Nope").to_string();

        assert!(matches!(
            ext.move_directory(&file, &dest).await,
            Err(StorageError::Unsupported(_))
        ));
        assert!(matches!(
            ext.move_directory(&missing, &dest).await,
            Err(StorageError::NotFound(ref m)) if m.contains("source directory")
        ));
    }

    /// Delegates to a memory provider but refuses to create one name.
    struct FlakyProvider {
        inner: MemoryProvider,
        refuse: &'static str,
    }

    #[async_trait]
    impl DocumentProvider for FlakyProvider {
        fn authority(&self) -> &str {
            self.inner.authority()
        }

        async fn query(&self, uri: &DocumentUri) -> io::Result<DocumentInfo> {
            self.inner.query(uri).await
        }

        async fn children(&self, uri: &DocumentUri) -> io::Result<Vec<DocumentInfo>> {
            self.inner.children(uri).await
        }

        async fn read(&self, uri: &DocumentUri) -> io::Result<Vec<u8>> {
            self.inner.read(uri).await
        }

        async fn write(&self, uri: &DocumentUri, data: &[u8]) -> io::Result<()> {
            self.inner.write(uri, data).await
        }

        async fn create(&self, parent: &DocumentUri, mime_type: &str, name: &str) -> io::Result<DocumentUri> {
            if name == self.refuse {
                return Err(io::Error::other("disk full"));
            }
            self.inner.create(parent, mime_type, name).await
        }

        async fn delete(&self, uri: &DocumentUri) -> io::Result<()> {
            self.inner.delete(uri).await
        }
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_source_intact() {
        let inner = MemoryProvider::new();
        inner.put_file("Src/a.txt", b"alpha").unwrap();
        inner.put_file("Src/sub/b.json", b"{}").unwrap();
        inner.mkdir_all("Dest").unwrap();
        let src = inner.tree_uri("Src").to_string();
        let dest = inner.tree_uri("Dest").to_string();
        let provider = Arc::new(FlakyProvider { inner, refuse: "b.json" });

        let ext = ExternalBackend::new(
            provider.clone(),
            Arc::new(crate::external::UnavailableCodec),
            tokio::runtime::Handle::current(),
        );
        let err = ext.move_directory(&src, &dest).await.unwrap_err();
        assert!(matches!(err, StorageError::CreationFailed(ref m) if m.contains("b.json")));

        assert!(provider.inner.contains("Src/a.txt"));
        assert!(provider.inner.contains("Src/sub/b.json"));
        // Partial copy stays behind.
        assert!(provider.inner.contains("Dest/a.txt"));
        assert!(!provider.inner.contains("Dest/sub/b.json"));
    }
}
