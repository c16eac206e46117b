//! Document-tree backend: user-granted storage addressed by opaque URIs.
//!
//! Every node is reached through the injected [`DocumentProvider`]. Tree
//! operations (create children, enumerate, delete a directory) need a tree
//! URI; document operations (read, overwrite, delete a file) need a URI that
//! names a document. Passing the wrong kind is `Unsupported`.
//!
//! The recursive pieces live in submodules:
//!
//! - `listing`: depth-bounded, optionally aggregating directory walk
//! - `image`: JPEG normalization of images into a directory
//! - `transfer`: copy-then-delete directory moves

mod image;
mod listing;
mod transfer;

pub use image::{CodecError, DecodedImage, ImageCodec, NOMEDIA, Rotation, UnavailableCodec};

use std::fmt;
use std::io;
use std::sync::Arc;

use storage_access_types::{StorageError, StorageResult};
use tokio::runtime::Handle;

use crate::provider::{DocumentInfo, DocumentProvider, MIME_TYPE_DIR, MIME_WILDCARD};
use crate::uri::{DocumentUri, child_document_id};

/// Default JPEG quality for image conversion.
pub const DEFAULT_JPEG_QUALITY: u8 = 100;

/// Backend over one document provider.
#[derive(Clone)]
pub struct ExternalBackend {
    provider: Arc<dyn DocumentProvider>,
    codec: Arc<dyn ImageCodec>,
    handle: Handle,
    jpeg_quality: u8,
}

impl fmt::Debug for ExternalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalBackend")
            .field("authority", &self.provider.authority())
            .field("jpeg_quality", &self.jpeg_quality)
            .finish_non_exhaustive()
    }
}

impl ExternalBackend {
    /// Listing subtasks are spawned on `handle`.
    pub fn new(provider: Arc<dyn DocumentProvider>, codec: Arc<dyn ImageCodec>, handle: Handle) -> Self {
        Self {
            provider,
            codec,
            handle,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn provider(&self) -> &Arc<dyn DocumentProvider> {
        &self.provider
    }

    /// Parse a URI and make sure our provider answers for it.
    fn parse(&self, uri: &str) -> StorageResult<DocumentUri> {
        let parsed = DocumentUri::parse(uri)?;
        if parsed.authority() != self.provider.authority() {
            return Err(StorageError::NotFound(format!(
                "no document provider for authority {}",
                parsed.authority()
            )));
        }
        Ok(parsed)
    }

    /// A URI that can enumerate and create children.
    fn tree(&self, uri: &str) -> StorageResult<DocumentUri> {
        let parsed = self.parse(uri)?;
        if !parsed.is_tree() {
            return Err(StorageError::Unsupported(format!(
                "expected a tree URI, got a single-document URI: {uri}"
            )));
        }
        Ok(parsed)
    }

    /// A URI that names one document.
    fn document(&self, uri: &str) -> StorageResult<DocumentUri> {
        let parsed = self.parse(uri)?;
        if !parsed.has_document() {
            return Err(StorageError::Unsupported(format!(
                "expected a document URI, got a bare tree URI: {uri}"
            )));
        }
        Ok(parsed)
    }

    /// Resolve an existing directory through a tree URI.
    async fn directory(&self, uri: &str, what: &str) -> StorageResult<(DocumentUri, DocumentInfo)> {
        let tree = self.tree(uri)?;
        let info = match self.provider.query(&tree).await {
            Ok(info) => info,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!("{what} not found: {uri}")));
            }
            Err(e) => return Err(provider_error(uri, e)),
        };
        if !info.is_directory() {
            return Err(StorageError::Unsupported(format!("{what} is not a directory: {uri}")));
        }
        Ok((tree, info))
    }

    /// Resolve an existing non-directory document.
    async fn file(&self, uri: &str) -> StorageResult<(DocumentUri, DocumentInfo)> {
        let doc = self.document(uri)?;
        let info = match self.provider.query(&doc).await {
            Ok(info) => info,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!("file not found: {uri}")));
            }
            Err(e) => return Err(provider_error(uri, e)),
        };
        if info.is_directory() {
            return Err(StorageError::Unsupported(format!("is a directory: {uri}")));
        }
        Ok((doc, info))
    }

    /// Text of a document, or `None` if it does not resolve.
    pub async fn read(&self, uri: &str) -> StorageResult<Option<String>> {
        let doc = match self.file(uri).await {
            Ok((doc, _)) => doc,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        match self.provider.read(&doc).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(provider_error(uri, e)),
        }
    }

    /// Create `filename.extension` under `parent` and write `content` to it.
    ///
    /// Returns the URI the provider issued, whose display name may differ
    /// from the requested one.
    pub async fn write(
        &self,
        parent: &str,
        content: &str,
        filename: &str,
        extension: &str,
    ) -> StorageResult<String> {
        let (dir, _) = self.directory(parent, "directory").await?;
        let name = if extension.is_empty() {
            filename.to_string()
        } else {
            format!("{filename}.{extension}")
        };
        let created = self
            .provider
            .create(&dir, MIME_WILDCARD, &name)
            .await
            .map_err(|e| StorageError::CreationFailed(format!("failed to create {name} in {parent}: {e}")))?;
        self.provider
            .write(&created, content.as_bytes())
            .await
            .map_err(|e| provider_error(&created, e))?;
        tracing::debug!(uri = %created, bytes = content.len(), "document written");
        Ok(created.to_string())
    }

    /// Truncate an existing document and write `content`.
    pub async fn overwrite(&self, uri: &str, content: &str) -> StorageResult<String> {
        let (doc, _) = self.file(uri).await?;
        self.provider
            .write(&doc, content.as_bytes())
            .await
            .map_err(|e| provider_error(uri, e))?;
        tracing::debug!(%uri, bytes = content.len(), "document overwritten");
        Ok(uri.to_string())
    }

    /// Delete a single document.
    pub async fn delete(&self, uri: &str) -> StorageResult<()> {
        let (doc, _) = self.file(uri).await?;
        self.provider
            .delete(&doc)
            .await
            .map_err(|e| provider_error(format!("could not delete {uri}"), e))
    }

    /// Whether a node resolves. Both tree and document URIs are accepted.
    pub async fn exists(&self, uri: &str) -> StorageResult<bool> {
        // Same answer as `read`: a URI no provider resolves names nothing.
        let parsed = match self.parse(uri) {
            Ok(parsed) => parsed,
            Err(StorageError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        match self.provider.query(&parsed).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(provider_error(uri, e)),
        }
    }

    /// Create directory `name` under `parent`.
    pub async fn create_directory(&self, parent: &str, name: &str) -> StorageResult<String> {
        let (dir, _) = self.directory(parent, "parent directory").await?;
        let created = self
            .provider
            .create(&dir, MIME_TYPE_DIR, name)
            .await
            .map_err(|e| StorageError::CreationFailed(format!("could not create directory {name} in {parent}: {e}")))?;
        tracing::debug!(uri = %created, "directory created");
        Ok(created.to_string())
    }

    /// Delete a directory and everything below it.
    pub async fn delete_directory(&self, uri: &str) -> StorageResult<()> {
        let (dir, _) = self.directory(uri, "directory").await?;
        self.provider
            .delete(&dir)
            .await
            .map_err(|e| provider_error(format!("could not delete directory {uri}"), e))?;
        tracing::debug!(%uri, "directory deleted");
        Ok(())
    }

    /// URI of `name` below `base`, built lexically from the document ID.
    ///
    /// The node is not checked; use [`find_subdirectory`](Self::find_subdirectory)
    /// when it must exist.
    pub fn subdirectory_uri(&self, base: &str, name: &str) -> StorageResult<String> {
        let tree = self.tree(base)?;
        let name = name.trim_matches('/');
        if name.is_empty() {
            return Err(StorageError::InvalidLocation("empty subdirectory name".into()));
        }
        let child = child_document_id(tree.document_id(), name);
        Ok(tree.child_in_tree(child).to_string())
    }

    /// URI of the existing child directory `name` of `base`.
    pub async fn find_subdirectory(&self, base: &str, name: &str) -> StorageResult<String> {
        let (dir, _) = self.directory(base, "directory").await?;
        let children = self
            .provider
            .children(&dir)
            .await
            .map_err(|e| provider_error(base, e))?;
        children
            .into_iter()
            .find(|c| c.is_directory() && c.display_name == name)
            .map(|c| c.uri.to_string())
            .ok_or_else(|| StorageError::NotFound(format!("no subdirectory {name} in {base}")))
    }
}

/// Map a provider failure onto the storage taxonomy, keeping context.
pub(crate) fn provider_error(context: impl fmt::Display, err: io::Error) -> StorageError {
    let detail = format!("{context}: {err}");
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound(detail),
        io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(detail),
        io::ErrorKind::Unsupported
        | io::ErrorKind::IsADirectory
        | io::ErrorKind::NotADirectory => StorageError::Unsupported(detail),
        _ => StorageError::Io(detail),
    }
}
