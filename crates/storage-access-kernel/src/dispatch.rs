//! Dispatcher: the public storage surface.
//!
//! Every entry point classifies its location argument once, then forwards
//! the typed [`Location`] to the backend that owns it. Backend calls are
//! spawned on the [`WorkerPool`]; the caller's task only waits.
//!
//! ```text
//! caller (location string)
//!     ↓
//! PathClassifier ── unknown ──→ ClassificationUnknown
//!     ↓
//! ┌──────────────────────────────┬───────────────────────────────┐
//! │  Internal(relative path)     │  External(content:// URI)     │
//! │  InternalBackend, blocking   │  ExternalBackend, async       │
//! │  lane of the pool            │  tasks on the pool            │
//! └──────────────────────────────┴───────────────────────────────┘
//! ```
//!
//! Operations a backend cannot serve fail with `Unsupported`; nothing is
//! silently skipped.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use storage_access_types::{
    AccessType, ListDepth, Listing, Location, Outcome, StorageError, StorageResult, StorageType,
};

use crate::classify::PathClassifier;
use crate::config::StorageConfig;
use crate::external::{ExternalBackend, ImageCodec, UnavailableCodec};
use crate::internal::InternalBackend;
use crate::permission::{HeadlessPrompt, PermissionCoordinator, PermissionPrompt};
use crate::pool::WorkerPool;
use crate::prefs::{FilePreferences, PreferenceStore};
use crate::provider::{DocumentProvider, LocalProvider, MemoryProvider};

/// Routes storage operations to the internal or external backend.
pub struct Dispatcher {
    pool: WorkerPool,
    classifier: PathClassifier,
    internal: InternalBackend,
    external: ExternalBackend,
    prefs: Arc<dyn PreferenceStore>,
    permissions: Arc<PermissionCoordinator>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sandbox_root", &self.internal.root())
            .field("external", &self.external)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build a dispatcher with a headless prompt and no image codec.
    pub fn new(
        pool: WorkerPool,
        sandbox_root: impl Into<PathBuf>,
        provider: Arc<dyn DocumentProvider>,
        prefs: Arc<dyn PreferenceStore>,
    ) -> Self {
        let sandbox_root = sandbox_root.into();
        let external = ExternalBackend::new(provider, Arc::new(UnavailableCodec), pool.handle().clone());
        Self {
            classifier: PathClassifier::new(&sandbox_root, prefs.clone()),
            internal: InternalBackend::new(sandbox_root),
            external,
            permissions: Arc::new(PermissionCoordinator::new(Arc::new(HeadlessPrompt), prefs.clone())),
            prefs,
            pool,
        }
    }

    /// Build from configuration.
    ///
    /// Creates the sandbox root if needed. With `external_root` set, that
    /// host directory is exposed as the document tree; otherwise the tree
    /// starts out empty in memory.
    pub fn from_config(config: &StorageConfig, pool: WorkerPool) -> StorageResult<Self> {
        std::fs::create_dir_all(&config.sandbox_root).map_err(|e| {
            StorageError::Io(format!(
                "could not create sandbox root {}: {e}",
                config.sandbox_root.display()
            ))
        })?;
        let provider: Arc<dyn DocumentProvider> = match &config.external_root {
            Some(root) => Arc::new(LocalProvider::with_authority(
                root,
                config.authority.as_str(),
                &config.external_root_id,
            )),
            None => Arc::new(MemoryProvider::with_authority(
                config.authority.as_str(),
                &config.external_root_id,
            )),
        };
        let prefs = Arc::new(FilePreferences::open(&config.preferences_path)?);
        tracing::debug!(
            sandbox_root = %config.sandbox_root.display(),
            authority = %config.authority,
            "dispatcher configured"
        );
        Ok(Self::new(pool, &config.sandbox_root, provider, prefs).with_jpeg_quality(config.jpeg_quality))
    }

    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.external = self.external.with_codec(codec);
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.external = self.external.with_jpeg_quality(quality);
        self
    }

    /// Replace the permission prompt, keeping the preference store.
    pub fn with_prompt(mut self, prompt: Arc<dyn PermissionPrompt>) -> Self {
        self.permissions = Arc::new(PermissionCoordinator::new(prompt, self.prefs.clone()));
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn classifier(&self) -> &PathClassifier {
        &self.classifier
    }

    /// Stop the owned worker pool.
    pub fn shutdown(self) {
        self.pool.shutdown();
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Routing
    // ═══════════════════════════════════════════════════════════════════════

    fn classify(&self, location: Option<&str>) -> StorageResult<Location> {
        self.classifier.classify(location)
    }

    async fn on_internal<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(InternalBackend) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let backend = self.internal.clone();
        self.pool.run_blocking(move || f(backend)).await?
    }

    async fn on_external<F, Fut, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(ExternalBackend) -> Fut,
        Fut: Future<Output = StorageResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.pool.run(f(self.external.clone())).await?
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Files
    // ═══════════════════════════════════════════════════════════════════════

    /// Text of a file, or `None` if it does not exist.
    pub async fn read_file(&self, location: &str) -> StorageResult<Option<String>> {
        match self.classify(Some(location))? {
            Location::Internal(path) => self.on_internal(move |b| b.read(&path)).await,
            Location::External(uri) => self.on_external(|ext| async move { ext.read(&uri).await }).await,
        }
    }

    /// Create `filename.extension` under `parent`.
    ///
    /// Internal storage reports the legacy flag; external storage returns
    /// the URI the provider issued.
    pub async fn write_file(
        &self,
        parent: &str,
        content: &str,
        filename: &str,
        extension: &str,
    ) -> StorageResult<Outcome> {
        let content = content.to_string();
        match self.classify(Some(parent))? {
            loc @ Location::Internal(_) => {
                let target = loc.join(&file_name(filename, extension))?;
                self.on_internal(move |b| Ok(Outcome::Flag(b.write(target.as_str(), &content))))
                    .await
            }
            Location::External(uri) => {
                let (filename, extension) = (filename.to_string(), extension.to_string());
                self.on_external(|ext| async move {
                    ext.write(&uri, &content, &filename, &extension).await.map(Outcome::Uri)
                })
                .await
            }
        }
    }

    /// Truncate and rewrite an existing document.
    pub async fn overwrite_file(&self, location: &str, content: &str) -> StorageResult<String> {
        let uri = external_only(self.classify(Some(location))?, "overwrite_file")?;
        let content = content.to_string();
        self.on_external(|ext| async move { ext.overwrite(&uri, &content).await })
            .await
    }

    /// Re-encode an image as `filename.jpg` in `dest_dir`.
    pub async fn convert_to_jpg_and_copy(
        &self,
        source: &str,
        dest_dir: &str,
        filename: &str,
    ) -> StorageResult<String> {
        let dest = external_only(self.classify(Some(dest_dir))?, "convert_to_jpg_and_copy")?;
        let source = match self.classify(Some(source))? {
            Location::External(uri) => uri,
            Location::Internal(path) => {
                return Err(StorageError::Unsupported(format!(
                    "convert_to_jpg_and_copy needs an external source, got internal path {path:?}"
                )));
            }
        };
        let filename = filename.to_string();
        self.on_external(|ext| async move {
            ext.convert_to_jpg_and_copy(&source, &dest, &filename).await
        })
        .await
    }

    pub async fn delete_file(&self, location: &str) -> StorageResult<bool> {
        match self.classify(Some(location))? {
            Location::Internal(path) => self.on_internal(move |b| Ok(b.delete(&path))).await,
            Location::External(uri) => {
                self.on_external(|ext| async move { ext.delete(&uri).await.map(|()| true) })
                    .await
            }
        }
    }

    pub async fn file_exists(&self, location: &str) -> StorageResult<bool> {
        match self.classify(Some(location))? {
            Location::Internal(path) => self.on_internal(move |b| Ok(b.exists(&path))).await,
            Location::External(uri) => self.on_external(|ext| async move { ext.exists(&uri).await }).await,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Directories
    // ═══════════════════════════════════════════════════════════════════════

    /// List a directory; `None` lists the app directory.
    ///
    /// Internal storage lists one level and ignores `depth`; external
    /// storage returns the depth-bounded tree.
    pub async fn list_files(
        &self,
        location: Option<&str>,
        depth: ListDepth,
        include_size_and_count: bool,
    ) -> StorageResult<Listing> {
        match self.classify(location)? {
            Location::Internal(path) => {
                self.on_internal(move |b| b.list(&path).map(Listing::Flat)).await
            }
            Location::External(uri) => {
                self.on_external(|ext| async move {
                    ext.list(&uri, depth, include_size_and_count).await.map(Listing::Tree)
                })
                .await
            }
        }
    }

    /// Create directory `name` under `parent` (the app directory if `None`).
    pub async fn create_directory(&self, name: &str, parent: Option<&str>) -> StorageResult<Outcome> {
        match self.classify(parent)? {
            loc @ Location::Internal(_) => {
                let target = loc.join(name)?;
                self.on_internal(move |b| Ok(Outcome::Flag(b.create_directory(target.as_str()))))
                    .await
            }
            Location::External(uri) => {
                let name = name.to_string();
                self.on_external(|ext| async move {
                    ext.create_directory(&uri, &name).await.map(Outcome::Uri)
                })
                .await
            }
        }
    }

    pub async fn delete_directory(&self, location: &str) -> StorageResult<bool> {
        match self.classify(Some(location))? {
            Location::Internal(path) => self.on_internal(move |b| Ok(b.delete_directory(&path))).await,
            Location::External(uri) => {
                self.on_external(|ext| async move { ext.delete_directory(&uri).await.map(|()| true) })
                    .await
            }
        }
    }

    /// Move directory `source` into directory `dest`.
    pub async fn move_directory(&self, source: &str, dest: &str) -> StorageResult<()> {
        let source = external_only(self.classify(Some(source))?, "move_directory")?;
        let dest = external_only(self.classify(Some(dest))?, "move_directory")?;
        self.on_external(|ext| async move { ext.move_directory(&source, &dest).await.map(|_| ()) })
            .await
    }

    /// URI of `name` below `base` (the app directory if `None`), without
    /// checking that it exists.
    pub async fn get_subdirectory_uri(&self, base: Option<&str>, name: &str) -> StorageResult<String> {
        match self.classify(base)? {
            loc @ Location::Internal(_) => {
                let target = loc.join(name)?;
                self.on_internal(move |b| b.subdirectory_uri(target.as_str())).await
            }
            Location::External(uri) => {
                let name = name.to_string();
                self.on_external(|ext| async move { ext.subdirectory_uri(&uri, &name) })
                    .await
            }
        }
    }

    /// URI of the existing child directory `name` of `base`.
    pub async fn find_subdirectory_uri(&self, base: Option<&str>, name: &str) -> StorageResult<String> {
        let uri = external_only(self.classify(base)?, "find_subdirectory_uri")?;
        let name = name.to_string();
        self.on_external(|ext| async move { ext.find_subdirectory(&uri, &name).await })
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Classification and permissions
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get_storage_type(&self, location: Option<&str>) -> StorageType {
        self.classifier.storage_type(location)
    }

    pub fn get_app_directory(&self) -> String {
        self.classifier.app_directory()
    }

    pub fn set_permission_type(&self, access_type: AccessType) {
        self.permissions.set_permission_type(access_type);
    }

    pub async fn request_permission(&self) -> StorageResult<Option<String>> {
        let permissions = self.permissions.clone();
        self.pool
            .run(async move { permissions.request_permission().await })
            .await?
    }

    pub async fn select_directory(&self) -> StorageResult<String> {
        let permissions = self.permissions.clone();
        self.pool
            .run(async move { permissions.select_directory().await })
            .await?
    }

    pub async fn check_permissions(&self) -> StorageResult<bool> {
        let permissions = self.permissions.clone();
        self.pool
            .run(async move { permissions.check_permissions().await })
            .await
    }

    /// Persist a tree grant delivered by the platform.
    pub fn record_grant(&self, uri: &str, access_type: AccessType) -> StorageResult<String> {
        self.permissions.record_grant(uri, access_type)
    }
}

/// `filename.extension`, or just `filename` without an extension.
fn file_name(filename: &str, extension: &str) -> String {
    if extension.is_empty() {
        filename.to_string()
    } else {
        format!("{filename}.{extension}")
    }
}

fn external_only(location: Location, op: &str) -> StorageResult<String> {
    match location {
        Location::External(uri) => Ok(uri),
        Location::Internal(path) => Err(StorageError::Unsupported(format!(
            "{op} is not supported on internal storage ({path:?})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::GrantOutcome;
    use crate::prefs::MemoryPreferences;

    fn dispatcher(root: &std::path::Path) -> Dispatcher {
        Dispatcher::new(
            WorkerPool::current().unwrap(),
            root,
            Arc::new(MemoryProvider::new()),
            Arc::new(MemoryPreferences::new()),
        )
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("a", "txt"), "a.txt");
        assert_eq!(file_name("Makefile", ""), "Makefile");
    }

    #[tokio::test]
    async fn test_write_file_joins_parent_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let root = dir.path().to_str().unwrap();

        assert_eq!(
            d.create_directory("notes", None).await.unwrap(),
            Outcome::Flag(true)
        );
        let notes = dir.path().join("notes");
        let outcome = d
            .write_file(notes.to_str().unwrap(), "hello", "a", "txt")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Flag(true));
        assert_eq!(
            std::fs::read_to_string(notes.join("a.txt")).unwrap(),
            "hello"
        );
        assert_eq!(d.get_storage_type(Some(root)), StorageType::Internal);
    }

    #[tokio::test]
    async fn test_external_only_operations_refuse_internal() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let root = dir.path().to_str().unwrap();

        assert!(matches!(
            d.overwrite_file(root, "x").await,
            Err(StorageError::Unsupported(_))
        ));
        assert!(matches!(
            d.move_directory(root, root).await,
            Err(StorageError::Unsupported(_))
        ));
        assert!(matches!(
            d.find_subdirectory_uri(None, "x").await,
            Err(StorageError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_internal_subdirectory_uri() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let uri = d.get_subdirectory_uri(None, "photos").await.unwrap();
        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with("/photos"));
    }

    /// Grants whatever tree it was built with.
    struct GrantingPrompt(String);

    #[async_trait::async_trait]
    impl PermissionPrompt for GrantingPrompt {
        async fn request(&self, _access_type: AccessType) -> StorageResult<GrantOutcome> {
            Ok(GrantOutcome::Tree(self.0.clone()))
        }

        async fn pick_directory(&self) -> StorageResult<GrantOutcome> {
            Ok(GrantOutcome::Tree(self.0.clone()))
        }

        async fn runtime_permission_granted(&self, _access_type: AccessType) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_prompt_grants_become_the_app_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tree = MemoryProvider::new().tree_uri("Docs").to_string();
        let d = dispatcher(dir.path()).with_prompt(Arc::new(GrantingPrompt(tree.clone())));
        assert_eq!(d.get_app_directory(), dir.path().display().to_string());

        assert_eq!(d.request_permission().await.unwrap().as_deref(), Some(tree.as_str()));
        assert_eq!(d.get_app_directory(), tree);
        assert_eq!(d.get_storage_type(None), StorageType::External);
        assert!(d.check_permissions().await.unwrap());
    }
}
