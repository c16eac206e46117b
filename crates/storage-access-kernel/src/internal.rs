//! Sandbox backend: app-private storage addressed by relative paths.
//!
//! All operations are synchronous and relative to `root`. For example, if
//! `root` is `/data/user/0/app/files`, then `read("notes/a.txt")` reads
//! `/data/user/0/app/files/notes/a.txt`.
//!
//! Two call contracts exist side by side. The legacy tier (`write`,
//! `create_directory`, `delete_directory`, `delete`) reports failure as
//! `false`; the raising tier (`try_*`) returns the error. Callers exist on
//! both, so neither is a wrapper to be removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use storage_access_types::{
    DirectoryEntry, Location, StorageError, StorageResult, normalize_relative,
};
use url::Url;

/// Backend over the app sandbox directory.
#[derive(Debug, Clone)]
pub struct InternalBackend {
    root: PathBuf,
}

impl InternalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path to an absolute path within the root.
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let rel = normalize_relative(path)?;
        Ok(if rel.is_empty() { self.root.clone() } else { self.root.join(rel) })
    }

    /// `file://` URI of a relative path.
    pub fn uri_for(&self, path: &str) -> StorageResult<String> {
        let full = self.resolve(path)?;
        Url::from_file_path(&full)
            .map(String::from)
            .map_err(|()| StorageError::InvalidLocation(format!("not an absolute path: {}", full.display())))
    }

    /// Full text of a file, or `None` if it does not exist.
    pub fn read(&self, path: &str) -> StorageResult<Option<String>> {
        let full = self.resolve(path)?;
        match fs::read_to_string(&full) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a file. Parent directories are not created.
    pub fn write(&self, path: &str, content: &str) -> bool {
        legacy("write", path, self.try_write(path, content))
    }

    pub fn try_write(&self, path: &str, content: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        fs::write(&full, content)?;
        tracing::debug!(path, bytes = content.len(), "internal write");
        Ok(())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|full| full.exists()).unwrap_or(false)
    }

    /// Create a directory and its parents. `false` if it already existed.
    pub fn create_directory(&self, path: &str) -> bool {
        legacy("create_directory", path, self.try_create_directory(path))
    }

    pub fn try_create_directory(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        if full.exists() {
            return Err(StorageError::CreationFailed(format!("already exists: {path}")));
        }
        fs::create_dir_all(&full)
            .map_err(|e| StorageError::CreationFailed(format!("{path}: {e}")))
    }

    /// Remove a directory and everything below it.
    pub fn delete_directory(&self, path: &str) -> bool {
        legacy("delete_directory", path, self.try_delete_directory(path))
    }

    pub fn try_delete_directory(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(StorageError::PermissionDenied("cannot delete the sandbox root".into()));
        }
        let meta = fs::metadata(&full)?;
        if !meta.is_dir() {
            return Err(StorageError::Unsupported(format!("not a directory: {path}")));
        }
        fs::remove_dir_all(&full)?;
        Ok(())
    }

    /// Remove a file. `false` if absent or a directory.
    pub fn delete(&self, path: &str) -> bool {
        legacy("delete", path, self.try_delete(path))
    }

    pub fn try_delete(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(StorageError::PermissionDenied("cannot delete the sandbox root".into()));
        }
        let meta = fs::metadata(&full)?;
        if meta.is_dir() {
            return Err(StorageError::Unsupported(format!("is a directory: {path}")));
        }
        fs::remove_file(&full)?;
        Ok(())
    }

    /// One level of a directory, sorted by name.
    ///
    /// Directories come back unloaded; a missing directory lists as empty.
    pub fn list(&self, path: &str) -> StorageResult<Vec<DirectoryEntry>> {
        let base = Location::internal(path)?;
        let full = self.resolve(path)?;
        let dir = match fs::read_dir(&full) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::NotADirectory => {
                return Err(StorageError::Unsupported(format!("not a directory: {path}")));
            }
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let location = base.join(&name)?;
            let uri = self.uri_for(location.as_str())?;
            let meta = entry.metadata()?;
            entries.push(if meta.is_dir() {
                DirectoryEntry::directory(name, location, uri)
            } else {
                DirectoryEntry::file(name, location, uri, meta.len())
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// URI of `root/name`; the directory need not exist.
    pub fn subdirectory_uri(&self, name: &str) -> StorageResult<String> {
        self.uri_for(name)
    }
}

fn legacy(op: &str, path: &str, result: StorageResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(op, path, error = %e, "internal storage operation failed");
            false
        }
    }
}
