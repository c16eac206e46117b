//! Decides which backend owns a location string.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use storage_access_types::{Location, StorageError, StorageResult, StorageType};
use url::Url;

use crate::prefs::{PreferenceStore, load_grant};
use crate::uri::is_content_uri;

/// Classifies location strings against one sandbox root.
#[derive(Clone)]
pub struct PathClassifier {
    sandbox_root: PathBuf,
    prefs: Arc<dyn PreferenceStore>,
}

impl std::fmt::Debug for PathClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathClassifier")
            .field("sandbox_root", &self.sandbox_root)
            .finish_non_exhaustive()
    }
}

impl PathClassifier {
    pub fn new(sandbox_root: impl Into<PathBuf>, prefs: Arc<dyn PreferenceStore>) -> Self {
        let root = sandbox_root.into();
        let sandbox_root = lexical_normalize(&root).unwrap_or(root);
        Self { sandbox_root, prefs }
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    /// The default location: the persisted grant, else the sandbox root.
    pub fn app_directory(&self) -> String {
        match load_grant(self.prefs.as_ref()) {
            Some(grant) => grant.uri,
            None => self.sandbox_root.display().to_string(),
        }
    }

    /// Storage type of a location; `None` or empty means the app directory.
    pub fn storage_type(&self, location: Option<&str>) -> StorageType {
        self.classify(location)
            .map(|loc| loc.storage_type())
            .unwrap_or(StorageType::Unknown)
    }

    /// Classify a location into a typed [`Location`].
    ///
    /// Fails with `ClassificationUnknown` instead of guessing.
    pub fn classify(&self, location: Option<&str>) -> StorageResult<Location> {
        let raw = match location.filter(|l| !l.is_empty()) {
            Some(raw) => raw.to_string(),
            None => self.app_directory(),
        };

        let classified = if is_content_uri(&raw) {
            Some(Location::external(raw.as_str()))
        } else {
            self.internal_path(&raw).and_then(|rel| Location::internal(&rel).ok())
        };

        match classified {
            Some(loc) => {
                tracing::debug!(location = %raw, storage = %loc.storage_type(), "classified");
                Ok(loc)
            }
            None => {
                tracing::debug!(location = %raw, "unclassifiable location");
                Err(StorageError::ClassificationUnknown(raw))
            }
        }
    }

    /// Sandbox-relative path of a `file://` URI or absolute path under the root.
    fn internal_path(&self, raw: &str) -> Option<String> {
        let path = if raw.starts_with("file:") {
            Url::parse(raw).ok()?.to_file_path().ok()?
        } else {
            let path = PathBuf::from(raw);
            if !path.is_absolute() {
                return None;
            }
            path
        };
        let normalized = lexical_normalize(&path)?;
        let rel = normalized.strip_prefix(&self.sandbox_root).ok()?;
        let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// Returns `None` if `..` climbs above the filesystem root.
fn lexical_normalize(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => result.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() || result.as_os_str().is_empty() {
                    return None;
                }
            }
            Component::Normal(s) => result.push(s),
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{MemoryPreferences, save_grant};
    use rstest::rstest;
    use storage_access_types::{AccessType, GrantedRoot};

    const ROOT: &str = "/data/user/0/app/files";

    fn classifier() -> PathClassifier {
        PathClassifier::new(ROOT, Arc::new(MemoryPreferences::new()))
    }

    #[rstest]
    #[case("content://com.android.externalstorage.documents/tree/primary%3ADocs", StorageType::External)]
    #[case("CONTENT://media/external/images/media/1", StorageType::External)]
    #[case("/data/user/0/app/files", StorageType::Internal)]
    #[case("/data/user/0/app/files/notes/a.txt", StorageType::Internal)]
    #[case("file:///data/user/0/app/files/notes", StorageType::Internal)]
    #[case("/data/user/0/app/files/a/../b", StorageType::Internal)]
    #[case("/data/user/0/app/files/../other", StorageType::Unknown)]
    #[case("/data/user/0/app/filesystem", StorageType::Unknown)]
    #[case("/sdcard/Download", StorageType::Unknown)]
    #[case("notes/a.txt", StorageType::Unknown)]
    #[case("https://example.com/a.txt", StorageType::Unknown)]
    #[case("content:///no-authority", StorageType::Unknown)]
    #[case("::not a location::", StorageType::Unknown)]
    fn test_storage_type(#[case] location: &str, #[case] expected: StorageType) {
        assert_eq!(classifier().storage_type(Some(location)), expected);
    }

    #[test]
    fn test_classify_internal_is_relative() {
        let loc = classifier()
            .classify(Some("/data/user/0/app/files/notes/./a.txt"))
            .unwrap();
        assert_eq!(loc, Location::Internal("notes/a.txt".into()));

        let root = classifier().classify(Some(ROOT)).unwrap();
        assert_eq!(root, Location::Internal(String::new()));
    }

    #[test]
    fn test_unknown_is_an_error() {
        let err = classifier().classify(Some("relative/path")).unwrap_err();
        assert_eq!(err, StorageError::ClassificationUnknown("relative/path".into()));
    }

    #[test]
    fn test_default_falls_back_to_sandbox_root() {
        let c = classifier();
        assert_eq!(c.app_directory(), ROOT);
        assert_eq!(c.storage_type(None), StorageType::Internal);
        assert_eq!(c.storage_type(Some("")), StorageType::Internal);
    }

    #[test]
    fn test_default_prefers_persisted_grant() {
        let prefs = Arc::new(MemoryPreferences::new());
        let uri = "content://com.android.externalstorage.documents/tree/primary%3ADocs";
        save_grant(
            prefs.as_ref(),
            &GrantedRoot {
                uri: uri.into(),
                access_type: AccessType::Directory,
            },
        )
        .unwrap();

        let c = PathClassifier::new(ROOT, prefs);
        assert_eq!(c.app_directory(), uri);
        assert_eq!(c.storage_type(None), StorageType::External);
        assert_eq!(c.classify(None).unwrap(), Location::External(uri.into()));
    }
}
