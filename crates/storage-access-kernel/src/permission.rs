//! Permission grant flow.
//!
//! The platform prompt itself is a black box behind [`PermissionPrompt`].
//! This module only decides what to ask for and persists what came back,
//! which is what the classifier's default root depends on.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use storage_access_types::{AccessType, GrantedRoot, StorageError, StorageResult};

use crate::prefs::{PreferenceStore, load_grant, save_grant};
use crate::uri::DocumentUri;

/// What the user did with a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// A document tree was granted.
    Tree(String),
    /// A runtime permission was granted; there is no URI to persist.
    Granted,
    /// Dismissed or denied.
    Cancelled,
}

/// Platform side of the grant flow.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    /// Ask for the given kind of access.
    async fn request(&self, access_type: AccessType) -> StorageResult<GrantOutcome>;

    /// Let the user pick a directory tree.
    async fn pick_directory(&self) -> StorageResult<GrantOutcome>;

    /// Whether the runtime permission for `access_type` is currently held.
    async fn runtime_permission_granted(&self, access_type: AccessType) -> bool;
}

/// Prompt for hosts without a permission UI.
///
/// Requests are cancelled (nobody can answer them) and runtime checks pass,
/// since a desktop host has no storage permission model.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPrompt;

#[async_trait]
impl PermissionPrompt for HeadlessPrompt {
    async fn request(&self, _access_type: AccessType) -> StorageResult<GrantOutcome> {
        Ok(GrantOutcome::Cancelled)
    }

    async fn pick_directory(&self) -> StorageResult<GrantOutcome> {
        Ok(GrantOutcome::Cancelled)
    }

    async fn runtime_permission_granted(&self, _access_type: AccessType) -> bool {
        true
    }
}

/// Drives the prompt and persists grants.
pub struct PermissionCoordinator {
    prompt: Arc<dyn PermissionPrompt>,
    prefs: Arc<dyn PreferenceStore>,
    access_type: RwLock<AccessType>,
}

impl PermissionCoordinator {
    pub fn new(prompt: Arc<dyn PermissionPrompt>, prefs: Arc<dyn PreferenceStore>) -> Self {
        Self {
            prompt,
            prefs,
            access_type: RwLock::new(AccessType::default()),
        }
    }

    /// Select what the next `request_permission` asks for.
    pub fn set_permission_type(&self, access_type: AccessType) {
        if let Ok(mut current) = self.access_type.write() {
            *current = access_type;
        }
    }

    pub fn permission_type(&self) -> AccessType {
        self.access_type.read().map(|t| *t).unwrap_or_default()
    }

    /// Ask the user for access of the current type.
    ///
    /// Returns the granted tree URI, or `None` for a plain runtime grant.
    pub async fn request_permission(&self) -> StorageResult<Option<String>> {
        let access_type = self.permission_type();
        match self.prompt.request(access_type).await? {
            GrantOutcome::Tree(uri) => self.record_grant(&uri, access_type).map(Some),
            GrantOutcome::Granted => {
                tracing::info!(%access_type, "runtime permission granted");
                Ok(None)
            }
            GrantOutcome::Cancelled => Err(cancelled()),
        }
    }

    /// Let the user pick a directory and persist it.
    pub async fn select_directory(&self) -> StorageResult<String> {
        match self.prompt.pick_directory().await? {
            GrantOutcome::Tree(uri) => self.record_grant(&uri, AccessType::Directory),
            GrantOutcome::Granted => Err(StorageError::PermissionDenied(
                "no directory was returned".into(),
            )),
            GrantOutcome::Cancelled => Err(cancelled()),
        }
    }

    /// True if a grant is persisted, else whatever the runtime check says.
    pub async fn check_permissions(&self) -> bool {
        if load_grant(self.prefs.as_ref()).is_some() {
            return true;
        }
        self.prompt
            .runtime_permission_granted(self.permission_type())
            .await
    }

    /// Persist a tree grant delivered by the platform.
    pub fn record_grant(&self, uri: &str, access_type: AccessType) -> StorageResult<String> {
        let parsed = DocumentUri::parse(uri)?;
        if !parsed.is_tree() {
            return Err(StorageError::Unsupported(format!(
                "a grant must be a tree URI: {uri}"
            )));
        }
        save_grant(
            self.prefs.as_ref(),
            &GrantedRoot {
                uri: uri.to_string(),
                access_type,
            },
        )?;
        tracing::info!(%uri, %access_type, "storage grant recorded");
        Ok(uri.to_string())
    }

    /// The persisted grant, if any.
    pub fn granted_root(&self) -> Option<GrantedRoot> {
        load_grant(self.prefs.as_ref())
    }
}

fn cancelled() -> StorageError {
    StorageError::PermissionDenied("operation cancelled".into())
}
