//! storage-access-kernel: one file and directory API over two kinds of
//! storage.
//!
//! This crate provides:
//!
//! - **Classifier**: decides whether a location string is app-private
//!   (internal) or a user-granted document URI (external)
//! - **Internal backend**: synchronous filesystem operations under a sandbox root
//! - **External backend**: document-tree operations through a [`DocumentProvider`],
//!   including concurrent recursive listing, image conversion and directory moves
//! - **Dispatcher**: routes every operation to its backend on a [`WorkerPool`]
//! - **Permissions**: the grant flow and its persisted preferences
//! - **Paths**: XDG-compliant path helpers

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod external;
pub mod internal;
pub mod paths;
pub mod permission;
pub mod pool;
pub mod prefs;
pub mod provider;
pub mod uri;

pub use classify::PathClassifier;
pub use config::StorageConfig;
pub use dispatch::Dispatcher;
pub use external::{
    CodecError, DecodedImage, ExternalBackend, ImageCodec, NOMEDIA, Rotation, UnavailableCodec,
};
pub use internal::InternalBackend;
pub use permission::{GrantOutcome, HeadlessPrompt, PermissionCoordinator, PermissionPrompt};
pub use pool::WorkerPool;
pub use prefs::{FilePreferences, MemoryPreferences, PreferenceStore};
pub use provider::{
    DocumentInfo, DocumentProvider, LocalProvider, MIME_TYPE_DIR, MemoryProvider,
};
pub use uri::DocumentUri;

// Data types, so embedders need only this crate
pub use storage_access_types::*;
