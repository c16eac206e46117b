//! Pure data types for storage-access — locations, directory entries, errors.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It
//! exists so bridge layers can speak the storage contract without pulling
//! in the kernel's runtime and provider machinery.

pub mod access;
pub mod dir_entry;
pub mod error;
pub mod location;
pub mod outcome;

// Flat re-exports for convenience
pub use access::*;
pub use dir_entry::*;
pub use error::*;
pub use location::*;
pub use outcome::*;
