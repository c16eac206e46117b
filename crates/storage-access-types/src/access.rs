//! Permission grant records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Kind of access the app asks the user for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    /// Broad storage access (all-files permission).
    #[default]
    Full,
    /// A single user-picked directory tree.
    Directory,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Full => "full",
            AccessType::Directory => "directory",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(AccessType::Full),
            "directory" => Ok(AccessType::Directory),
            other => Err(StorageError::Unsupported(format!(
                "invalid access type: {other}"
            ))),
        }
    }
}

/// A persisted grant: the tree URI the user granted and how it was granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedRoot {
    pub uri: String,
    pub access_type: AccessType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_type_round_trip_through_strings() {
        assert_eq!("full".parse::<AccessType>().unwrap(), AccessType::Full);
        assert_eq!("directory".parse::<AccessType>().unwrap(), AccessType::Directory);
        assert_eq!(AccessType::Directory.to_string(), "directory");
        assert_eq!(AccessType::default(), AccessType::Full);
    }

    #[test]
    fn test_invalid_access_type() {
        let err = "everything".parse::<AccessType>().unwrap_err();
        assert!(matches!(err, StorageError::Unsupported(_)));
        assert!(err.to_string().contains("everything"));
    }
}
