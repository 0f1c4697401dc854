//! Core enums shared by the storage and service layers.

use serde::{Deserialize, Serialize};

/// Which side of the mirror a file lives on.
///
/// A relative path is a location-independent key; presence is tracked per
/// location and nothing guarantees both sides agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    /// The uploads directory on local disk.
    Local,
    /// The configured object-storage provider.
    Remote,
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}
