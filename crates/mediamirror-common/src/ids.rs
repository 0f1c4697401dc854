//! Typed ID wrappers.
//!
//! Attachments are addressed by the integer row ID the catalog assigns, so the
//! wrapper is around `i64` rather than a UUID.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier for a media attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(i64);

impl AttachmentId {
    /// Raw integer value as stored in the catalog.
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for AttachmentId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<AttachmentId> for i64 {
    fn from(id: AttachmentId) -> Self {
        id.0
    }
}

impl FromStr for AttachmentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_id_roundtrip() {
        let id = AttachmentId::from(17);
        assert_eq!(i64::from(id), 17);
        assert_eq!(id.get(), 17);
        assert_eq!(id.to_string(), "17");
    }

    #[test]
    fn test_attachment_id_parse() {
        assert_eq!("42".parse::<AttachmentId>().unwrap(), AttachmentId::from(42));
        assert_eq!(" 7 ".parse::<AttachmentId>().unwrap(), AttachmentId::from(7));
        assert!("abc".parse::<AttachmentId>().is_err());
    }

    #[test]
    fn test_attachment_id_serde_transparent() {
        let json = serde_json::to_string(&AttachmentId::from(5)).unwrap();
        assert_eq!(json, "5");
        let id: AttachmentId = serde_json::from_str("9").unwrap();
        assert_eq!(id, AttachmentId::from(9));
    }
}
