//! Catalog models.
//!
//! An [`Attachment`] is a single aggregate with two serialisation views of its
//! generated sizes:
//!
//! - [`NativeMetadata`]: the catalog's own record (`file`, `width`, `height`
//!   and a `sizes` map), stored in the `metadata` column.
//! - [`ShadowMetadata`]: the mirror's record of which sizes it has handled,
//!   stored in the `shadow_metadata` column.
//!
//! Both views are only ever changed together through the aggregate's methods.

use std::collections::BTreeMap;

use mediamirror_common::paths::{join_key, key_dirname};
use mediamirror_common::AttachmentId;
use serde::{Deserialize, Serialize};

/// A concrete derived image recorded against a preset name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSize {
    /// Preset name this file was generated for.
    pub name: String,
    /// File name, relative to the directory of the original.
    pub file: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One entry of the native `sizes` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSize {
    pub file: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Native size metadata for an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub sizes: BTreeMap<String, NativeSize>,
}

/// Dimensions of a size the mirror has handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowSize {
    pub width: u32,
    pub height: u32,
}

/// The mirror's own record of generated and pushed sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowMetadata {
    #[serde(default)]
    pub sizes: BTreeMap<String, ShadowSize>,
}

/// A media attachment as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    /// Storage key of the original file, e.g. `2024/05/cat.jpg`.
    pub file: String,
    pub mime_type: String,
    pub title: Option<String>,
    pub metadata: NativeMetadata,
    pub shadow: ShadowMetadata,
    pub created_at: String,
    pub updated_at: String,
}

impl Attachment {
    /// Whether the attachment's MIME type is an image type.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn original_width(&self) -> Option<u32> {
        self.metadata.width
    }

    pub fn original_height(&self) -> Option<u32> {
        self.metadata.height
    }

    /// The generated size recorded for `name`, if any.
    pub fn generated(&self, name: &str) -> Option<GeneratedSize> {
        self.metadata.sizes.get(name).map(|size| GeneratedSize {
            name: name.to_string(),
            file: size.file.clone(),
            width: size.width,
            height: size.height,
            mime_type: size.mime_type.clone(),
        })
    }

    /// All generated sizes, ordered by name.
    pub fn generated_sizes(&self) -> Vec<GeneratedSize> {
        self.metadata
            .sizes
            .keys()
            .filter_map(|name| self.generated(name))
            .collect()
    }

    /// Storage key of a generated size, next to the original.
    pub fn size_key(&self, name: &str) -> Option<String> {
        self.metadata
            .sizes
            .get(name)
            .map(|size| join_key(key_dirname(&self.file), &size.file))
    }

    /// Storage keys of the original and every generated size.
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys = vec![self.file.clone()];
        for name in self.metadata.sizes.keys() {
            if let Some(key) = self.size_key(name) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Record a freshly generated size in both metadata views.
    pub fn record_generated(&mut self, size: &GeneratedSize) {
        self.metadata.sizes.insert(
            size.name.clone(),
            NativeSize {
                file: size.file.clone(),
                width: size.width,
                height: size.height,
                mime_type: size.mime_type.clone(),
            },
        );
        self.record_mirrored(&size.name, size.width, size.height);
    }

    /// Record only in the shadow view that a size has been mirrored.
    pub fn record_mirrored(&mut self, name: &str, width: u32, height: u32) {
        self.shadow
            .sizes
            .insert(name.to_string(), ShadowSize { width, height });
    }

    /// Drop the shadow record, e.g. before re-pushing every file.
    pub fn reset_shadow(&mut self) {
        self.shadow = ShadowMetadata::default();
    }
}

/// Data for inserting a new attachment.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub file: String,
    pub mime_type: String,
    pub title: Option<String>,
    pub metadata: NativeMetadata,
}

impl NewAttachment {
    /// An image attachment with known original dimensions and no sizes yet.
    pub fn image(file: &str, mime_type: &str, width: u32, height: u32) -> Self {
        Self {
            file: file.to_string(),
            mime_type: mime_type.to_string(),
            title: None,
            metadata: NativeMetadata {
                file: Some(file.to_string()),
                width: Some(width),
                height: Some(height),
                sizes: BTreeMap::new(),
            },
        }
    }

    /// A non-image attachment; only the file is recorded.
    pub fn file(file: &str, mime_type: &str) -> Self {
        Self {
            file: file.to_string(),
            mime_type: mime_type.to_string(),
            title: None,
            metadata: NativeMetadata {
                file: Some(file.to_string()),
                ..NativeMetadata::default()
            },
        }
    }
}
