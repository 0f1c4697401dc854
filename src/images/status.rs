//! Per-size status projection and media URL building.

use std::collections::BTreeMap;

use mediamirror_db::models::Attachment;
use serde::{Deserialize, Serialize};

use super::error::SyncError;
use super::resolver::{Dimensions, SizeResolver};
use crate::config::{Provider, ResolvedConfig};

/// Status of every configured size, keyed and sorted by size name.
pub type StatusReport = BTreeMap<String, SizeStatus>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStatus {
    pub name: String,
    /// Public URL of the generated file, if the size exists.
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub can_generate: bool,
    /// `None` when the size was never generated.
    pub preset_mismatch: Option<bool>,
    pub preset_width: u32,
    pub preset_height: u32,
    /// Outcome of the generation attempt made by this request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub state: GenerationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl GenerationStatus {
    pub fn done(warnings: Vec<String>) -> Self {
        Self {
            state: GenerationState::Done,
            error_kind: None,
            error: None,
            warnings,
        }
    }

    pub fn skipped() -> Self {
        Self {
            state: GenerationState::Skipped,
            error_kind: None,
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn failed(error: &SyncError, warnings: Vec<String>) -> Self {
        Self {
            state: GenerationState::Failed,
            error_kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
            warnings,
        }
    }
}

/// Status of size `name` for `attachment`. `None` when the size is not configured.
pub fn size_status(
    attachment: &Attachment,
    resolver: &SizeResolver,
    urls: &UrlBuilder,
    name: &str,
) -> Option<SizeStatus> {
    let preset = resolver.preset(name)?;
    let original = Dimensions::new(
        attachment.original_width().unwrap_or(0),
        attachment.original_height().unwrap_or(0),
    );
    let generated = attachment.generated(name);

    Some(SizeStatus {
        name: name.to_string(),
        url: attachment.size_key(name).map(|key| urls.url_for(&key)),
        width: generated.as_ref().map(|g| g.width),
        height: generated.as_ref().map(|g| g.height),
        can_generate: resolver.can_generate(original, name),
        preset_mismatch: resolver.is_mismatched(generated.as_ref(), name),
        preset_width: preset.width,
        preset_height: preset.height,
        generation: None,
    })
}

/// Status of every configured size. Pure; safe to call at any time.
pub fn build_report(attachment: &Attachment, resolver: &SizeResolver, urls: &UrlBuilder) -> StatusReport {
    resolver
        .presets()
        .iter()
        .filter_map(|preset| {
            size_status(attachment, resolver, urls, &preset.name)
                .map(|status| (preset.name.clone(), status))
        })
        .collect()
}

/// Turns storage keys into public URLs for the current storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBuilder {
    base: String,
    escape_plus: bool,
}

impl UrlBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            escape_plus: false,
        }
    }

    /// S3 decodes `+` in object URLs as a space.
    pub fn escaping_plus(mut self) -> Self {
        self.escape_plus = true;
        self
    }

    /// Base URL from settings: the CDN, then the provider's bucket URL, then
    /// the local uploads URL when there is no usable remote.
    pub fn from_config(resolved: &ResolvedConfig) -> Self {
        let config = resolved.config();
        let scheme = &config.url_scheme;
        let provider = if config.enabled {
            resolved.provider()
        } else {
            Provider::None
        };

        let (bucket, prefix) = match provider {
            Provider::AwsS3 => (&config.storage.s3.bucket, &config.storage.s3.prefix),
            Provider::Gcs => (&config.storage.gcs.bucket, &config.storage.gcs.prefix),
            Provider::None => return Self::new(config.local.base_url.clone()),
        };

        let builder = if config.cdn.enabled && !config.cdn.domain.trim().is_empty() {
            Self::new(with_prefix(
                format!("{}://{}", scheme, config.cdn.domain.trim().trim_matches('/')),
                &config.cdn.prefix,
            ))
        } else if bucket.trim().is_empty() {
            return Self::new(config.local.base_url.clone());
        } else {
            let host = match provider {
                Provider::Gcs => "storage.googleapis.com",
                _ => "s3.amazonaws.com",
            };
            Self::new(with_prefix(
                format!("{}://{}/{}", scheme, host, bucket.trim()),
                prefix,
            ))
        };

        if provider == Provider::AwsS3 {
            builder.escaping_plus()
        } else {
            builder
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url_for(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if self.escape_plus {
            format!("{}/{}", self.base, key.replace('+', "%2B"))
        } else {
            format!("{}/{}", self.base, key)
        }
    }
}

fn with_prefix(base: String, prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        base
    } else {
        format!("{}/{}", base, prefix)
    }
}
