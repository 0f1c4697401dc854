use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Mirror files to the remote provider. When false the remote is disabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Scheme used for generated media URLs (`https` or `http`).
    #[serde(default = "default_url_scheme")]
    pub url_scheme: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cdn: CdnConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default = "default_presets")]
    pub presets: Vec<SizePreset>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            url_scheme: default_url_scheme(),
            server: ServerConfig::default(),
            local: LocalConfig::default(),
            storage: StorageConfig::default(),
            cdn: CdnConfig::default(),
            generation: GenerationConfig::default(),
            presets: default_presets(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Mount point of the media routes.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Upper bound for library-wide regeneration requests.
    #[serde(default = "default_long_request_timeout")]
    pub long_request_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_url_scheme() -> String {
    "https".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_api_base() -> String {
    "/api/media".to_string()
}
fn default_long_request_timeout() -> u64 {
    1800
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_base: default_api_base(),
            long_request_timeout_secs: default_long_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    /// Uploads directory holding originals and generated sizes.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Public URL of the uploads directory, used when no remote is configured.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_base_url() -> String {
    "http://localhost:8080/uploads".to_string()
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// `aws_s3`, `gcs`, or empty for none.
    #[serde(default)]
    pub provider: String,

    /// `public` or `private` object ACL on upload.
    #[serde(default = "default_visibility")]
    pub visibility: String,

    #[serde(default)]
    pub s3: S3Config,

    #[serde(default)]
    pub gcs: GcsConfig,
}

fn default_visibility() -> String {
    "public".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            visibility: default_visibility(),
            s3: S3Config::default(),
            gcs: GcsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct S3Config {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    /// Custom endpoint for S3-compatible services. Empty uses AWS.
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GcsConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    /// Service-account key, inline JSON or a path to the key file.
    #[serde(default)]
    pub auth_json: String,
    /// Lifetime of signed request URLs in seconds.
    #[serde(default = "default_signed_url_expiration")]
    pub signed_url_expiration: u64,
}

fn default_signed_url_expiration() -> u64 {
    300
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            bucket: String::new(),
            prefix: String::new(),
            auth_json: String::new(),
            signed_url_expiration: default_signed_url_expiration(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CdnConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Leave a size alone when it already matches its preset and its file exists.
    #[serde(default)]
    pub skip_matching: bool,
}

/// A named target size for derived images. `0` on an axis means unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SizePreset {
    pub name: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub crop: bool,
}

impl SizePreset {
    pub fn new(name: &str, width: u32, height: u32, crop: bool) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            crop,
        }
    }
}

pub fn default_presets() -> Vec<SizePreset> {
    vec![
        SizePreset::new("thumbnail", 150, 150, true),
        SizePreset::new("medium", 300, 300, false),
        SizePreset::new("medium_large", 768, 0, false),
        SizePreset::new("large", 1024, 1024, false),
    ]
}

/// Remote provider selected by `storage.provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    None,
    AwsS3,
    Gcs,
}

impl Provider {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" => Some(Self::None),
            "aws_s3" | "s3" => Some(Self::AwsS3),
            "gcs" | "google" => Some(Self::Gcs),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::AwsS3 => "aws_s3",
            Self::Gcs => "gcs",
        }
    }
}
