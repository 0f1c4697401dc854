pub mod persist;
pub mod resolve;
mod types;

pub use resolve::{env_var_name, ResolvedConfig, SettingView, ENV_PREFIX};
pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Config file locations searched when `--config` is not given, in order.
pub const DEFAULT_PATHS: [&str; 3] = [
    "./mediamirror.toml",
    "~/.config/mediamirror/config.toml",
    "/etc/mediamirror/config.toml",
];

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if !config.server.api_base.starts_with('/') {
        anyhow::bail!(
            "server.api_base must start with '/': {:?}",
            config.server.api_base
        );
    }

    if !matches!(config.url_scheme.as_str(), "http" | "https") {
        anyhow::bail!("url_scheme must be 'http' or 'https', got {:?}", config.url_scheme);
    }

    if !matches!(config.storage.visibility.as_str(), "public" | "private") {
        anyhow::bail!(
            "storage.visibility must be 'public' or 'private', got {:?}",
            config.storage.visibility
        );
    }

    if Provider::parse(&config.storage.provider).is_none() {
        anyhow::bail!(
            "Unknown storage.provider {:?} (expected 'aws_s3', 'gcs' or empty)",
            config.storage.provider
        );
    }

    let mut seen = HashSet::new();
    for preset in &config.presets {
        if preset.name.trim().is_empty() {
            anyhow::bail!("Size preset names cannot be empty");
        }
        if !seen.insert(preset.name.as_str()) {
            anyhow::bail!("Duplicate size preset '{}'", preset.name);
        }
        if preset.width == 0 && preset.height == 0 {
            tracing::warn!("Size preset '{}' has no width or height and will never generate", preset.name);
        }
    }

    if !config.local.base_dir.exists() {
        tracing::warn!("Uploads directory does not exist yet: {:?}", config.local.base_dir);
    }

    Ok(())
}
