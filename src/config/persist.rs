//! Configuration persistence using toml_edit to preserve formatting and comments.

use super::resolve::{coerce, ResolvedConfig};
use super::{validate_config, Config};
use anyhow::{Context, Result};
use std::path::Path;
use toml_edit::{DocumentMut, Item, Table};

/// Set one scalar setting in the config file, keeping the rest of the file intact.
///
/// The key must name an existing scalar setting (`storage.s3.bucket`,
/// `server.port`, ...). Keys locked by an environment override are refused,
/// since the persisted value would be shadowed anyway. The file is created
/// if it does not exist. Nothing is written if the result would not validate.
pub fn set_value(path: &Path, key: &str, raw: &str, resolved: &ResolvedConfig) -> Result<Config> {
    if resolved.is_env_locked(key) {
        anyhow::bail!(
            "'{}' is set by the environment ({}) and cannot be changed here",
            key,
            super::env_var_name(key)
        );
    }

    let value = typed_value(key, raw)?;

    let content = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?
    } else {
        String::new()
    };

    let mut doc: DocumentMut = content
        .parse()
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    let mut segments: Vec<&str> = key.split('.').collect();
    let leaf = segments.pop().context("Empty settings key")?;

    let mut table: &mut Table = doc.as_table_mut();
    for segment in segments {
        let entry = table
            .entry(segment)
            .or_insert_with(|| Item::Table(Table::new()));
        table = entry
            .as_table_mut()
            .with_context(|| format!("'{}' in the config file is not a table", segment))?;
    }
    table[leaf] = toml_edit::value(value);

    let new_content = doc.to_string();
    let config: Config = toml::from_str(&new_content)
        .with_context(|| format!("Config would be unreadable after setting '{}'", key))?;
    validate_config(&config)
        .with_context(|| format!("Config would be invalid after setting '{}'", key))?;

    std::fs::write(path, new_content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(config)
}

/// Convert `raw` to the type the default config uses for `key`.
fn typed_value(key: &str, raw: &str) -> Result<toml_edit::Value> {
    let defaults = toml::Value::try_from(Config::default()).context("Failed to serialize settings")?;

    let mut current = &defaults;
    for segment in key.split('.') {
        current = current
            .get(segment)
            .with_context(|| format!("Unknown setting '{}'", key))?;
    }

    let typed = match current {
        toml::Value::Table(_) | toml::Value::Array(_) => {
            anyhow::bail!("'{}' is not a scalar setting", key)
        }
        scalar => coerce(scalar, raw).with_context(|| format!("Invalid value for '{}'", key))?,
    };

    Ok(match typed {
        toml::Value::Boolean(b) => b.into(),
        toml::Value::Integer(i) => i.into(),
        toml::Value::Float(f) => f.into(),
        other => other.as_str().unwrap_or_default().into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_preserves_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mediamirror.toml");
        std::fs::write(&path, "# my settings\nurl_scheme = \"http\"\n").unwrap();

        let resolved = ResolvedConfig::without_env(Config::default()).unwrap();
        let config = set_value(&path, "storage.s3.bucket", "media", &resolved).unwrap();
        assert_eq!(config.storage.s3.bucket, "media");
        assert_eq!(config.url_scheme, "http");

        let config = set_value(&path, "server.port", "9000", &resolved).unwrap();
        assert_eq!(config.server.port, 9000);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# my settings"));
        assert!(content.contains("bucket = \"media\""));
        assert!(content.contains("port = 9000"));
    }

    #[test]
    fn test_set_value_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.toml");
        let resolved = ResolvedConfig::without_env(Config::default()).unwrap();
        let config = set_value(&path, "generation.skip_matching", "true", &resolved).unwrap();
        assert!(config.generation.skip_matching);
    }

    #[test]
    fn test_set_value_refuses_env_locked_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mediamirror.toml");
        let resolved = ResolvedConfig::resolve(Config::default(), |name| {
            (name == "MEDIAMIRROR__STORAGE_S3_BUCKET").then(|| "env-bucket".to_string())
        })
        .unwrap();

        let err = set_value(&path, "storage.s3.bucket", "media", &resolved).unwrap_err();
        assert!(err.to_string().contains("MEDIAMIRROR__STORAGE_S3_BUCKET"));
        assert!(!path.exists());
    }

    #[test]
    fn test_set_value_rejects_unknown_and_mistyped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mediamirror.toml");
        let resolved = ResolvedConfig::without_env(Config::default()).unwrap();

        assert!(set_value(&path, "storage.s3.colour", "x", &resolved).is_err());
        assert!(set_value(&path, "server.port", "many", &resolved).is_err());
        assert!(set_value(&path, "presets", "x", &resolved).is_err());
    }

    #[test]
    fn test_set_value_rejects_invalid_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mediamirror.toml");
        let resolved = ResolvedConfig::without_env(Config::default()).unwrap();
        assert!(set_value(&path, "storage.visibility", "world", &resolved).is_err());
        assert!(!path.exists());
    }
}
