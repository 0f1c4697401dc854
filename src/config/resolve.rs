//! Environment overrides layered over persisted settings.
//!
//! Every scalar setting can be overridden by an environment variable named
//! `MEDIAMIRROR__` followed by the dotted key with dots replaced by
//! underscores, upper-cased. `storage.s3.bucket` becomes
//! `MEDIAMIRROR__STORAGE_S3_BUCKET`. Empty values are ignored. A key whose
//! value came from the environment is "env-locked" and cannot be changed
//! through the persisted file.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mediamirror_storage::{GcsSettings, GcsStore, RemoteState, S3Settings, S3Store, StorageError};
use serde::Serialize;
use toml::Value;

use super::{validate_config, Config, Provider};

pub const ENV_PREFIX: &str = "MEDIAMIRROR__";

/// Keys whose values are never shown in reports.
const SECRET_KEYS: &[&str] = &["storage.s3.key", "storage.s3.secret", "storage.gcs.auth_json"];

/// Environment variable name for a dotted settings key.
///
/// ```
/// use mediamirror::config::env_var_name;
///
/// assert_eq!(env_var_name("storage.s3.bucket"), "MEDIAMIRROR__STORAGE_S3_BUCKET");
/// ```
pub fn env_var_name(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.replace('.', "_").to_uppercase())
}

/// The merged, read-only view of persisted settings and environment overrides.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    config: Config,
    env_locked: BTreeSet<String>,
}

/// One scalar setting as shown by `mediamirror config` and `GET /config`.
#[derive(Debug, Clone, Serialize)]
pub struct SettingView {
    pub key: String,
    pub value: String,
    pub env_var: String,
    pub env_locked: bool,
}

impl ResolvedConfig {
    /// Resolve against the process environment.
    pub fn from_env(persisted: Config) -> Result<Self> {
        Self::resolve(persisted, |name| std::env::var(name).ok())
    }

    /// Resolve with no overrides at all.
    pub fn without_env(persisted: Config) -> Result<Self> {
        Self::resolve(persisted, |_| None)
    }

    /// Resolve using `lookup` as the override source.
    pub fn resolve<F>(persisted: Config, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut tree = Value::try_from(&persisted).context("Failed to serialize settings")?;
        let mut env_locked = BTreeSet::new();

        if let Value::Table(table) = &mut tree {
            apply_overrides(table, "", &lookup, &mut env_locked)?;
        }

        let config: Config = tree
            .try_into()
            .context("Failed to apply environment overrides")?;
        validate_config(&config)?;

        if !env_locked.is_empty() {
            tracing::debug!(keys = ?env_locked, "Settings overridden from environment");
        }

        Ok(Self { config, env_locked })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply command-line listen address overrides. These take precedence
    /// over both the file and the environment.
    pub fn with_listen_address(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.config.server.host = host;
        }
        if let Some(port) = port {
            self.config.server.port = port;
        }
        self
    }

    /// Whether `key` was supplied by the environment.
    pub fn is_env_locked(&self, key: &str) -> bool {
        self.env_locked.contains(key)
    }

    pub fn env_locked_keys(&self) -> impl Iterator<Item = &str> {
        self.env_locked.iter().map(String::as_str)
    }

    /// The effective provider.
    ///
    /// An empty `storage.provider` falls back to `aws_s3` when the S3 key,
    /// secret, region and bucket are all set.
    pub fn provider(&self) -> Provider {
        match Provider::parse(&self.config.storage.provider).unwrap_or(Provider::None) {
            Provider::None if self.s3_settings().missing_fields().is_empty() => Provider::AwsS3,
            provider => provider,
        }
    }

    pub fn public_objects(&self) -> bool {
        self.config.storage.visibility == "public"
    }

    pub fn s3_settings(&self) -> S3Settings {
        let s3 = &self.config.storage.s3;
        S3Settings {
            key: s3.key.clone(),
            secret: s3.secret.clone(),
            region: s3.region.clone(),
            bucket: s3.bucket.clone(),
            prefix: s3.prefix.clone(),
            endpoint: Some(s3.endpoint.clone()).filter(|e| !e.trim().is_empty()),
            public: self.public_objects(),
        }
    }

    pub fn gcs_settings(&self) -> GcsSettings {
        let gcs = &self.config.storage.gcs;
        GcsSettings {
            project_id: gcs.project_id.clone(),
            bucket: gcs.bucket.clone(),
            prefix: gcs.prefix.clone(),
            auth_json: gcs.auth_json.clone(),
            signed_url_expiration: Duration::from_secs(gcs.signed_url_expiration),
            public: self.public_objects(),
        }
    }

    /// Build the remote side of the mirror.
    ///
    /// A selected provider that cannot be constructed yields
    /// [`RemoteState::Misconfigured`] rather than an error, so the service
    /// still starts and reports the problem per size.
    pub async fn remote_state(&self) -> RemoteState {
        if !self.config.enabled {
            tracing::info!("Mirroring disabled, remote storage not used");
            return RemoteState::Disabled;
        }

        let built: std::result::Result<RemoteState, StorageError> = match self.provider() {
            Provider::None => return RemoteState::Disabled,
            Provider::AwsS3 => S3Store::connect(&self.s3_settings())
                .await
                .map(|store| RemoteState::Ready(Arc::new(store))),
            Provider::Gcs => GcsStore::from_settings(&self.gcs_settings())
                .map(|store| RemoteState::Ready(Arc::new(store))),
        };

        match built {
            Ok(state) => state,
            Err(e) => {
                let reason = match e {
                    StorageError::ProviderMisconfigured(reason) => reason,
                    other => other.to_string(),
                };
                tracing::warn!(provider = self.provider().as_str(), %reason, "Remote storage misconfigured");
                RemoteState::Misconfigured(reason)
            }
        }
    }

    /// Every scalar setting with its provenance. Secrets are redacted.
    pub fn settings_report(&self) -> Result<Vec<SettingView>> {
        let tree = Value::try_from(&self.config).context("Failed to serialize settings")?;
        let mut views = Vec::new();
        if let Value::Table(table) = &tree {
            collect_leaves(table, "", &mut |key, value| {
                let shown = match value {
                    Value::String(s) if SECRET_KEYS.contains(&key) && !s.is_empty() => {
                        "********".to_string()
                    }
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                views.push(SettingView {
                    key: key.to_string(),
                    value: shown,
                    env_var: env_var_name(key),
                    env_locked: self.is_env_locked(key),
                });
            });
        }
        views.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(views)
    }
}

fn apply_overrides<F>(
    table: &mut toml::Table,
    prefix: &str,
    lookup: &F,
    locked: &mut BTreeSet<String>,
) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for (name, value) in table.iter_mut() {
        let key = join(prefix, name);
        match value {
            Value::Table(inner) => apply_overrides(inner, &key, lookup, locked)?,
            // Presets are only configurable in the file
            Value::Array(_) => {}
            leaf => {
                let var = env_var_name(&key);
                let Some(raw) = lookup(&var) else { continue };
                if raw.trim().is_empty() {
                    continue;
                }
                *leaf = coerce(leaf, &raw).with_context(|| format!("Invalid value in {}", var))?;
                locked.insert(key);
            }
        }
    }
    Ok(())
}

fn collect_leaves<F>(table: &toml::Table, prefix: &str, visit: &mut F)
where
    F: FnMut(&str, &Value),
{
    for (name, value) in table {
        let key = join(prefix, name);
        match value {
            Value::Table(inner) => collect_leaves(inner, &key, visit),
            Value::Array(_) => {}
            leaf => visit(&key, leaf),
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Parse `raw` into a value of the same TOML type as `current`.
pub(crate) fn coerce(current: &Value, raw: &str) -> Result<Value> {
    let raw = raw.trim();
    Ok(match current {
        Value::Boolean(_) => Value::Boolean(parse_bool(raw)?),
        Value::Integer(_) => Value::Integer(
            raw.parse()
                .with_context(|| format!("expected an integer, got {:?}", raw))?,
        ),
        Value::Float(_) => Value::Float(
            raw.parse()
                .with_context(|| format!("expected a number, got {:?}", raw))?,
        ),
        _ => Value::String(raw.to_string()),
    })
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("expected a boolean, got {:?}", raw),
    }
}
