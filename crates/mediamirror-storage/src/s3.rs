//! Amazon S3 blob store.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use bytes::Bytes;
use mediamirror_common::paths::{join_key, mime_type_for, normalize_key};

use crate::error::{Result, StorageError};
use crate::traits::BlobStore;

/// Connection settings for the S3 adapter.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub key: String,
    pub secret: String,
    pub region: String,
    pub bucket: String,
    /// Key prefix inside the bucket, without surrounding slashes.
    pub prefix: String,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<String>,
    /// Upload objects with a `public-read` ACL.
    pub public: bool,
}

impl S3Settings {
    /// Names of required settings that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.key.trim().is_empty() {
            missing.push("storage.s3.key");
        }
        if self.secret.trim().is_empty() {
            missing.push("storage.s3.secret");
        }
        if self.region.trim().is_empty() {
            missing.push("storage.s3.region");
        }
        if self.bucket.trim().is_empty() {
            missing.push("storage.s3.bucket");
        }
        missing
    }
}

/// S3 store addressing objects as `{prefix}/{key}` in one bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: String,
    public: bool,
}

impl S3Store {
    /// Build a client with explicit credentials from the settings.
    pub async fn connect(settings: &S3Settings) -> Result<Self> {
        let missing = settings.missing_fields();
        if !missing.is_empty() {
            return Err(StorageError::ProviderMisconfigured(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let credentials = Credentials::new(
            &settings.key,
            &settings.secret,
            None,
            None,
            "mediamirror",
        );

        let shared_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if let Some(endpoint) = &settings.endpoint {
            if !endpoint.trim().is_empty() {
                builder = builder.endpoint_url(endpoint).force_path_style(true);
            }
        }

        tracing::info!(bucket = %settings.bucket, region = %settings.region, "S3 store initialized");

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            prefix: settings.prefix.trim_matches('/').to_string(),
            public: settings.public,
        })
    }

    fn object_key(&self, key: &str) -> Result<String> {
        Ok(join_key(&self.prefix, &normalize_key(key)?))
    }
}

#[async_trait]
impl BlobStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let object_key = self.object_key(key)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(StorageError::backend("s3", format!("head {}: {}", object_key, e)))
                }
            }
        }
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        let object_key = self.object_key(key)?;
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                return Err(StorageError::backend("s3", format!("get {}: {}", object_key, e)));
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::backend("s3", format!("read body {}: {}", object_key, e)))?;

        Ok(body.into_bytes())
    }

    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let object_key = self.object_key(key)?;
        let size = data.len();
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(mime_type_for(Path::new(key)))
            .body(ByteStream::from(data));

        if self.public {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", format!("put {}: {}", object_key, e)))?;

        tracing::debug!(key = %object_key, size, "Uploaded to S3");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let object_key = self.object_key(key)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| StorageError::backend("s3", format!("delete {}: {}", object_key, e)))?;
        Ok(())
    }
}
