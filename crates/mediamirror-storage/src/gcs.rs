//! Google Cloud Storage blob store.
//!
//! Talks to the XML API through V4 signed URLs generated locally from a
//! service-account key, so no OAuth token exchange is needed.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mediamirror_common::paths::{join_key, mime_type_for, normalize_key};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method, StatusCode};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};

use crate::error::{Result, StorageError};
use crate::traits::BlobStore;

const GCS_HOST: &str = "storage.googleapis.com";

/// Characters that must be percent-encoded in the path component
const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Connection settings for the GCS adapter.
#[derive(Debug, Clone, Default)]
pub struct GcsSettings {
    pub project_id: String,
    pub bucket: String,
    pub prefix: String,
    /// Service-account JSON, inline or as a path to the key file.
    pub auth_json: String,
    /// Lifetime of each signed request URL.
    pub signed_url_expiration: Duration,
    /// Upload objects with a `public-read` ACL.
    pub public: bool,
}

impl GcsSettings {
    /// Names of required settings that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bucket.trim().is_empty() {
            missing.push("storage.gcs.bucket");
        }
        if self.auth_json.trim().is_empty() {
            missing.push("storage.gcs.auth_json");
        }
        missing
    }

    fn service_account_json(&self) -> Result<String> {
        let raw = self.auth_json.trim();
        if raw.starts_with('{') {
            return Ok(raw.to_string());
        }
        std::fs::read_to_string(raw).map_err(|e| {
            StorageError::ProviderMisconfigured(format!(
                "cannot read GCS service account file {}: {}",
                raw, e
            ))
        })
    }
}

#[derive(serde::Deserialize)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
}

/// GCS store addressing objects as `{prefix}/{key}` in one bucket.
pub struct GcsStore {
    client_email: String,
    private_key: RsaPrivateKey,
    bucket: String,
    prefix: String,
    expires_in: Duration,
    public: bool,
    http_client: Client,
}

impl GcsStore {
    /// Create a store from settings, parsing the service-account key.
    pub fn from_settings(settings: &GcsSettings) -> Result<Self> {
        let missing = settings.missing_fields();
        if !missing.is_empty() {
            return Err(StorageError::ProviderMisconfigured(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let sa: ServiceAccount = serde_json::from_str(&settings.service_account_json()?)
            .map_err(|e| {
                StorageError::ProviderMisconfigured(format!("invalid service account JSON: {}", e))
            })?;

        let private_key = RsaPrivateKey::from_pkcs8_pem(&sa.private_key).map_err(|e| {
            StorageError::ProviderMisconfigured(format!(
                "failed to parse service account private key: {}",
                e
            ))
        })?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| StorageError::backend("gcs", format!("failed to build HTTP client: {}", e)))?;

        let expires_in = if settings.signed_url_expiration.is_zero() {
            Duration::from_secs(300)
        } else {
            settings.signed_url_expiration
        };

        tracing::info!(bucket = %settings.bucket, project = %settings.project_id, "GCS store initialized");

        Ok(Self {
            client_email: sa.client_email,
            private_key,
            bucket: settings.bucket.clone(),
            prefix: settings.prefix.trim_matches('/').to_string(),
            expires_in,
            public: settings.public,
            http_client,
        })
    }

    fn object_path(&self, key: &str) -> Result<String> {
        Ok(join_key(&self.prefix, &normalize_key(key)?))
    }

    /// Build a V4 signed URL for `method` on `object_path`.
    ///
    /// `extra_headers` must be lowercase names; they become signed headers
    /// and must be sent verbatim with the request.
    pub fn sign_url(
        &self,
        method: &str,
        object_path: &str,
        extra_headers: &[(&str, &str)],
        now: DateTime<Utc>,
    ) -> Result<String> {
        let datestamp = now.format("%Y%m%d").to_string();
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();

        let credential_scope = format!("{datestamp}/auto/storage/goog4_request");
        let credential = format!("{}/{}", self.client_email, credential_scope);

        let encoded_object = utf8_percent_encode(object_path, PATH_SET).to_string();
        let canonical_uri = format!("/{}/{}", self.bucket, encoded_object.trim_start_matches('/'));

        let mut headers: Vec<(String, String)> = vec![("host".to_string(), GCS_HOST.to_string())];
        headers.extend(
            extra_headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.trim().to_string())),
        );
        headers.sort();

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let mut query_items = vec![
            ("X-Goog-Algorithm", "GOOG4-RSA-SHA256".to_string()),
            ("X-Goog-Credential", urlencoding::encode(&credential).into_owned()),
            ("X-Goog-Date", timestamp.clone()),
            ("X-Goog-Expires", self.expires_in.as_secs().to_string()),
            ("X-Goog-SignedHeaders", urlencoding::encode(&signed_headers).into_owned()),
        ];
        query_items.sort_by(|a, b| a.0.cmp(b.0));
        let canonical_query = query_items
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\nUNSIGNED-PAYLOAD"
        );
        let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));

        let string_to_sign =
            format!("GOOG4-RSA-SHA256\n{timestamp}\n{credential_scope}\n{canonical_hash}");

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.sign(string_to_sign.as_bytes()).to_bytes();

        Ok(format!(
            "https://{GCS_HOST}{canonical_uri}?{canonical_query}&X-Goog-Signature={}",
            hex::encode(signature)
        ))
    }

    async fn send(
        &self,
        method: Method,
        object_path: &str,
        headers: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<reqwest::Response> {
        let url = self.sign_url(method.as_str(), object_path, headers, Utc::now())?;
        let mut request = self.http_client.request(method, &url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        request
            .send()
            .await
            .map_err(|e| StorageError::backend("gcs", format!("{}: {}", object_path, e)))
    }
}

async fn unexpected_status(op: &str, object_path: &str, response: reqwest::Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    StorageError::backend(
        "gcs",
        format!("{} {} failed with status {}: {}", op, object_path, status, body),
    )
}

#[async_trait]
impl BlobStore for GcsStore {
    fn name(&self) -> &'static str {
        "gcs"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let object_path = self.object_path(key)?;
        let response = self.send(Method::HEAD, &object_path, &[], None).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(unexpected_status("head", &object_path, response).await),
        }
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        let object_path = self.object_path(key)?;
        let response = self.send(Method::GET, &object_path, &[], None).await?;
        match response.status() {
            s if s.is_success() => response.bytes().await.map_err(|e| {
                StorageError::backend("gcs", format!("read body {}: {}", object_path, e))
            }),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            _ => Err(unexpected_status("get", &object_path, response).await),
        }
    }

    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let object_path = self.object_path(key)?;
        let content_type = mime_type_for(Path::new(key));
        let size = data.len();

        let mut headers = vec![("content-type", content_type)];
        if self.public {
            headers.push(("x-goog-acl", "public-read"));
        }

        let response = self
            .send(Method::PUT, &object_path, &headers, Some(data))
            .await?;
        if !response.status().is_success() {
            return Err(unexpected_status("put", &object_path, response).await);
        }

        tracing::debug!(object_path = %object_path, size, "Uploaded to GCS");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let object_path = self.object_path(key)?;
        let response = self.send(Method::DELETE, &object_path, &[], None).await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(unexpected_status("delete", &object_path, response).await),
        }
    }
}
