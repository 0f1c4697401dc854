//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory catalog, a temporary
//! uploads directory, an in-memory remote bucket and a full [`AppContext`].
//! Requests go through the router with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, RgbImage};
use tempfile::TempDir;
use tower::ServiceExt;

use mediamirror::config::{Config, ResolvedConfig, SizePreset};
use mediamirror::images::{MediaService, SizeResolver, UrlBuilder};
use mediamirror::server::{create_router, AppContext};
use mediamirror_common::AttachmentId;
use mediamirror_db::models::{Attachment, NewAttachment};
use mediamirror_db::pool::{get_conn, init_memory_pool, DbPool, PooledConnection};
use mediamirror_db::queries::attachments;
use mediamirror_storage::{LocalStore, MemoryStore, RemoteState, SyncingStore};

pub const MEDIA_BASE: &str = "https://media.example.com";

/// How the remote side of the harness behaves.
#[derive(Debug, Clone)]
pub enum Remote {
    Disabled,
    Memory,
    Misconfigured(String),
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub uploads: TempDir,
    pub remote: MemoryStore,
    mode: Remote,
    config: Config,
}

/// `thumbnail` 150×150 cropped and `medium` 300×300 fitted.
pub fn test_presets() -> Vec<SizePreset> {
    vec![
        SizePreset::new("thumbnail", 150, 150, true),
        SizePreset::new("medium", 300, 300, false),
    ]
}

impl TestHarness {
    /// Harness with the test presets and an in-memory remote.
    pub fn new() -> Self {
        Self::with_remote(Remote::Memory)
    }

    pub fn with_remote(mode: Remote) -> Self {
        let mut config = Config::default();
        config.presets = test_presets();
        Self::with_config(config, mode)
    }

    pub fn with_config(mut config: Config, mode: Remote) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let uploads = tempfile::tempdir().expect("failed to create uploads dir");
        config.local.base_dir = uploads.path().to_path_buf();

        let remote = MemoryStore::new();
        let ctx = build_context(&db, &uploads, &remote, &mode, &config);

        Self {
            ctx,
            db,
            uploads,
            remote,
            mode,
            config,
        }
    }

    /// Rebuild the context with different presets, keeping catalog and files.
    pub fn reconfigure(&mut self, presets: Vec<SizePreset>, skip_matching: bool) {
        self.config.presets = presets;
        self.config.generation.skip_matching = skip_matching;
        self.ctx = build_context(&self.db, &self.uploads, &self.remote, &self.mode, &self.config);
    }

    pub fn conn(&self) -> PooledConnection {
        get_conn(&self.db).expect("failed to get db connection")
    }

    pub fn local_path(&self, key: &str) -> PathBuf {
        self.uploads.path().join(key)
    }

    /// Write a PNG original to the uploads directory and catalog it.
    pub fn insert_image(&self, key: &str, width: u32, height: u32) -> AttachmentId {
        let path = self.local_path(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, png_bytes(width, height)).unwrap();
        self.catalog_image(key, width, height)
    }

    /// Catalog an image without writing any file.
    pub fn catalog_image(&self, key: &str, width: u32, height: u32) -> AttachmentId {
        let new = NewAttachment::image(key, "image/png", width, height);
        attachments::insert_attachment(&self.conn(), &new).unwrap().id
    }

    pub fn insert_file(&self, key: &str, mime_type: &str) -> AttachmentId {
        let new = NewAttachment::file(key, mime_type);
        attachments::insert_attachment(&self.conn(), &new).unwrap().id
    }

    pub fn attachment(&self, id: AttachmentId) -> Option<Attachment> {
        attachments::get_attachment(&self.conn(), id).unwrap()
    }

    /// Send a request through the router and parse the JSON response.
    pub async fn request(&self, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = create_router(self.ctx.clone())
            .oneshot(request)
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

fn build_context(
    db: &DbPool,
    uploads: &TempDir,
    remote: &MemoryStore,
    mode: &Remote,
    config: &Config,
) -> AppContext {
    let remote_state = match mode {
        Remote::Disabled => RemoteState::Disabled,
        Remote::Memory => RemoteState::Ready(Arc::new(remote.clone())),
        Remote::Misconfigured(reason) => RemoteState::Misconfigured(reason.clone()),
    };
    let store = SyncingStore::new(Arc::new(LocalStore::new(uploads.path())), remote_state);

    let media = MediaService::new(
        db.clone(),
        SizeResolver::new(config.presets.clone()),
        store,
        UrlBuilder::new(MEDIA_BASE),
    )
    .with_skip_matching(config.generation.skip_matching);

    let resolved = ResolvedConfig::without_env(config.clone()).expect("test config is valid");
    AppContext::new(resolved, None, media)
}

/// A PNG with a gradient so resized output is not trivially compressible.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}
