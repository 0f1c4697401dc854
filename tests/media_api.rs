//! HTTP API integration tests for the media routes.
//!
//! Every test runs against a fresh [`TestHarness`]: in-memory catalog,
//! temporary uploads directory and an in-memory remote bucket.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use bytes::Bytes;
use common::{png_bytes, test_presets, Remote, TestHarness, MEDIA_BASE};
use mediamirror::config::{Config, SizePreset};
use mediamirror_common::AttachmentId;
use mediamirror_storage::BlobStore;

const ORIGINAL: &str = "2024/05/photo.png";

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_200() {
    let h = TestHarness::new();
    let (status, _) = h.request("GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_all_produces_every_size() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 2000, 1500);

    let (status, json) = h
        .request("POST", &format!("/api/media/{id}/generate-all"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let thumb = &json["thumbnail"];
    assert_eq!(thumb["can_generate"], true);
    assert_eq!(thumb["width"], 150);
    assert_eq!(thumb["height"], 150);
    assert_eq!(thumb["preset_mismatch"], false);
    assert_eq!(thumb["url"], format!("{MEDIA_BASE}/2024/05/photo-150x150.png"));
    assert_eq!(thumb["generation"]["state"], "done");

    let medium = &json["medium"];
    assert_eq!(medium["can_generate"], true);
    assert_eq!(medium["width"], 300);
    assert_eq!(medium["height"], 225);
    assert_eq!(medium["preset_mismatch"], false);
    assert_eq!(medium["url"], format!("{MEDIA_BASE}/2024/05/photo-300x225.png"));

    // Files exist in both locations
    assert!(h.local_path("2024/05/photo-150x150.png").exists());
    assert!(h.local_path("2024/05/photo-300x225.png").exists());
    let remote_keys = h.remote.keys();
    assert!(remote_keys.contains(&"2024/05/photo-150x150.png".to_string()));
    assert!(remote_keys.contains(&"2024/05/photo-300x225.png".to_string()));

    // The generated file really has the recorded dimensions
    let thumb_img = image::open(h.local_path("2024/05/photo-150x150.png")).unwrap();
    assert_eq!((thumb_img.width(), thumb_img.height()), (150, 150));

    // Both metadata views were updated
    let attachment = h.attachment(id).unwrap();
    assert_eq!(attachment.metadata.sizes["medium"].file, "photo-300x225.png");
    assert_eq!(attachment.shadow.sizes["medium"].height, 225);
}

#[tokio::test]
async fn regenerating_twice_gives_identical_reports() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);
    let uri = format!("/api/media/{id}/generate-all");

    let (_, first) = h.request("POST", &uri).await;
    let (status, second) = h.request("POST", &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(h.remote.len(), 2);
}

#[tokio::test]
async fn skip_matching_leaves_current_sizes_alone() {
    let mut h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);
    h.request("POST", &format!("/api/media/{id}/generate-all"))
        .await;

    // Overwrite the thumbnail so a rewrite would be visible
    let thumb = h.local_path("2024/05/photo-150x150.png");
    std::fs::write(&thumb, b"marker").unwrap();

    h.reconfigure(test_presets(), true);
    let (status, json) = h
        .request("POST", &format!("/api/media/{id}/generate-all"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["thumbnail"]["generation"]["state"], "skipped");
    assert_eq!(json["medium"]["generation"]["state"], "skipped");
    assert_eq!(std::fs::read(&thumb).unwrap(), b"marker");
}

#[tokio::test]
async fn changed_preset_replaces_stale_file_everywhere() {
    let mut h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);
    h.request("POST", &format!("/api/media/{id}/generate-all"))
        .await;
    assert!(h.local_path("2024/05/photo-300x225.png").exists());

    h.reconfigure(
        vec![
            SizePreset::new("thumbnail", 150, 150, true),
            SizePreset::new("medium", 400, 400, false),
        ],
        false,
    );

    // The old size is reported as mismatched until regenerated
    let (_, status_json) = h.request("GET", &format!("/api/media/{id}/status")).await;
    assert_eq!(status_json["sizes"]["medium"]["preset_mismatch"], true);
    assert_eq!(status_json["sizes"]["thumbnail"]["preset_mismatch"], false);

    let (status, json) = h
        .request("POST", &format!("/api/media/{id}/generate/medium"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["width"], 400);
    assert_eq!(json["height"], 300);
    assert_eq!(json["preset_mismatch"], false);
    assert_eq!(json["generation"]["state"], "done");

    assert!(!h.local_path("2024/05/photo-300x225.png").exists());
    assert!(h.local_path("2024/05/photo-400x300.png").exists());
    assert!(h.local_path("2024/05/photo-150x150.png").exists());

    let remote_keys = h.remote.keys();
    assert!(!remote_keys.contains(&"2024/05/photo-300x225.png".to_string()));
    assert!(remote_keys.contains(&"2024/05/photo-400x300.png".to_string()));
}

#[tokio::test]
async fn stale_file_already_gone_is_not_a_warning() {
    let mut h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);
    h.request("POST", &format!("/api/media/{id}/generate-all"))
        .await;

    std::fs::remove_file(h.local_path("2024/05/photo-300x225.png")).unwrap();
    h.remote.delete("2024/05/photo-300x225.png").await.unwrap();

    h.reconfigure(
        vec![
            SizePreset::new("thumbnail", 150, 150, true),
            SizePreset::new("medium", 400, 400, false),
        ],
        false,
    );

    let (status, json) = h
        .request("POST", &format!("/api/media/{id}/generate/medium"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["generation"]["state"], "done");
    assert_eq!(json["generation"]["warnings"], serde_json::json!([]));
    assert!(h.local_path("2024/05/photo-400x300.png").exists());
}

#[tokio::test]
async fn status_before_generation_has_no_size_data() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);

    let (status, json) = h.request("GET", &format!("/api/media/{id}/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sizes"].as_object().unwrap().len(), 2);

    let thumb = &json["sizes"]["thumbnail"];
    assert!(thumb["url"].is_null());
    assert!(thumb["width"].is_null());
    assert!(thumb["preset_mismatch"].is_null());
    assert!(thumb.get("generation").is_none());
    assert_eq!(thumb["can_generate"], true);
    assert_eq!(thumb["preset_width"], 150);
    assert_eq!(thumb["preset_height"], 150);

    // Status is a pure read
    assert!(!h.local_path("2024/05/photo-150x150.png").exists());
    assert!(h.remote.is_empty());
}

#[tokio::test]
async fn single_size_status() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);

    let (status, json) = h
        .request("GET", &format!("/api/media/{id}/status/medium"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "medium");
    assert_eq!(json["preset_width"], 300);
}

#[tokio::test]
async fn small_original_is_left_untouched() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 100, 80);

    let (status, json) = h
        .request("POST", &format!("/api/media/{id}/generate-all"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["thumbnail"]["can_generate"], false);
    assert!(json["thumbnail"].get("generation").is_none());
    assert!(json["thumbnail"]["width"].is_null());

    // Asking for one size explicitly reports why nothing happened
    let (status, json) = h
        .request("POST", &format!("/api/media/{id}/generate/thumbnail"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["generation"]["state"], "failed");
    assert_eq!(json["generation"]["error_kind"], "generation_failed");
    assert!(h.remote.is_empty());
}

// ---------------------------------------------------------------------------
// Storage failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn misconfigured_remote_is_reported_per_size() {
    let h = TestHarness::with_remote(Remote::Misconfigured(
        "storage.s3.bucket is not set".to_string(),
    ));
    let id = h.insert_image(ORIGINAL, 800, 600);

    let (status, json) = h
        .request("POST", &format!("/api/media/{id}/generate-all"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let generation = &json["thumbnail"]["generation"];
    assert_eq!(generation["state"], "failed");
    assert_eq!(generation["error_kind"], "provider_misconfigured");
    assert!(generation["error"]
        .as_str()
        .unwrap()
        .contains("storage.s3.bucket is not set"));

    // The local copy and metadata were still written
    assert_eq!(json["thumbnail"]["width"], 150);
    assert!(h.local_path("2024/05/photo-150x150.png").exists());
}

#[tokio::test]
async fn missing_original_is_source_unavailable() {
    let h = TestHarness::new();
    let id = h.catalog_image(ORIGINAL, 800, 600);

    let (status, json) = h
        .request("POST", &format!("/api/media/{id}/generate/thumbnail"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["generation"]["state"], "failed");
    assert_eq!(json["generation"]["error_kind"], "source_unavailable");
    assert!(json["width"].is_null());
}

#[tokio::test]
async fn missing_original_without_remote_is_source_unavailable() {
    let h = TestHarness::with_remote(Remote::Disabled);
    let id = h.catalog_image(ORIGINAL, 800, 600);

    let (_, json) = h
        .request("POST", &format!("/api/media/{id}/generate/thumbnail"))
        .await;
    assert_eq!(json["generation"]["error_kind"], "source_unavailable");
}

#[tokio::test]
async fn original_is_pulled_from_remote() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);

    let local = h.local_path(ORIGINAL);
    let data = std::fs::read(&local).unwrap();
    h.remote.write(ORIGINAL, Bytes::from(data.clone())).await.unwrap();
    std::fs::remove_file(&local).unwrap();

    let (status, json) = h
        .request("POST", &format!("/api/media/{id}/generate/thumbnail"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["generation"]["state"], "done");
    assert_eq!(std::fs::read(&local).unwrap(), data);
}

#[tokio::test]
async fn failed_push_is_transfer_failed() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);
    h.remote.set_fail_writes(true);

    let (status, json) = h
        .request("POST", &format!("/api/media/{id}/generate/thumbnail"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["generation"]["state"], "failed");
    assert_eq!(json["generation"]["error_kind"], "transfer_failed");
}

#[tokio::test]
async fn disabled_remote_generates_locally_only() {
    let h = TestHarness::with_remote(Remote::Disabled);
    let id = h.insert_image(ORIGINAL, 800, 600);

    let (_, json) = h
        .request("POST", &format!("/api/media/{id}/generate-all"))
        .await;
    assert_eq!(json["thumbnail"]["generation"]["state"], "done");
    assert!(h.local_path("2024/05/photo-150x150.png").exists());
    assert!(h.remote.is_empty());
}

// ---------------------------------------------------------------------------
// Request errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_attachment_returns_404() {
    let h = TestHarness::new();

    let (status, json) = h.request("GET", "/api/media/999/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());

    let (status, _) = h.request("POST", "/api/media/999/generate-all").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_size_returns_404() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);

    let (status, _) = h
        .request("POST", &format!("/api/media/{id}/generate/huge"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h
        .request("GET", &format!("/api/media/{id}/status/huge"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_image_returns_400() {
    let h = TestHarness::new();
    let id = h.insert_file("2024/05/report.pdf", "application/pdf");

    let (status, _) = h
        .request("POST", &format!("/api/media/{id}/generate-all"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.request("GET", &format!("/api/media/{id}/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_id_returns_400() {
    let h = TestHarness::new();
    let (status, json) = h.request("GET", "/api/media/abc/status").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("abc"));
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_attachment_includes_sizes() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);

    let (status, json) = h.request("GET", &format!("/api/media/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id.get());
    assert_eq!(json["file"], ORIGINAL);
    assert_eq!(json["mime_type"], "image/png");
    assert!(json["sizes"]["thumbnail"].is_object());
}

#[tokio::test]
async fn list_attachments_newest_first() {
    let h = TestHarness::new();
    let first = h.insert_file("2024/05/a.pdf", "application/pdf");
    let second = h.insert_file("2024/05/b.pdf", "application/pdf");

    let (status, json) = h.request("GET", "/api/media").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = json["attachments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![second.get(), first.get()]);

    let (_, json) = h.request("GET", "/api/media?limit=1&offset=1").await;
    assert_eq!(json["attachments"].as_array().unwrap().len(), 1);
    assert_eq!(json["attachments"][0]["id"], first.get());
}

#[tokio::test]
async fn upload_stores_generates_and_mirrors() {
    let h = TestHarness::new();

    let request = Request::builder()
        .method("POST")
        .uri("/api/media/upload?filename=My%20Cat.png")
        .body(Body::from(png_bytes(400, 300)))
        .unwrap();
    let (status, json) = h.send(request).await;
    assert_eq!(status, StatusCode::CREATED);

    let file = json["attachment"]["file"].as_str().unwrap().to_string();
    assert!(file.ends_with("/My-Cat.png"), "unexpected key {file}");
    assert_eq!(json["attachment"]["mime_type"], "image/png");
    assert_eq!(json["sizes"]["thumbnail"]["generation"]["state"], "done");
    assert_eq!(json["sizes"]["medium"]["width"], 300);
    assert_eq!(json["sizes"]["medium"]["height"], 225);

    assert!(h.local_path(&file).exists());
    assert!(h.remote.keys().contains(&file));

    // Same name again gets a numbered key
    let request = Request::builder()
        .method("POST")
        .uri("/api/media/upload?filename=My%20Cat.png")
        .body(Body::from(png_bytes(400, 300)))
        .unwrap();
    let (status, json) = h.send(request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(json["attachment"]["file"]
        .as_str()
        .unwrap()
        .ends_with("/My-Cat-1.png"));
}

#[tokio::test]
async fn upload_rejects_unreadable_image() {
    let h = TestHarness::new();

    let request = Request::builder()
        .method("POST")
        .uri("/api/media/upload?filename=broken.png")
        .body(Body::from("not a png"))
        .unwrap();
    let (status, _) = h.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.remote.is_empty());
}

#[tokio::test]
async fn upload_shadow_lists_only_pushed_sizes() {
    let h = TestHarness::new();
    h.remote.set_fail_writes(true);

    let request = Request::builder()
        .method("POST")
        .uri("/api/media/upload?filename=cat.png")
        .body(Body::from(png_bytes(400, 300)))
        .unwrap();
    let (status, json) = h.send(request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["sizes"]["thumbnail"]["generation"]["error_kind"], "transfer_failed");

    let id = AttachmentId::from(json["attachment"]["id"].as_i64().unwrap());
    let attachment = h.attachment(id).unwrap();
    assert_eq!(attachment.metadata.sizes.len(), 2);
    assert!(attachment.shadow.sizes.is_empty());
    assert!(h.remote.is_empty());
}

#[tokio::test]
async fn upload_shadow_matches_mirrored_sizes() {
    let h = TestHarness::new();

    let request = Request::builder()
        .method("POST")
        .uri("/api/media/upload?filename=cat.png")
        .body(Body::from(png_bytes(400, 300)))
        .unwrap();
    let (_, json) = h.send(request).await;

    let id = AttachmentId::from(json["attachment"]["id"].as_i64().unwrap());
    let attachment = h.attachment(id).unwrap();
    assert_eq!(attachment.shadow.sizes.len(), 2);
    assert_eq!(attachment.shadow.sizes["medium"].width, 300);
    assert_eq!(attachment.shadow.sizes["medium"].height, 225);
    assert_eq!(h.remote.len(), 3);
}

#[tokio::test]
async fn sync_repushes_every_file() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);
    h.request("POST", &format!("/api/media/{id}/generate-all"))
        .await;

    h.remote.delete("2024/05/photo-150x150.png").await.unwrap();

    let (status, json) = h.request("POST", &format!("/api/media/{id}/sync")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["remote_enabled"], true);
    assert_eq!(json["pushed"].as_array().unwrap().len(), 3);
    assert!(json["failed"].as_array().unwrap().is_empty());
    assert_eq!(
        h.remote.keys(),
        vec![
            "2024/05/photo-150x150.png".to_string(),
            "2024/05/photo-300x225.png".to_string(),
            ORIGINAL.to_string(),
        ]
    );
}

#[tokio::test]
async fn sync_stops_when_original_cannot_be_pushed() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);
    h.request("POST", &format!("/api/media/{id}/generate-all"))
        .await;
    let shadow = h.attachment(id).unwrap().shadow;
    assert_eq!(shadow.sizes.len(), 2);

    h.remote.set_fail_writes(true);
    let (status, json) = h.request("POST", &format!("/api/media/{id}/sync")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["pushed"].as_array().unwrap().is_empty());

    let failed = json["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["path"], ORIGINAL);

    assert_eq!(h.attachment(id).unwrap().shadow, shadow);
}

#[tokio::test]
async fn sync_with_disabled_remote_pushes_nothing() {
    let h = TestHarness::with_remote(Remote::Disabled);
    let id = h.insert_image(ORIGINAL, 800, 600);

    let (status, json) = h.request("POST", &format!("/api/media/{id}/sync")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["remote_enabled"], false);
    assert!(json["pushed"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_files_everywhere() {
    let h = TestHarness::new();
    let id = h.insert_image(ORIGINAL, 800, 600);
    h.request("POST", &format!("/api/media/{id}/generate-all"))
        .await;
    h.request("POST", &format!("/api/media/{id}/sync")).await;
    assert_eq!(h.remote.len(), 3);

    let (status, json) = h.request("DELETE", &format!("/api/media/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["files"].as_array().unwrap().len(), 3);
    assert!(json["warnings"].as_array().unwrap().is_empty());

    assert!(!h.local_path(ORIGINAL).exists());
    assert!(!h.local_path("2024/05/photo-150x150.png").exists());
    assert!(h.remote.is_empty());
    assert!(h.attachment(id).is_none());

    let (status, _) = h.request("GET", &format!("/api/media/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn regenerate_all_covers_every_image() {
    let h = TestHarness::new();
    h.insert_image("2024/05/a.png", 400, 300);
    h.insert_image("2024/05/b.png", 400, 300);
    h.insert_file("2024/05/report.pdf", "application/pdf");

    let (status, json) = h.request("POST", "/api/media/regenerate-all").await;
    assert_eq!(status, StatusCode::OK);

    let entries = json["attachments"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        assert_eq!(entry["status"]["thumbnail"]["generation"]["state"], "done");
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn config_endpoint_redacts_secrets() {
    let mut config = Config::default();
    config.presets = test_presets();
    config.storage.s3.key = "AKIAEXAMPLE".to_string();
    config.storage.s3.secret = "hunter2".to_string();
    let h = TestHarness::with_config(config, Remote::Memory);

    let request = Request::builder()
        .uri("/api/media/config")
        .body(Body::empty())
        .unwrap();
    let (status, json) = h.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!json.to_string().contains("hunter2"));
    assert!(!json.to_string().contains("AKIAEXAMPLE"));

    assert_eq!(json["remote"], "ready");
    assert_eq!(json["media_url_base"], MEDIA_BASE);
    assert_eq!(json["presets"].as_array().unwrap().len(), 2);

    let settings = json["settings"].as_array().unwrap();
    let secret = settings
        .iter()
        .find(|s| s["key"] == "storage.s3.secret")
        .unwrap();
    assert_eq!(secret["value"], "********");
    assert_eq!(secret["env_var"], "MEDIAMIRROR__STORAGE_S3_SECRET");
    assert_eq!(secret["env_locked"], false);
}

#[tokio::test]
async fn config_endpoint_reports_misconfiguration() {
    let h = TestHarness::with_remote(Remote::Misconfigured("bad credentials".to_string()));

    let (status, json) = h.request("GET", "/api/media/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["remote"], "misconfigured");
    assert_eq!(json["remote_error"], "bad credentials");
}
