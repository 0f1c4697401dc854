//! Media attachment API routes.
//!
//! Per-size failures (missing source, failed resize, failed transfer,
//! misconfigured provider) come back as `200 OK` with the failure described
//! in each size's `generation` block. Only an unknown attachment or size
//! (404), a non-image attachment or bad input (400) and catalog failures
//! (500) use error statuses.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mediamirror_common::{AttachmentId, Error};
use mediamirror_db::models::Attachment;
use mediamirror_storage::RemoteState;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppContext;
use crate::images::{build_report, StatusReport};

pub fn media_routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(list_attachments))
        .route("/regenerate-all", post(regenerate_all))
        .route("/upload", post(upload))
        .route("/config", get(get_config))
        .route("/:id", get(get_attachment).delete(delete_attachment))
        .route("/:id/status", get(get_status))
        .route("/:id/status/:size", get(get_size_status))
        .route("/:id/generate-all", post(generate_all))
        .route("/:id/generate/:size", post(generate_size))
        .route("/:id/sync", post(sync_attachment))
}

// ============================================================================
// Helpers
// ============================================================================

fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Database(_) | Error::Io(_) | Error::Internal(_) => {
            tracing::error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

fn parse_id(raw: &str) -> Result<AttachmentId, Response> {
    raw.parse::<AttachmentId>().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Invalid attachment ID: {}", raw)})),
        )
            .into_response()
    })
}

// ============================================================================
// Library
// ============================================================================

/// Regenerate every image attachment, bounded by the long-request timeout.
async fn regenerate_all(State(ctx): State<AppContext>) -> Response {
    let limit = ctx.long_request_timeout();
    match tokio::time::timeout(limit, ctx.media.regenerate_library()).await {
        Ok(Ok(entries)) => Json(json!({"attachments": entries})).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(_) => {
            tracing::warn!("Library regeneration timed out after {}s", limit.as_secs());
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "error": format!("Regeneration did not finish within {}s", limit.as_secs())
                })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

fn default_limit() -> u32 {
    50
}

async fn list_attachments(
    State(ctx): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> Response {
    match ctx.media.list(query.limit.min(500), query.offset) {
        Ok(attachments) => Json(json!({"attachments": attachments})).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    filename: String,
}

/// Store a raw request body as a new attachment.
async fn upload(
    State(ctx): State<AppContext>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Response {
    match ctx.media.ingest(&query.filename, body).await {
        Ok(ingested) => (StatusCode::CREATED, Json(ingested)).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Attachments
// ============================================================================

#[derive(Serialize)]
struct AttachmentView {
    #[serde(flatten)]
    attachment: Attachment,
    sizes: StatusReport,
}

async fn get_attachment(State(ctx): State<AppContext>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match ctx.media.get(id) {
        Ok(attachment) => {
            let sizes = if attachment.is_image() {
                build_report(&attachment, ctx.media.resolver(), ctx.media.urls())
            } else {
                StatusReport::new()
            };
            Json(AttachmentView { attachment, sizes }).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn delete_attachment(State(ctx): State<AppContext>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match ctx.media.delete_attachment(id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => error_response(e),
    }
}

async fn sync_attachment(State(ctx): State<AppContext>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match ctx.media.sync_attachment(id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Sizes
// ============================================================================

async fn get_status(State(ctx): State<AppContext>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match ctx.media.status(id) {
        Ok(report) => Json(json!({ "sizes": report })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_size_status(
    State(ctx): State<AppContext>,
    Path((id, size)): Path<(String, String)>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match ctx.media.size_status(id, &size) {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(e),
    }
}

async fn generate_all(State(ctx): State<AppContext>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match ctx.media.regenerate_all(id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

async fn generate_size(
    State(ctx): State<AppContext>,
    Path((id, size)): Path<(String, String)>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match ctx.media.regenerate_size(id, &size).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Resolved settings with provenance. Secrets are redacted.
async fn get_config(State(ctx): State<AppContext>) -> Response {
    let settings = match ctx.config.settings_report() {
        Ok(settings) => settings,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    let (remote, remote_error) = match ctx.media.store().remote_state() {
        RemoteState::Disabled => ("disabled", None),
        RemoteState::Misconfigured(reason) => ("misconfigured", Some(reason.clone())),
        RemoteState::Ready(_) => ("ready", None),
    };

    Json(json!({
        "provider": ctx.config.provider().as_str(),
        "remote": remote,
        "remote_error": remote_error,
        "media_url_base": ctx.media.urls().base(),
        "config_path": ctx.config_path,
        "presets": ctx.config.config().presets,
        "settings": settings,
    }))
    .into_response()
}
