use crate::config::ResolvedConfig;
use crate::images::MediaService;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod routes_media;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ResolvedConfig>,
    /// Path to config file, if one was loaded
    pub config_path: Option<PathBuf>,
    pub media: Arc<MediaService>,
}

impl AppContext {
    pub fn new(config: ResolvedConfig, config_path: Option<PathBuf>, media: MediaService) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            media: Arc::new(media),
        }
    }

    /// Upper bound for library-wide regeneration.
    pub fn long_request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.config().server.long_request_timeout_secs)
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let api_base = ctx.config.config().server.api_base.trim_end_matches('/').to_string();

    let media = routes_media::media_routes();
    let app = Router::new().route("/health", get(health_check));
    let app = if api_base.is_empty() {
        app.merge(media)
    } else {
        app.nest(&api_base, media)
    };

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server and run until Ctrl+C or SIGTERM
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let server = &ctx.config.config().server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .context("Invalid server address")?;

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
