use crate::config::Config;
use crate::images::ImageResolver;
use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod routes_browse;
pub mod routes_images;

pub use error::AppError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub resolver: Arc<ImageResolver>,
    pub config: Arc<Config>,
}

impl AppContext {
    pub fn new(config: Config, resolver: Arc<ImageResolver>) -> Self {
        Self {
            resolver,
            config: Arc::new(config),
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let server = &ctx.config.server;

    Router::new()
        .route("/health", get(health_check))
        .merge(routes_images::image_routes(&server.image_path_prefix))
        .merge(routes_browse::browse_routes(&server.browse_path_prefix))
        .fallback(bad_request)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Anything that is not a GET on a known route.
pub(crate) async fn bad_request() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, "400 Bad Request")
}

/// Start the HTTP server and run until a shutdown signal arrives
pub async fn start_server(config: Config, resolver: Arc<ImageResolver>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let ctx = AppContext::new(config, resolver);
    let app = create_router(ctx);

    tracing::info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
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
