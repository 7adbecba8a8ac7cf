//! HTTP surface of the classifier.
//!
//! `POST /predict` takes a multipart upload under the `file` field and answers
//! with a JSON object of class name to score. `GET /health` and `GET /labels`
//! are operational helpers.

mod error;
mod handlers;

pub use error::Error;
pub use handlers::FILE_FIELD;

use crate::pipeline::Classifier;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared, read-only request state.
pub struct AppState {
    pub classifier: Classifier,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(classifier: Classifier) -> Self {
        AppState {
            classifier,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

pub fn create_router(state: SharedState, body_limit: usize) -> Router {
    Router::new()
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health_check))
        .route("/labels", get(handlers::labels))
        .fallback(handlers::fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(address = %addr, pid = std::process::id(), "listening for classification requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(detail = %e, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
