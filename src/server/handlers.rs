//! HTTP request handlers

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::{debug, info};

use super::error::{Error, Result};
use super::SharedState;
use crate::postprocess::{ClassLabels, Prediction};

/// Form field carrying the uploaded image.
pub const FILE_FIELD: &str = "file";

/// POST /predict - classify an uploaded image
pub async fn predict(
    State(state): State<SharedState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>> {
    let image = read_file_field(multipart?).await?;

    info!(bytes = image.len(), "received image");

    let classifier = state.classifier.clone();
    let prediction = tokio::task::spawn_blocking(move || classifier.predict(&image))
        .await
        .map_err(|e| {
            tracing::error!(detail = %e, "inference task did not complete");
            Error::internal_server_error()
        })??;

    debug!(?prediction, "prediction");

    Ok(Json(prediction))
}

async fn read_file_field(mut multipart: Multipart) -> Result<Vec<u8>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            let file_name = field.file_name().unwrap_or("<unnamed>").to_string();
            let data = field.bytes().await?;

            debug!(file_name = %file_name, bytes = data.len(), "read upload");

            return Ok(data.to_vec());
        }
    }

    Err(Error::missing_file(FILE_FIELD))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health - liveness check
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /labels - class names in model output order
pub async fn labels(State(state): State<SharedState>) -> Json<ClassLabels> {
    Json(state.classifier.labels().clone())
}

pub async fn fallback() -> Error {
    Error::not_found()
}
