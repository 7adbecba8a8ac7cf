use crate::pipeline::PipelineError;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

/// Client facing error. The message is safe to return, details go to the log.
#[derive(Debug)]
pub struct Error {
    status_code: StatusCode,
    message: String,
}

impl Error {
    pub fn body_parsing_error(status_code: StatusCode) -> Self {
        Error {
            status_code,
            message: "Could not extract attachment from request body".to_string(),
        }
    }

    pub fn missing_file(field: &str) -> Self {
        Error {
            status_code: StatusCode::BAD_REQUEST,
            message: format!("No file uploaded under form field '{}'", field),
        }
    }

    pub fn undecodable_image() -> Self {
        Error {
            status_code: StatusCode::BAD_REQUEST,
            message: "Uploaded file is not a decodable image".to_string(),
        }
    }

    pub fn internal_server_error() -> Self {
        Error {
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
        }
    }

    pub fn not_found() -> Self {
        Error {
            status_code: StatusCode::NOT_FOUND,
            message: "Object not found".to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<PipelineError> for Error {
    fn from(error: PipelineError) -> Self {
        if error.is_client_error() {
            tracing::warn!(detail = %error, "rejecting upload");
            Error::undecodable_image()
        } else {
            tracing::error!(detail = %error, "inference failed");
            Error::internal_server_error()
        }
    }
}

impl From<MultipartRejection> for Error {
    fn from(rejection: MultipartRejection) -> Self {
        tracing::warn!(detail = %rejection, "request is not a multipart upload");
        Error::body_parsing_error(StatusCode::BAD_REQUEST)
    }
}

impl From<MultipartError> for Error {
    fn from(error: MultipartError) -> Self {
        tracing::warn!(detail = %error, "malformed multipart body");
        Error::body_parsing_error(error.status())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
        }));

        (self.status_code, body).into_response()
    }
}
