//! HTTP handlers and the error-to-status mapping they share.

pub mod embeddings;
pub mod jobs;
pub mod summarize;
pub mod system;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use serde::de::DeserializeOwned;
use tracing::error;

use synopsis_core::{Error, ErrorKind};

/// Error returned by handlers, rendered as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    /// Failure reported by the core.
    Core(Error),
    /// Request body could not be decoded.
    BadRequest(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(err) => match err.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::ResourceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Inference => StatusCode::BAD_GATEWAY,
                ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match self {
            ApiError::Core(err) => {
                if status.is_server_error() {
                    error!(subsystem = "api", error = %err, status = status.as_u16(), "Request failed");
                }
                err.to_string()
            }
            ApiError::BadRequest(msg) => msg,
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// True if the request declares a base64-encoded body.
fn is_base64_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("base64"))
        .unwrap_or(false)
}

/// Parse a JSON request body, decoding it first when sent with
/// `Content-Encoding: base64`.
pub(crate) fn decode_json<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: &[u8],
) -> Result<T, ApiError> {
    let parsed: serde_json::Result<T> = if is_base64_encoded(headers) {
        let compact: Vec<u8> = body
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| ApiError::BadRequest(format!("Invalid base64 body: {e}")))?;
        serde_json::from_slice(&decoded)
    } else {
        serde_json::from_slice(body)
    };
    parsed.map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}
