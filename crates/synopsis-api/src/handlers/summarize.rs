//! Summarization endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use synopsis_core::SummarizeParams;

use super::{decode_json, ApiError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
    /// Absent fields take the service defaults.
    #[serde(flatten)]
    pub params: SummarizeParams,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
}

/// `POST /summarize`, JSON or base64-encoded JSON.
pub async fn summarize(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SummarizeResponse>, ApiError> {
    let request: SummarizeRequest = decode_json(&headers, &body)?;
    let summary = state
        .service
        .summarize(&request.text, &request.params)
        .await?;
    Ok(Json(SummarizeResponse { summary }))
}
