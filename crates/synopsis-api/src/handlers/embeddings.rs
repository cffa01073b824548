//! Embedding ingestion and nearest-neighbor lookup.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use synopsis_core::{defaults, Neighbor};

use super::{decode_json, ApiError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    pub batch_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct EmbedResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct NearestQuery {
    pub limit: Option<i64>,
}

/// `POST /embeddings`
pub async fn embed(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EmbedResponse>, ApiError> {
    let request: EmbedRequest = decode_json(&headers, &body)?;
    let id = state
        .service
        .embed_upsert(&request.batch_id, &request.text)
        .await?;
    Ok(Json(EmbedResponse { id }))
}

/// `GET /embeddings/:id/nearest?limit=N`
pub async fn nearest(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<NearestQuery>,
) -> Result<Json<Vec<Neighbor>>, ApiError> {
    let limit = query.limit.unwrap_or(defaults::NEAREST_LIMIT);
    let neighbors = state.service.nearest_neighbors(id, limit).await?;
    Ok(Json(neighbors))
}
