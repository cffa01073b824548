//! # synopsis-api
//!
//! HTTP surface and process wiring for synopsis: configuration, storage
//! selection, tracing setup and the axum router.

pub mod config;
pub mod handlers;
pub mod services;

use axum::routing::{get, post};
use axum::Router;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use synopsis_db::{Database, Storage};

pub use config::{AppConfig, StorageBackend};
pub use services::{ServiceOptions, SynopsisService};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: SynopsisService,
}

impl AppState {
    pub fn new(service: SynopsisService) -> Self {
        Self { service }
    }
}

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::system::root))
        .route("/health", get(handlers::system::health_check))
        .route("/summarize", post(handlers::summarize::summarize))
        .route("/embeddings", post(handlers::embeddings::embed))
        .route("/embeddings/:id/nearest", get(handlers::embeddings::nearest))
        .route("/clusters", post(handlers::jobs::submit_clustering))
        .route("/jobs/:id", get(handlers::jobs::get_job))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .with_state(state)
}

/// Install the global tracing subscriber.
///
/// `LOG_FORMAT` selects "json" or "text" output (default "text"); `RUST_LOG`
/// overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!(log_format = %log_format, "Logging initialized");
}

/// Open the configured storage backend, running migrations on Postgres.
pub async fn open_storage(config: &AppConfig) -> synopsis_core::Result<Storage> {
    match &config.storage {
        StorageBackend::Memory => {
            info!(subsystem = "db", backend = "memory", "Using in-memory storage");
            Ok(Storage::memory())
        }
        StorageBackend::Postgres { url } => {
            let db = Database::connect(url).await?;
            db.migrate().await?;
            db.pool().log_metrics();
            Ok(db.storage())
        }
    }
}
