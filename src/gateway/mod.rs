//! Axum HTTP gateway for the aggregation service.
//!
//! ## URL layout
//!
//! ```text
//! GET /api/health             — liveness, unauthenticated
//! GET /api/sources            — configured sources
//! GET /api/aggregated/sync    — sequential aggregation
//! GET /api/aggregated/async   — concurrent aggregation
//! ```
//!
//! Both aggregation routes accept `?sources=a,b` to query a subset of the
//! configured sources, in the given order. CORS headers follow
//! `server.cors_origins` on every route.

mod api;
pub mod auth;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, header};
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, CorsPolicy};
use crate::error::AppError;
use crate::upstream::{Fetch, SourceSpec};

// ── Shared request state ──────────────────────────────────────────────────────

/// Axum router state injected into every handler via [`axum::extract::State`].
///
/// All fields are reference-counted or `Copy`.
#[derive(Clone)]
pub struct AppState {
    /// Configured sources, in response order.
    pub sources: Arc<[SourceSpec]>,
    /// Client used for every upstream call.
    pub client: Arc<dyn Fetch>,
    /// Server-wide ceiling for one aggregation request.
    pub deadline: Duration,
    /// In-flight bound for the concurrent strategy.
    pub max_in_flight: Option<NonZeroUsize>,
    /// Bearer key required on the aggregation routes, if any.
    pub api_key: Option<Arc<str>>,
    /// Server shutdown token. Each request derives a child token from it.
    pub shutdown: CancellationToken,
    /// Browser origins allowed to call the API.
    pub cors: CorsPolicy,
}

impl AppState {
    pub fn new(config: &Config, client: Arc<dyn Fetch>, shutdown: CancellationToken) -> Self {
        Self {
            sources: config.sources.clone().into(),
            client,
            deadline: config.server.deadline,
            max_in_flight: config.aggregation.max_concurrency,
            api_key: config.api_key.as_deref().map(Arc::from),
            shutdown,
            cors: config.server.cors.clone(),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health",           get(api::health))
        .route("/api/sources",          get(api::sources))
        .route("/api/aggregated/sync",  get(api::aggregated_sync))
        .route("/api/aggregated/async", get(api::aggregated_async));

    let router = match cors_layer(&state.cors) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn cors_layer(policy: &CorsPolicy) -> Option<CorsLayer> {
    match policy {
        CorsPolicy::Disabled => None,
        CorsPolicy::Any => Some(CorsLayer::permissive()),
        CorsPolicy::Origins(origins) => Some(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins.iter().cloned()))
                .allow_methods([Method::GET])
                .allow_headers([header::AUTHORIZATION])
                .expose_headers([api::REQUEST_ID]),
        ),
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

/// Bind `bind_addr` and serve until `state.shutdown` is cancelled.
pub async fn serve(bind_addr: &str, state: AppState) -> Result<(), AppError> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind_addr}: {e}")))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, sources = state.sources.len(), "gateway listening");

    serve_on(listener, state).await
}

/// Serve on an already-bound listener. Used directly by tests that bind
/// `127.0.0.1:0`.
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<(), AppError> {
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(format!("axum server error: {e}")))?;

    info!("gateway shut down");
    Ok(())
}
