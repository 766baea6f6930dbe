//! Axum handlers for `/api/*` routes.
//!
//! Each aggregation request moves through
//! `Received → Dispatching → Composing → Responded` exactly once; nothing is
//! retried at this layer.

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::aggregate::{Cancelled, OverallStatus, Strategy, compose};
use crate::upstream::SourceSpec;

use super::AppState;
use super::auth::authorize;

pub(super) const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone, Copy)]
enum Phase {
    Received,
    Dispatching,
    Composing,
    Responded,
}

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct AggregateQuery {
    /// Comma-separated subset of configured source names.
    sources: Option<String>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

fn unauthorized(e: impl std::fmt::Display) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        json_error("unauthorized", e),
    )
        .into_response()
}

fn with_request_id(mut response: Response, request_id: &Uuid) -> Response {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response
}

/// HTTP status for a composed result.
pub(super) fn status_code(status: OverallStatus) -> StatusCode {
    match status {
        OverallStatus::AllOk => StatusCode::OK,
        OverallStatus::PartialFailure => StatusCode::MULTI_STATUS,
        OverallStatus::AllFailed => StatusCode::BAD_GATEWAY,
    }
}

/// Resolve the `sources` query filter against the configured list.
///
/// No filter selects every configured source in config order. A filter
/// selects the named sources in the order given; unknown, duplicate or
/// empty names are rejected.
pub(super) fn select_sources(
    configured: &[SourceSpec],
    filter: Option<&str>,
) -> Result<Vec<SourceSpec>, String> {
    let Some(filter) = filter else {
        return Ok(configured.to_vec());
    };

    let mut seen = HashSet::new();
    let mut picked = Vec::new();
    for name in filter.split(',').map(str::trim) {
        if name.is_empty() {
            return Err("empty source name in 'sources'".into());
        }
        if !seen.insert(name) {
            return Err(format!("duplicate source '{name}'"));
        }
        let spec = configured
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| format!("unknown source '{name}'"))?;
        picked.push(spec.clone());
    }
    Ok(picked)
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /api/health
pub(super) async fn health(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "sources": state.sources.len() })),
    )
        .into_response()
}

/// GET /api/sources
pub(super) async fn sources(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&headers, state.api_key.as_deref()) {
        return unauthorized(e);
    }

    let list: Vec<_> = state
        .sources
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "address": s.address.as_str(),
                "timeoutMs": u64::try_from(s.timeout.as_millis()).unwrap_or(u64::MAX),
            })
        })
        .collect();
    (StatusCode::OK, Json(json!(list))).into_response()
}

/// GET /api/aggregated/sync
pub(super) async fn aggregated_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<AggregateQuery>, QueryRejection>,
) -> Response {
    handle_aggregate(Strategy::Sequential, state, headers, query).await
}

/// GET /api/aggregated/async
pub(super) async fn aggregated_async(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<AggregateQuery>, QueryRejection>,
) -> Response {
    let strategy = Strategy::Concurrent { max_in_flight: state.max_in_flight };
    handle_aggregate(strategy, state, headers, query).await
}

async fn handle_aggregate(
    strategy: Strategy,
    state: AppState,
    headers: HeaderMap,
    query: Result<Query<AggregateQuery>, QueryRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("aggregate", %request_id, %strategy);

    let response = run_aggregate(strategy, state, headers, query)
        .instrument(span)
        .await;
    with_request_id(response, &request_id)
}

async fn run_aggregate(
    strategy: Strategy,
    state: AppState,
    headers: HeaderMap,
    query: Result<Query<AggregateQuery>, QueryRejection>,
) -> Response {
    debug!(phase = ?Phase::Received, "request phase");

    if let Err(e) = authorize(&headers, state.api_key.as_deref()) {
        warn!("rejected: {e}");
        return unauthorized(e);
    }

    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => {
            warn!("malformed query: {e}");
            return (StatusCode::BAD_REQUEST, json_error("bad_request", e.body_text())).into_response();
        }
    };

    let specs = match select_sources(&state.sources, query.sources.as_deref()) {
        Ok(specs) => specs,
        Err(msg) => {
            warn!("bad source filter: {msg}");
            return (StatusCode::BAD_REQUEST, json_error("bad_request", msg)).into_response();
        }
    };

    // Cancelled when this future is dropped (caller went away), when the
    // deadline fires, or when the server shuts down.
    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    debug!(phase = ?Phase::Dispatching, sources = specs.len(), "request phase");
    let run = strategy.run(&state.client, &specs, &cancel);
    let outcomes = match tokio::time::timeout(state.deadline, run).await {
        Ok(Ok(outcomes)) => outcomes,
        Ok(Err(Cancelled)) => {
            warn!("aggregation cancelled by shutdown");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                json_error("cancelled", "server is shutting down"),
            )
                .into_response();
        }
        Err(_) => {
            cancel.cancel();
            let deadline_ms = u64::try_from(state.deadline.as_millis()).unwrap_or(u64::MAX);
            warn!(deadline_ms, "aggregation exceeded server deadline");
            return (
                StatusCode::GATEWAY_TIMEOUT,
                json_error("timeout", format!("aggregation exceeded {deadline_ms}ms deadline")),
            )
                .into_response();
        }
    };

    debug!(phase = ?Phase::Composing, outcomes = outcomes.len(), "request phase");
    let result = compose(outcomes);
    let counts = result.counts();
    let status = status_code(result.overall_status);

    info!(
        overall = ?result.overall_status,
        ok = counts.ok,
        failed = counts.failed,
        timed_out = counts.timed_out,
        status = status.as_u16(),
        "aggregation composed"
    );
    debug!(phase = ?Phase::Responded, "request phase");

    (status, Json(result)).into_response()
}
