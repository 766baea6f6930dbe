//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs the gateway consumes.
//! Raw TOML deserialization types live in `raw.rs`.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderValue;

use crate::upstream::SourceSpec;

// ── Server ───────────────────────────────────────────────────────────────────

/// HTTP listener and process-level settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind the axum listener to.
    pub bind: String,
    /// Default tracing filter (`info`, `debug`, `upstream_aggregator=trace`, …).
    pub log_level: String,
    /// Append logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Server-wide ceiling for one aggregation request. Exceeding it yields 504.
    pub deadline: Duration,
    /// `User-Agent` sent on upstream calls.
    pub user_agent: Option<String>,
    /// Which browser origins may call the API.
    pub cors: CorsPolicy,
}

/// Cross-origin policy applied to every route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorsPolicy {
    /// Any origin (`*`).
    #[default]
    Any,
    /// Only these exact origins, e.g. `http://localhost:3000`.
    Origins(Vec<HeaderValue>),
    /// No CORS headers; preflights are not answered.
    Disabled,
}

// ── Aggregation ──────────────────────────────────────────────────────────────

/// Fan-out tuning.
#[derive(Debug, Clone, Default)]
pub struct AggregationConfig {
    /// Maximum number of upstream calls in flight for one concurrent
    /// aggregation. `None` = unbounded.
    pub max_concurrency: Option<NonZeroUsize>,
}

// ── Top-level Config ─────────────────────────────────────────────────────────

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub aggregation: AggregationConfig,
    /// Configured upstream sources, in response order. Names are unique.
    pub sources: Vec<SourceSpec>,
    /// Bearer key gating the aggregation endpoints.
    /// Sourced from `AGGREGATOR_API_KEY` env only (never TOML).
    pub api_key: Option<String>,
}
