//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module validates them and converts them into the public
//! `types` structs.

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

/// Raw TOML shape — serde target before resolution.
#[derive(Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub server: RawServer,
    #[serde(default)]
    pub aggregation: RawAggregation,
    #[serde(default)]
    pub sources: Vec<RawSource>,
}

// ── Server ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawServer {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Absent = any origin, `[]` = CORS off.
    #[serde(default)]
    pub cors_origins: Option<Vec<String>>,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            log_file: None,
            deadline_ms: default_deadline_ms(),
            user_agent: None,
            cors_origins: None,
        }
    }
}

// ── Aggregation ──────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub(super) struct RawAggregation {
    /// 0 = unbounded.
    #[serde(default)]
    pub max_concurrency: usize,
}

// ── Sources ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawSource {
    pub name: String,
    pub address: String,
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

pub(super) fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

pub(super) fn default_log_level() -> String {
    "info".to_string()
}

pub(super) fn default_deadline_ms() -> u64 {
    5_000
}

pub(super) fn default_source_timeout_ms() -> u64 {
    2_000
}
