//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `AGGREGATOR_BIND` and `AGGREGATOR_LOG_LEVEL` env overrides.
//!
//! # Module layout
//!
//! - **types** — Public configuration structs (`Config`, `ServerConfig`,
//!   `AggregationConfig`).
//! - **raw** — Raw TOML deserialization types (`RawConfig`, `RawSource`, …).
//!   These mirror the file shape and use serde defaults; kept private.
//! - **load** — Loading logic: `merge_toml`, `load_raw_merged`, `load`,
//!   `load_from`, source validation, `expand_home`.

mod load;
mod raw;
mod types;

pub use load::{expand_home, load, load_from};
pub use types::*;

impl Config {
    /// Config with no sources and no API key, listening on an ephemeral port.
    /// Used by tests and embedders that build the source list themselves.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:0".into(),
                log_level: "info".into(),
                log_file: None,
                deadline: std::time::Duration::from_secs(5),
                user_agent: None,
                cors: CorsPolicy::Any,
            },
            aggregation: AggregationConfig::default(),
            sources: Vec::new(),
            api_key: None,
        }
    }
}
