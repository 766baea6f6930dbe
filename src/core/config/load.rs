//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! validates the source list and applies `AGGREGATOR_BIND` and
//! `AGGREGATOR_LOG_LEVEL` env overrides.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::HeaderValue;
use reqwest::Url;
use serde::Deserialize;

use crate::error::AppError;
use crate::upstream::SourceSpec;

use super::raw::{RawConfig, RawSource};
use super::types::*;

/// Deep-merge two TOML values.
/// Tables are merged recursively — the overlay only needs to specify keys that
/// differ from the base. For every other type (string, integer, array, …)
/// the overlay value replaces the base value wholesale, so an overlay that
/// declares `[[sources]]` replaces the whole source list.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// fully merged `toml::Value`. `visited` carries canonicalized paths already
/// seen in this chain so circular references are caught early.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml`, then apply env-var overrides.
/// If no path is given and `config/default.toml` does not exist, returns a
/// default listening on `127.0.0.1:8080` with no sources configured.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let bind_override = env::var("AGGREGATOR_BIND").ok();
    let log_level_override = env::var("AGGREGATOR_LOG_LEVEL").ok();
    let api_key = env::var("AGGREGATOR_API_KEY").ok();

    if let Some(path) = config_path {
        return load_from(
            Path::new(path),
            bind_override.as_deref(),
            log_level_override.as_deref(),
            api_key.as_deref(),
        );
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(
            default_path,
            bind_override.as_deref(),
            log_level_override.as_deref(),
            api_key.as_deref(),
        )
    } else {
        resolve(
            RawConfig::default(),
            bind_override.as_deref(),
            log_level_override.as_deref(),
            api_key.as_deref(),
        )
    }
}

/// Internal loader — accepts an explicit path, optional overrides and the
/// API key. Tests pass these directly instead of mutating env vars.
/// Follows `[meta] base = "..."` inheritance chains before resolving.
pub fn load_from(
    path: &Path,
    bind_override: Option<&str>,
    log_level_override: Option<&str>,
    api_key: Option<&str>,
) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val).map_err(|e: toml::de::Error| {
        AppError::Config(format!("config error in {}: {e}", path.display()))
    })?;

    resolve(parsed, bind_override, log_level_override, api_key)
}

fn resolve(
    parsed: RawConfig,
    bind_override: Option<&str>,
    log_level_override: Option<&str>,
    api_key: Option<&str>,
) -> Result<Config, AppError> {
    let s = parsed.server;

    if s.deadline_ms == 0 {
        return Err(AppError::Config("server.deadline_ms must be > 0".into()));
    }

    let cors = resolve_cors(s.cors_origins)?;
    let sources = resolve_sources(parsed.sources)?;

    Ok(Config {
        server: ServerConfig {
            bind: bind_override.unwrap_or(&s.bind).to_string(),
            log_level: log_level_override.unwrap_or(&s.log_level).to_string(),
            log_file: s.log_file.as_deref().map(expand_home),
            deadline: Duration::from_millis(s.deadline_ms),
            user_agent: s.user_agent.filter(|ua| !ua.trim().is_empty()),
            cors,
        },
        aggregation: AggregationConfig {
            max_concurrency: NonZeroUsize::new(parsed.aggregation.max_concurrency),
        },
        sources,
        api_key: api_key.filter(|k| !k.is_empty()).map(str::to_string),
    })
}

/// Turn `server.cors_origins` into a [`CorsPolicy`].
///
/// Each entry must be a bare `http`/`https` origin (scheme, host, optional
/// port). `"*"` stands alone.
fn resolve_cors(origins: Option<Vec<String>>) -> Result<CorsPolicy, AppError> {
    let Some(origins) = origins else {
        return Ok(CorsPolicy::Any);
    };
    if origins.is_empty() {
        return Ok(CorsPolicy::Disabled);
    }
    if origins.iter().any(|o| o.trim() == "*") {
        if origins.len() > 1 {
            return Err(AppError::Config(
                "server.cors_origins: '*' cannot be combined with explicit origins".into(),
            ));
        }
        return Ok(CorsPolicy::Any);
    }

    let mut allowed = Vec::with_capacity(origins.len());
    for raw in &origins {
        let url = Url::parse(raw.trim()).map_err(|e| {
            AppError::Config(format!("server.cors_origins: invalid origin '{raw}': {e}"))
        })?;
        let bare = matches!(url.scheme(), "http" | "https")
            && url.path() == "/"
            && url.query().is_none()
            && url.fragment().is_none();
        if !bare {
            return Err(AppError::Config(format!(
                "server.cors_origins: '{raw}' is not a bare http(s) origin"
            )));
        }
        let origin = url.origin().ascii_serialization();
        let value = HeaderValue::from_str(&origin).map_err(|e| {
            AppError::Config(format!("server.cors_origins: invalid origin '{raw}': {e}"))
        })?;
        allowed.push(value);
    }
    Ok(CorsPolicy::Origins(allowed))
}

/// Validate raw `[[sources]]` entries and convert them into [`SourceSpec`]s,
/// preserving file order.
fn resolve_sources(raw: Vec<RawSource>) -> Result<Vec<SourceSpec>, AppError> {
    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(raw.len());

    for entry in raw {
        let name = entry.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Config("source name must not be empty".into()));
        }
        if !seen.insert(name.clone()) {
            return Err(AppError::Config(format!("duplicate source name: '{name}'")));
        }
        if entry.timeout_ms == 0 {
            return Err(AppError::Config(format!(
                "source '{name}': timeout_ms must be > 0"
            )));
        }

        let address = Url::parse(&entry.address).map_err(|e| {
            AppError::Config(format!("source '{name}': invalid address '{}': {e}", entry.address))
        })?;
        if !matches!(address.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "source '{name}': unsupported scheme '{}'",
                address.scheme()
            )));
        }

        sources.push(SourceSpec::new(
            name,
            address,
            Duration::from_millis(entry.timeout_ms),
        ));
    }

    Ok(sources)
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
