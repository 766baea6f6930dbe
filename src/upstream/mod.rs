//! Upstream sources and the client seam used to query them.
//!
//! A [`SourceSpec`] names one upstream data provider. Querying it through a
//! [`Fetch`] implementation always produces exactly one [`SourceOutcome`] —
//! every failure mode is folded into the outcome, nothing is raised to the
//! caller. [`http::HttpUpstream`] is the production implementation; tests
//! drive the aggregation strategies with scripted doubles.

pub mod http;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use thiserror::Error;

pub use http::HttpUpstream;

// ── SourceSpec ────────────────────────────────────────────────────────────────

/// One configured upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    /// Unique key within one aggregation; used in the response and in logs.
    pub name: String,
    pub address: Url,
    /// Per-call ceiling, enforced by the client itself.
    pub timeout: Duration,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, address: Url, timeout: Duration) -> Self {
        Self { name: name.into(), address, timeout }
    }
}

// ── FetchError ────────────────────────────────────────────────────────────────

/// Everything that can go wrong with a single upstream call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// The fetch task itself died (panic or abort) before producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            FetchError::Timeout(_) => OutcomeStatus::TimedOut,
            _ => OutcomeStatus::Failed,
        }
    }
}

// ── SourceOutcome ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeStatus {
    Ok,
    Failed,
    TimedOut,
}

/// Result of querying one source. Immutable once built.
///
/// The payload is present iff the call succeeded; the error detail iff it
/// did not. Holding a `Result` makes that exclusive by construction.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub name: String,
    pub elapsed: Duration,
    pub result: Result<serde_json::Value, FetchError>,
}

impl SourceOutcome {
    pub fn ok(name: impl Into<String>, payload: serde_json::Value, elapsed: Duration) -> Self {
        Self { name: name.into(), elapsed, result: Ok(payload) }
    }

    pub fn failed(name: impl Into<String>, error: FetchError, elapsed: Duration) -> Self {
        Self { name: name.into(), elapsed, result: Err(error) }
    }

    pub fn status(&self) -> OutcomeStatus {
        match &self.result {
            Ok(_) => OutcomeStatus::Ok,
            Err(e) => e.status(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.result.as_ref().ok()
    }

    pub fn error_detail(&self) -> Option<String> {
        self.result.as_ref().err().map(ToString::to_string)
    }
}

// ── Fetch ─────────────────────────────────────────────────────────────────────

/// A boxed future returned by [`Fetch::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = SourceOutcome> + Send + 'a>>;

/// Performs one call against one source.
///
/// Implementations must never panic on upstream misbehaviour and must bound
/// the call by `spec.timeout` on their own. Dropping the returned future
/// abandons the call.
pub trait Fetch: Send + Sync + 'static {
    fn fetch<'a>(&'a self, spec: &'a SourceSpec) -> FetchFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timeout_maps_to_timed_out() {
        let e = FetchError::Timeout(Duration::from_millis(250));
        assert_eq!(e.status(), OutcomeStatus::TimedOut);
        assert_eq!(e.to_string(), "timed out after 250ms");
    }

    #[test]
    fn other_errors_map_to_failed() {
        for e in [
            FetchError::Network("connection refused".into()),
            FetchError::Status { status: 503, body: "busy".into() },
            FetchError::Decode("expected value".into()),
        ] {
            assert_eq!(e.status(), OutcomeStatus::Failed, "{e}");
        }
    }

    #[test]
    fn ok_outcome_has_payload_only() {
        let o = SourceOutcome::ok("users", json!([1, 2]), Duration::from_millis(3));
        assert_eq!(o.status(), OutcomeStatus::Ok);
        assert_eq!(o.payload(), Some(&json!([1, 2])));
        assert!(o.error_detail().is_none());
    }

    #[test]
    fn failed_outcome_has_detail_only() {
        let err = FetchError::Status { status: 404, body: "not found".into() };
        let o = SourceOutcome::failed("cart", err, Duration::ZERO);
        assert_eq!(o.status(), OutcomeStatus::Failed);
        assert!(o.payload().is_none());
        assert!(o.error_detail().unwrap().contains("HTTP 404"));
    }
}
