//! HTTP upstream client — one `GET` per source, JSON body expected.
//!
//! All wire handling is private to this module. Callers only ever see a
//! [`SourceOutcome`]; transport errors, non-2xx statuses, undecodable bodies
//! and per-source timeouts are all folded into it.

use std::time::Instant;

use reqwest::{Client, Response, header};
use tracing::{debug, trace, warn};

use crate::error::AppError;

use super::{Fetch, FetchError, FetchFuture, SourceOutcome, SourceSpec};

/// Longest upstream error body excerpt carried into an error detail.
const ERROR_BODY_LIMIT: usize = 256;

/// Shared HTTP client for all sources.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally. No client-level timeout is set;
/// each call is bounded by its own `SourceSpec::timeout`.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new(user_agent: Option<&str>) -> Result<Self, AppError> {
        let mut builder = Client::builder();
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::Server(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn fetch_outcome(&self, spec: &SourceSpec) -> SourceOutcome {
        let started = Instant::now();
        debug!(source = %spec.name, address = %spec.address, timeout_ms = spec.timeout.as_millis() as u64, "upstream call start");

        let result = match tokio::time::timeout(spec.timeout, self.get_json(spec)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(spec.timeout)),
        };
        let elapsed = started.elapsed();

        match result {
            Ok(payload) => {
                debug!(source = %spec.name, elapsed_ms = elapsed.as_millis() as u64, "upstream call ok");
                SourceOutcome::ok(&spec.name, payload, elapsed)
            }
            Err(error) => {
                warn!(source = %spec.name, elapsed_ms = elapsed.as_millis() as u64, %error, "upstream call failed");
                SourceOutcome::failed(&spec.name, error, elapsed)
            }
        }
    }

    async fn get_json(&self, spec: &SourceSpec) -> Result<serde_json::Value, FetchError> {
        let response = self
            .client
            .get(spec.address.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| classify(e, spec))?;

        let response = check_status(response).await?;

        let bytes = response.bytes().await.map_err(|e| classify(e, spec))?;
        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(source = %spec.name, body = %String::from_utf8_lossy(&bytes), "upstream body");
        }

        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

impl Fetch for HttpUpstream {
    fn fetch<'a>(&'a self, spec: &'a SourceSpec) -> FetchFuture<'a> {
        Box::pin(self.fetch_outcome(spec))
    }
}

fn classify(e: reqwest::Error, spec: &SourceSpec) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(spec.timeout)
    } else if e.is_decode() {
        FetchError::Decode(e.to_string())
    } else {
        FetchError::Network(e.to_string())
    }
}

/// Consume the response and return it if successful, or a status error
/// carrying a truncated excerpt of the body.
async fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    Err(FetchError::Status { status: status.as_u16(), body: excerpt(body.trim()) })
}

fn excerpt(body: &str) -> String {
    if body.chars().count() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut out: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::{Json, Router, http::StatusCode, routing::get};
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::upstream::OutcomeStatus;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn spec(name: &str, url: &str, timeout_ms: u64) -> SourceSpec {
        SourceSpec::new(name, url.parse().unwrap(), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn json_body_is_payload() {
        let base = serve(Router::new().route("/users", get(|| async { Json(json!({"count": 2})) }))).await;
        let client = HttpUpstream::new(Some("agg-test")).unwrap();
        let outcome = client.fetch(&spec("users", &format!("{base}/users"), 1000)).await;
        assert_eq!(outcome.status(), OutcomeStatus::Ok);
        assert_eq!(outcome.payload(), Some(&json!({"count": 2})));
        assert_eq!(outcome.name, "users");
    }

    #[tokio::test]
    async fn non_2xx_is_failed_with_status() {
        let base = serve(Router::new().route(
            "/cart",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "cart is down") }),
        ))
        .await;
        let client = HttpUpstream::new(None).unwrap();
        let outcome = client.fetch(&spec("cart", &format!("{base}/cart"), 1000)).await;
        assert_eq!(outcome.status(), OutcomeStatus::Failed);
        assert_eq!(
            outcome.result.unwrap_err(),
            FetchError::Status { status: 503, body: "cart is down".into() }
        );
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let base = serve(Router::new().route("/join", get(|| async { "not json {" }))).await;
        let client = HttpUpstream::new(None).unwrap();
        let outcome = client.fetch(&spec("join", &format!("{base}/join"), 1000)).await;
        assert!(matches!(outcome.result, Err(FetchError::Decode(_))));
        assert_eq!(outcome.status(), OutcomeStatus::Failed);
    }

    #[tokio::test]
    async fn slow_source_times_out_at_its_own_budget() {
        let base = serve(Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        ))
        .await;
        let client = HttpUpstream::new(None).unwrap();
        let started = Instant::now();
        let outcome = client.fetch(&spec("slow", &format!("{base}/slow"), 100)).await;
        assert_eq!(outcome.status(), OutcomeStatus::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = HttpUpstream::new(None).unwrap();
        let outcome = client.fetch(&spec("gone", &format!("http://{addr}/x"), 1000)).await;
        assert!(matches!(outcome.result, Err(FetchError::Network(_))), "{:?}", outcome.result);
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let long = "x".repeat(1000);
        let out = excerpt(&long);
        assert_eq!(out.chars().count(), ERROR_BODY_LIMIT + 1);
        assert!(out.ends_with('…'));
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn unbuildable_client_is_a_startup_error() {
        // Header values may not contain newlines.
        let err = HttpUpstream::new(Some("agg\nbad")).unwrap_err();
        assert!(matches!(err, AppError::Server(msg) if msg.contains("failed to build HTTP client")));
    }
}
