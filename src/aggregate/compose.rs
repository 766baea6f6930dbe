//! Result composer — folds per-source outcomes into one aggregate.
//!
//! Pure: no I/O, never fails.

use serde::ser::{Serialize, Serializer};

use crate::upstream::{OutcomeStatus, SourceOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverallStatus {
    AllOk,
    PartialFailure,
    AllFailed,
}

/// The composed response for one aggregation request.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    /// In source-list order, never completion order.
    pub sources: Vec<SourceOutcome>,
    pub overall_status: OverallStatus,
}

/// Per-status tallies, used for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub ok: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl AggregateResult {
    pub fn counts(&self) -> OutcomeCounts {
        self.sources
            .iter()
            .fold(OutcomeCounts::default(), |mut c, o| {
                match o.status() {
                    OutcomeStatus::Ok => c.ok += 1,
                    OutcomeStatus::Failed => c.failed += 1,
                    OutcomeStatus::TimedOut => c.timed_out += 1,
                }
                c
            })
    }
}

/// Compose outcomes into an [`AggregateResult`].
///
/// `AllOk` iff every outcome is ok, `AllFailed` iff none is (and there is at
/// least one), `PartialFailure` otherwise. An empty list is `AllOk`.
pub fn compose(outcomes: Vec<SourceOutcome>) -> AggregateResult {
    let ok = outcomes.iter().filter(|o| o.is_ok()).count();
    let overall_status = if ok == outcomes.len() {
        OverallStatus::AllOk
    } else if ok == 0 {
        OverallStatus::AllFailed
    } else {
        OverallStatus::PartialFailure
    };

    AggregateResult { sources: outcomes, overall_status }
}

// ── Wire shape ────────────────────────────────────────────────────────────────

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeWire<'a> {
    name: &'a str,
    status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_detail: Option<String>,
    elapsed_ms: u64,
}

impl Serialize for SourceOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        OutcomeWire {
            name: &self.name,
            status: self.status(),
            payload: self.payload(),
            error_detail: self.error_detail(),
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
        .serialize(serializer)
    }
}
