//! Aggregation strategies — how the calls for one request are orchestrated.
//!
//! Both strategies return one outcome per input spec, in input order, and
//! never fail: upstream errors live inside the outcomes. The only way a run
//! ends without outcomes is cancellation, in which case in-flight calls are
//! abandoned and the partial results discarded.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::upstream::{Fetch, FetchError, SourceOutcome, SourceSpec};

/// The run was cancelled before every outcome was collected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("aggregation cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One call at a time, in list order. A failure does not stop the rest.
    Sequential,
    /// All calls at once, joined before returning.
    Concurrent {
        /// Upper bound on calls in flight. `None` = all at once.
        max_in_flight: Option<NonZeroUsize>,
    },
}

impl Strategy {
    pub const fn concurrent() -> Self {
        Strategy::Concurrent { max_in_flight: None }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Concurrent { .. } => "concurrent",
        }
    }

    /// Query every spec and return their outcomes in `specs` order.
    pub async fn run(
        &self,
        client: &Arc<dyn Fetch>,
        specs: &[SourceSpec],
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceOutcome>, Cancelled> {
        debug!(strategy = self.name(), sources = specs.len(), "aggregation run start");
        let outcomes = match self {
            Strategy::Sequential => run_sequential(client.as_ref(), specs, cancel).await,
            Strategy::Concurrent { max_in_flight } => {
                run_concurrent(client, specs, *max_in_flight, cancel).await
            }
        };
        match &outcomes {
            Ok(o) => debug!(strategy = self.name(), outcomes = o.len(), "aggregation run done"),
            Err(_) => debug!(strategy = self.name(), "aggregation run cancelled"),
        }
        outcomes
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" | "sync" => Ok(Strategy::Sequential),
            "concurrent" | "async" => Ok(Strategy::concurrent()),
            other => Err(format!("unknown strategy: '{other}'")),
        }
    }
}

async fn run_sequential(
    client: &dyn Fetch,
    specs: &[SourceSpec],
    cancel: &CancellationToken,
) -> Result<Vec<SourceOutcome>, Cancelled> {
    let mut outcomes = Vec::with_capacity(specs.len());
    for spec in specs {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            outcome = client.fetch(spec) => outcome,
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

async fn run_concurrent(
    client: &Arc<dyn Fetch>,
    specs: &[SourceSpec],
    max_in_flight: Option<NonZeroUsize>,
    cancel: &CancellationToken,
) -> Result<Vec<SourceOutcome>, Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }

    let permits = max_in_flight.map(|n| Arc::new(Semaphore::new(n.get())));

    // One slot per spec, written once by the task that owns that index.
    let mut slots: Vec<Option<SourceOutcome>> = specs.iter().map(|_| None).collect();
    let mut set = JoinSet::new();

    for (index, spec) in specs.iter().enumerate() {
        let client = Arc::clone(client);
        let spec = spec.clone();
        let permits = permits.clone();
        set.spawn(async move {
            let _permit = match permits {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };
            (index, client.fetch(&spec).await)
        });
    }

    loop {
        // Dropping `set` on the cancel path aborts every in-flight fetch.
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            joined = set.join_next() => joined,
        };

        match joined {
            None => break,
            Some(Ok((index, outcome))) => slots[index] = Some(outcome),
            // The slot stays empty and is filled in below.
            Some(Err(e)) => error!("fetch task failed: {e}"),
        }
    }

    Ok(slots
        .into_iter()
        .zip(specs)
        .map(|(slot, spec)| {
            slot.unwrap_or_else(|| {
                SourceOutcome::failed(
                    &spec.name,
                    FetchError::Internal("fetch task panicked before producing an outcome".into()),
                    Duration::ZERO,
                )
            })
        })
        .collect())
}
