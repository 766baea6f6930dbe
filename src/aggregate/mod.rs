//! Aggregation core — strategies that fan calls out, and the composer that
//! folds their outcomes back into one result.

pub mod compose;
pub mod strategy;

pub use compose::{AggregateResult, OutcomeCounts, OverallStatus, compose};
pub use strategy::{Cancelled, Strategy};
