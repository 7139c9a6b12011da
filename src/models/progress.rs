//! Per-batch progress records and the final run summary.

use std::time::Duration;

use serde::{Serialize, Serializer};

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Summary of one completed batch. Emitted once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub batch_index: usize,
    pub start: usize,
    pub end: usize,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(rename = "batch_secs", serialize_with = "as_secs")]
    pub batch_duration: Duration,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub cumulative_duration: Duration,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub items_found: u64,
    pub batches_total: usize,
    pub batches_processed: usize,
    pub batches_skipped: usize,
    pub succeeded: u64,
    pub failed: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed
    }
}
