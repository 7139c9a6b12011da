use tracing::info;

use crate::models::ProgressRecord;

/// Sink for per-batch progress. Called once per batch, in batch order.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, record: &ProgressRecord);
}

impl<F> ProgressReporter for F
where
    F: Fn(&ProgressRecord) + Send + Sync,
{
    fn report(&self, record: &ProgressRecord) {
        self(record)
    }
}

/// Writes each record as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, record: &ProgressRecord) {
        info!(
            batch = record.batch_index,
            start = record.start,
            end = record.end,
            succeeded = record.success_count,
            failed = record.failure_count,
            batch_secs = record.batch_duration.as_secs_f64(),
            elapsed_secs = record.cumulative_duration.as_secs_f64(),
            "batch completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_closure_reporter() {
        let seen = Mutex::new(Vec::new());
        let reporter = |record: &ProgressRecord| seen.lock().unwrap().push(record.batch_index);

        let record = ProgressRecord {
            batch_index: 3,
            start: 3000,
            end: 3500,
            success_count: 500,
            failure_count: 0,
            batch_duration: Duration::from_secs(1),
            cumulative_duration: Duration::from_secs(4),
        };
        reporter.report(&record);
        LogReporter.report(&record);

        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }
}
