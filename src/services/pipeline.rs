//! Run controller: schema bootstrap, enumeration, then one batch at a time.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, SourceError};
use crate::models::{Item, PipelineConfig, ProgressRecord, RunStatus, RunSummary};
use crate::services::batch::batch;
use crate::services::embedding::Encoder;
use crate::services::progress::ProgressReporter;
use crate::services::vector_store::VectorStore;
use crate::services::worker_pool::WorkerPool;
use crate::sources::LocalDirectory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Initializing,
    Enumerating,
    Dispatching { batch: usize },
    Collecting { batch: usize },
    Reporting { batch: usize },
    Completed,
    Cancelled,
    Failed(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed(_)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Initializing => write!(f, "initializing"),
            RunState::Enumerating => write!(f, "enumerating"),
            RunState::Dispatching { batch } => write!(f, "dispatching batch {batch}"),
            RunState::Collecting { batch } => write!(f, "collecting batch {batch}"),
            RunState::Reporting { batch } => write!(f, "reporting batch {batch}"),
            RunState::Completed => write!(f, "completed"),
            RunState::Cancelled => write!(f, "cancelled"),
            RunState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// One ingestion run over one directory.
pub struct Pipeline {
    config: PipelineConfig,
    source: LocalDirectory,
    encoder: Arc<dyn Encoder>,
    store: Arc<dyn VectorStore>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
    state: RunState,
    history: Vec<RunState>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: LocalDirectory,
        encoder: Arc<dyn Encoder>,
        store: Arc<dyn VectorStore>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, PipelineError> {
        if config.batch_size == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "batch size must be a positive integer".to_string(),
            ));
        }
        if config.concurrency == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "concurrency must be a positive integer".to_string(),
            ));
        }

        Ok(Self {
            config,
            source,
            encoder,
            store,
            reporter,
            cancel: CancellationToken::new(),
            state: RunState::Idle,
            history: vec![RunState::Idle],
        })
    }

    /// Stop before the next batch once `token` is cancelled. The current batch always finishes.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Every state the run has passed through, oldest first.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "pipeline state");
        self.history.push(next.clone());
        self.state = next;
    }

    fn fail(&mut self, error: PipelineError) -> Result<RunSummary, PipelineError> {
        self.transition(RunState::Failed(error.to_string()));
        Err(error)
    }

    pub async fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();

        self.transition(RunState::Initializing);
        if let Err(e) = self.store.initialize_schema().await {
            return self.fail(PipelineError::Schema(e));
        }

        self.transition(RunState::Enumerating);
        let items = match self.enumerate().await {
            Ok(items) => items,
            Err(e) => return self.fail(e.into()),
        };

        let items_found = items.len() as u64;
        let mut batches = batch(items, self.config.batch_size)?;
        let batches_total = batches.total();
        let batches_skipped = batches.skip_batches(self.config.resume_from_batch);

        info!(
            directory = %self.source.root().display(),
            items = items_found,
            batches = batches_total,
            skipped = batches_skipped,
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            encoder = self.encoder.name(),
            "starting ingestion"
        );

        let pool = WorkerPool::new(
            Arc::clone(&self.encoder),
            Arc::clone(&self.store),
            self.config.concurrency,
        );
        let mut summary = RunSummary {
            status: RunStatus::Completed,
            items_found,
            batches_total,
            batches_processed: 0,
            batches_skipped,
            succeeded: 0,
            failed: 0,
            elapsed: started.elapsed(),
        };

        for next in batches {
            if self.cancel.is_cancelled() {
                info!(
                    next_batch = next.index,
                    processed = summary.processed(),
                    "cancelled, stopping before next batch"
                );
                summary.status = RunStatus::Cancelled;
                summary.elapsed = started.elapsed();
                self.transition(RunState::Cancelled);
                return Ok(summary);
            }

            let (index, start, end) = (next.index, next.start, next.end());
            let batch_started = Instant::now();

            self.transition(RunState::Dispatching { batch: index });
            let in_flight = pool.dispatch(next);

            self.transition(RunState::Collecting { batch: index });
            let outcome = match in_flight.collect().await {
                Ok(outcome) => outcome,
                Err(source) => {
                    let processed = summary.processed();
                    return self.fail(PipelineError::ResourceExhaustion {
                        batch_index: index,
                        processed,
                        source,
                    });
                }
            };

            self.transition(RunState::Reporting { batch: index });
            let record = ProgressRecord {
                batch_index: index,
                start,
                end,
                success_count: outcome.succeeded,
                failure_count: outcome.failed(),
                batch_duration: batch_started.elapsed(),
                cumulative_duration: started.elapsed(),
            };
            if record.failure_count > 0 {
                warn!(
                    batch = index,
                    failed = record.failure_count,
                    "batch finished with failed items"
                );
            }
            self.reporter.report(&record);

            summary.batches_processed += 1;
            summary.succeeded += outcome.succeeded;
            summary.failed += outcome.failed();
        }

        summary.elapsed = started.elapsed();
        self.transition(RunState::Completed);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "ingestion completed"
        );
        Ok(summary)
    }

    /// Listing runs on the blocking pool.
    async fn enumerate(&self) -> Result<Vec<Item>, SourceError> {
        let source = self.source.clone();
        tokio::task::spawn_blocking(move || source.enumerate())
            .await
            .map_err(|e| SourceError::Unavailable {
                path: self.source.root().to_path_buf(),
                reason: format!("listing task failed: {e}"),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EncodingError;
    use crate::models::IndexParams;
    use crate::services::vector_store::{MemoryStore, SchemaSpec};
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const DIM: usize = 4;

    /// Fails on files whose name contains "corrupt".
    struct TestEncoder;

    #[async_trait]
    impl Encoder for TestEncoder {
        async fn encode(&self, path: &Path) -> Result<Vec<f32>, EncodingError> {
            if path.to_string_lossy().contains("corrupt") {
                return Err(EncodingError::FunctionError("cannot identify image".into()));
            }
            Ok(vec![0.5; DIM])
        }

        fn name(&self) -> &str {
            "test"
        }
    }

    fn spec(dimension: usize) -> SchemaSpec {
        SchemaSpec {
            table: "image_table".to_string(),
            index: "semantic_image".to_string(),
            dimension,
            params: IndexParams::default(),
        }
    }

    fn image_dir(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            fs::write(dir.path().join(name), b"\x89PNG").unwrap();
        }
        dir
    }

    fn numbered(k: usize) -> Vec<String> {
        (0..k).map(|i| format!("img_{i:03}.png")).collect()
    }

    type Recorded = Arc<Mutex<Vec<ProgressRecord>>>;

    fn recorder() -> (Arc<dyn ProgressReporter>, Recorded) {
        let records: Recorded = Arc::default();
        let sink = Arc::clone(&records);
        let reporter: Arc<dyn ProgressReporter> =
            Arc::new(move |record: &ProgressRecord| sink.lock().unwrap().push(record.clone()));
        (reporter, records)
    }

    fn config(batch_size: usize, concurrency: usize) -> PipelineConfig {
        PipelineConfig {
            batch_size,
            concurrency,
            resume_from_batch: 0,
        }
    }

    fn pipeline(
        dir: &Path,
        config: PipelineConfig,
        store: &MemoryStore,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Pipeline {
        Pipeline::new(
            config,
            LocalDirectory::new(dir),
            Arc::new(TestEncoder),
            Arc::new(store.clone()),
            reporter,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_full_run_reports_every_batch_in_order() {
        let names = numbered(25);
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = image_dir(&names);
        let store = MemoryStore::new(spec(DIM));
        let (reporter, records) = recorder();

        let mut pipeline = pipeline(dir.path(), config(10, 3), &store, reporter);
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.items_found, 25);
        assert_eq!(summary.batches_processed, 3);
        assert_eq!(summary.succeeded, 25);
        assert_eq!(pipeline.state(), &RunState::Completed);

        let records = records.lock().unwrap();
        let spans: Vec<(usize, usize, usize)> = records
            .iter()
            .map(|r| (r.batch_index, r.start, r.end))
            .collect();
        assert_eq!(spans, vec![(0, 0, 10), (1, 10, 20), (2, 20, 25)]);
        assert!(
            records
                .windows(2)
                .all(|w| w[0].cumulative_duration <= w[1].cumulative_duration)
        );
        assert_eq!(store.records().len(), 25);
    }

    #[tokio::test]
    async fn test_item_failures_are_counted_not_fatal() {
        let dir = image_dir(&["a.png", "b.png", "corrupt.png", "d.png"]);
        let store = MemoryStore::new(spec(DIM));
        let (reporter, records) = recorder();

        let mut pipeline = pipeline(dir.path(), config(10, 2), &store, reporter);
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        let records = records.lock().unwrap();
        assert_eq!(records[0].success_count + records[0].failure_count, 4);
        assert!(
            store
                .records()
                .iter()
                .all(|r| !r.location.contains("corrupt"))
        );
    }

    #[tokio::test]
    async fn test_one_failure_in_ten_is_reported_in_the_batch_record() {
        let mut names = numbered(9);
        names.push("corrupt.png".to_string());
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = image_dir(&names);
        let store = MemoryStore::new(spec(DIM));
        let (reporter, records) = recorder();

        let mut pipeline = pipeline(dir.path(), config(10, 4), &store, reporter);
        let summary = pipeline.run().await.unwrap();

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!((records[0].start, records[0].end), (0, 10));
        assert_eq!(
            (records[0].success_count, records[0].failure_count),
            (9, 1)
        );
        assert_eq!(store.records().len(), 9);
        assert_eq!((summary.succeeded, summary.failed), (9, 1));
    }

    #[tokio::test]
    async fn test_empty_directory_completes_without_reports() {
        let dir = image_dir(&[]);
        let store = MemoryStore::new(spec(DIM));
        let (reporter, records) = recorder();

        let mut pipeline = pipeline(dir.path(), config(10, 2), &store, reporter);
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.batches_total, 0);
        assert!(records.lock().unwrap().is_empty());
        assert_eq!(
            pipeline.history(),
            &[
                RunState::Idle,
                RunState::Initializing,
                RunState::Enumerating,
                RunState::Completed
            ]
        );
        // Schema is still bootstrapped.
        assert_eq!(store.table_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_directory_fails_before_any_write() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let store = MemoryStore::new(spec(DIM));
        let (reporter, records) = recorder();

        let mut pipeline = pipeline(&missing, config(10, 2), &store, reporter);
        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
        assert!(matches!(pipeline.state(), RunState::Failed(_)));
        assert!(records.lock().unwrap().is_empty());
        assert_eq!(store.insert_attempts(), 0);
    }

    #[tokio::test]
    async fn test_schema_mismatch_fails_before_enumeration() {
        let dir = image_dir(&["a.png"]);
        let existing = MemoryStore::new(spec(512));
        existing.initialize_schema().await.unwrap();
        let store = existing.with_spec(spec(DIM));
        let (reporter, records) = recorder();

        let mut pipeline = pipeline(dir.path(), config(10, 2), &store, reporter);
        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::Schema(_))));
        assert!(!pipeline.history().contains(&RunState::Enumerating));
        assert!(records.lock().unwrap().is_empty());
        assert_eq!(store.insert_attempts(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_batch_boundary() {
        let names = numbered(30);
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = image_dir(&names);
        let store = MemoryStore::new(spec(DIM));
        let token = CancellationToken::new();

        let trigger = token.clone();
        let reporter = move |_: &ProgressRecord| trigger.cancel();

        let mut pipeline =
            pipeline(dir.path(), config(10, 4), &store, Arc::new(reporter)).with_cancellation(token);
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(summary.batches_processed, 1);
        assert_eq!(store.records().len(), 10);
        assert_eq!(pipeline.state(), &RunState::Cancelled);
    }

    #[tokio::test]
    async fn test_resume_skips_leading_batches() {
        let names = numbered(25);
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = image_dir(&names);
        let store = MemoryStore::new(spec(DIM));
        let (reporter, records) = recorder();

        let mut config = config(10, 2);
        config.resume_from_batch = 2;
        let mut pipeline = pipeline(dir.path(), config, &store, reporter);
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.batches_skipped, 2);
        assert_eq!(summary.batches_processed, 1);
        let records = records.lock().unwrap();
        assert_eq!((records[0].batch_index, records[0].start), (2, 20));
        assert_eq!(store.records().len(), 5);
    }

    #[test]
    fn test_zero_concurrency_is_invalid() {
        let store = MemoryStore::new(spec(DIM));
        let (reporter, _) = recorder();
        let result = Pipeline::new(
            config(10, 0),
            LocalDirectory::new("."),
            Arc::new(TestEncoder),
            Arc::new(store),
            reporter,
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfiguration(_))));
    }
}
