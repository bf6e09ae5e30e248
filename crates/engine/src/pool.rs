//! Concurrent segment replay.
//!
//! Segments are independent, so a fixed pool of named worker threads pulls
//! them from a shared FIFO queue. Each worker builds its own store client
//! from a factory and owns it for its lifetime. A segment is never split
//! across workers, which keeps per-segment apply order intact; nothing is
//! promised about order across segments.

use crate::config::ReplayConfig;
use crate::engine::{CancelToken, ReplayEngine, SegmentCounts, SegmentReport, SegmentState};
use crate::store::StoreClient;
use parking_lot::Mutex as ParkingMutex;
use std::collections::VecDeque;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::error;
use uuid::Uuid;
use walplayer_core::ReplayError;
use walplayer_durability::SEGMENT_HEADER_SIZE;

/// One segment to replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTask {
    /// Segment file
    pub path: PathBuf,
    /// Offset to resume from; `None` starts at the first entry
    pub resume_from: Option<u64>,
}

impl SegmentTask {
    /// Replay a whole segment.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SegmentTask {
            path: path.into(),
            resume_from: None,
        }
    }

    /// Resume a segment at `offset`.
    pub fn resume(path: impl Into<PathBuf>, offset: u64) -> Self {
        SegmentTask {
            path: path.into(),
            resume_from: Some(offset),
        }
    }

    fn start_offset(&self) -> u64 {
        self.resume_from.unwrap_or(SEGMENT_HEADER_SIZE as u64)
    }
}

/// Fixed-size pool of segment workers.
///
/// Workers are named `walplayer-worker-0`, `walplayer-worker-1`, etc.
pub struct ReplayPool {
    config: Arc<ReplayConfig>,
    cancel: CancelToken,
}

impl ReplayPool {
    /// Create a pool sized by `config.workers()`.
    pub fn new(config: Arc<ReplayConfig>, cancel: CancelToken) -> Self {
        ReplayPool { config, cancel }
    }

    /// Replay every task and return one report per task, sorted by path.
    ///
    /// `client_factory` is called once per worker (and again if a worker
    /// recovers from a panic). `on_report` sees each report as its segment
    /// finishes, on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error only if a worker thread cannot be spawned.
    pub fn run<C, F, R>(
        &self,
        tasks: Vec<SegmentTask>,
        client_factory: F,
        mut on_report: R,
    ) -> io::Result<Vec<SegmentReport>>
    where
        C: StoreClient,
        F: Fn() -> C + Sync,
        R: FnMut(&SegmentReport),
    {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.config.workers().min(tasks.len()).max(1);
        let queue = ParkingMutex::new(VecDeque::from(tasks));
        let (tx, rx) = mpsc::channel();
        let mut reports = Vec::new();

        std::thread::scope(|scope| -> io::Result<()> {
            for id in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let factory = &client_factory;
                std::thread::Builder::new()
                    .name(format!("walplayer-worker-{}", id))
                    .spawn_scoped(scope, move || {
                        worker_loop(id, queue, &self.config, &self.cancel, factory, tx)
                    })?;
            }
            drop(tx);

            for report in rx {
                on_report(&report);
                reports.push(report);
            }
            Ok(())
        })?;

        reports.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(reports)
    }
}

fn worker_loop<C, F>(
    id: usize,
    queue: &ParkingMutex<VecDeque<SegmentTask>>,
    config: &Arc<ReplayConfig>,
    cancel: &CancelToken,
    factory: &F,
    tx: mpsc::Sender<SegmentReport>,
) where
    C: StoreClient,
    F: Fn() -> C,
{
    let mut engine = ReplayEngine::new(Arc::clone(config), factory(), cancel.clone());
    loop {
        let task = queue.lock().pop_front();
        let Some(task) = task else {
            break;
        };

        // catch_unwind keeps one bad segment from taking the worker down
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            engine.replay_segment_from(&task.path, task.resume_from)
        }));
        let report = match outcome {
            Ok(report) => report,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "(non-string panic)".to_string());
                error!(
                    worker = id,
                    path = %task.path.display(),
                    "Replay worker panicked: {}",
                    message
                );
                engine = ReplayEngine::new(Arc::clone(config), factory(), cancel.clone());
                SegmentReport::failed(
                    &task.path,
                    task.start_offset(),
                    ReplayError::WorkerPanicked(message),
                )
            }
        };

        if tx.send(report).is_err() {
            break;
        }
    }
}

/// Outcome of a replay run.
#[derive(Debug)]
pub struct ReplaySummary {
    /// Identifier attached to this run's log lines
    pub run_id: Uuid,
    /// One report per replayed segment, sorted by path
    pub reports: Vec<SegmentReport>,
    /// Segments skipped because a checkpoint marks them complete
    pub already_complete: Vec<PathBuf>,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
    /// Failures to persist store contents or the checkpoint after a segment
    pub progress_errors: Vec<ReplayError>,
}

impl ReplaySummary {
    /// Counters summed over all segments.
    pub fn totals(&self) -> SegmentCounts {
        let mut totals = SegmentCounts::default();
        for report in &self.reports {
            totals.merge(&report.counts);
        }
        totals
    }

    /// Reports of segments that failed.
    pub fn failed(&self) -> impl Iterator<Item = &SegmentReport> {
        self.reports
            .iter()
            .filter(|r| r.state == SegmentState::Failed)
    }

    /// Whether any segment stopped because of cancellation.
    pub fn was_cancelled(&self) -> bool {
        self.reports
            .iter()
            .any(|r| r.state == SegmentState::Cancelled)
    }

    /// Whether every segment was replayed to its end and its progress saved.
    pub fn is_success(&self) -> bool {
        self.progress_errors.is_empty() && self.reports.iter().all(SegmentReport::is_success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, RowResult, StoreError};
    use std::path::Path;
    use tempfile::TempDir;
    use walplayer_core::{CellEdit, LogEntry};
    use walplayer_durability::SegmentWriter;

    fn write_segments(dir: &Path, segments: u64, entries: u64) -> Vec<PathBuf> {
        (1..=segments)
            .map(|id| {
                let mut writer = SegmentWriter::create(dir, id, 0).unwrap();
                for seq in 0..entries {
                    let row = format!("s{}-r{}", id, seq);
                    writer
                        .append(&LogEntry::new(
                            "t",
                            "region",
                            seq,
                            1,
                            vec![CellEdit::put(row, "f", "q", 1, "v")],
                        ))
                        .unwrap();
                }
                writer.seal().unwrap()
            })
            .collect()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table("t");
        store
    }

    #[test]
    fn test_pool_replays_all_segments() {
        let dir = TempDir::new().unwrap();
        let paths = write_segments(dir.path(), 5, 4);
        let store = store();

        let config = Arc::new(ReplayConfig::for_testing().with_workers(3));
        let pool = ReplayPool::new(config, CancelToken::new());
        let mut seen = 0;
        let reports = pool
            .run(
                paths.iter().map(SegmentTask::new).collect(),
                || store.clone(),
                |_| seen += 1,
            )
            .unwrap();

        assert_eq!(seen, 5);
        assert_eq!(reports.len(), 5);
        assert!(reports.iter().all(SegmentReport::is_success));
        let sorted: Vec<&PathBuf> = reports.iter().map(|r| &r.path).collect();
        assert_eq!(sorted, paths.iter().collect::<Vec<_>>());
        assert_eq!(store.visible_rows("t").unwrap().len(), 20);
    }

    #[test]
    fn test_pool_with_no_tasks() {
        let pool = ReplayPool::new(Arc::new(ReplayConfig::for_testing()), CancelToken::new());
        let reports = pool.run(Vec::new(), MemoryStore::new, |_| {}).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn test_cancelled_pool_reports_every_segment() {
        let dir = TempDir::new().unwrap();
        let paths = write_segments(dir.path(), 3, 2);
        let store = store();
        let cancel = CancelToken::new();
        cancel.cancel();

        let pool = ReplayPool::new(Arc::new(ReplayConfig::for_testing()), cancel);
        let reports = pool
            .run(
                paths.iter().map(SegmentTask::new).collect(),
                || store.clone(),
                |_| {},
            )
            .unwrap();

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.state == SegmentState::Cancelled));
        assert!(store.visible_rows("t").unwrap().is_empty());
    }

    struct PanickingStore;

    impl StoreClient for PanickingStore {
        fn get(&self, _table: &str, _row: &[u8]) -> std::result::Result<RowResult, StoreError> {
            Ok(RowResult::default())
        }

        fn put(
            &mut self,
            _table: &str,
            _row: &[u8],
            _family: &[u8],
            _qualifier: &[u8],
            _value: &[u8],
            _timestamp: i64,
        ) -> std::result::Result<(), StoreError> {
            panic!("store client bug")
        }

        fn delete(
            &mut self,
            _table: &str,
            _row: &[u8],
            _family: Option<&[u8]>,
            _qualifier: Option<&[u8]>,
            _timestamp: Option<i64>,
        ) -> std::result::Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_worker_panic_becomes_failed_report() {
        let dir = TempDir::new().unwrap();
        let paths = write_segments(dir.path(), 2, 1);

        let pool = ReplayPool::new(Arc::new(ReplayConfig::for_testing()), CancelToken::new());
        let reports = pool
            .run(
                paths.iter().map(SegmentTask::new).collect(),
                || PanickingStore,
                |_| {},
            )
            .unwrap();

        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert_eq!(report.state, SegmentState::Failed);
            assert!(matches!(
                report.error,
                Some(ReplayError::WorkerPanicked(ref msg)) if msg.contains("store client bug")
            ));
        }
    }

    #[test]
    fn test_summary_totals() {
        let dir = TempDir::new().unwrap();
        let paths = write_segments(dir.path(), 2, 3);
        let store = store();
        let pool = ReplayPool::new(
            Arc::new(ReplayConfig::for_testing().with_workers(2)),
            CancelToken::new(),
        );
        let reports = pool
            .run(
                paths.iter().map(SegmentTask::new).collect(),
                || store.clone(),
                |_| {},
            )
            .unwrap();

        let summary = ReplaySummary {
            run_id: Uuid::new_v4(),
            reports,
            already_complete: Vec::new(),
            elapsed: Duration::ZERO,
            progress_errors: Vec::new(),
        };
        assert!(summary.is_success());
        assert!(!summary.was_cancelled());
        assert_eq!(summary.failed().count(), 0);
        assert_eq!(summary.totals().replayed, 6);
        assert_eq!(summary.totals().mutations_applied, 6);
    }
}
