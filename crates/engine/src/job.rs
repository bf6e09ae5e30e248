//! A complete replay run over an input directory.

use crate::checkpoint::Checkpoint;
use crate::config::ReplayConfig;
use crate::engine::{CancelToken, SegmentReport};
use crate::pool::{ReplayPool, ReplaySummary, SegmentTask};
use crate::store::StoreClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;
use walplayer_core::{ReplayError, Result};
use walplayer_durability::{discover_segments, SEGMENT_HEADER_SIZE};

/// Discovers segments under an input path and replays them through a
/// [`ReplayPool`], optionally tracking progress in a checkpoint file.
pub struct ReplayJob {
    config: Arc<ReplayConfig>,
    input: PathBuf,
    checkpoint: Option<PathBuf>,
    cancel: CancelToken,
}

impl ReplayJob {
    /// Create a job for a segment file or a directory of segments.
    pub fn new(config: ReplayConfig, input: impl Into<PathBuf>) -> Self {
        ReplayJob {
            config: Arc::new(config),
            input: input.into(),
            checkpoint: None,
            cancel: CancelToken::new(),
        }
    }

    /// Track progress in `path` (builder pattern).
    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    /// Use an externally owned cancellation token (builder pattern).
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this job.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Input path.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Shared configuration.
    pub fn config(&self) -> &Arc<ReplayConfig> {
        &self.config
    }

    /// Run the job.
    ///
    /// Per-segment failures are reported in the summary rather than returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be listed, the checkpoint cannot
    /// be read, or workers cannot be started.
    pub fn run<C, F>(&self, client_factory: F) -> Result<ReplaySummary>
    where
        C: StoreClient,
        F: Fn() -> C + Sync,
    {
        self.run_with_commit(client_factory, |_| Ok(()))
    }

    /// Run the job, calling `commit` after each segment finishes and before
    /// its progress is written to the checkpoint.
    ///
    /// `commit` makes the segment's mutations durable in the target store.
    /// When it fails the segment's progress is not recorded, so the next run
    /// replays it again. Commit and checkpoint failures are collected in
    /// [`ReplaySummary::progress_errors`] and make the run unsuccessful.
    ///
    /// # Errors
    ///
    /// Same as [`ReplayJob::run`].
    pub fn run_with_commit<C, F, P>(
        &self,
        client_factory: F,
        mut commit: P,
    ) -> Result<ReplaySummary>
    where
        C: StoreClient,
        F: Fn() -> C + Sync,
        P: FnMut(&SegmentReport) -> Result<()>,
    {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("replay", %run_id);
        let _guard = span.enter();

        let segments = discover_segments(&self.input)?;
        if segments.is_empty() {
            warn!(input = %self.input.display(), "No segments found");
        }

        let mut checkpoint = match &self.checkpoint {
            Some(path) => Checkpoint::load(path)?,
            None => Checkpoint::new(),
        };

        let mut tasks = Vec::with_capacity(segments.len());
        let mut already_complete = Vec::new();
        for path in segments {
            match checkpoint.resume_offset(&path) {
                None => already_complete.push(path),
                Some(offset) if offset == SEGMENT_HEADER_SIZE as u64 => {
                    tasks.push(SegmentTask::new(path))
                }
                Some(offset) => tasks.push(SegmentTask::resume(path, offset)),
            }
        }

        let window = self.config.window();
        info!(
            input = %self.input.display(),
            segments = tasks.len(),
            already_complete = already_complete.len(),
            workers = self.config.workers(),
            start = ?window.start_inclusive,
            end = ?window.end_exclusive,
            "Starting replay"
        );

        let pool = ReplayPool::new(Arc::clone(&self.config), self.cancel.clone());
        let checkpoint_path = self.checkpoint.as_deref();
        let mut progress_errors = Vec::new();
        let reports = pool.run(tasks, client_factory, |report| {
            if let Err(e) = commit(report) {
                error!(
                    path = %report.path.display(),
                    error = %e,
                    "Failed to commit segment; progress not recorded"
                );
                progress_errors.push(e);
                return;
            }
            if let Some(path) = checkpoint_path {
                checkpoint.record(report);
                if let Err(e) = checkpoint.save(path) {
                    error!(path = %path.display(), error = %e, "Failed to save checkpoint");
                    progress_errors.push(ReplayError::Progress(format!(
                        "checkpoint '{}': {}",
                        path.display(),
                        e
                    )));
                }
            }
        })?;

        let summary = ReplaySummary {
            run_id,
            reports,
            already_complete,
            elapsed: started.elapsed(),
            progress_errors,
        };

        let totals = summary.totals();
        info!(
            segments = summary.reports.len(),
            failed = summary.failed().count(),
            cancelled = summary.was_cancelled(),
            progress_errors = summary.progress_errors.len(),
            entries = totals.entries_read,
            replayed = totals.replayed,
            filtered = totals.filtered(),
            skipped = totals.skipped_malformed,
            mutations = totals.mutations_applied,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Replay finished"
        );

        Ok(summary)
    }
}
