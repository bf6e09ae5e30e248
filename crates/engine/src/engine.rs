//! Per-segment replay.
//!
//! [`ReplayEngine`] drives one segment at a time through
//! read → filter → map → build → apply. Each entry is fully applied before the
//! next is read, so a segment's mutations reach the store in log order.
//!
//! # Segment lifecycle
//!
//! ```text
//! Opened → Reading → Filtering → Mapping → Building → Applying ─┐
//!             ▲                                                 │
//!             └─────────────────── next entry ──────────────────┘
//!
//! Reading   → Closed     (end of segment)
//! any state → Failed     (corrupt segment or apply failure)
//! Reading   → Cancelled  (cancellation observed between entries)
//! ```
//!
//! Malformed entries are counted and skipped; they never fail the segment.

use crate::applier::Applier;
use crate::builder::MutationBuilder;
use crate::config::ReplayConfig;
use crate::filter::TimeRangeFilter;
use crate::store::StoreClient;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};
use walplayer_core::{LogEntry, MalformedEdit, ReplayError, Result};
use walplayer_durability::{EntryPosition, ReadStopReason, SegmentReader, SEGMENT_HEADER_SIZE};

/// Shared cancellation flag, checked between entries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Replay state of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    /// Header validated, nothing read yet
    Opened,
    /// Reading the next entry
    Reading,
    /// Checking the entry against the time window
    Filtering,
    /// Resolving the target table
    Mapping,
    /// Grouping edits into row mutations
    Building,
    /// Submitting mutations to the store
    Applying,
    /// All entries processed
    Closed,
    /// Stopped by an error
    Failed,
    /// Stopped by cancellation
    Cancelled,
}

impl SegmentState {
    /// Whether the segment will make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SegmentState::Closed | SegmentState::Failed | SegmentState::Cancelled
        )
    }
}

/// Why an entry was not replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// Write time outside the replay window
    OutsideWindow,
    /// Source table not in the mapping
    UnmappedTable,
    /// Every edit belonged to the meta family
    NoReplayableEdits,
}

/// What happened to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Dropped before building mutations
    Filtered(FilterReason),
    /// Malformed and skipped
    Skipped,
    /// Applied as this many mutations
    Replayed {
        /// Mutations applied
        mutations: usize,
    },
}

/// Per-segment counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmentCounts {
    /// Entry frames read
    pub entries_read: u64,
    /// Entries outside the time window
    pub filtered_window: u64,
    /// Entries for tables not being replayed
    pub filtered_unmapped: u64,
    /// Entries with only meta edits
    pub filtered_empty: u64,
    /// Malformed entries skipped
    pub skipped_malformed: u64,
    /// Entries applied
    pub replayed: u64,
    /// Mutations applied
    pub mutations_applied: u64,
}

impl SegmentCounts {
    /// Entries dropped by filtering.
    pub fn filtered(&self) -> u64 {
        self.filtered_window + self.filtered_unmapped + self.filtered_empty
    }

    /// Add another set of counters.
    pub fn merge(&mut self, other: &SegmentCounts) {
        self.entries_read += other.entries_read;
        self.filtered_window += other.filtered_window;
        self.filtered_unmapped += other.filtered_unmapped;
        self.filtered_empty += other.filtered_empty;
        self.skipped_malformed += other.skipped_malformed;
        self.replayed += other.replayed;
        self.mutations_applied += other.mutations_applied;
    }

    fn record(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Filtered(FilterReason::OutsideWindow) => self.filtered_window += 1,
            EntryOutcome::Filtered(FilterReason::UnmappedTable) => self.filtered_unmapped += 1,
            EntryOutcome::Filtered(FilterReason::NoReplayableEdits) => self.filtered_empty += 1,
            EntryOutcome::Skipped => self.skipped_malformed += 1,
            EntryOutcome::Replayed { mutations } => {
                self.replayed += 1;
                self.mutations_applied += mutations as u64;
            }
        }
    }
}

/// Result of replaying one segment.
#[derive(Debug)]
pub struct SegmentReport {
    /// Segment file
    pub path: PathBuf,
    /// Final state
    pub state: SegmentState,
    /// Entry counters
    pub counts: SegmentCounts,
    /// Offset replay started from
    pub start_offset: u64,
    /// Offset just past the last fully processed entry
    pub resume_offset: u64,
    /// Whether the segment ended with a valid trailer
    pub sealed: bool,
    /// Error that stopped the segment
    pub error: Option<ReplayError>,
}

impl SegmentReport {
    fn new(path: &Path, start_offset: u64) -> Self {
        SegmentReport {
            path: path.to_path_buf(),
            state: SegmentState::Opened,
            counts: SegmentCounts::default(),
            start_offset,
            resume_offset: start_offset,
            sealed: false,
            error: None,
        }
    }

    /// Report for a segment that failed outside the engine.
    pub fn failed(path: &Path, start_offset: u64, error: ReplayError) -> Self {
        let mut report = Self::new(path, start_offset);
        report.state = SegmentState::Failed;
        report.error = Some(error);
        report
    }

    /// Whether the segment was replayed to its end.
    pub fn is_success(&self) -> bool {
        self.state == SegmentState::Closed
    }
}

/// Replays segments into one store client.
///
/// An engine is owned by a single worker; it holds that worker's client.
pub struct ReplayEngine<C> {
    config: Arc<ReplayConfig>,
    filter: TimeRangeFilter,
    builder: MutationBuilder,
    applier: Applier<C>,
    cancel: CancelToken,
    state: SegmentState,
}

impl<C: StoreClient> ReplayEngine<C> {
    /// Create an engine writing through `client`.
    pub fn new(config: Arc<ReplayConfig>, client: C, cancel: CancelToken) -> Self {
        ReplayEngine {
            filter: TimeRangeFilter::new(config.window()),
            builder: MutationBuilder::new(),
            applier: Applier::new(client, config.retry().clone()),
            config,
            cancel,
            state: SegmentState::Closed,
        }
    }

    /// Current state of the segment being replayed.
    pub fn state(&self) -> SegmentState {
        self.state
    }

    /// The applier and its client.
    pub fn applier(&self) -> &Applier<C> {
        &self.applier
    }

    /// Consume the engine, returning its client.
    pub fn into_client(self) -> C {
        self.applier.into_client()
    }

    /// Replay a segment from its first entry.
    pub fn replay_segment(&mut self, path: &Path) -> SegmentReport {
        self.replay_segment_from(path, None)
    }

    /// Replay a segment starting at `resume_from`, an offset previously
    /// reported as a [`SegmentReport::resume_offset`].
    ///
    /// Never returns an error; failures are carried in the report so one bad
    /// segment does not stop the others.
    pub fn replay_segment_from(&mut self, path: &Path, resume_from: Option<u64>) -> SegmentReport {
        let start = resume_from.unwrap_or(SEGMENT_HEADER_SIZE as u64);
        let span = info_span!("segment", path = %path.display());
        let _guard = span.enter();

        let mut report = SegmentReport::new(path, start);
        let mut reader = match SegmentReader::open_at(path, start) {
            Ok(reader) => reader,
            Err(e) => return self.fail(report, e),
        };
        self.state = SegmentState::Opened;
        info!(segment_id = reader.header().segment_id, offset = start, "Replaying segment");

        loop {
            if self.cancel.is_cancelled() {
                self.state = SegmentState::Cancelled;
                report.state = SegmentState::Cancelled;
                info!(offset = report.resume_offset, "Segment replay cancelled");
                return report;
            }

            self.state = SegmentState::Reading;
            let item = match reader.next() {
                Some(Ok(item)) => item,
                Some(Err(e)) => return self.fail(report, e),
                None => break,
            };
            report.counts.entries_read += 1;

            match self.process(item.entry, item.position) {
                Ok(outcome) => report.counts.record(outcome),
                // The failed entry is replayed again on resume
                Err(e) => return self.fail(report, e),
            }
            report.resume_offset = item.position.next_offset;
        }

        report.sealed = matches!(reader.stop_reason(), Some(ReadStopReason::Sealed));
        if let Some(ReadStopReason::PartialFrame { offset }) = reader.stop_reason() {
            warn!(offset, "Segment ends in a partial frame; stopped at last complete entry");
        }

        self.state = SegmentState::Closed;
        report.state = SegmentState::Closed;
        info!(
            entries = report.counts.entries_read,
            replayed = report.counts.replayed,
            filtered = report.counts.filtered(),
            skipped = report.counts.skipped_malformed,
            mutations = report.counts.mutations_applied,
            sealed = report.sealed,
            "Segment replayed"
        );
        report
    }

    fn process(
        &mut self,
        entry: std::result::Result<LogEntry, MalformedEdit>,
        position: EntryPosition,
    ) -> Result<EntryOutcome> {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(offset = position.offset, error = %e, "Skipping malformed entry");
                return Ok(EntryOutcome::Skipped);
            }
        };

        self.state = SegmentState::Filtering;
        if !self.filter.admit(&entry) {
            debug!(
                offset = position.offset,
                write_time = entry.write_time(),
                "Entry outside replay window"
            );
            return Ok(EntryOutcome::Filtered(FilterReason::OutsideWindow));
        }

        self.state = SegmentState::Mapping;
        let Some(target) = self.config.mapper().resolve(entry.table()).map(str::to_string) else {
            debug!(offset = position.offset, table = entry.table(), "Table not replayed");
            return Ok(EntryOutcome::Filtered(FilterReason::UnmappedTable));
        };

        self.state = SegmentState::Building;
        let mutations = self.builder.build(&entry, &target);
        if mutations.is_empty() {
            return Ok(EntryOutcome::Filtered(FilterReason::NoReplayableEdits));
        }

        self.state = SegmentState::Applying;
        for mutation in &mutations {
            self.applier.apply(mutation)?;
        }
        debug!(
            offset = position.offset,
            source = entry.table(),
            target = %target,
            mutations = mutations.len(),
            "Entry replayed"
        );

        Ok(EntryOutcome::Replayed {
            mutations: mutations.len(),
        })
    }

    fn fail(&mut self, mut report: SegmentReport, error: ReplayError) -> SegmentReport {
        error!(
            state = ?self.state,
            offset = report.resume_offset,
            error = %error,
            "Segment replay failed"
        );
        self.state = SegmentState::Failed;
        report.state = SegmentState::Failed;
        report.error = Some(error);
        report
    }
}
