//! Replay engine for walplayer
//!
//! This crate turns log entries into store writes:
//! - Configuration: TOML settings, `walplayer.*` properties, validation
//! - Filtering: time window (TimeRangeFilter) and table mapping (TableNameMapper)
//! - Building: row-grouped mutations (MutationBuilder)
//! - Applying: store client abstraction with retry (Applier)
//! - Orchestration: per-segment engine, worker pool, checkpointed jobs
//!
//! The engine is the only component that knows about:
//! - Segment lifecycle and resume offsets
//! - Cross-layer coordination (reader + filters + store)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod applier;
pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod filter;
pub mod job;
pub mod mapping;
pub mod pool;
pub mod store;

pub use applier::{Applier, ApplyStats, RetryConfig};
pub use builder::MutationBuilder;
pub use checkpoint::{Checkpoint, SegmentProgress};
pub use config::{
    parse_time_zone, split_list, Properties, ReplayConfig, ReplaySettings, CONFIG_FILE_NAME,
    DEFAULT_TIME_ZONE, END_TIME_KEY, START_TIME_KEY, TABLES_KEY, TABLE_MAP_KEY, TIME_ZONE_KEY,
};
pub use engine::{
    CancelToken, EntryOutcome, FilterReason, ReplayEngine, SegmentCounts, SegmentReport,
    SegmentState,
};
pub use filter::{configure_bound, parse_time, setup_time, TimeRangeFilter, TimeWindow};
pub use job::ReplayJob;
pub use mapping::TableNameMapper;
pub use pool::{ReplayPool, ReplaySummary, SegmentTask};
pub use store::{Cell, MemoryStore, RowResult, StoreClient, StoreError, StoreSnapshot};
