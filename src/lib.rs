//! walplayer - write-ahead log replay for column-family key-value stores
//!
//! walplayer reads log segments, keeps the entries whose write time falls in
//! a configured window and whose table is selected, and re-applies their edits
//! to (possibly renamed) target tables.
//!
//! # Quick Start
//!
//! ```ignore
//! use walplayer::{MemoryStore, ReplayConfig, ReplayJob, ReplaySettings};
//!
//! let settings = ReplaySettings {
//!     tables: vec!["orders".into()],
//!     table_mappings: vec!["orders_restored".into()],
//!     end_time: Some("2012-4-10T14:21:01.01".into()),
//!     ..ReplaySettings::default()
//! };
//! let config = ReplayConfig::from_settings(&settings)?;
//!
//! let store = MemoryStore::new();
//! store.create_table("orders_restored");
//! let summary = ReplayJob::new(config, "/var/log/wal").run(|| store.clone())?;
//! assert!(summary.is_success());
//! ```
//!
//! # Architecture
//!
//! - `walplayer-core`: log entry, edit and mutation types; error taxonomy
//! - `walplayer-durability`: segment format, edit codec, reader and writer
//! - `walplayer-engine`: filtering, mapping, mutation building, store apply,
//!   per-segment engine and worker pool

pub use walplayer_core::*;
pub use walplayer_durability::{
    decode_edits, discover_segments, encode_edits, EntryPosition, ReadItem, ReadStopReason,
    SegmentHeader, SegmentReader, SegmentWriter,
};
pub use walplayer_engine::*;
