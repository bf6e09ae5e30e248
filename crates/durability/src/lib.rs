//! Log segment layer for walplayer
//!
//! This crate handles everything that touches segment files:
//!
//! - Binary on-disk formats (segment header, checksummed frames, trailer)
//! - Edit body codec (EditDecoder and its encoder)
//! - Lazy, restartable segment reader
//! - Segment writer for fixtures and tooling
//! - Segment discovery under an input directory

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec; // Edit body encoding (EditDecoder)
pub mod discovery; // Segment file discovery
pub mod format; // Binary on-disk formats
pub mod reader; // Segment reader (LogSegmentReader)
pub mod writer; // Segment writer

pub use codec::{decode_edits, encode_edits};
pub use discovery::{discover_segments, parse_segment_id, SEGMENT_EXTENSION};
pub use format::{FrameError, SegmentHeader, SEGMENT_HEADER_SIZE, SEGMENT_MAGIC};
pub use reader::{EntryPosition, ReadItem, ReadStopReason, SegmentReader};
pub use writer::SegmentWriter;
