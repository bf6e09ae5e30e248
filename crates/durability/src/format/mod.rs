//! On-disk byte formats for log segments.
//!
//! # Module Structure
//!
//! - `segment`: segment header and checksummed frame layout
//! - `entry`: entry header payload carried inside an entry frame
//! - `cursor`: bounds-checked little-endian reader shared by the decoders

pub(crate) mod cursor;
pub mod entry;
pub mod segment;

pub use entry::{decode_entry_payload, encode_entry_payload, EntryPayload};
pub use segment::{
    decode_frame, encode_entry_frame, encode_trailer_frame, is_trailer_frame,
    validate_frame_len, FrameError, FrameKind, SegmentHeader, FRAME_ENTRY, FRAME_OVERHEAD,
    FRAME_TRAILER, MAX_FRAME_LEN, SEGMENT_FORMAT_VERSION, SEGMENT_HEADER_SIZE, SEGMENT_MAGIC,
    TRAILER_FRAME_SIZE,
};
