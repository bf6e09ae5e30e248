//! Segment file and frame format.
//!
//! Segments are named `wal-NNNNNN.seg` where `NNNNNN` is a zero-padded segment id.
//!
//! # Segment Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Segment Header (32 bytes)          │
//! ├────────────────────────────────────┤
//! │ Entry frame 1                      │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! ├────────────────────────────────────┤
//! │ Trailer frame (sealed segments)    │
//! └────────────────────────────────────┘
//! ```
//!
//! # Header Layout
//!
//! ```text
//! ┌───────────┬─────────────┬────────────────┬────────────────┬──────────────┬───────────┐
//! │ Magic (4) │ Version (4) │ Segment id (8) │ Created at (8) │ Reserved (4) │ CRC32 (4) │
//! └───────────┴─────────────┴────────────────┴────────────────┴──────────────┴───────────┘
//! ```
//!
//! # Frame Layout
//!
//! ```text
//! ┌─────────────────┬─────────┬─────────────────────┬──────────┐
//! │ Length (4 bytes)│ Tag (1) │ Payload (variable)  │ CRC32 (4)│
//! └─────────────────┴─────────┴─────────────────────┴──────────┘
//! ```
//!
//! The length covers tag + payload + CRC; the CRC covers tag + payload.
//! A trailer frame's payload is the number of entry frames in the segment (8).

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use std::path::{Path, PathBuf};

/// Magic bytes identifying a segment file: "WALP"
pub const SEGMENT_MAGIC: [u8; 4] = *b"WALP";

/// Current segment format version
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Size of segment header in bytes
pub const SEGMENT_HEADER_SIZE: usize = 32;

/// Frame tag for a log entry
pub const FRAME_ENTRY: u8 = 0x01;

/// Frame tag for the segment trailer
pub const FRAME_TRAILER: u8 = 0x02;

/// Bytes a frame adds around its tag and payload (length + CRC)
pub const FRAME_OVERHEAD: usize = 8;

/// Largest accepted frame length; anything bigger is treated as corruption
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const TRAILER_PAYLOAD_LEN: usize = 8;

/// Size of a complete trailer frame on disk (length + tag + count + CRC)
pub const TRAILER_FRAME_SIZE: usize = FRAME_OVERHEAD + 1 + TRAILER_PAYLOAD_LEN;

/// Segment header (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Magic bytes: "WALP"
    pub magic: [u8; 4],

    /// Format version for forward compatibility
    pub format_version: u32,

    /// Segment id (monotonically increasing per log)
    pub segment_id: u64,

    /// Creation time (milliseconds since epoch)
    pub created_at: i64,
}

impl SegmentHeader {
    /// Create a new segment header.
    pub fn new(segment_id: u64, created_at: i64) -> Self {
        SegmentHeader {
            magic: SEGMENT_MAGIC,
            format_version: SEGMENT_FORMAT_VERSION,
            segment_id,
            created_at,
        }
    }

    /// Serialize header to bytes, checksum included.
    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        LittleEndian::write_u32(&mut bytes[4..8], self.format_version);
        LittleEndian::write_u64(&mut bytes[8..16], self.segment_id);
        LittleEndian::write_i64(&mut bytes[16..24], self.created_at);
        let crc = compute_crc(&bytes[0..28]);
        LittleEndian::write_u32(&mut bytes[28..32], crc);
        bytes
    }

    /// Deserialize and validate a header.
    pub fn from_bytes(bytes: &[u8; SEGMENT_HEADER_SIZE]) -> Result<Self, FrameError> {
        let stored = LittleEndian::read_u32(&bytes[28..32]);
        let computed = compute_crc(&bytes[0..28]);
        if stored != computed {
            return Err(FrameError::HeaderChecksum {
                expected: stored,
                computed,
            });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if magic != SEGMENT_MAGIC {
            return Err(FrameError::BadMagic(magic));
        }

        let format_version = LittleEndian::read_u32(&bytes[4..8]);
        if format_version != SEGMENT_FORMAT_VERSION {
            return Err(FrameError::UnsupportedVersion(format_version));
        }

        Ok(SegmentHeader {
            magic,
            format_version,
            segment_id: LittleEndian::read_u64(&bytes[8..16]),
            created_at: LittleEndian::read_i64(&bytes[16..24]),
        })
    }

    /// Generate segment file path.
    ///
    /// Format: `wal-NNNNNN.seg` where NNNNNN is the zero-padded segment id.
    pub fn segment_path(dir: &Path, segment_id: u64) -> PathBuf {
        dir.join(format!("wal-{:06}.seg", segment_id))
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind<'a> {
    /// Entry frame; the slice is the entry payload (tag stripped)
    Entry(&'a [u8]),
    /// Trailer frame sealing the segment
    Trailer {
        /// Number of entry frames written before the trailer
        entry_count: u64,
    },
}

/// Frame and header format errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Header checksum verification failed
    #[error("header checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    HeaderChecksum {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum computed over the header
        computed: u32,
    },

    /// Header does not start with the segment magic
    #[error("invalid segment magic {0:?}")]
    BadMagic([u8; 4]),

    /// Unsupported segment format version
    #[error("unsupported segment format version {0}")]
    UnsupportedVersion(u32),

    /// Frame length outside the accepted range
    #[error("invalid frame length {0}")]
    InvalidLength(usize),

    /// Frame checksum verification failed
    #[error("frame checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the frame
        expected: u32,
        /// Checksum computed over the frame
        computed: u32,
    },

    /// Frame tag is neither entry nor trailer
    #[error("unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),

    /// Trailer payload has the wrong size
    #[error("trailer payload is {0} bytes, expected 8")]
    InvalidTrailer(usize),
}

/// Check a frame length prefix before reading the frame body.
pub fn validate_frame_len(len: usize) -> Result<(), FrameError> {
    // Minimum: 1 byte tag + 4 bytes CRC
    if !(5..=MAX_FRAME_LEN).contains(&len) {
        return Err(FrameError::InvalidLength(len));
    }
    Ok(())
}

/// Decode the bytes following a frame's length prefix.
pub fn decode_frame(body: &[u8]) -> Result<FrameKind<'_>, FrameError> {
    validate_frame_len(body.len())?;

    let (tagged, crc_bytes) = body.split_at(body.len() - 4);
    let stored = LittleEndian::read_u32(crc_bytes);
    let computed = compute_crc(tagged);
    if stored != computed {
        return Err(FrameError::ChecksumMismatch {
            expected: stored,
            computed,
        });
    }

    let payload = &tagged[1..];
    match tagged[0] {
        FRAME_ENTRY => Ok(FrameKind::Entry(payload)),
        FRAME_TRAILER => {
            if payload.len() != TRAILER_PAYLOAD_LEN {
                return Err(FrameError::InvalidTrailer(payload.len()));
            }
            Ok(FrameKind::Trailer {
                entry_count: LittleEndian::read_u64(payload),
            })
        }
        other => Err(FrameError::UnknownTag(other)),
    }
}

/// Whether `bytes` is exactly one well-formed trailer frame.
pub fn is_trailer_frame(bytes: &[u8]) -> bool {
    if bytes.len() != TRAILER_FRAME_SIZE {
        return false;
    }
    let len = LittleEndian::read_u32(&bytes[..4]) as usize;
    len == TRAILER_FRAME_SIZE - 4
        && matches!(decode_frame(&bytes[4..]), Ok(FrameKind::Trailer { .. }))
}

/// Encode an entry payload as a complete frame.
pub fn encode_entry_frame(payload: &[u8]) -> Vec<u8> {
    encode_frame(FRAME_ENTRY, payload)
}

/// Encode a trailer frame.
pub fn encode_trailer_frame(entry_count: u64) -> Vec<u8> {
    encode_frame(FRAME_TRAILER, &entry_count.to_le_bytes())
}

fn encode_frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut tagged = Vec::with_capacity(1 + payload.len());
    tagged.push(tag);
    tagged.extend_from_slice(payload);
    let crc = compute_crc(&tagged);

    let total_len = tagged.len() + 4;
    let mut frame = Vec::with_capacity(4 + total_len);
    frame.extend_from_slice(&(total_len as u32).to_le_bytes());
    frame.extend_from_slice(&tagged);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
