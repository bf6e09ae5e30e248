//! Error types for walplayer
//!
//! Every layer reports failures through `ReplayError`. Decoding problems of a
//! single entry use the narrower `MalformedEdit`, which the engine counts and
//! skips instead of failing the segment.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for replay operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// An entry body whose bytes disagree with its own length fields or tags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedEdit {
    /// A field extends past the end of the body
    #[error("truncated {field}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Field being decoded
        field: &'static str,
        /// Bytes the field needs
        needed: usize,
        /// Bytes left in the body
        remaining: usize,
    },

    /// Unknown edit kind tag
    #[error("unknown edit kind tag 0x{0:02x}")]
    UnknownKind(u8),

    /// A presence flag other than 0 or 1
    #[error("invalid presence flag 0x{flag:02x} for {field}")]
    InvalidFlag {
        /// Field the flag guards
        field: &'static str,
        /// Flag byte found
        flag: u8,
    },

    /// A put or column delete without a qualifier
    #[error("edit {index} ({kind}) has no qualifier")]
    MissingQualifier {
        /// Position of the edit in the entry
        index: usize,
        /// Edit kind name
        kind: &'static str,
    },

    /// A text field that is not valid UTF-8
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    /// Bytes left after the declared number of edits
    #[error("{0} trailing bytes after last edit")]
    TrailingBytes(usize),
}

/// Error taxonomy for log replay.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Segment structure is unreadable; replay of that segment halts
    #[error("corrupt segment {}: {reason} (offset {offset})", path.display())]
    CorruptSegment {
        /// Segment file
        path: PathBuf,
        /// Byte offset where the problem was found
        offset: u64,
        /// What was wrong
        reason: String,
    },

    /// A single entry could not be decoded
    #[error("malformed edit: {0}")]
    MalformedEdit(#[from] MalformedEdit),

    /// The target store rejected a mutation after all retries
    #[error("apply to table {table} failed after {attempts} attempt(s): {reason}")]
    ApplyFailed {
        /// Target table
        table: String,
        /// Row key
        row: Vec<u8>,
        /// Number of attempts made
        attempts: u32,
        /// Last store error
        reason: String,
    },

    /// A time bound could not be parsed
    #[error("invalid time configuration {key}={value:?}: {detail}")]
    InvalidTimeConfiguration {
        /// Configuration key
        key: String,
        /// Raw value
        value: String,
        /// Why parsing failed
        detail: String,
    },

    /// Source and target table lists have different lengths
    #[error("table mapping arity mismatch: {sources} source table(s), {targets} target table(s)")]
    MappingArity {
        /// Number of source tables
        sources: usize,
        /// Number of target tables
        targets: usize,
    },

    /// Any other invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A replay worker panicked while processing a segment
    #[error("replay worker panicked: {0}")]
    WorkerPanicked(String),

    /// Replay progress (store contents or checkpoint) could not be persisted
    #[error("failed to persist replay progress: {0}")]
    Progress(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ReplayError {
    /// Create a corrupt-segment error.
    pub fn corrupt(path: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        ReplayError::CorruptSegment {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Create an invalid-time-configuration error.
    pub fn invalid_time(
        key: impl Into<String>,
        value: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        ReplayError::InvalidTimeConfiguration {
            key: key.into(),
            value: value.into(),
            detail: detail.into(),
        }
    }

    /// Create a generic configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        ReplayError::Config(msg.into())
    }

    /// Whether the error is raised before any segment is opened.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ReplayError::InvalidTimeConfiguration { .. }
                | ReplayError::MappingArity { .. }
                | ReplayError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_corrupt_segment() {
        let err = ReplayError::corrupt("/wal/wal-000001.seg", 32, "checksum mismatch");
        let msg = err.to_string();
        assert!(msg.contains("corrupt segment"));
        assert!(msg.contains("wal-000001.seg"));
        assert!(msg.contains("checksum mismatch"));
        assert!(msg.contains("32"));
    }

    #[test]
    fn test_error_display_malformed_edit() {
        let err = ReplayError::from(MalformedEdit::UnknownKind(0x9f));
        assert!(err.to_string().contains("0x9f"));

        let err = MalformedEdit::Truncated {
            field: "value",
            needed: 10,
            remaining: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("value"));
        assert!(msg.contains("10"));
        assert!(msg.contains("3"));
    }

    #[test]
    fn test_error_display_mapping_arity() {
        let err = ReplayError::MappingArity {
            sources: 2,
            targets: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("2 source"));
        assert!(msg.contains("1 target"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(ReplayError::invalid_time("walplayer.end.time", "soon", "bad").is_configuration());
        assert!(ReplayError::MappingArity {
            sources: 1,
            targets: 2
        }
        .is_configuration());
        assert!(!ReplayError::corrupt("x", 0, "bad").is_configuration());
        assert!(!ReplayError::Io(io::Error::new(io::ErrorKind::Other, "x")).is_configuration());
    }
}
