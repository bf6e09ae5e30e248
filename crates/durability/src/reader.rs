//! Lazy, restartable segment reader.
//!
//! The reader yields one entry per frame read, so memory use is bounded by
//! the largest frame rather than the segment size. Every entry carries its
//! byte position; passing an entry's `next_offset` to
//! [`SegmentReader::open_at`] resumes reading right after it.

use crate::codec::decode_edits;
use crate::format::{
    decode_entry_payload, decode_frame, is_trailer_frame, validate_frame_len, FrameError,
    FrameKind, SegmentHeader, SEGMENT_HEADER_SIZE, TRAILER_FRAME_SIZE,
};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use walplayer_core::{LogEntry, MalformedEdit, ReplayError, Result};

/// Byte position of an entry frame within its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPosition {
    /// Offset of the frame's length prefix
    pub offset: u64,
    /// Offset of the following frame
    pub next_offset: u64,
}

/// One entry frame read from a segment.
///
/// The frame checksum held, so the segment stays readable even when the
/// entry itself fails to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadItem {
    /// Frame position
    pub position: EntryPosition,
    /// Decoded entry, or why its bytes are inconsistent
    pub entry: std::result::Result<LogEntry, MalformedEdit>,
}

/// Why reading stopped without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStopReason {
    /// Reached a valid trailer
    Sealed,
    /// Reached end of file on a frame boundary of an unsealed segment
    EndOfData,
    /// Unsealed segment ends inside a frame (writer still active or crashed)
    PartialFrame {
        /// Offset of the incomplete frame
        offset: u64,
    },
}

/// Reader over the entries of one segment file.
pub struct SegmentReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: SegmentHeader,
    offset: u64,
    entries_read: u64,
    /// Trailer counts are only comparable when reading started at the first frame
    counted_from_start: bool,
    /// Offset of the trailer when the file ends in one; frames before it must
    /// be complete
    trailer_at: Option<u64>,
    stop_reason: Option<ReadStopReason>,
    done: bool,
}

impl SegmentReader {
    /// Open a segment and position at its first entry.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at(path, SEGMENT_HEADER_SIZE as u64)
    }

    /// Open a segment and position at `offset`.
    ///
    /// `offset` must be a frame boundary previously reported as an entry's
    /// `next_offset` (or the header size).
    pub fn open_at(path: impl AsRef<Path>, offset: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut header_bytes = [0u8; SEGMENT_HEADER_SIZE];
        if read_full(&mut file, &mut header_bytes)? < SEGMENT_HEADER_SIZE {
            return Err(ReplayError::corrupt(&path, 0, "truncated segment header"));
        }
        let header = SegmentHeader::from_bytes(&header_bytes)
            .map_err(|e| ReplayError::corrupt(&path, 0, e.to_string()))?;

        if offset < SEGMENT_HEADER_SIZE as u64 {
            return Err(ReplayError::corrupt(
                &path,
                offset,
                "resume offset points inside the segment header",
            ));
        }
        if offset > file_len {
            return Err(ReplayError::corrupt(
                &path,
                offset,
                format!("resume offset beyond end of segment ({} bytes)", file_len),
            ));
        }
        let trailer_at = find_trailer(&mut file, file_len)?;
        file.seek(SeekFrom::Start(offset))?;

        tracing::debug!(
            path = %path.display(),
            segment_id = header.segment_id,
            offset,
            sealed = trailer_at.is_some(),
            "Opened segment"
        );

        Ok(SegmentReader {
            path,
            reader: BufReader::new(file),
            header,
            offset,
            entries_read: 0,
            counted_from_start: offset == SEGMENT_HEADER_SIZE as u64,
            trailer_at,
            stop_reason: None,
            done: false,
        })
    }

    /// Segment file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validated segment header.
    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    /// Offset of the next frame to read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of entry frames read so far.
    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    /// Why reading stopped, once it has stopped without an error.
    pub fn stop_reason(&self) -> Option<&ReadStopReason> {
        self.stop_reason.as_ref()
    }

    /// Whether a valid trailer was reached.
    pub fn is_sealed(&self) -> bool {
        self.stop_reason == Some(ReadStopReason::Sealed)
    }

    fn corrupt(&self, offset: u64, reason: impl Into<String>) -> ReplayError {
        ReplayError::corrupt(&self.path, offset, reason)
    }

    fn frame_error(&self, offset: u64, err: FrameError) -> ReplayError {
        self.corrupt(offset, err.to_string())
    }

    fn read_frame(&mut self) -> Result<Option<ReadItem>> {
        let frame_start = self.offset;

        let mut len_bytes = [0u8; 4];
        let n = read_full(&mut self.reader, &mut len_bytes)?;
        if n == 0 && self.trailer_at.is_some() {
            return Err(self.corrupt(frame_start, "segment trailer was overrun by a frame"));
        }
        if n == 0 {
            self.stop_reason = Some(ReadStopReason::EndOfData);
            tracing::debug!(path = %self.path.display(), "Reached end of unsealed segment");
            return Ok(None);
        }
        if n < len_bytes.len() {
            return self.partial_frame(frame_start);
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        validate_frame_len(len).map_err(|e| self.frame_error(frame_start, e))?;
        if let Some(trailer_at) = self.trailer_at {
            let frame_end = frame_start + 4 + len as u64;
            if frame_start < trailer_at && frame_end > trailer_at {
                return Err(self.corrupt(
                    frame_start,
                    format!(
                        "frame of {} bytes overruns the segment trailer at {}",
                        len, trailer_at
                    ),
                ));
            }
        }

        let mut body = vec![0u8; len];
        if read_full(&mut self.reader, &mut body)? < len {
            return self.partial_frame(frame_start);
        }
        let next_offset = frame_start + 4 + len as u64;

        match decode_frame(&body).map_err(|e| self.frame_error(frame_start, e))? {
            FrameKind::Entry(payload) => {
                self.offset = next_offset;
                self.entries_read += 1;
                Ok(Some(ReadItem {
                    position: EntryPosition {
                        offset: frame_start,
                        next_offset,
                    },
                    entry: decode_entry(payload),
                }))
            }
            FrameKind::Trailer { entry_count } => {
                if self.counted_from_start && entry_count != self.entries_read {
                    return Err(self.corrupt(
                        frame_start,
                        format!(
                            "trailer records {} entries but {} were read",
                            entry_count, self.entries_read
                        ),
                    ));
                }

                let mut probe = [0u8; 1];
                if read_full(&mut self.reader, &mut probe)? != 0 {
                    return Err(self.corrupt(next_offset, "data after segment trailer"));
                }

                self.offset = next_offset;
                self.stop_reason = Some(ReadStopReason::Sealed);
                Ok(None)
            }
        }
    }

    fn partial_frame(&mut self, offset: u64) -> Result<Option<ReadItem>> {
        if self.trailer_at.is_some() {
            return Err(self.corrupt(offset, "frame truncated inside a sealed segment"));
        }
        tracing::warn!(
            path = %self.path.display(),
            offset,
            "Segment ends inside a frame, treating as end of data"
        );
        self.stop_reason = Some(ReadStopReason::PartialFrame { offset });
        Ok(None)
    }
}

impl Iterator for SegmentReader {
    type Item = Result<ReadItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_frame() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn decode_entry(payload: &[u8]) -> std::result::Result<LogEntry, MalformedEdit> {
    let decoded = decode_entry_payload(payload)?;
    let edits = decode_edits(decoded.body)?;
    Ok(LogEntry {
        header: decoded.header,
        edits,
    })
}

/// Offset of the trailer frame if the file ends in a well-formed one.
fn find_trailer(file: &mut File, file_len: u64) -> io::Result<Option<u64>> {
    let trailer_len = TRAILER_FRAME_SIZE as u64;
    if file_len < SEGMENT_HEADER_SIZE as u64 + trailer_len {
        return Ok(None);
    }
    let trailer_at = file_len - trailer_len;
    let mut tail = [0u8; TRAILER_FRAME_SIZE];
    file.seek(SeekFrom::Start(trailer_at))?;
    if read_full(file, &mut tail)? < TRAILER_FRAME_SIZE {
        return Ok(None);
    }
    Ok(is_trailer_frame(&tail).then_some(trailer_at))
}

/// Fill `buf` as far as the reader allows; returns the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
