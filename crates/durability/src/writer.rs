//! Segment writer.
//!
//! Replay only reads segments; the writer exists so fixtures and tooling can
//! produce segments in exactly the format the reader validates.

use crate::codec::encode_edits;
use crate::format::{
    encode_entry_frame, encode_entry_payload, encode_trailer_frame, SegmentHeader,
    SEGMENT_HEADER_SIZE,
};
use crate::reader::EntryPosition;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use walplayer_core::{EntryHeader, LogEntry};

/// Appends entry frames to a new segment file.
pub struct SegmentWriter {
    file: BufWriter<File>,
    path: PathBuf,
    header: SegmentHeader,
    position: u64,
    entries: u64,
}

impl SegmentWriter {
    /// Create `wal-NNNNNN.seg` in `dir` and write its header.
    ///
    /// Fails if the file already exists.
    pub fn create(dir: &Path, segment_id: u64, created_at: i64) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Self::create_at(SegmentHeader::segment_path(dir, segment_id), segment_id, created_at)
    }

    /// Create a segment at an explicit path.
    pub fn create_at(path: impl Into<PathBuf>, segment_id: u64, created_at: i64) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create_new(true).write(true).open(&path)?;
        let mut file = BufWriter::new(file);

        let header = SegmentHeader::new(segment_id, created_at);
        file.write_all(&header.to_bytes())?;

        Ok(SegmentWriter {
            file,
            path,
            header,
            position: SEGMENT_HEADER_SIZE as u64,
            entries: 0,
        })
    }

    /// Append an entry.
    pub fn append(&mut self, entry: &LogEntry) -> io::Result<EntryPosition> {
        self.append_encoded(&entry.header, &encode_edits(&entry.edits))
    }

    /// Append an entry whose body is already encoded.
    pub fn append_encoded(&mut self, header: &EntryHeader, body: &[u8]) -> io::Result<EntryPosition> {
        let frame = encode_entry_frame(&encode_entry_payload(header, body));
        self.file.write_all(&frame)?;

        let offset = self.position;
        self.position += frame.len() as u64;
        self.entries += 1;

        Ok(EntryPosition {
            offset,
            next_offset: self.position,
        })
    }

    /// Segment file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Segment header written at creation.
    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    /// Offset where the next frame will be written.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of entries appended.
    pub fn entry_count(&self) -> u64 {
        self.entries
    }

    /// Write the trailer, sync, and close the segment.
    pub fn seal(mut self) -> io::Result<PathBuf> {
        let trailer = encode_trailer_frame(self.entries);
        self.file.write_all(&trailer)?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        tracing::debug!(
            path = %self.path.display(),
            entries = self.entries,
            "Sealed segment"
        );
        Ok(self.path)
    }

    /// Flush and close the segment without a trailer, leaving it unsealed.
    pub fn finish(mut self) -> io::Result<PathBuf> {
        self.file.flush()?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FRAME_OVERHEAD, SEGMENT_HEADER_SIZE};
    use tempfile::tempdir;
    use walplayer_core::CellEdit;

    #[test]
    fn test_create_refuses_existing_segment() {
        let dir = tempdir().unwrap();
        SegmentWriter::create(dir.path(), 1, 0)
            .unwrap()
            .seal()
            .unwrap();
        assert!(SegmentWriter::create(dir.path(), 1, 0).is_err());
    }

    #[test]
    fn test_positions_track_file_size() {
        let dir = tempdir().unwrap();
        let mut writer = SegmentWriter::create(dir.path(), 3, 0).unwrap();

        let entry = LogEntry::new("t", "r", 1, 5, vec![CellEdit::delete_row("row", 5)]);
        let first = writer.append(&entry).unwrap();
        let second = writer.append(&entry).unwrap();

        assert_eq!(first.offset, SEGMENT_HEADER_SIZE as u64);
        assert_eq!(first.next_offset, second.offset);
        assert_eq!(writer.entry_count(), 2);

        let position = writer.position();
        let path = writer.seal().unwrap();
        let len = std::fs::metadata(&path).unwrap().len();
        // Trailer frame: overhead + tag + 8-byte count
        assert_eq!(len, position + FRAME_OVERHEAD as u64 + 1 + 8);
        assert!(path.ends_with("wal-000003.seg"));
    }
}
