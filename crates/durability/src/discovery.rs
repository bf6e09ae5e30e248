//! Segment discovery.
//!
//! Finds segment files under a log input directory. Segments may sit directly
//! in the directory or in per-server subdirectories.

use std::io;
use std::path::{Path, PathBuf};

/// File extension of segment files.
pub const SEGMENT_EXTENSION: &str = "seg";

/// List all segment files under `input`, sorted by path.
///
/// `input` may also name a single segment file. Hidden entries (names starting
/// with `.`) are ignored.
pub fn discover_segments(input: &Path) -> io::Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(input)?;
    if metadata.is_file() {
        return Ok(if is_segment_file(input) {
            vec![input.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut segments = Vec::new();
    let mut pending = vec![input.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && is_segment_file(&path) {
                segments.push(path);
            }
        }
    }

    segments.sort();
    tracing::debug!(
        input = %input.display(),
        segments = segments.len(),
        "Discovered segments"
    );
    Ok(segments)
}

/// Parse the segment id from a `wal-NNNNNN.seg` file name.
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix("wal-")?
        .strip_suffix(".seg")?
        .parse()
        .ok()
}

fn is_segment_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(SEGMENT_EXTENSION)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SegmentWriter;
    use tempfile::tempdir;

    #[test]
    fn test_discover_nested_segments_sorted() {
        let dir = tempdir().unwrap();
        let server_b = dir.path().join("server-b");
        let server_a = dir.path().join("server-a");

        SegmentWriter::create(&server_b, 1, 0).unwrap().seal().unwrap();
        SegmentWriter::create(&server_a, 2, 0).unwrap().seal().unwrap();
        SegmentWriter::create(&server_a, 1, 0).unwrap().seal().unwrap();
        std::fs::write(server_a.join("notes.txt"), b"ignored").unwrap();
        std::fs::write(dir.path().join(".wal-000009.seg"), b"hidden").unwrap();

        let found = discover_segments(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![
                server_a.join("wal-000001.seg"),
                server_a.join("wal-000002.seg"),
                server_b.join("wal-000001.seg"),
            ]
        );
    }

    #[test]
    fn test_discover_single_file() {
        let dir = tempdir().unwrap();
        let path = SegmentWriter::create(dir.path(), 7, 0).unwrap().seal().unwrap();
        assert_eq!(discover_segments(&path).unwrap(), vec![path.clone()]);
        assert_eq!(parse_segment_id(&path), Some(7));
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = tempdir().unwrap();
        assert!(discover_segments(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_parse_segment_id_rejects_other_names() {
        assert_eq!(parse_segment_id(Path::new("wal-abc.seg")), None);
        assert_eq!(parse_segment_id(Path::new("segment-000001.seg")), None);
    }
}
