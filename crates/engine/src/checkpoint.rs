//! Replay progress checkpoint.
//!
//! A checkpoint records, per segment path, the offset just past the last fully
//! processed entry and whether the segment was replayed through its trailer.
//! A later run skips completed segments and resumes the rest at their offset.
//! The file is JSON, replaced with write-fsync-rename.

use crate::engine::SegmentReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walplayer_core::{ReplayError, Result};
use walplayer_durability::SEGMENT_HEADER_SIZE;

/// Progress of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentProgress {
    /// Offset to resume from
    pub offset: u64,
    /// Replayed through a valid trailer; nothing left to do
    pub complete: bool,
}

/// Per-segment replay progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    segments: BTreeMap<String, SegmentProgress>,
}

impl Checkpoint {
    /// Create an empty checkpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a checkpoint file.
    ///
    /// A missing file yields an empty checkpoint.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                ReplayError::config(format!(
                    "Failed to parse checkpoint '{}': {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the checkpoint using write-fsync-rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let temp_path = path.with_extension("tmp");

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, path)?;

        if let Some(parent) = path.parent() {
            if parent.exists() && !parent.as_os_str().is_empty() {
                File::open(parent)?.sync_all()?;
            }
        }
        Ok(())
    }

    /// Recorded progress for a segment.
    pub fn progress(&self, segment: &Path) -> Option<SegmentProgress> {
        self.segments.get(&key(segment)).copied()
    }

    /// Offset to start a segment from, or `None` if it is complete.
    pub fn resume_offset(&self, segment: &Path) -> Option<u64> {
        match self.progress(segment) {
            Some(progress) if progress.complete => None,
            Some(progress) => Some(progress.offset),
            None => Some(SEGMENT_HEADER_SIZE as u64),
        }
    }

    /// Whether a segment needs no further replay.
    pub fn is_complete(&self, segment: &Path) -> bool {
        self.progress(segment).map_or(false, |p| p.complete)
    }

    /// Record the outcome of a segment replay.
    ///
    /// Only sealed segments replayed to the end are complete; an unsealed
    /// segment may still grow, so it resumes at its last offset next time.
    pub fn record(&mut self, report: &SegmentReport) {
        self.segments.insert(
            key(&report.path),
            SegmentProgress {
                offset: report.resume_offset,
                complete: report.is_success() && report.sealed,
            },
        );
    }

    /// Number of segments tracked.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether no segments are tracked.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Tracked segment paths.
    pub fn segments(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.segments.keys().map(PathBuf::from)
    }
}

/// Segments are keyed by canonical path so relative and absolute spellings
/// of the same input share progress. Paths that cannot be resolved (the
/// segment was removed) keep their given form.
fn key(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
