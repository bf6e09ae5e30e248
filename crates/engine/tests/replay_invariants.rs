//! Replay invariants over whole jobs
//!
//! - Replaying the same segments twice leaves the same visible state
//! - A failed segment resumes after its last applied entry
//! - Per-row write order survives mapping and parallel workers

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walplayer_core::{CellEdit, LogEntry};
use walplayer_durability::{SegmentReader, SegmentWriter};
use walplayer_engine::{
    Checkpoint, MemoryStore, ReplayConfig, ReplayJob, ReplaySettings, SegmentState, StoreClient,
};

fn settings(tables: &[&str], mappings: &[&str], workers: usize) -> ReplaySettings {
    ReplaySettings {
        tables: tables.iter().map(|s| s.to_string()).collect(),
        table_mappings: mappings.iter().map(|s| s.to_string()).collect(),
        workers,
        retry_base_delay_ms: 0,
        retry_max_delay_ms: 0,
        ..ReplaySettings::default()
    }
}

fn config(tables: &[&str], mappings: &[&str], workers: usize) -> ReplayConfig {
    ReplayConfig::from_settings(&settings(tables, mappings, workers)).unwrap()
}

fn write_segment(dir: &Path, id: u64, entries: &[LogEntry]) -> PathBuf {
    let mut writer = SegmentWriter::create(dir, id, 0).unwrap();
    for entry in entries {
        writer.append(entry).unwrap();
    }
    writer.seal().unwrap()
}

/// Three versions of one column in a single row, then a delete of the oldest.
fn row_history(table: &str, row: &str, base: i64) -> Vec<LogEntry> {
    vec![
        LogEntry::new(table, "r1", 1, base, vec![CellEdit::put(row, "f", "q", base, "v1")]),
        LogEntry::new(
            table,
            "r1",
            2,
            base + 1,
            vec![
                CellEdit::put(row, "f", "q", base + 1, "v2"),
                CellEdit::put(row, "f", "other", base + 1, "x"),
            ],
        ),
        LogEntry::new(
            table,
            "r1",
            3,
            base + 2,
            vec![CellEdit::delete_column(row, "f", "other", base + 2)],
        ),
    ]
}

#[test]
fn replaying_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_segment(dir.path(), 1, &row_history("src", "row-a", 100));
    write_segment(dir.path(), 2, &row_history("src", "row-b", 200));

    let store = MemoryStore::new();
    store.create_table("dst");

    let run = || {
        ReplayJob::new(config(&["src"], &["dst"], 2), dir.path())
            .run(|| store.clone())
            .unwrap()
    };

    assert!(run().is_success());
    let first = store.snapshot();
    assert!(run().is_success());
    assert_eq!(store.snapshot(), first);

    let row = store.get("dst", b"row-a").unwrap();
    assert_eq!(row.size(), 1);
    assert_eq!(row.value(b"f", b"q"), Some(&b"v2"[..]));
}

#[test]
fn failed_segment_resumes_after_last_applied_entry() {
    let dir = TempDir::new().unwrap();
    let wal = dir.path().join("wal");
    let checkpoint_path = dir.path().join("checkpoint.json");

    let path = write_segment(&wal, 1, &row_history("src", "row-a", 100));
    let pristine = fs::read(&path).unwrap();
    let offsets: Vec<u64> = SegmentReader::open(&path)
        .unwrap()
        .map(|item| item.unwrap().position.offset)
        .collect();

    // Damage the third frame so the first run stops there
    let mut damaged = pristine.clone();
    damaged[offsets[2] as usize + 6] ^= 0xFF;
    fs::write(&path, &damaged).unwrap();

    let store = MemoryStore::new();
    store.create_table("src");

    let first = ReplayJob::new(config(&["src"], &[], 1), &wal)
        .with_checkpoint(&checkpoint_path)
        .run(|| store.clone())
        .unwrap();
    assert!(!first.is_success());
    let report = &first.reports[0];
    assert_eq!(report.state, SegmentState::Failed);
    assert_eq!(report.counts.replayed, 2);
    assert_eq!(report.resume_offset, offsets[2]);

    let checkpoint = Checkpoint::load(&checkpoint_path).unwrap();
    assert_eq!(checkpoint.resume_offset(&path), Some(offsets[2]));
    assert!(!checkpoint.is_complete(&path));

    // Repair the segment; only the remaining entry is replayed
    fs::write(&path, &pristine).unwrap();
    let second = ReplayJob::new(config(&["src"], &[], 1), &wal)
        .with_checkpoint(&checkpoint_path)
        .run(|| store.clone())
        .unwrap();
    assert!(second.is_success());
    assert_eq!(second.totals().entries_read, 1);
    assert!(Checkpoint::load(&checkpoint_path).unwrap().is_complete(&path));

    let row = store.get("src", b"row-a").unwrap();
    assert_eq!(row.value(b"f", b"other"), None);
    assert_eq!(row.value(b"f", b"q"), Some(&b"v2"[..]));

    // A third run finds nothing left to do
    let third = ReplayJob::new(config(&["src"], &[], 1), &wal)
        .with_checkpoint(&checkpoint_path)
        .run(|| store.clone())
        .unwrap();
    assert!(third.reports.is_empty());
    assert_eq!(third.already_complete, vec![path]);
}

#[test]
fn per_row_order_survives_workers_and_mapping() {
    let dir = TempDir::new().unwrap();

    // Each segment owns its own rows; within a segment later writes win
    for id in 1..=6u64 {
        let row = format!("row-{}", id);
        let base = id as i64 * 1_000;
        let mut entries = row_history("a", &row, base);
        entries.extend(row_history("b", &row, base));
        entries.push(LogEntry::new(
            "ignored",
            "r1",
            9,
            base,
            vec![CellEdit::put(row.as_str(), "f", "q", base, "nope")],
        ));
        write_segment(dir.path(), id, &entries);
    }

    let store = MemoryStore::new();
    store.create_table("a2");
    store.create_table("b2");
    store.create_table("ignored");

    let summary = ReplayJob::new(config(&["a", "b"], &["a2", "b2"], 4), dir.path())
        .run(|| store.clone())
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.totals().filtered_unmapped, 6);
    for table in ["a2", "b2"] {
        for id in 1..=6 {
            let row = store.get(table, format!("row-{}", id).as_bytes()).unwrap();
            assert_eq!(row.value(b"f", b"q"), Some(&b"v2"[..]), "{} row-{}", table, id);
            assert_eq!(row.value(b"f", b"other"), None);
        }
    }
    assert!(store.visible_rows("ignored").unwrap().is_empty());
}

#[test]
fn damaged_length_in_sealed_segment_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let entries: Vec<LogEntry> = (1..=5)
        .map(|seq| {
            let row = format!("row-{}", seq);
            LogEntry::new("src", "r1", seq, 100, vec![CellEdit::put(row.as_str(), "f", "q", 100, "v")])
        })
        .collect();
    let path = write_segment(dir.path(), 1, &entries);
    let offsets: Vec<u64> = SegmentReader::open(&path)
        .unwrap()
        .map(|item| item.unwrap().position.offset)
        .collect();

    let mut bytes = fs::read(&path).unwrap();
    bytes[offsets[1] as usize + 1] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let store = MemoryStore::new();
    store.create_table("src");
    let summary = ReplayJob::new(config(&["src"], &[], 1), dir.path())
        .run(|| store.clone())
        .unwrap();

    assert!(!summary.is_success());
    let report = &summary.reports[0];
    assert_eq!(report.state, SegmentState::Failed);
    assert!(!report.sealed);
    assert_eq!(report.counts.replayed, 1);
    assert_eq!(report.resume_offset, offsets[1]);
    assert!(report.error.is_some());
}
