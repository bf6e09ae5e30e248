//! End-to-end replay: write segments, replay them into renamed tables, and
//! check what the target store ends up holding.

use std::path::Path;
use tempfile::TempDir;
use walplayer::{
    parse_time, setup_time, CellEdit, LogEntry, MemoryStore, Properties, ReplayConfig,
    ReplayError, ReplayJob, ReplaySettings, SegmentWriter, StoreClient, END_TIME_KEY,
    START_TIME_KEY,
};

const TABLE1: &str = "testWALPlayer1";
const TABLE2: &str = "testWALPlayer2";
const FAMILY: &str = "family";
const ROW: &str = "row";

fn settings(tables: &[&str], mappings: &[&str]) -> ReplaySettings {
    ReplaySettings {
        tables: tables.iter().map(|s| s.to_string()).collect(),
        table_mappings: mappings.iter().map(|s| s.to_string()).collect(),
        retry_base_delay_ms: 0,
        retry_max_delay_ms: 0,
        ..ReplaySettings::default()
    }
}

fn write_segment(dir: &Path, id: u64, entries: &[LogEntry]) {
    let mut writer = SegmentWriter::create(dir, id, 0).unwrap();
    for entry in entries {
        writer.append(entry).unwrap();
    }
    writer.seal().unwrap();
}

/// Logged writes to table 1: put c1, put c2, then delete c1.
fn table1_history(now: i64) -> Vec<LogEntry> {
    vec![
        LogEntry::new(TABLE1, "region", 1, now, vec![CellEdit::put(ROW, FAMILY, "c1", now, "c1")]),
        LogEntry::new(TABLE1, "region", 2, now, vec![CellEdit::put(ROW, FAMILY, "c2", now, "c2")]),
        LogEntry::new(
            TABLE1,
            "region",
            3,
            now,
            vec![CellEdit::delete_column(ROW, FAMILY, "c1", now)],
        ),
    ]
}

#[test]
fn replay_into_mapped_table() {
    let dir = TempDir::new().unwrap();
    let now = chrono::Utc::now().timestamp_millis();
    write_segment(dir.path(), 1, &table1_history(now));

    let store = MemoryStore::new();
    store.create_table(TABLE1);
    store.create_table(TABLE2);

    let config = ReplayConfig::from_settings(&settings(&[TABLE1], &[TABLE2])).unwrap();
    let summary = ReplayJob::new(config, dir.path())
        .run(|| store.clone())
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.totals().replayed, 3);

    let row = store.get(TABLE2, ROW.as_bytes()).unwrap();
    assert_eq!(row.size(), 1);
    assert_eq!(row.value(FAMILY.as_bytes(), b"c2"), Some(&b"c2"[..]));
    assert_eq!(row.value(FAMILY.as_bytes(), b"c1"), None);

    // Nothing is written back to the source table
    assert!(store.get(TABLE1, ROW.as_bytes()).unwrap().is_empty());
}

#[test]
fn replay_respects_time_window() {
    let dir = TempDir::new().unwrap();
    write_segment(
        dir.path(),
        1,
        &[
            LogEntry::new(TABLE1, "region", 1, 1_000, vec![CellEdit::put("early", FAMILY, "q", 1_000, "v")]),
            LogEntry::new(TABLE1, "region", 2, 2_000, vec![CellEdit::put("inside", FAMILY, "q", 2_000, "v")]),
            LogEntry::new(TABLE1, "region", 3, 3_000, vec![CellEdit::put("late", FAMILY, "q", 3_000, "v")]),
        ],
    );

    let store = MemoryStore::new();
    store.create_table(TABLE1);

    let mut settings = settings(&[TABLE1], &[]);
    settings.start_time = Some("2000".to_string());
    settings.end_time = Some("3000".to_string());
    let config = ReplayConfig::from_settings(&settings).unwrap();
    let summary = ReplayJob::new(config, dir.path())
        .run(|| store.clone())
        .unwrap();

    assert_eq!(summary.totals().filtered_window, 2);
    assert_eq!(store.visible_rows(TABLE1).unwrap(), vec![b"inside".to_vec()]);
}

#[test]
fn replay_across_segments_and_workers() {
    let dir = TempDir::new().unwrap();
    for id in 1..=4u64 {
        let row = format!("row{}", id);
        write_segment(
            dir.path(),
            id,
            &[LogEntry::new(
                TABLE1,
                "region",
                id,
                10,
                vec![CellEdit::put(row, FAMILY, "q", 10, "v")],
            )],
        );
    }

    let store = MemoryStore::new();
    store.create_table(TABLE2);
    let mut settings = settings(&[TABLE1], &[TABLE2]);
    settings.workers = 3;
    let config = ReplayConfig::from_settings(&settings).unwrap();
    let summary = ReplayJob::new(config, dir.path())
        .run(|| store.clone())
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.reports.len(), 4);
    assert_eq!(store.visible_rows(TABLE2).unwrap().len(), 4);
}

#[test]
fn mismatched_mapping_fails_before_replay() {
    let err = ReplayConfig::from_settings(&settings(&["a", "b"], &["x"])).unwrap_err();
    assert!(matches!(err, ReplayError::MappingArity { .. }));
    assert!(err.is_configuration());
}

#[test]
fn time_format() {
    let tz = "America/Los_Angeles".parse().unwrap();
    let mut properties = Properties::new();

    properties.insert(END_TIME_KEY.to_string(), "2012-4-10T14:21:01.01".to_string());
    setup_time(&mut properties, END_TIME_KEY, tz).unwrap();
    assert_eq!(properties[END_TIME_KEY], "1334092861001");

    properties.insert(END_TIME_KEY.to_string(), "1334092861010".to_string());
    setup_time(&mut properties, END_TIME_KEY, tz).unwrap();
    assert_eq!(properties[END_TIME_KEY], "1334092861010");

    // An absent key stays absent
    setup_time(&mut properties, START_TIME_KEY, tz).unwrap();
    assert!(!properties.contains_key(START_TIME_KEY));

    assert!(matches!(
        parse_time(END_TIME_KEY, "not a time", tz),
        Err(ReplayError::InvalidTimeConfiguration { .. })
    ));
}
