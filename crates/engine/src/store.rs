//! Target store abstraction and an in-memory implementation.
//!
//! Replay writes through [`StoreClient`], a connection-like handle owned by a
//! single worker. [`MemoryStore`] keeps versioned cells with delete markers and
//! can be persisted as a JSON snapshot, which is what the CLI replays into.
//!
//! # Visibility
//!
//! A cell version is visible when its timestamp is greater than every delete
//! marker covering it: the row marker, the family marker and the column
//! marker. Deletes without a timestamp cover all versions.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by a target store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The target table does not exist
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// The request is not meaningful (for example a qualifier without a family)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The store is temporarily unable to serve requests
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot could not be encoded or decoded
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}

/// A visible cell returned by [`StoreClient::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Column family
    pub family: Vec<u8>,
    /// Column qualifier
    pub qualifier: Vec<u8>,
    /// Version timestamp
    pub timestamp: i64,
    /// Value
    pub value: Vec<u8>,
}

/// Newest visible version of every column of a row, ordered by column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowResult {
    cells: Vec<Cell>,
}

impl RowResult {
    /// Number of visible cells.
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no visible cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Value of a column, if visible.
    pub fn value(&self, family: &[u8], qualifier: &[u8]) -> Option<&[u8]> {
        self.cells
            .iter()
            .find(|c| c.family == family && c.qualifier == qualifier)
            .map(|c| c.value.as_slice())
    }

    /// All visible cells.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

/// Connection to the store replay writes into.
///
/// A client is owned by one worker at a time; implementations backed by a
/// shared store hand out one client per worker.
pub trait StoreClient: Send {
    /// Read the visible cells of a row.
    fn get(&self, table: &str, row: &[u8]) -> Result<RowResult, StoreError>;

    /// Write one cell version.
    fn put(
        &mut self,
        table: &str,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        value: &[u8],
        timestamp: i64,
    ) -> Result<(), StoreError>;

    /// Delete at row, family or column granularity.
    ///
    /// No family deletes the row, a family alone deletes the family, and both
    /// delete one column. A qualifier without a family is rejected. Versions
    /// at or before `timestamp` are removed; `None` removes all versions.
    fn delete(
        &mut self,
        table: &str,
        row: &[u8],
        family: Option<&[u8]>,
        qualifier: Option<&[u8]>,
        timestamp: Option<i64>,
    ) -> Result<(), StoreError>;
}

type ColumnKey = (Vec<u8>, Vec<u8>);

#[derive(Debug, Default)]
struct Row {
    versions: BTreeMap<ColumnKey, BTreeMap<i64, Vec<u8>>>,
    row_delete: Option<i64>,
    family_deletes: BTreeMap<Vec<u8>, i64>,
    column_deletes: BTreeMap<ColumnKey, i64>,
}

impl Row {
    /// Highest delete marker covering a column.
    fn mask(&self, column: &ColumnKey) -> Option<i64> {
        [
            self.row_delete,
            self.family_deletes.get(&column.0).copied(),
            self.column_deletes.get(column).copied(),
        ]
        .into_iter()
        .flatten()
        .max()
    }

    fn visible(&self) -> Vec<Cell> {
        self.versions
            .iter()
            .filter_map(|(column, versions)| {
                let mask = self.mask(column);
                versions
                    .iter()
                    .rev()
                    .find(|(ts, _)| mask.map_or(true, |m| **ts > m))
                    .map(|(ts, value)| Cell {
                        family: column.0.clone(),
                        qualifier: column.1.clone(),
                        timestamp: *ts,
                        value: value.clone(),
                    })
            })
            .collect()
    }

    fn put(&mut self, column: ColumnKey, timestamp: i64, value: Vec<u8>) {
        self.versions
            .entry(column)
            .or_default()
            .insert(timestamp, value);
    }

    fn delete(&mut self, family: Option<&[u8]>, qualifier: Option<&[u8]>, timestamp: i64) {
        match (family, qualifier) {
            (None, _) => raise(&mut self.row_delete, timestamp),
            (Some(family), None) => {
                let marker = self.family_deletes.entry(family.to_vec()).or_insert(timestamp);
                *marker = (*marker).max(timestamp);
            }
            (Some(family), Some(qualifier)) => {
                let marker = self
                    .column_deletes
                    .entry((family.to_vec(), qualifier.to_vec()))
                    .or_insert(timestamp);
                *marker = (*marker).max(timestamp);
            }
        }
        self.prune();
    }

    /// Drop versions hidden by a marker; they can never become visible again.
    fn prune(&mut self) {
        let masks: Vec<(ColumnKey, i64)> = self
            .versions
            .keys()
            .filter_map(|column| self.mask(column).map(|m| (column.clone(), m)))
            .collect();
        for (column, mask) in masks {
            if let Some(versions) = self.versions.get_mut(&column) {
                versions.retain(|ts, _| *ts > mask);
                if versions.is_empty() {
                    self.versions.remove(&column);
                }
            }
        }
    }
}

fn raise(marker: &mut Option<i64>, timestamp: i64) {
    *marker = Some(marker.map_or(timestamp, |m| m.max(timestamp)));
}

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<Vec<u8>, Row>,
}

/// Thread-safe in-memory store.
///
/// Clones share the same data, so each worker can own a clone as its client.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<FxHashMap<String, Table>>>,
}

impl MemoryStore {
    /// Create an empty store with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table if it does not already exist.
    ///
    /// Returns `true` if the table was created.
    pub fn create_table(&self, name: &str) -> bool {
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return false;
        }
        tables.insert(name.to_string(), Table::default());
        true
    }

    /// Whether a table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Row keys of a table that have at least one visible cell.
    pub fn visible_rows(&self, table: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let tables = self.tables.read();
        let table = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(table
            .rows
            .iter()
            .filter(|(_, row)| !row.visible().is_empty())
            .map(|(key, _)| key.clone())
            .collect())
    }

    /// Capture every table, including hidden versions and delete markers.
    pub fn snapshot(&self) -> StoreSnapshot {
        let guard = self.tables.read();
        let mut names: Vec<&String> = guard.keys().collect();
        names.sort();

        let tables = names
            .into_iter()
            .map(|name| {
                let table = &guard[name];
                let mut cells = Vec::new();
                let mut tombstones = Vec::new();
                for (row_key, row) in &table.rows {
                    for ((family, qualifier), versions) in &row.versions {
                        for (timestamp, value) in versions {
                            cells.push(SnapshotCell {
                                row: row_key.clone(),
                                family: family.clone(),
                                qualifier: qualifier.clone(),
                                timestamp: *timestamp,
                                value: value.clone(),
                            });
                        }
                    }
                    if let Some(timestamp) = row.row_delete {
                        tombstones.push(SnapshotTombstone {
                            row: row_key.clone(),
                            family: None,
                            qualifier: None,
                            timestamp,
                        });
                    }
                    for (family, timestamp) in &row.family_deletes {
                        tombstones.push(SnapshotTombstone {
                            row: row_key.clone(),
                            family: Some(family.clone()),
                            qualifier: None,
                            timestamp: *timestamp,
                        });
                    }
                    for ((family, qualifier), timestamp) in &row.column_deletes {
                        tombstones.push(SnapshotTombstone {
                            row: row_key.clone(),
                            family: Some(family.clone()),
                            qualifier: Some(qualifier.clone()),
                            timestamp: *timestamp,
                        });
                    }
                }
                TableSnapshot {
                    name: name.clone(),
                    cells,
                    tombstones,
                }
            })
            .collect();

        StoreSnapshot { tables }
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut tables = FxHashMap::default();
        for table_snapshot in snapshot.tables {
            let mut table = Table::default();
            for cell in table_snapshot.cells {
                table.rows.entry(cell.row).or_default().put(
                    (cell.family, cell.qualifier),
                    cell.timestamp,
                    cell.value,
                );
            }
            for tombstone in table_snapshot.tombstones {
                table.rows.entry(tombstone.row).or_default().delete(
                    tombstone.family.as_deref(),
                    tombstone.qualifier.as_deref(),
                    tombstone.timestamp,
                );
            }
            tables.insert(table_snapshot.name, table);
        }
        MemoryStore {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    /// Load a store from a JSON snapshot file.
    ///
    /// A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let snapshot: StoreSnapshot = serde_json::from_slice(&content)
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the store to a JSON snapshot file, replacing it atomically.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(&self.snapshot())
            .map_err(|e| StoreError::Snapshot(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl StoreClient for MemoryStore {
    fn get(&self, table: &str, row: &[u8]) -> Result<RowResult, StoreError> {
        let tables = self.tables.read();
        let table = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(RowResult {
            cells: table.rows.get(row).map(Row::visible).unwrap_or_default(),
        })
    }

    fn put(
        &mut self,
        table: &str,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        value: &[u8],
        timestamp: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        table.rows.entry(row.to_vec()).or_default().put(
            (family.to_vec(), qualifier.to_vec()),
            timestamp,
            value.to_vec(),
        );
        Ok(())
    }

    fn delete(
        &mut self,
        table: &str,
        row: &[u8],
        family: Option<&[u8]>,
        qualifier: Option<&[u8]>,
        timestamp: Option<i64>,
    ) -> Result<(), StoreError> {
        if family.is_none() && qualifier.is_some() {
            return Err(StoreError::InvalidRequest(
                "qualifier given without a family".to_string(),
            ));
        }
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        table.rows.entry(row.to_vec()).or_default().delete(
            family,
            qualifier,
            timestamp.unwrap_or(i64::MAX),
        );
        Ok(())
    }
}

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Tables in name order
    pub tables: Vec<TableSnapshot>,
}

/// Serialized table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Table name
    pub name: String,
    /// Every stored cell version
    #[serde(default)]
    pub cells: Vec<SnapshotCell>,
    /// Delete markers
    #[serde(default)]
    pub tombstones: Vec<SnapshotTombstone>,
}

/// Serialized cell version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCell {
    /// Row key
    pub row: Vec<u8>,
    /// Column family
    pub family: Vec<u8>,
    /// Column qualifier
    pub qualifier: Vec<u8>,
    /// Version timestamp
    pub timestamp: i64,
    /// Value
    pub value: Vec<u8>,
}

/// Serialized delete marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTombstone {
    /// Row key
    pub row: Vec<u8>,
    /// Family, absent for row deletes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<Vec<u8>>,
    /// Qualifier, present only for column deletes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<Vec<u8>>,
    /// Versions at or before this timestamp are deleted
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(table: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table(table);
        store
    }

    #[test]
    fn test_put_then_get() {
        let mut store = store_with("t");
        store.put("t", b"row", b"f", b"q", b"v1", 1).unwrap();
        store.put("t", b"row", b"f", b"q", b"v2", 2).unwrap();

        let result = store.get("t", b"row").unwrap();
        assert_eq!(result.size(), 1);
        assert_eq!(result.value(b"f", b"q"), Some(&b"v2"[..]));
        assert_eq!(result.cells()[0].timestamp, 2);
    }

    #[test]
    fn test_unknown_table() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.put("missing", b"r", b"f", b"q", b"v", 1),
            Err(StoreError::TableNotFound(_))
        ));
        assert!(matches!(
            store.get("missing", b"r"),
            Err(StoreError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_missing_row_is_empty() {
        let store = store_with("t");
        assert!(store.get("t", b"nothing").unwrap().is_empty());
    }

    #[test]
    fn test_column_delete_hides_older_versions_only() {
        let mut store = store_with("t");
        store.put("t", b"row", b"f", b"c1", b"old", 100).unwrap();
        store.put("t", b"row", b"f", b"c2", b"c2", 100).unwrap();
        store
            .delete("t", b"row", Some(b"f"), Some(b"c1"), Some(100))
            .unwrap();

        let result = store.get("t", b"row").unwrap();
        assert_eq!(result.size(), 1);
        assert_eq!(result.value(b"f", b"c2"), Some(&b"c2"[..]));

        // A newer version is visible past the marker
        store.put("t", b"row", b"f", b"c1", b"new", 101).unwrap();
        assert_eq!(
            store.get("t", b"row").unwrap().value(b"f", b"c1"),
            Some(&b"new"[..])
        );

        // An older version stays hidden
        store.put("t", b"row", b"f", b"c1", b"older", 50).unwrap();
        assert_eq!(
            store.get("t", b"row").unwrap().value(b"f", b"c1"),
            Some(&b"new"[..])
        );
    }

    #[test]
    fn test_family_and_row_deletes() {
        let mut store = store_with("t");
        store.put("t", b"row", b"a", b"q", b"1", 10).unwrap();
        store.put("t", b"row", b"b", b"q", b"2", 10).unwrap();

        store.delete("t", b"row", Some(b"a"), None, Some(10)).unwrap();
        let result = store.get("t", b"row").unwrap();
        assert_eq!(result.size(), 1);
        assert_eq!(result.value(b"b", b"q"), Some(&b"2"[..]));

        store.delete("t", b"row", None, None, None).unwrap();
        assert!(store.get("t", b"row").unwrap().is_empty());
        assert!(store.visible_rows("t").unwrap().is_empty());
    }

    #[test]
    fn test_qualifier_without_family_rejected() {
        let mut store = store_with("t");
        let err = store
            .delete("t", b"row", None, Some(b"q"), Some(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Unavailable("busy".into()).is_retryable());
        assert!(!StoreError::TableNotFound("t".into()).is_retryable());
    }

    #[test]
    fn test_clones_share_data() {
        let store = store_with("t");
        let mut client = store.clone();
        client.put("t", b"r", b"f", b"q", b"v", 1).unwrap();
        assert_eq!(store.get("t", b"r").unwrap().size(), 1);
        assert!(!store.create_table("t"));
        assert_eq!(store.table_names(), vec!["t".to_string()]);
    }

    #[test]
    fn test_snapshot_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut store = store_with("t");
        store.create_table("empty");
        store.put("t", b"r1", b"f", b"q", b"v", 5).unwrap();
        store.put("t", b"r1", b"f", b"gone", b"x", 5).unwrap();
        store
            .delete("t", b"r1", Some(b"f"), Some(b"gone"), Some(7))
            .unwrap();
        store.save(&path).unwrap();

        let loaded = MemoryStore::load(&path).unwrap();
        assert_eq!(loaded.table_names(), vec!["empty".to_string(), "t".to_string()]);
        assert_eq!(loaded.get("t", b"r1").unwrap(), store.get("t", b"r1").unwrap());
        assert_eq!(loaded.snapshot(), store.snapshot());

        // The marker survives: an old version written after reload stays hidden
        let mut loaded = loaded;
        loaded.put("t", b"r1", b"f", b"gone", b"y", 6).unwrap();
        assert_eq!(loaded.get("t", b"r1").unwrap().size(), 1);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::load(&dir.path().join("none.json")).unwrap();
        assert!(store.table_names().is_empty());
    }

    #[test]
    fn test_load_garbage_is_snapshot_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            MemoryStore::load(&path),
            Err(StoreError::Snapshot(_))
        ));
    }
}
