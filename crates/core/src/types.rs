//! Log and mutation data model.
//!
//! Log-side types (`CellEdit`, `LogEntry`) are read-only once decoded. The
//! replay side (`CellOp`, `Mutation`) is built fresh per entry and consumed
//! exactly once by the applier.

use std::fmt;

/// Column family reserved for log-internal marker edits.
///
/// Edits in this family describe log bookkeeping (region open/close, flush
/// markers) and never carry user data, so they are not replayed.
pub const META_FAMILY: &[u8] = b"METAFAMILY";

/// Kind of a cell edit.
///
/// The tag values are part of the on-disk edit encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    /// Write a value to one column at a timestamp
    Put,
    /// Delete all versions of one column at or before a timestamp
    DeleteColumn,
    /// Delete all columns of a family at or before a timestamp
    DeleteFamily,
    /// Delete every cell of the row at or before a timestamp
    DeleteRow,
}

impl EditKind {
    /// Encoded tag byte.
    pub fn tag(self) -> u8 {
        match self {
            EditKind::Put => 0x01,
            EditKind::DeleteColumn => 0x02,
            EditKind::DeleteFamily => 0x03,
            EditKind::DeleteRow => 0x04,
        }
    }

    /// Decode a tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(EditKind::Put),
            0x02 => Some(EditKind::DeleteColumn),
            0x03 => Some(EditKind::DeleteFamily),
            0x04 => Some(EditKind::DeleteRow),
            _ => None,
        }
    }

    /// Whether the edit addresses a single column and so needs a qualifier.
    pub fn requires_qualifier(self) -> bool {
        matches!(self, EditKind::Put | EditKind::DeleteColumn)
    }

    /// Whether the edit is any of the delete kinds.
    pub fn is_delete(self) -> bool {
        !matches!(self, EditKind::Put)
    }
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditKind::Put => "Put",
            EditKind::DeleteColumn => "DeleteColumn",
            EditKind::DeleteFamily => "DeleteFamily",
            EditKind::DeleteRow => "DeleteRow",
        };
        f.write_str(name)
    }
}

/// A single cell-level edit recorded in a log entry.
///
/// `qualifier` is absent for family and row deletes; `value` is present only
/// for puts. The decoder enforces both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEdit {
    /// Row key
    pub row: Vec<u8>,
    /// Column family
    pub family: Vec<u8>,
    /// Column qualifier
    pub qualifier: Option<Vec<u8>>,
    /// Cell timestamp (milliseconds since epoch)
    pub timestamp: i64,
    /// Edit kind
    pub kind: EditKind,
    /// Cell value (puts only)
    pub value: Option<Vec<u8>>,
}

impl CellEdit {
    /// Create a put edit.
    pub fn put(
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        CellEdit {
            row: row.into(),
            family: family.into(),
            qualifier: Some(qualifier.into()),
            timestamp,
            kind: EditKind::Put,
            value: Some(value.into()),
        }
    }

    /// Create a delete of every version of one column.
    pub fn delete_column(
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
    ) -> Self {
        CellEdit {
            row: row.into(),
            family: family.into(),
            qualifier: Some(qualifier.into()),
            timestamp,
            kind: EditKind::DeleteColumn,
            value: None,
        }
    }

    /// Create a delete of a whole family.
    pub fn delete_family(
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        timestamp: i64,
    ) -> Self {
        CellEdit {
            row: row.into(),
            family: family.into(),
            qualifier: None,
            timestamp,
            kind: EditKind::DeleteFamily,
            value: None,
        }
    }

    /// Create a delete of a whole row.
    ///
    /// The family is left empty; row deletes span every family.
    pub fn delete_row(row: impl Into<Vec<u8>>, timestamp: i64) -> Self {
        CellEdit {
            row: row.into(),
            family: Vec::new(),
            qualifier: None,
            timestamp,
            kind: EditKind::DeleteRow,
            value: None,
        }
    }

    /// Whether this edit is a log-internal marker.
    pub fn is_meta(&self) -> bool {
        self.family == META_FAMILY
    }
}

/// Header of a log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Table the entry was written to
    pub table: String,
    /// Region that logged the entry
    pub region: String,
    /// Log sequence number assigned by the region
    pub sequence: u64,
    /// Time the entry was logged (milliseconds since epoch)
    pub write_time: i64,
}

/// One logged write: a header and its ordered edits.
///
/// Edit order reflects the original write order and is never changed by
/// replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Entry header
    pub header: EntryHeader,
    /// Edits in write order
    pub edits: Vec<CellEdit>,
}

impl LogEntry {
    /// Create an entry.
    pub fn new(
        table: impl Into<String>,
        region: impl Into<String>,
        sequence: u64,
        write_time: i64,
        edits: Vec<CellEdit>,
    ) -> Self {
        LogEntry {
            header: EntryHeader {
                table: table.into(),
                region: region.into(),
                sequence,
                write_time,
            },
            edits,
        }
    }

    /// Source table name.
    pub fn table(&self) -> &str {
        &self.header.table
    }

    /// Write timestamp (milliseconds since epoch).
    pub fn write_time(&self) -> i64 {
        self.header.write_time
    }
}

/// A single operation within a row mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellOp {
    /// Write a value
    Put {
        /// Column family
        family: Vec<u8>,
        /// Column qualifier
        qualifier: Vec<u8>,
        /// Cell timestamp
        timestamp: i64,
        /// Cell value
        value: Vec<u8>,
    },
    /// Delete all versions of a column at or before `timestamp`
    DeleteColumn {
        /// Column family
        family: Vec<u8>,
        /// Column qualifier
        qualifier: Vec<u8>,
        /// Delete timestamp
        timestamp: i64,
    },
    /// Delete a family at or before `timestamp`
    DeleteFamily {
        /// Column family
        family: Vec<u8>,
        /// Delete timestamp
        timestamp: i64,
    },
    /// Delete the row at or before `timestamp`
    DeleteRow {
        /// Delete timestamp
        timestamp: i64,
    },
}

impl CellOp {
    /// Timestamp carried by the operation.
    pub fn timestamp(&self) -> i64 {
        match self {
            CellOp::Put { timestamp, .. }
            | CellOp::DeleteColumn { timestamp, .. }
            | CellOp::DeleteFamily { timestamp, .. }
            | CellOp::DeleteRow { timestamp } => *timestamp,
        }
    }

    /// Whether the operation is a delete.
    pub fn is_delete(&self) -> bool {
        !matches!(self, CellOp::Put { .. })
    }
}

/// Row-scoped batch of operations for one target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Target table
    pub table: String,
    /// Row key
    pub row: Vec<u8>,
    /// Operations in entry order
    pub ops: Vec<CellOp>,
}

impl Mutation {
    /// Create an empty mutation for a row.
    pub fn new(table: impl Into<String>, row: impl Into<Vec<u8>>) -> Self {
        Mutation {
            table: table.into(),
            row: row.into(),
            ops: Vec::new(),
        }
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the mutation carries no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of put operations.
    pub fn put_count(&self) -> usize {
        self.ops.iter().filter(|op| !op.is_delete()).count()
    }

    /// Number of delete operations.
    pub fn delete_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_delete()).count()
    }
}
