//! Turning log entries into row mutations.

use rustc_hash::FxHashMap;
use walplayer_core::{CellEdit, CellOp, EditKind, LogEntry, Mutation};

/// Groups an entry's edits into one [`Mutation`] per row.
///
/// Rows appear in the order their first edit appears, and each mutation keeps
/// its row's edits in entry order. Edits in the log-internal meta family are
/// dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutationBuilder;

impl MutationBuilder {
    /// Create a builder.
    pub fn new() -> Self {
        MutationBuilder
    }

    /// Build mutations for `entry` against the `target` table.
    ///
    /// Returns an empty list when the entry has no replayable edits.
    pub fn build(&self, entry: &LogEntry, target: &str) -> Vec<Mutation> {
        let mut mutations: Vec<Mutation> = Vec::new();
        let mut rows: FxHashMap<&[u8], usize> = FxHashMap::default();

        for edit in entry.edits.iter().filter(|edit| !edit.is_meta()) {
            let slot = *rows.entry(edit.row.as_slice()).or_insert_with(|| {
                mutations.push(Mutation::new(target, edit.row.clone()));
                mutations.len() - 1
            });
            mutations[slot].ops.push(cell_op(edit));
        }

        mutations
    }
}

fn cell_op(edit: &CellEdit) -> CellOp {
    // Qualifier and value presence is enforced by the decoder
    let qualifier = || edit.qualifier.clone().unwrap_or_default();
    match edit.kind {
        EditKind::Put => CellOp::Put {
            family: edit.family.clone(),
            qualifier: qualifier(),
            timestamp: edit.timestamp,
            value: edit.value.clone().unwrap_or_default(),
        },
        EditKind::DeleteColumn => CellOp::DeleteColumn {
            family: edit.family.clone(),
            qualifier: qualifier(),
            timestamp: edit.timestamp,
        },
        EditKind::DeleteFamily => CellOp::DeleteFamily {
            family: edit.family.clone(),
            timestamp: edit.timestamp,
        },
        EditKind::DeleteRow => CellOp::DeleteRow {
            timestamp: edit.timestamp,
        },
    }
}
