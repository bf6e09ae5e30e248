//! Core types for walplayer
//!
//! This crate defines the foundational types shared by the log reader and the
//! replay engine:
//! - EditKind / CellEdit: a single cell-level edit recorded in the log
//! - EntryHeader / LogEntry: one logged write with its ordered edits
//! - CellOp / Mutation: row-scoped operations issued against a target store
//! - ReplayError: the error taxonomy shared by every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{MalformedEdit, ReplayError, Result};
pub use types::{CellEdit, CellOp, EditKind, EntryHeader, LogEntry, Mutation, META_FAMILY};
