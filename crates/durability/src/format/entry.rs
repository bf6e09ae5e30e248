//! Entry frame payload.
//!
//! ```text
//! ┌───────────────┬───────┬────────────────┬────────┬──────────────┬────────────────┬──────────────┐
//! │ Table len (2) │ Table │ Region len (2) │ Region │ Sequence (8) │ Write time (8) │ Body (rest)  │
//! └───────────────┴───────┴────────────────┴────────┴──────────────┴────────────────┴──────────────┘
//! ```
//!
//! The body is the edit encoding handled by [`crate::codec`].

use super::cursor::ByteCursor;
use walplayer_core::{EntryHeader, MalformedEdit};

/// Entry payload with the body left encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPayload<'a> {
    /// Decoded entry header
    pub header: EntryHeader,
    /// Encoded edit body
    pub body: &'a [u8],
}

/// Encode an entry header and pre-encoded body.
///
/// Table and region names longer than `u16::MAX` bytes are truncated.
pub fn encode_entry_payload(header: &EntryHeader, body: &[u8]) -> Vec<u8> {
    let table = clamp_u16(header.table.as_bytes());
    let region = clamp_u16(header.region.as_bytes());

    let mut bytes = Vec::with_capacity(2 + table.len() + 2 + region.len() + 16 + body.len());
    bytes.extend_from_slice(&(table.len() as u16).to_le_bytes());
    bytes.extend_from_slice(table);
    bytes.extend_from_slice(&(region.len() as u16).to_le_bytes());
    bytes.extend_from_slice(region);
    bytes.extend_from_slice(&header.sequence.to_le_bytes());
    bytes.extend_from_slice(&header.write_time.to_le_bytes());
    bytes.extend_from_slice(body);
    bytes
}

/// Decode an entry payload, leaving the body encoded.
pub fn decode_entry_payload(payload: &[u8]) -> Result<EntryPayload<'_>, MalformedEdit> {
    let mut cursor = ByteCursor::new(payload);
    let table = cursor.string_u16("table name")?;
    let region = cursor.string_u16("region name")?;
    let sequence = cursor.u64("sequence number")?;
    let write_time = cursor.i64("write time")?;
    let body = cursor.rest();

    Ok(EntryPayload {
        header: EntryHeader {
            table,
            region,
            sequence,
            write_time,
        },
        body,
    })
}

fn clamp_u16(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len().min(u16::MAX as usize)]
}
