//! Edit body encoding.
//!
//! An entry body is the ordered list of cell edits written by one logged
//! operation.
//!
//! # Format
//!
//! ```text
//! Body Layout:
//! ┌──────────────────┬──────────────────────────────────────────────┐
//! │ Count (4 bytes)  │ Edits (variable)                             │
//! └──────────────────┴──────────────────────────────────────────────┘
//!
//! Edit Layout:
//! ┌──────────┬─────────────┬───────────────┬─────────────────────────────────┬───────────────┬────────────────────────┐
//! │ Kind (1) │ Row (4 + n) │ Family (4 + n)│ Qualifier flag (1) [+ 4 + n]    │ Timestamp (8) │ Value (4 + n, Put only)│
//! └──────────┴─────────────┴───────────────┴─────────────────────────────────┴───────────────┴────────────────────────┘
//! ```
//!
//! All integers are little-endian. Decoding is a pure function of the input
//! bytes; any inconsistency yields [`MalformedEdit`].

use crate::format::cursor::ByteCursor;
use walplayer_core::{CellEdit, EditKind, MalformedEdit};

/// Smallest possible encoded edit: kind + two empty lengths + flag + timestamp.
const MIN_EDIT_LEN: usize = 1 + 4 + 4 + 1 + 8;

/// Decode an entry body into its ordered edits.
pub fn decode_edits(bytes: &[u8]) -> Result<Vec<CellEdit>, MalformedEdit> {
    let mut cursor = ByteCursor::new(bytes);
    let count = cursor.u32("edit count")? as usize;

    // A corrupt count must not drive a huge allocation
    let mut edits = Vec::with_capacity(count.min(cursor.remaining() / MIN_EDIT_LEN));
    for index in 0..count {
        edits.push(decode_edit(&mut cursor, index)?);
    }

    if cursor.remaining() > 0 {
        return Err(MalformedEdit::TrailingBytes(cursor.remaining()));
    }

    Ok(edits)
}

/// Encode edits into an entry body.
pub fn encode_edits(edits: &[CellEdit]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(edits.len() as u32).to_le_bytes());

    for edit in edits {
        bytes.push(edit.kind.tag());
        write_bytes(&mut bytes, &edit.row);
        write_bytes(&mut bytes, &edit.family);
        match &edit.qualifier {
            Some(qualifier) => {
                bytes.push(1);
                write_bytes(&mut bytes, qualifier);
            }
            None => bytes.push(0),
        }
        bytes.extend_from_slice(&edit.timestamp.to_le_bytes());
        if edit.kind == EditKind::Put {
            write_bytes(&mut bytes, edit.value.as_deref().unwrap_or_default());
        }
    }

    bytes
}

fn decode_edit(cursor: &mut ByteCursor<'_>, index: usize) -> Result<CellEdit, MalformedEdit> {
    let tag = cursor.u8("edit kind")?;
    let kind = EditKind::from_tag(tag).ok_or(MalformedEdit::UnknownKind(tag))?;

    let row = cursor.bytes_u32("row")?;
    let family = cursor.bytes_u32("family")?;
    let qualifier = match cursor.u8("qualifier flag")? {
        0 => None,
        1 => Some(cursor.bytes_u32("qualifier")?),
        flag => {
            return Err(MalformedEdit::InvalidFlag {
                field: "qualifier",
                flag,
            })
        }
    };
    if kind.requires_qualifier() && qualifier.is_none() {
        return Err(MalformedEdit::MissingQualifier {
            index,
            kind: match kind {
                EditKind::Put => "Put",
                _ => "DeleteColumn",
            },
        });
    }

    let timestamp = cursor.i64("timestamp")?;
    let value = match kind {
        EditKind::Put => Some(cursor.bytes_u32("value")?),
        EditKind::DeleteColumn | EditKind::DeleteFamily | EditKind::DeleteRow => None,
    };

    Ok(CellEdit {
        row,
        family,
        qualifier,
        timestamp,
        kind,
        value,
    })
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_edits() -> Vec<CellEdit> {
        vec![
            CellEdit::put("row", "family", "c1", 100, "c1"),
            CellEdit::put("row", "family", "c2", 100, "c2"),
            CellEdit::delete_column("row", "family", "c1", 101),
            CellEdit::delete_family("row2", "family", 102),
            CellEdit::delete_row("row3", 103),
        ]
    }

    #[test]
    fn test_decode_preserves_order_and_kinds() {
        let edits = sample_edits();
        let decoded = decode_edits(&encode_edits(&edits)).unwrap();
        assert_eq!(decoded, edits);
    }

    #[test]
    fn test_empty_body() {
        let decoded = decode_edits(&encode_edits(&[])).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_missing_count_is_malformed() {
        assert!(matches!(
            decode_edits(&[1, 0]),
            Err(MalformedEdit::Truncated {
                field: "edit count",
                ..
            })
        ));
    }

    #[test]
    fn test_count_larger_than_body() {
        let mut bytes = encode_edits(&sample_edits()[..1]);
        bytes[0] = 2;
        assert!(matches!(
            decode_edits(&bytes),
            Err(MalformedEdit::Truncated {
                field: "edit kind",
                ..
            })
        ));
    }

    #[test]
    fn test_huge_count_does_not_allocate() {
        let bytes = u32::MAX.to_le_bytes();
        assert!(decode_edits(&bytes).is_err());
    }

    #[test]
    fn test_unknown_kind_tag() {
        let mut bytes = encode_edits(&sample_edits()[..1]);
        bytes[4] = 0x42;
        assert_eq!(decode_edits(&bytes), Err(MalformedEdit::UnknownKind(0x42)));
    }

    #[test]
    fn test_value_length_overruns_body() {
        let mut bytes = encode_edits(&sample_edits()[..1]);
        // The value length is the 4 bytes before the trailing 2-byte value
        let len_at = bytes.len() - 6;
        bytes[len_at..len_at + 4].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            decode_edits(&bytes),
            Err(MalformedEdit::Truncated { field: "value", .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode_edits(&sample_edits());
        bytes.push(0);
        assert_eq!(decode_edits(&bytes), Err(MalformedEdit::TrailingBytes(1)));
    }

    #[test]
    fn test_put_without_qualifier_rejected() {
        let mut edit = CellEdit::put("row", "f", "q", 1, "v");
        edit.qualifier = None;
        let bytes = encode_edits(&[edit]);
        assert_eq!(
            decode_edits(&bytes),
            Err(MalformedEdit::MissingQualifier {
                index: 0,
                kind: "Put"
            })
        );
    }

    #[test]
    fn test_invalid_qualifier_flag() {
        let mut bytes = encode_edits(&[CellEdit::delete_row("r", 1)]);
        // kind(1) + row(4+1) + family(4+0) puts the flag at offset 4 + 10
        bytes[14] = 7;
        assert_eq!(
            decode_edits(&bytes),
            Err(MalformedEdit::InvalidFlag {
                field: "qualifier",
                flag: 7
            })
        );
    }
}
