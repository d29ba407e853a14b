//! The declarative field model behind every event specification.
//!
//! Each event declares an ordered list of `(name, kind)` pairs. At startup
//! the catalog walks that list, assigns absolute byte offsets (counted from
//! the start of the frame, header included) and computes the minimum
//! payload size. The computed structure drives size validation, the
//! client-state position extraction, and the TypeScript export — the
//! encode/decode path itself is hand-written per event (see `payloads`).

use crate::ProtocolError;

/// Size of the frame header: sender id (u32) followed by event id (u32),
/// both big-endian.
pub const MESSAGE_HEADER_SIZE: u32 = 8;

/// The primitive kinds a payload field can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Raw UTF-8 bytes, no length prefix. Variable size: must be the last
    /// field and consumes the remainder of the frame.
    Str,
}

impl FieldKind {
    /// Serialized size in bytes, or `None` for variable-size kinds.
    pub fn byte_size(self) -> Option<u32> {
        match self {
            Self::Bool | Self::U8 | Self::I8 => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 | Self::I64 | Self::F64 => Some(8),
            Self::Str => None,
        }
    }

    /// The TypeScript type this kind maps to in the exported definitions.
    pub fn ts_type(self) -> &'static str {
        match self {
            Self::Bool => "boolean",
            Self::Str => "string",
            _ => "number",
        }
    }
}

/// A field of an event, with its computed placement inside the frame.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// The wire-facing field name (matches the client SDK's JSON keys).
    pub name: &'static str,
    pub kind: FieldKind,
    /// Serialized size; 0 means variable size.
    pub byte_size: u32,
    /// Absolute offset from the start of the frame, header included.
    pub offset: u32,
}

/// Walks an ordered `(name, kind)` list, assigning offsets and summing
/// fixed sizes into the event's minimum payload size (header excluded).
///
/// Fails if a variable-size field is anywhere but last, or if there is
/// more than one of them.
pub fn compute_structure(
    event_name: &str,
    fields: &[(&'static str, FieldKind)],
) -> Result<(u32, Vec<FieldSpec>), ProtocolError> {
    let mut computed = Vec::with_capacity(fields.len());
    let mut offset = MESSAGE_HEADER_SIZE;
    let mut min_size = 0u32;
    let mut saw_variable = false;

    for (index, (name, kind)) in fields.iter().enumerate() {
        let byte_size = match kind.byte_size() {
            Some(size) => size,
            None => {
                if saw_variable {
                    return Err(ProtocolError::SchemaMismatch(format!(
                        "event {event_name} has multiple variable-size fields"
                    )));
                }
                if index != fields.len() - 1 {
                    return Err(ProtocolError::SchemaMismatch(format!(
                        "event {event_name}: variable-size field {name} must be last"
                    )));
                }
                saw_variable = true;
                0
            }
        };

        computed.push(FieldSpec {
            name,
            kind: *kind,
            byte_size,
            offset,
        });
        offset += byte_size;
        min_size += byte_size;
    }

    Ok((min_size, computed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_structure_assigns_offsets_after_header() {
        let (min, fields) = compute_structure(
            "Test",
            &[("a", FieldKind::U32), ("b", FieldKind::U8), ("c", FieldKind::F64)],
        )
        .unwrap();

        assert_eq!(min, 13);
        assert_eq!(fields[0].offset, 8);
        assert_eq!(fields[1].offset, 12);
        assert_eq!(fields[2].offset, 13);
    }

    #[test]
    fn test_compute_structure_string_is_zero_sized() {
        let (min, fields) =
            compute_structure("Test", &[("id", FieldKind::U32), ("name", FieldKind::Str)])
                .unwrap();

        assert_eq!(min, 4);
        assert_eq!(fields[1].byte_size, 0);
        assert_eq!(fields[1].offset, 12);
    }

    #[test]
    fn test_compute_structure_all_fixed_kinds_sum() {
        let kinds = [
            FieldKind::U8,
            FieldKind::U16,
            FieldKind::U32,
            FieldKind::U64,
            FieldKind::I8,
            FieldKind::I16,
            FieldKind::I32,
            FieldKind::I64,
            FieldKind::F32,
            FieldKind::F64,
            FieldKind::Bool,
        ];
        let fields: Vec<(&'static str, FieldKind)> =
            kinds.iter().map(|k| ("f", *k)).collect();

        let (min, _) = compute_structure("Test", &fields).unwrap();
        assert_eq!(min, 1 + 2 + 4 + 8 + 1 + 2 + 4 + 8 + 4 + 8 + 1);
    }

    #[test]
    fn test_compute_structure_rejects_variable_field_not_last() {
        let result = compute_structure(
            "Test",
            &[("name", FieldKind::Str), ("id", FieldKind::U32)],
        );
        assert!(matches!(result, Err(ProtocolError::SchemaMismatch(_))));
    }

    #[test]
    fn test_compute_structure_rejects_two_variable_fields() {
        let result = compute_structure(
            "Test",
            &[("a", FieldKind::Str), ("b", FieldKind::Str)],
        );
        assert!(matches!(result, Err(ProtocolError::SchemaMismatch(_))));
    }

    #[test]
    fn test_compute_structure_empty_event() {
        let (min, fields) = compute_structure("Empty", &[]).unwrap();
        assert_eq!(min, 0);
        assert!(fields.is_empty());
    }
}
