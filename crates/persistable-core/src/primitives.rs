//! # Format Primitives
//!
//! Fixed constants of the binary format and of the readers.
//!
//! These values are part of the byte layout shared with generated MATLAB
//! code; changing any of them breaks files already on disk.

/// Magic number at offset 0 of every binary file.
///
/// Written as a native-order int32, like every other integer in the file.
pub const MAGIC: i32 = 0x5053_5431; // "PST1"

/// First tag handed out to composite types. Tags below it are intrinsic.
pub const FIRST_COMPOSITE_TAG: i32 = 12;

// =============================================================================
// EMPTY SENTINELS
// =============================================================================
//
// There is no null marker in the stream. An absent primitive wrapper is
// written as the sentinel of its kind and a sentinel read back is reported
// as absent, whatever value produced it.

/// Sentinel for an absent `boolean` (any byte other than 0 or 1).
pub const EMPTY_BOOLEAN: u8 = 2;

/// Sentinel for an absent `byte`.
pub const EMPTY_BYTE: i8 = -1;

/// Sentinel for an absent `short`.
pub const EMPTY_SHORT: i16 = -1;

/// Sentinel for an absent `char` (`-1` as an unsigned byte).
pub const EMPTY_CHAR: u8 = 0xFF;

/// Sentinel for an absent `int`.
pub const EMPTY_INT: i32 = i32::MAX;

/// Sentinel for an absent `long`.
pub const EMPTY_LONG: i64 = i64::MAX;

/// Sentinel for an absent `float`.
pub const EMPTY_FLOAT: f32 = f32::MAX;

/// Sentinel for an absent `double`.
pub const EMPTY_DOUBLE: f64 = f64::MAX;

// =============================================================================
// DECODE LIMITS
// =============================================================================

/// Maximum number of composite types accepted in a dictionary section.
pub const MAX_DICTIONARY_TYPES: usize = 65_536;

/// Maximum number of fields accepted per composite type.
pub const MAX_FIELDS_PER_TYPE: usize = 4_096;

/// Maximum array dimensionality accepted by the readers and generators.
pub const MAX_ARRAY_DIMENSIONS: u32 = 16;

/// Maximum nesting depth of composites and arrays while decoding.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Maximum element count of an array whose elements encode to zero bytes
/// (composites without primitive or array fields).
///
/// Every other array count is bounded by the bytes left in the input; these
/// are not, so a few header bytes could otherwise demand billions of records.
pub const MAX_FIELDLESS_ELEMENTS: usize = 65_536;

/// Synthetic field name holding the inner dimension of multi-dimensional
/// arrays in container output and generated code.
pub const NESTED_ARRAY_FIELD: &str = "array";

/// Name of the synthetic root struct of container output.
pub const CONTAINER_ROOT_NAME: &str = "s";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_sentinel_is_not_a_boolean() {
        assert!(EMPTY_BOOLEAN > 1);
    }

    #[test]
    fn char_sentinel_matches_minus_one() {
        assert_eq!(EMPTY_CHAR, (-1i8) as u8);
    }
}
