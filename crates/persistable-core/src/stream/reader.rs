//! # Binary Reader
//!
//! Decodes files produced by the stream writer using nothing but the
//! embedded dictionary. No schema is needed: the dictionary names every
//! composite and lists its fields with their tags and dimensionality.
//!
//! Sentinels in scalar fields decode to [`Value::Null`]; this is lossy for
//! real values that happen to equal the sentinel of their kind.

use crate::dictionary::{Dictionary, TypeDescriptor};
use crate::primitives::{
    EMPTY_BOOLEAN, EMPTY_BYTE, EMPTY_CHAR, EMPTY_DOUBLE, EMPTY_FLOAT, EMPTY_INT, EMPTY_LONG, EMPTY_SHORT, MAGIC,
    MAX_FIELDLESS_ELEMENTS, MAX_NESTING_DEPTH,
};
use crate::stream::wire::WireReader;
use crate::value::{Record, Value, parse_date};
use crate::{PersistError, PrimitiveKind, TypeTag};
use std::collections::BTreeMap;

/// Result of decoding one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The embedded dictionary.
    pub dictionary: Dictionary,
    /// The top-level object, always a `Value::Record`.
    pub root: Value,
}

impl Decoded {
    /// The top-level record.
    #[must_use]
    pub fn root_record(&self) -> Option<&Record> {
        match &self.root {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }
}

/// Self-describing decoder.
pub struct BinaryReader<'a> {
    input: WireReader<'a>,
    dictionary: Dictionary,
    /// Smallest encoded size of one value of each composite.
    widths: BTreeMap<TypeTag, usize>,
}

impl<'a> BinaryReader<'a> {
    /// Decode a complete file image.
    pub fn read(bytes: &'a [u8]) -> Result<Decoded, PersistError> {
        let mut input = WireReader::new(bytes);
        let magic = input.read_i32()?;
        if magic != MAGIC {
            return Err(PersistError::Serialization(format!(
                "bad magic number {:#010x} (expected {:#010x})",
                magic, MAGIC
            )));
        }

        let dictionary = Dictionary::read_header(&mut input)?;
        let root_tag = TypeTag(input.read_i32()?);

        let widths = composite_widths(&dictionary);
        let mut reader = BinaryReader {
            input,
            dictionary,
            widths,
        };
        let descriptor = reader.composite(root_tag)?.clone();
        let root = reader.read_record(&descriptor, 0)?;

        if reader.input.remaining() != 0 {
            return Err(PersistError::Serialization(format!(
                "{} trailing bytes after object graph",
                reader.input.remaining()
            )));
        }
        tracing::debug!(root = %descriptor.name, types = reader.dictionary.len(), "decoded object graph");

        Ok(Decoded {
            dictionary: reader.dictionary,
            root: Value::Record(root),
        })
    }

    fn composite(&self, tag: TypeTag) -> Result<&TypeDescriptor, PersistError> {
        self.dictionary
            .descriptor(tag)
            .ok_or_else(|| PersistError::Serialization(format!("unknown composite tag {}", tag)))
    }

    fn read_record(&mut self, descriptor: &TypeDescriptor, depth: usize) -> Result<Record, PersistError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(PersistError::Serialization(format!(
                "nesting deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }
        let mut record = Record::new(descriptor.name.clone());
        for field in &descriptor.fields {
            let value = if field.array_dimensions > 0 {
                self.read_array(field.type_tag, field.array_dimensions, depth + 1)?
            } else {
                self.read_scalar(field.type_tag, depth + 1, true)?
            };
            record.fields.push((field.name.clone(), value));
        }
        Ok(record)
    }

    fn read_scalar(&mut self, tag: TypeTag, depth: usize, sentinels: bool) -> Result<Value, PersistError> {
        match tag.primitive_kind() {
            Some(kind) => self.read_primitive(kind, sentinels),
            None => {
                let descriptor = self.composite(tag)?.clone();
                self.read_record(&descriptor, depth).map(Value::Record)
            }
        }
    }

    fn read_array(&mut self, tag: TypeTag, dims: i32, depth: usize) -> Result<Value, PersistError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(PersistError::Serialization(format!(
                "nesting deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }
        let width = if dims > 1 { 4 } else { self.min_width(tag) };
        let len = self.input.read_len(width)?;
        if width == 0 && len > MAX_FIELDLESS_ELEMENTS {
            return Err(PersistError::Serialization(format!(
                "{} elements of zero-width type {} exceeds limit of {}",
                len, tag, MAX_FIELDLESS_ELEMENTS
            )));
        }
        let mut items = Vec::with_capacity(len.min(self.input.remaining()));
        for _ in 0..len {
            let item = if dims > 1 {
                self.read_array(tag, dims - 1, depth + 1)?
            } else {
                self.read_scalar(tag, depth + 1, false)?
            };
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    /// Smallest encoded size of one value of `tag`, used to reject counts the
    /// remaining input cannot hold.
    fn min_width(&self, tag: TypeTag) -> usize {
        match tag.primitive_kind() {
            Some(kind) => kind.fixed_width().unwrap_or(4),
            None => self.widths.get(&tag).copied().unwrap_or(0),
        }
    }

    /// Sentinels only mark empty scalar fields; array elements are never
    /// empty and decode verbatim.
    fn read_primitive(&mut self, kind: PrimitiveKind, sentinels: bool) -> Result<Value, PersistError> {
        let value = match kind {
            PrimitiveKind::Boolean => match self.input.read_u8()? {
                EMPTY_BOOLEAN if sentinels => Value::Null,
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => {
                    return Err(PersistError::Serialization(format!("invalid boolean byte {}", other)));
                }
            },
            PrimitiveKind::Byte => match self.input.read_i8()? {
                EMPTY_BYTE if sentinels => Value::Null,
                v => Value::Byte(v),
            },
            PrimitiveKind::Char => match self.input.read_u8()? {
                EMPTY_CHAR if sentinels => Value::Null,
                c => Value::Char(c),
            },
            PrimitiveKind::Short => match self.input.read_i16()? {
                EMPTY_SHORT if sentinels => Value::Null,
                v => Value::Short(v),
            },
            PrimitiveKind::Int => match self.input.read_i32()? {
                EMPTY_INT if sentinels => Value::Null,
                v => Value::Int(v),
            },
            PrimitiveKind::Long => match self.input.read_i64()? {
                EMPTY_LONG if sentinels => Value::Null,
                v => Value::Long(v),
            },
            PrimitiveKind::Float => {
                let v = self.input.read_f32()?;
                if sentinels && v.to_bits() == EMPTY_FLOAT.to_bits() { Value::Null } else { Value::Float(v) }
            }
            PrimitiveKind::Double => {
                let v = self.input.read_f64()?;
                if sentinels && v.to_bits() == EMPTY_DOUBLE.to_bits() { Value::Null } else { Value::Double(v) }
            }
            PrimitiveKind::String => Value::String(self.input.read_string()?),
            PrimitiveKind::Enum => Value::Enum(self.input.read_string()?),
            PrimitiveKind::Date => {
                let text = self.input.read_string()?;
                if text.is_empty() { Value::Null } else { Value::Date(parse_date(&text)?) }
            }
        };
        Ok(value)
    }
}

/// Minimum encoded width of every composite. The dictionary lists children
/// before parents, so one forward pass suffices.
fn composite_widths(dictionary: &Dictionary) -> BTreeMap<TypeTag, usize> {
    let mut widths = BTreeMap::new();
    for t in dictionary.types() {
        let width = t.fields.iter().fold(0usize, |acc, f| {
            let w = match (f.array_dimensions, f.type_tag.primitive_kind()) {
                (d, _) if d > 0 => 4,
                (_, Some(kind)) => kind.fixed_width().unwrap_or(4),
                (_, None) => widths.get(&f.type_tag).copied().unwrap_or(0),
            };
            acc.saturating_add(w)
        });
        widths.insert(t.type_tag, width);
    }
    widths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CompositeDef, Schema};
    use crate::stream::save;

    #[test]
    fn decodes_without_schema() {
        let schema = Schema::new()
            .with_type(CompositeDef::new("Point").field("x", "double").field("y", "double"))
            .with_type(CompositeDef::new("Path").array_field("points", "Point", 1).field("name", "string"));
        let root = Record::new("Path")
            .with(
                "points",
                Value::Array(vec![
                    Record::new("Point").with("x", Value::Double(1.0)).with("y", Value::Double(2.0)).into(),
                ]),
            )
            .with("name", Value::String("p".into()));
        let bytes = save(&schema, &root).expect("save");

        let decoded = BinaryReader::read(&bytes).expect("read");
        assert_eq!(decoded.root, Value::Record(root));
        assert_eq!(decoded.dictionary.len(), 2);
    }

    #[test]
    fn bad_magic_rejected() {
        let bytes = 0i32.to_ne_bytes();
        assert!(matches!(BinaryReader::read(&bytes), Err(PersistError::Serialization(_))));
    }

    #[test]
    fn truncated_body_rejected() {
        let schema = Schema::new().with_type(CompositeDef::new("A").field("v", "long"));
        let bytes = save(&schema, &Record::new("A").with("v", Value::Long(7))).expect("save");
        assert!(BinaryReader::read(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn unknown_root_tag_rejected() {
        let schema = Schema::new().with_type(CompositeDef::new("A").field("v", "int"));
        let mut bytes = save(&schema, &Record::new("A").with("v", Value::Int(1))).expect("save");
        // root tag sits right before the 4-byte body
        let at = bytes.len() - 8;
        bytes[at..at + 4].copy_from_slice(&99i32.to_ne_bytes());
        assert!(BinaryReader::read(&bytes).is_err());
    }

    #[test]
    fn nanosecond_date_round_trips() {
        let schema = Schema::new().with_type(CompositeDef::new("Event").field("at", "date"));
        let at = parse_date("2009-03-07T03:49:57.123456789Z").expect("date");
        let root = Record::new("Event").with("at", Value::Date(at));
        let bytes = save(&schema, &root).expect("save");
        assert_eq!(BinaryReader::read(&bytes).expect("read").root, Value::Record(root));
    }

    fn fieldless_holder() -> Schema {
        Schema::new()
            .with_type(CompositeDef::new("Empty"))
            .with_type(CompositeDef::new("Holder").array_field("items", "Empty", 1))
    }

    fn holder_with(count: usize) -> Record {
        let items = (0..count).map(|_| Value::Record(Record::new("Empty"))).collect();
        Record::new("Holder").with("items", Value::Array(items))
    }

    #[test]
    fn fieldless_elements_round_trip() {
        let schema = fieldless_holder();
        let root = holder_with(3);
        let bytes = save(&schema, &root).expect("save");
        assert_eq!(BinaryReader::read(&bytes).expect("read").root, Value::Record(root));
    }

    #[test]
    fn oversized_fieldless_count_rejected() {
        let schema = fieldless_holder();
        let mut bytes = save(&schema, &holder_with(0)).expect("save");
        // the body is just the element count
        let at = bytes.len() - 4;
        bytes[at..].copy_from_slice(&20_000_000i32.to_ne_bytes());
        let err = BinaryReader::read(&bytes).expect_err("count must be rejected");
        assert!(err.to_string().contains("exceeds limit"));

        let limit = i32::try_from(MAX_FIELDLESS_ELEMENTS).expect("limit fits");
        bytes[at..].copy_from_slice(&limit.to_ne_bytes());
        let decoded = BinaryReader::read(&bytes).expect("limit itself accepted");
        let items = decoded.root_record().and_then(|r| r.get("items")).expect("items");
        assert!(matches!(items, Value::Array(v) if v.len() == MAX_FIELDLESS_ELEMENTS));
    }
}
