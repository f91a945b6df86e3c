//! # Binary Stream Writer
//!
//! Consumes value-level walker events and produces the self-describing
//! binary layout:
//!
//! ```text
//! [int32 magic][dictionary section][int32 top-level tag][object graph]
//! ```
//!
//! Composites carry no length prefix; arrays carry an int32 element count.
//! Absent primitive wrappers are written as the sentinel of their kind
//! (see [`crate::primitives`]).
//!
//! Encoding targets an in-memory buffer. The caller's sink only ever sees a
//! complete file, so a failed encode leaves it untouched.

use byteorder::{NativeEndian, WriteBytesExt};
use std::io::Write;

use crate::dictionary::Dictionary;
use crate::primitives::{
    EMPTY_BOOLEAN, EMPTY_BYTE, EMPTY_CHAR, EMPTY_DOUBLE, EMPTY_FLOAT, EMPTY_INT, EMPTY_LONG, EMPTY_SHORT, MAGIC,
};
use crate::schema::{CompositeDef, Schema};
use crate::stream::wire;
use crate::value::{Record, Value};
use crate::walker::{ElementType, ValueListener, Walker};
use crate::{PersistError, PrimitiveKind};

// =============================================================================
// FRAMES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    /// A composite value; `None` for the root.
    Composite(Option<String>),
    /// One dimension of an array field.
    Array(String),
}

impl Frame {
    fn describe(&self) -> String {
        match self {
            Frame::Composite(Some(name)) => format!("composite '{}'", name),
            Frame::Composite(None) => "root composite".to_string(),
            Frame::Array(name) => format!("array '{}'", name),
        }
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Value listener that encodes one object graph into a byte buffer.
pub struct BinaryWriter<'d> {
    dictionary: &'d Dictionary,
    buf: Vec<u8>,
    frames: Vec<Frame>,
}

impl<'d> BinaryWriter<'d> {
    /// Create a writer checking composites against `dictionary`.
    #[must_use]
    pub fn new(dictionary: &'d Dictionary) -> Self {
        Self {
            dictionary,
            buf: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Bytes emitted so far.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finish, checking that every frame was closed.
    pub fn into_bytes(self) -> Result<Vec<u8>, PersistError> {
        if !self.frames.is_empty() {
            return Err(PersistError::UnbalancedStack {
                expected: 0,
                found: self.frames.len(),
            });
        }
        Ok(self.buf)
    }

    fn pop(&mut self, expected: Frame) -> Result<(), PersistError> {
        match self.frames.pop() {
            Some(frame) if frame == expected => Ok(()),
            Some(frame) => Err(PersistError::FrameMismatch {
                expected: expected.describe(),
                found: frame.describe(),
            }),
            None => Err(PersistError::FrameMismatch {
                expected: expected.describe(),
                found: "empty stack".to_string(),
            }),
        }
    }
}

impl ValueListener for BinaryWriter<'_> {
    fn begin_composite(&mut self, field: Option<&str>, declared: &str, def: &CompositeDef) -> Result<(), PersistError> {
        if self.dictionary.tag_for(&def.name).is_none() {
            return Err(PersistError::UnregisteredType(def.name.clone()));
        }
        if def.name != declared {
            return Err(PersistError::PolymorphicValue {
                field: field.unwrap_or(declared).to_string(),
                declared: declared.to_string(),
                actual: def.name.clone(),
            });
        }
        tracing::trace!(field = ?field, type_name = %def.name, depth = self.frames.len(), "push composite");
        self.frames.push(Frame::Composite(field.map(str::to_string)));
        Ok(())
    }

    fn end_composite(&mut self, field: Option<&str>) -> Result<(), PersistError> {
        self.pop(Frame::Composite(field.map(str::to_string)))
    }

    fn begin_array(&mut self, field: &str, _element: ElementType<'_>, _dims: u32, len: usize) -> Result<(), PersistError> {
        wire::write_len(&mut self.buf, len)?;
        self.frames.push(Frame::Array(field.to_string()));
        Ok(())
    }

    fn end_array(&mut self, field: &str) -> Result<(), PersistError> {
        self.pop(Frame::Array(field.to_string()))
    }

    fn primitive(&mut self, field: &str, kind: PrimitiveKind, value: &Value) -> Result<(), PersistError> {
        write_primitive(&mut self.buf, field, kind, value)
    }

    fn primitive_array(&mut self, field: &str, kind: PrimitiveKind, values: &[Value]) -> Result<(), PersistError> {
        wire::write_len(&mut self.buf, values.len())?;
        for value in values {
            write_primitive(&mut self.buf, field, kind, value)?;
        }
        Ok(())
    }

    fn empty_composite(&mut self, field: &str, _declared: &CompositeDef) -> Result<(), PersistError> {
        Err(PersistError::EmptyComposite {
            field: field.to_string(),
        })
    }
}

/// Encode one primitive, substituting the kind's sentinel for `Null`.
fn write_primitive(buf: &mut Vec<u8>, field: &str, kind: PrimitiveKind, value: &Value) -> Result<(), PersistError> {
    match (kind, value) {
        (PrimitiveKind::Boolean, Value::Bool(b)) => buf.write_u8(u8::from(*b))?,
        (PrimitiveKind::Boolean, Value::Null) => buf.write_u8(EMPTY_BOOLEAN)?,
        (PrimitiveKind::Byte, Value::Byte(v)) => buf.write_i8(*v)?,
        (PrimitiveKind::Byte, Value::Null) => buf.write_i8(EMPTY_BYTE)?,
        (PrimitiveKind::Char, Value::Char(c)) => buf.write_u8(*c)?,
        (PrimitiveKind::Char, Value::Null) => buf.write_u8(EMPTY_CHAR)?,
        (PrimitiveKind::Short, Value::Short(v)) => buf.write_i16::<NativeEndian>(*v)?,
        (PrimitiveKind::Short, Value::Null) => buf.write_i16::<NativeEndian>(EMPTY_SHORT)?,
        (PrimitiveKind::Int, Value::Int(v)) => buf.write_i32::<NativeEndian>(*v)?,
        (PrimitiveKind::Int, Value::Null) => buf.write_i32::<NativeEndian>(EMPTY_INT)?,
        (PrimitiveKind::Long, Value::Long(v)) => buf.write_i64::<NativeEndian>(*v)?,
        (PrimitiveKind::Long, Value::Null) => buf.write_i64::<NativeEndian>(EMPTY_LONG)?,
        (PrimitiveKind::Float, Value::Float(v)) => buf.write_f32::<NativeEndian>(*v)?,
        (PrimitiveKind::Float, Value::Null) => buf.write_f32::<NativeEndian>(EMPTY_FLOAT)?,
        (PrimitiveKind::Double, Value::Double(v)) => buf.write_f64::<NativeEndian>(*v)?,
        (PrimitiveKind::Double, Value::Null) => buf.write_f64::<NativeEndian>(EMPTY_DOUBLE)?,
        (PrimitiveKind::String | PrimitiveKind::Date | PrimitiveKind::Enum, v) if v.matches_kind(kind) => {
            // Null text goes through the same path as "": length 0.
            let text = v.text().unwrap_or_default();
            wire::write_string(buf, &text)?;
        }
        (_, other) => {
            return Err(PersistError::TypeMismatch {
                field: field.to_string(),
                expected: kind.name().to_string(),
                found: other.kind_name().to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Encode `root` into a complete binary file image.
///
/// Pure transformation: builds a fresh dictionary for the root's type graph,
/// then writes magic, dictionary, top-level tag and body.
pub fn save(schema: &Schema, root: &Record) -> Result<Vec<u8>, PersistError> {
    let root_def = schema
        .get(&root.type_name)
        .ok_or_else(|| PersistError::UnregisteredType(root.type_name.clone()))?;
    let dictionary = Dictionary::from_schema(schema, root_def)?;
    let root_tag = dictionary
        .tag_for(&root_def.name)
        .ok_or_else(|| PersistError::UnregisteredType(root_def.name.clone()))?;

    let mut writer = BinaryWriter::new(&dictionary);
    wire::write_i32(&mut writer.buf, MAGIC)?;
    dictionary.serialize_header(&mut writer.buf)?;
    wire::write_i32(&mut writer.buf, root_tag.value())?;
    let header_len = writer.buf.len();

    Walker::new(schema).walk_value(root, &mut writer)?;
    let bytes = writer.into_bytes()?;

    tracing::debug!(
        root = %root_def.name,
        types = dictionary.len(),
        header_bytes = header_len,
        total_bytes = bytes.len(),
        "encoded object graph"
    );
    Ok(bytes)
}

/// Encode `root` and write the finished image to `sink`.
///
/// Returns the number of bytes written. Nothing reaches `sink` unless the
/// whole graph encoded successfully.
pub fn save_to<W: Write + ?Sized>(schema: &Schema, root: &Record, sink: &mut W) -> Result<usize, PersistError> {
    let bytes = save(schema, root)?;
    sink.write_all(&bytes)?;
    sink.flush()?;
    Ok(bytes.len())
}

// =============================================================================
// TESTS
// =============================================================================
