//! # Structured-Container Writer
//!
//! Alternate backend that builds a nested MATLAB-style container tree
//! (struct / struct array / cell / numeric / char) instead of a byte stream.
//! The tree is handed to [`crate::formats::mat`] for export.
//!
//! ## Frame stack
//!
//! A synthetic 1x1 root struct sits at the bottom of the stack and receives
//! the root object's fields. Entering a composite or an array pushes a frame
//! that owns the container under construction; leaving pops it and attaches
//! the finished container to the new top frame, either at a field name or
//! at the parent array's `current_index` (which then advances).
//!
//! ## Layout rules
//!
//! | value                               | container                          |
//! |-------------------------------------|------------------------------------|
//! | numeric / boolean scalar            | 1x1 double                         |
//! | char, string, date, enum scalar     | 1xN char row                       |
//! | numeric / boolean array             | Nx1 double                         |
//! | byte array                          | Nx1 uint8                          |
//! | char array                          | 1xN char row                       |
//! | string, date, enum array            | 1xN cell of char rows              |
//! | composite array                     | 1xN struct array                   |
//! | outer dimension of an N-d array     | 1xN struct array, inner at `array` |
//! | anything empty or absent            | 0x0 double                         |

use crate::primitives::NESTED_ARRAY_FIELD;
use crate::schema::{CompositeDef, Schema};
use crate::value::{Record, Value};
use crate::walker::{ElementType, ValueListener, Walker};
use crate::{PersistError, PrimitiveKind};

// =============================================================================
// CONTAINER VALUES
// =============================================================================

/// A node of the container tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MatValue {
    /// 1xN struct array.
    Struct(StructArray),
    /// 1xN cell array.
    Cell(Vec<MatValue>),
    /// Real double matrix, column-major.
    Double { rows: usize, cols: usize, data: Vec<f64> },
    /// uint8 matrix, column-major.
    UInt8 { rows: usize, cols: usize, data: Vec<u8> },
    /// 1xN char row.
    Char(String),
}

impl MatValue {
    /// The 0x0 double standing in for every empty or absent value.
    #[must_use]
    pub fn empty() -> Self {
        MatValue::Double {
            rows: 0,
            cols: 0,
            data: Vec::new(),
        }
    }

    /// A 1x1 double.
    #[must_use]
    pub fn scalar(v: f64) -> Self {
        MatValue::Double {
            rows: 1,
            cols: 1,
            data: vec![v],
        }
    }

    /// An Nx1 double column.
    #[must_use]
    pub fn column(data: Vec<f64>) -> Self {
        MatValue::Double {
            rows: data.len(),
            cols: 1,
            data,
        }
    }

    /// True for the 0x0 placeholder.
    #[must_use]
    pub fn is_empty_placeholder(&self) -> bool {
        matches!(self, MatValue::Double { rows: 0, cols: 0, .. })
    }

    /// Dimensions as `(rows, cols)`.
    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        match self {
            MatValue::Struct(s) => (1, s.len()),
            MatValue::Cell(items) => (1, items.len()),
            MatValue::Double { rows, cols, .. } | MatValue::UInt8 { rows, cols, .. } => (*rows, *cols),
            MatValue::Char(text) => (1, text.encode_utf16().count()),
        }
    }

    /// MATLAB class name, for diagnostics and the CLI.
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        match self {
            MatValue::Struct(_) => "struct",
            MatValue::Cell(_) => "cell",
            MatValue::Double { .. } => "double",
            MatValue::UInt8 { .. } => "uint8",
            MatValue::Char(_) => "char",
        }
    }

    /// The struct array, if this is one.
    #[must_use]
    pub fn as_struct(&self) -> Option<&StructArray> {
        match self {
            MatValue::Struct(s) => Some(s),
            _ => None,
        }
    }
}

/// A 1xN struct array. Every element has every field; fields never set on
/// an element hold the empty placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct StructArray {
    field_names: Vec<String>,
    /// One row per element, aligned with `field_names`.
    elements: Vec<Vec<MatValue>>,
}

impl StructArray {
    /// A struct array of `len` elements with no fields.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            field_names: Vec::new(),
            elements: vec![Vec::new(); len],
        }
    }

    /// A struct array of `len` elements whose fields all hold the placeholder.
    #[must_use]
    pub fn with_fields<I, S>(len: usize, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let field_names: Vec<String> = names.into_iter().map(Into::into).collect();
        let row = vec![MatValue::empty(); field_names.len()];
        Self {
            field_names,
            elements: vec![row; len],
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True for a 1x0 struct array.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Field names in insertion order.
    #[must_use]
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Set `name` on element `index`, adding the field to every element if new.
    pub fn set_field(&mut self, name: &str, value: MatValue, index: usize) -> Result<(), PersistError> {
        let len = self.elements.len();
        let row = self.elements.get_mut(index).ok_or(PersistError::UnbalancedStack {
            expected: len,
            found: index + 1,
        })?;
        match self.field_names.iter().position(|n| n == name) {
            Some(pos) => row[pos] = value,
            None => {
                row.push(value);
                for (i, other) in self.elements.iter_mut().enumerate() {
                    if i != index {
                        other.push(MatValue::empty());
                    }
                }
                self.field_names.push(name.to_string());
            }
        }
        Ok(())
    }

    /// Value of `name` on element `index`.
    #[must_use]
    pub fn get_field(&self, name: &str, index: usize) -> Option<&MatValue> {
        let pos = self.field_names.iter().position(|n| n == name)?;
        self.elements.get(index).and_then(|row| row.get(pos))
    }

    /// Element rows, aligned with [`StructArray::field_names`].
    pub fn elements(&self) -> impl Iterator<Item = &[MatValue]> {
        self.elements.iter().map(Vec::as_slice)
    }
}

// =============================================================================
// FRAMES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    /// The synthetic root struct.
    Root,
    /// A scalar composite.
    Composite,
    /// An array of composites; each element composite fills one slot.
    CompositeArray,
    /// Outer dimension of a multi-dimensional array; each inner dimension
    /// lands in the slot's `array` field.
    NestedArray,
    /// A cell array of text (or of inner cells).
    TextArray,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    field: String,
    value: MatValue,
    current_index: usize,
}

impl Frame {
    fn describe(&self) -> String {
        format!("{:?} '{}'", self.kind, self.field)
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Value listener that builds the container tree of one object graph.
pub struct ContainerWriter {
    stack: Vec<Frame>,
}

impl Default for ContainerWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerWriter {
    /// Create a writer holding only the synthetic root frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: vec![Frame {
                kind: FrameKind::Root,
                field: crate::primitives::CONTAINER_ROOT_NAME.to_string(),
                value: MatValue::Struct(StructArray::new(1)),
                current_index: 0,
            }],
        }
    }

    /// Finish, checking that only the root frame remains.
    pub fn finish(mut self) -> Result<MatValue, PersistError> {
        if self.stack.len() != 1 {
            return Err(PersistError::UnbalancedStack {
                expected: 1,
                found: self.stack.len(),
            });
        }
        self.stack
            .pop()
            .map(|f| f.value)
            .ok_or(PersistError::UnbalancedStack { expected: 1, found: 0 })
    }

    fn top(&mut self) -> Result<&mut Frame, PersistError> {
        self.stack.last_mut().ok_or(PersistError::UnbalancedStack { expected: 1, found: 0 })
    }

    fn push(&mut self, kind: FrameKind, field: &str, value: MatValue) {
        tracing::trace!(kind = ?kind, field, depth = self.stack.len(), "push frame");
        self.stack.push(Frame {
            kind,
            field: field.to_string(),
            value,
            current_index: 0,
        });
    }

    fn pop(&mut self, field: &str, array: bool) -> Result<Frame, PersistError> {
        let frame = match self.stack.last() {
            Some(f) if f.kind != FrameKind::Root => self.stack.pop(),
            _ => None,
        }
        .ok_or_else(|| PersistError::FrameMismatch {
            expected: field.to_string(),
            found: "root".to_string(),
        })?;
        let is_array = frame.kind != FrameKind::Composite;
        if frame.field != field || is_array != array {
            return Err(PersistError::FrameMismatch {
                expected: field.to_string(),
                found: frame.describe(),
            });
        }
        tracing::trace!(kind = ?frame.kind, field, depth = self.stack.len(), "pop frame");
        Ok(frame)
    }

    /// Store a finished value in the top frame: at `field` for structs, at
    /// the next slot for arrays.
    fn attach(&mut self, field: &str, value: MatValue) -> Result<(), PersistError> {
        let top = self.top()?;
        let index = top.current_index;
        match (top.kind, &mut top.value) {
            (FrameKind::Root | FrameKind::Composite, MatValue::Struct(s)) => s.set_field(field, value, 0),
            (FrameKind::NestedArray, MatValue::Struct(s)) => {
                top.current_index += 1;
                s.set_field(NESTED_ARRAY_FIELD, value, index)
            }
            (FrameKind::CompositeArray, MatValue::Struct(s)) => {
                top.current_index += 1;
                let element = match value {
                    MatValue::Struct(element) => element,
                    other => {
                        return Err(PersistError::TypeMismatch {
                            field: field.to_string(),
                            expected: "struct".to_string(),
                            found: other.class_name().to_string(),
                        });
                    }
                };
                for (name, v) in element.field_names.iter().zip(element.elements.into_iter().flatten()) {
                    s.set_field(name, v, index)?;
                }
                Ok(())
            }
            (FrameKind::TextArray, MatValue::Cell(items)) => {
                top.current_index += 1;
                let len = items.len();
                let slot = items.get_mut(index).ok_or(PersistError::UnbalancedStack {
                    expected: len,
                    found: index + 1,
                })?;
                *slot = value;
                Ok(())
            }
            (kind, v) => Err(PersistError::FrameMismatch {
                expected: format!("{:?} container", kind),
                found: v.class_name().to_string(),
            }),
        }
    }
}

impl ValueListener for ContainerWriter {
    fn begin_composite(&mut self, field: Option<&str>, declared: &str, def: &CompositeDef) -> Result<(), PersistError> {
        if def.name != declared {
            return Err(PersistError::PolymorphicValue {
                field: field.unwrap_or(declared).to_string(),
                declared: declared.to_string(),
                actual: def.name.clone(),
            });
        }
        // The root object's fields go straight into the synthetic root.
        if let Some(field) = field {
            let names = def.fields.iter().map(|f| f.name.as_str());
            self.push(FrameKind::Composite, field, MatValue::Struct(StructArray::with_fields(1, names)));
        }
        Ok(())
    }

    fn end_composite(&mut self, field: Option<&str>) -> Result<(), PersistError> {
        let Some(field) = field else {
            return Ok(());
        };
        let frame = self.pop(field, false)?;
        self.attach(field, frame.value)
    }

    fn begin_array(&mut self, field: &str, element: ElementType<'_>, dims: u32, len: usize) -> Result<(), PersistError> {
        let (kind, value) = if element.is_textual() {
            (FrameKind::TextArray, MatValue::Cell(vec![MatValue::empty(); len]))
        } else if dims > 1 {
            (FrameKind::NestedArray, MatValue::Struct(StructArray::with_fields(len, [NESTED_ARRAY_FIELD])))
        } else {
            let names: Vec<&str> = match element {
                ElementType::Composite(def) => def.fields.iter().map(|f| f.name.as_str()).collect(),
                ElementType::Primitive(_) => Vec::new(),
            };
            (FrameKind::CompositeArray, MatValue::Struct(StructArray::with_fields(len, names)))
        };
        self.push(kind, field, value);
        Ok(())
    }

    fn end_array(&mut self, field: &str) -> Result<(), PersistError> {
        let frame = self.pop(field, true)?;
        let value = if frame.value.dims().1 == 0 { MatValue::empty() } else { frame.value };
        self.attach(field, value)
    }

    fn primitive(&mut self, field: &str, kind: PrimitiveKind, value: &Value) -> Result<(), PersistError> {
        let v = scalar_value(field, kind, value)?;
        self.attach(field, v)
    }

    fn primitive_array(&mut self, field: &str, kind: PrimitiveKind, values: &[Value]) -> Result<(), PersistError> {
        let v = array_value(field, kind, values)?;
        self.attach(field, v)
    }

    fn empty_composite(&mut self, field: &str, _declared: &CompositeDef) -> Result<(), PersistError> {
        let top = self.top()?;
        if top.kind == FrameKind::CompositeArray {
            // the preallocated slot already holds placeholders
            top.current_index += 1;
            return Ok(());
        }
        self.attach(field, MatValue::empty())
    }
}

fn mismatch(field: &str, kind: PrimitiveKind, value: &Value) -> PersistError {
    PersistError::TypeMismatch {
        field: field.to_string(),
        expected: kind.name().to_string(),
        found: value.kind_name().to_string(),
    }
}

fn numeric(field: &str, kind: PrimitiveKind, value: &Value) -> Result<f64, PersistError> {
    Ok(match value {
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Byte(v) => f64::from(*v),
        Value::Short(v) => f64::from(*v),
        Value::Int(v) => f64::from(*v),
        Value::Long(v) => *v as f64,
        Value::Float(v) => f64::from(*v),
        Value::Double(v) => *v,
        other => return Err(mismatch(field, kind, other)),
    })
}

fn scalar_value(field: &str, kind: PrimitiveKind, value: &Value) -> Result<MatValue, PersistError> {
    match value {
        Value::Null => Ok(MatValue::empty()),
        Value::Char(c) => Ok(MatValue::Char(char::from(*c).to_string())),
        v if kind.is_textual() => v.text().map(MatValue::Char).ok_or_else(|| mismatch(field, kind, v)),
        v => numeric(field, kind, v).map(MatValue::scalar),
    }
}

fn array_value(field: &str, kind: PrimitiveKind, values: &[Value]) -> Result<MatValue, PersistError> {
    if values.is_empty() {
        return Ok(MatValue::empty());
    }
    match kind {
        PrimitiveKind::String | PrimitiveKind::Date | PrimitiveKind::Enum => values
            .iter()
            .map(|v| match v {
                Value::Null => Ok(MatValue::empty()),
                v => v.text().map(MatValue::Char).ok_or_else(|| mismatch(field, kind, v)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(MatValue::Cell),
        PrimitiveKind::Char => values
            .iter()
            .map(|v| match v {
                Value::Char(c) => Ok(char::from(*c)),
                other => Err(mismatch(field, kind, other)),
            })
            .collect::<Result<String, _>>()
            .map(MatValue::Char),
        PrimitiveKind::Byte => {
            let data = values
                .iter()
                .map(|v| match v {
                    // two's complement bit pattern, as MATLAB's uint8 view of int8 data
                    Value::Byte(b) => Ok(*b as u8),
                    other => Err(mismatch(field, kind, other)),
                })
                .collect::<Result<Vec<u8>, _>>()?;
            Ok(MatValue::UInt8 {
                rows: data.len(),
                cols: 1,
                data,
            })
        }
        _ => values
            .iter()
            .map(|v| numeric(field, kind, v))
            .collect::<Result<Vec<f64>, _>>()
            .map(MatValue::column),
    }
}

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Build the container tree of `root`.
///
/// Returns the synthetic 1x1 root struct holding the root object's fields.
pub fn save(schema: &Schema, root: &Record) -> Result<MatValue, PersistError> {
    let mut writer = ContainerWriter::new();
    Walker::new(schema).walk_value(root, &mut writer)?;
    let value = writer.finish()?;
    tracing::debug!(root = %root.type_name, "built container tree");
    Ok(value)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new()
            .with_type(CompositeDef::new("Point").field("x", "double").field("y", "double"))
            .with_type(
                CompositeDef::new("Path")
                    .field("name", "string")
                    .field("count", "int")
                    .array_field("points", "Point", 1)
                    .array_field("tags", "string", 1)
                    .array_field("grid", "int", 2)
                    .array_field("raw", "byte", 1)
                    .field("origin", "Point"),
            )
            .with_root("Path")
    }

    fn point(x: f64, y: f64) -> Value {
        Record::new("Point").with("x", Value::Double(x)).with("y", Value::Double(y)).into()
    }

    fn root_struct(value: &MatValue) -> &StructArray {
        value.as_struct().expect("root struct")
    }

    #[test]
    fn root_fields_land_in_synthetic_root() {
        let root = Record::new("Path")
            .with("name", Value::String("p".into()))
            .with("count", Value::Int(3))
            .with("points", Value::Array(vec![point(1.0, 2.0), point(3.0, 4.0)]))
            .with("tags", Value::Array(vec![Value::String("a".into()), Value::String("bc".into())]))
            .with("raw", Value::Array(vec![Value::Byte(-1), Value::Byte(7)]))
            .with("origin", point(0.0, 0.5));
        let tree = save(&schema(), &root).expect("save");
        let s = root_struct(&tree);

        assert_eq!(s.len(), 1);
        assert_eq!(s.get_field("name", 0), Some(&MatValue::Char("p".into())));
        assert_eq!(s.get_field("count", 0), Some(&MatValue::scalar(3.0)));

        let points = s.get_field("points", 0).and_then(MatValue::as_struct).expect("points");
        assert_eq!(points.len(), 2);
        assert_eq!(points.get_field("y", 1), Some(&MatValue::scalar(4.0)));

        assert_eq!(
            s.get_field("tags", 0),
            Some(&MatValue::Cell(vec![MatValue::Char("a".into()), MatValue::Char("bc".into())]))
        );
        assert_eq!(
            s.get_field("raw", 0),
            Some(&MatValue::UInt8 {
                rows: 2,
                cols: 1,
                data: vec![255, 7]
            })
        );
        let origin = s.get_field("origin", 0).and_then(MatValue::as_struct).expect("origin");
        assert_eq!(origin.get_field("y", 0), Some(&MatValue::scalar(0.5)));
    }

    #[test]
    fn empty_values_become_placeholders() {
        let tree = save(&schema(), &Record::new("Path")).expect("save");
        let s = root_struct(&tree);
        for name in ["name", "count", "points", "tags", "grid", "raw", "origin"] {
            let v = s.get_field(name, 0).expect("field present");
            assert!(v.is_empty_placeholder(), "{} should be a placeholder", name);
        }
        // name is an empty char row only when it was an empty string
        assert_eq!(s.field_names().len(), 7);
    }

    #[test]
    fn inner_dimensions_use_array_field() {
        let root = Record::new("Path").with(
            "grid",
            Value::Array(vec![Value::Array(vec![Value::Int(1), Value::Int(2)]), Value::Array(vec![])]),
        );
        let tree = save(&schema(), &root).expect("save");
        let grid = root_struct(&tree).get_field("grid", 0).and_then(MatValue::as_struct).expect("grid");

        assert_eq!(grid.len(), 2);
        assert_eq!(grid.field_names(), [NESTED_ARRAY_FIELD.to_string()]);
        assert_eq!(grid.get_field(NESTED_ARRAY_FIELD, 0), Some(&MatValue::column(vec![1.0, 2.0])));
        assert!(grid.get_field(NESTED_ARRAY_FIELD, 1).expect("row").is_empty_placeholder());
    }

    #[test]
    fn nested_text_arrays_are_nested_cells() {
        let schema = Schema::new().with_type(CompositeDef::new("T").array_field("words", "string", 2));
        let root = Record::new("T").with(
            "words",
            Value::Array(vec![Value::Array(vec![Value::String("x".into())])]),
        );
        let tree = save(&schema, &root).expect("save");
        assert_eq!(
            root_struct(&tree).get_field("words", 0),
            Some(&MatValue::Cell(vec![MatValue::Cell(vec![MatValue::Char("x".into())])]))
        );
    }

    #[test]
    fn empty_slot_in_composite_array_keeps_fields() {
        let root = Record::new("Path").with("points", Value::Array(vec![Value::Null, point(5.0, 6.0)]));
        let tree = save(&schema(), &root).expect("save");
        let points = root_struct(&tree).get_field("points", 0).and_then(MatValue::as_struct).expect("points");
        assert!(points.get_field("x", 0).expect("x").is_empty_placeholder());
        assert_eq!(points.get_field("x", 1), Some(&MatValue::scalar(5.0)));
    }

    #[test]
    fn unbalanced_stack_detected() {
        let mut writer = ContainerWriter::new();
        writer.push(FrameKind::Composite, "dangling", MatValue::Struct(StructArray::new(1)));
        assert!(matches!(
            writer.finish(),
            Err(PersistError::UnbalancedStack { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn end_with_wrong_name_detected() {
        let mut writer = ContainerWriter::new();
        writer.push(FrameKind::Composite, "a", MatValue::Struct(StructArray::new(1)));
        assert!(matches!(writer.end_composite(Some("b")), Err(PersistError::FrameMismatch { .. })));
    }
}
