//! # Object Graph Values
//!
//! The dynamic object tree handed to the backends. Composite nodes carry
//! their runtime type name, which may differ from the type their field
//! declares; the writers reject such values instead of serializing subtypes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value as Json};

use crate::schema::{CompositeDef, FieldDef, FieldType, Schema};
use crate::{PersistError, PrimitiveKind};

/// JSON key selecting the runtime type of a composite object.
pub const JSON_TYPE_KEY: &str = "$type";

// =============================================================================
// VALUE
// =============================================================================

/// A node of an object graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// A single-byte character.
    Char(u8),
    String(String),
    Date(DateTime<Utc>),
    /// An enumeration constant, by name.
    Enum(String),
    /// Absent wrapper, null string, or missing composite.
    Null,
    Array(Vec<Value>),
    Record(Record),
}

impl Value {
    /// Short description of the variant, for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Enum(_) => "enum",
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
        }
    }

    /// True if the value can stand for a scalar of `kind`.
    ///
    /// `Null` matches every kind; it is encoded as that kind's empty form.
    #[must_use]
    pub fn matches_kind(&self, kind: PrimitiveKind) -> bool {
        matches!(
            (self, kind),
            (Value::Null, _)
                | (Value::Bool(_), PrimitiveKind::Boolean)
                | (Value::Byte(_), PrimitiveKind::Byte)
                | (Value::Short(_), PrimitiveKind::Short)
                | (Value::Int(_), PrimitiveKind::Int)
                | (Value::Long(_), PrimitiveKind::Long)
                | (Value::Float(_), PrimitiveKind::Float)
                | (Value::Double(_), PrimitiveKind::Double)
                | (Value::Char(_), PrimitiveKind::Char)
                | (Value::String(_), PrimitiveKind::String)
                | (Value::Date(_), PrimitiveKind::Date)
                | (Value::Enum(_), PrimitiveKind::Enum)
        )
    }

    /// The canonical text of a textual scalar (string, date, enum).
    ///
    /// `Null` yields the empty string.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s.clone()),
            Value::Date(d) => Some(format_date(d)),
            Value::Null => Some(String::new()),
            _ => None,
        }
    }

    /// True for `Null` and for zero-length arrays.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Render as JSON (used by the CLI `decode` command).
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Value::Bool(b) => Json::Bool(*b),
            Value::Byte(v) => Json::from(*v),
            Value::Short(v) => Json::from(*v),
            Value::Int(v) => Json::from(*v),
            Value::Long(v) => Json::from(*v),
            Value::Float(v) => Number::from_f64(f64::from(*v)).map_or(Json::Null, Json::Number),
            Value::Double(v) => Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Value::Char(c) => Json::String(char::from(*c).to_string()),
            Value::String(s) | Value::Enum(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(format_date(d)),
            Value::Null => Json::Null,
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(r) => r.to_json(),
        }
    }
}

/// Canonical textual form of a date: RFC 3339, UTC.
///
/// Milliseconds are always shown; micro- or nanoseconds only when the value
/// carries them, so [`parse_date`] restores the exact instant.
#[must_use]
pub fn format_date(date: &DateTime<Utc>) -> String {
    let nanos = date.timestamp_subsec_nanos() % 1_000_000_000;
    let precision = if nanos % 1_000_000 == 0 {
        SecondsFormat::Millis
    } else if nanos % 1_000 == 0 {
        SecondsFormat::Micros
    } else {
        SecondsFormat::Nanos
    };
    date.to_rfc3339_opts(precision, true)
}

/// Parse the canonical textual form of a date.
pub fn parse_date(text: &str) -> Result<DateTime<Utc>, PersistError> {
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| PersistError::Serialization(format!("invalid date '{}': {}", text, e)))
}

// =============================================================================
// RECORD
// =============================================================================

/// A composite value: runtime type name plus named field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Runtime type name.
    pub type_name: String,
    /// Field values; order is irrelevant, the schema decides encoding order.
    pub fields: Vec<(String, Value)>,
}

impl Record {
    /// Create a record with no fields set.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Set a field (builder form).
    #[must_use]
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Set or replace a field.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Get a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Render as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        Json::Object(map)
    }

    /// Build a record of type `def` from a JSON object.
    ///
    /// Missing keys become `Null`. A `"$type"` key overrides the runtime type
    /// name, which lets a document describe a (rejected) polymorphic value.
    pub fn from_json(schema: &Schema, def: &CompositeDef, json: &Json) -> Result<Self, PersistError> {
        let obj = json.as_object().ok_or_else(|| PersistError::TypeMismatch {
            field: def.name.clone(),
            expected: "object".to_string(),
            found: json_kind(json).to_string(),
        })?;

        let type_name = obj
            .get(JSON_TYPE_KEY)
            .and_then(Json::as_str)
            .unwrap_or(&def.name)
            .to_string();
        let def = schema.get(&type_name).unwrap_or(def);

        let mut record = Record::new(type_name);
        for field in &def.fields {
            let value = match obj.get(&field.name) {
                Some(v) => field_from_json(schema, field, field.dims, v)?,
                None => Value::Null,
            };
            record.fields.push((field.name.clone(), value));
        }
        Ok(record)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

// =============================================================================
// JSON -> VALUE
// =============================================================================

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn field_from_json(schema: &Schema, field: &FieldDef, dims: u32, json: &Json) -> Result<Value, PersistError> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    if dims > 0 {
        let items = json.as_array().ok_or_else(|| mismatch(field, "array", json))?;
        return items
            .iter()
            .map(|item| field_from_json(schema, field, dims - 1, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    match schema.resolve(field) {
        FieldType::Primitive(kind) => primitive_from_json(field, kind, json),
        FieldType::Composite(def) => Record::from_json(schema, def, json).map(Value::Record),
        FieldType::Unknown => Err(PersistError::UnsupportedType {
            field: field.name.clone(),
            type_name: field.type_name.clone(),
        }),
    }
}

fn mismatch(field: &FieldDef, expected: &str, json: &Json) -> PersistError {
    PersistError::TypeMismatch {
        field: field.name.clone(),
        expected: expected.to_string(),
        found: json_kind(json).to_string(),
    }
}

fn integer<T: TryFrom<i64>>(field: &FieldDef, json: &Json) -> Result<T, PersistError> {
    json.as_i64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| mismatch(field, &field.type_name, json))
}

fn primitive_from_json(field: &FieldDef, kind: PrimitiveKind, json: &Json) -> Result<Value, PersistError> {
    let value = match kind {
        PrimitiveKind::Boolean => Value::Bool(json.as_bool().ok_or_else(|| mismatch(field, "boolean", json))?),
        PrimitiveKind::Byte => Value::Byte(integer(field, json)?),
        PrimitiveKind::Short => Value::Short(integer(field, json)?),
        PrimitiveKind::Int => Value::Int(integer(field, json)?),
        PrimitiveKind::Long => Value::Long(integer(field, json)?),
        PrimitiveKind::Float => Value::Float(json.as_f64().ok_or_else(|| mismatch(field, "float", json))? as f32),
        PrimitiveKind::Double => Value::Double(json.as_f64().ok_or_else(|| mismatch(field, "double", json))?),
        PrimitiveKind::Char => {
            let text = json.as_str().ok_or_else(|| mismatch(field, "char", json))?;
            match text.as_bytes() {
                [b] => Value::Char(*b),
                _ => return Err(mismatch(field, "single-byte char", json)),
            }
        }
        PrimitiveKind::String => Value::String(json.as_str().ok_or_else(|| mismatch(field, "string", json))?.to_string()),
        PrimitiveKind::Date => Value::Date(parse_date(json.as_str().ok_or_else(|| mismatch(field, "date", json))?)?),
        PrimitiveKind::Enum => Value::Enum(json.as_str().ok_or_else(|| mismatch(field, "enum", json))?.to_string()),
    };
    Ok(value)
}

// =============================================================================
// TESTS
// =============================================================================
