//! # Graph Walker
//!
//! Drives the backends through structural callbacks. The walker is the only
//! component that consults the [`Schema`]; every backend is a pure consumer
//! of the events defined by the two listener traits.
//!
//! ## Type-level walk
//!
//! Pre-order, depth-first over the declared types starting at a root. A
//! composite field whose type has not been visited yet is walked (nested
//! `begin_composite`/`end_composite`) *before* the owning type receives its
//! `composite_field`/`composite_array_field` event, so listeners can rely
//! on nested types being complete when they are referenced. Each type is
//! walked once.
//!
//! ## Value-level walk
//!
//! Depth-first over a [`Record`], fields in schema order. Composites report
//! their runtime type next to the declared one; checking the two is left to
//! the listener.

use std::collections::BTreeSet;

use crate::schema::{CompositeDef, FieldDef, FieldType, Schema};
use crate::value::{Record, Value};
use crate::{PersistError, PrimitiveKind};

// =============================================================================
// LISTENER TRAITS
// =============================================================================

/// Receiver of type-level events.
pub trait SchemaListener {
    /// Entering a composite type. `field` is `None` for the root.
    fn begin_composite(&mut self, field: Option<&str>, def: &CompositeDef) -> Result<(), PersistError>;

    /// Leaving the composite type entered by the matching `begin_composite`.
    fn end_composite(&mut self, field: Option<&str>) -> Result<(), PersistError>;

    /// A scalar primitive field.
    fn primitive_field(&mut self, name: &str, kind: PrimitiveKind, preserve_precision: bool) -> Result<(), PersistError>;

    /// An array field of primitives.
    fn primitive_array_field(
        &mut self,
        name: &str,
        kind: PrimitiveKind,
        dims: u32,
        preserve_precision: bool,
    ) -> Result<(), PersistError>;

    /// A scalar composite field. `def` has already been walked.
    fn composite_field(&mut self, name: &str, def: &CompositeDef) -> Result<(), PersistError>;

    /// An array field of composites. `def` has already been walked.
    fn composite_array_field(&mut self, name: &str, def: &CompositeDef, dims: u32) -> Result<(), PersistError>;

    /// A field whose type cannot be represented. The walk fails after this
    /// call whatever it returns.
    fn unknown_type(&mut self, owner: &CompositeDef, field: &FieldDef) -> Result<(), PersistError> {
        Err(PersistError::UnsupportedType {
            field: format!("{}.{}", owner.name, field.name),
            type_name: field.type_name.clone(),
        })
    }
}

/// Element type of an array event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType<'a> {
    Primitive(PrimitiveKind),
    Composite(&'a CompositeDef),
}

impl ElementType<'_> {
    /// True for arrays whose innermost elements are encoded as text
    /// (strings, dates, enums).
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(self, ElementType::Primitive(kind) if kind.is_textual())
    }
}

/// Receiver of value-level events.
pub trait ValueListener {
    /// Entering a composite value. `declared` is the field's declared type
    /// name (the root's own name for the root); `def` is the runtime type.
    fn begin_composite(&mut self, field: Option<&str>, declared: &str, def: &CompositeDef) -> Result<(), PersistError>;

    /// Leaving the composite value entered by the matching `begin_composite`.
    fn end_composite(&mut self, field: Option<&str>) -> Result<(), PersistError>;

    /// Entering one dimension of an array. `dims` counts this dimension and
    /// every inner one.
    fn begin_array(&mut self, field: &str, element: ElementType<'_>, dims: u32, len: usize) -> Result<(), PersistError>;

    /// Leaving the array dimension entered by the matching `begin_array`.
    fn end_array(&mut self, field: &str) -> Result<(), PersistError>;

    /// A scalar primitive. `value` is `Value::Null` for an absent value.
    fn primitive(&mut self, field: &str, kind: PrimitiveKind, value: &Value) -> Result<(), PersistError>;

    /// The innermost dimension of a primitive array, in one call.
    fn primitive_array(&mut self, field: &str, kind: PrimitiveKind, values: &[Value]) -> Result<(), PersistError>;

    /// A composite slot whose value is missing or zero-length.
    fn empty_composite(&mut self, field: &str, declared: &CompositeDef) -> Result<(), PersistError>;
}

// =============================================================================
// WALKER
// =============================================================================

/// Walks schemas and values for one schema.
#[derive(Debug, Clone, Copy)]
pub struct Walker<'s> {
    schema: &'s Schema,
}

impl<'s> Walker<'s> {
    /// Create a walker over `schema`.
    #[must_use]
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// The schema being walked.
    #[must_use]
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Type-level walk starting at `root`.
    pub fn walk_schema<L: SchemaListener + ?Sized>(&self, root: &'s CompositeDef, listener: &mut L) -> Result<(), PersistError> {
        let mut visited = BTreeSet::new();
        let mut in_progress = Vec::new();
        self.walk_type(None, root, listener, &mut visited, &mut in_progress)
    }

    fn walk_type<L: SchemaListener + ?Sized>(
        &self,
        field: Option<&str>,
        def: &'s CompositeDef,
        listener: &mut L,
        visited: &mut BTreeSet<&'s str>,
        in_progress: &mut Vec<&'s str>,
    ) -> Result<(), PersistError> {
        in_progress.push(def.name.as_str());
        listener.begin_composite(field, def)?;

        for f in &def.fields {
            match self.schema.resolve(f) {
                FieldType::Primitive(kind) => {
                    if f.is_array() {
                        listener.primitive_array_field(&f.name, kind, f.dims, f.preserve_precision)?;
                    } else {
                        listener.primitive_field(&f.name, kind, f.preserve_precision)?;
                    }
                }
                FieldType::Composite(child) => {
                    if in_progress.contains(&child.name.as_str()) {
                        return Err(PersistError::RecursiveType(child.name.clone()));
                    }
                    if !visited.contains(child.name.as_str()) {
                        self.walk_type(Some(f.name.as_str()), child, listener, visited, in_progress)?;
                    }
                    if f.is_array() {
                        listener.composite_array_field(&f.name, child, f.dims)?;
                    } else {
                        listener.composite_field(&f.name, child)?;
                    }
                }
                FieldType::Unknown => {
                    listener.unknown_type(def, f)?;
                    return Err(PersistError::UnsupportedType {
                        field: format!("{}.{}", def.name, f.name),
                        type_name: f.type_name.clone(),
                    });
                }
            }
        }

        listener.end_composite(field)?;
        in_progress.pop();
        visited.insert(def.name.as_str());
        Ok(())
    }

    /// Value-level walk of `root`.
    pub fn walk_value<L: ValueListener + ?Sized>(&self, root: &Record, listener: &mut L) -> Result<(), PersistError> {
        let def = self.runtime_def(root)?;
        self.walk_record(None, &def.name, def, root, listener)
    }

    fn runtime_def(&self, record: &Record) -> Result<&'s CompositeDef, PersistError> {
        self.schema
            .get(&record.type_name)
            .ok_or_else(|| PersistError::UnregisteredType(record.type_name.clone()))
    }

    fn walk_record<L: ValueListener + ?Sized>(
        &self,
        field: Option<&str>,
        declared: &str,
        def: &'s CompositeDef,
        record: &Record,
        listener: &mut L,
    ) -> Result<(), PersistError> {
        listener.begin_composite(field, declared, def)?;

        for f in &def.fields {
            let value = record.get(&f.name).unwrap_or(&Value::Null);
            match self.schema.resolve(f) {
                FieldType::Primitive(kind) if f.is_array() => {
                    self.walk_array(f, ElementType::Primitive(kind), f.dims, value, listener)?;
                }
                FieldType::Primitive(kind) => {
                    if !value.matches_kind(kind) {
                        return Err(type_mismatch(f, kind.name(), value));
                    }
                    listener.primitive(&f.name, kind, value)?;
                }
                FieldType::Composite(child) if f.is_array() => {
                    self.walk_array(f, ElementType::Composite(child), f.dims, value, listener)?;
                }
                FieldType::Composite(child) => self.walk_composite_slot(f, child, value, listener)?,
                FieldType::Unknown => {
                    return Err(PersistError::UnsupportedType {
                        field: format!("{}.{}", def.name, f.name),
                        type_name: f.type_name.clone(),
                    });
                }
            }
        }

        listener.end_composite(field)
    }

    fn walk_composite_slot<L: ValueListener + ?Sized>(
        &self,
        f: &FieldDef,
        declared: &'s CompositeDef,
        value: &Value,
        listener: &mut L,
    ) -> Result<(), PersistError> {
        match value {
            Value::Record(r) => {
                let def = self.runtime_def(r)?;
                self.walk_record(Some(f.name.as_str()), &declared.name, def, r, listener)
            }
            v if v.is_empty() => listener.empty_composite(&f.name, declared),
            other => Err(type_mismatch(f, &declared.name, other)),
        }
    }

    fn walk_array<L: ValueListener + ?Sized>(
        &self,
        f: &FieldDef,
        element: ElementType<'s>,
        dims: u32,
        value: &Value,
        listener: &mut L,
    ) -> Result<(), PersistError> {
        let items: &[Value] = match value {
            Value::Null => &[],
            Value::Array(items) => items,
            other => return Err(type_mismatch(f, "array", other)),
        };

        if let (1, ElementType::Primitive(kind)) = (dims, element) {
            for item in items {
                let null_ok = kind.is_textual() || !matches!(item, Value::Null);
                if !null_ok || !item.matches_kind(kind) {
                    return Err(type_mismatch(f, kind.name(), item));
                }
            }
            return listener.primitive_array(&f.name, kind, items);
        }

        listener.begin_array(&f.name, element, dims, items.len())?;
        for item in items {
            match element {
                _ if dims > 1 => self.walk_array(f, element, dims - 1, item, listener)?,
                ElementType::Composite(declared) => self.walk_composite_slot(f, declared, item, listener)?,
                ElementType::Primitive(kind) => return Err(type_mismatch(f, kind.name(), item)),
            }
        }
        listener.end_array(&f.name)
    }
}

fn type_mismatch(field: &FieldDef, expected: &str, found: &Value) -> PersistError {
    PersistError::TypeMismatch {
        field: field.name.clone(),
        expected: expected.to_string(),
        found: found.kind_name().to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
