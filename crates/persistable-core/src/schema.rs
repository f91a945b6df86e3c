//! # Schema
//!
//! The static description of the composite types an object graph is built
//! from. A schema plays the part of class metadata: it is what the walker
//! consults to know which fields a composite has, in which order, and with
//! which declared type.
//!
//! Schemas are built in code or loaded from TOML:
//!
//! ```toml
//! root = "Path"
//!
//! [[types]]
//! name = "Point"
//! fields = [
//!     { name = "x", type = "double" },
//!     { name = "y", type = "double" },
//! ]
//!
//! [[types]]
//! name = "Path"
//! fields = [{ name = "points", type = "Point", dims = 1 }]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::primitives::MAX_ARRAY_DIMENSIONS;
use crate::{PersistError, PrimitiveKind};

// =============================================================================
// FIELD & COMPOSITE DEFINITIONS
// =============================================================================

/// One declared field of a composite type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,

    /// Declared type: a primitive name or a composite type name.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Array dimensionality (0 = scalar).
    #[serde(default)]
    pub dims: u32,

    /// Keep the native width in generated code instead of promoting to double.
    #[serde(default)]
    pub preserve_precision: bool,
}

impl FieldDef {
    /// A scalar field.
    #[must_use]
    pub fn scalar(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::array(name, type_name, 0)
    }

    /// An array field with the given dimensionality.
    #[must_use]
    pub fn array(name: impl Into<String>, type_name: impl Into<String>, dims: u32) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            dims,
            preserve_precision: false,
        }
    }

    /// Request native-width encoding tokens for this field.
    #[must_use]
    pub fn preserving(mut self) -> Self {
        self.preserve_precision = true;
        self
    }

    /// True if the field is an array of any dimensionality.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.dims > 0
    }
}

/// A composite type: a name and an ordered field list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeDef {
    /// Fully-qualified type name.
    pub name: String,

    /// Fields in declaration (and encoding) order.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl CompositeDef {
    /// Start a composite definition with no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a scalar field.
    #[must_use]
    pub fn field(mut self, name: &str, type_name: &str) -> Self {
        self.fields.push(FieldDef::scalar(name, type_name));
        self
    }

    /// Append an array field.
    #[must_use]
    pub fn array_field(mut self, name: &str, type_name: &str, dims: u32) -> Self {
        self.fields.push(FieldDef::array(name, type_name, dims));
        self
    }

    /// Append a prepared field definition.
    #[must_use]
    pub fn with(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Find a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The unqualified name (text after the last `.` or `::`).
    #[must_use]
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }
}

/// The unqualified part of a possibly qualified type name.
#[must_use]
pub fn simple_name(name: &str) -> &str {
    let after_path = name.rsplit("::").next().unwrap_or(name);
    after_path.rsplit('.').next().unwrap_or(after_path)
}

// =============================================================================
// RESOLVED FIELD TYPES
// =============================================================================

/// What a field's declared type name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType<'a> {
    /// One of the intrinsic kinds.
    Primitive(PrimitiveKind),
    /// A composite defined in the same schema.
    Composite(&'a CompositeDef),
    /// Neither; always fatal once reached by a walk.
    Unknown,
}

// =============================================================================
// SCHEMA
// =============================================================================

#[derive(Deserialize)]
struct SchemaFile {
    #[serde(default)]
    root: Option<String>,
    #[serde(default)]
    types: Vec<CompositeDef>,
}

/// An ordered set of composite types plus an optional default root type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    root: Option<String>,
    types: Vec<CompositeDef>,
    index: BTreeMap<String, usize>,
}

impl Schema {
    /// Create an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a composite type, replacing any earlier definition of the same name.
    pub fn add_type(&mut self, def: CompositeDef) {
        if let Some(&i) = self.index.get(&def.name) {
            self.types[i] = def;
        } else {
            self.index.insert(def.name.clone(), self.types.len());
            self.types.push(def);
        }
    }

    /// Builder form of [`Schema::add_type`].
    #[must_use]
    pub fn with_type(mut self, def: CompositeDef) -> Self {
        self.add_type(def);
        self
    }

    /// Set the default root type.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// The default root type, if one was declared.
    #[must_use]
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// The root definition, or an error when none is declared or it is unknown.
    pub fn root_def(&self) -> Result<&CompositeDef, PersistError> {
        let root = self
            .root
            .as_deref()
            .ok_or_else(|| PersistError::InvalidSchema("no root type declared".to_string()))?;
        self.require(root)
    }

    /// Look up a composite type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CompositeDef> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    /// Look up a composite type by name, failing with `InvalidSchema`.
    pub fn require(&self, name: &str) -> Result<&CompositeDef, PersistError> {
        self.get(name)
            .ok_or_else(|| PersistError::InvalidSchema(format!("unknown composite type '{}'", name)))
    }

    /// Composite types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = &CompositeDef> {
        self.types.iter()
    }

    /// Number of composite types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if no composite types are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Resolve a field's declared type name.
    #[must_use]
    pub fn resolve(&self, field: &FieldDef) -> FieldType<'_> {
        if let Some(kind) = PrimitiveKind::from_name(&field.type_name) {
            return FieldType::Primitive(kind);
        }
        match self.get(&field.type_name) {
            Some(def) => FieldType::Composite(def),
            None => FieldType::Unknown,
        }
    }

    /// Check structural well-formedness.
    ///
    /// Unknown field types are NOT reported here: they are only fatal when a
    /// walk actually reaches them.
    pub fn validate(&self) -> Result<(), PersistError> {
        for def in &self.types {
            if def.name.is_empty() {
                return Err(PersistError::InvalidSchema("empty type name".to_string()));
            }
            if PrimitiveKind::from_name(&def.name).is_some() {
                return Err(PersistError::InvalidSchema(format!(
                    "type name '{}' collides with a primitive kind",
                    def.name
                )));
            }
            let mut seen = BTreeSet::new();
            for field in &def.fields {
                if field.name.is_empty() {
                    return Err(PersistError::InvalidSchema(format!(
                        "empty field name in '{}'",
                        def.name
                    )));
                }
                if !seen.insert(field.name.as_str()) {
                    return Err(PersistError::InvalidSchema(format!(
                        "duplicate field '{}' in '{}'",
                        field.name, def.name
                    )));
                }
                if field.dims > MAX_ARRAY_DIMENSIONS {
                    return Err(PersistError::InvalidSchema(format!(
                        "field '{}.{}' has {} dimensions (maximum {})",
                        def.name, field.name, field.dims, MAX_ARRAY_DIMENSIONS
                    )));
                }
            }
        }
        if let Some(root) = &self.root {
            self.require(root)?;
        }
        Ok(())
    }

    /// Parse and validate a TOML schema document.
    pub fn from_toml_str(text: &str) -> Result<Self, PersistError> {
        let file: SchemaFile = toml::from_str(text)
            .map_err(|e| PersistError::InvalidSchema(format!("TOML: {}", e)))?;

        let mut schema = Schema::new();
        for def in file.types {
            if schema.get(&def.name).is_some() {
                return Err(PersistError::InvalidSchema(format!(
                    "duplicate type '{}'",
                    def.name
                )));
            }
            schema.add_type(def);
        }
        schema.root = file.root;
        schema.validate()?;
        Ok(schema)
    }
}

// =============================================================================
// TESTS
// =============================================================================
