//! # Type Dictionary
//!
//! Assigns stable integer tags to the composite types of one object graph
//! and records each type's ordered field list. The dictionary is the
//! self-describing schema section of every binary file:
//!
//! ```text
//! [int32 classCount]
//!   { [int32 typeTag][string name][int32 fieldCount]
//!       { [string name][int32 typeTag][int32 arrayDims] } }
//! ```
//!
//! ## Tag assignment
//!
//! Tags are handed out sequentially from 12 in first-encounter order of a
//! pre-order, depth-first type walk. A type is registered once its field
//! list is complete, so the types it contains are always registered (and
//! numbered) before it. Nothing here depends on hash ordering: the same
//! schema always yields byte-identical headers.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::primitives::{FIRST_COMPOSITE_TAG, MAX_ARRAY_DIMENSIONS, MAX_DICTIONARY_TYPES, MAX_FIELDS_PER_TYPE};
use crate::schema::{CompositeDef, Schema};
use crate::stream::wire::{self, WireReader};
use crate::walker::{SchemaListener, Walker};
use crate::{PersistError, PrimitiveKind, TypeTag};

// =============================================================================
// DESCRIPTORS
// =============================================================================

/// One field of a composite type as recorded in the dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_tag: TypeTag,
    /// 0 for scalars.
    pub array_dimensions: i32,
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, type_tag: TypeTag, array_dimensions: i32) -> Self {
        Self {
            name: name.into(),
            type_tag,
            array_dimensions,
        }
    }
}

/// A composite type as recorded in the dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeDescriptor {
    pub type_tag: TypeTag,
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    /// Find a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// =============================================================================
// DICTIONARY
// =============================================================================

/// Ordered set of type descriptors for one serialization call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dictionary {
    types: Vec<TypeDescriptor>,
    #[serde(skip)]
    by_name: BTreeMap<String, TypeTag>,
    #[serde(skip)]
    last_tag: i32,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    /// Create an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            by_name: BTreeMap::new(),
            last_tag: FIRST_COMPOSITE_TAG - 1,
        }
    }

    /// Build the dictionary of every composite reachable from `root`.
    pub fn from_schema(schema: &Schema, root: &CompositeDef) -> Result<Self, PersistError> {
        let mut builder = DictionaryBuilder::default();
        Walker::new(schema).walk_schema(root, &mut builder)?;
        if !builder.pending.is_empty() {
            return Err(PersistError::UnbalancedStack {
                expected: 0,
                found: builder.pending.len(),
            });
        }
        Ok(builder.dictionary)
    }

    /// Register a type, returning its tag. Idempotent.
    pub fn register_type(&mut self, name: &str) -> TypeTag {
        if let Some(&tag) = self.by_name.get(name) {
            return tag;
        }
        self.last_tag += 1;
        let tag = TypeTag(self.last_tag);
        self.by_name.insert(name.to_string(), tag);
        self.types.push(TypeDescriptor {
            type_tag: tag,
            name: name.to_string(),
            fields: Vec::new(),
        });
        tracing::trace!(type_name = name, tag = tag.value(), "registered type");
        tag
    }

    /// Append a field to a registered type.
    pub fn add_field(&mut self, tag: TypeTag, field: FieldDescriptor) -> Result<(), PersistError> {
        let descriptor = self
            .types
            .iter_mut()
            .find(|t| t.type_tag == tag)
            .ok_or_else(|| PersistError::UnregisteredType(format!("tag {}", tag)))?;
        descriptor.fields.push(field);
        Ok(())
    }

    /// Fixed lookup from primitive name to reserved tag.
    pub fn tag_for_primitive_name(name: &str) -> Result<TypeTag, PersistError> {
        PrimitiveKind::from_name(name)
            .map(PrimitiveKind::tag)
            .ok_or_else(|| PersistError::UnknownPrimitive(name.to_string()))
    }

    /// Tag of a registered composite type.
    #[must_use]
    pub fn tag_for(&self, name: &str) -> Option<TypeTag> {
        self.by_name.get(name).copied()
    }

    /// Descriptor for a composite tag.
    #[must_use]
    pub fn descriptor(&self, tag: TypeTag) -> Option<&TypeDescriptor> {
        // Tags are dense and ordered for dictionaries built here; fall back
        // to a scan for headers read from foreign files.
        let index = tag
            .value()
            .checked_sub(FIRST_COMPOSITE_TAG)
            .and_then(|i| usize::try_from(i).ok());
        match index.and_then(|i| self.types.get(i)) {
            Some(t) if t.type_tag == tag => Some(t),
            _ => self.types.iter().find(|t| t.type_tag == tag),
        }
    }

    /// Descriptors in registration order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    /// Number of registered composite types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if no composite type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Human-readable name of any tag, primitive or composite.
    #[must_use]
    pub fn type_name(&self, tag: TypeTag) -> String {
        match tag.primitive_kind() {
            Some(kind) => kind.name().to_string(),
            None => self
                .descriptor(tag)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| format!("<tag {}>", tag)),
        }
    }

    /// Write the dictionary section.
    pub fn serialize_header<W: Write + ?Sized>(&self, sink: &mut W) -> Result<(), PersistError> {
        wire::write_len(sink, self.types.len())?;
        for t in &self.types {
            wire::write_i32(sink, t.type_tag.value())?;
            wire::write_string(sink, &t.name)?;
            wire::write_len(sink, t.fields.len())?;
            for f in &t.fields {
                wire::write_string(sink, &f.name)?;
                wire::write_i32(sink, f.type_tag.value())?;
                wire::write_i32(sink, f.array_dimensions)?;
            }
        }
        Ok(())
    }

    /// The dictionary section as bytes.
    pub fn header_bytes(&self) -> Result<Vec<u8>, PersistError> {
        let mut buf = Vec::new();
        self.serialize_header(&mut buf)?;
        Ok(buf)
    }

    /// Parse a dictionary section.
    ///
    /// Validates counts against the decode limits and tag uniqueness. Every
    /// field tag must be intrinsic or name a type listed before it, which
    /// also rules out recursive types.
    pub fn read_header(reader: &mut WireReader<'_>) -> Result<Self, PersistError> {
        // smallest type entry: tag + empty name + field count
        let count = reader.read_len(12)?;
        if count > MAX_DICTIONARY_TYPES {
            return Err(PersistError::Serialization(format!(
                "dictionary lists {} types (maximum {})",
                count, MAX_DICTIONARY_TYPES
            )));
        }

        let mut dictionary = Dictionary::new();
        let mut known = BTreeSet::new();
        for _ in 0..count {
            let tag = TypeTag(reader.read_i32()?);
            if tag.value() < FIRST_COMPOSITE_TAG {
                return Err(PersistError::Serialization(format!("composite type uses reserved tag {}", tag)));
            }
            let name = reader.read_string()?;
            // smallest field entry: empty name + tag + dims
            let field_count = reader.read_len(12)?;
            if field_count > MAX_FIELDS_PER_TYPE {
                return Err(PersistError::Serialization(format!(
                    "type '{}' lists {} fields (maximum {})",
                    name, field_count, MAX_FIELDS_PER_TYPE
                )));
            }
            let mut fields = Vec::with_capacity(field_count);
            for _ in 0..field_count {
                let field_name = reader.read_string()?;
                let field_tag = TypeTag(reader.read_i32()?);
                let dims = reader.read_i32()?;
                if dims < 0 || dims as u32 > MAX_ARRAY_DIMENSIONS {
                    return Err(PersistError::Serialization(format!(
                        "field '{}.{}' has invalid dimensionality {}",
                        name, field_name, dims
                    )));
                }
                // types are listed children first, so a composite field
                // must name a type that has already been read
                if !field_tag.is_primitive() && !known.contains(&field_tag) {
                    return Err(PersistError::Serialization(format!(
                        "field '{}.{}' references unknown tag {}",
                        name, field_name, field_tag
                    )));
                }
                fields.push(FieldDescriptor::new(field_name, field_tag, dims));
            }

            if dictionary.by_name.contains_key(&name) || !known.insert(tag) {
                return Err(PersistError::Serialization(format!("duplicate type '{}' (tag {})", name, tag)));
            }
            dictionary.by_name.insert(name.clone(), tag);
            dictionary.last_tag = dictionary.last_tag.max(tag.value());
            dictionary.types.push(TypeDescriptor {
                type_tag: tag,
                name,
                fields,
            });
        }
        Ok(dictionary)
    }
}

// =============================================================================
// BUILDER (type-level listener)
// =============================================================================

#[derive(Default)]
struct DictionaryBuilder {
    dictionary: Dictionary,
    /// Types whose field lists are still being collected, innermost last.
    pending: Vec<(String, Vec<FieldDescriptor>)>,
}

impl DictionaryBuilder {
    fn push_field(&mut self, field: FieldDescriptor) -> Result<(), PersistError> {
        let (_, fields) = self.pending.last_mut().ok_or(PersistError::UnbalancedStack {
            expected: 1,
            found: 0,
        })?;
        fields.push(field);
        Ok(())
    }

    /// Dimensionality of an array field, held to the limit the reader enforces.
    fn array_dims(&self, name: &str, dims: u32) -> Result<i32, PersistError> {
        let owner = self.pending.last().map_or("", |(owner, _)| owner.as_str());
        match i32::try_from(dims) {
            Ok(d) if dims <= MAX_ARRAY_DIMENSIONS => Ok(d),
            _ => Err(PersistError::InvalidSchema(format!(
                "field '{}.{}' has {} dimensions (maximum {})",
                owner, name, dims, MAX_ARRAY_DIMENSIONS
            ))),
        }
    }

    fn composite_tag(&self, def: &CompositeDef) -> Result<TypeTag, PersistError> {
        self.dictionary
            .tag_for(&def.name)
            .ok_or_else(|| PersistError::UnregisteredType(def.name.clone()))
    }
}

impl SchemaListener for DictionaryBuilder {
    fn begin_composite(&mut self, _field: Option<&str>, def: &CompositeDef) -> Result<(), PersistError> {
        self.pending.push((def.name.clone(), Vec::new()));
        Ok(())
    }

    fn end_composite(&mut self, _field: Option<&str>) -> Result<(), PersistError> {
        let (name, fields) = self.pending.pop().ok_or(PersistError::UnbalancedStack {
            expected: 1,
            found: 0,
        })?;
        let tag = self.dictionary.register_type(&name);
        for field in fields {
            self.dictionary.add_field(tag, field)?;
        }
        Ok(())
    }

    fn primitive_field(&mut self, name: &str, kind: PrimitiveKind, _preserve: bool) -> Result<(), PersistError> {
        let tag = Dictionary::tag_for_primitive_name(kind.name())?;
        self.push_field(FieldDescriptor::new(name, tag, 0))
    }

    fn primitive_array_field(&mut self, name: &str, kind: PrimitiveKind, dims: u32, _preserve: bool) -> Result<(), PersistError> {
        let tag = Dictionary::tag_for_primitive_name(kind.name())?;
        let dims = self.array_dims(name, dims)?;
        self.push_field(FieldDescriptor::new(name, tag, dims))
    }

    fn composite_field(&mut self, name: &str, def: &CompositeDef) -> Result<(), PersistError> {
        let tag = self.composite_tag(def)?;
        self.push_field(FieldDescriptor::new(name, tag, 0))
    }

    fn composite_array_field(&mut self, name: &str, def: &CompositeDef, dims: u32) -> Result<(), PersistError> {
        let tag = self.composite_tag(def)?;
        let dims = self.array_dims(name, dims)?;
        self.push_field(FieldDescriptor::new(name, tag, dims))
    }
}

// =============================================================================
// TESTS
// =============================================================================
