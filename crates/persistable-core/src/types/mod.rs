//! # Core Type Definitions
//!
//! This module contains the types shared by every backend:
//! - Type identifiers (`TypeTag`, `PrimitiveKind`)
//! - Error types (`PersistError`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! without any dependence on hash ordering.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::primitives;

// =============================================================================
// TYPE TAG
// =============================================================================

/// Integer identifier of a type within one serialized file.
///
/// Tags 1-11 are reserved for the intrinsic kinds; composite types are
/// numbered from [`primitives::FIRST_COMPOSITE_TAG`] upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeTag(pub i32);

impl TypeTag {
    /// Get the raw tag value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// True if this tag names one of the intrinsic kinds.
    #[must_use]
    pub const fn is_primitive(self) -> bool {
        self.0 >= 1 && self.0 < primitives::FIRST_COMPOSITE_TAG
    }

    /// The intrinsic kind for this tag, if any.
    #[must_use]
    pub fn primitive_kind(self) -> Option<PrimitiveKind> {
        PrimitiveKind::ALL.iter().copied().find(|k| k.tag() == self)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// PRIMITIVE KINDS
// =============================================================================

/// The intrinsic (non-composite) kinds a field may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Char,
    Date,
    Enum,
}

impl PrimitiveKind {
    /// All kinds, in tag order.
    pub const ALL: [PrimitiveKind; 11] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
        PrimitiveKind::String,
        PrimitiveKind::Char,
        PrimitiveKind::Date,
        PrimitiveKind::Enum,
    ];

    /// The reserved type tag of this kind.
    #[must_use]
    pub const fn tag(self) -> TypeTag {
        TypeTag(match self {
            PrimitiveKind::Boolean => 1,
            PrimitiveKind::Byte => 2,
            PrimitiveKind::Short => 3,
            PrimitiveKind::Int => 4,
            PrimitiveKind::Long => 5,
            PrimitiveKind::Float => 6,
            PrimitiveKind::Double => 7,
            PrimitiveKind::String => 8,
            PrimitiveKind::Char => 9,
            PrimitiveKind::Date => 10,
            PrimitiveKind::Enum => 11,
        })
    }

    /// Canonical lowercase name, as used in schema files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "string",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Enum => "enum",
        }
    }

    /// Look up a kind by its canonical name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Encoded size in bytes of a scalar of this kind.
    ///
    /// `None` for the kinds written as length-prefixed strings.
    #[must_use]
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            PrimitiveKind::Boolean | PrimitiveKind::Byte | PrimitiveKind::Char => Some(1),
            PrimitiveKind::Short => Some(2),
            PrimitiveKind::Int | PrimitiveKind::Float => Some(4),
            PrimitiveKind::Long | PrimitiveKind::Double => Some(8),
            PrimitiveKind::String | PrimitiveKind::Date | PrimitiveKind::Enum => None,
        }
    }

    /// True for the kinds encoded as length-prefixed text.
    #[must_use]
    pub const fn is_textual(self) -> bool {
        self.fixed_width().is_none()
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while describing, encoding, decoding or generating.
///
/// Every variant is fatal for the call that produced it; nothing is retried.
#[derive(Debug, Error)]
pub enum PersistError {
    // --- schema errors -------------------------------------------------------
    /// A field names a type that is neither intrinsic nor a known composite.
    #[error("Unsupported type '{type_name}' for field '{field}'")]
    UnsupportedType { field: String, type_name: String },

    /// A primitive name lookup failed.
    #[error("Unknown primitive: {0}")]
    UnknownPrimitive(String),

    /// A value's runtime type was never registered in the dictionary.
    #[error("Type '{0}' is not in the dictionary")]
    UnregisteredType(String),

    /// A value's runtime type differs from the declared field type.
    #[error("Field '{field}' declared as '{declared}' holds a '{actual}' (no polymorphism)")]
    PolymorphicValue {
        field: String,
        declared: String,
        actual: String,
    },

    /// A composite type contains itself.
    #[error("Recursive type: {0}")]
    RecursiveType(String),

    /// An empty inner char row would be indistinguishable from an empty numeric array.
    #[error("Field '{0}': multi-dimensional char arrays are ambiguous when empty")]
    AmbiguousEmptyString(String),

    /// A value does not match the kind its field declares.
    #[error("Field '{field}' expects {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// The schema itself is malformed.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    // --- structural-consistency errors ---------------------------------------
    /// An end callback did not match the innermost open frame.
    #[error("Field name mismatch, expected: {expected}, but was: {found}")]
    FrameMismatch { expected: String, found: String },

    /// The frame stack did not unwind to its root.
    #[error("Expected stack size to be {expected}, but it's actually: {found}")]
    UnbalancedStack { expected: usize, found: usize },

    // --- data errors -----------------------------------------------------------
    /// A non-array composite field holds an empty value.
    #[error("Field '{field}' is a non-array composite but its value is empty")]
    EmptyComposite { field: String },

    // --- io / format ------------------------------------------------------------
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoded data is malformed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PersistError {
    /// True for errors caused by the schema rather than the data or the I/O.
    #[must_use]
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            PersistError::UnsupportedType { .. }
                | PersistError::UnknownPrimitive(_)
                | PersistError::UnregisteredType(_)
                | PersistError::PolymorphicValue { .. }
                | PersistError::RecursiveType(_)
                | PersistError::AmbiguousEmptyString(_)
                | PersistError::TypeMismatch { .. }
                | PersistError::InvalidSchema(_)
        )
    }
}
