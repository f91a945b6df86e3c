//! # persistable-core
//!
//! Schema-driven object-graph serialization with three backends sharing
//! one graph walker:
//!
//! - `stream`: a compact, self-describing binary file (magic number,
//!   type dictionary, top-level tag, depth-first body) plus its reader
//! - `container`: a MATLAB-style struct/cell tree, exported as a Level 5
//!   MAT-file by `formats::mat`
//! - `codegen`: MATLAB `read_*`/`write_*` functions reproducing the binary
//!   layout byte for byte
//!
//! ## Architectural Constraints
//!
//! - The walker is the only component that looks at the [`Schema`]; the
//!   backends consume its callbacks and keep their own frame stacks
//! - Type tags follow first-encounter order; all maps are `BTreeMap`
//! - No polymorphism: a value whose runtime type differs from the declared
//!   field type is rejected
//! - Backends produce bytes, containers or text; file I/O lives in the app
//!   (the one exception being `GeneratedSources::write_to_dir`)

// =============================================================================
// MODULES
// =============================================================================

pub mod codegen;
pub mod container;
#[cfg(feature = "crypto-hash")]
pub mod digest;
pub mod dictionary;
pub mod formats;
pub mod primitives;
pub mod schema;
pub mod stream;
pub mod types;
pub mod value;
pub mod walker;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{PersistError, PrimitiveKind, TypeTag};

// =============================================================================
// RE-EXPORTS: Schema, Values, Walker
// =============================================================================

pub use dictionary::{Dictionary, FieldDescriptor, TypeDescriptor};
pub use schema::{CompositeDef, FieldDef, FieldType, Schema};
pub use value::{Record, Value};
pub use walker::{ElementType, SchemaListener, ValueListener, Walker};

// =============================================================================
// RE-EXPORTS: Backends
// =============================================================================

pub use codegen::{GeneratedFile, GeneratedSources, MatlabGenerator, generate};
pub use container::{ContainerWriter, MatValue, StructArray};
pub use stream::{BinaryReader, BinaryWriter, Decoded};

#[cfg(feature = "crypto-hash")]
pub use digest::{digest_hex, verify_digest};
