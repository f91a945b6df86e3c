//! # Formats Module
//!
//! Container-file formats for the structured-container backend.
//!
//! Binary stream encoding lives in [`crate::stream`]; this module only
//! holds exporters for third-party container files.

pub mod mat;

pub use mat::{MatHeader, to_bytes as mat_to_bytes};
