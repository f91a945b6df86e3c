//! # Binary Stream
//!
//! The flat, self-describing byte format:
//! - `writer` encodes object graphs (walker-driven)
//! - `reader` decodes them from the embedded dictionary alone
//! - `wire` holds the native-order primitive codecs both share

pub mod reader;
pub mod wire;
pub mod writer;

pub use reader::{BinaryReader, Decoded};
pub use writer::{BinaryWriter, save, save_to};
