//! # MAT-file Level 5 Format
//!
//! Serializes a container tree to an uncompressed MAT-file (version 5).
//! File I/O operations are in the app layer.
//!
//! Format: 128-byte header + one `miMATRIX` data element per variable.
//! - 116 bytes: descriptive text, space padded
//! - 8 bytes: subsystem data offset (unused, zero)
//! - 2 bytes: version (0x0100)
//! - 2 bytes: endian indicator ("IM" on little-endian hosts)
//!
//! Every data element is `[u32 type][u32 byte count][data]` padded to an
//! 8-byte boundary. Numbers are written in host byte order; the endian
//! indicator tells readers which one that was.

use byteorder::{NativeEndian, WriteBytesExt};
use chrono::{DateTime, Utc};

use crate::PersistError;
use crate::container::{MatValue, StructArray};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Size of the file header.
pub const HEADER_SIZE: usize = 128;

/// Length of the descriptive text field.
const HEADER_TEXT_SIZE: usize = 116;

/// MAT-file version written in the header.
pub const MAT_VERSION: u16 = 0x0100;

/// Endian indicator: the characters 'M' and 'I' packed into one u16.
pub const ENDIAN_INDICATOR: u16 = u16::from_be_bytes(*b"MI");

/// Longest field name MATLAB accepts.
pub const MAX_FIELD_NAME_LEN: usize = 63;

// data types
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;

// array classes
const MX_CELL: u8 = 1;
const MX_STRUCT: u8 = 2;
const MX_CHAR: u8 = 4;
const MX_DOUBLE: u8 = 6;
const MX_UINT8: u8 = 9;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The 128-byte header preceding all data elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatHeader {
    pub text: String,
    pub version: u16,
    pub endian: u16,
}

impl MatHeader {
    /// Header stamped with a creation time.
    #[must_use]
    pub fn new(created: DateTime<Utc>) -> Self {
        Self {
            text: format!(
                "MATLAB 5.0 MAT-file, Platform: {}, Created on: {}",
                std::env::consts::OS,
                created.format("%a %b %e %H:%M:%S %Y")
            ),
            version: MAT_VERSION,
            endian: ENDIAN_INDICATOR,
        }
    }

    /// Validate version and byte order.
    pub fn validate(&self) -> Result<(), PersistError> {
        if self.version != MAT_VERSION {
            return Err(PersistError::Serialization(format!(
                "Unsupported MAT version: {:#06x} (expected {:#06x})",
                self.version, MAT_VERSION
            )));
        }
        if self.endian != ENDIAN_INDICATOR {
            return Err(PersistError::Serialization(
                "MAT file written with foreign byte order".to_string(),
            ));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [b' '; HEADER_SIZE];
        let text = self.text.as_bytes();
        let n = text.len().min(HEADER_TEXT_SIZE);
        bytes[..n].copy_from_slice(&text[..n]);
        bytes[HEADER_TEXT_SIZE..HEADER_TEXT_SIZE + 8].fill(0);
        bytes[124..126].copy_from_slice(&self.version.to_ne_bytes());
        bytes[126..128].copy_from_slice(&self.endian.to_ne_bytes());
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PersistError::Serialization("MAT header too short".to_string()));
        }
        let text = String::from_utf8_lossy(&bytes[..HEADER_TEXT_SIZE]).trim_end().to_string();
        Ok(Self {
            text,
            version: u16::from_ne_bytes([bytes[124], bytes[125]]),
            endian: u16::from_ne_bytes([bytes[126], bytes[127]]),
        })
    }
}

impl Default for MatHeader {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize `value` as the single variable `name`, stamped with the
/// current time.
///
/// This is a pure transformation - no file I/O.
pub fn to_bytes(name: &str, value: &MatValue) -> Result<Vec<u8>, PersistError> {
    to_bytes_with_header(&MatHeader::default(), name, value)
}

/// Serialize `value` as the single variable `name` under a given header.
pub fn to_bytes_with_header(header: &MatHeader, name: &str, value: &MatValue) -> Result<Vec<u8>, PersistError> {
    let mut out = Vec::with_capacity(HEADER_SIZE + 256);
    out.extend_from_slice(&header.to_bytes());
    write_matrix(&mut out, name, value)?;
    tracing::debug!(variable = name, class = value.class_name(), bytes = out.len(), "encoded MAT file");
    Ok(out)
}

fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

fn u32_len(len: usize) -> Result<u32, PersistError> {
    u32::try_from(len).map_err(|_| PersistError::Serialization(format!("MAT element of {} bytes too large", len)))
}

/// Append one data element with its tag and trailing padding.
fn write_element(out: &mut Vec<u8>, data_type: u32, data: &[u8]) -> Result<(), PersistError> {
    out.write_u32::<NativeEndian>(data_type)?;
    out.write_u32::<NativeEndian>(u32_len(data.len())?)?;
    out.extend_from_slice(data);
    out.resize(out.len() + padding(data.len()), 0);
    Ok(())
}

fn write_matrix(out: &mut Vec<u8>, name: &str, value: &MatValue) -> Result<(), PersistError> {
    let mut body = Vec::new();
    let (rows, cols) = value.dims();

    let class = match value {
        MatValue::Struct(_) => MX_STRUCT,
        MatValue::Cell(_) => MX_CELL,
        MatValue::Double { .. } => MX_DOUBLE,
        MatValue::UInt8 { .. } => MX_UINT8,
        MatValue::Char(_) => MX_CHAR,
    };
    let mut flags = Vec::with_capacity(8);
    flags.write_u32::<NativeEndian>(u32::from(class))?;
    flags.write_u32::<NativeEndian>(0)?;
    write_element(&mut body, MI_UINT32, &flags)?;

    let mut dims = Vec::with_capacity(8);
    for d in [rows, cols] {
        let d = i32::try_from(d).map_err(|_| PersistError::Serialization(format!("dimension {} too large", d)))?;
        dims.write_i32::<NativeEndian>(d)?;
    }
    write_element(&mut body, MI_INT32, &dims)?;
    write_element(&mut body, MI_INT8, name.as_bytes())?;

    match value {
        MatValue::Double { data, .. } => {
            let mut raw = Vec::with_capacity(data.len() * 8);
            for v in data {
                raw.write_f64::<NativeEndian>(*v)?;
            }
            write_element(&mut body, MI_DOUBLE, &raw)?;
        }
        MatValue::UInt8 { data, .. } => write_element(&mut body, MI_UINT8, data)?,
        MatValue::Char(text) => {
            let mut raw = Vec::with_capacity(text.len() * 2);
            for unit in text.encode_utf16() {
                raw.write_u16::<NativeEndian>(unit)?;
            }
            write_element(&mut body, MI_UINT16, &raw)?;
        }
        MatValue::Cell(items) => {
            for item in items {
                write_matrix(&mut body, "", item)?;
            }
        }
        MatValue::Struct(s) => write_struct_body(&mut body, s)?,
    }

    write_element(out, MI_MATRIX, &body)
}

fn write_struct_body(body: &mut Vec<u8>, s: &StructArray) -> Result<(), PersistError> {
    let names = s.field_names();
    let longest = names.iter().map(String::len).max().unwrap_or(0);
    if longest > MAX_FIELD_NAME_LEN {
        return Err(PersistError::Serialization(format!(
            "field name longer than {} characters",
            MAX_FIELD_NAME_LEN
        )));
    }
    // room for the terminating NUL
    let slot = longest + 1;

    let mut len = Vec::with_capacity(4);
    len.write_i32::<NativeEndian>(slot as i32)?;
    write_element(body, MI_INT32, &len)?;

    let mut packed = vec![0u8; slot * names.len()];
    for (i, n) in names.iter().enumerate() {
        packed[i * slot..i * slot + n.len()].copy_from_slice(n.as_bytes());
    }
    write_element(body, MI_INT8, &packed)?;

    for row in s.elements() {
        for field in row {
            write_matrix(body, "", field)?;
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
