//! Native-order integer/float/string primitives shared by the dictionary,
//! the stream writer and the reader.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use crate::PersistError;

/// Write an int32 in host byte order.
pub fn write_i32<W: Write + ?Sized>(sink: &mut W, v: i32) -> Result<(), PersistError> {
    sink.write_i32::<NativeEndian>(v)?;
    Ok(())
}

/// Write a length prefix. Lengths beyond `i32::MAX` cannot be represented.
pub fn write_len<W: Write + ?Sized>(sink: &mut W, len: usize) -> Result<(), PersistError> {
    let len = i32::try_from(len)
        .map_err(|_| PersistError::Serialization(format!("length {} exceeds int32", len)))?;
    write_i32(sink, len)
}

/// Write `[int32 byte length][raw UTF-8 bytes]`.
pub fn write_string<W: Write + ?Sized>(sink: &mut W, s: &str) -> Result<(), PersistError> {
    write_len(sink, s.len())?;
    sink.write_all(s.as_bytes())?;
    Ok(())
}

/// Cursor over an encoded buffer with bounds-checked reads.
///
/// A short read surfaces as `PersistError::Serialization`, never as a panic.
pub struct WireReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

fn truncated(what: &str, e: io::Error) -> PersistError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        PersistError::Serialization(format!("truncated input reading {}", what))
    } else {
        PersistError::Io(e)
    }
}

impl<'a> WireReader<'a> {
    /// Start reading at the beginning of `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    /// Current byte offset.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    pub fn read_u8(&mut self) -> Result<u8, PersistError> {
        self.cursor.read_u8().map_err(|e| truncated("u8", e))
    }

    pub fn read_i8(&mut self) -> Result<i8, PersistError> {
        self.cursor.read_i8().map_err(|e| truncated("i8", e))
    }

    pub fn read_i16(&mut self) -> Result<i16, PersistError> {
        self.cursor.read_i16::<NativeEndian>().map_err(|e| truncated("i16", e))
    }

    pub fn read_i32(&mut self) -> Result<i32, PersistError> {
        self.cursor.read_i32::<NativeEndian>().map_err(|e| truncated("i32", e))
    }

    pub fn read_i64(&mut self) -> Result<i64, PersistError> {
        self.cursor.read_i64::<NativeEndian>().map_err(|e| truncated("i64", e))
    }

    pub fn read_f32(&mut self) -> Result<f32, PersistError> {
        self.cursor.read_f32::<NativeEndian>().map_err(|e| truncated("f32", e))
    }

    pub fn read_f64(&mut self) -> Result<f64, PersistError> {
        self.cursor.read_f64::<NativeEndian>().map_err(|e| truncated("f64", e))
    }

    /// Read an int32 length prefix, rejecting negatives and lengths that
    /// could not possibly fit in the remaining input at `min_width` bytes
    /// per element.
    pub fn read_len(&mut self, min_width: usize) -> Result<usize, PersistError> {
        let len = self.read_i32()?;
        let len = usize::try_from(len)
            .map_err(|_| PersistError::Serialization(format!("negative length {}", len)))?;
        if len.saturating_mul(min_width) > self.remaining() {
            return Err(PersistError::Serialization(format!(
                "length {} exceeds remaining {} bytes",
                len,
                self.remaining()
            )));
        }
        Ok(len)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, PersistError> {
        let len = self.read_len(1)?;
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|e| truncated("string", e))?;
        String::from_utf8(buf).map_err(|e| PersistError::Serialization(format!("invalid UTF-8 string: {}", e)))
    }
}
