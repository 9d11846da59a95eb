//! File header parsing.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic            [u8; 4]   "BARK"
//! format_version   u16       1: u32 particle counts, 2: u64 particle counts
//! format_variant   u16
//! generator_len    u32
//! generator        [u8; generator_len]   UTF-8
//! quantity_count   u16
//! quantity_count times:
//!     name_len     u8
//!     name         [u8; name_len]        UTF-8
//!     kind         u8        0 = int, 1 = double
//!     width        u8        int: 1, 2, 4, 8; double: 4, 8
//! ```

use crate::reader::ReadError;
use crate::registry::SchemaError;
use crate::types::{Encoding, QuantityDef, Schema, ValueKind};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};

/// Magic bytes at the start of every file.
pub const MAGIC: [u8; 4] = *b"BARK";

/// Oldest supported format version.
pub const MIN_VERSION: u16 = 1;

/// Newest supported format version.
pub const MAX_VERSION: u16 = 2;

/// Width of the per-event particle count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountWidth {
    U32,
    U64,
}

impl CountWidth {
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }
}

/// Parsed file header.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    /// Format version
    pub version: u16,
    /// Producer-defined variant, carried through unchanged
    pub variant: u16,
    /// Name and version of the program that wrote the file
    pub generator: String,
    /// Layout of one particle record
    pub schema: Schema,
}

impl FileHeader {
    /// Width of event particle counts for this version.
    pub fn count_width(&self) -> CountWidth {
        match self.version {
            1 => CountWidth::U32,
            _ => CountWidth::U64,
        }
    }

    /// Size of the header in bytes as it appears on disk.
    pub fn encoded_len(&self) -> usize {
        let quantities: usize = self
            .schema
            .quantities()
            .iter()
            .map(|q| 1 + q.name.len() + 2)
            .sum();
        4 + 2 + 2 + 4 + self.generator.len() + 2 + quantities
    }

    /// Reads a header from the start of a stream.
    ///
    /// Only the bytes of the header are consumed. A stream ending inside the
    /// header is reported as [`ReadError::Truncated`].
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ReadError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(header_error)?;
        if magic != MAGIC {
            return Err(ReadError::InvalidFormat(format!(
                "bad magic number {:?}, expected {:?}",
                String::from_utf8_lossy(&magic),
                String::from_utf8_lossy(&MAGIC)
            )));
        }

        let version = reader.read_u16::<LittleEndian>().map_err(header_error)?;
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(ReadError::UnsupportedVersion(version));
        }
        let variant = reader.read_u16::<LittleEndian>().map_err(header_error)?;

        let generator_len = reader.read_u32::<LittleEndian>().map_err(header_error)?;
        let generator = read_string(reader, generator_len as usize)?;

        let count = reader.read_u16::<LittleEndian>().map_err(header_error)?;
        let mut defs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_len = reader.read_u8().map_err(header_error)?;
            let name = read_string(reader, name_len as usize)?;
            let kind_tag = reader.read_u8().map_err(header_error)?;
            let width = reader.read_u8().map_err(header_error)?;

            let encoding = ValueKind::from_tag(kind_tag)
                .and_then(|kind| Encoding::from_parts(kind, width))
                .ok_or_else(|| SchemaError::InvalidEncoding {
                    name: name.clone(),
                    kind_tag,
                    width,
                })?;
            defs.push(QuantityDef::new(name, encoding));
        }
        let schema = Schema::new(defs)?;

        log::debug!(
            "Header: version {} variant {}, generator {:?}, {} quantities, {} bytes per record",
            version,
            variant,
            generator,
            schema.len(),
            schema.record_size()
        );

        Ok(Self {
            version,
            variant,
            generator,
            schema,
        })
    }
}

fn read_string<R: Read>(reader: &mut R, len: usize) -> Result<String, ReadError> {
    let mut buf = Vec::new();
    reader
        .by_ref()
        .take(len as u64)
        .read_to_end(&mut buf)
        .map_err(header_error)?;
    if buf.len() != len {
        return Err(ReadError::Truncated {
            context: "file header".to_string(),
        });
    }
    String::from_utf8(buf)
        .map_err(|e| ReadError::InvalidFormat(format!("header string is not UTF-8: {}", e)))
}

fn header_error(err: io::Error) -> ReadError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ReadError::Truncated {
            context: "file header".to_string(),
        }
    } else {
        ReadError::Io(err)
    }
}
