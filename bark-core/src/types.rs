//! Core types describing particle records.
//!
//! A particle record is a fixed-size run of little-endian members. Each member
//! is a named quantity with an [`Encoding`] that fixes both its primitive kind
//! and its byte width.

use crate::registry::SchemaError;
use std::collections::HashMap;
use std::fmt;

/// Primitive kind a quantity decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Two's-complement integer, delivered as `i64`
    Int,
    /// IEEE-754 floating point, delivered as `f64`
    Double,
}

impl ValueKind {
    /// Tag used for this kind in the file header.
    #[inline]
    pub fn tag(self) -> u8 {
        match self {
            Self::Int => 0,
            Self::Double => 1,
        }
    }

    /// Parses a header kind tag.
    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Int),
            1 => Some(Self::Double),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("int"),
            Self::Double => f.write_str("double"),
        }
    }
}

/// On-disk encoding of one record member.
///
/// All multi-byte encodings are little-endian. Integers are sign-extended to
/// `i64`, floats are widened to `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Encoding {
    /// Builds an encoding from a kind and a byte width.
    ///
    /// Returns `None` for pairs the format does not define (e.g. a 2-byte double).
    pub fn from_parts(kind: ValueKind, width: u8) -> Option<Self> {
        match (kind, width) {
            (ValueKind::Int, 1) => Some(Self::I8),
            (ValueKind::Int, 2) => Some(Self::I16),
            (ValueKind::Int, 4) => Some(Self::I32),
            (ValueKind::Int, 8) => Some(Self::I64),
            (ValueKind::Double, 4) => Some(Self::F32),
            (ValueKind::Double, 8) => Some(Self::F64),
            _ => None,
        }
    }

    #[inline]
    pub fn kind(self) -> ValueKind {
        match self {
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => ValueKind::Int,
            Self::F32 | Self::F64 => ValueKind::Double,
        }
    }

    /// Width of the member in bytes.
    #[inline]
    pub fn width(self) -> usize {
        match self {
            Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A catalogue entry: a quantity name and how it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityDef {
    pub name: String,
    pub encoding: Encoding,
}

impl QuantityDef {
    pub fn new(name: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            name: name.into(),
            encoding,
        }
    }
}

/// A quantity placed inside a record layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantity {
    /// Quantity name, unique within a schema
    pub name: String,
    /// Storage encoding
    pub encoding: Encoding,
    /// Position of the member within the record (0-based)
    pub ordinal: u32,
    /// Byte offset of the member within the record
    pub offset: usize,
}

impl Quantity {
    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.encoding.kind()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.encoding.width()
    }
}

/// Ordered layout of one particle record.
///
/// Members are packed back to back without padding, so the record size is the
/// sum of member widths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    quantities: Vec<Quantity>,
    index: HashMap<String, usize>,
    record_size: usize,
}

impl Schema {
    /// Lays out the given members in order.
    ///
    /// Fails with [`SchemaError::DuplicateQuantity`] if a name appears twice.
    pub fn new<I>(defs: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = QuantityDef>,
    {
        let mut schema = Self::default();
        for def in defs {
            if schema.index.contains_key(&def.name) {
                return Err(SchemaError::DuplicateQuantity(def.name));
            }
            let ordinal = schema.quantities.len();
            schema.index.insert(def.name.clone(), ordinal);
            schema.quantities.push(Quantity {
                name: def.name,
                encoding: def.encoding,
                ordinal: ordinal as u32,
                offset: schema.record_size,
            });
            schema.record_size += def.encoding.width();
        }
        Ok(schema)
    }

    /// Looks up a member by name.
    pub fn get(&self, name: &str) -> Option<&Quantity> {
        self.index.get(name).map(|&i| &self.quantities[i])
    }

    /// Returns `true` if the schema has a member with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Members in on-disk order.
    pub fn quantities(&self) -> &[Quantity] {
        &self.quantities
    }

    /// Size of one record in bytes.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }
}

/// A single decoded value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
}

impl Value {
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Double(_) => ValueKind::Double,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
        }
    }
}
