//! Type registry - wire type tags, widths, null sentinels and decimal rules
//!
//! Every value crossing the wire is tagged with one of the protocol-level
//! [`DataType`] codes. The registry is a static table: it is never mutated and
//! every lookup is a plain match.

pub mod decimal;
pub mod infer;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, WireError};

pub use decimal::Decimal;

// ============================================================================
// Type Tags
// ============================================================================

pub const TYPE_VOID: u8 = 0;
pub const TYPE_BOOL: u8 = 1;
pub const TYPE_CHAR: u8 = 2;
pub const TYPE_SHORT: u8 = 3;
pub const TYPE_INT: u8 = 4;
pub const TYPE_LONG: u8 = 5;
pub const TYPE_DATE: u8 = 6;
pub const TYPE_MONTH: u8 = 7;
pub const TYPE_TIME: u8 = 8;
pub const TYPE_MINUTE: u8 = 9;
pub const TYPE_SECOND: u8 = 10;
pub const TYPE_DATETIME: u8 = 11;
pub const TYPE_TIMESTAMP: u8 = 12;
pub const TYPE_NANOTIME: u8 = 13;
pub const TYPE_NANOTIMESTAMP: u8 = 14;
pub const TYPE_FLOAT: u8 = 15;
pub const TYPE_DOUBLE: u8 = 16;
pub const TYPE_SYMBOL: u8 = 17;
pub const TYPE_STRING: u8 = 18;
pub const TYPE_UUID: u8 = 19;
pub const TYPE_DATEHOUR: u8 = 28;
pub const TYPE_IPADDR: u8 = 30;
pub const TYPE_INT128: u8 = 31;
pub const TYPE_BLOB: u8 = 32;
pub const TYPE_DECIMAL32: u8 = 37;
pub const TYPE_DECIMAL64: u8 = 38;
pub const TYPE_DECIMAL128: u8 = 39;

/// Added to a scalar tag to form the tag of an array vector column
pub const ARRAY_TYPE_OFFSET: u8 = 64;

/// Wire type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    Void = TYPE_VOID,
    Bool = TYPE_BOOL,
    Char = TYPE_CHAR,
    Short = TYPE_SHORT,
    Int = TYPE_INT,
    Long = TYPE_LONG,
    Date = TYPE_DATE,
    Month = TYPE_MONTH,
    Time = TYPE_TIME,
    Minute = TYPE_MINUTE,
    Second = TYPE_SECOND,
    DateTime = TYPE_DATETIME,
    Timestamp = TYPE_TIMESTAMP,
    NanoTime = TYPE_NANOTIME,
    NanoTimestamp = TYPE_NANOTIMESTAMP,
    Float = TYPE_FLOAT,
    Double = TYPE_DOUBLE,
    Symbol = TYPE_SYMBOL,
    String = TYPE_STRING,
    Uuid = TYPE_UUID,
    DateHour = TYPE_DATEHOUR,
    IpAddr = TYPE_IPADDR,
    Int128 = TYPE_INT128,
    Blob = TYPE_BLOB,
    Decimal32 = TYPE_DECIMAL32,
    Decimal64 = TYPE_DECIMAL64,
    Decimal128 = TYPE_DECIMAL128,
}

/// Every tag, in code order
pub const ALL_TYPES: [DataType; 27] = [
    DataType::Void,
    DataType::Bool,
    DataType::Char,
    DataType::Short,
    DataType::Int,
    DataType::Long,
    DataType::Date,
    DataType::Month,
    DataType::Time,
    DataType::Minute,
    DataType::Second,
    DataType::DateTime,
    DataType::Timestamp,
    DataType::NanoTime,
    DataType::NanoTimestamp,
    DataType::Float,
    DataType::Double,
    DataType::Symbol,
    DataType::String,
    DataType::Uuid,
    DataType::DateHour,
    DataType::IpAddr,
    DataType::Int128,
    DataType::Blob,
    DataType::Decimal32,
    DataType::Decimal64,
    DataType::Decimal128,
];

impl DataType {
    pub fn from_u8(v: u8) -> Option<Self> {
        ALL_TYPES.iter().copied().find(|t| *t as u8 == v)
    }

    #[inline]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Protocol name, as used in type strings and schema tables
    pub fn name(&self) -> &'static str {
        TypeRegistry::info(*self).name
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            DataType::Date
                | DataType::Month
                | DataType::Time
                | DataType::Minute
                | DataType::Second
                | DataType::DateTime
                | DataType::Timestamp
                | DataType::NanoTime
                | DataType::NanoTimestamp
                | DataType::DateHour
        )
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self, DataType::Decimal32 | DataType::Decimal64 | DataType::Decimal128)
    }

    /// Whether the tag may be used as the element type of an array vector
    pub fn can_be_array_element(&self) -> bool {
        !matches!(self, DataType::Void | DataType::String | DataType::Symbol | DataType::Blob)
    }

    /// Kinds narrower than 64 bits whose null cannot survive a typed
    /// collection view and widens to DOUBLE NaN
    pub fn widens_on_null(&self) -> bool {
        matches!(self, DataType::Char | DataType::Short | DataType::Int | DataType::Float)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Width & Null Sentinel
// ============================================================================

/// Storage width of a single element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Width {
    Fixed(usize),
    Variable,
}

/// In-band representation of "no value" for a wire type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullSentinel {
    /// The minimum value of a signed integer of `bytes` width
    IntMin { bytes: usize },
    /// IEEE NaN of `bytes` width
    Nan { bytes: usize },
    /// Zero-length payload (STRING, SYMBOL, BLOB)
    Empty,
    /// All-zero 16-byte payload (UUID, IPADDR, INT128)
    Zero16,
    /// VOID carries no payload and is always null
    Always,
}

impl NullSentinel {
    /// The little-endian bit pattern written for a null value
    pub fn bit_pattern(&self) -> Vec<u8> {
        match self {
            NullSentinel::IntMin { bytes } => {
                let mut pattern = vec![0u8; *bytes];
                if let Some(last) = pattern.last_mut() {
                    *last = 0x80;
                }
                pattern
            }
            NullSentinel::Nan { bytes: 4 } => f32::NAN.to_le_bytes().to_vec(),
            NullSentinel::Nan { .. } => f64::NAN.to_le_bytes().to_vec(),
            NullSentinel::Empty | NullSentinel::Always => Vec::new(),
            NullSentinel::Zero16 => vec![0u8; 16],
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Static per-tag facts
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub width: Width,
    pub null: NullSentinel,
    /// Maximum decimal scale (0 for non-decimal kinds)
    pub max_scale: u8,
    /// Maximum decimal precision in significant digits (0 for non-decimal kinds)
    pub precision: u32,
}

const fn fixed(name: &'static str, bytes: usize, null: NullSentinel) -> TypeInfo {
    TypeInfo { name, width: Width::Fixed(bytes), null, max_scale: 0, precision: 0 }
}

const fn int_min(bytes: usize) -> NullSentinel {
    NullSentinel::IntMin { bytes }
}

/// Lookup surface over the static type table
pub struct TypeRegistry;

impl TypeRegistry {
    /// Static facts for a tag
    pub fn info(tag: DataType) -> TypeInfo {
        match tag {
            DataType::Void => TypeInfo {
                name: "VOID",
                width: Width::Fixed(0),
                null: NullSentinel::Always,
                max_scale: 0,
                precision: 0,
            },
            // BOOL shares CHAR's storage, so its null is -128 (0x80)
            DataType::Bool => fixed("BOOL", 1, int_min(1)),
            DataType::Char => fixed("CHAR", 1, int_min(1)),
            DataType::Short => fixed("SHORT", 2, int_min(2)),
            DataType::Int => fixed("INT", 4, int_min(4)),
            DataType::Long => fixed("LONG", 8, int_min(8)),
            DataType::Date => fixed("DATE", 4, int_min(4)),
            DataType::Month => fixed("MONTH", 4, int_min(4)),
            DataType::Time => fixed("TIME", 4, int_min(4)),
            DataType::Minute => fixed("MINUTE", 4, int_min(4)),
            DataType::Second => fixed("SECOND", 4, int_min(4)),
            DataType::DateTime => fixed("DATETIME", 4, int_min(4)),
            DataType::Timestamp => fixed("TIMESTAMP", 8, int_min(8)),
            DataType::NanoTime => fixed("NANOTIME", 8, int_min(8)),
            DataType::NanoTimestamp => fixed("NANOTIMESTAMP", 8, int_min(8)),
            DataType::DateHour => fixed("DATEHOUR", 4, int_min(4)),
            DataType::Float => fixed("FLOAT", 4, NullSentinel::Nan { bytes: 4 }),
            DataType::Double => fixed("DOUBLE", 8, NullSentinel::Nan { bytes: 8 }),
            DataType::Symbol => TypeInfo {
                name: "SYMBOL",
                width: Width::Variable,
                null: NullSentinel::Empty,
                max_scale: 0,
                precision: 0,
            },
            DataType::String => TypeInfo {
                name: "STRING",
                width: Width::Variable,
                null: NullSentinel::Empty,
                max_scale: 0,
                precision: 0,
            },
            DataType::Blob => TypeInfo {
                name: "BLOB",
                width: Width::Variable,
                null: NullSentinel::Empty,
                max_scale: 0,
                precision: 0,
            },
            DataType::Uuid => fixed("UUID", 16, NullSentinel::Zero16),
            DataType::IpAddr => fixed("IPADDR", 16, NullSentinel::Zero16),
            DataType::Int128 => fixed("INT128", 16, NullSentinel::Zero16),
            DataType::Decimal32 => TypeInfo {
                name: "DECIMAL32",
                width: Width::Fixed(4),
                null: int_min(4),
                max_scale: 9,
                precision: 9,
            },
            DataType::Decimal64 => TypeInfo {
                name: "DECIMAL64",
                width: Width::Fixed(8),
                null: int_min(8),
                max_scale: 17,
                precision: 18,
            },
            DataType::Decimal128 => TypeInfo {
                name: "DECIMAL128",
                width: Width::Fixed(16),
                null: int_min(16),
                max_scale: 38,
                precision: 38,
            },
        }
    }

    /// Descriptor for a scalar tag (decimals default to scale 0)
    pub fn lookup(tag: DataType) -> TypeDescriptor {
        TypeDescriptor::scalar(tag)
    }

    /// Descriptor for a raw wire code, including array vector codes
    pub fn lookup_code(code: u8) -> Result<TypeDescriptor> {
        if code >= ARRAY_TYPE_OFFSET {
            let element = DataType::from_u8(code - ARRAY_TYPE_OFFSET)
                .filter(|t| t.can_be_array_element())
                .ok_or(WireError::UnknownType(code))?;
            return Ok(TypeDescriptor::array_of(element));
        }
        DataType::from_u8(code)
            .map(TypeDescriptor::scalar)
            .ok_or(WireError::UnknownType(code))
    }

    pub fn null_sentinel_for(tag: DataType) -> NullSentinel {
        Self::info(tag).null
    }
}

// ============================================================================
// Type Descriptor
// ============================================================================

/// Immutable description of a column's or value's wire type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Scalar tag (the element tag for array vectors)
    pub tag: DataType,
    /// Whether this is an array vector of `tag`
    pub array: bool,
    /// Decimal scale; `None` for non-decimal kinds
    pub scale: Option<u8>,
}

impl TypeDescriptor {
    pub fn scalar(tag: DataType) -> Self {
        Self {
            tag,
            array: false,
            scale: if tag.is_decimal() { Some(0) } else { None },
        }
    }

    pub fn array_of(tag: DataType) -> Self {
        Self {
            array: true,
            ..Self::scalar(tag)
        }
    }

    /// Decimal descriptor; fails if `scale` exceeds the kind's maximum
    pub fn decimal(tag: DataType, scale: u8) -> Result<Self> {
        if !tag.is_decimal() {
            return Err(WireError::InvalidArgument(format!("{} is not a decimal type", tag)));
        }
        let max = TypeRegistry::info(tag).max_scale;
        if scale > max {
            return Err(WireError::overflow(format!(
                "scale {} exceeds the maximum {} of {}",
                scale, max, tag
            )));
        }
        Ok(Self { tag, array: false, scale: Some(scale) })
    }

    /// Same descriptor as an array vector
    pub fn into_array(self) -> Self {
        Self { array: true, ..self }
    }

    /// Element descriptor of an array vector (identity for scalars)
    pub fn element(&self) -> Self {
        Self { array: false, ..*self }
    }

    /// The on-wire code (array vectors add [`ARRAY_TYPE_OFFSET`])
    pub fn code(&self) -> u8 {
        if self.array {
            self.tag.code() + ARRAY_TYPE_OFFSET
        } else {
            self.tag.code()
        }
    }

    pub fn width(&self) -> Width {
        if self.array {
            Width::Variable
        } else {
            TypeRegistry::info(self.tag).width
        }
    }

    pub fn null_sentinel(&self) -> NullSentinel {
        TypeRegistry::null_sentinel_for(self.tag)
    }

    pub fn scale_or_zero(&self) -> u8 {
        self.scale.unwrap_or(0)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scale {
            Some(scale) => write!(f, "{}({})", self.tag, scale)?,
            None => write!(f, "{}", self.tag)?,
        }
        if self.array {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

impl FromStr for TypeDescriptor {
    type Err = WireError;

    /// Parses `INT`, `decimal64(2)`, `DOUBLE[]`, `DECIMAL32(3)[]`
    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim().to_ascii_uppercase();
        let (body, array) = match text.strip_suffix("[]") {
            Some(body) => (body.trim_end(), true),
            None => (text.as_str(), false),
        };
        let (name, scale) = match body.find('(') {
            Some(open) => {
                let close = body
                    .rfind(')')
                    .filter(|&c| c > open)
                    .ok_or_else(|| WireError::InvalidArgument(format!("malformed type string '{}'", s)))?;
                let scale: u8 = body[open + 1..close]
                    .trim()
                    .parse()
                    .map_err(|_| WireError::InvalidArgument(format!("malformed scale in '{}'", s)))?;
                (body[..open].trim(), Some(scale))
            }
            None => (body, None),
        };
        let tag = ALL_TYPES
            .iter()
            .copied()
            .find(|t| t.name() == name)
            .ok_or_else(|| WireError::InvalidArgument(format!("unknown type '{}'", s)))?;

        let mut desc = match scale {
            Some(scale) => TypeDescriptor::decimal(tag, scale)?,
            None => TypeDescriptor::scalar(tag),
        };
        if array {
            if !tag.can_be_array_element() {
                return Err(WireError::InvalidArgument(format!("{} cannot form an array vector", tag)));
            }
            desc = desc.into_array();
        }
        Ok(desc)
    }
}

impl From<DataType> for TypeDescriptor {
    fn from(tag: DataType) -> Self {
        TypeDescriptor::scalar(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_sentinels_are_type_minimum() {
        assert_eq!(NullSentinel::IntMin { bytes: 1 }.bit_pattern(), (-128i8).to_le_bytes());
        assert_eq!(NullSentinel::IntMin { bytes: 2 }.bit_pattern(), i16::MIN.to_le_bytes());
        assert_eq!(TypeRegistry::null_sentinel_for(DataType::Int).bit_pattern(), i32::MIN.to_le_bytes());
        assert_eq!(TypeRegistry::null_sentinel_for(DataType::Long).bit_pattern(), i64::MIN.to_le_bytes());
        assert_eq!(
            TypeRegistry::null_sentinel_for(DataType::Decimal128).bit_pattern(),
            i128::MIN.to_le_bytes()
        );
    }

    #[test]
    fn test_temporal_kinds_reuse_integer_sentinels() {
        for tag in ALL_TYPES.iter().filter(|t| t.is_temporal()) {
            assert!(matches!(TypeRegistry::null_sentinel_for(*tag), NullSentinel::IntMin { .. }));
        }
        assert_eq!(TypeRegistry::info(DataType::Timestamp).width, Width::Fixed(8));
        assert_eq!(TypeRegistry::info(DataType::DateHour).width, Width::Fixed(4));
    }

    #[test]
    fn test_float_sentinels_are_nan() {
        let pattern = TypeRegistry::null_sentinel_for(DataType::Double).bit_pattern();
        let value = f64::from_le_bytes(pattern.try_into().unwrap());
        assert!(value.is_nan());
        assert_eq!(TypeRegistry::null_sentinel_for(DataType::String), NullSentinel::Empty);
        assert_eq!(TypeRegistry::null_sentinel_for(DataType::Uuid).bit_pattern(), vec![0u8; 16]);
    }

    #[test]
    fn test_code_roundtrip() {
        for tag in ALL_TYPES {
            assert_eq!(DataType::from_u8(tag.code()), Some(tag));
        }
        assert_eq!(DataType::from_u8(20), None);

        let desc = TypeRegistry::lookup_code(TYPE_INT + ARRAY_TYPE_OFFSET).unwrap();
        assert_eq!(desc, TypeDescriptor::array_of(DataType::Int));
        assert!(matches!(
            TypeRegistry::lookup_code(TYPE_STRING + ARRAY_TYPE_OFFSET),
            Err(WireError::UnknownType(_))
        ));
    }

    #[test]
    fn test_parse_type_strings() {
        assert_eq!("int".parse::<TypeDescriptor>().unwrap(), TypeDescriptor::scalar(DataType::Int));
        let dec: TypeDescriptor = "decimal64(2)".parse().unwrap();
        assert_eq!(dec.tag, DataType::Decimal64);
        assert_eq!(dec.scale, Some(2));
        let arr: TypeDescriptor = "DECIMAL32(3)[]".parse().unwrap();
        assert!(arr.array);
        assert_eq!(arr.to_string(), "DECIMAL32(3)[]");
        assert!("DECIMAL32(10)".parse::<TypeDescriptor>().is_err());
        assert!("SYMBOL[]".parse::<TypeDescriptor>().is_err());
        assert!("NOPE".parse::<TypeDescriptor>().is_err());
    }
}
