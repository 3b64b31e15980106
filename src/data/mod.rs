//! Wire-side values, columns and tables

pub mod column;
pub mod host;
pub mod table;
pub mod temporal;

pub use column::{Column, ColumnDef};
pub use host::{HostRow, HostValue};
pub use table::Table;
pub use temporal::{Temporal, TemporalKind, TimeUnit};

use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::types::{DataType, Decimal, TypeDescriptor};
use crate::{Result, WireError};

/// A typed value as it travels on the wire
///
/// 16-byte kinds hold their bytes in display order (big-endian); the codec
/// writes them as a little-endian 128-bit integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Typeless null; takes the sentinel of whatever column it lands in
    Null,
    Bool(bool),
    Char(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Temporal(Temporal),
    String(String),
    Symbol(String),
    Blob(Vec<u8>),
    Uuid([u8; 16]),
    IpAddr([u8; 16]),
    Int128([u8; 16]),
    /// One array-vector row with its element type
    Array(Vec<Value>, DataType),
}

impl Value {
    /// Natural wire type of the value; `None` for a typeless null
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => DataType::Bool,
            Value::Char(_) => DataType::Char,
            Value::Short(_) => DataType::Short,
            Value::Int(_) => DataType::Int,
            Value::Long(_) => DataType::Long,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Decimal(d) => {
                if d.digits() <= 18 && d.scale() <= 17 {
                    DataType::Decimal64
                } else {
                    DataType::Decimal128
                }
            }
            Value::Temporal(t) => t.kind.data_type(),
            Value::String(_) => DataType::String,
            Value::Symbol(_) => DataType::Symbol,
            Value::Blob(_) => DataType::Blob,
            Value::Uuid(_) => DataType::Uuid,
            Value::IpAddr(_) => DataType::IpAddr,
            Value::Int128(_) => DataType::Int128,
            Value::Array(_, elem) => *elem,
        })
    }

    /// Whether the value is the null of its own type
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(_) | Value::Decimal(_) | Value::Array(..) => false,
            Value::Char(v) => *v == i8::MIN,
            Value::Short(v) => *v == i16::MIN,
            Value::Int(v) => *v == i32::MIN,
            Value::Long(v) => *v == i64::MIN,
            Value::Float(v) => v.is_nan(),
            Value::Double(v) => v.is_nan(),
            Value::Temporal(t) => t.is_null(),
            Value::String(s) | Value::Symbol(s) => s.is_empty(),
            Value::Blob(b) => b.is_empty(),
            Value::Uuid(b) | Value::IpAddr(b) | Value::Int128(b) => b.iter().all(|x| *x == 0),
        }
    }

    /// The null a column of `desc` decodes to
    pub fn null_of(desc: &TypeDescriptor) -> Value {
        if desc.array {
            return Value::Array(Vec::new(), desc.tag);
        }
        match desc.tag {
            DataType::String => Value::String(String::new()),
            DataType::Symbol => Value::Symbol(String::new()),
            DataType::Blob => Value::Blob(Vec::new()),
            DataType::Uuid => Value::Uuid([0; 16]),
            DataType::IpAddr => Value::IpAddr([0; 16]),
            DataType::Int128 => Value::Int128([0; 16]),
            _ => Value::Null,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Char(v) => Some(*v as i64),
            Value::Short(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            Value::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Decimal(d) => Some(d.to_f64()),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Order two values of compatible kinds; `None` when they cannot be compared
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Temporal(a), Value::Temporal(b)) if a.kind == b.kind => Some(a.ticks.cmp(&b.ticks)),
            (Value::Temporal(a), Value::Temporal(b)) => a.nanos()?.partial_cmp(&b.nanos()?),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.compare(b)),
            (Value::Decimal(a), b) => b.as_i64().map(|v| a.compare(&Decimal::from_i64(v))),
            (a, Value::Decimal(b)) => a.as_i64().map(|v| Decimal::from_i64(v).compare(b)),
            (
                Value::String(a) | Value::Symbol(a),
                Value::String(b) | Value::Symbol(b),
            ) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b))
            | (Value::IpAddr(a), Value::IpAddr(b))
            | (Value::Int128(a), Value::Int128(b)) => Some(a.cmp(b)),
            (Value::Float(_) | Value::Double(_), _) | (_, Value::Float(_) | Value::Double(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (a, b) => Some(a.as_i64()?.cmp(&b.as_i64()?)),
        }
    }

    /// Variant name for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Array(..) => "ARRAY",
            other => other.data_type().map(|t| t.name()).unwrap_or("NULL"),
        }
    }
}

/// Parse the dashed textual form of a UUID
pub fn parse_uuid(text: &str) -> Result<[u8; 16]> {
    uuid::Uuid::parse_str(text.trim())
        .map(|u| *u.as_bytes())
        .map_err(|e| WireError::type_mismatch(format!("invalid UUID '{}': {}", text, e)))
}

/// Parse an IPv4 or IPv6 address; IPv4 lands in the low 4 bytes
pub fn parse_ipaddr(text: &str) -> Result<[u8; 16]> {
    let addr: IpAddr = text
        .trim()
        .parse()
        .map_err(|_| WireError::type_mismatch(format!("invalid IP address '{}'", text)))?;
    Ok(match addr {
        IpAddr::V4(v4) => {
            let mut bytes = [0u8; 16];
            bytes[12..].copy_from_slice(&v4.octets());
            bytes
        }
        IpAddr::V6(v6) => v6.octets(),
    })
}

/// Parse 32 hex digits into a 128-bit value
pub fn parse_int128(text: &str) -> Result<[u8; 16]> {
    let text = text.trim();
    if text.len() != 32 {
        return Err(WireError::type_mismatch(format!(
            "invalid INT128 '{}': expected 32 hex digits",
            text
        )));
    }
    u128::from_str_radix(text, 16)
        .map(|v| v.to_be_bytes())
        .map_err(|_| WireError::type_mismatch(format!("invalid INT128 '{}'", text)))
}

pub(crate) fn format_uuid(bytes: &[u8; 16]) -> String {
    uuid::Uuid::from_bytes(*bytes).hyphenated().to_string()
}

pub(crate) fn format_ipaddr(bytes: &[u8; 16]) -> String {
    if bytes[..12].iter().all(|b| *b == 0) {
        Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]).to_string()
    } else {
        Ipv6Addr::from(*bytes).to_string()
    }
}

pub(crate) fn format_int128(bytes: &[u8; 16]) -> String {
    format!("{:032x}", u128::from_be_bytes(*bytes))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Temporal(t) => write!(f, "{}", t),
            Value::String(s) | Value::Symbol(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Uuid(b) => f.write_str(&format_uuid(b)),
            Value::IpAddr(b) => f.write_str(&format_ipaddr(b)),
            Value::Int128(b) => f.write_str(&format_int128(b)),
            Value::Array(items, _) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_band_nulls() {
        assert!(Value::Int(i32::MIN).is_null());
        assert!(Value::Double(f64::NAN).is_null());
        assert!(Value::String(String::new()).is_null());
        assert!(Value::Uuid([0; 16]).is_null());
        assert!(!Value::Bool(false).is_null());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn test_sixteen_byte_text_forms() {
        let uuid = parse_uuid("5d212a78-cc48-e3b1-4235-b4d91473ee87").unwrap();
        assert_eq!(format_uuid(&uuid), "5d212a78-cc48-e3b1-4235-b4d91473ee87");

        let ip = parse_ipaddr("192.168.1.13").unwrap();
        assert_eq!(Value::IpAddr(ip).to_string(), "192.168.1.13");
        let ip6 = parse_ipaddr("e1bd:6a8d:e5e6:cc3b:e1f9:2a7b:aa8c:6b8d").unwrap();
        assert_eq!(format_ipaddr(&ip6), "e1bd:6a8d:e5e6:cc3b:e1f9:2a7b:aa8c:6b8d");

        let i = parse_int128("e1671797c52e15f763380b45e841ec32").unwrap();
        assert_eq!(format_int128(&i), "e1671797c52e15f763380b45e841ec32");
        assert!(parse_int128("1234").is_err());
        assert_eq!(Value::IpAddr([0; 16]).to_string(), "0.0.0.0");
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(Value::Int(150).compare(&Value::Long(100)), Some(Ordering::Greater));
        assert_eq!(Value::Double(1.5).compare(&Value::Int(2)), Some(Ordering::Less));
        let d: Decimal = "1.50".parse().unwrap();
        assert_eq!(Value::Decimal(d).compare(&Value::Int(1)), Some(Ordering::Greater));
        assert_eq!(Value::String("a".into()).compare(&Value::Int(1)), None);
    }
}
