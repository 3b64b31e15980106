//! Host-side dynamic values
//!
//! [`HostValue`] is what callers hand to the encoder and what the decoder hands
//! back: dynamically typed scalars, decimals, calendar values and lists.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::temporal::{host_text, TimeUnit};
use crate::types::Decimal;

/// A dynamically typed host value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostValue {
    /// Absent value
    None,
    Bool(bool),
    /// Integer of unspecified width
    Int(i64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    /// Floating point of unspecified width
    Float(f64),
    Float32(f32),
    Str(String),
    Bytes(Vec<u8>),
    /// `None` is a decimal NaN
    Decimal(Option<Decimal>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    /// Fixed-resolution tick count; `None` is NaT
    Datetime64 { unit: TimeUnit, ticks: Option<i64> },
    List(Vec<HostValue>),
}

/// One row given as (column name, value) pairs
pub type HostRow = Vec<(String, HostValue)>;

impl HostValue {
    /// Absent, NaN and NaT are null-like
    pub fn is_null_like(&self) -> bool {
        match self {
            HostValue::None => true,
            HostValue::Float(v) => v.is_nan(),
            HostValue::Float32(v) => v.is_nan(),
            HostValue::Decimal(None) => true,
            HostValue::Datetime64 { ticks, .. } => ticks.map_or(true, |t| t == i64::MIN),
            _ => false,
        }
    }

    /// Short kind name for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            HostValue::None => "none",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Int8(_) => "int8",
            HostValue::Int16(_) => "int16",
            HostValue::Int32(_) => "int32",
            HostValue::Int64(_) => "int64",
            HostValue::Float(_) => "float",
            HostValue::Float32(_) => "float32",
            HostValue::Str(_) => "str",
            HostValue::Bytes(_) => "bytes",
            HostValue::Decimal(_) => "decimal",
            HostValue::Date(_) => "date",
            HostValue::DateTime(_) => "datetime",
            HostValue::Time(_) => "time",
            HostValue::Datetime64 { .. } => "datetime64",
            HostValue::List(_) => "list",
        }
    }

    /// Integer payload regardless of declared width
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Int(v) | HostValue::Int64(v) => Some(*v),
            HostValue::Int8(v) => Some(*v as i64),
            HostValue::Int16(v) => Some(*v as i64),
            HostValue::Int32(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Float(v) => Some(*v),
            HostValue::Float32(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::None => f.write_str("None"),
            HostValue::Bool(v) => write!(f, "{}", v),
            HostValue::Int(v) | HostValue::Int64(v) => write!(f, "{}", v),
            HostValue::Int8(v) => write!(f, "{}", v),
            HostValue::Int16(v) => write!(f, "{}", v),
            HostValue::Int32(v) => write!(f, "{}", v),
            HostValue::Float(v) => write!(f, "{}", v),
            HostValue::Float32(v) => write!(f, "{}", v),
            HostValue::Str(s) => f.write_str(s),
            HostValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            HostValue::Decimal(Some(d)) => write!(f, "{}", d),
            HostValue::Decimal(None) => f.write_str("NaN"),
            HostValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            HostValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            HostValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            HostValue::Datetime64 { unit, ticks: Some(t) } => f.write_str(&host_text(*unit, *t)),
            HostValue::Datetime64 { ticks: None, .. } => f.write_str("NaT"),
            HostValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl From<i8> for HostValue {
    fn from(v: i8) -> Self {
        HostValue::Int8(v)
    }
}

impl From<i16> for HostValue {
    fn from(v: i16) -> Self {
        HostValue::Int16(v)
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        HostValue::Int32(v)
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        HostValue::Int(v)
    }
}

impl From<f32> for HostValue {
    fn from(v: f32) -> Self {
        HostValue::Float32(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Float(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::Str(v.to_string())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        HostValue::Str(v)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(v: Vec<u8>) -> Self {
        HostValue::Bytes(v)
    }
}

impl From<Decimal> for HostValue {
    fn from(v: Decimal) -> Self {
        HostValue::Decimal(Some(v))
    }
}

impl From<NaiveDate> for HostValue {
    fn from(v: NaiveDate) -> Self {
        HostValue::Date(v)
    }
}

impl From<NaiveDateTime> for HostValue {
    fn from(v: NaiveDateTime) -> Self {
        HostValue::DateTime(v)
    }
}

impl From<NaiveTime> for HostValue {
    fn from(v: NaiveTime) -> Self {
        HostValue::Time(v)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(HostValue::None)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue
where
    T: NotByte,
{
    fn from(v: Vec<T>) -> Self {
        HostValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Keeps `Vec<u8>` mapping to `Bytes` instead of a list
pub trait NotByte {}
impl NotByte for bool {}
impl NotByte for i8 {}
impl NotByte for i16 {}
impl NotByte for i32 {}
impl NotByte for i64 {}
impl NotByte for f32 {}
impl NotByte for f64 {}
impl NotByte for &str {}
impl NotByte for String {}
impl NotByte for HostValue {}
impl<T> NotByte for Option<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_like() {
        assert!(HostValue::None.is_null_like());
        assert!(HostValue::Float(f64::NAN).is_null_like());
        assert!(HostValue::Decimal(None).is_null_like());
        assert!(HostValue::Datetime64 { unit: TimeUnit::Nano, ticks: None }.is_null_like());
        assert!(!HostValue::Int(0).is_null_like());
        assert!(!HostValue::Str(String::new()).is_null_like());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(HostValue::from(vec![1i64, 2]), HostValue::List(vec![HostValue::Int(1), HostValue::Int(2)]));
        assert_eq!(HostValue::from(vec![1u8, 2]), HostValue::Bytes(vec![1, 2]));
        assert_eq!(HostValue::from(None::<i32>), HostValue::None);
        assert_eq!(HostValue::from(Some("a")), HostValue::Str("a".into()));
    }

    #[test]
    fn test_month_displays_first_day() {
        let v = HostValue::Datetime64 { unit: TimeUnit::Month, ticks: Some(509) };
        assert_eq!(v.to_string(), "2012-06-01");
        let v = HostValue::Datetime64 { unit: TimeUnit::Second, ticks: Some(0) };
        assert_eq!(v.to_string(), "1970-01-01T00:00:00");
    }
}
