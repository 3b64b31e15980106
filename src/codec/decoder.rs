//! Value decoder - wire bytes to typed values to host values

use std::io::{self, BufRead, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use super::{ArrayVectorCodec, FORM_TABLE, FORM_VECTOR, MAX_VALUE_BYTES};
use crate::data::{format_int128, format_ipaddr, format_uuid, Column, HostValue, Table, Temporal, TemporalKind, Value};
use crate::data::temporal::EPOCH_MONTH;
use crate::types::{DataType, Decimal, TypeDescriptor, TypeRegistry};
use crate::{Result, WireError};

pub(crate) type Reader<'a> = Cursor<&'a [u8]>;

/// Stateless decoder over the static type table
pub struct ValueDecoder;

impl ValueDecoder {
    /// Decode one scalar payload written by [`super::ValueEncoder::encode`]
    pub fn decode(bytes: &[u8], desc: &TypeDescriptor) -> Result<Value> {
        let mut cur = Cursor::new(bytes);
        if desc.array {
            let scale = read_scale(&mut cur, desc)?;
            return ArrayVectorCodec::read_row(&mut cur, desc, scale);
        }
        let scale = read_scale(&mut cur, desc)?;
        Self::read_payload(&mut cur, desc, scale)
    }

    /// Decode a column frame
    pub fn decode_column(bytes: &[u8]) -> Result<Column> {
        let mut cur = Cursor::new(bytes);
        Self::read_column(&mut cur, "")
    }

    /// Decode a column frame into its collection view (see [`Column::widened`])
    pub fn decode_column_widened(bytes: &[u8]) -> Result<Column> {
        Ok(Self::decode_column(bytes)?.widened())
    }

    /// Decode a table frame
    pub fn decode_table(bytes: &[u8]) -> Result<Table> {
        let mut cur = Cursor::new(bytes);
        let form = cur.read_u8().map_err(truncated)?;
        if form != FORM_TABLE {
            return Err(WireError::InvalidArgument(format!("expected a table frame, got form {}", form)));
        }
        let rows = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let cols = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let name = read_cstr(&mut cur)?;
        let names = (0..cols).map(|_| read_cstr(&mut cur)).collect::<Result<Vec<_>>>()?;

        let mut columns = Vec::with_capacity(cols);
        for col_name in &names {
            let column = Self::read_column(&mut cur, col_name)?;
            if column.len() != rows {
                return Err(WireError::RowCountMismatch {
                    column: col_name.clone(),
                    expected: rows,
                    actual: column.len(),
                });
            }
            columns.push(column);
        }
        Table::from_columns(name, columns)
    }

    pub(crate) fn read_column(cur: &mut Reader<'_>, name: &str) -> Result<Column> {
        let code = cur.read_u8().map_err(truncated)?;
        let mut desc = TypeRegistry::lookup_code(code)?;
        let form = cur.read_u8().map_err(truncated)?;
        if form != FORM_VECTOR {
            return Err(WireError::InvalidArgument(format!("expected a vector frame, got form {}", form)));
        }
        let rows = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let scale = read_scale(cur, &desc)?;
        if desc.tag.is_decimal() {
            desc.scale = Some(scale);
        }

        let mut column = Column::with_capacity(name, desc, rows.min(1 << 16));
        for _ in 0..rows {
            let value = if desc.array {
                ArrayVectorCodec::read_row(cur, &desc, scale)?
            } else {
                Self::read_payload(cur, &desc, scale)?
            };
            column.push(value);
        }
        Ok(column)
    }

    /// One payload without a scale prefix; sentinels decode to nulls
    pub(crate) fn read_payload(cur: &mut Reader<'_>, desc: &TypeDescriptor, scale: u8) -> Result<Value> {
        let tag = desc.tag;
        let value = match tag {
            DataType::Void => Value::Null,
            DataType::Bool => match cur.read_i8().map_err(truncated)? {
                i8::MIN => Value::Null,
                b => Value::Bool(b != 0),
            },
            DataType::Char => match cur.read_i8().map_err(truncated)? {
                i8::MIN => Value::Null,
                v => Value::Char(v),
            },
            DataType::Short => match cur.read_i16::<LittleEndian>().map_err(truncated)? {
                i16::MIN => Value::Null,
                v => Value::Short(v),
            },
            DataType::Int => match cur.read_i32::<LittleEndian>().map_err(truncated)? {
                i32::MIN => Value::Null,
                v => Value::Int(v),
            },
            DataType::Long => match cur.read_i64::<LittleEndian>().map_err(truncated)? {
                i64::MIN => Value::Null,
                v => Value::Long(v),
            },
            DataType::Float => {
                let v = cur.read_f32::<LittleEndian>().map_err(truncated)?;
                if v.is_nan() { Value::Null } else { Value::Float(v) }
            }
            DataType::Double => {
                let v = cur.read_f64::<LittleEndian>().map_err(truncated)?;
                if v.is_nan() { Value::Null } else { Value::Double(v) }
            }
            DataType::String => Value::String(read_cstr(cur)?),
            DataType::Symbol => Value::Symbol(read_cstr(cur)?),
            DataType::Blob => {
                let len = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
                if len > MAX_VALUE_BYTES {
                    return Err(WireError::length_exceeded(len, MAX_VALUE_BYTES));
                }
                let mut bytes = vec![0u8; len];
                cur.read_exact(&mut bytes).map_err(truncated)?;
                Value::Blob(bytes)
            }
            DataType::Uuid | DataType::IpAddr | DataType::Int128 => {
                let bytes = cur.read_u128::<LittleEndian>().map_err(truncated)?.to_be_bytes();
                match tag {
                    DataType::Uuid => Value::Uuid(bytes),
                    DataType::IpAddr => Value::IpAddr(bytes),
                    _ => Value::Int128(bytes),
                }
            }
            DataType::Decimal32 | DataType::Decimal64 | DataType::Decimal128 => {
                let raw = match tag {
                    DataType::Decimal32 => match cur.read_i32::<LittleEndian>().map_err(truncated)? {
                        i32::MIN => None,
                        v => Some(v as i128),
                    },
                    DataType::Decimal64 => match cur.read_i64::<LittleEndian>().map_err(truncated)? {
                        i64::MIN => None,
                        v => Some(v as i128),
                    },
                    _ => match cur.read_i128::<LittleEndian>().map_err(truncated)? {
                        i128::MIN => None,
                        v => Some(v),
                    },
                };
                match raw {
                    Some(unscaled) => Value::Decimal(Decimal::new(unscaled, scale)?),
                    None => Value::Null,
                }
            }
            temporal => {
                let kind = TemporalKind::from_data_type(temporal).ok_or(WireError::UnknownType(temporal.code()))?;
                let ticks = if kind.is_narrow() {
                    cur.read_i32::<LittleEndian>().map_err(truncated)? as i64
                } else {
                    cur.read_i64::<LittleEndian>().map_err(truncated)?
                };
                let t = Temporal::new(kind, ticks);
                if t.is_null() { Value::Null } else { Value::Temporal(t) }
            }
        };
        Ok(value)
    }

    // ========================================================================
    // Host values
    // ========================================================================

    /// Host form of a decoded value
    pub fn to_host(value: &Value) -> HostValue {
        match value {
            Value::Null => HostValue::None,
            Value::Bool(b) => HostValue::Bool(*b),
            Value::Char(v) => HostValue::Int8(*v),
            Value::Short(v) => HostValue::Int16(*v),
            Value::Int(v) => HostValue::Int32(*v),
            Value::Long(v) => HostValue::Int64(*v),
            Value::Float(v) => HostValue::Float32(*v),
            Value::Double(v) => HostValue::Float(*v),
            Value::Decimal(d) => HostValue::Decimal(Some(*d)),
            Value::Temporal(t) => temporal_to_host(t),
            Value::String(s) | Value::Symbol(s) => HostValue::Str(s.clone()),
            Value::Blob(b) => HostValue::Bytes(b.clone()),
            Value::Uuid(b) => HostValue::Str(format_uuid(b)),
            Value::IpAddr(b) => HostValue::Str(format_ipaddr(b)),
            Value::Int128(b) => HostValue::Str(format_int128(b)),
            Value::Array(items, _) => HostValue::List(items.iter().map(Self::to_host).collect()),
        }
    }

    /// Host form of a column through its collection view: typed nulls become
    /// NaN (widened numerics), NaT (temporals) or a NaN decimal
    pub fn column_to_host(column: &Column) -> Vec<HostValue> {
        let view = column.widened();
        let desc = *view.descriptor();
        view.iter().map(|v| Self::typed_to_host(v, &desc)).collect()
    }

    fn typed_to_host(value: &Value, desc: &TypeDescriptor) -> HostValue {
        if desc.array {
            return match value {
                Value::Array(items, _) => {
                    HostValue::List(items.iter().map(|v| Self::typed_to_host(v, &desc.element())).collect())
                }
                other => Self::to_host(other),
            };
        }
        match (value, desc.tag) {
            (Value::Null, DataType::Double) => HostValue::Float(f64::NAN),
            (Value::Null, DataType::Float) => HostValue::Float32(f32::NAN),
            (Value::Null, tag) if tag.is_decimal() => HostValue::Decimal(None),
            (Value::Null, tag) => match TemporalKind::from_data_type(tag) {
                Some(kind) => HostValue::Datetime64 { unit: kind.host_unit(), ticks: None },
                None => HostValue::None,
            },
            (other, _) => Self::to_host(other),
        }
    }
}

fn temporal_to_host(t: &Temporal) -> HostValue {
    let ticks = match t.kind {
        TemporalKind::Month => t.ticks - EPOCH_MONTH,
        _ => t.ticks,
    };
    HostValue::Datetime64 {
        unit: t.kind.host_unit(),
        ticks: Some(ticks),
    }
}

/// Decimal scale prefix for decimal kinds; 0 otherwise
pub(crate) fn read_scale(cur: &mut Reader<'_>, desc: &TypeDescriptor) -> Result<u8> {
    if !desc.tag.is_decimal() {
        return Ok(0);
    }
    let scale = cur.read_i32::<LittleEndian>().map_err(truncated)?;
    let max = TypeRegistry::info(desc.tag).max_scale as i32;
    if !(0..=max).contains(&scale) {
        return Err(WireError::InvalidArgument(format!(
            "scale {} is invalid for {}",
            scale, desc.tag
        )));
    }
    Ok(scale as u8)
}

fn read_cstr(cur: &mut Reader<'_>) -> Result<String> {
    let mut bytes = Vec::new();
    cur.read_until(0, &mut bytes).map_err(truncated)?;
    if bytes.pop() != Some(0) {
        return Err(WireError::Truncated("unterminated string".to_string()));
    }
    String::from_utf8(bytes).map_err(|e| WireError::InvalidArgument(format!("invalid UTF-8 in string: {}", e)))
}

pub(crate) fn truncated(e: io::Error) -> WireError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        WireError::Truncated(e.to_string())
    } else {
        WireError::Io(e)
    }
}
