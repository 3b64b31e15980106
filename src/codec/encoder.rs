//! Value encoder - host values to typed values to wire bytes

use byteorder::{LittleEndian, WriteBytesExt};
use bytes::{BufMut, Bytes, BytesMut};

use super::{ArrayVectorCodec, FORM_TABLE, FORM_VECTOR, MAX_VALUE_BYTES, STRING_COLUMN_MAX_BYTES};
use crate::data::{parse_int128, parse_ipaddr, parse_uuid, Column, HostValue, Table, Temporal, TemporalKind, Value};
use crate::types::{DataType, Decimal, TypeDescriptor, TypeRegistry};
use crate::{Result, WireError};

/// Stateless encoder over the static type table
pub struct ValueEncoder;

impl ValueEncoder {
    // ========================================================================
    // Host values
    // ========================================================================

    /// The natural wire value of a host value (its inferred type)
    pub fn from_host(host: &HostValue) -> Result<Value> {
        if host.is_null_like() {
            return Ok(Value::Null);
        }
        Ok(match host {
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Int8(v) => Value::Char(*v),
            HostValue::Int16(v) => Value::Short(*v),
            HostValue::Int32(v) => Value::Int(*v),
            HostValue::Int(v) | HostValue::Int64(v) => Value::Long(*v),
            HostValue::Float32(v) => Value::Float(*v),
            HostValue::Float(v) => Value::Double(*v),
            HostValue::Str(s) => Value::String(s.clone()),
            HostValue::Bytes(b) => Value::Blob(b.clone()),
            HostValue::Decimal(Some(d)) => Value::Decimal(*d),
            HostValue::Date(d) => Value::Temporal(Temporal::from_date(*d)),
            HostValue::DateTime(dt) => Value::Temporal(Temporal::from_datetime(*dt)?),
            HostValue::Time(t) => Value::Temporal(Temporal::from_time(*t)),
            HostValue::Datetime64 { unit, ticks: Some(t) } => {
                let ticks = unit.to_upload_ticks(*t).ok_or_else(|| {
                    WireError::overflow(format!("datetime64[{}] value {} is out of range", unit.suffix(), t))
                })?;
                Value::Temporal(Temporal::new(unit.upload_kind(), ticks))
            }
            HostValue::List(items) => {
                let desc = ArrayVectorCodec::infer_array(items)?;
                return Self::coerce(host, &desc);
            }
            HostValue::None | HostValue::Decimal(None) | HostValue::Datetime64 { ticks: None, .. } => Value::Null,
        })
    }

    /// Convert a host value to a value of `desc`, failing rather than losing
    /// information
    pub fn coerce(host: &HostValue, desc: &TypeDescriptor) -> Result<Value> {
        if desc.array {
            return match host {
                HostValue::List(items) => {
                    let element = desc.element();
                    let values = items
                        .iter()
                        .map(|item| Self::coerce(item, &element))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Value::Array(values, desc.tag))
                }
                h if h.is_null_like() => Ok(Value::null_of(desc)),
                other => Err(WireError::type_mismatch(format!(
                    "cannot encode {} as {}",
                    other.kind_name(),
                    desc
                ))),
            };
        }
        if let HostValue::List(_) = host {
            return Err(WireError::type_mismatch(format!("cannot encode list as {}", desc)));
        }
        let value = Self::from_host(host)?;
        Self::cast(&value, desc).map_err(|e| match e {
            WireError::TypeMismatch { column: None, row: None, .. } if !matches!(host, HostValue::Str(_)) => {
                WireError::type_mismatch(format!("cannot encode {} {} as {}", host.kind_name(), host, desc))
            }
            other => other,
        })
    }

    // ========================================================================
    // Casting
    // ========================================================================

    /// Convert a typed value to `desc`. Integers are range-checked and
    /// decimals must be exact at the declared scale. Temporal values change
    /// resolution through nanoseconds and must fit the target's wire width.
    /// Floats round to the nearest FLOAT but never overflow to infinity.
    pub fn cast(value: &Value, desc: &TypeDescriptor) -> Result<Value> {
        if desc.array {
            return match value {
                Value::Array(items, _) => {
                    let element = desc.element();
                    let values = items
                        .iter()
                        .map(|item| Self::cast(item, &element))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Value::Array(values, desc.tag))
                }
                Value::Null => Ok(Value::null_of(desc)),
                other => Err(mismatch(other, desc)),
            };
        }
        if let Value::Array(..) = value {
            return Err(mismatch(value, desc));
        }
        if value.is_null() {
            return Ok(Value::null_of(desc));
        }

        match desc.tag {
            DataType::Void => Err(mismatch(value, desc)),
            DataType::Bool => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                other => Err(mismatch(other, desc)),
            },
            DataType::Char | DataType::Short | DataType::Int | DataType::Long => {
                let v = to_integer(value).ok_or_else(|| mismatch(value, desc))?;
                fit_integer(v, desc.tag)
            }
            DataType::Float => match value {
                Value::Temporal(_) | Value::Bool(_) => Err(mismatch(value, desc)),
                Value::Float(v) => Ok(Value::Float(*v)),
                other => {
                    let v = other.as_f64().ok_or_else(|| mismatch(other, desc))?;
                    narrow_f32(v).map(Value::Float)
                }
            },
            DataType::Double => match value {
                Value::Temporal(_) | Value::Bool(_) => Err(mismatch(value, desc)),
                other => other
                    .as_f64()
                    .map(Value::Double)
                    .ok_or_else(|| mismatch(other, desc)),
            },
            DataType::Decimal32 | DataType::Decimal64 | DataType::Decimal128 => {
                let d = to_decimal(value).ok_or_else(|| mismatch(value, desc))??;
                let precision = TypeRegistry::info(desc.tag).precision;
                Ok(Value::Decimal(d.fit(desc.scale_or_zero(), precision)?))
            }
            tag if tag.is_temporal() => match (value, TemporalKind::from_data_type(tag)) {
                (Value::Temporal(t), Some(kind)) => Ok(Value::Temporal(t.convert(kind)?)),
                (other, _) => Err(mismatch(other, desc)),
            },
            DataType::String | DataType::Symbol => {
                let text = match value {
                    Value::String(s) | Value::Symbol(s) => s.clone(),
                    Value::Blob(b) => String::from_utf8(b.clone()).map_err(|_| mismatch(value, desc))?,
                    other => return Err(mismatch(other, desc)),
                };
                check_length(text.len())?;
                Ok(if desc.tag == DataType::Symbol {
                    Value::Symbol(text)
                } else {
                    Value::String(text)
                })
            }
            DataType::Blob => {
                let bytes = match value {
                    Value::Blob(b) => b.clone(),
                    Value::String(s) | Value::Symbol(s) => s.as_bytes().to_vec(),
                    other => return Err(mismatch(other, desc)),
                };
                check_length(bytes.len())?;
                Ok(Value::Blob(bytes))
            }
            DataType::Uuid => to_binary16(value, desc, parse_uuid).map(Value::Uuid),
            DataType::IpAddr => to_binary16(value, desc, parse_ipaddr).map(Value::IpAddr),
            DataType::Int128 => to_binary16(value, desc, parse_int128).map(Value::Int128),
            _ => Err(mismatch(value, desc)),
        }
    }

    // ========================================================================
    // Wire bytes
    // ========================================================================

    /// Scalar payload of one value. Decimal scalars are prefixed with their
    /// scale; array values with their length (and a decimal scale).
    pub fn encode(value: &Value, desc: &TypeDescriptor) -> Result<Vec<u8>> {
        // a lone decimal carries its own scale, so one that cannot be padded
        // up to the declared scale within precision keeps the scale it has
        let desc = &match value {
            Value::Decimal(d) if !desc.array && desc.tag.is_decimal() && d.scale() < desc.scale_or_zero() => {
                let precision = TypeRegistry::info(desc.tag).precision;
                match d.fit(desc.scale_or_zero(), precision) {
                    Ok(_) => *desc,
                    Err(_) => TypeDescriptor { scale: Some(d.scale()), ..*desc },
                }
            }
            _ => *desc,
        };
        let value = Self::cast(value, desc)?;
        let mut buf = Vec::new();
        if desc.array {
            let items: &[Value] = match &value {
                Value::Array(items, _) => items,
                _ => &[],
            };
            let scale = desc.scale_or_zero();
            if desc.tag.is_decimal() {
                buf.write_i32::<LittleEndian>(scale as i32)?;
            }
            buf.write_u32::<LittleEndian>(checked_len(items.len())?)?;
            let element = desc.element();
            for item in items {
                Self::write_payload(&mut buf, item, &element, scale, false)?;
            }
        } else if desc.tag.is_decimal() {
            let scale = desc.scale_or_zero();
            buf.write_i32::<LittleEndian>(scale as i32)?;
            Self::write_payload(&mut buf, &value, desc, scale, false)?;
        } else {
            Self::write_payload(&mut buf, &value, desc, 0, false)?;
        }
        Ok(buf)
    }

    /// Column frame; cast failures name the column and the row
    pub fn encode_column(column: &Column) -> Result<Vec<u8>> {
        let desc = column.descriptor();
        let name = column.name();
        let values = column
            .iter()
            .enumerate()
            .map(|(row, v)| Self::cast(v, desc).map_err(|e| e.at(name, row)))
            .collect::<Result<Vec<_>>>()?;

        let width = match desc.width() {
            crate::types::Width::Fixed(n) => n,
            crate::types::Width::Variable => 8,
        };
        let mut buf = Vec::with_capacity(10 + values.len() * width);
        buf.write_u8(desc.code())?;
        buf.write_u8(FORM_VECTOR)?;
        buf.write_u32::<LittleEndian>(checked_len(values.len())?)?;

        if desc.array {
            ArrayVectorCodec::write_rows(&mut buf, &values, desc, name)?;
            return Ok(buf);
        }
        let scale = desc.scale_or_zero();
        if desc.tag.is_decimal() {
            buf.write_i32::<LittleEndian>(scale as i32)?;
        }
        for (row, v) in values.iter().enumerate() {
            Self::write_payload(&mut buf, v, desc, scale, true).map_err(|e| e.at(name, row))?;
        }
        Ok(buf)
    }

    /// Table frame ready for upload
    pub fn encode_table(table: &Table) -> Result<Bytes> {
        let mut out = BytesMut::new();
        out.put_u8(FORM_TABLE);
        out.put_u32_le(checked_len(table.row_count())?);
        out.put_u32_le(checked_len(table.column_count())?);
        put_cstr(&mut out, table.name())?;
        for column in table.columns() {
            put_cstr(&mut out, column.name())?;
        }
        for column in table.columns() {
            out.extend_from_slice(&Self::encode_column(column)?);
        }
        Ok(out.freeze())
    }

    /// Payload of one already-cast value, without any decimal scale prefix.
    /// `in_column` applies the column-frame STRING cut.
    pub(crate) fn write_payload(
        buf: &mut Vec<u8>,
        value: &Value,
        desc: &TypeDescriptor,
        scale: u8,
        in_column: bool,
    ) -> Result<()> {
        match (desc.tag, value) {
            (DataType::String | DataType::Symbol, Value::Null) => buf.write_u8(0)?,
            (DataType::Blob, Value::Null) => buf.write_u32::<LittleEndian>(0)?,
            (_, Value::Null) => buf.extend_from_slice(&desc.null_sentinel().bit_pattern()),
            (DataType::Bool, Value::Bool(b)) => buf.write_u8(*b as u8)?,
            (DataType::Char, Value::Char(v)) => buf.write_i8(*v)?,
            (DataType::Short, Value::Short(v)) => buf.write_i16::<LittleEndian>(*v)?,
            (DataType::Int, Value::Int(v)) => buf.write_i32::<LittleEndian>(*v)?,
            (DataType::Long, Value::Long(v)) => buf.write_i64::<LittleEndian>(*v)?,
            (DataType::Float, Value::Float(v)) => buf.write_f32::<LittleEndian>(*v)?,
            (DataType::Double, Value::Double(v)) => buf.write_f64::<LittleEndian>(*v)?,
            (tag, Value::Temporal(t)) if Some(t.kind) == TemporalKind::from_data_type(tag) => {
                if t.kind.is_narrow() {
                    let ticks = i32::try_from(t.checked()?.ticks)
                        .map_err(|_| WireError::overflow(format!("{} does not fit {}", t.ticks, tag)))?;
                    buf.write_i32::<LittleEndian>(ticks)?
                } else {
                    buf.write_i64::<LittleEndian>(t.ticks)?
                }
            }
            (DataType::String | DataType::Symbol, Value::String(s) | Value::Symbol(s)) => {
                check_length(s.len())?;
                if s.contains('\0') {
                    return Err(WireError::type_mismatch("STRING value contains a NUL byte"));
                }
                let text = if in_column {
                    truncate_utf8(s, STRING_COLUMN_MAX_BYTES)
                } else {
                    s.as_str()
                };
                buf.extend_from_slice(text.as_bytes());
                buf.write_u8(0)?;
            }
            (DataType::Blob, Value::Blob(b)) => {
                check_length(b.len())?;
                buf.write_u32::<LittleEndian>(checked_len(b.len())?)?;
                buf.extend_from_slice(b);
            }
            (DataType::Uuid, Value::Uuid(b))
            | (DataType::IpAddr, Value::IpAddr(b))
            | (DataType::Int128, Value::Int128(b)) => {
                buf.write_u128::<LittleEndian>(u128::from_be_bytes(*b))?
            }
            (tag, Value::Decimal(d)) if tag.is_decimal() => {
                let unscaled = d.fit(scale, TypeRegistry::info(tag).precision)?.unscaled();
                let overflow = || WireError::overflow(format!("{} does not fit {}", d, tag));
                match tag {
                    DataType::Decimal32 => {
                        let v = i32::try_from(unscaled).map_err(|_| overflow())?;
                        buf.write_i32::<LittleEndian>(v)?
                    }
                    DataType::Decimal64 => {
                        let v = i64::try_from(unscaled).map_err(|_| overflow())?;
                        buf.write_i64::<LittleEndian>(v)?
                    }
                    _ => buf.write_i128::<LittleEndian>(unscaled)?,
                }
            }
            (_, other) => return Err(mismatch(other, desc)),
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn mismatch(value: &Value, desc: &TypeDescriptor) -> WireError {
    WireError::type_mismatch(format!("cannot convert {} {} to {}", value.kind_name(), value, desc))
}

fn check_length(len: usize) -> Result<()> {
    if len > MAX_VALUE_BYTES {
        return Err(WireError::length_exceeded(len, MAX_VALUE_BYTES));
    }
    Ok(())
}

fn checked_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| WireError::InvalidArgument(format!("length {} exceeds u32", len)))
}

fn put_cstr(out: &mut BytesMut, text: &str) -> Result<()> {
    if text.contains('\0') {
        return Err(WireError::InvalidArgument(format!("name '{}' contains a NUL byte", text.escape_debug())));
    }
    out.put_slice(text.as_bytes());
    out.put_u8(0);
    Ok(())
}

/// Longest prefix of `s` of at most `limit` bytes ending on a char boundary
pub(crate) fn truncate_utf8(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// FLOAT nearest to `v`; a finite value outside the FLOAT range, or one
/// that would flush to zero, is an overflow
fn narrow_f32(v: f64) -> Result<f32> {
    let narrowed = v as f32;
    if v.is_finite() && (!narrowed.is_finite() || (narrowed == 0.0 && v != 0.0)) {
        return Err(WireError::overflow(format!("{} is outside the FLOAT range", v)));
    }
    Ok(narrowed)
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Float(_) | Value::Double(_) => {
            let v = value.as_f64()?;
            let in_range = v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64;
            in_range.then_some(v as i64)
        }
        Value::Decimal(d) => d.to_i64_exact(),
        Value::Temporal(_) => None,
        other => other.as_i64(),
    }
}

fn fit_integer(v: i64, tag: DataType) -> Result<Value> {
    let (min, max) = match tag {
        DataType::Char => (i8::MIN as i64, i8::MAX as i64),
        DataType::Short => (i16::MIN as i64, i16::MAX as i64),
        DataType::Int => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    };
    // The minimum is the null sentinel, so it is out of range for values
    if v <= min || v > max {
        return Err(WireError::type_mismatch(format!("value {} is out of range for {}", v, tag)));
    }
    Ok(match tag {
        DataType::Char => Value::Char(v as i8),
        DataType::Short => Value::Short(v as i16),
        DataType::Int => Value::Int(v as i32),
        _ => Value::Long(v),
    })
}

fn to_decimal(value: &Value) -> Option<Result<Decimal>> {
    match value {
        Value::Decimal(d) => Some(Ok(*d)),
        Value::Float(_) | Value::Double(_) => {
            let v = value.as_f64()?;
            if !v.is_finite() {
                return None;
            }
            Some(v.to_string().parse())
        }
        Value::String(s) => Some(s.parse()),
        Value::Bool(_) | Value::Temporal(_) => None,
        other => other.as_i64().map(|v| Ok(Decimal::from_i64(v))),
    }
}

fn to_binary16(value: &Value, desc: &TypeDescriptor, parse: fn(&str) -> Result<[u8; 16]>) -> Result<[u8; 16]> {
    match (desc.tag, value) {
        (DataType::Uuid, Value::Uuid(b))
        | (DataType::IpAddr, Value::IpAddr(b))
        | (DataType::Int128, Value::Int128(b)) => Ok(*b),
        (_, Value::String(s)) | (_, Value::Symbol(s)) => parse(s),
        (_, Value::Blob(b)) if b.len() == 16 => {
            let mut out = [0u8; 16];
            out.copy_from_slice(b);
            Ok(out)
        }
        (_, other) => Err(mismatch(other, desc)),
    }
}
