//! Server script literals
//!
//! Typed nulls have dedicated short forms (`00i`, `00F`, ...); integers and
//! floats carry a width suffix so the server does not re-infer them.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::data::{format_int128, format_ipaddr, format_uuid, Temporal, TemporalKind, Value};
use crate::types::{DataType, Decimal, TypeDescriptor};
use crate::{Result, WireError};

/// Null literal of a scalar type
pub fn null_literal(desc: &TypeDescriptor) -> String {
    let text = match desc.tag {
        DataType::Void => "NULL",
        DataType::Bool => "00b",
        DataType::Char => "00c",
        DataType::Short => "00h",
        DataType::Int => "00i",
        DataType::Long => "00l",
        DataType::Float => "00f",
        DataType::Double => "00F",
        DataType::Date => "00d",
        DataType::Month => "00M",
        DataType::Time => "00t",
        DataType::Minute => "00m",
        DataType::Second => "00s",
        DataType::DateTime => "00D",
        DataType::Timestamp => "00T",
        DataType::NanoTime => "00n",
        DataType::NanoTimestamp => "00N",
        DataType::DateHour => "datehour(00i)",
        DataType::String | DataType::Symbol => "\"\"",
        DataType::Blob => "blob(\"\")",
        DataType::Uuid => "uuid(\"\")",
        DataType::IpAddr => "ipaddr(\"\")",
        DataType::Int128 => "int128(\"\")",
        DataType::Decimal32 | DataType::Decimal64 | DataType::Decimal128 => {
            return format!("{}(NULL,{})", decimal_fn(desc.tag), desc.scale_or_zero());
        }
    };
    text.to_string()
}

/// Render an already-cast value of `desc` as a script literal
pub fn render(value: &Value, desc: &TypeDescriptor) -> String {
    if let Value::Array(items, _) = value {
        let element = desc.element();
        let parts: Vec<String> = items.iter().map(|v| render(v, &element)).collect();
        return format!("[{}]", parts.join(","));
    }
    if value.is_null() {
        return null_literal(desc);
    }
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Char(v) => format!("{}c", v),
        Value::Short(v) => format!("{}h", v),
        Value::Int(v) => format!("{}i", v),
        Value::Long(v) => format!("{}l", v),
        Value::Float(v) => format!("{}f", v),
        Value::Double(v) => format!("{}F", v),
        Value::Decimal(d) => format!("{}('{}',{})", decimal_fn(desc.tag), d, d.scale()),
        Value::Temporal(t) => t.literal(),
        Value::String(s) => quote(s),
        Value::Symbol(s) => format!("symbol([{}])", quote(s)),
        Value::Blob(b) => format!("blob({})", quote(&String::from_utf8_lossy(b))),
        Value::Uuid(b) => format!("uuid(\"{}\")", format_uuid(b)),
        Value::IpAddr(b) => format!("ipaddr(\"{}\")", format_ipaddr(b)),
        Value::Int128(b) => format!("int128(\"{}\")", format_int128(b)),
        Value::Null | Value::Array(..) => null_literal(desc),
    }
}

fn decimal_fn(tag: DataType) -> &'static str {
    match tag {
        DataType::Decimal32 => "decimal32",
        DataType::Decimal128 => "decimal128",
        _ => "decimal64",
    }
}

pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            other => out.push(other),
        }
    }
    Some(out)
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a scalar literal into its value and type
pub fn parse(text: &str) -> Result<(Value, TypeDescriptor)> {
    let text = text.trim();
    let invalid = || WireError::InvalidArgument(format!("unrecognized literal '{}'", text));

    if let Some(tag) = parse_null(text) {
        let desc = TypeDescriptor::scalar(tag);
        return Ok((Value::null_of(&desc), desc));
    }
    if let Some(rest) = text.strip_prefix("decimal") {
        return parse_decimal(rest).ok_or_else(invalid)?;
    }
    if let Some(s) = unquote(text) {
        return Ok((Value::String(s), TypeDescriptor::scalar(DataType::String)));
    }
    match text {
        "true" => return Ok((Value::Bool(true), TypeDescriptor::scalar(DataType::Bool))),
        "false" => return Ok((Value::Bool(false), TypeDescriptor::scalar(DataType::Bool))),
        _ => {}
    }
    if let Some(value) = parse_number(text) {
        let desc = value.data_type().map(TypeDescriptor::scalar).ok_or_else(invalid)?;
        return Ok((value, desc));
    }
    if let Some(t) = parse_temporal(text) {
        return Ok((Value::Temporal(t), TypeDescriptor::scalar(t.kind.data_type())));
    }
    Err(invalid())
}

fn parse_null(text: &str) -> Option<DataType> {
    Some(match text {
        "NULL" => DataType::Void,
        "00b" => DataType::Bool,
        "00c" => DataType::Char,
        "00h" => DataType::Short,
        "00i" => DataType::Int,
        "00l" => DataType::Long,
        "00f" => DataType::Float,
        "00F" => DataType::Double,
        "00d" => DataType::Date,
        "00M" => DataType::Month,
        "00t" => DataType::Time,
        "00m" => DataType::Minute,
        "00s" => DataType::Second,
        "00D" => DataType::DateTime,
        "00T" => DataType::Timestamp,
        "00n" => DataType::NanoTime,
        "00N" => DataType::NanoTimestamp,
        "datehour(00i)" => DataType::DateHour,
        _ => return None,
    })
}

/// `64('0.00',2)` or `32(NULL,3)` after the `decimal` prefix
fn parse_decimal(rest: &str) -> Option<Result<(Value, TypeDescriptor)>> {
    let (bits, args) = rest.split_once('(')?;
    let tag = match bits {
        "32" => DataType::Decimal32,
        "64" => DataType::Decimal64,
        "128" => DataType::Decimal128,
        _ => return None,
    };
    let (value, scale) = args.strip_suffix(')')?.rsplit_once(',')?;
    let scale: u8 = scale.trim().parse().ok()?;
    let desc = match TypeDescriptor::decimal(tag, scale) {
        Ok(desc) => desc,
        Err(e) => return Some(Err(e)),
    };
    let value = value.trim();
    if value == "NULL" {
        return Some(Ok((Value::Null, desc)));
    }
    let text = value.trim_matches(|c: char| c == '\'' || c == '"');
    Some(text.parse::<Decimal>().map(|d| (Value::Decimal(d), desc)))
}

fn parse_number(text: &str) -> Option<Value> {
    let (body, suffix) = text.split_at(text.char_indices().last()?.0);
    Some(match suffix {
        "c" => Value::Char(body.parse().ok()?),
        "h" => Value::Short(body.parse().ok()?),
        "i" => Value::Int(body.parse().ok()?),
        "l" => Value::Long(body.parse().ok()?),
        "f" => Value::Float(body.parse().ok()?),
        "F" => Value::Double(body.parse().ok()?),
        _ => {
            if let Ok(v) = text.parse::<i32>() {
                Value::Int(v)
            } else if let Ok(v) = text.parse::<i64>() {
                Value::Long(v)
            } else {
                Value::Double(text.parse().ok()?)
            }
        }
    })
}

fn parse_temporal(text: &str) -> Option<Temporal> {
    if let Some(inner) = text.strip_prefix("datehour('").and_then(|s| s.strip_suffix("')")) {
        let dt = NaiveDateTime::parse_from_str(&format!("{}:00:00", inner), "%Y.%m.%dT%H:%M:%S").ok()?;
        return Temporal::from_datetime(dt).ok()?.convert(TemporalKind::DateHour).ok();
    }
    if let Some(month) = text.strip_suffix('M') {
        let (y, m) = month.split_once('.')?;
        return Some(Temporal::month(y.parse().ok()?, m.parse().ok()?));
    }
    if let Some(minute) = text.strip_suffix('m') {
        let t = NaiveTime::parse_from_str(minute, "%H:%M").ok()?;
        return Temporal::from_time(t).convert(TemporalKind::Minute).ok();
    }
    let fraction_digits = text
        .rsplit_once(':')
        .and_then(|(_, seconds)| seconds.split_once('.'))
        .map(|(_, fraction)| fraction.len());
    if text.contains('T') {
        let dt = NaiveDateTime::parse_from_str(text, "%Y.%m.%dT%H:%M:%S%.f").ok()?;
        let kind = match fraction_digits {
            None => TemporalKind::DateTime,
            Some(n) if n <= 3 => TemporalKind::Timestamp,
            Some(_) => TemporalKind::NanoTimestamp,
        };
        return Temporal::from_datetime(dt).ok()?.convert(kind).ok();
    }
    if text.contains(':') {
        let t = NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok()?;
        let kind = match fraction_digits {
            None => TemporalKind::Second,
            Some(n) if n <= 3 => TemporalKind::Time,
            Some(_) => TemporalKind::NanoTime,
        };
        return Temporal::from_time(t).convert(kind).ok();
    }
    NaiveDate::parse_from_str(text, "%Y.%m.%d").ok().map(Temporal::from_date)
}
