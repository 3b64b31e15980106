//! Upload-direction type inference for untyped host values

use super::{DataType, TypeDescriptor, TypeRegistry};
use crate::codec::ArrayVectorCodec;
use crate::data::HostValue;
use crate::Result;

impl TypeRegistry {
    /// Wire type for a host value when the caller gave none.
    ///
    /// Width-specific host kinds map to their matching tag; untyped integers,
    /// floats and text fall back to LONG, DOUBLE and STRING. `None` infers
    /// VOID, which column assembly replaces with the column's real type.
    pub fn infer_tag(value: &HostValue) -> Result<TypeDescriptor> {
        let tag = match value {
            HostValue::None => DataType::Void,
            HostValue::Bool(_) => DataType::Bool,
            HostValue::Int8(_) => DataType::Char,
            HostValue::Int16(_) => DataType::Short,
            HostValue::Int32(_) => DataType::Int,
            HostValue::Int(_) | HostValue::Int64(_) => DataType::Long,
            HostValue::Float32(_) => DataType::Float,
            HostValue::Float(_) => DataType::Double,
            HostValue::Str(_) => DataType::String,
            HostValue::Bytes(_) => DataType::Blob,
            HostValue::Decimal(d) => return Ok(Self::infer_decimal(d.as_ref())),
            HostValue::Date(_) => DataType::Date,
            HostValue::DateTime(_) => DataType::NanoTimestamp,
            HostValue::Time(_) => DataType::NanoTime,
            HostValue::Datetime64 { unit, .. } => unit.upload_kind().data_type(),
            HostValue::List(items) => return ArrayVectorCodec::infer_array(items),
        };
        Ok(TypeDescriptor::scalar(tag))
    }

    /// DECIMAL64 at the written scale, promoted to DECIMAL128 when the
    /// digits or the scale exceed what 64 bits hold. NaN infers DECIMAL64(0).
    fn infer_decimal(value: Option<&super::Decimal>) -> TypeDescriptor {
        let d = match value {
            Some(d) => d,
            None => return TypeDescriptor { scale: Some(0), ..TypeDescriptor::scalar(DataType::Decimal64) },
        };
        let info64 = TypeRegistry::info(DataType::Decimal64);
        let tag = if d.scale() <= info64.max_scale && d.digits() <= info64.precision {
            DataType::Decimal64
        } else {
            DataType::Decimal128
        };
        TypeDescriptor {
            scale: Some(d.scale()),
            ..TypeDescriptor::scalar(tag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TimeUnit;
    use crate::types::Decimal;
    use chrono::NaiveDate;

    fn infer(v: HostValue) -> TypeDescriptor {
        TypeRegistry::infer_tag(&v).unwrap()
    }

    #[test]
    fn test_width_specific_before_fallback() {
        assert_eq!(infer(HostValue::Int8(1)).tag, DataType::Char);
        assert_eq!(infer(HostValue::Int16(1)).tag, DataType::Short);
        assert_eq!(infer(HostValue::Int32(1)).tag, DataType::Int);
        assert_eq!(infer(HostValue::Int(1)).tag, DataType::Long);
        assert_eq!(infer(HostValue::Float(1.0)).tag, DataType::Double);
        assert_eq!(infer(HostValue::Float32(1.0)).tag, DataType::Float);
        assert_eq!(infer(HostValue::Str("x".into())).tag, DataType::String);
    }

    #[test]
    fn test_decimal_scale_and_promotion() {
        let zero: Decimal = "0.00".parse().unwrap();
        let desc = infer(HostValue::Decimal(Some(zero)));
        assert_eq!((desc.tag, desc.scale), (DataType::Decimal64, Some(2)));

        let nan = infer(HostValue::Decimal(None));
        assert_eq!((nan.tag, nan.scale), (DataType::Decimal64, Some(0)));

        let pi: Decimal = "3.14159265358979323846264338327950288419".parse().unwrap();
        let desc = infer(HostValue::Decimal(Some(pi)));
        assert_eq!(desc.tag, DataType::Decimal128);
    }

    #[test]
    fn test_temporal_inference() {
        let d = NaiveDate::from_ymd_opt(2012, 6, 13).unwrap();
        assert_eq!(infer(HostValue::Date(d)).tag, DataType::Date);
        assert_eq!(infer(HostValue::DateTime(d.and_hms_opt(1, 0, 0).unwrap())).tag, DataType::NanoTimestamp);
        let cases = [
            (TimeUnit::Day, DataType::Date),
            (TimeUnit::Month, DataType::Month),
            (TimeUnit::Hour, DataType::DateHour),
            (TimeUnit::Minute, DataType::DateTime),
            (TimeUnit::Second, DataType::DateTime),
            (TimeUnit::Milli, DataType::Timestamp),
            (TimeUnit::Micro, DataType::NanoTimestamp),
            (TimeUnit::Nano, DataType::NanoTimestamp),
        ];
        for (unit, tag) in cases {
            assert_eq!(infer(HostValue::Datetime64 { unit, ticks: Some(1) }).tag, tag);
        }
    }

    #[test]
    fn test_list_infers_array_vector() {
        let desc = infer(HostValue::List(vec![HostValue::None, HostValue::Int32(1)]));
        assert_eq!(desc, TypeDescriptor::array_of(DataType::Int));
    }
}
