//! Array vector codec
//!
//! An array vector column holds one variable-length array per row, all of a
//! single element type. Element type detection walks the elements through a
//! small state machine: the first non-null element commits the type, later
//! elements must agree, nulls never commit anything.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::decoder::{truncated, Reader};
use super::{ValueDecoder, ValueEncoder};
use crate::data::{HostValue, Value};
use crate::types::{DataType, TypeDescriptor, TypeRegistry};
use crate::{Result, WireError};

/// Element type detection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayState {
    /// Nothing seen yet
    Empty,
    /// Only null elements seen
    ElementNull,
    /// Committed to an element type
    Homogeneous(TypeDescriptor),
}

/// Element type tracker and row codec for array vector columns
#[derive(Debug, Clone)]
pub struct ArrayVectorCodec {
    state: ArrayState,
}

impl Default for ArrayVectorCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayVectorCodec {
    pub fn new() -> Self {
        Self { state: ArrayState::Empty }
    }

    pub fn state(&self) -> ArrayState {
        self.state
    }

    /// Feed one array element
    pub fn observe(&mut self, element: &HostValue) -> Result<()> {
        if element.is_null_like() {
            if self.state == ArrayState::Empty {
                self.state = ArrayState::ElementNull;
            }
            return Ok(());
        }
        let inferred = TypeRegistry::infer_tag(element)?;
        if inferred.array {
            return Err(WireError::type_mismatch("nested arrays are not supported"));
        }
        if !inferred.tag.can_be_array_element() {
            return Err(WireError::type_mismatch(format!(
                "{} cannot be an array vector element",
                inferred.tag
            )));
        }
        self.state = match self.state {
            ArrayState::Empty | ArrayState::ElementNull => ArrayState::Homogeneous(inferred),
            ArrayState::Homogeneous(current) => ArrayState::Homogeneous(merge(current, inferred)?),
        };
        Ok(())
    }

    /// Feed every element of one row; a null row is an empty array
    pub fn observe_row(&mut self, row: &HostValue) -> Result<()> {
        match row {
            HostValue::List(items) => items.iter().try_for_each(|item| self.observe(item)),
            h if h.is_null_like() => Ok(()),
            other => Err(WireError::type_mismatch(format!(
                "{} value in an array vector column",
                other.kind_name()
            ))),
        }
    }

    /// Array descriptor of everything observed; DOUBLE when no element
    /// committed a type
    pub fn descriptor(&self) -> TypeDescriptor {
        match self.state {
            ArrayState::Homogeneous(element) => element.into_array(),
            ArrayState::Empty | ArrayState::ElementNull => TypeDescriptor::array_of(DataType::Double),
        }
    }

    /// Array descriptor for a single host list
    pub fn infer_array(items: &[HostValue]) -> Result<TypeDescriptor> {
        let mut codec = Self::new();
        for item in items {
            codec.observe(item)?;
        }
        Ok(codec.descriptor())
    }

    /// Array descriptor for the column `name` whose rows are host lists
    pub fn infer_column(name: &str, rows: &[HostValue]) -> Result<TypeDescriptor> {
        let mut codec = Self::new();
        for (row, value) in rows.iter().enumerate() {
            codec.observe_row(value).map_err(|e| e.at(name, row))?;
        }
        Ok(codec.descriptor())
    }

    // ========================================================================
    // Row codec
    // ========================================================================

    /// Rows of an array vector column frame: the decimal scale (decimal
    /// elements only), then `[len u32]` and the element payloads per row
    pub(crate) fn write_rows(buf: &mut Vec<u8>, values: &[Value], desc: &TypeDescriptor, name: &str) -> Result<()> {
        let element = desc.element();
        let scale = desc.scale_or_zero();
        if desc.tag.is_decimal() {
            buf.write_i32::<LittleEndian>(scale as i32)?;
        }
        for (row, value) in values.iter().enumerate() {
            let items: &[Value] = match value {
                Value::Array(items, _) => items,
                _ => &[],
            };
            let len = u32::try_from(items.len())
                .map_err(|_| WireError::InvalidArgument(format!("array of {} elements", items.len())))?;
            buf.write_u32::<LittleEndian>(len)?;
            for item in items {
                ValueEncoder::write_payload(buf, item, &element, scale, true).map_err(|e| e.at(name, row))?;
            }
        }
        Ok(())
    }

    /// One array row; the decimal scale was read by the caller
    pub(crate) fn read_row(cur: &mut Reader<'_>, desc: &TypeDescriptor, scale: u8) -> Result<Value> {
        let element = desc.element();
        let len = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let mut items = Vec::with_capacity(len.min(1 << 12));
        for _ in 0..len {
            items.push(ValueDecoder::read_payload(cur, &element, scale)?);
        }
        Ok(Value::Array(items, desc.tag))
    }
}

/// Two element types seen in one array column. Decimals of one kind keep the
/// larger scale; anything else must match exactly.
fn merge(current: TypeDescriptor, next: TypeDescriptor) -> Result<TypeDescriptor> {
    if current.tag == next.tag {
        return Ok(TypeDescriptor {
            scale: current.scale.max(next.scale),
            ..current
        });
    }
    if current.tag.is_decimal() && next.tag.is_decimal() {
        let scale = current.scale_or_zero().max(next.scale_or_zero());
        return TypeDescriptor::decimal(DataType::Decimal128, scale);
    }
    Err(WireError::type_mismatch(format!(
        "{} element in a {} array",
        next.tag, current.tag
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    #[test]
    fn test_state_machine() {
        let mut codec = ArrayVectorCodec::new();
        assert_eq!(codec.state(), ArrayState::Empty);
        codec.observe(&HostValue::None).unwrap();
        assert_eq!(codec.state(), ArrayState::ElementNull);
        codec.observe(&HostValue::Int32(1)).unwrap();
        assert_eq!(codec.state(), ArrayState::Homogeneous(TypeDescriptor::scalar(DataType::Int)));
        codec.observe(&HostValue::None).unwrap();
        let err = codec.observe(&HostValue::Str("x".into())).unwrap_err();
        assert!(matches!(err, WireError::TypeMismatch { .. }));
    }

    #[test]
    fn test_all_null_falls_back_to_double() {
        let desc = ArrayVectorCodec::infer_array(&[HostValue::None, HostValue::None]).unwrap();
        assert_eq!(desc, TypeDescriptor::array_of(DataType::Double));
    }

    #[test]
    fn test_string_elements_rejected() {
        assert!(ArrayVectorCodec::infer_array(&[HostValue::Str("a".into())]).is_err());
    }

    #[test]
    fn test_null_position_does_not_matter() {
        let desc = TypeDescriptor::array_of(DataType::Int);
        for position in 0..3 {
            let mut items = vec![HostValue::Int32(7); 3];
            items[position] = HostValue::None;
            let value = ValueEncoder::coerce(&HostValue::List(items), &desc).unwrap();
            let column = Column::from_values("a", desc, vec![value.clone()]);
            let frame = ValueEncoder::encode_column(&column).unwrap();
            let decoded = ValueDecoder::decode_column(&frame).unwrap();
            match decoded.get(0) {
                Some(Value::Array(items, DataType::Int)) => {
                    for (i, item) in items.iter().enumerate() {
                        if i == position {
                            assert_eq!(item, &Value::Null);
                        } else {
                            assert_eq!(item, &Value::Int(7));
                        }
                    }
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_empty_array_differs_from_null_element() {
        let desc = TypeDescriptor::array_of(DataType::Long);
        let empty = ValueEncoder::encode(&Value::Array(vec![], DataType::Long), &desc).unwrap();
        let one_null = ValueEncoder::encode(&Value::Array(vec![Value::Null], DataType::Long), &desc).unwrap();
        assert_eq!(empty, vec![0, 0, 0, 0]);
        assert_ne!(empty, one_null);
        assert_eq!(
            ValueDecoder::decode(&one_null, &desc).unwrap(),
            Value::Array(vec![Value::Null], DataType::Long)
        );
    }

    #[test]
    fn test_wrong_element_type_for_declared_column() {
        let desc = TypeDescriptor::array_of(DataType::IpAddr);
        let err = ValueEncoder::coerce(&HostValue::List(vec![HostValue::Bool(true)]), &desc).unwrap_err();
        assert!(matches!(err, WireError::TypeMismatch { .. }));
    }
}
