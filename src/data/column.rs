//! Column definitions and column storage

use super::Value;
use crate::types::{DataType, TypeDescriptor};
use serde::{Deserialize, Serialize};

/// Column definition as reported by a server schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Wire type, including decimal scale
    pub descriptor: TypeDescriptor,
    /// Ordinal position in the table
    pub ordinal_position: usize,
}

impl ColumnDef {
    /// Create a new column definition
    pub fn new(name: impl Into<String>, descriptor: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
            ordinal_position: 0,
        }
    }

    /// Set ordinal position
    pub fn position(mut self, pos: usize) -> Self {
        self.ordinal_position = pos;
        self
    }
}

/// A column of values sharing one type descriptor. Nulls are the in-band
/// sentinels of the type, so there is no separate validity bitmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    descriptor: TypeDescriptor,
    values: Vec<Value>,
}

impl Column {
    /// Create an empty column
    pub fn new(name: impl Into<String>, descriptor: TypeDescriptor) -> Self {
        Self::with_capacity(name, descriptor, 0)
    }

    /// Create a column with preallocated capacity
    pub fn with_capacity(name: impl Into<String>, descriptor: TypeDescriptor, capacity: usize) -> Self {
        Self {
            name: name.into(),
            descriptor,
            values: Vec::with_capacity(capacity),
        }
    }

    /// Create a column from already-typed values
    pub fn from_values(name: impl Into<String>, descriptor: TypeDescriptor, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            descriptor,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Whether the row holds its type's null; rows past the end read as null
    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).map_or(true, Value::is_null)
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Push the null of this column's type
    pub fn push_null(&mut self) {
        self.values.push(Value::null_of(&self.descriptor));
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn data_type(&self) -> DataType {
        self.descriptor.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn has_nulls(&self) -> bool {
        self.values.iter().any(Value::is_null)
    }

    /// Rows at `indices`, in the given order
    pub fn take(&self, indices: &[usize]) -> Column {
        let mut out = Column::with_capacity(self.name.clone(), self.descriptor, indices.len());
        for &i in indices {
            match self.values.get(i) {
                Some(v) => out.push(v.clone()),
                None => out.push_null(),
            }
        }
        out
    }

    /// Collection view: narrow numeric columns holding a null become DOUBLE
    /// with NaN in place of the null
    pub fn widened(&self) -> Column {
        if self.descriptor.array || !self.descriptor.tag.widens_on_null() || !self.has_nulls() {
            return self.clone();
        }
        let mut out = Column::with_capacity(
            self.name.clone(),
            TypeDescriptor::scalar(DataType::Double),
            self.len(),
        );
        for (i, v) in self.values.iter().enumerate() {
            if self.is_null(i) {
                out.push(Value::Double(f64::NAN));
            } else {
                out.push(Value::Double(v.as_f64().unwrap_or(f64::NAN)));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_col(name: &str) -> Column {
        Column::new(name, TypeDescriptor::scalar(DataType::Int))
    }

    #[test]
    fn test_column_def() {
        let def = ColumnDef::new("price", TypeDescriptor::decimal(DataType::Decimal64, 2).unwrap()).position(3);
        assert_eq!(def.name, "price");
        assert_eq!(def.descriptor.scale, Some(2));
        assert_eq!(def.ordinal_position, 3);
    }

    #[test]
    fn test_column_operations() {
        let mut col = int_col("age");
        col.push(Value::Int(30));
        col.push(Value::Null);
        col.push(Value::Int(25));

        assert_eq!(col.len(), 3);
        assert_eq!(col.get(0), Some(&Value::Int(30)));
        assert!(!col.is_null(0));
        assert!(col.is_null(1));
        assert!(!col.is_null(2));
        assert!(col.is_null(3));
        assert!(col.has_nulls());
    }

    #[test]
    fn test_nulls_follow_sentinels() {
        let mut col = int_col("value");
        for i in 0..10 {
            if i % 3 == 0 {
                col.push_null();
            } else {
                col.push(Value::Int(i));
            }
        }
        for i in 0..10 {
            assert_eq!(col.is_null(i), i % 3 == 0);
        }
        col.push(Value::Int(i32::MIN));
        assert!(col.is_null(10));

        let strings = Column::from_values(
            "s",
            TypeDescriptor::scalar(DataType::String),
            vec![Value::String("a".into()), Value::String(String::new())],
        );
        assert!(!strings.is_null(0));
        assert!(strings.is_null(1));
    }

    #[test]
    fn test_widened_only_with_nulls() {
        let mut col = Column::new("h", TypeDescriptor::scalar(DataType::Short));
        col.push(Value::Short(7));
        assert_eq!(col.widened().data_type(), DataType::Short);

        col.push_null();
        let wide = col.widened();
        assert_eq!(wide.data_type(), DataType::Double);
        assert_eq!(wide.get(0), Some(&Value::Double(7.0)));
        assert!(matches!(wide.get(1), Some(Value::Double(v)) if v.is_nan()));

        let mut longs = Column::new("l", TypeDescriptor::scalar(DataType::Long));
        longs.push_null();
        assert_eq!(longs.widened().data_type(), DataType::Long);
    }

    #[test]
    fn test_take_preserves_order() {
        let col = Column::from_values(
            "q",
            TypeDescriptor::scalar(DataType::Int),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        );
        let picked = col.take(&[2, 0]);
        assert_eq!(picked.values(), &[Value::Int(3), Value::Int(1)]);
    }
}
