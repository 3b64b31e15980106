//! Table batcher
//!
//! Turns row-oriented or column-oriented host input into a [`Table`] whose
//! columns each carry exactly one type descriptor. A column's type is the
//! caller's explicit override when one is given, otherwise the type inferred
//! from the column's first non-null value. Every value is then coerced to that
//! type; anything that does not fit fails with the column name and row index.

use ahash::AHashMap;

use crate::codec::{ArrayVectorCodec, ValueEncoder};
use crate::data::{Column, HostRow, HostValue, Table};
use crate::types::{DataType, TypeDescriptor, TypeRegistry};
use crate::{Result, WireError};

/// Builder for typed tables from host values
#[derive(Debug, Clone, Default)]
pub struct TableBatcher {
    name: String,
    explicit_types: AHashMap<String, TypeDescriptor>,
}

impl TableBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name given to produced tables
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the inferred type of one column
    pub fn with_type(mut self, column: impl Into<String>, desc: TypeDescriptor) -> Self {
        self.explicit_types.insert(column.into(), desc);
        self
    }

    /// Override the inferred types of several columns
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = (S, TypeDescriptor)>,
        S: Into<String>,
    {
        self.explicit_types
            .extend(types.into_iter().map(|(name, desc)| (name.into(), desc)));
        self
    }

    pub fn explicit_type(&self, column: &str) -> Option<&TypeDescriptor> {
        self.explicit_types.get(column)
    }

    /// Assemble a table from rows of (column, value) pairs. Column order
    /// follows first appearance; every row must supply every column once.
    pub fn from_rows(&self, rows: &[HostRow]) -> Result<Table> {
        let mut slots: AHashMap<&str, usize> = AHashMap::new();
        let mut columns: Vec<(String, Vec<HostValue>)> = Vec::new();
        for row in rows {
            for (name, value) in row {
                let slot = match slots.get(name.as_str()) {
                    Some(&slot) => slot,
                    None => {
                        slots.insert(name.as_str(), columns.len());
                        columns.push((name.clone(), Vec::with_capacity(rows.len())));
                        columns.len() - 1
                    }
                };
                columns[slot].1.push(value.clone());
            }
        }
        for (name, values) in &columns {
            if values.len() != rows.len() {
                return Err(WireError::RowCountMismatch {
                    column: name.clone(),
                    expected: rows.len(),
                    actual: values.len(),
                });
            }
        }
        self.from_columns(columns)
    }

    /// Assemble a table from named columns. Lengths are validated before
    /// anything is coerced.
    pub fn from_columns(&self, columns: Vec<(String, Vec<HostValue>)>) -> Result<Table> {
        if let Some((_, first)) = columns.first() {
            let expected = first.len();
            if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != expected) {
                return Err(WireError::RowCountMismatch {
                    column: name.clone(),
                    expected,
                    actual: values.len(),
                });
            }
        }
        if let Some(unknown) = self
            .explicit_types
            .keys()
            .find(|name| !columns.iter().any(|(c, _)| c == *name))
        {
            return Err(WireError::InvalidArgument(format!(
                "explicit type given for unknown column '{}'",
                unknown
            )));
        }

        let mut table = Table::new(self.name.clone());
        for (name, values) in &columns {
            table.add_column(self.build_column(name, values)?)?;
        }
        Ok(table)
    }

    /// Resolve the type of one column and coerce its values
    pub fn build_column(&self, name: &str, values: &[HostValue]) -> Result<Column> {
        let desc = self.column_type(name, values)?;
        let mut column = Column::with_capacity(name, desc, values.len());
        for (row, value) in values.iter().enumerate() {
            column.push(ValueEncoder::coerce(value, &desc).map_err(|e| e.at(name, row))?);
        }
        Ok(column)
    }

    /// Explicit override, else inferred from the first non-null value. A
    /// column holding only nulls takes the type of its first typed null
    /// (NaN decimal, NaT) and falls back to DOUBLE.
    pub fn column_type(&self, name: &str, values: &[HostValue]) -> Result<TypeDescriptor> {
        if let Some(desc) = self.explicit_types.get(name) {
            return Ok(*desc);
        }
        match values.iter().position(|v| !v.is_null_like()) {
            Some(row) => match &values[row] {
                HostValue::List(_) => ArrayVectorCodec::infer_column(name, values),
                value => TypeRegistry::infer_tag(value).map_err(|e| e.at(name, row)),
            },
            None => {
                let typed_null = values
                    .iter()
                    .find(|v| matches!(v, HostValue::Decimal(None) | HostValue::Datetime64 { .. }));
                match typed_null {
                    Some(value) => TypeRegistry::infer_tag(value),
                    None => Ok(TypeDescriptor::scalar(DataType::Double)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::types::Decimal;

    fn row(pairs: &[(&str, HostValue)]) -> HostRow {
        pairs.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_from_rows_infers_types() {
        let rows = vec![
            row(&[("id", HostValue::Int(1)), ("sym", HostValue::Str("a".into()))]),
            row(&[("sym", HostValue::Str("b".into())), ("id", HostValue::None)]),
        ];
        let table = TableBatcher::new().with_name("t").from_rows(&rows).unwrap();
        assert_eq!(table.column_names(), vec!["id", "sym"]);
        assert_eq!(table.column("id").unwrap().data_type(), DataType::Long);
        assert_eq!(table.column("id").unwrap().get(1), Some(&Value::Null));
        assert_eq!(table.column("sym").unwrap().data_type(), DataType::String);
    }

    #[test]
    fn test_missing_field_is_row_count_mismatch() {
        let rows = vec![
            row(&[("a", HostValue::Int(1)), ("b", HostValue::Int(1))]),
            row(&[("a", HostValue::Int(2))]),
        ];
        let err = TableBatcher::new().from_rows(&rows).unwrap_err();
        assert!(matches!(err, WireError::RowCountMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_explicit_type_wins() {
        let batcher = TableBatcher::new().with_type("v", TypeDescriptor::scalar(DataType::Short));
        let table = batcher
            .from_columns(vec![("v".into(), vec![HostValue::Int(1), HostValue::None])])
            .unwrap();
        assert_eq!(table.column("v").unwrap().values(), &[Value::Short(1), Value::Null]);

        let err = batcher
            .from_columns(vec![("w".into(), vec![HostValue::Int(1)])])
            .unwrap_err();
        assert!(matches!(err, WireError::InvalidArgument(_)));
    }

    #[test]
    fn test_all_null_defaults_to_double() {
        let table = TableBatcher::new()
            .from_columns(vec![("x".into(), vec![HostValue::None, HostValue::Float(f64::NAN)])])
            .unwrap();
        assert_eq!(table.column("x").unwrap().data_type(), DataType::Double);

        let table = TableBatcher::new()
            .from_columns(vec![("d".into(), vec![HostValue::Decimal(None)])])
            .unwrap();
        let desc = table.column("d").unwrap().descriptor();
        assert_eq!((desc.tag, desc.scale), (DataType::Decimal64, Some(0)));
    }

    #[test]
    fn test_mixed_column_reports_position() {
        let err = TableBatcher::new()
            .from_columns(vec![(
                "q".into(),
                vec![HostValue::Int(1), HostValue::Int(2), HostValue::Str("x".into())],
            )])
            .unwrap_err();
        assert!(matches!(
            err,
            WireError::TypeMismatch { column: Some(ref c), row: Some(2), .. } if c == "q"
        ));
    }

    #[test]
    fn test_decimal_column_first_value_scale() {
        let values = vec![
            HostValue::Decimal(Some("0.00".parse::<Decimal>().unwrap())),
            HostValue::Decimal(Some("1.5".parse::<Decimal>().unwrap())),
        ];
        let table = TableBatcher::new().from_columns(vec![("p".into(), values)]).unwrap();
        let col = table.column("p").unwrap();
        assert_eq!(col.descriptor().scale, Some(2));
        assert_eq!(col.get(1).unwrap().to_string(), "1.50");
    }

    #[test]
    fn test_array_vector_column() {
        let values = vec![
            HostValue::List(vec![HostValue::Int32(1), HostValue::None]),
            HostValue::None,
            HostValue::List(vec![]),
        ];
        let table = TableBatcher::new().from_columns(vec![("a".into(), values)]).unwrap();
        let col = table.column("a").unwrap();
        assert_eq!(*col.descriptor(), TypeDescriptor::array_of(DataType::Int));
        assert_eq!(col.get(1), Some(&Value::Array(vec![], DataType::Int)));
    }
}
