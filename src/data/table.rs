//! Table - named, ordered set of equal-length columns

use ahash::AHashMap;

use super::Column;
use crate::{Result, WireError};

/// Named batch of columns; every column holds the same number of rows
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Build a table, validating unique names and equal row counts
    pub fn from_columns(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::new(name);
        for column in columns {
            table.add_column(column)?;
        }
        Ok(table)
    }

    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if self.columns.iter().any(|c| c.name() == column.name()) {
            return Err(WireError::InvalidArgument(format!(
                "duplicate column name '{}'",
                column.name()
            )));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(WireError::RowCountMismatch {
                    column: column.name().to_string(),
                    expected: first.len(),
                    actual: column.len(),
                });
            }
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// True when the table holds no rows
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Case-insensitive column position
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn column_at(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    /// Sub-table of the rows at `indices`, preserving their order
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            name: self.name.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
        }
    }

    /// Row indices grouped by column values, in first-appearance order
    pub fn group_rows<K, F>(&self, mut key_of: F) -> Result<Vec<(K, Vec<usize>)>>
    where
        K: std::hash::Hash + Eq + Clone,
        F: FnMut(usize) -> Result<K>,
    {
        let mut slots: AHashMap<K, usize> = AHashMap::new();
        let mut groups: Vec<(K, Vec<usize>)> = Vec::new();
        for row in 0..self.row_count() {
            let key = key_of(row)?;
            match slots.get(&key) {
                Some(&slot) => groups[slot].1.push(row),
                None => {
                    slots.insert(key.clone(), groups.len());
                    groups.push((key, vec![row]));
                }
            }
        }
        Ok(groups)
    }
}
