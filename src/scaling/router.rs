//! Partition Router - Splits a table into per-partition sub-tables
//!
//! Each row is keyed by the partition strategy applied to its partition
//! column value(s). Rows sharing a key form one sub-table, in the order they
//! appear in the input, and sub-tables come out in first-appearance order of
//! their keys.

use std::sync::Arc;

use super::partition::{PartitionKey, PartitionScheme, PartitionSpec, PartitionStrategy};
use crate::data::Table;
use crate::{Result, WireError};

// ============================================================================
// Partition Router
// ============================================================================

/// Routes the rows of a table to the partitions of a target
pub struct PartitionRouter {
    spec: Arc<PartitionSpec>,
    strategy: Box<dyn PartitionStrategy>,
}

impl PartitionRouter {
    /// Create a router, validating the partition spec once
    pub fn new(spec: Arc<PartitionSpec>) -> Result<Self> {
        spec.validate()?;
        let strategy = spec.scheme.strategy()?;
        Ok(Self { spec, strategy })
    }

    /// One-shot routing on a single partition column
    pub fn route_with(table: &Table, column: &str, scheme: PartitionScheme) -> Result<Vec<(PartitionKey, Table)>> {
        Self::new(Arc::new(PartitionSpec::new(column, scheme)))?.route(table)
    }

    pub fn spec(&self) -> &Arc<PartitionSpec> {
        &self.spec
    }

    pub fn strategy(&self) -> &dyn PartitionStrategy {
        self.strategy.as_ref()
    }

    /// Split `table` into non-empty sub-tables, one per partition key
    pub fn route(&self, table: &Table) -> Result<Vec<(PartitionKey, Table)>> {
        let columns = self
            .spec
            .columns
            .iter()
            .map(|name| {
                table
                    .column_index(name)
                    .and_then(|i| table.column_at(i))
                    .ok_or_else(|| {
                        WireError::SchemaMismatch(format!(
                            "partition column '{}' is not in the appended table",
                            name
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut row_values = Vec::with_capacity(columns.len());
        let groups = table.group_rows(|row| {
            row_values.clear();
            for column in columns.iter().copied() {
                match column.get(row) {
                    Some(value) => row_values.push(value),
                    None => {
                        return Err(WireError::RowCountMismatch {
                            column: column.name().to_string(),
                            expected: table.row_count(),
                            actual: column.len(),
                        })
                    }
                }
            }
            self.strategy
                .route_row(&row_values)
                .map_err(|e| e.at(columns[0].name(), row))
        })?;

        log::debug!(
            "Routed {} rows of '{}' to {} {} partition(s)",
            table.row_count(),
            table.name(),
            groups.len(),
            self.strategy.name()
        );

        Ok(groups
            .into_iter()
            .map(|(key, rows)| (key, table.take_rows(&rows)))
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
