//! Table appenders
//!
//! `TableAppender` casts a batch to the target's schema, uploads it as one
//! table frame and inserts it. `PartitionedTableAppender` first splits the
//! batch by the target's partitioning and sends every sub-table as its own
//! request, concurrently when configured.
//!
//! Either appender fails a whole call on the first error. Sub-tables already
//! inserted by a failed partitioned call stay inserted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use rayon::prelude::*;

use super::partition::{
    PartitionKey, PartitionScheme, PartitionSpec, PARTITION_COMPO, PARTITION_HASH, PARTITION_LIST,
    PARTITION_RANGE, PARTITION_SEQ, PARTITION_VALUE,
};
use super::pool::{Connection, ConnectionPool, Response};
use super::router::PartitionRouter;
use super::stats::{AppendStats, AppendStatsSnapshot};
use crate::codec::literal::quote;
use crate::codec::ValueEncoder;
use crate::config::AppenderConfig;
use crate::data::{Column, ColumnDef, Table, Value};
use crate::types::{TypeDescriptor, TypeRegistry};
use crate::{Result, WireError};

/// Distinguishes upload variables of appenders sharing a session
static NEXT_APPENDER_ID: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// Table Target
// ============================================================================

/// Table addressed by an appender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTarget {
    pub db_path: Option<String>,
    pub table: String,
}

impl TableTarget {
    /// Table of a database
    pub fn new(db_path: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            db_path: Some(db_path.into()),
            table: table.into(),
        }
    }

    /// In-memory table known by name in the session
    pub fn in_memory(table: impl Into<String>) -> Self {
        Self {
            db_path: None,
            table: table.into(),
        }
    }

    /// Script expression referring to the table
    pub fn handle(&self) -> String {
        match &self.db_path {
            Some(db) => format!("loadTable({},{})", quote(db), quote(&self.table)),
            None => self.table.clone(),
        }
    }
}

impl std::fmt::Display for TableTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.db_path {
            Some(db) => write!(f, "{}/{}", db, self.table),
            None => f.write_str(&self.table),
        }
    }
}

// ============================================================================
// Schema Loading
// ============================================================================

/// Column definitions from `schema(<handle>).colDefs`
pub fn load_schema<C: Connection + ?Sized>(conn: &mut C, target: &TableTarget) -> Result<Vec<ColumnDef>> {
    let defs = conn
        .execute(&format!("schema({}).colDefs", target.handle()))?
        .into_table()?;
    let names = schema_column(&defs, "name")?;
    let codes = schema_column(&defs, "typeInt")?;
    let extras = defs.column_index("extra").and_then(|i| defs.column_at(i));

    let mut columns = Vec::with_capacity(defs.row_count());
    for row in 0..defs.row_count() {
        let name = names
            .get(row)
            .and_then(Value::as_str)
            .ok_or_else(|| WireError::Server(format!("colDefs row {} has no column name", row)))?;
        let code = codes
            .get(row)
            .and_then(Value::as_i64)
            .and_then(|c| u8::try_from(c).ok())
            .ok_or_else(|| WireError::Server(format!("colDefs row {} has no type code", row)))?;
        let mut desc = TypeRegistry::lookup_code(code)?;
        if desc.tag.is_decimal() {
            let scale = extras
                .and_then(|c| c.get(row))
                .and_then(Value::as_i64)
                .and_then(|s| u8::try_from(s).ok())
                .unwrap_or(0);
            let scaled = TypeDescriptor::decimal(desc.tag, scale)?;
            desc = if desc.array { scaled.into_array() } else { scaled };
        }
        columns.push(ColumnDef::new(name, desc).position(row));
    }
    log::info!("Loaded schema of {} ({} columns)", target, columns.len());
    Ok(columns)
}

fn schema_column<'a>(defs: &'a Table, name: &str) -> Result<&'a Column> {
    defs.column_index(name)
        .and_then(|i| defs.column_at(i))
        .ok_or_else(|| WireError::Server(format!("colDefs has no '{}' column", name)))
}

/// Partitioning from `schema(<handle>).partitionColumnName`, `.partitionType`
/// and `.partitionSchema`
pub fn load_partition_spec<C: Connection + ?Sized>(conn: &mut C, target: &TableTarget) -> Result<PartitionSpec> {
    let handle = target.handle();
    let columns = conn
        .execute(&format!("schema({}).partitionColumnName", handle))?
        .into_values()?
        .into_iter()
        .map(|v| match v {
            Value::String(s) | Value::Symbol(s) => Ok(s),
            other => Err(WireError::Server(format!("partition column name is {}", other.kind_name()))),
        })
        .collect::<Result<Vec<_>>>()?;
    let types = conn
        .execute(&format!("schema({}).partitionType", handle))?
        .into_values()?
        .iter()
        .map(partition_type_code)
        .collect::<Result<Vec<_>>>()?;
    let schema = conn.execute(&format!("schema({}).partitionSchema", handle))?;

    let scheme = match types.as_slice() {
        [code] => scheme_from_server(*code, schema)?,
        codes => {
            let levels = match schema {
                Response::Tuple(levels) if levels.len() == codes.len() => levels,
                other => {
                    return Err(WireError::Server(format!(
                        "composite partition schema is a {}, expected a tuple of {}",
                        other.kind_name(),
                        codes.len()
                    )))
                }
            };
            PartitionScheme::Compo(
                codes
                    .iter()
                    .zip(levels)
                    .map(|(code, level)| scheme_from_server(*code, level))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
    };
    let spec = PartitionSpec { columns, scheme };
    spec.validate()?;
    log::info!(
        "Loaded {} partitioning of {} on {:?}",
        spec.scheme.name(),
        target,
        spec.columns
    );
    Ok(spec)
}

fn partition_type_code(value: &Value) -> Result<i32> {
    value
        .as_i64()
        .and_then(|c| i32::try_from(c).ok())
        .ok_or_else(|| WireError::Server(format!("partition type is {}", value.kind_name())))
}

/// One partitioning level as the server reports it
fn scheme_from_server(code: i32, schema: Response) -> Result<PartitionScheme> {
    match code {
        PARTITION_VALUE => Ok(PartitionScheme::Value(schema.into_values()?)),
        PARTITION_RANGE => Ok(PartitionScheme::Range(schema.into_values()?)),
        PARTITION_HASH => {
            let buckets = schema
                .into_values()?
                .first()
                .and_then(Value::as_i64)
                .and_then(|b| u32::try_from(b).ok())
                .ok_or_else(|| WireError::Server("hash partition schema has no bucket count".to_string()))?;
            Ok(PartitionScheme::Hash { buckets })
        }
        PARTITION_LIST => {
            let groups = match schema {
                Response::Tuple(groups) => groups
                    .into_iter()
                    .map(Response::into_values)
                    .collect::<Result<Vec<_>>>()?,
                other => other
                    .into_values()?
                    .into_iter()
                    .map(|group| match group {
                        Value::Array(items, _) => items,
                        single => vec![single],
                    })
                    .collect(),
            };
            Ok(PartitionScheme::List(groups))
        }
        PARTITION_SEQ => Err(WireError::InvalidArgument(
            "sequentially partitioned tables cannot be appended by partition".to_string(),
        )),
        PARTITION_COMPO => Err(WireError::Server("composite partitioning cannot nest".to_string())),
        other => Err(WireError::Server(format!("unknown partition type {}", other))),
    }
}

// ============================================================================
// Shared append path
// ============================================================================

/// State common to both appenders
struct AppendContext<C: Connection> {
    pool: Arc<ConnectionPool<C>>,
    target: TableTarget,
    handle: String,
    variable: String,
    config: AppenderConfig,
    schema: Arc<Vec<ColumnDef>>,
    stats: Arc<AppendStats>,
}

impl<C: Connection> AppendContext<C> {
    fn open(pool: Arc<ConnectionPool<C>>, target: TableTarget, config: AppenderConfig) -> Result<Self> {
        let schema = {
            let mut conn = pool.acquire()?;
            load_schema(&mut conn, &target)?
        };
        let variable = format!(
            "{}_{}",
            config.upload_variable_prefix,
            NEXT_APPENDER_ID.fetch_add(1, Ordering::Relaxed)
        );
        Ok(Self {
            handle: target.handle(),
            pool,
            target,
            variable,
            config,
            schema: Arc::new(schema),
            stats: Arc::new(AppendStats::new()),
        })
    }

    /// Cast every column to the schema type of the same position, under the
    /// schema's column name
    fn conform(&self, table: &Table) -> Result<Table> {
        if table.column_count() != self.schema.len() {
            return Err(WireError::SchemaMismatch(format!(
                "appended table has {} columns, {} has {}",
                table.column_count(),
                self.target,
                self.schema.len()
            )));
        }
        let columns = table
            .columns()
            .iter()
            .zip(self.schema.iter())
            .map(|(column, def)| {
                if column.descriptor() == &def.descriptor {
                    let mut same = column.clone();
                    same.rename(def.name.clone());
                    return Ok(same);
                }
                let values = column
                    .iter()
                    .enumerate()
                    .map(|(row, v)| ValueEncoder::cast(v, &def.descriptor).map_err(|e| e.at(column.name(), row)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Column::from_values(def.name.clone(), def.descriptor, values))
            })
            .collect::<Result<Vec<_>>>()?;
        Table::from_columns(table.name(), columns)
    }

    /// Upload one frame and insert it on a pooled connection
    fn send(&self, frame: Bytes, rows: usize) -> Result<usize> {
        let outcome = self.pool.acquire().and_then(|mut conn| {
            conn.upload(&self.variable, frame)?;
            conn.execute(&format!("tableInsert({}, {})", self.handle, self.variable))?;
            Ok(rows)
        });
        match &outcome {
            Ok(_) => self.stats.record_request(rows),
            Err(_) => self.stats.record_failure(),
        }
        outcome
    }

    fn reload_schema(&mut self) -> Result<()> {
        let mut conn = self.pool.acquire()?;
        self.schema = Arc::new(load_schema(&mut conn, &self.target)?);
        Ok(())
    }
}

// ============================================================================
// Table Appender
// ============================================================================

/// Appends batches to a table as a single request each
pub struct TableAppender<C: Connection> {
    ctx: AppendContext<C>,
}

impl<C: Connection> TableAppender<C> {
    /// Bind to `target`, loading its schema
    pub fn new(pool: Arc<ConnectionPool<C>>, target: TableTarget, config: AppenderConfig) -> Result<Self> {
        Ok(Self {
            ctx: AppendContext::open(pool, target, config)?,
        })
    }

    pub fn target(&self) -> &TableTarget {
        &self.ctx.target
    }

    pub fn schema(&self) -> &[ColumnDef] {
        &self.ctx.schema
    }

    pub fn stats(&self) -> AppendStatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Re-read the target schema
    pub fn reload(&mut self) -> Result<()> {
        self.ctx.reload_schema()
    }

    /// Append `table`, returning its row count. A table without rows sends
    /// nothing.
    pub fn append(&mut self, table: &Table) -> Result<usize> {
        if table.is_empty() {
            return Ok(0);
        }
        self.ctx.stats.record_call();
        let conformed = self.ctx.conform(table)?;
        let frame = ValueEncoder::encode_table(&conformed)?;
        self.ctx.send(frame, conformed.row_count()).map_err(|e| {
            log::warn!("Append to {} failed: {}", self.ctx.target, e);
            e
        })
    }
}

// ============================================================================
// Partitioned Table Appender
// ============================================================================

/// Appends batches to a partitioned table, one request per partition
pub struct PartitionedTableAppender<C: Connection> {
    ctx: AppendContext<C>,
    partition_column: String,
    router: Arc<PartitionRouter>,
}

impl<C: Connection> PartitionedTableAppender<C> {
    /// Bind to `target`, loading its schema and partitioning. The server must
    /// partition the table on `partition_column`.
    pub fn new(
        pool: Arc<ConnectionPool<C>>,
        target: TableTarget,
        partition_column: impl Into<String>,
        config: AppenderConfig,
    ) -> Result<Self> {
        let partition_column = partition_column.into();
        let ctx = AppendContext::open(pool, target, config)?;
        let router = Self::load_router(&ctx, &partition_column)?;
        Ok(Self {
            ctx,
            partition_column,
            router,
        })
    }

    fn load_router(ctx: &AppendContext<C>, partition_column: &str) -> Result<Arc<PartitionRouter>> {
        let spec = {
            let mut conn = ctx.pool.acquire()?;
            load_partition_spec(&mut conn, &ctx.target)?
        };
        if !spec.columns.iter().any(|c| c.eq_ignore_ascii_case(partition_column)) {
            return Err(WireError::InvalidArgument(format!(
                "{} is partitioned on {:?}, not '{}'",
                ctx.target, spec.columns, partition_column
            )));
        }
        Ok(Arc::new(PartitionRouter::new(Arc::new(spec))?))
    }

    pub fn target(&self) -> &TableTarget {
        &self.ctx.target
    }

    pub fn schema(&self) -> &[ColumnDef] {
        &self.ctx.schema
    }

    pub fn partition_column(&self) -> &str {
        &self.partition_column
    }

    /// Cached partitioning, shareable across threads
    pub fn partition_spec(&self) -> Arc<PartitionSpec> {
        Arc::clone(self.router.spec())
    }

    pub fn stats(&self) -> AppendStatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Re-read the schema and partitioning
    pub fn reload(&mut self) -> Result<()> {
        self.ctx.reload_schema()?;
        self.router = Self::load_router(&self.ctx, &self.partition_column)?;
        Ok(())
    }

    /// Append `table`, returning its row count. Every partition's rows go out
    /// as one request; the first failure is returned once all requests have
    /// finished.
    pub fn append(&mut self, table: &Table) -> Result<usize> {
        if table.is_empty() {
            return Ok(0);
        }
        self.ctx.stats.record_call();
        let conformed = self.ctx.conform(table)?;
        let frames = self
            .router
            .route(&conformed)?
            .into_iter()
            .map(|(key, part)| Ok((key, part.row_count(), ValueEncoder::encode_table(&part)?)))
            .collect::<Result<Vec<(PartitionKey, usize, Bytes)>>>()?;

        let ctx = &self.ctx;
        let dispatch = |(key, rows, frame): (PartitionKey, usize, Bytes)| {
            log::debug!("Dispatching {} rows to partition {} of {}", rows, key, ctx.target);
            ctx.send(frame, rows)
        };
        let outcome = if ctx.config.parallel_dispatch && frames.len() > 1 {
            frames
                .into_par_iter()
                .map(dispatch)
                .collect::<Vec<_>>()
                .into_iter()
                .collect::<Result<Vec<usize>>>()
        } else {
            frames.into_iter().map(dispatch).collect::<Result<Vec<usize>>>()
        };

        match outcome {
            Ok(_) => Ok(conformed.row_count()),
            Err(e) => {
                log::warn!("Partitioned append to {} failed: {}", ctx.target, e);
                Err(e)
            }
        }
    }
}
