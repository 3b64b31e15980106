//! Partition-aware bulk appends
//!
//! Architecture:
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  TableAppender / PartitionedTableAppender                │
//! │  - Loads target schema and partitioning once             │
//! │  - Casts batches to the schema, encodes table frames     │
//! │  - Dispatches one request per partition (rayon)          │
//! ├──────────────────────────────────────────────────────────┤
//! │  PartitionRouter                                         │
//! │  - Splits a table into per-partition sub-tables          │
//! ├──────────────────────────────────────────────────────────┤
//! │  PartitionStrategy                                       │
//! │  - Range, value, hash, list and composite schemes        │
//! ├──────────────────────────────────────────────────────────┤
//! │  ConnectionPool                                          │
//! │  - Bounded, scoped acquisition, explicit shutdown        │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod appender;
pub mod partition;
pub mod pool;
pub mod router;
pub mod stats;

pub use appender::{PartitionedTableAppender, TableAppender, TableTarget};
pub use partition::{
    CompositePartitioner, HashPartitioner, ListPartitioner, PartitionKey, PartitionScheme,
    PartitionSpec, PartitionStrategy, RangePartitioner, ValuePartitioner,
};
pub use pool::{Connection, ConnectionPool, PooledConnection, Response};
pub use router::PartitionRouter;
pub use stats::{AppendStats, AppendStatsSnapshot};

#[cfg(test)]
mod tests;
