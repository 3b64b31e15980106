//! colwire - client-side type codec and bulk appender
//!
//! Translates dynamically typed host values into the tagged, fixed-width wire
//! representation of a columnar analytical database (and back), and appends
//! batched tables to plain or partitioned targets over a pool of long-lived
//! connections.
//!
//! ```text
//! HostValue ──► ValueEncoder / ArrayVectorCodec ──► TableBatcher
//!                        (TypeRegistry)                  │
//!                                                        ▼
//!                              PartitionRouter ──► ConnectionPool ──► server
//! server bytes ──► ValueDecoder ──► Value / Table ──► HostValue
//! ```

pub mod types;
pub mod data;
pub mod codec;
pub mod batch;
pub mod scaling;
pub mod config;

use std::time::Duration;

// Re-export main types
pub use types::{DataType, Decimal, NullSentinel, TypeDescriptor, TypeRegistry, Width};
pub use data::{Column, HostRow, HostValue, Table, Temporal, TemporalKind, TimeUnit, Value};
pub use codec::{ArrayVectorCodec, ValueDecoder, ValueEncoder};
pub use batch::TableBatcher;
pub use scaling::{
    Connection, ConnectionPool, PartitionKey, PartitionRouter, PartitionScheme, PartitionSpec,
    PartitionedTableAppender, PooledConnection, Response, TableAppender, TableTarget,
};
pub use config::{AppenderConfig, PoolConfig, SessionOptions};

/// Codec and appender error type
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("Type mismatch{}: {message}", describe_position(.column, .row))]
    TypeMismatch {
        column: Option<String>,
        row: Option<usize>,
        message: String,
    },

    #[error("Length exceeded{}: {len} bytes, limit is {limit}", describe_position(.column, .row))]
    LengthExceeded {
        column: Option<String>,
        row: Option<usize>,
        len: usize,
        limit: usize,
    },

    #[error("Partition not found{}: no partition holds {value}", describe_position(.column, .row))]
    PartitionNotFound {
        column: Option<String>,
        row: Option<usize>,
        value: String,
    },

    #[error("Connection pool has been shut down")]
    PoolShutDown,

    #[error("Timed out after {0:?} waiting for a pooled connection")]
    AcquireTimeout(Duration),

    #[error("Overflow{}: {message}", describe_position(.column, .row))]
    Overflow {
        column: Option<String>,
        row: Option<usize>,
        message: String,
    },

    #[error("Row count mismatch in column '{column}': expected {expected}, got {actual}")]
    RowCountMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown wire type tag: {0}")]
    UnknownType(u8),

    #[error("Truncated input: {0}")]
    Truncated(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    pub(crate) fn type_mismatch(message: impl Into<String>) -> Self {
        WireError::TypeMismatch {
            column: None,
            row: None,
            message: message.into(),
        }
    }

    pub(crate) fn overflow(message: impl Into<String>) -> Self {
        WireError::Overflow {
            column: None,
            row: None,
            message: message.into(),
        }
    }

    pub(crate) fn length_exceeded(len: usize, limit: usize) -> Self {
        WireError::LengthExceeded {
            column: None,
            row: None,
            len,
            limit,
        }
    }

    /// Attach a column name and row index to a positional error.
    ///
    /// Errors that already carry a position, and variants without one, are
    /// returned unchanged.
    pub fn at(self, column_name: &str, row_index: usize) -> Self {
        match self {
            WireError::TypeMismatch { column: None, row: None, message } => WireError::TypeMismatch {
                column: Some(column_name.to_string()),
                row: Some(row_index),
                message,
            },
            WireError::Overflow { column: None, row: None, message } => WireError::Overflow {
                column: Some(column_name.to_string()),
                row: Some(row_index),
                message,
            },
            WireError::LengthExceeded { column: None, row: None, len, limit } => {
                WireError::LengthExceeded {
                    column: Some(column_name.to_string()),
                    row: Some(row_index),
                    len,
                    limit,
                }
            }
            WireError::PartitionNotFound { column: None, row: None, value } => {
                WireError::PartitionNotFound {
                    column: Some(column_name.to_string()),
                    row: Some(row_index),
                    value,
                }
            }
            other => other,
        }
    }

    /// Whether the error came from the transport rather than from the data
    pub fn is_transport(&self) -> bool {
        matches!(self, WireError::Io(_))
    }
}

fn describe_position(column: &Option<String>, row: &Option<usize>) -> String {
    match (column, row) {
        (Some(c), Some(r)) => format!(" in column '{}' at row {}", c, r),
        (Some(c), None) => format!(" in column '{}'", c),
        (None, Some(r)) => format!(" at row {}", r),
        (None, None) => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_position_attached_once() {
        let err = WireError::type_mismatch("BOOL vector for IPADDR column").at("ip", 3);
        assert_eq!(
            err.to_string(),
            "Type mismatch in column 'ip' at row 3: BOOL vector for IPADDR column"
        );

        // A second call keeps the original position
        let err = err.at("other", 9);
        assert!(matches!(err, WireError::TypeMismatch { row: Some(3), .. }));
    }

    #[test]
    fn test_length_exceeded_message() {
        let err = WireError::length_exceeded(300_000, 262_144);
        assert_eq!(err.to_string(), "Length exceeded: 300000 bytes, limit is 262144");
    }
}
