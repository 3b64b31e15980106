//! Partition Schemes - Determines which partition a row belongs to
//!
//! Provides the server's partitioning rules:
//! - Range partitioning: half-open intervals between sorted boundaries
//! - Value partitioning: one partition per enumerated value
//! - Hash partitioning: stable hash of the wire payload modulo bucket count
//! - List partitioning: one partition per group of values
//! - Composite partitioning: one level per column, keyed by the tuple of levels

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{literal, ValueEncoder};
use crate::data::{TemporalKind, Value};
use crate::types::TypeDescriptor;
use crate::{Result, WireError};

// ============================================================================
// Partition Scheme
// ============================================================================

/// Partitioning rule of a target table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionScheme {
    /// Sorted boundaries; partition `i` is `[boundaries[i], boundaries[i+1])`
    Range(Vec<Value>),
    /// Enumerated values, one partition each
    Value(Vec<Value>),
    /// Hash buckets
    Hash { buckets: u32 },
    /// Groups of values, one partition per group
    List(Vec<Vec<Value>>),
    /// One sub-scheme per partition column
    Compo(Vec<PartitionScheme>),
}

/// Server partition type codes
pub const PARTITION_SEQ: i32 = 0;
pub const PARTITION_VALUE: i32 = 1;
pub const PARTITION_RANGE: i32 = 2;
pub const PARTITION_LIST: i32 = 3;
pub const PARTITION_COMPO: i32 = 4;
pub const PARTITION_HASH: i32 = 5;

impl PartitionScheme {
    pub fn name(&self) -> &'static str {
        match self {
            PartitionScheme::Range(_) => "range",
            PartitionScheme::Value(_) => "value",
            PartitionScheme::Hash { .. } => "hash",
            PartitionScheme::List(_) => "list",
            PartitionScheme::Compo(_) => "compo",
        }
    }

    /// Number of partition columns the scheme consumes
    pub fn levels(&self) -> usize {
        match self {
            PartitionScheme::Compo(subs) => subs.len(),
            _ => 1,
        }
    }

    /// Build the partitioner for this scheme, validating its shape
    pub fn strategy(&self) -> Result<Box<dyn PartitionStrategy>> {
        Ok(match self {
            PartitionScheme::Range(bounds) => Box::new(RangePartitioner::new(bounds.clone())?),
            PartitionScheme::Value(values) => Box::new(ValuePartitioner::new(values.clone())?),
            PartitionScheme::Hash { buckets } => Box::new(HashPartitioner::new(*buckets)?),
            PartitionScheme::List(groups) => Box::new(ListPartitioner::new(groups.clone())?),
            PartitionScheme::Compo(subs) => Box::new(CompositePartitioner::new(subs)?),
        })
    }
}

/// A scheme bound to its partition column(s)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub columns: Vec<String>,
    pub scheme: PartitionScheme,
}

impl PartitionSpec {
    pub fn new(column: impl Into<String>, scheme: PartitionScheme) -> Self {
        Self {
            columns: vec![column.into()],
            scheme,
        }
    }

    /// Composite spec: one column per sub-scheme
    pub fn composite(columns: Vec<String>, levels: Vec<PartitionScheme>) -> Result<Self> {
        let spec = Self {
            columns,
            scheme: PartitionScheme::Compo(levels),
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns.len() != self.scheme.levels() {
            return Err(WireError::InvalidArgument(format!(
                "{} partitioning needs {} column(s), got {}",
                self.scheme.name(),
                self.scheme.levels(),
                self.columns.len()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Partition Key
// ============================================================================

/// Identifies the partition a row routes to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionKey {
    Range(usize),
    Value(usize),
    Hash(u32),
    List(usize),
    Composite(Vec<PartitionKey>),
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Range(i) => write!(f, "range/{}", i),
            PartitionKey::Value(i) => write!(f, "value/{}", i),
            PartitionKey::Hash(b) => write!(f, "hash/{}", b),
            PartitionKey::List(i) => write!(f, "list/{}", i),
            PartitionKey::Composite(keys) => {
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str("/")?;
                    }
                    write!(f, "{}", key)?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// Partition Strategy Trait
// ============================================================================

/// Trait for partition strategy implementations
pub trait PartitionStrategy: Send + Sync {
    /// Partition holding `value`
    fn route(&self, value: &Value) -> Result<PartitionKey>;

    /// Name of this strategy (for logging)
    fn name(&self) -> &str;

    /// Number of partitions the scheme defines
    fn partition_count(&self) -> usize;

    /// Partition of one row given its partition-column values in order
    fn route_row(&self, values: &[&Value]) -> Result<PartitionKey> {
        match values {
            [value] => self.route(value),
            _ => Err(WireError::InvalidArgument(format!(
                "{} partitioning takes one column, got {}",
                self.name(),
                values.len()
            ))),
        }
    }
}

/// Bring a row value to the scheme's temporal resolution (a TIMESTAMP row
/// against DATE boundaries is compared as a DATE)
fn conform(value: &Value, sample: Option<&Value>) -> Result<Value> {
    match (value, sample) {
        (Value::Temporal(t), Some(Value::Temporal(s))) if t.kind != s.kind => {
            Ok(Value::Temporal(t.convert(s.kind)?))
        }
        _ => Ok(value.clone()),
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    a.compare(b).ok_or_else(|| {
        WireError::type_mismatch(format!(
            "cannot compare {} with partition value {}",
            a.kind_name(),
            b.kind_name()
        ))
    })
}

/// The unmatched value is reported as a script literal, so its type shows
fn not_found(value: &Value) -> WireError {
    let value = match value.data_type() {
        Some(tag) => literal::render(value, &TypeDescriptor::scalar(tag)),
        None => "NULL".to_string(),
    };
    WireError::PartitionNotFound {
        column: None,
        row: None,
        value,
    }
}

// ============================================================================
// Range Partitioner
// ============================================================================

/// Range-based partitioning over sorted boundaries
///
/// N boundaries define N-1 partitions:
/// Partition 0: [boundaries[0], boundaries[1])
/// ...
/// Partition N-2: [boundaries[N-2], boundaries[N-1])
#[derive(Debug, Clone)]
pub struct RangePartitioner {
    boundaries: Vec<Value>,
}

impl RangePartitioner {
    /// Create with explicit boundaries (at least two, strictly increasing)
    pub fn new(boundaries: Vec<Value>) -> Result<Self> {
        if boundaries.len() < 2 {
            return Err(WireError::InvalidArgument(
                "range partitioning needs at least two boundaries".to_string(),
            ));
        }
        for pair in boundaries.windows(2) {
            if compare(&pair[0], &pair[1])? != Ordering::Less {
                return Err(WireError::InvalidArgument(format!(
                    "range boundaries must increase: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(Self { boundaries })
    }

    pub fn boundaries(&self) -> &[Value] {
        &self.boundaries
    }
}

impl PartitionStrategy for RangePartitioner {
    fn route(&self, value: &Value) -> Result<PartitionKey> {
        if value.is_null() {
            return Err(not_found(value));
        }
        let value = conform(value, self.boundaries.first())?;
        // Number of boundaries <= value
        let mut low = 0;
        let mut high = self.boundaries.len();
        while low < high {
            let mid = (low + high) / 2;
            if compare(&self.boundaries[mid], &value)? != Ordering::Greater {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        if low == 0 || low == self.boundaries.len() {
            return Err(not_found(&value));
        }
        Ok(PartitionKey::Range(low - 1))
    }

    fn name(&self) -> &str {
        "range"
    }

    fn partition_count(&self) -> usize {
        self.boundaries.len() - 1
    }
}

// ============================================================================
// Value Partitioner
// ============================================================================

/// One partition per enumerated value; unlisted values are an error
#[derive(Debug, Clone)]
pub struct ValuePartitioner {
    values: Vec<Value>,
    /// Positions into `values`, sorted by value
    sorted: Vec<usize>,
}

impl ValuePartitioner {
    pub fn new(values: Vec<Value>) -> Result<Self> {
        if values.is_empty() {
            return Err(WireError::InvalidArgument(
                "value partitioning needs at least one value".to_string(),
            ));
        }
        let mut sorted: Vec<usize> = (0..values.len()).collect();
        let mut failure = None;
        sorted.sort_by(|&a, &b| {
            values[a].compare(&values[b]).unwrap_or_else(|| {
                failure = Some((a, b));
                Ordering::Equal
            })
        });
        if let Some((a, b)) = failure {
            compare(&values[a], &values[b])?;
        }
        Ok(Self { values, sorted })
    }
}

impl PartitionStrategy for ValuePartitioner {
    fn route(&self, value: &Value) -> Result<PartitionKey> {
        let value = conform(value, self.values.first())?;
        let mut low = 0;
        let mut high = self.sorted.len();
        while low < high {
            let mid = (low + high) / 2;
            match compare(&self.values[self.sorted[mid]], &value)? {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return Ok(PartitionKey::Value(self.sorted[mid])),
            }
        }
        Err(not_found(&value))
    }

    fn name(&self) -> &str {
        "value"
    }

    fn partition_count(&self) -> usize {
        self.values.len()
    }
}

// ============================================================================
// Hash Partitioner
// ============================================================================

/// Hash partitioning over the value's canonical wire payload
///
/// The payload is the scalar encoding of the value under its own type, so the
/// bucket only depends on the logical value. Nulls hash as an empty payload.
#[derive(Debug, Clone)]
pub struct HashPartitioner {
    buckets: u32,
}

impl HashPartitioner {
    pub fn new(buckets: u32) -> Result<Self> {
        if buckets == 0 {
            return Err(WireError::InvalidArgument(
                "hash partitioning needs at least one bucket".to_string(),
            ));
        }
        Ok(Self { buckets })
    }

    /// Canonical bytes hashed for `value`
    pub fn payload(value: &Value) -> Result<Vec<u8>> {
        match value.data_type() {
            Some(tag) if !value.is_null() => {
                let desc = match value {
                    Value::Decimal(d) => TypeDescriptor::decimal(tag, d.scale())?,
                    Value::Array(..) => TypeDescriptor::array_of(tag),
                    _ => TypeDescriptor::scalar(tag),
                };
                ValueEncoder::encode(value, &desc)
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// Stable 64-bit mixer; does not change between runs or platforms
pub fn stable_hash(bytes: &[u8]) -> u64 {
    let mut mixed: u64 = 0x9E37_79B9_7F4A_7C15;
    for b in bytes {
        mixed ^= u64::from(*b);
        mixed = mixed.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        mixed ^= mixed >> 27;
        mixed = mixed.wrapping_mul(0x94D0_49BB_1331_11EB);
        mixed ^= mixed >> 31;
    }
    mixed
}

impl PartitionStrategy for HashPartitioner {
    fn route(&self, value: &Value) -> Result<PartitionKey> {
        let payload = Self::payload(value)?;
        Ok(PartitionKey::Hash((stable_hash(&payload) % self.buckets as u64) as u32))
    }

    fn name(&self) -> &str {
        "hash"
    }

    fn partition_count(&self) -> usize {
        self.buckets as usize
    }
}

// ============================================================================
// List Partitioner
// ============================================================================

/// One partition per group; the first group containing the value wins
#[derive(Debug, Clone)]
pub struct ListPartitioner {
    groups: Vec<Vec<Value>>,
}

impl ListPartitioner {
    pub fn new(groups: Vec<Vec<Value>>) -> Result<Self> {
        if groups.is_empty() {
            return Err(WireError::InvalidArgument(
                "list partitioning needs at least one group".to_string(),
            ));
        }
        Ok(Self { groups })
    }
}

impl PartitionStrategy for ListPartitioner {
    fn route(&self, value: &Value) -> Result<PartitionKey> {
        let sample = self.groups.iter().flatten().next();
        let value = conform(value, sample)?;
        for (i, group) in self.groups.iter().enumerate() {
            for member in group {
                if compare(member, &value)? == Ordering::Equal {
                    return Ok(PartitionKey::List(i));
                }
            }
        }
        Err(not_found(&value))
    }

    fn name(&self) -> &str {
        "list"
    }

    fn partition_count(&self) -> usize {
        self.groups.len()
    }
}

// ============================================================================
// Composite Partitioner
// ============================================================================

/// One level per partition column; the key is the tuple of level keys
pub struct CompositePartitioner {
    levels: Vec<Box<dyn PartitionStrategy>>,
}

impl CompositePartitioner {
    pub fn new(levels: &[PartitionScheme]) -> Result<Self> {
        if levels.is_empty() {
            return Err(WireError::InvalidArgument(
                "composite partitioning needs at least one level".to_string(),
            ));
        }
        let levels = levels
            .iter()
            .map(|scheme| match scheme {
                PartitionScheme::Compo(_) => Err(WireError::InvalidArgument(
                    "composite partitioning cannot nest".to_string(),
                )),
                other => other.strategy(),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { levels })
    }
}

impl PartitionStrategy for CompositePartitioner {
    fn route(&self, value: &Value) -> Result<PartitionKey> {
        self.route_row(&[value])
    }

    fn name(&self) -> &str {
        "compo"
    }

    fn partition_count(&self) -> usize {
        self.levels.iter().map(|l| l.partition_count()).product()
    }

    fn route_row(&self, values: &[&Value]) -> Result<PartitionKey> {
        if values.len() != self.levels.len() {
            return Err(WireError::InvalidArgument(format!(
                "composite partitioning takes {} columns, got {}",
                self.levels.len(),
                values.len()
            )));
        }
        let keys = self
            .levels
            .iter()
            .zip(values)
            .map(|(level, value)| level.route(value))
            .collect::<Result<Vec<_>>>()?;
        Ok(PartitionKey::Composite(keys))
    }
}

// ============================================================================
// Tests
// ============================================================================
