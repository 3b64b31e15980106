//! Appender tests against an in-process mock server

use std::sync::Arc;

use ahash::AHashMap;
use bytes::Bytes;
use parking_lot::Mutex;

use super::*;
use crate::batch::TableBatcher;
use crate::codec::{ValueDecoder, MAX_VALUE_BYTES, STRING_COLUMN_MAX_BYTES};
use crate::config::{AppenderConfig, PoolConfig};
use crate::data::{Column, HostValue, Table, Value};
use crate::types::{DataType, Decimal, TypeDescriptor};
use crate::WireError;

// ============================================================================
// Mock server
// ============================================================================

type FailRule = Box<dyn Fn(&Table) -> bool + Send>;

#[derive(Default)]
struct MockServer {
    col_defs: Option<Table>,
    partition: Option<(Response, Response, Response)>,
    scripts: Vec<String>,
    uploads: usize,
    inserted: Vec<Table>,
    fail_insert: Option<FailRule>,
}

type Shared = Arc<Mutex<MockServer>>;

/// One session; uploaded variables live here
struct MockConnection {
    server: Shared,
    variables: AHashMap<String, Table>,
}

impl Connection for MockConnection {
    fn execute(&mut self, script: &str) -> crate::Result<Response> {
        let mut server = self.server.lock();
        server.scripts.push(script.to_string());
        if script.ends_with(".colDefs") {
            return server
                .col_defs
                .clone()
                .map(Response::Table)
                .ok_or_else(|| WireError::Server("no such table".into()));
        }
        if let Some((names, types, schema)) = &server.partition {
            if script.ends_with(".partitionColumnName") {
                return Ok(names.clone());
            }
            if script.ends_with(".partitionType") {
                return Ok(types.clone());
            }
            if script.ends_with(".partitionSchema") {
                return Ok(schema.clone());
            }
        }
        if script.starts_with("tableInsert(") {
            let var = script
                .rsplit(", ")
                .next()
                .map(|s| s.trim_end_matches(')'))
                .unwrap_or_default();
            let table = self
                .variables
                .get(var)
                .cloned()
                .ok_or_else(|| WireError::Server(format!("undefined variable {}", var)))?;
            if server.fail_insert.as_ref().map_or(false, |rule| rule(&table)) {
                return Err(WireError::Server("insert rejected".into()));
            }
            let rows = table.row_count() as i32;
            server.inserted.push(table);
            return Ok(Response::Scalar(Value::Int(rows)));
        }
        Err(WireError::Server(format!("unexpected script: {}", script)))
    }

    fn upload(&mut self, name: &str, frame: Bytes) -> crate::Result<()> {
        let table = ValueDecoder::decode_table(&frame)?;
        self.server.lock().uploads += 1;
        self.variables.insert(name.to_string(), table);
        Ok(())
    }
}

fn col_defs(defs: &[(&str, DataType, i32)]) -> Table {
    let names = Column::from_values(
        "name",
        TypeDescriptor::scalar(DataType::String),
        defs.iter().map(|(n, _, _)| Value::String(n.to_string())).collect(),
    );
    let types = Column::from_values(
        "typeInt",
        TypeDescriptor::scalar(DataType::Int),
        defs.iter().map(|(_, t, _)| Value::Int(t.code() as i32)).collect(),
    );
    let extra = Column::from_values(
        "extra",
        TypeDescriptor::scalar(DataType::Int),
        defs.iter().map(|(_, _, e)| Value::Int(*e)).collect(),
    );
    Table::from_columns("colDefs", vec![names, types, extra]).unwrap()
}

fn server() -> Shared {
    Arc::new(Mutex::new(MockServer {
        col_defs: Some(col_defs(&[
            ("id", DataType::Long, 0),
            ("sym", DataType::Symbol, 0),
            ("qty", DataType::Int, 0),
            ("price", DataType::Decimal64, 2),
        ])),
        ..Default::default()
    }))
}

fn pool(server: &Shared, size: usize) -> Arc<ConnectionPool<MockConnection>> {
    let server = Arc::clone(server);
    Arc::new(
        ConnectionPool::new(PoolConfig::new().with_size(size), move |_| {
            Ok(MockConnection {
                server: Arc::clone(&server),
                variables: AHashMap::new(),
            })
        })
        .unwrap(),
    )
}

fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().map(|v| Value::Int(*v)).collect()
}

fn range_partition(server: &Shared) {
    server.lock().partition = Some((
        Response::Scalar(Value::String("qty".into())),
        Response::Scalar(Value::Int(2)),
        Response::Vector(ints(&[100, 200, 300, 400, 601])),
    ));
}

fn batch(rows: &[(i64, &str, i64)]) -> Table {
    let price: Decimal = "1.5".parse().unwrap();
    TableBatcher::new()
        .with_name("trades")
        .from_columns(vec![
            ("id".into(), rows.iter().map(|r| HostValue::Int(r.0)).collect()),
            ("sym".into(), rows.iter().map(|r| HostValue::Str(r.1.into())).collect()),
            ("qty".into(), rows.iter().map(|r| HostValue::Int(r.2)).collect()),
            ("price".into(), rows.iter().map(|_| HostValue::Decimal(Some(price))).collect()),
        ])
        .unwrap()
}

fn sample() -> Table {
    batch(&[(1, "A", 150), (2, "B", 350), (3, "A", 120), (4, "C", 600)])
}

fn target() -> TableTarget {
    TableTarget::new("dfs://trades", "pt")
}

// ============================================================================
// Plain appends
// ============================================================================

#[test]
fn test_target_handle() {
    assert_eq!(target().handle(), r#"loadTable("dfs://trades","pt")"#);
    assert_eq!(TableTarget::in_memory("t1").handle(), "t1");
}

#[test]
fn test_schema_loaded_with_decimal_scale() {
    let server = server();
    let appender = TableAppender::new(pool(&server, 1), target(), AppenderConfig::default()).unwrap();
    let schema = appender.schema();
    assert_eq!(schema.len(), 4);
    assert_eq!(schema[3].descriptor, TypeDescriptor::decimal(DataType::Decimal64, 2).unwrap());
    assert_eq!(schema[2].ordinal_position, 2);
    assert_eq!(
        server.lock().scripts[0],
        r#"schema(loadTable("dfs://trades","pt")).colDefs"#
    );
}

#[test]
fn test_append_casts_to_schema() {
    let server = server();
    let mut appender = TableAppender::new(pool(&server, 2), target(), AppenderConfig::default()).unwrap();
    assert_eq!(appender.append(&sample()).unwrap(), 4);

    let server = server.lock();
    assert_eq!(server.uploads, 1);
    assert_eq!(server.inserted.len(), 1);
    let inserted = &server.inserted[0];
    assert_eq!(inserted.column("qty").unwrap().data_type(), DataType::Int);
    assert_eq!(inserted.column("qty").unwrap().get(1), Some(&Value::Int(350)));
    assert_eq!(inserted.column("sym").unwrap().get(0), Some(&Value::Symbol("A".into())));
    assert_eq!(inserted.column("price").unwrap().get(0).unwrap().to_string(), "1.50");
    assert!(server.scripts.last().unwrap().starts_with(r#"tableInsert(loadTable("dfs://trades","pt"), "#));
}

#[test]
fn test_empty_append_sends_nothing() {
    let server = server();
    let mut appender = TableAppender::new(pool(&server, 1), target(), AppenderConfig::default()).unwrap();
    let before = server.lock().scripts.len();
    assert_eq!(appender.append(&batch(&[])).unwrap(), 0);
    assert_eq!(server.lock().scripts.len(), before);
    assert_eq!(server.lock().uploads, 0);
    assert_eq!(appender.stats().calls, 0);
}

#[test]
fn test_column_count_mismatch() {
    let server = server();
    let mut appender = TableAppender::new(pool(&server, 1), target(), AppenderConfig::default()).unwrap();
    let narrow = TableBatcher::new()
        .from_columns(vec![("id".into(), vec![HostValue::Int(1)])])
        .unwrap();
    assert!(matches!(appender.append(&narrow), Err(WireError::SchemaMismatch(_))));
    assert_eq!(server.lock().uploads, 0);
}

#[test]
fn test_uncastable_value_names_column_and_row() {
    let server = server();
    let mut appender = TableAppender::new(pool(&server, 1), target(), AppenderConfig::default()).unwrap();
    let mut columns = sample().into_columns();
    columns[2] = Column::from_values(
        "qty",
        TypeDescriptor::scalar(DataType::IpAddr),
        vec![Value::IpAddr([1; 16]); 4],
    );
    let bad = Table::from_columns("trades", columns).unwrap();
    let err = appender.append(&bad).unwrap_err();
    assert!(matches!(
        err,
        WireError::TypeMismatch { column: Some(ref c), row: Some(0), .. } if c == "qty"
    ));
}

#[test]
fn test_oversize_values_fail_before_upload() {
    let server = server();
    server.lock().col_defs = Some(col_defs(&[
        ("note", DataType::String, 0),
        ("tag", DataType::Symbol, 0),
        ("payload", DataType::Blob, 0),
    ]));
    let mut appender = TableAppender::new(pool(&server, 1), target(), AppenderConfig::default()).unwrap();
    let docs = |note: String, tag: String, payload: Vec<u8>| {
        Table::from_columns(
            "docs",
            vec![
                Column::from_values(
                    "note",
                    TypeDescriptor::scalar(DataType::String),
                    vec![Value::String("ok".into()), Value::String(note)],
                ),
                Column::from_values(
                    "tag",
                    TypeDescriptor::scalar(DataType::String),
                    vec![Value::String("a".into()), Value::String(tag)],
                ),
                Column::from_values(
                    "payload",
                    TypeDescriptor::scalar(DataType::Blob),
                    vec![Value::Blob(vec![1]), Value::Blob(payload)],
                ),
            ],
        )
        .unwrap()
    };

    let err = appender
        .append(&docs("n".into(), "t".repeat(300_000), vec![2]))
        .unwrap_err();
    assert!(matches!(
        err,
        WireError::LengthExceeded { column: Some(ref c), row: Some(1), limit: MAX_VALUE_BYTES, .. } if c == "tag"
    ));

    let err = appender
        .append(&docs("n".into(), "t".into(), vec![0; MAX_VALUE_BYTES + 1]))
        .unwrap_err();
    assert!(matches!(
        err,
        WireError::LengthExceeded { column: Some(ref c), row: Some(1), .. } if c == "payload"
    ));
    assert_eq!(server.lock().uploads, 0);
    assert!(server.lock().inserted.is_empty());

    // long STRING cells are cut in the frame; a BLOB at the limit goes whole
    let rows = appender
        .append(&docs("z".repeat(70_000), "t".into(), vec![3; MAX_VALUE_BYTES]))
        .unwrap();
    assert_eq!(rows, 2);
    let server = server.lock();
    assert_eq!(server.uploads, 1);
    let inserted = &server.inserted[0];
    assert_eq!(
        inserted.column("note").unwrap().get(1),
        Some(&Value::String("z".repeat(STRING_COLUMN_MAX_BYTES)))
    );
    assert_eq!(inserted.column("tag").unwrap().get(1), Some(&Value::Symbol("t".into())));
    assert_eq!(
        inserted.column("payload").unwrap().get(1),
        Some(&Value::Blob(vec![3; MAX_VALUE_BYTES]))
    );
}

#[test]
fn test_shut_down_pool_fails_fast() {
    let server = server();
    let pool = pool(&server, 1);
    let mut appender = TableAppender::new(Arc::clone(&pool), target(), AppenderConfig::default()).unwrap();
    pool.shutdown();
    assert!(matches!(appender.append(&sample()), Err(WireError::PoolShutDown)));
    assert!(matches!(
        TableAppender::new(pool, target(), AppenderConfig::default()),
        Err(WireError::PoolShutDown)
    ));
}

// ============================================================================
// Partitioned appends
// ============================================================================

#[test]
fn test_range_partitioned_append() {
    let server = server();
    range_partition(&server);
    let mut appender =
        PartitionedTableAppender::new(pool(&server, 3), target(), "QTY", AppenderConfig::default()).unwrap();
    assert_eq!(appender.partition_spec().scheme.name(), "range");

    let input = sample();
    assert_eq!(appender.append(&input).unwrap(), input.row_count());

    let server = server.lock();
    assert_eq!(server.inserted.len(), 3);
    let total: usize = server.inserted.iter().map(Table::row_count).sum();
    assert_eq!(total, input.row_count());

    // qty=150 lands with every other row of [100, 200)
    let low = server
        .inserted
        .iter()
        .find(|t| t.column("qty").unwrap().values().contains(&Value::Int(150)))
        .unwrap();
    assert_eq!(low.column("qty").unwrap().values(), ints(&[150, 120]).as_slice());
    assert_eq!(
        low.column("id").unwrap().values(),
        &[Value::Long(1), Value::Long(3)]
    );
}

#[test]
fn test_sequential_dispatch_matches_parallel() {
    let server = server();
    range_partition(&server);
    let mut appender = PartitionedTableAppender::new(
        pool(&server, 1),
        target(),
        "qty",
        AppenderConfig::new().sequential(),
    )
    .unwrap();
    assert_eq!(appender.append(&sample()).unwrap(), 4);
    assert_eq!(server.lock().inserted.len(), 3);
    let stats = appender.stats();
    assert_eq!((stats.calls, stats.requests, stats.rows, stats.failures), (1, 3, 4, 0));
}

#[test]
fn test_partial_failure_is_not_rolled_back() {
    let server = server();
    range_partition(&server);
    server.lock().fail_insert = Some(Box::new(|t: &Table| {
        t.column("qty").unwrap().values().contains(&Value::Int(350))
    }));
    let mut appender =
        PartitionedTableAppender::new(pool(&server, 2), target(), "qty", AppenderConfig::default()).unwrap();

    let err = appender.append(&sample()).unwrap_err();
    assert!(matches!(err, WireError::Server(_)));
    assert_eq!(server.lock().inserted.len(), 2);
    assert_eq!(appender.stats().failures, 1);
}

#[test]
fn test_value_partition_not_found() {
    let server = server();
    server.lock().partition = Some((
        Response::Scalar(Value::String("sym".into())),
        Response::Scalar(Value::Int(1)),
        Response::Vector(vec![Value::Symbol("A".into()), Value::Symbol("B".into())]),
    ));
    let mut appender =
        PartitionedTableAppender::new(pool(&server, 2), target(), "sym", AppenderConfig::default()).unwrap();

    let err = appender.append(&sample()).unwrap_err();
    assert!(matches!(
        err,
        WireError::PartitionNotFound { column: Some(ref c), row: Some(3), .. } if c == "sym"
    ));
    assert_eq!(server.lock().uploads, 0);
}

#[test]
fn test_hash_partitioning_is_deterministic() {
    let server = server();
    server.lock().partition = Some((
        Response::Scalar(Value::String("id".into())),
        Response::Scalar(Value::Int(5)),
        Response::Scalar(Value::Int(3)),
    ));
    let mut appender =
        PartitionedTableAppender::new(pool(&server, 2), target(), "id", AppenderConfig::default()).unwrap();
    let rows: Vec<(i64, &str, i64)> = (0..30).map(|i| (i, "A", 100 + i)).collect();
    let input = batch(&rows);

    let mut groupings = Vec::new();
    for _ in 0..2 {
        server.lock().inserted.clear();
        appender.append(&input).unwrap();
        let mut ids: Vec<Vec<Value>> = server
            .lock()
            .inserted
            .iter()
            .map(|t| t.column("id").unwrap().values().to_vec())
            .collect();
        ids.sort_by_key(|group| group[0].as_i64());
        groupings.push(ids);
    }
    assert_eq!(groupings[0], groupings[1]);
    assert!(groupings[0].len() <= 3);
}

#[test]
fn test_list_partitioning_from_tuple() {
    let server = server();
    server.lock().partition = Some((
        Response::Scalar(Value::String("sym".into())),
        Response::Scalar(Value::Int(3)),
        Response::Tuple(vec![
            Response::Vector(vec![Value::Symbol("A".into()), Value::Symbol("B".into())]),
            Response::Vector(vec![Value::Symbol("C".into())]),
        ]),
    ));
    let mut appender =
        PartitionedTableAppender::new(pool(&server, 2), target(), "sym", AppenderConfig::default()).unwrap();
    appender.append(&sample()).unwrap();
    let mut sizes: Vec<usize> = server.lock().inserted.iter().map(Table::row_count).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 3]);
}

#[test]
fn test_composite_partitioning() {
    let server = server();
    server.lock().partition = Some((
        Response::Vector(vec![Value::String("qty".into()), Value::String("sym".into())]),
        Response::Vector(ints(&[2, 1])),
        Response::Tuple(vec![
            Response::Vector(ints(&[0, 300, 1000])),
            Response::Vector(vec![
                Value::Symbol("A".into()),
                Value::Symbol("B".into()),
                Value::Symbol("C".into()),
            ]),
        ]),
    ));
    let mut appender =
        PartitionedTableAppender::new(pool(&server, 2), target(), "sym", AppenderConfig::default()).unwrap();
    assert_eq!(appender.partition_spec().columns, vec!["qty", "sym"]);

    // (150,A) and (120,A) share a partition; (350,B) and (600,C) do not
    appender.append(&sample()).unwrap();
    assert_eq!(server.lock().inserted.len(), 3);
}

#[test]
fn test_partition_column_must_match_server() {
    let server = server();
    range_partition(&server);
    let err = PartitionedTableAppender::new(pool(&server, 1), target(), "price", AppenderConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, WireError::InvalidArgument(_)));
}

#[test]
fn test_reload_rereads_partitioning() {
    let server = server();
    range_partition(&server);
    let mut appender =
        PartitionedTableAppender::new(pool(&server, 1), target(), "qty", AppenderConfig::default()).unwrap();
    server.lock().partition = Some((
        Response::Scalar(Value::String("qty".into())),
        Response::Scalar(Value::Int(5)),
        Response::Scalar(Value::Int(2)),
    ));
    appender.reload().unwrap();
    assert_eq!(appender.partition_spec().scheme, PartitionScheme::Hash { buckets: 2 });
}
