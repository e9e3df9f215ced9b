use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlbind::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder};
use sqlbind::mapper::ColumnMappers;
use sqlbind::types::{RawQueryResult, SqlType, SqlValue};
use sqlbind::{
    args, Connection, ConnectionResult, DatabaseDriver, ErrorKind, Handle, Plugin, Qualifier,
    QualifierSet, SqlBind, SqlBindError, SqlStatement,
};

fn client(driver: &Arc<InMemoryTestDriver>) -> SqlBind {
    SqlBind::with_driver(Arc::clone(driver) as Arc<dyn DatabaseDriver>)
}

fn null_foo() -> RawQueryResult {
    InMemoryTestResponseBuilder::new()
        .columns(&["foo"])
        .row(vec![SqlValue::Null])
        .build()
}

#[tokio::test]
async fn test_null_primitive_coalesces_by_default() {
    let driver = Arc::new(InMemoryTestDriver::new().with_response(null_foo()));
    let db = client(&driver);
    let mut handle = db.open().await.unwrap();

    let value = handle
        .create_query("SELECT foo FROM something")
        .map_to::<i32>()
        .one()
        .await
        .unwrap();
    assert_eq!(value, 0);
}

#[tokio::test]
async fn test_null_primitive_fails_when_coalescing_disabled() {
    let driver = Arc::new(
        InMemoryTestDriver::new().with_responses([null_foo(), null_foo(), null_foo()]),
    );
    let db = client(&driver);
    let mut handle = db.open().await.unwrap();

    let err = handle
        .create_query("SELECT foo FROM something")
        .configure::<ColumnMappers>(|m| {
            m.set_coalesce_null_primitives(false);
        })
        .map_to::<i32>()
        .one()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResultProduction);
    assert!(err
        .to_string()
        .contains("Database null values are not allowed for primitives"));
    assert!(err.to_string().contains("column 1 (foo)"));

    // Nullable targets are absent whatever the policy
    let boxed = handle
        .create_query("SELECT foo FROM something")
        .configure::<ColumnMappers>(|m| {
            m.set_coalesce_null_primitives(false);
        })
        .map_to::<Option<i32>>()
        .one()
        .await
        .unwrap();
    assert_eq!(boxed, None);

    // The override was scoped to the statement
    let value = handle
        .create_query("SELECT foo FROM something")
        .map_to::<i32>()
        .one()
        .await
        .unwrap();
    assert_eq!(value, 0);
}

#[tokio::test]
async fn test_container_without_element_type() {
    let driver = Arc::new(InMemoryTestDriver::new());
    let db = client(&driver);
    let mut handle = db.open().await.unwrap();

    let err = handle
        .create_update("INSERT INTO something (ids) VALUES (?)")
        .bind(1usize, HashSet::from([1i32, 2]))
        .execute()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StatementConstruction);
    assert!(err.to_string().contains("No type parameters found"));
    driver.assert_query_count(0);
}

#[tokio::test]
async fn test_container_with_element_type_binds_array() {
    let driver = Arc::new(InMemoryTestDriver::new());
    let db = client(&driver);
    let mut handle = db.open().await.unwrap();

    handle
        .create_update("INSERT INTO something (ids) VALUES (?)")
        .bind_qualified(
            1usize,
            vec![1i32, 2],
            QualifierSet::new().with(Qualifier::ElementType(SqlType::Int4)),
        )
        .execute()
        .await
        .unwrap();

    driver.assert_last_query(
        "INSERT INTO something (ids) VALUES ($1)",
        &[SqlValue::Array {
            element_type: SqlType::Int4,
            values: vec![SqlValue::Int32(1), SqlValue::Int32(2)],
        }],
    );
}

#[tokio::test]
async fn test_unresolvable_argument_names_parameter() {
    #[derive(Debug)]
    struct Opaque;
    sqlbind::impl_bindable!(Opaque);

    let driver = Arc::new(InMemoryTestDriver::new());
    let db = client(&driver);
    let mut handle = db.open().await.unwrap();

    let err = handle
        .create_update("UPDATE something SET blob = :blob")
        .bind("blob", Opaque)
        .execute()
        .await
        .unwrap_err();

    match err {
        SqlBindError::StatementConstruction {
            template,
            parameter,
            ..
        } => {
            assert_eq!(parameter, ":blob");
            assert_eq!(template, "UPDATE something SET blob = :blob");
        }
        other => panic!("unexpected error: {}", other),
    }
}

fn degrees_driver() -> Arc<InMemoryTestDriver> {
    Arc::new(InMemoryTestDriver::new().with_responder(|_, params| {
        let radians = match params.get(1) {
            Some(SqlValue::Float64(v)) => *v,
            _ => return Err(SqlBindError::QueryFailed("expected a double".to_string())),
        };
        Ok(RawQueryResult::new(
            vec!["x".to_string()],
            vec![vec![SqlValue::Float64(radians.to_degrees())]],
        ))
    }))
}

#[tokio::test]
async fn test_callable_out_parameter_reads() {
    let driver = degrees_driver();
    let db = client(&driver);
    let mut handle = db.open().await.unwrap();

    let out = handle
        .create_call(":x = CALL TO_DEGREES(:y)")
        .register_out_parameter("x", SqlType::Float8)
        .bind("y", 100.0f64)
        .invoke()
        .await
        .unwrap();

    driver.assert_last_query(
        "$1 = CALL TO_DEGREES($2)",
        &[SqlValue::Null, SqlValue::Float64(100.0)],
    );

    let expected = 100f64.to_degrees();
    assert_eq!(out.get_i32("x").unwrap(), expected as i32);
    assert_eq!(out.get_i64(1usize).unwrap(), expected as i64);
    assert!((out.get_f64("x").unwrap() - expected).abs() < 0.001);
    assert!((out.get_f32("x").unwrap() - expected as f32).abs() < 0.001);
    assert_eq!(out.get_string("x").unwrap(), expected.to_string());

    let err = out.get_timestamp("x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[tokio::test]
async fn test_first_and_find_one() {
    let rows = InMemoryTestResponseBuilder::new()
        .columns(&["name"])
        .row(vec![SqlValue::from("a")])
        .row(vec![SqlValue::from("b")])
        .build();
    let driver = Arc::new(
        InMemoryTestDriver::new().with_responses([rows.clone(), rows.clone(), rows]),
    );
    let db = client(&driver);
    let mut handle = db.open().await.unwrap();

    let first = handle
        .create_query("SELECT name FROM something")
        .map_to::<String>()
        .first()
        .await
        .unwrap();
    assert_eq!(first.as_deref(), Some("a"));

    let err = handle
        .create_query("SELECT name FROM something")
        .map_to::<String>()
        .find_one()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SqlBindError::UnexpectedRowCount {
            expected: 1,
            actual: 2
        }
    ));

    let names: Vec<String> = handle
        .create_query("SELECT name FROM something")
        .map_to::<String>()
        .list()
        .await
        .unwrap();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test]
async fn test_execute_returns_update_count() {
    let driver = Arc::new(InMemoryTestDriver::new().with_response(RawQueryResult::affected(3)));
    let db = client(&driver);
    let mut handle = db.open().await.unwrap();

    let count = handle
        .execute("DELETE FROM something WHERE id > ?", args![10i64])
        .await
        .unwrap();

    assert_eq!(count, 3);
    driver.assert_last_query("DELETE FROM something WHERE id > $1", &[SqlValue::Int64(10)]);
}

struct CountingConnection {
    inner: Box<dyn Connection>,
    statements: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for CountingConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> sqlbind::Result<RawQueryResult> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> sqlbind::Result<u64> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(sql, params).await
    }
}

struct CountingPlugin {
    statements: Arc<AtomicUsize>,
}

impl Plugin for CountingPlugin {
    fn customize_connection(&self, connection: Box<dyn Connection>) -> ConnectionResult {
        Ok(Box::new(CountingConnection {
            inner: connection,
            statements: Arc::clone(&self.statements),
        }))
    }
}

struct StrictNulls;

impl Plugin for StrictNulls {
    fn customize_handle(&self, mut handle: Handle) -> sqlbind::Result<Handle> {
        handle.configure::<ColumnMappers>(|m| {
            m.set_coalesce_null_primitives(false);
        });
        Ok(handle)
    }
}

#[tokio::test]
async fn test_plugins_customize_every_new_handle() {
    let driver = Arc::new(InMemoryTestDriver::new().with_responses([null_foo(), null_foo()]));
    let statements = Arc::new(AtomicUsize::new(0));

    let mut db = client(&driver);
    db.install_plugin(CountingPlugin {
        statements: Arc::clone(&statements),
    })
    .unwrap()
    .install_plugin(StrictNulls)
    .unwrap();

    for _ in 0..2 {
        let mut handle = db.open().await.unwrap();
        let err = handle
            .create_query("SELECT foo FROM something")
            .map_to::<i32>()
            .one()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResultProduction);
    }

    assert_eq!(statements.load(Ordering::SeqCst), 2);
    assert_eq!(driver.opened_count(), 2);
    assert_eq!(driver.open_count(), 0);
    // the root configuration is untouched
    assert!(db.config().get::<ColumnMappers>().coalesce_null_primitives());
}

struct RejectConnections;

impl Plugin for RejectConnections {
    fn customize_connection(&self, connection: Box<dyn Connection>) -> ConnectionResult {
        Err((connection, SqlBindError::ConnectionFailed("rejected".to_string())))
    }
}

#[tokio::test]
async fn test_rejected_connection_is_closed() {
    let driver = Arc::new(InMemoryTestDriver::new());
    let statements = Arc::new(AtomicUsize::new(0));

    let mut db = client(&driver);
    db.install_plugin(CountingPlugin {
        statements: Arc::clone(&statements),
    })
    .unwrap()
    .install_plugin(RejectConnections)
    .unwrap();

    let err = db.open().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(driver.opened_count(), 1);
    assert_eq!(driver.closed_count(), 1);
    assert_eq!(driver.open_count(), 0);
}
