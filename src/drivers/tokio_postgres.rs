use std::error::Error;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, error};

use crate::error::{Result, SqlBindError};
use crate::traits::{Connection, DatabaseDriver};
use crate::types::{RawQueryResult, SqlType, SqlValue};

/// PostgreSQL driver implementation using tokio-postgres.
///
/// Every [`DatabaseDriver::open`] establishes a new connection.
pub struct PostgresDriver {
    config: Config,
}

impl PostgresDriver {
    /// Parses the connection string without connecting.
    pub fn new(connection_string: &str) -> Result<Self> {
        let config = Config::from_str(connection_string)
            .map_err(|e| SqlBindError::ConnectionFailed(e.to_string()))?;
        Ok(Self { config })
    }

    /// Parses the connection string and checks that a connection can be made.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let driver = Self::new(connection_string)?;
        drop(driver.open().await?);
        Ok(driver)
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    async fn open(&self) -> Result<Box<dyn Connection>> {
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|e| SqlBindError::ConnectionFailed(e.to_string()))?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        debug!("opened PostgreSQL connection");
        Ok(Box::new(PostgresConnection { client }))
    }
}

/// A single tokio-postgres client.
pub struct PostgresConnection {
    client: Client,
}

impl PostgresConnection {
    fn params(params: &[SqlValue]) -> Vec<Box<dyn ToSql + Sync + Send>> {
        params.iter().map(sql_value_to_tosql).collect()
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        let converted_params = Self::params(params);
        let param_refs: Vec<&(dyn ToSql + Sync)> = converted_params
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let statement = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| SqlBindError::QueryFailed(e.to_string()))?;
        let rows = self
            .client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| SqlBindError::QueryFailed(e.to_string()))?;

        // Labels come from the statement so empty results still carry them
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let result_rows = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, col)| row_value(row, i, col.type_()))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RawQueryResult::new(columns, result_rows))
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let converted_params = Self::params(params);
        let param_refs: Vec<&(dyn ToSql + Sync)> = converted_params
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        self.client
            .execute(sql, &param_refs)
            .await
            .map_err(|e| SqlBindError::QueryFailed(e.to_string()))
    }
}

/// A NULL accepted for a parameter of any type.
#[derive(Debug)]
struct Null;

impl ToSql for Null {
    fn to_sql(&self, _: &Type, _: &mut BytesMut) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Convert a SqlValue to a boxed ToSql trait object.
fn sql_value_to_tosql(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null => Box::new(Null),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Int16(i) => Box::new(*i),
        SqlValue::Int32(i) => Box::new(*i),
        SqlValue::Int64(i) => Box::new(*i),
        SqlValue::Float32(f) => Box::new(*f),
        SqlValue::Float64(f) => Box::new(*f),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Timestamp(t) => Box::new(*t),
        SqlValue::Array {
            element_type,
            values,
        } => array_to_tosql(*element_type, values),
    }
}

fn array_to_tosql(element_type: SqlType, values: &[SqlValue]) -> Box<dyn ToSql + Sync + Send> {
    macro_rules! elements {
        ($variant:ident) => {
            Box::new(
                values
                    .iter()
                    .map(|v| match v {
                        SqlValue::$variant(x) => Some(x.clone()),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )
        };
    }

    match element_type {
        SqlType::Bool => elements!(Bool),
        SqlType::Int2 => elements!(Int16),
        SqlType::Int4 => elements!(Int32),
        SqlType::Int8 => elements!(Int64),
        SqlType::Float4 => elements!(Float32),
        SqlType::Float8 => elements!(Float64),
        SqlType::Text => elements!(Text),
        SqlType::Timestamp => elements!(Timestamp),
    }
}

/// Convert a row value at a given index by its column type.
fn row_value(row: &tokio_postgres::Row, index: usize, type_: &Type) -> Result<SqlValue> {
    fn get<'a, T: tokio_postgres::types::FromSql<'a>>(
        row: &'a tokio_postgres::Row,
        index: usize,
    ) -> Result<Option<T>> {
        row.try_get::<_, Option<T>>(index)
            .map_err(|e| SqlBindError::QueryFailed(e.to_string()))
    }

    let value = match *type_ {
        Type::BOOL => get::<bool>(row, index)?.map(SqlValue::Bool),
        Type::INT2 => get::<i16>(row, index)?.map(SqlValue::Int16),
        Type::INT4 => get::<i32>(row, index)?.map(SqlValue::Int32),
        Type::INT8 => get::<i64>(row, index)?.map(SqlValue::Int64),
        Type::FLOAT4 => get::<f32>(row, index)?.map(SqlValue::Float32),
        Type::FLOAT8 => get::<f64>(row, index)?.map(SqlValue::Float64),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, index)?.map(SqlValue::Timestamp),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, index)?
            .map(|t| SqlValue::Timestamp(t.and_utc())),
        _ => get::<String>(row, index)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}
