use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RawQueryResult, SqlValue};

/// Trait for database driver implementations.
/// A driver opens connections; the toolkit never pools or caches them.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Open a new connection.
    async fn open(&self) -> Result<Box<dyn Connection>>;

    /// Release a connection previously returned by [`DatabaseDriver::open`].
    fn close(&self, connection: Box<dyn Connection>) {
        drop(connection);
    }
}

/// An open database connection.
/// Drivers are responsible for:
/// - Converting SqlValue parameters to native types
/// - Executing statements and converting results to RawQueryResult
///
/// Parameters use PostgreSQL-style placeholders ($1, $2, etc.)
#[async_trait]
pub trait Connection: Send {
    /// Execute a statement that produces rows.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult>;

    /// Execute a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Execute a callable statement. OUT slots are bound as NULL; the first
    /// returned row carries the OUT values in registration order.
    async fn call(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        self.query(sql, params).await
    }
}
