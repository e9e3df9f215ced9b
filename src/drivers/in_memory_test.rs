use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::{Connection, DatabaseDriver};
use crate::types::{RawQueryResult, SqlValue};

/// A recorded statement execution for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Computes a response from the executed SQL and its parameters.
pub type Responder = dyn Fn(&str, &[SqlValue]) -> Result<RawQueryResult> + Send + Sync;

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// An in-memory database driver for testing.
///
/// Connections opened from one driver share its response queue and its
/// record of executed statements. Responses come from the responder when
/// one is set, otherwise from the queue, otherwise the default response.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use sqlbind::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder};
/// use sqlbind::SqlValue;
///
/// let driver = Arc::new(
///     InMemoryTestDriver::new().with_response(
///         InMemoryTestResponseBuilder::new()
///             .columns(&["id", "name"])
///             .row(vec![SqlValue::Int32(1), SqlValue::from("Alice")])
///             .build(),
///     ),
/// );
/// ```
pub struct InMemoryTestDriver {
    responses: Arc<Mutex<VecDeque<RawQueryResult>>>,
    recorded_queries: Arc<Mutex<Vec<RecordedQuery>>>,
    default_response: RawQueryResult,
    responder: Option<Arc<Responder>>,
    counters: Arc<Counters>,
}

impl InMemoryTestDriver {
    /// Create a new in-memory test driver with no pre-configured responses.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            recorded_queries: Arc::new(Mutex::new(Vec::new())),
            default_response: RawQueryResult::empty(),
            responder: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Add a response to be returned by the next statement.
    /// Responses are returned in FIFO order.
    pub fn with_response(self, response: RawQueryResult) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
        self
    }

    /// Add multiple responses to be returned by subsequent statements.
    pub fn with_responses(self, responses: impl IntoIterator<Item = RawQueryResult>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(responses);
        self
    }

    /// Set a default response to use when no queued responses remain.
    pub fn with_default_response(mut self, response: RawQueryResult) -> Self {
        self.default_response = response;
        self
    }

    /// Compute every response from the statement instead of the queue.
    pub fn with_responder(
        mut self,
        responder: impl Fn(&str, &[SqlValue]) -> Result<RawQueryResult> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Get all recorded statements that have been executed.
    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        self.recorded_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the last recorded statement, if any.
    pub fn last_query(&self) -> Option<RecordedQuery> {
        self.recorded_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Clear all recorded statements.
    pub fn clear_recorded_queries(&self) {
        self.recorded_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Connections opened and not yet closed.
    pub fn open_count(&self) -> usize {
        self.opened_count() - self.closed_count()
    }

    pub fn opened_count(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Assert that the last statement matches the expected SQL and parameters.
    pub fn assert_last_query(&self, expected_sql: &str, expected_params: &[SqlValue]) {
        let last = self.last_query().expect("No queries were recorded");
        assert_eq!(
            last.sql, expected_sql,
            "SQL mismatch.\nExpected: {}\nActual: {}",
            expected_sql, last.sql
        );
        assert_eq!(
            last.params, expected_params,
            "Parameters mismatch.\nExpected: {:?}\nActual: {:?}",
            expected_params, last.params
        );
    }

    /// Assert that exactly n statements were executed.
    pub fn assert_query_count(&self, expected: usize) {
        let actual = self.recorded_queries().len();
        assert_eq!(
            actual, expected,
            "Query count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }
}

impl Default for InMemoryTestDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for InMemoryTestDriver {
    async fn open(&self) -> Result<Box<dyn Connection>> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryTestConnection {
            responses: Arc::clone(&self.responses),
            recorded_queries: Arc::clone(&self.recorded_queries),
            default_response: self.default_response.clone(),
            responder: self.responder.clone(),
        }))
    }

    fn close(&self, connection: Box<dyn Connection>) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        drop(connection);
    }
}

struct InMemoryTestConnection {
    responses: Arc<Mutex<VecDeque<RawQueryResult>>>,
    recorded_queries: Arc<Mutex<Vec<RecordedQuery>>>,
    default_response: RawQueryResult,
    responder: Option<Arc<Responder>>,
}

impl InMemoryTestConnection {
    fn respond(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        // Record the statement
        self.recorded_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedQuery {
                sql: sql.to_string(),
                params: params.to_vec(),
            });

        if let Some(responder) = &self.responder {
            return responder(sql, params);
        }

        // Return next queued response or default
        let queued = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        Ok(queued.unwrap_or_else(|| self.default_response.clone()))
    }
}

#[async_trait]
impl Connection for InMemoryTestConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        self.respond(sql, params)
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.respond(sql, params).map(|r| r.rows_affected)
    }
}

/// Builder for creating test responses easily.
pub struct InMemoryTestResponseBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    rows_affected: u64,
}

impl InMemoryTestResponseBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: 0,
        }
    }

    /// Set the column labels for the response.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a row of values in column order.
    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn rows_affected(mut self, count: u64) -> Self {
        self.rows_affected = count;
        self
    }

    /// Build the RawQueryResult.
    pub fn build(self) -> RawQueryResult {
        let mut result = RawQueryResult::new(self.columns, self.rows);
        result.rows_affected = self.rows_affected;
        result
    }
}

impl Default for InMemoryTestResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlBindError;

    #[tokio::test]
    async fn test_connections_share_queue_and_record() {
        let driver = InMemoryTestDriver::new()
            .with_response(RawQueryResult::affected(1))
            .with_response(
                InMemoryTestResponseBuilder::new()
                    .columns(&["id"])
                    .row(vec![SqlValue::Int32(7)])
                    .build(),
            );

        let mut first = driver.open().await.unwrap();
        assert_eq!(first.execute("INSERT", &[]).await.unwrap(), 1);
        driver.close(first);

        let mut second = driver.open().await.unwrap();
        let rows = second.query("SELECT", &[]).await.unwrap();
        assert_eq!(rows.rows, vec![vec![SqlValue::Int32(7)]]);

        driver.assert_query_count(2);
        driver.assert_last_query("SELECT", &[]);
        assert_eq!(driver.opened_count(), 2);
        assert_eq!(driver.open_count(), 1);
    }

    #[tokio::test]
    async fn test_responder_takes_precedence() {
        let driver = InMemoryTestDriver::new()
            .with_response(RawQueryResult::affected(5))
            .with_responder(|sql, _| {
                if sql.starts_with("FAIL") {
                    Err(SqlBindError::QueryFailed("boom".to_string()))
                } else {
                    Ok(RawQueryResult::affected(2))
                }
            });

        let mut connection = driver.open().await.unwrap();
        assert_eq!(connection.execute("UPDATE", &[]).await.unwrap(), 2);
        assert!(connection.query("FAIL", &[]).await.is_err());
    }
}
