use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, ConfigRegistry};
use crate::error::{Result, SqlBindError};
use crate::statement::{Call, Query, SqlStatement, Update};
use crate::traits::{Connection, DatabaseDriver};
use crate::types::Bindable;

/// An open connection scope.
///
/// A handle owns one connection and a private fork of the configuration it
/// was opened with. Statements created from it fork that configuration
/// again, so a statement-level override never leaks back into the handle.
/// The connection is returned to its driver when the handle is closed or
/// dropped.
pub struct Handle {
    driver: Arc<dyn DatabaseDriver>,
    connection: Option<Box<dyn Connection>>,
    config: ConfigRegistry,
}

impl Handle {
    pub(crate) fn new(
        driver: Arc<dyn DatabaseDriver>,
        connection: Box<dyn Connection>,
        config: ConfigRegistry,
    ) -> Self {
        Self {
            driver,
            connection: Some(connection),
            config,
        }
    }

    pub fn config(&self) -> &ConfigRegistry {
        &self.config
    }

    /// Scoped override for every statement created afterwards on this handle.
    pub fn configure<K: Config>(&mut self, mutator: impl FnOnce(&mut K)) -> &mut Self {
        self.config.configure::<K>(mutator);
        self
    }

    pub fn create_query(&mut self, sql: impl Into<String>) -> Query<'_> {
        Query::new(self, sql)
    }

    pub fn create_update(&mut self, sql: impl Into<String>) -> Update<'_> {
        Update::new(self, sql)
    }

    pub fn create_call(&mut self, sql: impl Into<String>) -> Call<'_> {
        Call::new(self, sql)
    }

    /// Runs an update binding `args` to positions 1, 2, ...
    ///
    /// # Example
    /// ```ignore
    /// let count = handle
    ///     .execute("INSERT INTO something (id, name) VALUES (?, ?)", args![1i32, "a".to_string()])
    ///     .await?;
    /// ```
    pub async fn execute(&mut self, sql: &str, args: Vec<Arc<dyn Bindable>>) -> Result<u64> {
        let mut update = self.create_update(sql);
        for (i, arg) in args.into_iter().enumerate() {
            update.context_mut().bind(i + 1, arg);
        }
        update.execute().await
    }

    /// The open connection, or a usage error once the handle is closed.
    pub fn connection_mut(&mut self) -> Result<&mut dyn Connection> {
        match self.connection.as_mut() {
            Some(connection) => Ok(connection.as_mut()),
            None => Err(SqlBindError::usage("handle is closed")),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    /// Returns the connection to the driver. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!("closing handle");
            self.driver.close(connection);
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
