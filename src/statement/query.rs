use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, SqlBindError};
use crate::handle::Handle;
use crate::statement::{
    at_most_one, exactly_one, execute, ExecutionMode, ExecutionResult, OutParameters, ParamKey, ResultIter,
    StatementContext,
};
use crate::types::{Bindable, Mapped, QualifiedType, QualifierSet, RawQueryResult, SqlType};

/// Fluent binding shared by every statement kind.
///
/// All values are converted lazily, right before execution, using the
/// statement's own configuration.
pub trait SqlStatement: Sized {
    fn context(&self) -> &StatementContext;

    fn context_mut(&mut self) -> &mut StatementContext;

    fn bind<V: Bindable>(mut self, key: impl Into<ParamKey>, value: V) -> Self {
        self.context_mut().bind(key, Arc::new(value));
        self
    }

    fn bind_qualified<V: Bindable>(
        mut self,
        key: impl Into<ParamKey>,
        value: V,
        qualifiers: QualifierSet,
    ) -> Self {
        self.context_mut()
            .bind_qualified(key, Arc::new(value), qualifiers);
        self
    }

    /// Changes this statement's configuration without touching the handle's.
    fn configure<K: Config>(mut self, mutator: impl FnOnce(&mut K)) -> Self {
        self.context_mut().configure::<K>(mutator);
        self
    }

    fn define<V: Any + Send + Sync>(mut self, key: impl Into<String>, value: V) -> Self {
        self.context_mut().define(key, value);
        self
    }
}

macro_rules! impl_sql_statement {
    ($($name:ident),*) => {$(
        impl SqlStatement for $name<'_> {
            fn context(&self) -> &StatementContext {
                &self.ctx
            }

            fn context_mut(&mut self) -> &mut StatementContext {
                &mut self.ctx
            }
        }
    )*};
}

/// A statement producing rows.
pub struct Query<'h> {
    handle: &'h mut Handle,
    ctx: StatementContext,
}

impl<'h> Query<'h> {
    pub(crate) fn new(handle: &'h mut Handle, template: impl Into<String>) -> Self {
        let ctx = StatementContext::new(template, handle.config().fork());
        Self { handle, ctx }
    }

    /// Maps each row to `T` through the row mapper chain.
    pub fn map_to<T: Mapped>(self) -> ResultIterable<'h, T> {
        self.map_to_qualified(T::qualified_type())
    }

    /// Maps each row through the mapper registered for `qualified_type`.
    pub fn map_to_qualified<T: Mapped>(self, qualified_type: QualifiedType) -> ResultIterable<'h, T> {
        ResultIterable {
            query: self,
            qualified_type,
            _marker: PhantomData,
        }
    }

    /// Executes and returns the unmapped result.
    pub async fn execute_raw(self) -> Result<RawQueryResult> {
        let connection = self.handle.connection_mut()?;
        match execute(connection, &self.ctx, ExecutionMode::Query).await? {
            ExecutionResult::Rows(raw) => Ok(raw),
            _ => Err(SqlBindError::usage("query did not produce rows")),
        }
    }
}

/// A query with a target type, waiting for a terminal operation.
pub struct ResultIterable<'h, T> {
    query: Query<'h>,
    qualified_type: QualifiedType,
    _marker: PhantomData<fn() -> T>,
}

impl<'h, T: Mapped> ResultIterable<'h, T> {
    /// Executes and returns a lazily mapped iterator.
    pub async fn iter(self) -> Result<ResultIter<T>> {
        let Query { handle, ctx } = self.query;
        let connection = handle.connection_mut()?;
        let raw = match execute(connection, &ctx, ExecutionMode::Query).await? {
            ExecutionResult::Rows(raw) => raw,
            _ => return Err(SqlBindError::usage("query did not produce rows")),
        };
        ResultIter::new(raw, ctx.into_config(), &self.qualified_type)
    }

    pub async fn list(self) -> Result<Vec<T>> {
        self.iter().await?.collect()
    }

    /// Exactly one row, otherwise [`SqlBindError::UnexpectedRowCount`].
    pub async fn one(self) -> Result<T> {
        exactly_one(self.iter().await?)
    }

    /// Zero or one row.
    pub async fn find_one(self) -> Result<Option<T>> {
        at_most_one(self.iter().await?)
    }

    /// The first row if any; the rest are not mapped.
    pub async fn first(self) -> Result<Option<T>> {
        self.iter().await?.next().transpose()
    }
}

/// A statement reporting an update count.
pub struct Update<'h> {
    handle: &'h mut Handle,
    ctx: StatementContext,
}

impl<'h> Update<'h> {
    pub(crate) fn new(handle: &'h mut Handle, template: impl Into<String>) -> Self {
        let ctx = StatementContext::new(template, handle.config().fork());
        Self { handle, ctx }
    }

    pub async fn execute(self) -> Result<u64> {
        let connection = self.handle.connection_mut()?;
        match execute(connection, &self.ctx, ExecutionMode::Update).await? {
            ExecutionResult::UpdateCount(count) => Ok(count),
            _ => Err(SqlBindError::usage("update did not produce a count")),
        }
    }
}

/// A callable statement with OUT parameters.
pub struct Call<'h> {
    handle: &'h mut Handle,
    ctx: StatementContext,
}

impl<'h> Call<'h> {
    pub(crate) fn new(handle: &'h mut Handle, template: impl Into<String>) -> Self {
        let ctx = StatementContext::new(template, handle.config().fork());
        Self { handle, ctx }
    }

    pub fn register_out_parameter(mut self, key: impl Into<ParamKey>, sql_type: SqlType) -> Self {
        self.ctx.register_out_parameter(key, sql_type);
        self
    }

    pub async fn invoke(self) -> Result<OutParameters> {
        let connection = self.handle.connection_mut()?;
        match execute(connection, &self.ctx, ExecutionMode::Call).await? {
            ExecutionResult::OutParameters(out) => Ok(out),
            _ => Err(SqlBindError::usage("call did not produce OUT parameters")),
        }
    }
}

impl_sql_statement!(Query, Update, Call);
