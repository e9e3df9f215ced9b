use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::ConfigRegistry;
use crate::error::{Result, SqlBindError};
use crate::handle::Handle;
use crate::mapper::{MapperCache, RowMapper, RowMappers, RowView};
use crate::types::{Mapped, MappingContext, QualifiedType, RawQueryResult, Row, SqlValue};

/// A lazily mapped row sequence.
///
/// Rows are mapped one at a time as the iterator is consumed. The row mapper
/// is resolved once per execution; column mappers once per distinct
/// qualified type. When the sequence owns the handle it was produced on, the
/// handle is released when the sequence is dropped.
pub struct ResultIter<T> {
    columns: Arc<[String]>,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
    config: ConfigRegistry,
    mapper: Arc<dyn RowMapper>,
    cache: MapperCache,
    scope: Option<Handle>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Mapped> ResultIter<T> {
    pub(crate) fn new(
        raw: RawQueryResult,
        config: ConfigRegistry,
        qualified_type: &QualifiedType,
    ) -> Result<Self> {
        let columns: Arc<[String]> = raw.columns.into();
        let mapper = config
            .get::<RowMappers>()
            .resolve(qualified_type, &config)
            .ok_or_else(|| SqlBindError::ResultProduction {
                index: 1,
                label: columns.first().cloned().unwrap_or_else(|| "?".to_string()),
                message: format!("no row mapper registered for {}", qualified_type),
            })?;
        let cache = MapperCache::new(&config);

        Ok(Self {
            columns,
            rows: raw.rows.into_iter(),
            config,
            mapper,
            cache,
            scope: None,
            _marker: PhantomData,
        })
    }

    /// Binds the lifetime of `handle` to this sequence.
    pub(crate) fn with_scope(mut self, handle: Handle) -> Self {
        self.scope = Some(handle);
        self
    }

    /// Rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn map_row(&mut self, values: Vec<SqlValue>) -> Result<T> {
        let row = Row::new(Arc::clone(&self.columns), values);
        let native = {
            let mut view = RowView::new(&row, &self.config, &mut self.cache);
            self.mapper.map(&mut view)?
        };
        let column = row.column(1);
        T::from_native(
            native,
            &MappingContext {
                column: &column,
                coalesce_null_primitives: self.cache.coalesce_null_primitives(),
            },
        )
    }
}

impl<T: Mapped> Iterator for ResultIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = self.rows.next()?;
        let mapped = self.map_row(values);
        if self.rows.len() == 0 {
            self.scope.take();
        }
        Some(mapped)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

/// Collects exactly one row.
pub(crate) fn exactly_one<T: Mapped>(mut iter: ResultIter<T>) -> Result<T> {
    let total = iter.remaining();
    match (iter.next(), total) {
        (Some(value), 1) => value,
        _ => Err(SqlBindError::UnexpectedRowCount {
            expected: 1,
            actual: total,
        }),
    }
}

/// Collects zero or one row.
pub(crate) fn at_most_one<T: Mapped>(mut iter: ResultIter<T>) -> Result<Option<T>> {
    let total = iter.remaining();
    match total {
        0 => Ok(None),
        1 => iter.next().transpose(),
        _ => Err(SqlBindError::UnexpectedRowCount {
            expected: 1,
            actual: total,
        }),
    }
}
