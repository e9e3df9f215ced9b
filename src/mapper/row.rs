use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::{Config, ConfigRegistry};
use crate::error::{Result, SqlBindError};
use crate::mapper::{ColumnMapper, ColumnMappers};
use crate::resolution::{ConverterFactory, ResolutionChain};
use crate::types::{MappingContext, Mapped, Native, QualifiedType, QualifierSet, Row};

/// Maps a whole row to a native value.
pub trait RowMapper: Send + Sync {
    /// Returns `None` when the row maps to SQL NULL (single-column results).
    fn map(&self, row: &mut RowView<'_>) -> Result<Option<Native>>;
}

pub type RowMapperFactory = dyn ConverterFactory<dyn RowMapper>;

/// Column mappers resolved during one execution, keyed by qualified type.
pub struct MapperCache {
    mappers: HashMap<QualifiedType, Arc<dyn ColumnMapper>>,
    coalesce_null_primitives: bool,
}

impl MapperCache {
    pub fn new(config: &ConfigRegistry) -> Self {
        Self {
            mappers: HashMap::new(),
            coalesce_null_primitives: config.get::<ColumnMappers>().coalesce_null_primitives(),
        }
    }

    pub fn coalesce_null_primitives(&self) -> bool {
        self.coalesce_null_primitives
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

/// A row being mapped, with typed column access.
pub struct RowView<'a> {
    row: &'a Row,
    config: &'a ConfigRegistry,
    cache: &'a mut MapperCache,
}

impl<'a> RowView<'a> {
    pub fn new(row: &'a Row, config: &'a ConfigRegistry, cache: &'a mut MapperCache) -> Self {
        Self { row, config, cache }
    }

    pub fn row(&self) -> &Row {
        self.row
    }

    /// Reads the 1-based column `index` as `T`.
    pub fn get<T: Mapped>(&mut self, index: usize) -> Result<T> {
        self.get_qualified(index, &QualifierSet::new())
    }

    pub fn get_by_label<T: Mapped>(&mut self, label: &str) -> Result<T> {
        let index = self.row.index_of(label).ok_or_else(|| SqlBindError::ResultProduction {
            index: 0,
            label: label.to_string(),
            message: "no such column".to_string(),
        })?;
        self.get(index)
    }

    pub fn get_qualified<T: Mapped>(&mut self, index: usize, qualifiers: &QualifierSet) -> Result<T> {
        let qualified_type = qualifiers
            .iter()
            .fold(T::qualified_type(), |qt, q| qt.with(q.clone()));
        let native = self.map_column(index, &qualified_type)?;
        let column = self.row.column(index);
        T::from_native(
            native,
            &MappingContext {
                column: &column,
                coalesce_null_primitives: self.cache.coalesce_null_primitives,
            },
        )
    }

    /// Maps a column through the column mapper for `qualified_type`.
    pub fn map_column(
        &mut self,
        index: usize,
        qualified_type: &QualifiedType,
    ) -> Result<Option<Native>> {
        let column = self.row.column(index);
        let value = self.row.get(index)?;

        let mapper = match self.cache.mappers.get(qualified_type) {
            Some(mapper) => Arc::clone(mapper),
            None => {
                let mapper = self
                    .config
                    .get::<ColumnMappers>()
                    .resolve(qualified_type, self.config)
                    .ok_or_else(|| SqlBindError::ResultProduction {
                        index: column.index,
                        label: column.label.clone(),
                        message: format!("no column mapper registered for {}", qualified_type),
                    })?;
                self.cache
                    .mappers
                    .insert(qualified_type.clone(), Arc::clone(&mapper));
                mapper
            }
        };
        mapper.map(value, &column)
    }
}

/// Falls back to mapping column 1 through the column mapper chain.
pub struct SingleColumnRowMapperFactory;

struct SingleColumnMapper {
    mapper: Arc<dyn ColumnMapper>,
}

impl RowMapper for SingleColumnMapper {
    fn map(&self, row: &mut RowView<'_>) -> Result<Option<Native>> {
        let row = row.row();
        self.mapper.map(row.get(1)?, &row.column(1))
    }
}

impl ConverterFactory<dyn RowMapper> for SingleColumnRowMapperFactory {
    fn accepts(&self, _: &QualifiedType) -> bool {
        true
    }

    fn build(&self, qualified_type: &QualifiedType, config: &ConfigRegistry) -> Option<Arc<dyn RowMapper>> {
        config
            .get::<ColumnMappers>()
            .resolve(qualified_type, config)
            .map(|mapper| Arc::new(SingleColumnMapper { mapper }) as Arc<dyn RowMapper>)
    }

    fn ignores_qualifiers(&self) -> bool {
        true
    }
}

/// A type that knows how to build itself from a row.
pub trait FromRow: Sized + Send + 'static {
    fn from_row(row: &mut RowView<'_>) -> Result<Self>;
}

/// Row mapper factory for a [`FromRow`] type.
pub struct FromRowMapperFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromRow> FromRowMapperFactory<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: FromRow> Default for FromRowMapperFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct FromRowMapper<T>(PhantomData<fn() -> T>);

impl<T: FromRow> RowMapper for FromRowMapper<T> {
    fn map(&self, row: &mut RowView<'_>) -> Result<Option<Native>> {
        T::from_row(row).map(|value| Some(Box::new(value) as Native))
    }
}

impl<T: FromRow> ConverterFactory<dyn RowMapper> for FromRowMapperFactory<T> {
    fn accepts(&self, qualified_type: &QualifiedType) -> bool {
        qualified_type.raw().is::<T>()
    }

    fn build(&self, _: &QualifiedType, _: &ConfigRegistry) -> Option<Arc<dyn RowMapper>> {
        Some(Arc::new(FromRowMapper::<T>(PhantomData)))
    }
}

/// Configuration kind holding the row mapper chain.
pub struct RowMappers {
    chain: ResolutionChain<dyn RowMapper>,
}

impl RowMappers {
    pub fn register(&mut self, factory: Arc<RowMapperFactory>) -> &mut Self {
        self.chain.register(factory);
        self
    }

    pub fn resolve(
        &self,
        qualified_type: &QualifiedType,
        config: &ConfigRegistry,
    ) -> Option<Arc<dyn RowMapper>> {
        self.chain.resolve(qualified_type, config)
    }
}

impl Default for RowMappers {
    fn default() -> Self {
        let mut chain = ResolutionChain::<dyn RowMapper>::new();
        chain.register(Arc::new(SingleColumnRowMapperFactory));
        Self { chain }
    }
}

impl Config for RowMappers {
    fn fork(&self) -> Self {
        Self {
            chain: self.chain.fork(),
        }
    }
}
