use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{Config, ConfigRegistry};
use crate::error::{Result, SqlBindError};
use crate::resolution::{ConverterFactory, ResolutionChain};
use crate::types::{ColumnRef, Native, QualifiedType, Qualifier, QualifierSet, SqlValue};

/// Maps a single column value to a native value.
pub trait ColumnMapper: Send + Sync {
    /// Returns `None` for SQL NULL.
    fn map(&self, value: &SqlValue, column: &ColumnRef) -> Result<Option<Native>>;
}

pub type ColumnMapperFactory = dyn ConverterFactory<dyn ColumnMapper>;

/// Lenient conversion from a SQL value, shared by column mapping and OUT parameter reads.
/// Returns `None` when the value cannot represent `Self`.
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: &SqlValue) -> Option<Self>;
}

fn integer(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Int16(n) => Some(i64::from(*n)),
        SqlValue::Int32(n) => Some(i64::from(*n)),
        SqlValue::Int64(n) => Some(*n),
        SqlValue::Float32(f) if f.is_finite() => Some(f.trunc() as i64),
        SqlValue::Float64(f) if f.is_finite() => Some(f.trunc() as i64),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float(value: &SqlValue) -> Option<f64> {
    match value {
        SqlValue::Int16(n) => Some(f64::from(*n)),
        SqlValue::Int32(n) => Some(f64::from(*n)),
        SqlValue::Int64(n) => Some(*n as f64),
        SqlValue::Float32(f) => Some(f64::from(*f)),
        SqlValue::Float64(f) => Some(*f),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl FromSqlValue for i16 {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        integer(value).and_then(|n| i16::try_from(n).ok())
    }
}

impl FromSqlValue for i32 {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        integer(value).and_then(|n| i32::try_from(n).ok())
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        integer(value)
    }
}

impl FromSqlValue for f32 {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Float32(f) => Some(*f),
            other => float(other).map(|f| f as f32),
        }
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        float(value)
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Text(s) => match s.as_str() {
                "t" | "true" | "1" => Some(true),
                "f" | "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Bool(b) => Some(b.to_string()),
            SqlValue::Int16(n) => Some(n.to_string()),
            SqlValue::Int32(n) => Some(n.to_string()),
            SqlValue::Int64(n) => Some(n.to_string()),
            SqlValue::Float32(f) => Some(f.to_string()),
            SqlValue::Float64(f) => Some(f.to_string()),
            SqlValue::Timestamp(t) => Some(t.to_rfc3339()),
            SqlValue::Null | SqlValue::Array { .. } => None,
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        Some(value.clone())
    }
}

/// Maps columns to exactly type `T` with a conversion function.
/// NULL never reaches the function.
pub struct TypedColumnMapperFactory<T, F> {
    mapper: Arc<TypedColumnMapper<T, F>>,
    qualifiers: QualifierSet,
}

struct TypedColumnMapper<T, F> {
    convert: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> TypedColumnMapperFactory<T, F>
where
    T: Any + Send,
    F: Fn(&SqlValue) -> Option<T> + Send + Sync + 'static,
{
    pub fn new(convert: F) -> Self {
        Self {
            mapper: Arc::new(TypedColumnMapper {
                convert,
                _marker: PhantomData,
            }),
            qualifiers: QualifierSet::new(),
        }
    }

    pub fn qualified(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.insert(qualifier);
        self
    }
}

impl<T: FromSqlValue + Any + Send> TypedColumnMapperFactory<T, fn(&SqlValue) -> Option<T>> {
    /// A mapper using `T`'s [`FromSqlValue`] conversion.
    pub fn builtin() -> Self {
        Self::new(T::from_sql_value as fn(&SqlValue) -> Option<T>)
    }
}

impl<T, F> ColumnMapper for TypedColumnMapper<T, F>
where
    T: Any + Send,
    F: Fn(&SqlValue) -> Option<T> + Send + Sync + 'static,
{
    fn map(&self, value: &SqlValue, column: &ColumnRef) -> Result<Option<Native>> {
        if value.is_null() {
            return Ok(None);
        }
        (self.convert)(value)
            .map(|v| Some(Box::new(v) as Native))
            .ok_or_else(|| SqlBindError::ResultProduction {
                index: column.index,
                label: column.label.clone(),
                message: format!(
                    "cannot convert {} to {}",
                    value.describe(),
                    std::any::type_name::<T>()
                ),
            })
    }
}

impl<T, F> ConverterFactory<dyn ColumnMapper> for TypedColumnMapperFactory<T, F>
where
    T: Any + Send,
    F: Fn(&SqlValue) -> Option<T> + Send + Sync + 'static,
{
    fn accepts(&self, qualified_type: &QualifiedType) -> bool {
        qualified_type.raw().is::<T>()
    }

    fn build(&self, _: &QualifiedType, _: &ConfigRegistry) -> Option<Arc<dyn ColumnMapper>> {
        Some(self.mapper.clone() as Arc<dyn ColumnMapper>)
    }

    fn qualifiers(&self) -> QualifierSet {
        self.qualifiers.clone()
    }
}

/// Configuration kind holding the column mapper chain and the null policy.
pub struct ColumnMappers {
    chain: ResolutionChain<dyn ColumnMapper>,
    coalesce_null_primitives: bool,
}

impl ColumnMappers {
    pub fn register(&mut self, factory: Arc<ColumnMapperFactory>) -> &mut Self {
        self.chain.register(factory);
        self
    }

    pub fn resolve(
        &self,
        qualified_type: &QualifiedType,
        config: &ConfigRegistry,
    ) -> Option<Arc<dyn ColumnMapper>> {
        self.chain.resolve(qualified_type, config)
    }

    /// Whether NULL maps to the zero value of primitive targets. Defaults to `true`.
    pub fn coalesce_null_primitives(&self) -> bool {
        self.coalesce_null_primitives
    }

    pub fn set_coalesce_null_primitives(&mut self, coalesce: bool) -> &mut Self {
        self.coalesce_null_primitives = coalesce;
        self
    }
}

impl Default for ColumnMappers {
    fn default() -> Self {
        let mut chain = ResolutionChain::<dyn ColumnMapper>::new();
        chain
            .register(Arc::new(TypedColumnMapperFactory::<SqlValue, _>::builtin()))
            .register(Arc::new(TypedColumnMapperFactory::<bool, _>::builtin()))
            .register(Arc::new(TypedColumnMapperFactory::<i16, _>::builtin()))
            .register(Arc::new(TypedColumnMapperFactory::<i32, _>::builtin()))
            .register(Arc::new(TypedColumnMapperFactory::<i64, _>::builtin()))
            .register(Arc::new(TypedColumnMapperFactory::<f32, _>::builtin()))
            .register(Arc::new(TypedColumnMapperFactory::<f64, _>::builtin()))
            .register(Arc::new(TypedColumnMapperFactory::<String, _>::builtin()))
            .register(Arc::new(TypedColumnMapperFactory::<DateTime<Utc>, _>::builtin()));
        Self {
            chain,
            coalesce_null_primitives: true,
        }
    }
}

impl Config for ColumnMappers {
    fn fork(&self) -> Self {
        Self {
            chain: self.chain.fork(),
            coalesce_null_primitives: self.coalesce_null_primitives,
        }
    }
}
