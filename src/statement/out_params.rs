use chrono::{DateTime, Utc};

use crate::error::{Result, SqlBindError};
use crate::mapper::FromSqlValue;
use crate::statement::ParamKey;
use crate::types::{SqlType, SqlValue};

#[derive(Debug, Clone)]
struct OutEntry {
    key: ParamKey,
    /// 1-based placeholder position, when the parameter appears in the statement.
    ordinal: Option<usize>,
    sql_type: SqlType,
    value: SqlValue,
}

/// Values produced by a callable statement.
///
/// Reads convert the stored value to the requested type and fail with a
/// usage error when it cannot be represented.
#[derive(Debug, Clone, Default)]
pub struct OutParameters {
    entries: Vec<OutEntry>,
}

impl OutParameters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(
        &mut self,
        key: ParamKey,
        ordinal: Option<usize>,
        sql_type: SqlType,
        value: SqlValue,
    ) {
        self.entries.push(OutEntry {
            key,
            ordinal,
            sql_type,
            value,
        });
    }

    fn entry(&self, key: &ParamKey) -> Result<&OutEntry> {
        self.entries
            .iter()
            .find(|e| &e.key == key)
            .or_else(|| match key {
                ParamKey::Position(n) => self.entries.iter().find(|e| e.ordinal == Some(*n)),
                ParamKey::Name(_) => None,
            })
            .ok_or_else(|| {
                SqlBindError::usage(format!("no OUT parameter registered as {}", key))
            })
    }

    /// The raw stored value.
    pub fn value(&self, key: impl Into<ParamKey>) -> Result<&SqlValue> {
        self.entry(&key.into()).map(|e| &e.value)
    }

    /// Reads a parameter as `T`; NULL yields `None`.
    pub fn get_optional<T: FromSqlValue>(&self, key: impl Into<ParamKey>) -> Result<Option<T>> {
        let key = key.into();
        let entry = self.entry(&key)?;
        if entry.value.is_null() {
            return Ok(None);
        }
        T::from_sql_value(&entry.value).map(Some).ok_or_else(|| {
            SqlBindError::usage(format!(
                "OUT parameter {} ({}) cannot be read as {}",
                key,
                entry.sql_type,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Reads a non-NULL parameter as `T`.
    pub fn get<T: FromSqlValue>(&self, key: impl Into<ParamKey>) -> Result<T> {
        let key = key.into();
        self.get_optional(key.clone())?
            .ok_or_else(|| SqlBindError::usage(format!("OUT parameter {} is NULL", key)))
    }

    pub fn get_i16(&self, key: impl Into<ParamKey>) -> Result<i16> {
        self.get(key)
    }

    pub fn get_i32(&self, key: impl Into<ParamKey>) -> Result<i32> {
        self.get(key)
    }

    pub fn get_i64(&self, key: impl Into<ParamKey>) -> Result<i64> {
        self.get(key)
    }

    pub fn get_f32(&self, key: impl Into<ParamKey>) -> Result<f32> {
        self.get(key)
    }

    pub fn get_f64(&self, key: impl Into<ParamKey>) -> Result<f64> {
        self.get(key)
    }

    pub fn get_string(&self, key: impl Into<ParamKey>) -> Result<String> {
        self.get(key)
    }

    pub fn get_timestamp(&self, key: impl Into<ParamKey>) -> Result<DateTime<Utc>> {
        self.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
