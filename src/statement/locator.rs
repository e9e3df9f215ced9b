use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, ConfigRegistry};
use crate::error::{Result, SqlBindError};
use crate::statement::{ColonPrefixParser, TemplateParser};

/// Resolves the SQL template text for a declared statement.
pub trait SqlLocator: Send + Sync {
    /// `name` is the declaring method; `declared` the SQL (or resource name) declared on it.
    fn locate(&self, name: &str, declared: Option<&str>, config: &ConfigRegistry) -> Result<String>;
}

fn locator_error(identifier: &str, message: impl Into<String>) -> SqlBindError {
    SqlBindError::statement(identifier, "sql locator", message)
}

/// Treats the declared text as the SQL itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineSqlLocator;

impl SqlLocator for InlineSqlLocator {
    fn locate(&self, name: &str, declared: Option<&str>, _: &ConfigRegistry) -> Result<String> {
        declared
            .filter(|sql| !sql.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| locator_error(name, "no SQL declared and no locator configured"))
    }
}

/// Looks templates up by name: the declared text if any, else the method name.
#[derive(Debug, Default, Clone)]
pub struct MapSqlLocator {
    templates: HashMap<String, String>,
}

impl MapSqlLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.templates.insert(name.into(), sql.into());
        self
    }
}

impl SqlLocator for MapSqlLocator {
    fn locate(&self, name: &str, declared: Option<&str>, _: &ConfigRegistry) -> Result<String> {
        let key = declared.filter(|d| !d.trim().is_empty()).unwrap_or(name);
        self.templates
            .get(key)
            .cloned()
            .ok_or_else(|| locator_error(key, format!("no SQL template named '{}'", key)))
    }
}

/// Configuration kind for statement text handling.
#[derive(Clone)]
pub struct SqlStatements {
    locator: Arc<dyn SqlLocator>,
    parser: Arc<dyn TemplateParser>,
}

impl SqlStatements {
    pub fn locator(&self) -> &Arc<dyn SqlLocator> {
        &self.locator
    }

    pub fn set_locator(&mut self, locator: Arc<dyn SqlLocator>) -> &mut Self {
        self.locator = locator;
        self
    }

    pub fn parser(&self) -> &Arc<dyn TemplateParser> {
        &self.parser
    }

    pub fn set_parser(&mut self, parser: Arc<dyn TemplateParser>) -> &mut Self {
        self.parser = parser;
        self
    }
}

impl Default for SqlStatements {
    fn default() -> Self {
        Self {
            locator: Arc::new(InlineSqlLocator),
            parser: Arc::new(ColonPrefixParser),
        }
    }
}

impl Config for SqlStatements {
    fn fork(&self) -> Self {
        self.clone()
    }
}
