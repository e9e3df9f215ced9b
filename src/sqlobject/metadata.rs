//! Purpose-keyed method metadata and the inheritance merge.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::argument::{Argument, ArgumentFactory, Arguments};
use crate::config::ConfigRegistry;
use crate::error::Result;
use crate::mapper::{
    ColumnMapper, ColumnMapperFactory, ColumnMappers, RowMapper, RowMapperFactory, RowMappers,
};
use crate::resolution::ConverterFactory;
use crate::statement::{SqlLocator, SqlStatements, StatementContext};
use crate::types::QualifierSet;

/// Customizes a statement right before it executes.
pub trait StatementCustomizer: Send + Sync {
    /// Purpose of this customizer. A nearer declaration with the same key
    /// replaces a farther one.
    fn key(&self) -> &str;

    fn before_execution(&self, ctx: &mut StatementContext) -> Result<()>;
}

type ConfigureFn = dyn Fn(&mut ConfigRegistry) + Send + Sync;

/// The identity two metadata items are compared by when merging.
/// Factory registrations are identified by factory type and the qualifiers
/// they serve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    RegisterArgument(&'static str, QualifierSet),
    RegisterColumnMapper(&'static str, QualifierSet),
    RegisterRowMapper(&'static str, QualifierSet),
    SqlLocator,
    Customizer(String),
    Configure(String),
}

/// One declaration on a method or an interface.
#[derive(Clone)]
pub enum Metadata {
    RegisterArgument {
        name: &'static str,
        factory: Arc<ArgumentFactory>,
    },
    RegisterColumnMapper {
        name: &'static str,
        factory: Arc<ColumnMapperFactory>,
    },
    RegisterRowMapper {
        name: &'static str,
        factory: Arc<RowMapperFactory>,
    },
    UseSqlLocator(Arc<dyn SqlLocator>),
    Customizer(Arc<dyn StatementCustomizer>),
    Configure {
        key: String,
        apply: Arc<ConfigureFn>,
    },
}

impl Metadata {
    /// Registers `factory` into the argument chain. Registrations of the
    /// same factory type serving the same qualifiers are one purpose.
    pub fn register_argument<F>(factory: F) -> Self
    where
        F: ConverterFactory<dyn Argument> + 'static,
    {
        Metadata::RegisterArgument {
            name: std::any::type_name::<F>(),
            factory: Arc::new(factory),
        }
    }

    pub fn register_column_mapper<F>(factory: F) -> Self
    where
        F: ConverterFactory<dyn ColumnMapper> + 'static,
    {
        Metadata::RegisterColumnMapper {
            name: std::any::type_name::<F>(),
            factory: Arc::new(factory),
        }
    }

    pub fn register_row_mapper<F>(factory: F) -> Self
    where
        F: ConverterFactory<dyn RowMapper> + 'static,
    {
        Metadata::RegisterRowMapper {
            name: std::any::type_name::<F>(),
            factory: Arc::new(factory),
        }
    }

    pub fn use_sql_locator(locator: impl SqlLocator + 'static) -> Self {
        Metadata::UseSqlLocator(Arc::new(locator))
    }

    pub fn customizer(customizer: impl StatementCustomizer + 'static) -> Self {
        Metadata::Customizer(Arc::new(customizer))
    }

    pub fn configure(
        key: impl Into<String>,
        apply: impl Fn(&mut ConfigRegistry) + Send + Sync + 'static,
    ) -> Self {
        Metadata::Configure {
            key: key.into(),
            apply: Arc::new(apply),
        }
    }

    pub fn key(&self) -> MetadataKey {
        match self {
            Metadata::RegisterArgument { name, factory } => {
                MetadataKey::RegisterArgument(*name, factory.qualifiers())
            }
            Metadata::RegisterColumnMapper { name, factory } => {
                MetadataKey::RegisterColumnMapper(*name, factory.qualifiers())
            }
            Metadata::RegisterRowMapper { name, factory } => {
                MetadataKey::RegisterRowMapper(*name, factory.qualifiers())
            }
            Metadata::UseSqlLocator(_) => MetadataKey::SqlLocator,
            Metadata::Customizer(c) => MetadataKey::Customizer(c.key().to_string()),
            Metadata::Configure { key, .. } => MetadataKey::Configure(key.clone()),
        }
    }

    /// Applies a configuration item to a statement's config fork. Returns
    /// `false` for items that are not configuration.
    pub(crate) fn apply_config(&self, config: &mut ConfigRegistry) -> bool {
        match self {
            Metadata::RegisterArgument { factory, .. } => {
                config.configure::<Arguments>(|a| {
                    a.register(Arc::clone(factory));
                });
            }
            Metadata::RegisterColumnMapper { factory, .. } => {
                config.configure::<ColumnMappers>(|m| {
                    m.register(Arc::clone(factory));
                });
            }
            Metadata::RegisterRowMapper { factory, .. } => {
                config.configure::<RowMappers>(|m| {
                    m.register(Arc::clone(factory));
                });
            }
            Metadata::UseSqlLocator(locator) => {
                config.configure::<SqlStatements>(|s| {
                    s.set_locator(Arc::clone(locator));
                });
            }
            Metadata::Configure { apply, .. } => (apply.as_ref())(config),
            Metadata::Customizer(_) => return false,
        }
        true
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.key())
    }
}

/// Merges metadata levels given nearest first: the method, its declaring
/// interface, then ancestors.
///
/// An item is dropped when a nearer level declares the same key. Items of
/// one level never replace each other. The result is ordered farthest level
/// first, declaration order within a level, so registrations made by nearer
/// levels land later in a chain and take precedence there.
pub fn merge(levels: &[&[Metadata]]) -> Vec<Metadata> {
    let mut seen: HashSet<MetadataKey> = HashSet::new();
    let mut winners: Vec<Metadata> = Vec::new();

    for level in levels {
        let kept: Vec<&Metadata> = level
            .iter()
            .filter(|item| !seen.contains(&item.key()))
            .collect();
        seen.extend(level.iter().map(Metadata::key));
        winners.splice(0..0, kept.into_iter().cloned());
    }

    winners
}
