//! Conversion of bound native values into [`SqlValue`] statement parameters.
//!
//! Conversion is deferred until execution: each bound value is resolved
//! through the [`Arguments`] chain using its [`QualifiedType`], i.e. its
//! runtime type plus the qualifiers declared for the parameter.

mod factories;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{Config, ConfigRegistry};
use crate::error::{Result, SqlBindError};
use crate::resolution::{ConverterFactory, ResolutionChain};
use crate::statement::ParamKey;
use crate::types::{Bindable, QualifiedType, QualifierSet, SqlValue};

pub use factories::{ContainerArgumentFactory, OptionalArgumentFactory, TypedArgumentFactory};

/// Converts a native value of one qualified type into a statement parameter.
pub trait Argument: Send + Sync {
    fn apply(
        &self,
        value: &dyn Bindable,
        qualified_type: &QualifiedType,
        ctx: &ArgumentContext<'_>,
    ) -> Result<SqlValue>;
}

pub type ArgumentFactory = dyn ConverterFactory<dyn Argument>;

/// Where a conversion happens; carried so errors name the statement and parameter.
pub struct ArgumentContext<'a> {
    pub config: &'a ConfigRegistry,
    pub template: &'a str,
    pub parameter: &'a ParamKey,
}

impl<'a> ArgumentContext<'a> {
    pub fn new(config: &'a ConfigRegistry, template: &'a str, parameter: &'a ParamKey) -> Self {
        Self {
            config,
            template,
            parameter,
        }
    }

    /// A statement-construction error for the current parameter.
    pub fn error(&self, message: impl Into<String>) -> SqlBindError {
        SqlBindError::statement(self.template, self.parameter, message)
    }

    /// Resolves and applies the argument converter for `value` under `qualifiers`.
    pub fn convert(&self, value: &dyn Bindable, qualifiers: &QualifierSet) -> Result<SqlValue> {
        let qualified_type = QualifiedType::new(value.type_descriptor(), qualifiers.clone());

        if qualified_type.raw().is_container() && qualified_type.element_type().is_none() {
            return Err(SqlBindError::NoTypeParameters {
                template: self.template.to_string(),
                parameter: self.parameter.to_string(),
                type_name: qualified_type.raw().name(),
            });
        }

        let argument = self
            .config
            .get::<Arguments>()
            .resolve(&qualified_type, self.config)
            .ok_or_else(|| {
                self.error(format!("no argument factory for {}", qualified_type))
            })?;
        argument.apply(value, &qualified_type, self)
    }
}

/// Configuration kind holding the argument resolution chain.
pub struct Arguments {
    chain: ResolutionChain<dyn Argument>,
}

impl Arguments {
    pub fn register(&mut self, factory: Arc<ArgumentFactory>) -> &mut Self {
        self.chain.register(factory);
        self
    }

    pub fn resolve(
        &self,
        qualified_type: &QualifiedType,
        config: &ConfigRegistry,
    ) -> Option<Arc<dyn Argument>> {
        self.chain.resolve(qualified_type, config)
    }

    pub fn factory_count(&self) -> usize {
        self.chain.len()
    }
}

fn into_value<T: Clone + Into<SqlValue>>(value: &T) -> SqlValue {
    value.clone().into()
}

impl Default for Arguments {
    fn default() -> Self {
        let mut chain = ResolutionChain::<dyn Argument>::new();
        chain
            .register(Arc::new(TypedArgumentFactory::new(into_value::<SqlValue>)))
            .register(Arc::new(TypedArgumentFactory::new(into_value::<bool>)))
            .register(Arc::new(TypedArgumentFactory::new(into_value::<i16>)))
            .register(Arc::new(TypedArgumentFactory::new(into_value::<i32>)))
            .register(Arc::new(TypedArgumentFactory::new(into_value::<i64>)))
            .register(Arc::new(TypedArgumentFactory::new(into_value::<f32>)))
            .register(Arc::new(TypedArgumentFactory::new(into_value::<f64>)))
            .register(Arc::new(TypedArgumentFactory::new(into_value::<String>)))
            .register(Arc::new(TypedArgumentFactory::new(
                into_value::<DateTime<Utc>>,
            )))
            .register(Arc::new(OptionalArgumentFactory))
            .register(Arc::new(ContainerArgumentFactory));
        Self { chain }
    }
}

impl Config for Arguments {
    fn fork(&self) -> Self {
        Self {
            chain: self.chain.fork(),
        }
    }
}
