use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::config::{Config, ConfigRegistry};
use crate::types::{Bindable, QualifierSet, SqlType};

/// Identifies a statement parameter: 1-based position or case-sensitive name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKey {
    Position(usize),
    Name(String),
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKey::Position(n) => write!(f, "{}", n),
            ParamKey::Name(name) => write!(f, ":{}", name),
        }
    }
}

impl From<usize> for ParamKey {
    fn from(position: usize) -> Self {
        ParamKey::Position(position)
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        ParamKey::Name(name.to_string())
    }
}

impl From<String> for ParamKey {
    fn from(name: String) -> Self {
        ParamKey::Name(name)
    }
}

/// A raw bound value and the qualifiers declared for its parameter.
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Arc<dyn Bindable>,
    pub qualifiers: QualifierSet,
}

/// Per-statement scope: config fork, bindings, OUT registrations and attributes.
pub struct StatementContext {
    template: String,
    config: ConfigRegistry,
    bindings: BTreeMap<ParamKey, Binding>,
    out_parameters: Vec<(ParamKey, SqlType)>,
    attributes: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl StatementContext {
    /// `config` must be a private fork owned by this statement.
    pub fn new(template: impl Into<String>, config: ConfigRegistry) -> Self {
        Self {
            template: template.into(),
            config,
            bindings: BTreeMap::new(),
            out_parameters: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
    }

    pub fn config(&self) -> &ConfigRegistry {
        &self.config
    }

    pub fn configure<K: Config>(&mut self, mutator: impl FnOnce(&mut K)) -> &mut Self {
        self.config.configure(mutator);
        self
    }

    pub(crate) fn config_mut(&mut self) -> &mut ConfigRegistry {
        &mut self.config
    }

    pub(crate) fn into_config(self) -> ConfigRegistry {
        self.config
    }

    /// Moves the config out, leaving an empty registry behind.
    pub(crate) fn take_config(&mut self) -> ConfigRegistry {
        std::mem::take(&mut self.config)
    }

    /// Stores the value as-is; conversion happens at execution.
    pub fn bind(&mut self, key: impl Into<ParamKey>, value: Arc<dyn Bindable>) -> &mut Self {
        self.bind_qualified(key, value, QualifierSet::new())
    }

    pub fn bind_qualified(
        &mut self,
        key: impl Into<ParamKey>,
        value: Arc<dyn Bindable>,
        qualifiers: QualifierSet,
    ) -> &mut Self {
        self.bindings
            .insert(key.into(), Binding { value, qualifiers });
        self
    }

    pub fn binding(&self, key: &ParamKey) -> Option<&Binding> {
        self.bindings.get(key)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&ParamKey, &Binding)> {
        self.bindings.iter()
    }

    /// Drops every binding, keeping config, OUT registrations and attributes.
    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
    }

    pub fn register_out_parameter(&mut self, key: impl Into<ParamKey>, sql_type: SqlType) -> &mut Self {
        let key = key.into();
        self.out_parameters.retain(|(k, _)| *k != key);
        self.out_parameters.push((key, sql_type));
        self
    }

    pub fn out_parameters(&self) -> &[(ParamKey, SqlType)] {
        &self.out_parameters
    }

    pub fn is_out_parameter(&self, key: &ParamKey) -> bool {
        self.out_parameters.iter().any(|(k, _)| k == key)
    }

    /// Sets an extension attribute visible to customizers for this statement.
    pub fn define<V: Any + Send + Sync>(&mut self, key: impl Into<String>, value: V) -> &mut Self {
        self.attributes.insert(key.into(), Arc::new(value));
        self
    }

    pub fn attribute<V: Any>(&self, key: &str) -> Option<&V> {
        self.attributes.get(key).and_then(|v| v.downcast_ref::<V>())
    }
}

impl fmt::Debug for StatementContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementContext")
            .field("template", &self.template)
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .field("out_parameters", &self.out_parameters)
            .finish()
    }
}
