use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ConfigRegistry;
use crate::error::{Result, SqlBindError};
use crate::handle::Handle;
use crate::sqlobject::Metadata;
use crate::statement::{
    at_most_one, exactly_one, ExecutionMode, ExecutionResult, ParamKey, ResultIter,
};
use crate::types::{Bindable, Mapped, QualifiedType, Qualifier, QualifierSet, SqlType};

/// Exposes a value's fields for name-based binding.
///
/// ```ignore
/// impl BindFields for Something {
///     fn bind_fields(&self) -> Vec<(&'static str, Arc<dyn Bindable>)> {
///         vec![("id", Arc::new(self.id)), ("name", Arc::new(self.name.clone()))]
///     }
/// }
/// ```
pub trait BindFields: Bindable {
    fn bind_fields(&self) -> Vec<(&'static str, Arc<dyn Bindable>)>;
}

pub type FieldExtractor = fn(&dyn Bindable) -> Option<Vec<(&'static str, Arc<dyn Bindable>)>>;

fn extract_fields<T: BindFields>(value: &dyn Bindable) -> Option<Vec<(&'static str, Arc<dyn Bindable>)>> {
    value.as_any().downcast_ref::<T>().map(T::bind_fields)
}

/// How one method argument reaches the statement.
#[derive(Clone, Copy)]
pub enum BindMode {
    /// Bound under the parameter's name, or its 1-based position when unnamed.
    Value,
    /// Each field of the argument is bound under its own name.
    Fields(FieldExtractor),
}

impl std::fmt::Debug for BindMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindMode::Value => f.write_str("Value"),
            BindMode::Fields(_) => f.write_str("Fields"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    name: Option<String>,
    qualifiers: QualifierSet,
    mode: BindMode,
}

impl ParamDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            qualifiers: QualifierSet::new(),
            mode: BindMode::Value,
        }
    }

    pub fn positional() -> Self {
        Self {
            name: None,
            qualifiers: QualifierSet::new(),
            mode: BindMode::Value,
        }
    }

    /// Binds every field of a `T` argument by name.
    pub fn fields<T: BindFields>() -> Self {
        Self {
            name: None,
            qualifiers: QualifierSet::new(),
            mode: BindMode::Fields(extract_fields::<T>),
        }
    }

    pub fn qualified(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.insert(qualifier);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn qualifiers(&self) -> &QualifierSet {
        &self.qualifiers
    }

    pub fn mode(&self) -> BindMode {
        self.mode
    }

    /// The key a value argument is bound under, given its 0-based index.
    pub(crate) fn key(&self, index: usize) -> ParamKey {
        match &self.name {
            Some(name) => ParamKey::Name(name.clone()),
            None => ParamKey::Position(index + 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Update,
    Call,
}

impl StatementKind {
    pub(crate) fn mode(self) -> ExecutionMode {
        match self {
            StatementKind::Query => ExecutionMode::Query,
            StatementKind::Update => ExecutionMode::Update,
            StatementKind::Call => ExecutionMode::Call,
        }
    }
}

/// The erased value a method returns.
pub type ReturnValue = Box<dyn Any + Send>;

/// Inputs to result shaping. `scope` is the handle opened for this call,
/// when there is one.
pub(crate) struct Produced<'a> {
    pub result: ExecutionResult,
    pub config: ConfigRegistry,
    pub qualified_type: &'a QualifiedType,
    pub scope: Option<Handle>,
}

type Finisher = fn(Produced<'_>) -> Result<ReturnValue>;

/// The declared return shape of a method.
#[derive(Clone)]
pub struct ReturnShape {
    description: &'static str,
    qualified_type: QualifiedType,
    /// Lazy shapes take ownership of a per-call handle.
    holds_scope: bool,
    finish: Finisher,
}

impl ReturnShape {
    fn rows<T: Mapped>(
        description: &'static str,
        holds_scope: bool,
        finish: Finisher,
    ) -> Self {
        Self {
            description,
            qualified_type: T::qualified_type(),
            holds_scope,
            finish,
        }
    }

    fn plain(description: &'static str, finish: Finisher) -> Self {
        Self {
            description,
            qualified_type: QualifiedType::of::<()>(),
            holds_scope: false,
            finish,
        }
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn qualified_type(&self) -> &QualifiedType {
        &self.qualified_type
    }

    pub(crate) fn holds_scope(&self) -> bool {
        self.holds_scope
    }

    pub(crate) fn finish(&self, produced: Produced<'_>) -> Result<ReturnValue> {
        (self.finish)(produced)
    }
}

impl std::fmt::Debug for ReturnShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of {}", self.description, self.qualified_type)
    }
}

fn rows_of<T: Mapped>(produced: Produced<'_>) -> Result<ResultIter<T>> {
    match produced.result {
        ExecutionResult::Rows(raw) => {
            ResultIter::new(raw, produced.config, produced.qualified_type)
        }
        _ => Err(SqlBindError::usage("statement did not produce rows")),
    }
}

fn finish_one<T: Mapped>(produced: Produced<'_>) -> Result<ReturnValue> {
    exactly_one(rows_of::<T>(produced)?).map(|v| Box::new(v) as ReturnValue)
}

fn finish_optional<T: Mapped>(produced: Produced<'_>) -> Result<ReturnValue> {
    at_most_one(rows_of::<T>(produced)?).map(|v| Box::new(v) as ReturnValue)
}

fn finish_list<T: Mapped>(produced: Produced<'_>) -> Result<ReturnValue> {
    rows_of::<T>(produced)?
        .collect::<Result<Vec<T>>>()
        .map(|v| Box::new(v) as ReturnValue)
}

fn finish_iter<T: Mapped>(mut produced: Produced<'_>) -> Result<ReturnValue> {
    let scope = produced.scope.take();
    let iter = rows_of::<T>(produced)?;
    let iter = match scope {
        Some(handle) => iter.with_scope(handle),
        None => iter,
    };
    Ok(Box::new(iter))
}

fn finish_void(_: Produced<'_>) -> Result<ReturnValue> {
    Ok(Box::new(()))
}

fn finish_update_count(produced: Produced<'_>) -> Result<ReturnValue> {
    match produced.result {
        ExecutionResult::UpdateCount(count) => Ok(Box::new(count)),
        _ => Err(SqlBindError::usage("statement did not produce an update count")),
    }
}

fn finish_out_parameters(produced: Produced<'_>) -> Result<ReturnValue> {
    match produced.result {
        ExecutionResult::OutParameters(out) => Ok(Box::new(out)),
        _ => Err(SqlBindError::usage("statement did not produce OUT parameters")),
    }
}

/// One data-access method: statement kind, SQL, parameters and return shape.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    name: String,
    kind: StatementKind,
    sql: Option<String>,
    params: Vec<ParamDescriptor>,
    out_parameters: Vec<(ParamKey, SqlType)>,
    returns: Option<ReturnShape>,
    metadata: Vec<Metadata>,
}

impl MethodDescriptor {
    fn new(name: impl Into<String>, kind: StatementKind) -> Self {
        Self {
            name: name.into(),
            kind,
            sql: None,
            params: Vec::new(),
            out_parameters: Vec::new(),
            returns: None,
            metadata: Vec::new(),
        }
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::new(name, StatementKind::Query)
    }

    pub fn update(name: impl Into<String>) -> Self {
        Self::new(name, StatementKind::Update)
    }

    pub fn call(name: impl Into<String>) -> Self {
        Self::new(name, StatementKind::Call)
    }

    /// Inline SQL, or the identifier handed to the configured locator.
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    pub fn bind(self, name: impl Into<String>) -> Self {
        self.param(ParamDescriptor::named(name))
    }

    pub fn bind_positional(self) -> Self {
        self.param(ParamDescriptor::positional())
    }

    pub fn bind_fields<T: BindFields>(self) -> Self {
        self.param(ParamDescriptor::fields::<T>())
    }

    pub fn out_parameter(mut self, key: impl Into<ParamKey>, sql_type: SqlType) -> Self {
        self.out_parameters.push((key.into(), sql_type));
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.push(metadata);
        self
    }

    /// Exactly one mapped row.
    pub fn returns_one<T: Mapped>(mut self) -> Self {
        self.returns = Some(ReturnShape::rows::<T>("one", false, finish_one::<T>));
        self
    }

    /// Zero or one mapped row, as `Option<T>`.
    pub fn returns_optional<T: Mapped>(mut self) -> Self {
        self.returns = Some(ReturnShape::rows::<T>("optional", false, finish_optional::<T>));
        self
    }

    /// Every row, as `Vec<T>`.
    pub fn returns_list<T: Mapped>(mut self) -> Self {
        self.returns = Some(ReturnShape::rows::<T>("list", false, finish_list::<T>));
        self
    }

    /// A lazy [`ResultIter<T>`]. A handle opened for the call lives as long
    /// as the iterator.
    pub fn returns_iter<T: Mapped>(mut self) -> Self {
        self.returns = Some(ReturnShape::rows::<T>("iter", true, finish_iter::<T>));
        self
    }

    pub fn returns_void(mut self) -> Self {
        self.returns = Some(ReturnShape::plain("void", finish_void));
        self
    }

    pub fn returns_update_count(mut self) -> Self {
        self.returns = Some(ReturnShape::plain("update count", finish_update_count));
        self
    }

    pub fn returns_out_parameters(mut self) -> Self {
        self.returns = Some(ReturnShape::plain("out parameters", finish_out_parameters));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn declared_sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    pub fn out_parameters(&self) -> &[(ParamKey, SqlType)] {
        &self.out_parameters
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    /// The declared shape, or the natural one for updates and calls.
    pub fn return_shape(&self) -> Option<ReturnShape> {
        self.returns.clone().or_else(|| match self.kind {
            StatementKind::Query => None,
            StatementKind::Update => {
                Some(ReturnShape::plain("update count", finish_update_count))
            }
            StatementKind::Call => {
                Some(ReturnShape::plain("out parameters", finish_out_parameters))
            }
        })
    }
}

/// An abstract data-access interface: its methods, its own metadata, and
/// the interfaces it extends.
#[derive(Debug)]
pub struct InterfaceDescriptor {
    name: String,
    parents: Vec<Arc<InterfaceDescriptor>>,
    metadata: Vec<Metadata>,
    methods: Vec<MethodDescriptor>,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            metadata: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: &Arc<InterfaceDescriptor>) -> Self {
        self.parents.push(Arc::clone(parent));
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.push(metadata);
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parents(&self) -> &[Arc<InterfaceDescriptor>] {
        &self.parents
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Every supertype, breadth-first, nearest first. An interface reached
    /// through more than one path is listed once, at its nearest depth.
    pub fn ancestors(&self) -> Vec<&InterfaceDescriptor> {
        let mut seen: HashSet<*const InterfaceDescriptor> = HashSet::new();
        let mut ordered: Vec<&InterfaceDescriptor> = Vec::new();
        let mut cursor = 0;

        for parent in &self.parents {
            if seen.insert(Arc::as_ptr(parent)) {
                ordered.push(parent.as_ref());
            }
        }
        while cursor < ordered.len() {
            let current = ordered[cursor];
            cursor += 1;
            for parent in &current.parents {
                if seen.insert(Arc::as_ptr(parent)) {
                    ordered.push(parent.as_ref());
                }
            }
        }
        ordered
    }

    /// The nearest declaration of `name` and the interface declaring it.
    pub fn find_method(&self, name: &str) -> Option<(&InterfaceDescriptor, &MethodDescriptor)> {
        std::iter::once(self)
            .chain(self.ancestors())
            .find_map(|iface| {
                iface
                    .methods
                    .iter()
                    .find(|m| m.name == name)
                    .map(|m| (iface, m))
            })
    }

    /// Names of every method callable through this interface.
    pub fn method_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        std::iter::once(self)
            .chain(self.ancestors())
            .flat_map(|iface| iface.methods.iter().map(|m| m.name.as_str()))
            .filter(|name| seen.insert(*name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Arc<InterfaceDescriptor> {
        let root = InterfaceDescriptor::new("Root")
            .method(MethodDescriptor::update("shared").sql("DELETE FROM root"))
            .build();
        let left = InterfaceDescriptor::new("Left").extends(&root).build();
        let right = InterfaceDescriptor::new("Right")
            .extends(&root)
            .method(MethodDescriptor::update("shared").sql("DELETE FROM right"))
            .build();
        InterfaceDescriptor::new("Bottom")
            .extends(&left)
            .extends(&right)
            .build()
    }

    #[test]
    fn test_ancestors_breadth_first_without_duplicates() {
        let bottom = diamond();
        let names: Vec<&str> = bottom.ancestors().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["Left", "Right", "Root"]);
    }

    #[test]
    fn test_nearest_method_declaration_wins() {
        let bottom = diamond();
        let (declaring, method) = bottom.find_method("shared").unwrap();
        assert_eq!(declaring.name(), "Right");
        assert_eq!(method.declared_sql(), Some("DELETE FROM right"));
        assert_eq!(bottom.method_names(), vec!["shared"]);
    }

    #[test]
    fn test_param_keys() {
        assert_eq!(ParamDescriptor::named("id").key(0), ParamKey::from("id"));
        assert_eq!(ParamDescriptor::positional().key(1), ParamKey::Position(2));
    }

    #[test]
    fn test_default_return_shapes() {
        assert!(MethodDescriptor::query("q").return_shape().is_none());
        assert_eq!(
            MethodDescriptor::update("u").return_shape().unwrap().description(),
            "update count"
        );
        assert_eq!(
            MethodDescriptor::call("c").return_shape().unwrap().description(),
            "out parameters"
        );
    }
}
