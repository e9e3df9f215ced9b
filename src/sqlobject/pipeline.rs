//! Compilation of a method into a fixed handler pipeline, and its execution.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, SqlBindError};
use crate::handle::Handle;
use crate::sqlobject::descriptor::Produced;
use crate::sqlobject::{
    merge, BindMode, InterfaceDescriptor, Metadata, ParamDescriptor, ReturnShape, ReturnValue,
    StatementCustomizer,
};
use crate::statement::{
    execute, ExecutionMode, ExecutionResult, ParamKey, SqlStatements, StatementContext,
};
use crate::types::{Bindable, SqlType};

/// Per-call state threaded through the handlers.
pub struct InvocationState<'a> {
    method: &'a str,
    args: &'a [Arc<dyn Bindable>],
    pub ctx: StatementContext,
}

impl<'a> InvocationState<'a> {
    pub fn method(&self) -> &str {
        self.method
    }

    pub fn args(&self) -> &[Arc<dyn Bindable>] {
        self.args
    }
}

/// What a call has produced so far.
pub enum Outcome {
    Executed {
        result: ExecutionResult,
        scope: Option<Handle>,
    },
    Returned(ReturnValue),
}

/// One step of a compiled pipeline.
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    fn before(&self, _state: &mut InvocationState<'_>) -> Result<()> {
        Ok(())
    }

    fn after(&self, _state: &mut InvocationState<'_>, outcome: Outcome) -> Result<Outcome> {
        Ok(outcome)
    }
}

struct ConfigHandler {
    items: Vec<Metadata>,
}

impl Handler for ConfigHandler {
    fn name(&self) -> &'static str {
        "config"
    }

    fn before(&self, state: &mut InvocationState<'_>) -> Result<()> {
        for item in &self.items {
            item.apply_config(state.ctx.config_mut());
        }
        Ok(())
    }
}

struct SqlHandler {
    declared: Option<String>,
}

impl Handler for SqlHandler {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn before(&self, state: &mut InvocationState<'_>) -> Result<()> {
        let statements = state.ctx.config().get::<SqlStatements>();
        let sql = statements
            .locator()
            .locate(state.method, self.declared.as_deref(), state.ctx.config())?;
        state.ctx.set_template(sql);
        Ok(())
    }
}

struct BindHandler {
    index: usize,
    param: ParamDescriptor,
}

impl Handler for BindHandler {
    fn name(&self) -> &'static str {
        "bind"
    }

    fn before(&self, state: &mut InvocationState<'_>) -> Result<()> {
        let value = Arc::clone(&state.args[self.index]);
        let qualifiers = self.param.qualifiers().clone();

        match self.param.mode() {
            BindMode::Value => {
                state
                    .ctx
                    .bind_qualified(self.param.key(self.index), value, qualifiers);
            }
            BindMode::Fields(extract) => {
                let fields = extract(value.as_ref()).ok_or_else(|| {
                    SqlBindError::usage(format!(
                        "argument {} of {} does not expose bindable fields",
                        self.index + 1,
                        state.method
                    ))
                })?;
                for (name, field) in fields {
                    state.ctx.bind_qualified(name, field, qualifiers.clone());
                }
            }
        }
        Ok(())
    }
}

struct OutParameterHandler {
    parameters: Vec<(ParamKey, SqlType)>,
}

impl Handler for OutParameterHandler {
    fn name(&self) -> &'static str {
        "out-parameters"
    }

    fn before(&self, state: &mut InvocationState<'_>) -> Result<()> {
        for (key, sql_type) in &self.parameters {
            state.ctx.register_out_parameter(key.clone(), *sql_type);
        }
        Ok(())
    }
}

struct CustomizerHandler {
    customizer: Arc<dyn StatementCustomizer>,
}

impl Handler for CustomizerHandler {
    fn name(&self) -> &'static str {
        "customizer"
    }

    fn before(&self, state: &mut InvocationState<'_>) -> Result<()> {
        self.customizer.before_execution(&mut state.ctx)
    }
}

struct ResultHandler {
    shape: ReturnShape,
}

impl Handler for ResultHandler {
    fn name(&self) -> &'static str {
        "result"
    }

    fn after(&self, state: &mut InvocationState<'_>, outcome: Outcome) -> Result<Outcome> {
        match outcome {
            Outcome::Executed { result, scope } => self
                .shape
                .finish(Produced {
                    result,
                    config: state.ctx.take_config(),
                    qualified_type: self.shape.qualified_type(),
                    scope,
                })
                .map(Outcome::Returned),
            returned => Ok(returned),
        }
    }
}

/// The handle a call runs on.
pub(crate) enum Scope<'a> {
    /// Opened for this call and released when the call ends, or handed to
    /// the lazy result that outlives it.
    Owned(Handle),
    Borrowed(&'a mut Handle),
}

impl Scope<'_> {
    fn handle_mut(&mut self) -> &mut Handle {
        match self {
            Scope::Owned(handle) => handle,
            Scope::Borrowed(handle) => handle,
        }
    }

    fn detach(self) -> Option<Handle> {
        match self {
            Scope::Owned(handle) => Some(handle),
            Scope::Borrowed(_) => None,
        }
    }
}

/// A method compiled once into an ordered handler sequence.
pub struct CompiledPipeline {
    interface: String,
    method: String,
    mode: ExecutionMode,
    arity: usize,
    shape: ReturnShape,
    handlers: Vec<Box<dyn Handler>>,
}

impl CompiledPipeline {
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn return_shape(&self) -> &ReturnShape {
        &self.shape
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) async fn run(
        &self,
        mut scope: Scope<'_>,
        args: &[Arc<dyn Bindable>],
    ) -> Result<ReturnValue> {
        if args.len() != self.arity {
            return Err(SqlBindError::usage(format!(
                "{}.{} takes {} arguments, got {}",
                self.interface,
                self.method,
                self.arity,
                args.len()
            )));
        }

        let config = scope.handle_mut().config().fork();
        let mut state = InvocationState {
            method: &self.method,
            args,
            ctx: StatementContext::new("", config),
        };
        state.ctx.define("method", self.method.clone());

        for handler in &self.handlers {
            handler.before(&mut state)?;
        }

        let connection = scope.handle_mut().connection_mut()?;
        let result = execute(connection, &state.ctx, self.mode).await?;

        let scope = if self.shape.holds_scope() {
            scope.detach()
        } else {
            None
        };
        let mut outcome = Outcome::Executed { result, scope };
        for handler in &self.handlers {
            outcome = handler.after(&mut state, outcome)?;
        }

        match outcome {
            Outcome::Returned(value) => Ok(value),
            Outcome::Executed { .. } => Err(SqlBindError::usage(format!(
                "{}.{} produced no return value",
                self.interface, self.method
            ))),
        }
    }
}

impl std::fmt::Debug for CompiledPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPipeline")
            .field("interface", &self.interface)
            .field("method", &self.method)
            .field("handlers", &self.handler_names())
            .field("returns", &self.shape)
            .finish()
    }
}

/// Metadata for `method` as seen through `interface`, nearest level first:
/// the method, its declaring interface, then `interface` and its ancestors.
pub fn metadata_levels<'a>(
    interface: &'a InterfaceDescriptor,
    declaring: &'a InterfaceDescriptor,
    method: &'a [Metadata],
) -> Vec<&'a [Metadata]> {
    let mut levels = vec![method, declaring.metadata()];
    levels.extend(
        std::iter::once(interface)
            .chain(interface.ancestors())
            .filter(|iface| !std::ptr::eq(*iface, declaring))
            .map(InterfaceDescriptor::metadata),
    );
    levels
}

/// Builds the pipeline for `method` on `interface`.
pub fn compile(interface: &InterfaceDescriptor, method: &str) -> Result<CompiledPipeline> {
    let (declaring, descriptor) = interface.find_method(method).ok_or_else(|| {
        SqlBindError::usage(format!("{} has no method {}", interface.name(), method))
    })?;
    let shape = descriptor.return_shape().ok_or_else(|| {
        SqlBindError::usage(format!(
            "{}.{} is a query but declares no result shape",
            interface.name(),
            method
        ))
    })?;

    let merged = merge(&metadata_levels(interface, declaring, descriptor.metadata()));
    let (customizers, config_items): (Vec<_>, Vec<_>) = merged
        .into_iter()
        .partition(|m| matches!(m, Metadata::Customizer(_)));

    let mut handlers: Vec<Box<dyn Handler>> = Vec::new();
    if !config_items.is_empty() {
        handlers.push(Box::new(ConfigHandler {
            items: config_items,
        }));
    }
    handlers.push(Box::new(SqlHandler {
        declared: descriptor.declared_sql().map(str::to_string),
    }));
    for (index, param) in descriptor.params().iter().enumerate() {
        handlers.push(Box::new(BindHandler {
            index,
            param: param.clone(),
        }));
    }
    if !descriptor.out_parameters().is_empty() {
        handlers.push(Box::new(OutParameterHandler {
            parameters: descriptor.out_parameters().to_vec(),
        }));
    }
    for item in customizers {
        if let Metadata::Customizer(customizer) = item {
            handlers.push(Box::new(CustomizerHandler { customizer }));
        }
    }
    handlers.push(Box::new(ResultHandler {
        shape: shape.clone(),
    }));

    debug!(
        interface = interface.name(),
        method,
        handlers = handlers.len(),
        "compiled pipeline"
    );

    Ok(CompiledPipeline {
        interface: interface.name().to_string(),
        method: method.to_string(),
        mode: descriptor.kind().mode(),
        arity: descriptor.params().len(),
        shape,
        handlers,
    })
}
