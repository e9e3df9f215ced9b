//! Declarative data-access interfaces.
//!
//! An [`InterfaceDescriptor`] lists methods with their SQL, parameters and
//! return shapes, plus metadata that may be declared on a method, on its
//! interface, or on any ancestor interface. Each method is compiled once
//! into a [`CompiledPipeline`]; a [`SqlObject`] dispatches calls to them.

mod descriptor;
mod invoker;
mod metadata;
mod pipeline;

pub use descriptor::{
    BindFields, BindMode, FieldExtractor, InterfaceDescriptor, MethodDescriptor, ParamDescriptor,
    ReturnShape, ReturnValue, StatementKind,
};
pub use invoker::{DispatchTable, SqlObject};
pub use metadata::{merge, Metadata, MetadataKey, StatementCustomizer};
pub use pipeline::{compile, metadata_levels, CompiledPipeline, Handler, InvocationState, Outcome};
