use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::SqlBind;
use crate::error::{Result, SqlBindError};
use crate::handle::Handle;
use crate::sqlobject::pipeline::Scope;
use crate::sqlobject::{compile, CompiledPipeline, InterfaceDescriptor};
use crate::types::Bindable;

/// Every method of an interface, each compiled to its pipeline.
pub struct DispatchTable {
    interface: Arc<InterfaceDescriptor>,
    pipelines: HashMap<String, Arc<CompiledPipeline>>,
}

impl DispatchTable {
    pub fn compile(interface: &Arc<InterfaceDescriptor>) -> Result<Self> {
        let pipelines = interface
            .method_names()
            .into_iter()
            .map(|name| Ok((name.to_string(), Arc::new(compile(interface, name)?))))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            interface: Arc::clone(interface),
            pipelines,
        })
    }

    pub fn interface(&self) -> &Arc<InterfaceDescriptor> {
        &self.interface
    }

    pub fn get(&self, method: &str) -> Option<&Arc<CompiledPipeline>> {
        self.pipelines.get(method)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[derive(Clone)]
enum Lifecycle {
    /// A fresh handle per call.
    OnDemand(SqlBind),
    /// One shared handle, usable by a single call at a time.
    Attached(Arc<Mutex<Handle>>),
}

/// A callable instance of a data-access interface.
///
/// On-demand objects are cheap to clone and safe to share across tasks:
/// every call runs on its own handle. Attached objects run on one handle;
/// a call made while another is in flight fails with a usage error.
#[derive(Clone)]
pub struct SqlObject {
    table: Arc<DispatchTable>,
    lifecycle: Lifecycle,
}

impl SqlObject {
    pub(crate) fn on_demand(table: Arc<DispatchTable>, source: SqlBind) -> Self {
        Self {
            table,
            lifecycle: Lifecycle::OnDemand(source),
        }
    }

    pub(crate) fn attached(table: Arc<DispatchTable>, handle: Arc<Mutex<Handle>>) -> Self {
        Self {
            table,
            lifecycle: Lifecycle::Attached(handle),
        }
    }

    pub fn interface(&self) -> &Arc<InterfaceDescriptor> {
        self.table.interface()
    }

    pub fn pipeline(&self, method: &str) -> Option<&Arc<CompiledPipeline>> {
        self.table.get(method)
    }

    /// The shared handle of an attached object.
    pub fn handle(&self) -> Option<&Arc<Mutex<Handle>>> {
        match &self.lifecycle {
            Lifecycle::Attached(handle) => Some(handle),
            Lifecycle::OnDemand(_) => None,
        }
    }

    /// Calls `method` with `args` and downcasts its return value to `R`.
    ///
    /// # Example
    /// ```ignore
    /// let name: String = dao.invoke("reversed", args!["what".to_string()]).await?;
    /// ```
    pub async fn invoke<R: Any>(&self, method: &str, args: Vec<Arc<dyn Bindable>>) -> Result<R> {
        let pipeline = self.table.get(method).ok_or_else(|| {
            SqlBindError::usage(format!(
                "{} has no method {}",
                self.table.interface().name(),
                method
            ))
        })?;

        let value = match &self.lifecycle {
            Lifecycle::OnDemand(source) => {
                let handle = source.open().await?;
                pipeline.run(Scope::Owned(handle), &args).await?
            }
            Lifecycle::Attached(handle) => {
                let mut guard = handle.try_lock().map_err(|_| {
                    SqlBindError::usage("attached handle is already in use")
                })?;
                pipeline.run(Scope::Borrowed(&mut *guard), &args).await?
            }
        };

        value.downcast::<R>().map(|boxed| *boxed).map_err(|_| {
            SqlBindError::usage(format!(
                "{}.{} returns {:?}, not {}",
                pipeline.interface(),
                method,
                pipeline.return_shape(),
                std::any::type_name::<R>()
            ))
        })
    }
}

impl std::fmt::Debug for SqlObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lifecycle = match self.lifecycle {
            Lifecycle::OnDemand(_) => "on-demand",
            Lifecycle::Attached(_) => "attached",
        };
        f.debug_struct("SqlObject")
            .field("interface", &self.table.interface().name())
            .field("lifecycle", &lifecycle)
            .finish()
    }
}
