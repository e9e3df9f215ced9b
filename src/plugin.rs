use crate::config::ConfigRegistry;
use crate::error::{Result, SqlBindError};
use crate::handle::Handle;
use crate::traits::Connection;

/// Outcome of [`Plugin::customize_connection`]. A rejection hands the
/// connection back so it is returned to the driver.
pub type ConnectionResult =
    std::result::Result<Box<dyn Connection>, (Box<dyn Connection>, SqlBindError)>;

/// Extension installed on a [`SqlBind`](crate::SqlBind).
///
/// Every hook defaults to a no-op. `customize_config` runs once, at install
/// time; the other two run for every newly opened handle, in installation
/// order, connection first.
pub trait Plugin: Send + Sync {
    fn customize_config(&self, _config: &mut ConfigRegistry) -> Result<()> {
        Ok(())
    }

    /// May wrap or replace the connection before a handle is built around it.
    fn customize_connection(&self, connection: Box<dyn Connection>) -> ConnectionResult {
        Ok(connection)
    }

    /// May wrap, reconfigure or replace the handle.
    fn customize_handle(&self, handle: Handle) -> Result<Handle> {
        Ok(handle)
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
