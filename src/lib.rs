//! sqlbind - Typed SQL argument binding, result mapping and declarative
//! data-access interfaces over a pluggable driver
//!
//! # Example
//! ```ignore
//! use sqlbind::{args, SqlBind, SqlStatement};
//! use sqlbind::sqlobject::{InterfaceDescriptor, MethodDescriptor};
//!
//! // Client for the database; connections open per handle
//! let db = SqlBind::connect("postgres://localhost/mydb").await?;
//!
//! // Fluent statements on a handle
//! let mut handle = db.open().await?;
//! let name: String = handle
//!     .create_query("SELECT name FROM something WHERE id = :id")
//!     .bind("id", 1i32)
//!     .map_to::<String>()
//!     .one()
//!     .await?;
//!
//! // Declarative interfaces
//! let dao = InterfaceDescriptor::new("SomethingDao")
//!     .method(
//!         MethodDescriptor::query("findName")
//!             .sql("SELECT name FROM something WHERE id = :id")
//!             .bind("id")
//!             .returns_optional::<String>(),
//!     )
//!     .build();
//! let dao = db.on_demand(&dao)?;
//! let name: Option<String> = dao.invoke("findName", args![1i32]).await?;
//! ```

pub mod argument;
pub mod config;
pub mod drivers;
pub mod error;
pub mod mapper;
pub mod resolution;
pub mod sqlobject;
pub mod statement;
pub mod traits;
pub mod types;

mod client;
mod handle;
mod plugin;

// Re-export main types for convenient access
pub use client::SqlBind;
pub use config::{Config, ConfigRegistry};
pub use error::{ErrorKind, Result, SqlBindError};
pub use handle::Handle;
pub use plugin::{ConnectionResult, Plugin};
pub use sqlobject::SqlObject;
pub use statement::{OutParameters, ParamKey, SqlStatement};
pub use traits::{Connection, DatabaseDriver};
pub use types::{
    Bindable, Mapped, QualifiedType, Qualifier, QualifierSet, RawQueryResult, Row, SqlType,
    SqlValue,
};
