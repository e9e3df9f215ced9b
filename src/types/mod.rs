mod native;
mod qualified_type;
mod row;
mod sql_value;

pub use native::{downcast_native, Bindable, Mapped, MappingContext, Native};
pub use qualified_type::{QualifiedType, Qualifier, QualifierSet, TypeDescriptor, TypeShape};
pub use row::{ColumnRef, RawQueryResult, Row};
pub use sql_value::{SqlType, SqlValue};
