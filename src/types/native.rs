use std::any::Any;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};

use crate::error::{Result, SqlBindError};
use crate::types::{ColumnRef, QualifiedType, SqlValue, TypeDescriptor};

/// An erased native value produced by a column or row mapper.
pub type Native = Box<dyn Any + Send>;

/// A native value that can be bound as a statement argument.
///
/// Conversion to a [`SqlValue`] happens at execution time through the
/// argument resolution chain, keyed by [`Bindable::type_descriptor`] plus the
/// qualifiers declared for the parameter.
pub trait Bindable: Any + Send + Sync + fmt::Debug {
    fn type_descriptor(&self) -> TypeDescriptor;

    fn as_any(&self) -> &dyn Any;

    /// For optional values: the inner value, or `None` when absent.
    fn optional_value(&self) -> Option<&dyn Bindable> {
        None
    }

    /// For containers: the elements in iteration order.
    fn elements(&self) -> Vec<&dyn Bindable> {
        Vec::new()
    }
}

/// Builds an argument list for positional binding.
///
/// ```ignore
/// handle.execute("INSERT INTO t VALUES (?, ?)", args![1i32, "a".to_string()]).await?;
/// ```
#[macro_export]
macro_rules! args {
    ($($value:expr),* $(,)?) => {
        vec![$(::std::sync::Arc::new($value) as ::std::sync::Arc<dyn $crate::types::Bindable>),*]
    };
}

/// Implements [`Bindable`] for plain scalar types.
#[macro_export]
macro_rules! impl_bindable {
    ($($t:ty),* $(,)?) => {$(
        impl $crate::types::Bindable for $t {
            fn type_descriptor(&self) -> $crate::types::TypeDescriptor {
                $crate::types::TypeDescriptor::of::<$t>()
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    )*};
}

impl_bindable!(bool, i16, i32, i64, f32, f64, String, DateTime<Utc>, SqlValue);

impl<T: Bindable> Bindable for Option<T> {
    fn type_descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::optional::<Option<T>>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn optional_value(&self) -> Option<&dyn Bindable> {
        self.as_ref().map(|v| v as &dyn Bindable)
    }
}

impl<T: Bindable> Bindable for Vec<T> {
    fn type_descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::container::<Vec<T>>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn elements(&self) -> Vec<&dyn Bindable> {
        self.iter().map(|v| v as &dyn Bindable).collect()
    }
}

impl<T: Bindable + Eq + Hash> Bindable for HashSet<T> {
    fn type_descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::container::<HashSet<T>>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn elements(&self) -> Vec<&dyn Bindable> {
        self.iter().map(|v| v as &dyn Bindable).collect()
    }
}

impl<T: Bindable + Ord> Bindable for BTreeSet<T> {
    fn type_descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::container::<BTreeSet<T>>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn elements(&self) -> Vec<&dyn Bindable> {
        self.iter().map(|v| v as &dyn Bindable).collect()
    }
}

/// What a typed extraction needs to know about the column it reads.
#[derive(Debug, Clone)]
pub struct MappingContext<'a> {
    pub column: &'a ColumnRef,
    pub coalesce_null_primitives: bool,
}

/// A native type that can be produced from a mapped result value.
///
/// `None` stands for SQL NULL. The default implementation rejects NULL and
/// downcasts the mapper output, which is what user row types want:
///
/// ```ignore
/// impl Mapped for Character {}
/// ```
pub trait Mapped: Any + Send + Sized {
    /// The key used to resolve a mapper for this type.
    fn qualified_type() -> QualifiedType {
        QualifiedType::of::<Self>()
    }

    fn from_native(native: Option<Native>, ctx: &MappingContext<'_>) -> Result<Self> {
        match native {
            Some(value) => downcast_native(value, ctx.column),
            None => Err(SqlBindError::ResultProduction {
                index: ctx.column.index,
                label: ctx.column.label.clone(),
                message: format!(
                    "NULL cannot be mapped to non-optional {}",
                    std::any::type_name::<Self>()
                ),
            }),
        }
    }
}

/// Recovers a concrete type from a mapper's erased output.
pub fn downcast_native<T: Any>(value: Native, column: &ColumnRef) -> Result<T> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| SqlBindError::ResultProduction {
            index: column.index,
            label: column.label.clone(),
            message: format!("mapper did not produce a {}", std::any::type_name::<T>()),
        })
}

macro_rules! impl_mapped_primitive {
    ($($t:ty),* $(,)?) => {$(
        impl Mapped for $t {
            fn from_native(native: Option<Native>, ctx: &MappingContext<'_>) -> Result<Self> {
                match native {
                    Some(value) => downcast_native(value, ctx.column),
                    None if ctx.coalesce_null_primitives => Ok(<$t>::default()),
                    None => Err(SqlBindError::ResultProduction {
                        index: ctx.column.index,
                        label: ctx.column.label.clone(),
                        message: format!(
                            "Database null values are not allowed for primitives ({})",
                            stringify!($t)
                        ),
                    }),
                }
            }
        }
    )*};
}

impl_mapped_primitive!(bool, i16, i32, i64, f32, f64);

impl Mapped for String {}
impl Mapped for DateTime<Utc> {}
impl Mapped for SqlValue {
    fn from_native(native: Option<Native>, ctx: &MappingContext<'_>) -> Result<Self> {
        match native {
            Some(value) => downcast_native(value, ctx.column),
            None => Ok(SqlValue::Null),
        }
    }
}

impl<T: Mapped> Mapped for Option<T> {
    fn qualified_type() -> QualifiedType {
        T::qualified_type()
    }

    fn from_native(native: Option<Native>, ctx: &MappingContext<'_>) -> Result<Self> {
        match native {
            Some(value) => T::from_native(Some(value), ctx).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeShape;

    fn ctx(column: &ColumnRef, coalesce: bool) -> MappingContext<'_> {
        MappingContext {
            column,
            coalesce_null_primitives: coalesce,
        }
    }

    #[test]
    fn test_option_descriptor_and_inner_value() {
        let present: Option<i32> = Some(4);
        let absent: Option<i32> = None;

        assert_eq!(present.type_descriptor().shape(), TypeShape::Optional);
        assert!(present.optional_value().is_some());
        assert!(absent.optional_value().is_none());
    }

    #[test]
    fn test_containers_expose_elements() {
        let values = vec![1i32, 2, 3];
        assert!(values.type_descriptor().is_container());
        assert_eq!(values.elements().len(), 3);
    }

    #[test]
    fn test_null_primitive_coalesces_when_enabled() {
        let column = ColumnRef::new(1, "foo");
        assert_eq!(i32::from_native(None, &ctx(&column, true)).unwrap(), 0);
        assert!(!bool::from_native(None, &ctx(&column, true)).unwrap());
    }

    #[test]
    fn test_null_primitive_fails_when_disabled() {
        let column = ColumnRef::new(1, "FOO");
        let err = i32::from_native(None, &ctx(&column, false)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Database null values are not allowed for primitives"));
        assert!(message.contains("column 1 (FOO)"));
    }

    #[test]
    fn test_null_into_option_is_absent_regardless_of_policy() {
        let column = ColumnRef::new(1, "foo");
        assert_eq!(Option::<i32>::from_native(None, &ctx(&column, false)).unwrap(), None);
        assert_eq!(Option::<i32>::from_native(None, &ctx(&column, true)).unwrap(), None);
    }

    #[test]
    fn test_null_into_string_always_fails() {
        let column = ColumnRef::new(2, "name");
        assert!(String::from_native(None, &ctx(&column, true)).is_err());
    }
}
