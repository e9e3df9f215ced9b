use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::argument::{Argument, ArgumentContext};
use crate::config::ConfigRegistry;
use crate::error::Result;
use crate::resolution::ConverterFactory;
use crate::types::{Bindable, QualifiedType, Qualifier, QualifierSet, SqlValue, TypeShape};

/// Binds values of exactly type `T` with a conversion function.
///
/// ```ignore
/// let reversed = TypedArgumentFactory::new(|s: &String| SqlValue::Text(s.chars().rev().collect()))
///     .qualified(Qualifier::tag("reversed"));
/// ```
pub struct TypedArgumentFactory<T, F> {
    argument: Arc<TypedArgument<T, F>>,
    qualifiers: QualifierSet,
}

struct TypedArgument<T, F> {
    convert: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> TypedArgumentFactory<T, F>
where
    T: Any,
    F: Fn(&T) -> SqlValue + Send + Sync + 'static,
{
    pub fn new(convert: F) -> Self {
        Self {
            argument: Arc::new(TypedArgument {
                convert,
                _marker: PhantomData,
            }),
            qualifiers: QualifierSet::new(),
        }
    }

    /// Restricts this factory to values carrying `qualifier`.
    pub fn qualified(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.insert(qualifier);
        self
    }
}

impl<T, F> Argument for TypedArgument<T, F>
where
    T: Any,
    F: Fn(&T) -> SqlValue + Send + Sync + 'static,
{
    fn apply(
        &self,
        value: &dyn Bindable,
        _qualified_type: &QualifiedType,
        ctx: &ArgumentContext<'_>,
    ) -> Result<SqlValue> {
        value
            .as_any()
            .downcast_ref::<T>()
            .map(&self.convert)
            .ok_or_else(|| {
                ctx.error(format!(
                    "expected {} but got {}",
                    std::any::type_name::<T>(),
                    value.type_descriptor().name()
                ))
            })
    }
}

impl<T, F> ConverterFactory<dyn Argument> for TypedArgumentFactory<T, F>
where
    T: Any,
    F: Fn(&T) -> SqlValue + Send + Sync + 'static,
{
    fn accepts(&self, qualified_type: &QualifiedType) -> bool {
        qualified_type.raw().is::<T>()
    }

    fn build(&self, _: &QualifiedType, _: &ConfigRegistry) -> Option<Arc<dyn Argument>> {
        Some(self.argument.clone() as Arc<dyn Argument>)
    }

    fn qualifiers(&self) -> QualifierSet {
        self.qualifiers.clone()
    }
}

/// Binds `Option<T>`: absent values become NULL, present ones go back through
/// the chain with the same qualifiers.
pub struct OptionalArgumentFactory;

struct OptionalArgument;

impl Argument for OptionalArgument {
    fn apply(
        &self,
        value: &dyn Bindable,
        qualified_type: &QualifiedType,
        ctx: &ArgumentContext<'_>,
    ) -> Result<SqlValue> {
        match value.optional_value() {
            Some(inner) => ctx.convert(inner, qualified_type.qualifiers()),
            None => Ok(SqlValue::Null),
        }
    }
}

impl ConverterFactory<dyn Argument> for OptionalArgumentFactory {
    fn accepts(&self, qualified_type: &QualifiedType) -> bool {
        qualified_type.raw().shape() == TypeShape::Optional
    }

    fn build(&self, _: &QualifiedType, _: &ConfigRegistry) -> Option<Arc<dyn Argument>> {
        Some(Arc::new(OptionalArgument))
    }

    fn ignores_qualifiers(&self) -> bool {
        true
    }
}

/// Binds collections as SQL arrays of the declared element type.
pub struct ContainerArgumentFactory;

struct ContainerArgument;

impl Argument for ContainerArgument {
    fn apply(
        &self,
        value: &dyn Bindable,
        qualified_type: &QualifiedType,
        ctx: &ArgumentContext<'_>,
    ) -> Result<SqlValue> {
        let Some(element_type) = qualified_type.element_type() else {
            return Err(ctx.error("container bound without an element type"));
        };
        let element_qualifiers = qualified_type.qualifiers().without_element_type();

        let values = value
            .elements()
            .into_iter()
            .map(|element| {
                let converted = ctx.convert(element, &element_qualifiers)?;
                match converted.sql_type() {
                    Some(actual) if actual != element_type => Err(ctx.error(format!(
                        "array element of type {} does not match declared element type {}",
                        actual, element_type
                    ))),
                    _ => Ok(converted),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SqlValue::Array {
            element_type,
            values,
        })
    }
}

impl ConverterFactory<dyn Argument> for ContainerArgumentFactory {
    fn accepts(&self, qualified_type: &QualifiedType) -> bool {
        qualified_type.raw().is_container() && qualified_type.element_type().is_some()
    }

    fn build(&self, _: &QualifiedType, _: &ConfigRegistry) -> Option<Arc<dyn Argument>> {
        Some(Arc::new(ContainerArgument))
    }

    fn ignores_qualifiers(&self) -> bool {
        true
    }
}
