use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use crate::types::SqlType;

/// How a native type carries its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeShape {
    Scalar,
    /// `Option<T>`; the inner value is bound or mapped by `T`'s converter.
    Optional,
    /// A collection whose element SQL type must be declared with
    /// [`Qualifier::ElementType`] before it can be bound.
    Container,
}

/// Identifies a native Rust type for converter lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
    shape: TypeShape,
}

impl TypeDescriptor {
    pub fn of<T: Any>() -> Self {
        Self::with_shape::<T>(TypeShape::Scalar)
    }

    pub fn optional<T: Any>() -> Self {
        Self::with_shape::<T>(TypeShape::Optional)
    }

    pub fn container<T: Any>() -> Self {
        Self::with_shape::<T>(TypeShape::Container)
    }

    fn with_shape<T: Any>(shape: TypeShape) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            shape,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> TypeShape {
        self.shape
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    pub fn is_container(&self) -> bool {
        self.shape == TypeShape::Container
    }
}

/// A semantic tag on a value that selects a different converter without
/// changing the storage type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Qualifier {
    Tag(Cow<'static, str>),
    /// Element SQL type for container bindings.
    ElementType(SqlType),
}

impl Qualifier {
    pub fn tag(name: impl Into<Cow<'static, str>>) -> Self {
        Qualifier::Tag(name.into())
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Tag(name) => write!(f, "@{}", name),
            Qualifier::ElementType(t) => write!(f, "@element({})", t),
        }
    }
}

/// An unordered, duplicate-free set of qualifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QualifierSet(BTreeSet<Qualifier>);

impl QualifierSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, qualifier: Qualifier) -> bool {
        self.0.insert(qualifier)
    }

    pub fn with(mut self, qualifier: Qualifier) -> Self {
        self.0.insert(qualifier);
        self
    }

    pub fn contains(&self, qualifier: &Qualifier) -> bool {
        self.0.contains(qualifier)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Qualifier> {
        self.0.iter()
    }

    /// The declared container element type, if any.
    pub fn element_type(&self) -> Option<SqlType> {
        self.0.iter().find_map(|q| match q {
            Qualifier::ElementType(t) => Some(*t),
            Qualifier::Tag(_) => None,
        })
    }

    /// The qualifiers that apply to each element of a container.
    pub fn without_element_type(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|q| !matches!(q, Qualifier::ElementType(_)))
                .cloned()
                .collect(),
        )
    }
}

impl FromIterator<Qualifier> for QualifierSet {
    fn from_iter<I: IntoIterator<Item = Qualifier>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for QualifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, q) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", q)?;
        }
        Ok(())
    }
}

/// A raw type paired with its qualifiers; the lookup key for every converter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedType {
    raw: TypeDescriptor,
    qualifiers: QualifierSet,
}

impl QualifiedType {
    pub fn new(raw: TypeDescriptor, qualifiers: QualifierSet) -> Self {
        Self { raw, qualifiers }
    }

    pub fn of<T: Any>() -> Self {
        Self::new(TypeDescriptor::of::<T>(), QualifierSet::new())
    }

    pub fn with(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.insert(qualifier);
        self
    }

    pub fn raw(&self) -> &TypeDescriptor {
        &self.raw
    }

    pub fn qualifiers(&self) -> &QualifierSet {
        &self.qualifiers
    }

    pub fn element_type(&self) -> Option<SqlType> {
        self.qualifiers.element_type()
    }
}

impl fmt::Display for QualifiedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.qualifiers.is_empty() {
            f.write_str(self.raw.name)
        } else {
            write!(f, "{} {}", self.qualifiers, self.raw.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_qualifiers_make_distinct_keys() {
        let plain = QualifiedType::of::<String>();
        let reversed = QualifiedType::of::<String>().with(Qualifier::tag("reversed"));

        assert_ne!(plain, reversed);

        let mut keys = HashSet::new();
        keys.insert(plain.clone());
        keys.insert(reversed.clone());
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_qualifier_set_ignores_order_and_duplicates() {
        let a: QualifierSet = vec![Qualifier::tag("a"), Qualifier::tag("b"), Qualifier::tag("a")]
            .into_iter()
            .collect();
        let b: QualifierSet = vec![Qualifier::tag("b"), Qualifier::tag("a")]
            .into_iter()
            .collect();

        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_element_type_is_split_off() {
        let set = QualifierSet::new()
            .with(Qualifier::ElementType(SqlType::Int4))
            .with(Qualifier::tag("x"));

        assert_eq!(set.element_type(), Some(SqlType::Int4));
        let rest = set.without_element_type();
        assert_eq!(rest.element_type(), None);
        assert!(rest.contains(&Qualifier::tag("x")));
    }
}
