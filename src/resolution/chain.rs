use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::config::ConfigRegistry;
use crate::types::{QualifiedType, QualifierSet};

/// A pluggable source of converters of kind `C`.
///
/// A factory serves exactly the qualifier set returned by [`qualifiers`]
/// (empty by default) unless it [`ignores_qualifiers`], in which case it is
/// consulted for any qualifier set, but only after every exact-match factory
/// has declined.
///
/// [`qualifiers`]: ConverterFactory::qualifiers
/// [`ignores_qualifiers`]: ConverterFactory::ignores_qualifiers
pub trait ConverterFactory<C: ?Sized>: Send + Sync {
    fn accepts(&self, qualified_type: &QualifiedType) -> bool;

    fn build(&self, qualified_type: &QualifiedType, config: &ConfigRegistry) -> Option<Arc<C>>;

    fn qualifiers(&self) -> QualifierSet {
        QualifierSet::new()
    }

    fn ignores_qualifiers(&self) -> bool {
        false
    }
}

/// An ordered list of factories for one converter kind, with a resolution cache.
///
/// Later registrations take precedence over earlier ones. Exact-qualifier
/// factories always take precedence over qualifier-ignoring ones.
pub struct ResolutionChain<C: ?Sized> {
    factories: Vec<Arc<dyn ConverterFactory<C>>>,
    cache: RwLock<HashMap<QualifiedType, Option<Arc<C>>>>,
}

impl<C: ?Sized> ResolutionChain<C> {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Appends a factory. Invalidates every cached resolution.
    pub fn register(&mut self, factory: Arc<dyn ConverterFactory<C>>) -> &mut Self {
        self.factories.push(factory);
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self
    }

    /// Finds the converter for `qualified_type`, caching hits and misses alike.
    pub fn resolve(
        &self,
        qualified_type: &QualifiedType,
        config: &ConfigRegistry,
    ) -> Option<Arc<C>> {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(qualified_type)
        {
            return cached.clone();
        }

        let resolved = self.scan(qualified_type, config);
        trace!(
            qualified_type = %qualified_type,
            found = resolved.is_some(),
            "resolution cache miss"
        );

        // Concurrent misses on the same key build equivalent converters; last writer wins.
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(qualified_type.clone(), resolved.clone());
        resolved
    }

    fn scan(&self, qualified_type: &QualifiedType, config: &ConfigRegistry) -> Option<Arc<C>> {
        let exact = self
            .factories
            .iter()
            .rev()
            .filter(|f| !f.ignores_qualifiers() && &f.qualifiers() == qualified_type.qualifiers())
            .filter(|f| f.accepts(qualified_type))
            .find_map(|f| f.build(qualified_type, config));

        exact.or_else(|| {
            self.factories
                .iter()
                .rev()
                .filter(|f| f.ignores_qualifiers())
                .filter(|f| f.accepts(qualified_type))
                .find_map(|f| f.build(qualified_type, config))
        })
    }

    /// A child chain sharing this chain's factories, with an empty cache.
    pub fn fork(&self) -> Self {
        Self {
            factories: self.factories.clone(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<C: ?Sized> Default for ResolutionChain<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> fmt::Debug for ResolutionChain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("ResolutionChain")
            .field("factories", &self.factories.len())
            .field("cached", &cached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Qualifier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Named {
        name: &'static str,
        qualifiers: QualifierSet,
        ignores_qualifiers: bool,
        builds: AtomicUsize,
    }

    impl Named {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                qualifiers: QualifierSet::new(),
                ignores_qualifiers: false,
                builds: AtomicUsize::new(0),
            }
        }

        fn qualified(mut self, qualifier: Qualifier) -> Self {
            self.qualifiers.insert(qualifier);
            self
        }

        fn ignoring_qualifiers(mut self) -> Self {
            self.ignores_qualifiers = true;
            self
        }
    }

    impl ConverterFactory<str> for Named {
        fn accepts(&self, qualified_type: &QualifiedType) -> bool {
            qualified_type.raw().is::<String>()
        }

        fn build(&self, _: &QualifiedType, _: &ConfigRegistry) -> Option<Arc<str>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Some(Arc::from(self.name))
        }

        fn qualifiers(&self) -> QualifierSet {
            self.qualifiers.clone()
        }

        fn ignores_qualifiers(&self) -> bool {
            self.ignores_qualifiers
        }
    }

    fn resolve(chain: &ResolutionChain<str>, qt: &QualifiedType) -> Option<String> {
        chain
            .resolve(qt, &ConfigRegistry::new())
            .map(|s| s.to_string())
    }

    #[test]
    fn test_most_recent_registration_wins() {
        let mut chain = ResolutionChain::<str>::new();
        chain.register(Arc::new(Named::new("first")));
        chain.register(Arc::new(Named::new("second")));

        assert_eq!(resolve(&chain, &QualifiedType::of::<String>()).as_deref(), Some("second"));
    }

    #[test]
    fn test_registration_after_resolve_invalidates_cache() {
        let mut chain = ResolutionChain::<str>::new();
        chain.register(Arc::new(Named::new("first")));
        let qt = QualifiedType::of::<String>();
        assert_eq!(resolve(&chain, &qt).as_deref(), Some("first"));

        chain.register(Arc::new(Named::new("second")));
        assert_eq!(resolve(&chain, &qt).as_deref(), Some("second"));
    }

    #[test]
    fn test_repeated_resolution_hits_cache() {
        let factory = Arc::new(Named::new("only"));
        let mut chain = ResolutionChain::<str>::new();
        chain.register(Arc::clone(&factory) as Arc<dyn ConverterFactory<str>>);

        let qt = QualifiedType::of::<String>();
        for _ in 0..5 {
            resolve(&chain, &qt);
        }
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_converter_is_not_found() {
        let mut chain = ResolutionChain::<str>::new();
        chain.register(Arc::new(Named::new("strings")));

        assert_eq!(resolve(&chain, &QualifiedType::of::<i32>()), None);
    }

    #[test]
    fn test_qualified_type_skips_unqualified_factory() {
        let mut chain = ResolutionChain::<str>::new();
        chain.register(Arc::new(Named::new("plain")));
        chain.register(Arc::new(Named::new("reversed").qualified(Qualifier::tag("reversed"))));
        chain.register(Arc::new(Named::new("plain-late")));

        let reversed = QualifiedType::of::<String>().with(Qualifier::tag("reversed"));
        assert_eq!(resolve(&chain, &reversed).as_deref(), Some("reversed"));
        assert_eq!(resolve(&chain, &QualifiedType::of::<String>()).as_deref(), Some("plain-late"));
        assert_eq!(
            resolve(&chain, &QualifiedType::of::<String>().with(Qualifier::tag("other"))),
            None
        );
    }

    #[test]
    fn test_exact_match_outranks_later_qualifier_ignoring_factory() {
        let mut chain = ResolutionChain::<str>::new();
        chain.register(Arc::new(Named::new("exact")));
        chain.register(Arc::new(Named::new("any").ignoring_qualifiers()));

        assert_eq!(resolve(&chain, &QualifiedType::of::<String>()).as_deref(), Some("exact"));
        let tagged = QualifiedType::of::<String>().with(Qualifier::tag("t"));
        assert_eq!(resolve(&chain, &tagged).as_deref(), Some("any"));
    }

    #[test]
    fn test_fork_appends_without_touching_parent() {
        let mut parent = ResolutionChain::<str>::new();
        parent.register(Arc::new(Named::new("parent")));
        let qt = QualifiedType::of::<String>();
        resolve(&parent, &qt);

        let mut child = parent.fork();
        assert_eq!(resolve(&child, &qt).as_deref(), Some("parent"));
        child.register(Arc::new(Named::new("child")));

        assert_eq!(resolve(&child, &qt).as_deref(), Some("child"));
        assert_eq!(resolve(&parent, &qt).as_deref(), Some("parent"));
        assert_eq!(parent.len(), 1);
        assert_eq!(child.len(), 2);
    }

    #[test]
    fn test_concurrent_reads_of_shared_chain() {
        let mut chain = ResolutionChain::<str>::new();
        chain.register(Arc::new(Named::new("shared")));
        let chain = Arc::new(chain);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let chain = Arc::clone(&chain);
                scope.spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(
                            resolve(&chain, &QualifiedType::of::<String>()).as_deref(),
                            Some("shared")
                        );
                    }
                });
            }
        });
    }
}
