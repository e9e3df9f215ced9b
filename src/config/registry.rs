use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A configuration kind stored in a [`ConfigRegistry`].
///
/// `Default` is the value a scope sees before anyone configured the kind;
/// `fork` produces the private copy handed to a child scope.
pub trait Config: Any + Send + Sync + Default {
    fn fork(&self) -> Self;
}

trait ErasedConfig: Any + Send + Sync {
    fn fork_erased(&self) -> Arc<dyn ErasedConfig>;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<K: Config> ErasedConfig for K {
    fn fork_erased(&self) -> Arc<dyn ErasedConfig> {
        Arc::new(self.fork())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A scope of configuration objects, one per kind.
///
/// Reads are shared and thread-safe; a kind that was never touched is
/// materialized from its `Default` on first access. Mutation requires a
/// private registry (`&mut self`), typically obtained with [`ConfigRegistry::fork`].
pub struct ConfigRegistry {
    entries: RwLock<HashMap<TypeId, Arc<dyn ErasedConfig>>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the configuration object of kind `K`, materializing it if absent.
    pub fn get<K: Config>(&self) -> Arc<K> {
        let existing = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<K>())
            .cloned();

        let entry = match existing {
            Some(entry) => entry,
            None => {
                let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(
                    entries
                        .entry(TypeId::of::<K>())
                        .or_insert_with(|| Arc::new(K::default())),
                )
            }
        };

        entry
            .into_any()
            .downcast::<K>()
            .unwrap_or_else(|_| Arc::new(K::default()))
    }

    /// Mutates this scope's copy of kind `K`.
    ///
    /// If the object is currently shared with a reader it is forked first, so
    /// outstanding `Arc`s keep observing the old value.
    pub fn configure<K: Config>(&mut self, mutator: impl FnOnce(&mut K)) -> &mut Self {
        let entries = self.entries.get_mut().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Arc::new(K::default()));

        if Arc::get_mut(entry).is_none() {
            *entry = entry.fork_erased();
        }

        if let Some(config) =
            Arc::get_mut(entry).and_then(|e| e.as_any_mut().downcast_mut::<K>())
        {
            mutator(config);
        }
        self
    }

    /// Produces a child scope holding a fork of every materialized kind.
    pub fn fork(&self) -> Self {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let forked = entries
            .iter()
            .map(|(kind, config)| (*kind, config.fork_erased()))
            .collect();
        Self {
            entries: RwLock::new(forked),
        }
    }

    pub fn is_materialized<K: Config>(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<K>())
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("ConfigRegistry")
            .field("materialized", &count)
            .finish()
    }
}
