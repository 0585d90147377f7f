//! Options cache holding the current value of every (type, name) pair.

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared slot publishing one options value.
pub(crate) type Slot<T> = Arc<ArcSwap<T>>;

type CacheKey = (TypeId, String);

/// Cache of published options values keyed by type and name.
///
/// Each pair owns an `ArcSwap` slot. Publishing replaces the whole value in
/// one atomic store, so a reader always observes either the previous or the
/// next value, never a mix. The map lock is only held for slot lookup and
/// insertion, never while a value is being parsed or published.
///
/// # Examples
///
/// ```rust
/// use options_monitor::core::OptionsCache;
///
/// let cache = OptionsCache::new();
/// cache.set("", 42u32);
/// assert_eq!(*cache.get::<u32>("").unwrap(), 42);
///
/// cache.set("", 7u32);
/// assert_eq!(*cache.get::<u32>("").unwrap(), 7);
/// ```
#[derive(Default)]
pub struct OptionsCache {
    slots: RwLock<HashMap<CacheKey, Box<dyn Any + Send + Sync>>>,
}

impl OptionsCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the current value for `(T, name)`.
    ///
    /// Never waits for an in-progress publish.
    pub fn get<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.slot::<T>(name).map(|slot| slot.load_full())
    }

    /// Atomically publish a new value for `(T, name)`, creating the slot if needed.
    pub fn set<T>(&self, name: &str, value: T) -> Arc<T>
    where
        T: Send + Sync + 'static,
    {
        let value = Arc::new(value);
        self.publish(name, Arc::clone(&value));
        value
    }

    /// Publish an already shared value.
    pub fn publish<T>(&self, name: &str, value: Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        if let Some(slot) = self.slot::<T>(name) {
            slot.store(value);
            return;
        }

        let mut slots = self.slots.write();
        match slots
            .get(&key::<T>(name))
            .and_then(|entry| entry.downcast_ref::<Slot<T>>())
        {
            Some(slot) => slot.store(value),
            None => {
                let slot: Slot<T> = Arc::new(ArcSwap::new(value));
                slots.insert(key::<T>(name), Box::new(slot));
            }
        }
    }

    /// Whether a value has been published for `(T, name)`.
    pub fn contains<T>(&self, name: &str) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.slots.read().contains_key(&key::<T>(name))
    }

    /// Names registered for type `T`, in no particular order.
    pub fn names<T>(&self) -> Vec<String>
    where
        T: 'static,
    {
        let type_id = TypeId::of::<T>();
        self.slots
            .read()
            .keys()
            .filter(|(id, _)| *id == type_id)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Total number of (type, name) pairs held.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether the cache holds no values.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    pub(crate) fn slot<T>(&self, name: &str) -> Option<Slot<T>>
    where
        T: Send + Sync + 'static,
    {
        let slots = self.slots.read();
        let entry = slots.get(&key::<T>(name))?;
        match entry.downcast_ref::<Slot<T>>() {
            Some(slot) => Some(Arc::clone(slot)),
            None => {
                tracing::error!(
                    options = type_name::<T>(),
                    name,
                    "cache slot holds a value of the wrong type"
                );
                None
            }
        }
    }
}

fn key<T: 'static>(name: &str) -> CacheKey {
    (TypeId::of::<T>(), name.to_owned())
}
