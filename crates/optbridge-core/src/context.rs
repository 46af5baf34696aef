#![forbid(unsafe_code)]

//! Ordered scratch space threaded through one definition build.
//!
//! [`ContextStore`] holds the intermediate artifacts installers hand to each
//! other (hook chains, merged watch and computed maps, ...). It has no merge
//! logic: writing an existing key replaces the value in place (the key keeps
//! its original position), and stage ordering is the pipeline's business.
//!
//! Values are typed. Reading a key with the wrong type behaves like a missing
//! key.

use std::any::Any;
use std::fmt;

use ahash::AHashMap;

/// Ordered, typed key/value store. Lives for a single definition build.
#[derive(Default)]
pub struct ContextStore {
    order: Vec<String>,
    values: AHashMap<String, Box<dyn Any>>,
}

impl ContextStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`.
    pub fn set<T: Any>(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        if self.values.insert(key.clone(), Box::new(value)).is_none() {
            self.order.push(key);
        } else {
            #[cfg(feature = "tracing")]
            tracing::trace!(key = %key, "context entry replaced");
        }
    }

    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|value| value.downcast_mut())
    }

    /// Mutable access, inserting `T::default()` first if the key is absent.
    ///
    /// An existing value of a different type is replaced.
    pub fn get_or_default<T: Any + Default>(&mut self, key: &str) -> &mut T {
        if !self.values.get(key).is_some_and(|value| value.is::<T>()) {
            self.set(key, T::default());
        }
        self.values
            .get_mut(key)
            .and_then(|value| value.downcast_mut())
            .expect("value has type T after insertion")
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        if self.values.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// Keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStore")
            .field("keys", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_typed() {
        let mut store = ContextStore::new();
        store.set("count", 3usize);
        assert_eq!(store.get::<usize>("count"), Some(&3));
        assert_eq!(store.get::<String>("count"), None);
        assert!(store.has("count"));
    }

    #[test]
    fn replace_keeps_position() {
        let mut store = ContextStore::new();
        store.set("a", 1u8);
        store.set("b", 2u8);
        store.set("a", "now a string");
        assert_eq!(store.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(store.get::<&str>("a"), Some(&"now a string"));
    }

    #[test]
    fn delete_removes_from_order() {
        let mut store = ContextStore::new();
        store.set("a", 1u8);
        store.set("b", 2u8);
        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        assert_eq!(store.keys().collect::<Vec<_>>(), ["b"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_or_default_accumulates() {
        let mut store = ContextStore::new();
        store.get_or_default::<Vec<u32>>("chain").push(1);
        store.get_or_default::<Vec<u32>>("chain").push(2);
        assert_eq!(store.get::<Vec<u32>>("chain"), Some(&vec![1, 2]));
    }
}
