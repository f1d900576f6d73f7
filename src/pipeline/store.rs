//! Per-unit data store shared by the routines of one pipeline.
//!
//! Values are stored type-erased and read back by downcast. Routines agree on
//! keys through [`StoreKey`], which pins the value type at compile time so a
//! producer and its consumers cannot disagree on what a key holds.

use super::RoutineError;
use std::any::{type_name, Any};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;

/// Run-level metadata, persisted next to output artifacts.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Typed name of a store entry.
pub struct StoreKey<T> {
    name: Cow<'static, str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StoreKey<T> {
    pub const fn new_static(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _marker: PhantomData,
        }
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for StoreKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StoreKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey<{}>({})", type_name::<T>(), self.name)
    }
}

impl<T> fmt::Display for StoreKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Key/value store created empty for every unit.
#[derive(Default)]
pub struct DataStore {
    entries: HashMap<String, Box<dyn Any + Send>>,
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("DataStore").field("keys", &keys).finish()
    }
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn put<T: Any + Send>(&mut self, key: &StoreKey<T>, value: T) {
        self.entries.insert(key.name().to_string(), Box::new(value));
    }

    /// Borrow the value under `key`.
    pub fn get<T: Any>(&self, key: &StoreKey<T>) -> Result<&T, RoutineError> {
        self.entries
            .get(key.name())
            .ok_or_else(|| Self::missing::<T>(key))?
            .downcast_ref::<T>()
            .ok_or_else(|| Self::mismatch::<T>(key))
    }

    pub fn get_mut<T: Any>(&mut self, key: &StoreKey<T>) -> Result<&mut T, RoutineError> {
        self.entries
            .get_mut(key.name())
            .ok_or_else(|| Self::missing::<T>(key))?
            .downcast_mut::<T>()
            .ok_or_else(|| Self::mismatch::<T>(key))
    }

    /// Remove and return the value under `key`.
    ///
    /// A value of the wrong type is left in place.
    pub fn take<T: Any + Send>(&mut self, key: &StoreKey<T>) -> Result<T, RoutineError> {
        let boxed = self
            .entries
            .remove(key.name())
            .ok_or_else(|| Self::missing::<T>(key))?;
        match boxed.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(original) => {
                self.entries.insert(key.name().to_string(), original);
                Err(Self::mismatch::<T>(key))
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn missing<T>(key: &StoreKey<T>) -> RoutineError {
        RoutineError::MissingKey {
            key: key.name().to_string(),
            expected: type_name::<T>(),
        }
    }

    fn mismatch<T>(key: &StoreKey<T>) -> RoutineError {
        RoutineError::TypeMismatch {
            key: key.name().to_string(),
            expected: type_name::<T>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNT: StoreKey<u32> = StoreKey::new_static("count");

    #[test]
    fn test_put_get_take() {
        let mut store = DataStore::new();
        store.put(&COUNT, 3);
        assert_eq!(*store.get(&COUNT).unwrap(), 3);

        *store.get_mut(&COUNT).unwrap() += 1;
        assert_eq!(store.take(&COUNT).unwrap(), 4);
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_key() {
        let store = DataStore::new();
        assert!(matches!(
            store.get(&COUNT),
            Err(RoutineError::MissingKey { ref key, .. }) if key == "count"
        ));
    }

    #[test]
    fn test_type_mismatch_keeps_value() {
        let mut store = DataStore::new();
        store.put(&StoreKey::<String>::new("count"), "three".to_string());

        assert!(matches!(store.get(&COUNT), Err(RoutineError::TypeMismatch { .. })));
        assert!(matches!(store.take(&COUNT), Err(RoutineError::TypeMismatch { .. })));
        assert!(store.contains("count"));
    }

    #[test]
    fn test_put_replaces() {
        let mut store = DataStore::new();
        store.put(&COUNT, 1);
        store.put(&COUNT, 2);
        assert_eq!(store.len(), 1);
        assert_eq!(*store.get(&COUNT).unwrap(), 2);
        assert!(store.remove("count"));
        assert!(!store.remove("count"));
    }
}
