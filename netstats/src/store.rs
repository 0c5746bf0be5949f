//! Keyed table abstraction over the kernel-maintained maps.
//!
//! Every table the reader touches (detail stats, device stats, interface
//! names, socket tags) is reached through [`KeyedStore`]. The kernel probe
//! keeps mutating those tables while we read them, so an enumeration is a
//! sequence of point reads and never an atomic snapshot.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::error::{RowError, StoreError};

pub type RowIter<'a, K, V> = Box<dyn Iterator<Item = Result<(K, V), RowError>> + 'a>;

/// Result of a point delete. A row that is already gone is not an error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

pub trait KeyedStore {
    type Key;
    type Value;

    /// Reads one row. `Ok(None)` means the key is absent.
    fn read(&self, key: &Self::Key) -> Result<Option<Self::Value>, StoreError>;

    /// Starts an enumeration of every row.
    ///
    /// Fails only when the enumeration cannot start at all. Rows removed
    /// between key enumeration and lookup are skipped; rows that cannot be
    /// decoded surface as [`RowError::Malformed`].
    fn iterate(&self) -> Result<RowIter<'_, Self::Key, Self::Value>, StoreError>;

    fn delete(&self, key: &Self::Key) -> Result<DeleteOutcome, StoreError>;
}

/// Write access, only needed to register interface names.
pub trait KeyedStoreWrite: KeyedStore {
    fn put(&self, key: Self::Key, value: Self::Value) -> Result<(), StoreError>;
}

impl<S: KeyedStore + ?Sized> KeyedStore for Arc<S> {
    type Key = S::Key;
    type Value = S::Value;

    fn read(&self, key: &Self::Key) -> Result<Option<Self::Value>, StoreError> {
        (**self).read(key)
    }

    fn iterate(&self) -> Result<RowIter<'_, Self::Key, Self::Value>, StoreError> {
        (**self).iterate()
    }

    fn delete(&self, key: &Self::Key) -> Result<DeleteOutcome, StoreError> {
        (**self).delete(key)
    }
}

impl<S: KeyedStoreWrite + ?Sized> KeyedStoreWrite for Arc<S> {
    fn put(&self, key: Self::Key, value: Self::Value) -> Result<(), StoreError> {
        (**self).put(key, value)
    }
}

enum Slot<V> {
    Live(V),
    Malformed(String),
}

struct Inner<K, V> {
    rows: BTreeMap<K, Slot<V>>,
    unavailable: bool,
    failing_deletes: BTreeSet<K>,
}

/// In-memory table with the same enumeration semantics as a kernel map.
///
/// Iteration snapshots the key set up front and looks each key up lazily,
/// so rows inserted or removed mid-iteration behave the way they do with
/// `get_next_key` + `lookup` on a BPF hash map. Failure injection hooks let
/// callers exercise the error paths.
pub struct MemoryStore<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Ord + Clone, V: Clone> MemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                rows: BTreeMap::new(),
                unavailable: false,
                failing_deletes: BTreeSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, key: K, value: V) {
        self.lock().rows.insert(key, Slot::Live(value));
    }

    /// Stores a row that enumerates as [`RowError::Malformed`].
    pub fn insert_malformed(&self, key: K, reason: &str) {
        self.lock()
            .rows
            .insert(key, Slot::Malformed(reason.to_string()));
    }

    pub fn remove(&self, key: &K) {
        self.lock().rows.remove(key);
    }

    /// Makes every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Makes deletes of `key` fail with a transport error.
    pub fn fail_deletes_for(&self, key: K) {
        self.lock().failing_deletes.insert(key);
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.lock().rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(inner: &Inner<K, V>) -> Result<(), StoreError> {
        if inner.unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }

    fn lookup(&self, key: &K) -> Option<Result<V, RowError>> {
        match self.lock().rows.get(key)? {
            Slot::Live(value) => Some(Ok(value.clone())),
            Slot::Malformed(reason) => Some(Err(RowError::Malformed(reason.clone()))),
        }
    }
}

impl<K: Ord + Clone, V: Clone> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for MemoryStore<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let store = Self::new();
        for (key, value) in iter {
            store.insert(key, value);
        }
        store
    }
}

impl<K: Ord + Clone, V: Clone> KeyedStore for MemoryStore<K, V> {
    type Key = K;
    type Value = V;

    fn read(&self, key: &K) -> Result<Option<V>, StoreError> {
        Self::check_available(&self.lock())?;
        match self.lookup(key) {
            None => Ok(None),
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(err)) => Err(StoreError::Operation {
                op: "read",
                reason: err.to_string(),
            }),
        }
    }

    fn iterate(&self) -> Result<RowIter<'_, K, V>, StoreError> {
        let keys: Vec<K> = {
            let inner = self.lock();
            Self::check_available(&inner)?;
            inner.rows.keys().cloned().collect()
        };
        Ok(Box::new(keys.into_iter().filter_map(move |key| {
            self.lookup(&key)
                .map(|row| row.map(|value| (key, value)))
        })))
    }

    fn delete(&self, key: &K) -> Result<DeleteOutcome, StoreError> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        if inner.failing_deletes.contains(key) {
            return Err(StoreError::Operation {
                op: "delete",
                reason: "injected failure".into(),
            });
        }
        match inner.rows.remove(key) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::AlreadyAbsent),
        }
    }
}

impl<K: Ord + Clone, V: Clone> KeyedStoreWrite for MemoryStore<K, V> {
    fn put(&self, key: K, value: V) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        inner.rows.insert(key, Slot::Live(value));
        Ok(())
    }
}
