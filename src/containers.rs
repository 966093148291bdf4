//! Locking containers used as building blocks by the dispatcher.
//!
//! Every method takes the container's lock for the duration of that one call;
//! there are no multi-call transactions. Poisoned locks are recovered, since
//! each operation leaves the inner collection in a consistent state.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// FIFO queue.
#[derive(Debug)]
pub struct LockedQueue<T> {
    data: Mutex<VecDeque<T>>,
}

impl<T> Default for LockedQueue<T> {
    fn default() -> Self {
        Self {
            data: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> LockedQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail.
    pub fn push(&self, value: T) {
        lock(&self.data).push_back(value);
    }

    /// Removes the head without returning it.
    pub fn pop(&self) {
        lock(&self.data).pop_front();
    }

    /// Removes and returns the head.
    pub fn get(&self) -> Option<T> {
        lock(&self.data).pop_front()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.data).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.data).len()
    }

    /// Removes every element, in FIFO order.
    pub fn drain(&self) -> Vec<T> {
        lock(&self.data).drain(..).collect()
    }
}

/// Ordered, resizable sequence.
#[derive(Debug)]
pub struct LockedVec<T> {
    data: Mutex<Vec<T>>,
}

impl<T> Default for LockedVec<T> {
    fn default() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> LockedVec<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: T) {
        lock(&self.data).push(value);
    }

    /// Replaces the element at `index`. Returns `false` if out of bounds.
    pub fn set(&self, index: usize, value: T) -> bool {
        match lock(&self.data).get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<T> {
        lock(&self.data).get(index).cloned()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.data).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.data).len()
    }

    /// Truncates or extends with clones of `fill`.
    pub fn resize(&self, len: usize, fill: T) {
        lock(&self.data).resize(len, fill);
    }

    /// Copy of the current contents, taken under one lock.
    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.data).clone()
    }
}

/// Key/value map.
#[derive(Debug)]
pub struct LockedMap<K, V> {
    data: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for LockedMap<K, V> {
    fn default() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V: Clone> LockedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces, returning the previous value.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        lock(&self.data).insert(key, value)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        lock(&self.data).get(key).cloned()
    }

    /// Returns the value under `key`, inserting `make()` first if absent.
    ///
    /// Lookup and insert happen under one lock, so concurrent callers for the
    /// same key all observe the same value.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V {
        lock(&self.data).entry(key).or_insert_with(make).clone()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        lock(&self.data).contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.data).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.data).len()
    }
}
