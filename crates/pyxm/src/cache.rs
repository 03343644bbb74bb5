//! Fixed-capacity LRU cache for compiled templates.
//!
//! Keys are `"{name}:{hash}"` strings. A single mutex guards both the map and
//! the access order, so promotion on `get` and eviction on `set` are atomic
//! with respect to each other. The lock is only held for bookkeeping; values
//! are cloned out (an `Arc` for compiled templates) before it is released.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::compiler::CompiledTemplate;

/// Cache of compiled templates shared by an environment.
pub type TemplateCache = LruCache<Arc<CompiledTemplate>>;

/// Default capacity, matching [`EngineConfig::default`](crate::EngineConfig).
pub const DEFAULT_CAPACITY: usize = 100;

struct Inner<V> {
    entries: HashMap<String, V>,
    /// Least recently used at the front.
    order: VecDeque<String>,
}

impl<V> Inner<V> {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

/// Thread-safe least-recently-used cache.
///
/// A capacity of zero disables the cache: `set` stores nothing and every
/// `get` misses.
pub struct LruCache<V> {
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> LruCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    // A panic while holding the lock cannot leave the map and the order out
    // of step, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the entry and marks it most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let value = inner.entries.get(key).cloned()?;
        inner.touch(key);
        Some(value)
    }

    /// Inserts or replaces an entry, evicting the least recently used one
    /// when the cache is full.
    pub fn set(&self, key: impl Into<String>, value: V) {
        if self.capacity == 0 {
            return;
        }
        let key = key.into();
        let mut inner = self.lock();
        if inner.entries.contains_key(&key) {
            inner.touch(&key);
        } else {
            while inner.entries.len() >= self.capacity {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                inner.entries.remove(&oldest);
                debug!(key = %oldest, "evicted template from cache");
            }
            inner.order.push_back(key.clone());
        }
        inner.entries.insert(key, value);
    }

    /// Checks for a key without promoting it.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let value = inner.entries.remove(key)?;
        inner.order.retain(|k| k != key);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.lock().order.iter().cloned().collect()
    }
}

impl<V: Clone> Default for LruCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<V> std::fmt::Debug for LruCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self
            .inner
            .lock()
            .map(|inner| inner.entries.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().entries.len());
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("len", &len)
            .finish()
    }
}
