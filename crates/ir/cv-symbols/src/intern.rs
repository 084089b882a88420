//! Structural interning tables
//!
//! Types and member references are interned so that structurally equal
//! values share one id. Identity comparison on ids is then enough to
//! deduplicate references during emission.

use la_arena::{Arena, Idx};
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Arena plus reverse index, guarded for concurrent get-or-insert
pub struct InternTable<T> {
    inner: RwLock<InternInner<T>>,
}

struct InternInner<T> {
    arena: Arena<T>,
    index: FxHashMap<T, Idx<T>>,
}

impl<T: Clone + Eq + Hash> InternTable<T> {
    /// Creates an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(InternInner {
                arena: Arena::new(),
                index: FxHashMap::default(),
            }),
        }
    }

    /// Returns the id of `value`, allocating it on first sight
    ///
    /// Two threads racing on the same value observe the same id: the write
    /// path re-checks the index before allocating.
    pub fn intern(&self, value: T) -> Idx<T> {
        let existing = self.read().index.get(&value).copied();
        if let Some(id) = existing {
            return id;
        }

        let mut inner = self.write();
        if let Some(&id) = inner.index.get(&value) {
            return id;
        }
        let id = inner.arena.alloc(value.clone());
        inner.index.insert(value, id);
        id
    }

    /// Returns a copy of the interned value
    #[must_use]
    pub fn get(&self, id: Idx<T>) -> T {
        self.read().arena[id].clone()
    }

    /// Returns the id of `value` if it was interned before
    #[must_use]
    pub fn lookup(&self, value: &T) -> Option<Idx<T>> {
        self.read().index.get(value).copied()
    }

    /// Number of distinct values
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().arena.len()
    }

    /// Whether nothing has been interned yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, InternInner<T>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InternInner<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Eq + Hash> Default for InternTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Eq + Hash> fmt::Debug for InternTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternTable")
            .field("len", &self.len())
            .finish()
    }
}
