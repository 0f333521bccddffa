// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded LRU caches in front of the dictionary files.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::term::{Term, TermId};

/// One size-bounded LRU map behind a mutex.
pub struct BoundedCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// A zero capacity is bumped to one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn put(&self, key: K, value: V) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cap()
            .get()
    }
}

/// The four dictionary caches, sized independently.
pub struct DictionaryCaches {
    /// id -> term
    pub terms: BoundedCache<TermId, Term>,
    /// term -> id
    pub term_ids: BoundedCache<Term, TermId>,
    /// namespace id -> namespace
    pub namespaces: BoundedCache<u32, String>,
    /// namespace -> namespace id
    pub namespace_ids: BoundedCache<String, u32>,
}

impl DictionaryCaches {
    pub fn new(
        term_cache_size: usize,
        term_id_cache_size: usize,
        namespace_cache_size: usize,
        namespace_id_cache_size: usize,
    ) -> Self {
        Self {
            terms: BoundedCache::new(term_cache_size),
            term_ids: BoundedCache::new(term_id_cache_size),
            namespaces: BoundedCache::new(namespace_cache_size),
            namespace_ids: BoundedCache::new(namespace_id_cache_size),
        }
    }

    /// Record a known term <-> id pair in both directions.
    pub fn remember(&self, id: TermId, term: &Term) {
        self.terms.put(id, term.clone());
        self.term_ids.put(term.clone(), id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache: BoundedCache<u32, String> = BoundedCache::new(2);
        cache.put(1, "a".to_string());
        cache.put(2, "b".to_string());
        assert_eq!(cache.get(&1).as_deref(), Some("a"));
        cache.put(3, "c".to_string());
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_is_usable() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(1, 1);
        assert_eq!(cache.get(&1), Some(1));
    }

    #[test]
    fn test_remember_fills_both_directions() {
        let caches = DictionaryCaches::new(4, 4, 2, 2);
        let id = TermId::new(5).unwrap();
        let term = Term::iri("http://example.org/x");
        caches.remember(id, &term);
        assert_eq!(caches.terms.get(&id), Some(term.clone()));
        assert_eq!(caches.term_ids.get(&term), Some(id));
    }
}
