// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::debug;
use uuid::Uuid;

use crate::store::QuadStore;

/// Caller-owned map from store id to live store.
///
/// Holds weak references only: a store dropped by its owners disappears
/// from lookups without being unregistered.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: Mutex<HashMap<Uuid, Weak<QuadStore>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn stores(&self) -> MutexGuard<'_, HashMap<Uuid, Weak<QuadStore>>> {
        self.stores.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `store` under its id, replacing any dead entry.
    pub fn register(&self, store: &Arc<QuadStore>) -> Uuid {
        let id = store.store_id();
        self.stores().insert(id, Arc::downgrade(store));
        debug!(store_id = %id, "Registered store");
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<QuadStore>> {
        let mut stores = self.stores();
        let store = stores.get(id).and_then(Weak::upgrade);
        if store.is_none() {
            stores.remove(id);
        }
        store
    }

    pub fn unregister(&self, id: &Uuid) -> bool {
        self.stores().remove(id).is_some()
    }

    /// Ids of stores still alive.
    pub fn ids(&self) -> Vec<Uuid> {
        let mut stores = self.stores();
        stores.retain(|_, store| store.strong_count() > 0);
        stores.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
