use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per key. Holders of different keys never wait on each
/// other; holders of the same key run one at a time in arrival order.
pub struct KeyedLocks<K = String> {
    slots: Arc<Mutex<HashMap<K, Arc<Mutex<()>>>>>,
}

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self { slots: self.slots.clone() }
    }
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self { slots: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<K: Eq + Hash> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock<Q>(&self, key: &Q) -> OwnedMutexGuard<()>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + Sync + ?Sized,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            // Slots nobody holds or waits on can go.
            slots.retain(|existing, slot| {
                <K as Borrow<Q>>::borrow(existing) == key || Arc::strong_count(slot) > 1
            });
            slots.entry(key.to_owned()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        slot.lock_owned().await
    }

    pub async fn tracked_keys(&self) -> usize {
        self.slots.lock().await.len()
    }
}
