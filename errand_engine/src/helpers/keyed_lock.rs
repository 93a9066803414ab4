//! Fine-grained async mutual exclusion keyed by an id.
//!
//! Claims and transitions on one order must not interleave, and neither may two debits on one account's credits, but
//! work on different keys should never wait on each other. `KeyedLocks` hands out one async mutex per key and drops
//! the bookkeeping for keys nobody is holding.
use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    hash::Hash,
    sync::{Arc, Mutex},
};

use log::trace;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub struct KeyedLocks<K> {
    name: &'static str,
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Debug for KeyedLocks<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyedLocks({})", self.name)
    }
}

impl<K> KeyedLocks<K>
where K: Eq + Hash + Clone + Display
{
    pub fn new(name: &'static str) -> Self {
        Self { name, locks: Mutex::new(HashMap::new()) }
    }

    /// Waits until no one else holds the lock for `key`. The lock is released when the guard is dropped.
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only referenced by the map are idle.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        trace!("🔒️ Acquiring {} lock for {key}", self.name);
        mutex.lock_owned().await
    }

    /// The number of keys currently tracked. Idle keys are reclaimed lazily on the next `lock` call.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
