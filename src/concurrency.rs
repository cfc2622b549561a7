//! Concurrency primitives: per-key locks, the global call gate and the shutdown signal.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard, Semaphore, SemaphorePermit};

use crate::error::GenerationError;

/// Create a linked trigger/signal pair. The signal starts untriggered.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

/// Flips every linked [`ShutdownSignal`]
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Cooperative cancellation observed by retry backoff sleeps
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        ShutdownSignal(rx)
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the trigger fires. Pends forever if the trigger was dropped unfired.
    pub async fn triggered(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Table of fair async mutexes, one per key, created on demand.
///
/// An entry lives only while someone holds or waits on it. A releasing holder, or a waiter
/// dropped before it acquired, removes the entry when the table's own reference and its own
/// are the only two left.
pub struct KeyLockTable<K> {
    locks: Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>,
}

impl<K> KeyLockTable<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait (FIFO) for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> KeyLockGuard<K> {
        let entry = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        // Built before waiting so a cancelled wait still prunes on drop. The pending
        // `lock_owned` future owns `entry` and is dropped ahead of `held`.
        let mut held = KeyLockGuard {
            key,
            entry: Some(entry.clone()),
            guard: None,
            locks: self.locks.clone(),
        };
        held.guard = Some(entry.lock_owned().await);
        held
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Default for KeyLockTable<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive hold on one key. Dropping it releases the lock and prunes the table entry when
/// nobody else is queued.
pub struct KeyLockGuard<K>
where
    K: Eq + Hash,
{
    key: K,
    entry: Option<Arc<AsyncMutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>,
}

impl<K> KeyLockGuard<K>
where
    K: Eq + Hash,
{
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> Drop for KeyLockGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        // The owned guard holds its own Arc clone; release it first so the count below only
        // sees the table, this guard and any waiters.
        drop(self.guard.take());

        if let Some(entry) = self.entry.take() {
            let mut locks = self.locks.lock();
            let current = locks
                .get(&self.key)
                .is_some_and(|live| Arc::ptr_eq(live, &entry));
            if current && Arc::strong_count(&entry) == 2 {
                locks.remove(&self.key);
            }
        }
    }
}

/// Global fair counting semaphore bounding in-flight external calls
pub struct CallGate {
    semaphore: Semaphore,
    capacity: usize,
}

impl CallGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Wait (FIFO) for a permit. The permit is returned on drop.
    pub async fn enter(&self) -> Result<SemaphorePermit<'_>, GenerationError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| GenerationError::Interrupted)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
