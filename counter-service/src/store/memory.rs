use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use tokio::sync::Mutex;

use super::{KeyValueStore, StoreError};

const MEMORY_ADDR: &str = "memory";

/// In-process [`KeyValueStore`] used by tests and local runs without Redis.
///
/// Reachability can be toggled at runtime to reproduce a store that is down at
/// boot or disappears mid-flight. Losing reachability breaks the current
/// connection, so a fresh `connect` is required once the store comes back.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, i64>>,
    unreachable: AtomicBool,
    connected: AtomicBool,
    stall_on_quit: AtomicBool,
    fail_set: AtomicBool,
    fail_quit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses connections until [`MemoryStore::set_reachable`] is called.
    pub fn unreachable() -> Self {
        let store = Self::default();
        store.unreachable.store(true, Ordering::SeqCst);
        store
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Makes `quit` hang forever, as a wedged server would.
    pub fn stall_on_quit(&self) {
        self.stall_on_quit.store(true, Ordering::SeqCst);
    }

    /// Makes `set` answer with an error reply.
    pub fn fail_set(&self) {
        self.fail_set.store(true, Ordering::SeqCst);
    }

    /// Makes `quit` answer with an error reply.
    pub fn fail_quit(&self) {
        self.fail_quit.store(true, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Reads a value directly, bypassing connectivity checks.
    pub async fn value(&self, key: &str) -> Option<i64> {
        self.values.lock().await.get(key).copied()
    }

    /// Writes a value directly, bypassing connectivity checks.
    pub async fn insert(&self, key: &str, value: i64) {
        self.values.lock().await.insert(key.to_string(), value);
    }

    fn check_connection(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            if self.connected.swap(false, Ordering::SeqCst) {
                return Err(StoreError::ConnectionLost(
                    "memory store became unreachable".to_string(),
                ));
            }
            return Err(StoreError::NotConnected);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(StoreError::NotConnected);
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    async fn connect(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionRefused(MEMORY_ADDR.to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.check_connection()?;
        Ok(self.value(key).await)
    }

    async fn incr_by(&self, key: &str, delta: u64) -> Result<i64, StoreError> {
        self.check_connection()?;
        let overflow = || StoreError::Protocol("increment would overflow".to_string());
        let delta = i64::try_from(delta).map_err(|_| overflow())?;

        let mut values = self.values.lock().await;
        let value = values.entry(key.to_string()).or_insert(0);
        *value = value.checked_add(delta).ok_or_else(overflow)?;
        Ok(*value)
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.check_connection()?;
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(StoreError::Protocol("SET rejected".to_string()));
        }
        self.insert(key, value).await;
        Ok(())
    }

    async fn quit(&self) -> Result<(), StoreError> {
        if self.stall_on_quit.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.connected.store(false, Ordering::SeqCst);
        if self.fail_quit.load(Ordering::SeqCst) {
            return Err(StoreError::Protocol("QUIT rejected".to_string()));
        }
        Ok(())
    }
}
