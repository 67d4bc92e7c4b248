//! Access to the external key-value store that owns the counter.
//!
//! The store itself is an opaque service speaking a tiny protocol: `GET`,
//! `INCRBY`, `SET`, plus connect/quit. [`KeyValueStore`] captures that
//! protocol so the [`StoreClient`] can run against Redis in production and an
//! in-process [`MemoryStore`] in tests.

use std::future::Future;

use thiserror::Error;

mod client;
mod memory;
mod redis_store;

pub use client::StoreClient;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Connection status of a [`StoreClient`].
///
/// Transitions are driven by connect attempts and by connectivity errors
/// reported from store operations, never by request handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Nothing is listening at the store address.
    #[error("connection refused by store at {0}")]
    ConnectionRefused(String),

    /// An operation was issued before a connection was established.
    #[error("store is not connected")]
    NotConnected,

    /// An established connection broke while an operation was in flight.
    #[error("lost connection to store: {0}")]
    ConnectionLost(String),

    /// The store answered with an error reply.
    #[error("store error: {0}")]
    Protocol(String),

    /// The stored counter could not be read as an integer.
    #[error("store returned a non-integer value: {0:?}")]
    InvalidValue(String),
}

impl StoreError {
    pub fn is_connection_refusal(&self) -> bool {
        matches!(self, StoreError::ConnectionRefused(_))
    }

    /// Errors that mean the connection is gone and needs to be re-established.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionRefused(_)
                | StoreError::NotConnected
                | StoreError::ConnectionLost(_)
        )
    }
}

/// Minimal protocol spoken with the counter store.
///
/// Implementations own their connection. `connect` may be called again after
/// a [`StoreError::ConnectionLost`] to replace a broken connection.
pub trait KeyValueStore: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// `GET key`. A missing key yields `Ok(None)`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<i64>, StoreError>> + Send;

    /// `INCRBY key delta`, returning the new value.
    fn incr_by(
        &self,
        key: &str,
        delta: u64,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// `SET key value`.
    fn set(&self, key: &str, value: i64) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Politely ends the connection.
    fn quit(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
