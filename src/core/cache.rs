//! Cache and key-value storage abstractions

use anyhow::Result;
use async_trait::async_trait;
use std::hash::Hash;
use std::time::Duration;

/// An async cache whose entries may carry a time-to-live.
#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Returns the value for `key` unless it is missing or expired.
    async fn get(&self, key: &K) -> Option<V>;

    /// Stores `value`; `None` ttl means the entry never expires.
    async fn put(&self, key: K, value: V, ttl: Option<Duration>);

    async fn remove(&self, key: &K);
}

/// Small string key-value store backing the local session (credential,
/// repository coordinates, last-seen document version).
pub trait KeyValueCollection: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn put(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}
