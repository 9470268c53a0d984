//! Per-client cache of queue addresses.
//!
//! Providers address queues by a backend-specific location (an SQS queue URL)
//! while callers use logical names. The resolver looks a name up once and keeps
//! the answer for the lifetime of the client. Entries are never evicted: if a
//! queue is deleted and recreated externally the cached address can go stale,
//! and the client has to be recreated to pick up the new one.

use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;
use tracing::debug;

/// Lazily populated map from queue name to queue address
///
/// Safe to share between tasks. Two tasks resolving the same unknown name at
/// once may both hit the backend; the last insert wins, which is harmless since
/// both see the same address.
#[derive(Debug, Default)]
pub struct QueueAddressResolver {
    cache: RwLock<HashMap<String, String>>,
}

impl QueueAddressResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a queue name, calling `lookup` only on a cache miss
    ///
    /// # Errors
    ///
    /// Returns whatever `lookup` fails with. Failed lookups are not cached.
    pub async fn resolve_with<F, Fut, E>(&self, queue_name: &str, lookup: F) -> Result<String, E>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        // Check cache first
        {
            let cache = self.cache.read().await;
            if let Some(address) = cache.get(queue_name) {
                return Ok(address.clone());
            }
        }

        debug!(queue_name = %queue_name, "Queue address not cached, looking it up");
        let address = lookup(queue_name.to_string()).await?;

        let mut cache = self.cache.write().await;
        cache.insert(queue_name.to_string(), address.clone());

        Ok(address)
    }

    /// Store a known address without asking the backend
    pub async fn seed(&self, queue_name: impl Into<String>, address: impl Into<String>) {
        let mut cache = self.cache.write().await;
        cache.insert(queue_name.into(), address.into());
    }

    /// Cached address for a queue, if it has been resolved before
    pub async fn cached(&self, queue_name: &str) -> Option<String> {
        self.cache.read().await.get(queue_name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
