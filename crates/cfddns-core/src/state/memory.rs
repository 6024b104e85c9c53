// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - State is rebuilt from the provider by `DdnsEngine::initialize_state`
// - Keys the provider doesn't know stay absent and are created on the first pass

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::traits::state_store::{RecordKey, StateStore};
use crate::Error;

/// In-memory state store implementation
///
/// This implementation stores all state in a HashMap protected by a RwLock.
/// Clones share the same map.
///
/// # Example
///
/// ```rust,no_run
/// use cfddns_core::config::RecordType;
/// use cfddns_core::state::MemoryStateStore;
/// use cfddns_core::traits::{RecordKey, StateStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///     let key = RecordKey::new("Z1", "home.example.com", RecordType::A);
///
///     store.set_last_ip(&key, "203.0.113.5".parse()?).await?;
///
///     let ip = store.get_last_ip(&key).await?;
///     assert_eq!(ip, Some("203.0.113.5".parse()?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<HashMap<RecordKey, IpAddr>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_last_ip(&self, key: &RecordKey) -> Result<Option<IpAddr>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(key).copied())
    }

    async fn set_last_ip(&self, key: &RecordKey, ip: IpAddr) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(key.clone(), ip);
        Ok(())
    }
}
