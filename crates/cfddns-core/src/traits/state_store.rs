// # State Store Trait
//
// Defines the interface for reconciliation state.
//
// ## Purpose
//
// The state store tracks the last address known to be published for each
// (zone, name, type) key, so unchanged addresses cost no provider write.
//
// State is never persisted: it is seeded from the provider at startup and
// written by the engine after every confirmed upsert.

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

use crate::config::RecordType;

/// Identity of a tracked record: (zone identifier, name, type)
///
/// Two configured records with the same key are indistinguishable; the last
/// write wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Provider-scoped zone identifier
    pub zone_id: String,
    /// Fully-qualified record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
}

impl RecordKey {
    /// Create a new record key
    pub fn new(zone_id: impl Into<String>, name: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            zone_id: zone_id.into(),
            name: name.into(),
            record_type,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.zone_id, self.name, self.record_type)
    }
}

/// Trait for state store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks: no
/// lost updates, no torn reads of a single entry. No cross-key atomicity is
/// required.
///
/// # Forbidden Capabilities
/// - ❌ Implement business logic (owned by `DdnsEngine`)
/// - ❌ Perform DNS updates (owned by `DnsProvider`)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the last known address for a key
    ///
    /// # Returns
    ///
    /// - `Ok(Some(IpAddr))`: The last published address
    /// - `Ok(None)`: Never recorded
    /// - `Err(Error)`: Storage error
    async fn get_last_ip(&self, key: &RecordKey) -> Result<Option<IpAddr>, crate::Error>;

    /// Unconditionally overwrite the address for a key
    async fn set_last_ip(&self, key: &RecordKey, ip: IpAddr) -> Result<(), crate::Error>;
}
