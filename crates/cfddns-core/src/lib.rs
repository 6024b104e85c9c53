// # cfddns-core
//
// Core library for the polling Cloudflare dynamic DNS daemon.
//
// ## Architecture Overview
//
// This library provides the update-reconciliation engine:
// - **AddressResolver**: Trait for discovering the current public IPv4/IPv6 address
// - **DnsProvider**: Trait for finding, creating and updating DNS records
// - **StateStore**: Trait for last-published address per (zone, name, type)
// - **DdnsEngine**: Fans out one task per (record, type), upserts on change,
//   aggregates failures without aborting the pass
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from provider/resolver implementations
// 2. **Independent Units**: A failing record never blocks a healthy one
// 3. **Idempotency**: Unchanged addresses never reach the provider
// 4. **No Hidden Retries**: The next scheduled poll is the retry
// 5. **Library-First**: All core functionality can be used as a library

pub mod traits;
pub mod engine;
pub mod config;
pub mod error;
pub mod state;

// Re-export core types for convenience
pub use traits::{AddressResolver, DnsProvider, IpVersion, RecordKey, StateStore};
pub use engine::{DdnsEngine, PassSummary, UnitOutcome};
pub use config::{DdnsConfig, EngineConfig, IpServicesConfig, RecordConfig, RecordType};
pub use error::{Error, Result};
pub use state::MemoryStateStore;
