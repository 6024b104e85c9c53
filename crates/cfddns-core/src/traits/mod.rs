//! Core traits for the cfddns system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`AddressResolver`]: Discover the host's current public address
//! - [`DnsProvider`]: Find, create and update DNS records via provider APIs
//! - [`StateStore`]: Last-published address per record, for idempotency

pub mod address_resolver;
pub mod dns_provider;
pub mod state_store;

pub use address_resolver::{AddressResolver, IpVersion};
pub use dns_provider::{DnsProvider, DnsRecord, UpsertOutcome, UpsertRequest};
pub use state_store::{RecordKey, StateStore};
