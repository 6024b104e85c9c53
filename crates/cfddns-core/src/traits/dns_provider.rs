// # DNS Provider Trait
//
// Defines the interface for reading and writing DNS records via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `cfddns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use cfddns_core::{DnsProvider, RecordType};
// use cfddns_core::traits::UpsertRequest;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     provider.upsert_record(&UpsertRequest {
//         zone_id: "Z1",
//         name: "home.example.com",
//         record_type: RecordType::A,
//         content: "203.0.113.5",
//         ttl: 120,
//         proxied: false,
//     }).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::config::RecordType;
use crate::error::Error;

/// A DNS record as held by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// Provider-assigned record ID
    pub id: String,
    /// Fully-qualified record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Record content (the address)
    pub content: String,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Whether the record is proxied
    pub proxied: bool,
}

impl DnsRecord {
    /// Whether this record already carries the requested content and attributes
    pub fn matches(&self, request: &UpsertRequest<'_>) -> bool {
        self.content == request.content
            && self.ttl == request.ttl
            && self.proxied == request.proxied
    }
}

/// Desired state of one (zone, name, type) record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertRequest<'a> {
    /// Provider-scoped zone identifier
    pub zone_id: &'a str,
    /// Fully-qualified record name
    pub name: &'a str,
    /// Record type
    pub record_type: RecordType,
    /// Content to publish
    pub content: &'a str,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Proxy flag
    pub proxied: bool,
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Record didn't exist and was created
    Created {
        /// ID of the new record
        record_id: String,
    },
    /// Record existed and was rewritten
    Updated {
        /// ID of the record
        record_id: String,
        /// Content before the write
        previous_content: String,
    },
    /// Record already had the requested content, TTL and proxy flag (no write)
    Unchanged {
        /// ID of the record
        record_id: String,
    },
}

/// Trait for DNS provider implementations
///
/// This trait defines the interface for reading and writing DNS records.
/// Implementations handle the specifics of each provider's API; the upsert
/// composition lives here so every provider gets the same semantics.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure (the next poll is the retry)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff
/// - ❌ Access the state store (owned by `DdnsEngine`)
/// - ❌ Decide whether an update is needed (owned by `DdnsEngine`)
///
/// Futures returned by these methods are dropped when a pass is cancelled,
/// so they must not leave work running in the background.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Find the record matching (zone, name, type)
    ///
    /// # Returns
    ///
    /// - `Ok(Some(DnsRecord))`: The first matching record
    /// - `Ok(None)`: No matching record exists
    /// - `Err(Error)`: The lookup itself failed
    async fn find_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<DnsRecord>, Error>;

    /// Create a new record
    ///
    /// Returns [`Error::AlreadyExists`] when the provider rejects the create
    /// because a matching record is already present.
    async fn create_record(&self, request: &UpsertRequest<'_>) -> Result<DnsRecord, Error>;

    /// Update content, TTL and proxy flag of an existing record
    async fn update_record(
        &self,
        record_id: &str,
        request: &UpsertRequest<'_>,
    ) -> Result<(), Error>;

    /// Find-or-create-else-update
    ///
    /// - No matching record → create it
    /// - Matching record with identical content, TTL and proxy flag → no write
    /// - Matching record otherwise → update it
    ///
    /// If the create loses a race against an external writer and the
    /// provider reports the record already exists, the record is looked up
    /// again and updated.
    async fn upsert_record(&self, request: &UpsertRequest<'_>) -> Result<UpsertOutcome, Error> {
        let existing = self
            .find_record(request.zone_id, request.name, request.record_type)
            .await?;

        let existing = match existing {
            Some(record) => record,
            None => match self.create_record(request).await {
                Ok(record) => {
                    return Ok(UpsertOutcome::Created {
                        record_id: record.id,
                    });
                }
                Err(Error::AlreadyExists(msg)) => {
                    tracing::debug!(
                        "{} ({}) appeared concurrently, updating instead: {}",
                        request.name,
                        request.record_type,
                        msg
                    );
                    self.find_record(request.zone_id, request.name, request.record_type)
                        .await?
                        .ok_or_else(|| {
                            Error::not_found(format!(
                                "{} ({}) reported as existing but not found",
                                request.name, request.record_type
                            ))
                        })?
                }
                Err(e) => return Err(e),
            },
        };

        if existing.matches(request) {
            return Ok(UpsertOutcome::Unchanged {
                record_id: existing.id,
            });
        }

        self.update_record(&existing.id, request).await?;

        Ok(UpsertOutcome::Updated {
            record_id: existing.id,
            previous_content: existing.content,
        })
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
