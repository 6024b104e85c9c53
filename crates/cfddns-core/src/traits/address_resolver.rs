// # Address Resolver Trait
//
// Defines the interface for discovering the host's current public address.
//
// ## Implementations
//
// - HTTP lookup services: `cfddns-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use cfddns_core::{AddressResolver, IpVersion};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* AddressResolver implementation */;
//
//     let v4 = resolver.resolve(IpVersion::V4).await?;
//     println!("public IPv4: {}", v4);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

/// IP version (v4 or v6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Whether `ip` belongs to this family
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            IpVersion::V4 => ip.is_ipv4(),
            IpVersion::V6 => ip.is_ipv6(),
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => f.write_str("IPv4"),
            IpVersion::V6 => f.write_str("IPv6"),
        }
    }
}

/// Trait for address resolver implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Contract
///
/// - The returned address is always of the requested family
/// - Implementations try their lookup services in a fixed preference order
///   and fail only when every service is exhausted
/// - Each attempt is bounded by a timeout
/// - The future must be cancellation-safe: the engine drops it when a pass
///   is cancelled, and any in-flight request is aborted with it
///
/// # Forbidden
///
/// - ❌ Caching results across calls (the engine owns all state)
/// - ❌ Retrying after exhaustion (retry is the next scheduled poll)
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve the current public address for `version`
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: A syntactically valid address of the requested family
    /// - `Err(Error::Resolution)`: If every service failed
    async fn resolve(&self, version: IpVersion) -> Result<IpAddr, crate::Error>;
}
