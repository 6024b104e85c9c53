// # HTTP Address Resolver
//
// This crate discovers the host's public address by asking plain-text HTTP
// lookup services (e.g., api.ipify.org, icanhazip.com) and returning whatever
// address they saw the request come from.
//
// ## Architecture
//
// - One ordered list of services per family; the first usable answer wins
// - Each attempt is bounded by the configured timeout
// - Requests for a family go through a client whose DNS lookups only return
//   that family's addresses, so the service sees a connection of that family
// - IPv6 lookups fall back to an unrestricted client when the IPv6-only
//   connection cannot be established
// - Answers are trimmed, parsed and checked against the requested family
//
// No caching and no retries: the engine calls `resolve` once per unit of
// work and the next poll is the retry.

use async_trait::async_trait;
use cfddns_core::config::IpServicesConfig;
use cfddns_core::traits::{AddressResolver, IpVersion};
use cfddns_core::{Error, Result};
use reqwest::StatusCode;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// HTTP lookup-service address resolver
pub struct HttpAddressResolver {
    /// Services answering with the caller's IPv4 address, in preference order
    ipv4_services: Vec<String>,

    /// Services answering with the caller's IPv6 address, in preference order
    ipv6_services: Vec<String>,

    /// Client restricted to IPv4 connections
    ipv4_client: reqwest::Client,

    /// Client restricted to IPv6 connections
    ipv6_client: reqwest::Client,

    /// Unrestricted client, used when an IPv6-only connection cannot be made
    fallback_client: reqwest::Client,
}

impl std::fmt::Debug for HttpAddressResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAddressResolver")
            .field("ipv4_services", &self.ipv4_services)
            .field("ipv6_services", &self.ipv6_services)
            .finish()
    }
}

impl HttpAddressResolver {
    /// Create a resolver
    ///
    /// # Parameters
    ///
    /// - `ipv4_services`: Lookup URLs for IPv4, tried in order
    /// - `ipv6_services`: Lookup URLs for IPv6, tried in order
    /// - `timeout`: Per-request timeout
    pub fn new(
        ipv4_services: Vec<String>,
        ipv6_services: Vec<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            ipv4_services,
            ipv6_services,
            ipv4_client: build_client(timeout, Some(IpVersion::V4))?,
            ipv6_client: build_client(timeout, Some(IpVersion::V6))?,
            fallback_client: build_client(timeout, None)?,
        })
    }

    /// Create a resolver from the `ip_services` config section
    pub fn from_config(config: &IpServicesConfig) -> Result<Self> {
        Self::new(
            config.ipv4.clone(),
            config.ipv6.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn services(&self, version: IpVersion) -> &[String] {
        match version {
            IpVersion::V4 => &self.ipv4_services,
            IpVersion::V6 => &self.ipv6_services,
        }
    }

    /// Ask one service for the current address
    async fn fetch_ip(&self, url: &str, version: IpVersion) -> Result<IpAddr> {
        let response = match version {
            IpVersion::V4 => self.ipv4_client.get(url).send().await,
            IpVersion::V6 => match self.ipv6_client.get(url).send().await {
                Err(e) if e.is_connect() => {
                    tracing::debug!(
                        "IPv6-only request to {} failed ({}), retrying with default client",
                        url,
                        e
                    );
                    self.fallback_client.get(url).send().await
                }
                other => other,
            },
        }
        .map_err(|e| Error::http(format!("request failed: {}", e)))?;

        if response.status() != StatusCode::OK {
            return Err(Error::http(format!(
                "service returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("failed to read response: {}", e)))?;

        parse_answer(&body, version)
    }
}

/// Parse a service's plain-text answer
///
/// IPv4-mapped IPv6 answers count as IPv4.
fn parse_answer(body: &str, version: IpVersion) -> Result<IpAddr> {
    let text = body.trim();
    let ip: IpAddr = text
        .parse()
        .map_err(|_| Error::resolution(format!("invalid IP address: {:?}", text)))?;

    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    };

    if !version.matches(&ip) {
        let got = if ip.is_ipv4() { IpVersion::V4 } else { IpVersion::V6 };
        return Err(Error::resolution(format!(
            "expected {} but got {}",
            version, got
        )));
    }

    Ok(ip)
}

fn build_client(timeout: Duration, family: Option<IpVersion>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(version) = family {
        builder = builder.dns_resolver(Arc::new(FamilyResolver { version }));
    }
    builder
        .build()
        .map_err(|e| Error::http(format!("failed to build HTTP client: {}", e)))
}

/// DNS resolver that only hands out addresses of one family
struct FamilyResolver {
    version: IpVersion,
}

impl Resolve for FamilyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let version = self.version;
        Box::pin(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((name.as_str(), 0))
                .await?
                .filter(|addr| version.matches(&addr.ip()))
                .collect();

            if addrs.is_empty() {
                return Err(format!("no {} address for {}", version, name.as_str()).into());
            }

            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

#[async_trait]
impl AddressResolver for HttpAddressResolver {
    async fn resolve(&self, version: IpVersion) -> Result<IpAddr> {
        for url in self.services(version) {
            match self.fetch_ip(url, version).await {
                Ok(ip) => {
                    tracing::debug!("Detected {} address {} via {}", version, ip, url);
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::warn!("{} lookup via {} failed: {}", version, url, e);
                }
            }
        }

        Err(Error::resolution(format!(
            "failed to detect {} address from all services",
            version
        )))
    }
}
