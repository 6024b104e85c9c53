//! Configuration types for the cfddns system
//!
//! This module defines all configuration structures used throughout the crate,
//! along with loading from YAML and validation.
//!
//! ```yaml
//! cloudflare:
//!   api_token: "..."
//! check_interval: 5m
//! records:
//!   - zone_id: 023e105f4ecef8ad9ca31a8372d0c353
//!     name: home.example.com
//!     types: [A, AAAA]
//!     ttl: 120
//!     proxied: false
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::traits::IpVersion;

/// Environment variable overriding `cloudflare.api_token`
pub const API_TOKEN_ENV: &str = "CFDDNS_API_TOKEN";

/// Lowest TTL accepted for a record (seconds)
pub const MIN_TTL: u32 = 60;

/// Highest TTL accepted for a record (seconds)
pub const MAX_TTL: u32 = 86400;

/// Main cfddns configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// Cloudflare credentials
    pub cloudflare: CloudflareConfig,

    /// Poll interval, Go-style duration string (e.g. "5m", "1h30m")
    pub check_interval: String,

    /// DNS records to manage
    pub records: Vec<RecordConfig>,

    /// Public IP lookup services
    #[serde(default)]
    pub ip_services: IpServicesConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DdnsConfig {
    /// Read, parse and validate a configuration file
    ///
    /// `CFDDNS_API_TOKEN` takes precedence over the token in the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config: Self = serde_yaml::from_str(&contents)?;
        config.override_api_token(std::env::var(API_TOKEN_ENV).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parse and validate a configuration from a YAML string
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the API token when an override is present and non-empty
    pub fn override_api_token(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.cloudflare.api_token = token;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cloudflare.api_token.is_empty() {
            return Err(Error::config(format!(
                "cloudflare.api_token is required (or set {})",
                API_TOKEN_ENV
            )));
        }

        if self.check_interval.is_empty() {
            return Err(Error::config("check_interval is required"));
        }

        let interval = parse_duration(&self.check_interval)
            .map_err(|e| Error::config(format!("invalid check_interval format: {}", e)))?;
        if interval.is_zero() {
            return Err(Error::config("check_interval must be greater than zero"));
        }

        if self.records.is_empty() {
            return Err(Error::config(
                "at least one DNS record must be configured",
            ));
        }

        for (i, record) in self.records.iter().enumerate() {
            record
                .validate()
                .map_err(|e| Error::config(format!("record {}: {}", i, config_message(&e))))?;
        }

        self.ip_services.validate()?;
        self.engine.validate()?;

        Ok(())
    }

    /// The poll interval as a [`Duration`]
    ///
    /// Falls back to five minutes if the string does not parse; a validated
    /// configuration always parses.
    pub fn check_interval(&self) -> Duration {
        parse_duration(&self.check_interval).unwrap_or(Duration::from_secs(300))
    }
}

fn config_message(err: &Error) -> String {
    match err {
        Error::Config(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Cloudflare API credentials
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CloudflareConfig {
    /// API token with Zone:DNS:Edit permission
    #[serde(default)]
    pub api_token: String,
}

// Never expose the token through Debug
impl fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("api_token", &"<REDACTED>")
            .finish()
    }
}

/// DNS record configuration
///
/// Types are kept as the strings found in the file. The engine parses them
/// into [`RecordType`] per unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Provider-scoped zone identifier
    pub zone_id: String,

    /// Fully-qualified record name (e.g. "home.example.com")
    pub name: String,

    /// Requested record types ("A", "AAAA")
    pub types: Vec<String>,

    /// Time-to-live in seconds
    pub ttl: u32,

    /// Whether the record is proxied through Cloudflare
    #[serde(default)]
    pub proxied: bool,
}

impl RecordConfig {
    /// Create a new record configuration with no types, TTL 300, not proxied
    pub fn new(zone_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            name: name.into(),
            types: Vec::new(),
            ttl: 300,
            proxied: false,
        }
    }

    /// Add a requested record type
    pub fn with_type(mut self, record_type: impl Into<String>) -> Self {
        self.types.push(record_type.into());
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the proxy flag
    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    /// Validate a single record
    pub fn validate(&self) -> Result<()> {
        if self.zone_id.is_empty() {
            return Err(Error::config("zone_id is required"));
        }
        if self.name.is_empty() {
            return Err(Error::config("name is required"));
        }
        validate_domain_name(&self.name)?;

        if self.types.is_empty() {
            return Err(Error::config(
                "at least one type (A or AAAA) is required",
            ));
        }
        let mut seen = Vec::with_capacity(self.types.len());
        for t in &self.types {
            let record_type = t.parse::<RecordType>().map_err(|_| {
                Error::config(format!("invalid type {} (must be A or AAAA)", t))
            })?;
            if seen.contains(&record_type) {
                return Err(Error::config(format!("duplicate type {}", record_type)));
            }
            seen.push(record_type);
        }

        if !(MIN_TTL..=MAX_TTL).contains(&self.ttl) {
            return Err(Error::config(format!(
                "ttl must be between {} and {}",
                MIN_TTL, MAX_TTL
            )));
        }

        Ok(())
    }
}

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A record (IPv4)
    #[serde(rename = "A")]
    A,
    /// AAAA record (IPv6)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    /// Address family served by this record type
    pub fn ip_version(&self) -> IpVersion {
        match self {
            RecordType::A => IpVersion::V4,
            RecordType::Aaaa => IpVersion::V6,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            other => Err(Error::invalid_record_type(other)),
        }
    }
}

/// Public IP lookup services, tried in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpServicesConfig {
    /// Services answering with the caller's IPv4 address
    #[serde(default = "default_ipv4_services")]
    pub ipv4: Vec<String>,

    /// Services answering with the caller's IPv6 address
    #[serde(default = "default_ipv6_services")]
    pub ipv6: Vec<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_ip_timeout_secs")]
    pub timeout_secs: u64,
}

impl IpServicesConfig {
    /// Validate the service lists
    pub fn validate(&self) -> Result<()> {
        for (family, services) in [("ipv4", &self.ipv4), ("ipv6", &self.ipv6)] {
            if services.is_empty() {
                return Err(Error::config(format!(
                    "ip_services.{} must list at least one service",
                    family
                )));
            }
            for url in services {
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    return Err(Error::config(format!(
                        "ip_services.{} entry must use HTTP or HTTPS scheme. Got: {}",
                        family, url
                    )));
                }
            }
        }

        if self.timeout_secs == 0 {
            return Err(Error::config("ip_services.timeout_secs must be > 0"));
        }

        Ok(())
    }
}

impl Default for IpServicesConfig {
    fn default() -> Self {
        Self {
            ipv4: default_ipv4_services(),
            ipv6: default_ipv6_services(),
            timeout_secs: default_ip_timeout_secs(),
        }
    }
}

fn default_ipv4_services() -> Vec<String> {
    [
        "https://api.ipify.org",
        "https://icanhazip.com",
        "https://ifconfig.me/ip",
        "https://checkip.amazonaws.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_ipv6_services() -> Vec<String> {
    [
        "https://api64.ipify.org",
        "https://ipv6.icanhazip.com",
        "https://v6.ident.me",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_ip_timeout_secs() -> u64 {
    10
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of units of work running at once in a pass
    ///
    /// 0 leaves the fan-out unbounded.
    #[serde(default)]
    pub max_concurrent_updates: usize,

    /// Upper bound on the final pass run at shutdown (in seconds)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl EngineConfig {
    /// Validate engine settings
    pub fn validate(&self) -> Result<()> {
        if self.shutdown_timeout_secs == 0 {
            return Err(Error::config("engine.shutdown_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_updates: 0,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

/// Parse a Go-style duration such as `"30s"`, `"1.5m"`, `"1h30m"` or `"250ms"`
///
/// Accepts the units `h`, `m`, `s`, `ms`, `us` (or `µs`) and `ns`, decimal
/// fractions, and a bare `"0"`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.is_empty() {
        return Err(Error::config("empty duration"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || Error::config(format!("invalid duration: {}", input));

    let mut total_nanos: u128 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        let int_len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (whole, after) = rest.split_at(int_len);
        let (fraction, after) = match after.strip_prefix('.') {
            Some(after) => {
                let frac_len = after
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after.len());
                after.split_at(frac_len)
            }
            None => ("", after),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        let unit_nanos: u128 = match unit {
            "h" => 3_600_000_000_000,
            "m" => 60_000_000_000,
            "s" => 1_000_000_000,
            "ms" => 1_000_000,
            "us" | "µs" | "μs" => 1_000,
            "ns" => 1,
            "" => {
                return Err(Error::config(format!(
                    "missing unit in duration: {}",
                    input
                )));
            }
            unit => {
                return Err(Error::config(format!(
                    "unknown unit {:?} in duration: {}",
                    unit, input
                )));
            }
        };

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(unit_nanos).ok_or_else(invalid)?;

        // Digits past nanosecond precision are dropped
        let fraction = &fraction[..fraction.len().min(18)];
        if !fraction.is_empty() {
            let digits: u128 = fraction.parse().map_err(|_| invalid())?;
            nanos += digits * unit_nanos / 10u128.pow(fraction.len() as u32);
        }

        total_nanos = total_nanos.checked_add(nanos).ok_or_else(invalid)?;
        rest = after;
    }

    u64::try_from(total_nanos)
        .map(Duration::from_nanos)
        .map_err(|_| invalid())
}

/// Validate that a string is a valid domain name
///
/// This implements basic DNS domain name validation per RFC 1035, plus a
/// leading `*` wildcard label. It's not comprehensive but catches common errors.
pub fn validate_domain_name(domain: &str) -> Result<()> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);

    if domain.is_empty() {
        return Err(Error::config("Domain name cannot be empty"));
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        return Err(Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for (i, label) in domain.split('.').enumerate() {
        if label.is_empty() {
            return Err(Error::config(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }

        if i == 0 && label == "*" {
            continue;
        }

        if label.len() > 63 {
            return Err(Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}
