//! Test doubles and common utilities for engine contract tests
//!
//! The doubles here are scripted in-memory stand-ins for the address
//! resolver and the DNS provider, with call counters and failure injection.

#![allow(dead_code)]

use cfddns_core::config::{EngineConfig, RecordConfig, RecordType};
use cfddns_core::error::{Error, Result};
use cfddns_core::traits::{AddressResolver, DnsProvider, DnsRecord, IpVersion, UpsertRequest};
use cfddns_core::{DdnsEngine, MemoryStateStore};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the scripted resolver answers for a family
#[derive(Debug, Clone)]
pub enum Answer {
    /// Return this address
    Addr(IpAddr),
    /// Fail as if every lookup service were unreachable
    Exhausted,
    /// Never answer
    Hang,
}

/// An AddressResolver whose answers are set by the test
#[derive(Clone)]
pub struct ScriptedResolver {
    answers: Arc<Mutex<HashMap<IpVersion, Answer>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self {
            answers: Arc::new(Mutex::new(HashMap::new())),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn answer(&self, version: IpVersion, ip: &str) {
        let ip: IpAddr = ip.parse().expect("valid test address");
        self.set(version, Answer::Addr(ip));
    }

    pub fn set(&self, version: IpVersion, answer: Answer) {
        self.answers.lock().unwrap().insert(version, answer);
    }

    /// Number of resolve() calls
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of resolve() calls observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl AddressResolver for ScriptedResolver {
    async fn resolve(&self, version: IpVersion) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let answer = self.answers.lock().unwrap().get(&version).cloned();
        match answer {
            Some(Answer::Addr(ip)) => Ok(ip),
            Some(Answer::Hang) => std::future::pending().await,
            Some(Answer::Exhausted) | None => Err(Error::resolution(format!(
                "failed to detect {} address from all services",
                version
            ))),
        }
    }
}

/// A single provider write seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Create {
        name: String,
        record_type: RecordType,
        content: String,
        ttl: u32,
        proxied: bool,
    },
    Update {
        record_id: String,
        content: String,
        ttl: u32,
        proxied: bool,
    },
}

type Key = (String, String, RecordType);

/// An in-memory DnsProvider that tracks calls
///
/// Only find/create/update are implemented; upserts go through the trait's
/// own composition.
#[derive(Clone)]
pub struct MockDnsProvider {
    records: Arc<Mutex<HashMap<Key, DnsRecord>>>,
    writes: Arc<Mutex<Vec<Write>>>,
    find_calls: Arc<AtomicUsize>,
    next_id: Arc<AtomicUsize>,
    failing_zones: Arc<Mutex<HashSet<String>>>,
    failing_lookups: Arc<Mutex<HashSet<String>>>,
    create_races: Arc<Mutex<HashSet<String>>>,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            writes: Arc::new(Mutex::new(Vec::new())),
            find_calls: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicUsize::new(1)),
            failing_zones: Arc::new(Mutex::new(HashSet::new())),
            failing_lookups: Arc::new(Mutex::new(HashSet::new())),
            create_races: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Pre-populate a record at the "provider"
    pub fn seed(&self, zone_id: &str, name: &str, record_type: RecordType, content: &str) {
        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().insert(
            (zone_id.to_string(), name.to_string(), record_type),
            DnsRecord {
                id,
                name: name.to_string(),
                record_type,
                content: content.to_string(),
                ttl: 120,
                proxied: false,
            },
        );
    }

    /// Every call touching `zone_id` fails with an authentication error
    pub fn fail_zone(&self, zone_id: &str) {
        self.failing_zones.lock().unwrap().insert(zone_id.to_string());
    }

    /// Lookups (only) for `name` fail with a transport error
    pub fn fail_lookups_for(&self, name: &str) {
        self.failing_lookups.lock().unwrap().insert(name.to_string());
    }

    /// The first create of `name` loses a race: another writer creates it first
    pub fn race_create_of(&self, name: &str) {
        self.create_races.lock().unwrap().insert(name.to_string());
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    /// Current content at the provider for a key
    pub fn content_of(&self, zone_id: &str, name: &str, record_type: RecordType) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(&(zone_id.to_string(), name.to_string(), record_type))
            .map(|r| r.content.clone())
    }

    fn check_zone(&self, zone_id: &str) -> Result<()> {
        if self.failing_zones.lock().unwrap().contains(zone_id) {
            return Err(Error::auth(format!("token not valid for zone {}", zone_id)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn find_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<DnsRecord>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check_zone(zone_id)?;
        if self.failing_lookups.lock().unwrap().contains(name) {
            return Err(Error::http("connection reset"));
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(zone_id.to_string(), name.to_string(), record_type))
            .cloned())
    }

    async fn create_record(&self, request: &UpsertRequest<'_>) -> Result<DnsRecord> {
        self.check_zone(request.zone_id)?;

        if self.create_races.lock().unwrap().remove(request.name) {
            self.seed(request.zone_id, request.name, request.record_type, "192.0.2.1");
            return Err(Error::already_exists(request.name));
        }

        self.writes.lock().unwrap().push(Write::Create {
            name: request.name.to_string(),
            record_type: request.record_type,
            content: request.content.to_string(),
            ttl: request.ttl,
            proxied: request.proxied,
        });

        let record = DnsRecord {
            id: format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            name: request.name.to_string(),
            record_type: request.record_type,
            content: request.content.to_string(),
            ttl: request.ttl,
            proxied: request.proxied,
        };
        self.records.lock().unwrap().insert(
            (
                request.zone_id.to_string(),
                request.name.to_string(),
                request.record_type,
            ),
            record.clone(),
        );

        Ok(record)
    }

    async fn update_record(&self, record_id: &str, request: &UpsertRequest<'_>) -> Result<()> {
        self.check_zone(request.zone_id)?;

        self.writes.lock().unwrap().push(Write::Update {
            record_id: record_id.to_string(),
            content: request.content.to_string(),
            ttl: request.ttl,
            proxied: request.proxied,
        });

        let mut records = self.records.lock().unwrap();
        let record = records
            .values_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| Error::not_found(record_id))?;
        record.content = request.content.to_string();
        record.ttl = request.ttl;
        record.proxied = request.proxied;

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A record with the given types, TTL 120, not proxied
pub fn record(zone_id: &str, name: &str, types: &[&str]) -> RecordConfig {
    types
        .iter()
        .fold(RecordConfig::new(zone_id, name).with_ttl(120), |r, t| {
            r.with_type(*t)
        })
}

/// Bundle of an engine and handles on its collaborators
pub struct Harness {
    pub engine: Arc<DdnsEngine>,
    pub resolver: ScriptedResolver,
    pub provider: MockDnsProvider,
    pub state: MemoryStateStore,
}

pub fn harness(records: Vec<RecordConfig>) -> Harness {
    harness_with(records, ScriptedResolver::new(), EngineConfig::default())
}

pub fn harness_with(
    records: Vec<RecordConfig>,
    resolver: ScriptedResolver,
    config: EngineConfig,
) -> Harness {
    let provider = MockDnsProvider::new();
    let state = MemoryStateStore::new();

    let engine = DdnsEngine::new(
        Arc::new(resolver.clone()),
        Arc::new(provider.clone()),
        Arc::new(state.clone()),
        records,
        &config,
    );

    Harness {
        engine: Arc::new(engine),
        resolver,
        provider,
        state,
    }
}
