//! Core update engine
//!
//! The DdnsEngine is responsible for:
//! - Seeding reconciliation state from the provider at startup
//! - Resolving the current public address for every (record, type) pair
//! - Checking state so unchanged addresses cost no provider write
//! - Upserting DNS records via DnsProvider and recording what was published
//! - Running passes on a fixed interval, plus one final pass at shutdown
//!
//! ## Architecture
//!
//! ```text
//!                        ┌──────────────┐
//!        tick / shutdown │  DdnsEngine  │
//!       ────────────────▶│  update_all  │
//!                        └──────────────┘
//!                                │  one task per (record, type)
//!         ┌──────────────────────┼──────────────────────┐
//!         ▼                      ▼                      ▼
//! ┌─────────────────┐   ┌──────────────┐       ┌──────────────┐
//! │ AddressResolver │   │  StateStore  │       │ DnsProvider  │
//! │ (resolve)       │   │ (check/set)  │       │ (upsert)     │
//! └─────────────────┘   └──────────────┘       └──────────────┘
//! ```
//!
//! ## Unit of Work
//!
//! 1. Resolve the current address for the type's family
//! 2. Read the last published address for (zone, name, type)
//! 3. Equal to a recorded address → no-op
//! 4. Otherwise upsert at the provider
//! 5. On success, record the address
//!
//! Units are independent: a failing unit never blocks or rolls back its
//! siblings. Failures are collected and reported once per pass.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, RecordConfig, RecordType};
use crate::error::{Error, Result};
use crate::traits::{
    AddressResolver, DnsProvider, RecordKey, StateStore, UpsertOutcome, UpsertRequest,
};

/// What a single unit of work did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Address matched recorded state; provider not called
    Skipped,
    /// Record was created at the provider
    Created,
    /// Record was updated at the provider
    Updated,
    /// Provider already held the address; state recorded without a write
    Unchanged,
}

/// Aggregate result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Number of (record, type) units in the pass
    pub total: usize,
    /// Units that created a record
    pub created: usize,
    /// Units that updated a record
    pub updated: usize,
    /// Units whose record already matched at the provider
    pub unchanged: usize,
    /// Units skipped because state already matched
    pub skipped: usize,
    /// Units that failed
    pub failed: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Skipped => self.skipped += 1,
            UnitOutcome::Created => self.created += 1,
            UnitOutcome::Updated => self.updated += 1,
            UnitOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} record(s): {} created, {} updated, {} unchanged, {} skipped, {} failed",
            self.total, self.created, self.updated, self.unchanged, self.skipped, self.failed
        )
    }
}

/// Core update engine
///
/// The engine owns the reconciliation state and is its only writer.
///
/// ## Lifecycle
///
/// 1. Create with [`DdnsEngine::new()`]
/// 2. Either drive passes yourself with [`DdnsEngine::initialize_state()`]
///    and [`DdnsEngine::update_all()`], or hand control to
///    [`DdnsEngine::run()`]
/// 3. Cancel the shutdown token to stop; `run` performs one final pass
///
/// ## Threading
///
/// Each pass spawns one tokio task per (record, type) pair. Passes are
/// expected to run strictly one after another.
pub struct DdnsEngine {
    /// Public address lookup
    resolver: Arc<dyn AddressResolver>,

    /// DNS provider for reading and writing records
    provider: Arc<dyn DnsProvider>,

    /// Last published address per key
    state_store: Arc<dyn StateStore>,

    /// DNS records to manage
    records: Vec<RecordConfig>,

    /// Caps concurrent units when configured
    limiter: Option<Arc<Semaphore>>,

    /// Bound on the final pass at shutdown
    shutdown_timeout: Duration,
}

impl DdnsEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `resolver`: Address resolver implementation
    /// - `provider`: DNS provider implementation
    /// - `state_store`: State store implementation
    /// - `records`: Records to manage; types are parsed per unit of work and
    ///   a type repeated within one record yields a single unit
    /// - `config`: Engine settings
    pub fn new(
        resolver: Arc<dyn AddressResolver>,
        provider: Arc<dyn DnsProvider>,
        state_store: Arc<dyn StateStore>,
        records: Vec<RecordConfig>,
        config: &EngineConfig,
    ) -> Self {
        let limiter = (config.max_concurrent_updates > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_updates)));

        let records = records
            .into_iter()
            .map(|mut record| {
                let mut seen = HashSet::new();
                record.types.retain(|t| seen.insert(t.clone()));
                record
            })
            .collect();

        Self {
            resolver,
            provider,
            state_store,
            records,
            limiter,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }

    /// Number of (record, type) units in one pass
    pub fn unit_count(&self) -> usize {
        self.records.iter().map(|r| r.types.len()).sum()
    }

    /// Seed state from records already published at the provider
    ///
    /// Best-effort: a missing record, an unusable one, a failed lookup or an
    /// invalid type is logged and leaves the key absent, which makes the next
    /// pass treat it as a first run. Never fails.
    ///
    /// # Returns
    ///
    /// Number of keys seeded
    pub async fn initialize_state(&self, cancel: &CancellationToken) -> usize {
        info!(
            "Initializing state from {}...",
            self.provider.provider_name()
        );

        let mut seeded = 0;

        for record in &self.records {
            for raw_type in &record.types {
                if cancel.is_cancelled() {
                    warn!("State initialization cancelled after {} record(s)", seeded);
                    return seeded;
                }

                let record_type = match raw_type.parse::<RecordType>() {
                    Ok(record_type) => record_type,
                    Err(e) => {
                        warn!("Skipping {} ({}): {}", record.name, raw_type, e);
                        continue;
                    }
                };

                let lookup = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!("State initialization cancelled after {} record(s)", seeded);
                        return seeded;
                    }
                    res = self.provider.find_record(&record.zone_id, &record.name, record_type) => res,
                };

                let existing = match lookup {
                    Ok(Some(existing)) => existing,
                    Ok(None) => {
                        info!(
                            "Record {} ({}) not found in {}, will be created on first update",
                            record.name,
                            record_type,
                            self.provider.provider_name()
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            "Failed to look up {} ({}), will treat as first run: {}",
                            record.name, record_type, e
                        );
                        continue;
                    }
                };

                let ip = match existing.content.parse::<IpAddr>() {
                    Ok(ip) if record_type.ip_version().matches(&ip) => ip,
                    _ => {
                        warn!(
                            "Existing record {} ({}) has unusable content {:?}, will be rewritten on first update",
                            record.name, record_type, existing.content
                        );
                        continue;
                    }
                };

                let key = RecordKey::new(&record.zone_id, &record.name, record_type);
                if let Err(e) = self.state_store.set_last_ip(&key, ip).await {
                    warn!("Failed to record state for {}: {}", key, e);
                    continue;
                }

                debug!("Loaded existing record: {} ({}) = {}", record.name, record_type, ip);
                seeded += 1;
            }
        }

        info!("State initialization complete: {} record(s) loaded", seeded);
        seeded
    }

    /// Run one reconciliation pass over every (record, type) pair
    ///
    /// All units run concurrently. Successful units are committed to state
    /// regardless of sibling failures.
    ///
    /// # Returns
    ///
    /// - `Ok(PassSummary)`: Every unit succeeded (including no-ops)
    /// - `Err(Error::PartialFailure)`: Some units failed; the rest were applied
    /// - `Err(Error::Cancelled)`: `cancel` was already cancelled; nothing ran
    pub async fn update_all(&self, cancel: &CancellationToken) -> Result<PassSummary> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut units = JoinSet::new();

        for record in &self.records {
            for raw_type in &record.types {
                let unit = UpdateUnit {
                    resolver: Arc::clone(&self.resolver),
                    provider: Arc::clone(&self.provider),
                    state_store: Arc::clone(&self.state_store),
                    limiter: self.limiter.clone(),
                    record: record.clone(),
                    raw_type: raw_type.clone(),
                };
                units.spawn(unit.run(cancel.clone()));
            }
        }

        let mut summary = PassSummary {
            total: units.len(),
            ..PassSummary::default()
        };

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(Ok(outcome)) => summary.record(outcome),
                Ok(Err(e)) => {
                    error!("{}", e);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("Update task aborted: {}", e);
                    summary.failed += 1;
                }
            }
        }

        if summary.failed > 0 {
            return Err(Error::PartialFailure {
                failed: summary.failed,
                total: summary.total,
            });
        }

        Ok(summary)
    }

    /// Run the engine until `shutdown` is cancelled
    ///
    /// Seeds state, runs an initial pass, then one pass per `interval`
    /// (missed ticks are skipped, passes never overlap). Once `shutdown` is
    /// cancelled, in-flight units are abandoned, no new periodic pass starts,
    /// and a single final pass runs bounded by the configured shutdown
    /// timeout.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        info!(
            "Engine started: {} record(s), {} unit(s), check interval {:?}",
            self.records.len(),
            self.unit_count(),
            interval
        );

        self.initialize_state(&shutdown).await;

        info!("Running initial DNS update...");
        report_pass("Initial update", &self.update_all(&shutdown).await);

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Waiting for IP changes...");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("Checking for IP changes...");
                    report_pass("Update", &self.update_all(&shutdown).await);
                }
            }
        }

        info!("Performing final DNS update before shutdown...");
        report_pass("Final update", &self.final_pass().await);
        info!("Engine stopped");
    }

    /// One last pass with its own deadline
    ///
    /// The pass is polled before the deadline so its units are spawned even
    /// when the deadline is already due.
    async fn final_pass(&self) -> Result<PassSummary> {
        let deadline = CancellationToken::new();
        let pass = self.update_all(&deadline);
        tokio::pin!(pass);

        tokio::select! {
            biased;
            res = &mut pass => res,
            _ = tokio::time::sleep(self.shutdown_timeout) => {
                warn!(
                    "Final update exceeded {:?}, cancelling outstanding records",
                    self.shutdown_timeout
                );
                deadline.cancel();
                pass.await
            }
        }
    }
}

fn report_pass(label: &str, result: &Result<PassSummary>) {
    match result {
        Ok(summary) => info!("{} completed successfully: {}", label, summary),
        Err(Error::Cancelled) => warn!("{} not started: shutdown in progress", label),
        Err(e) => error!("{} completed with errors: {}", label, e),
    }
}

/// One (record, type) unit of work, owned by its task
struct UpdateUnit {
    resolver: Arc<dyn AddressResolver>,
    provider: Arc<dyn DnsProvider>,
    state_store: Arc<dyn StateStore>,
    limiter: Option<Arc<Semaphore>>,
    record: RecordConfig,
    raw_type: String,
}

impl UpdateUnit {
    /// Run to completion or until `cancel` fires
    ///
    /// Every error is tagged with the record name and type.
    async fn run(self, cancel: CancellationToken) -> Result<UnitOutcome> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = self.reconcile() => res,
        };

        result.map_err(|e| Error::for_record(&self.record.name, &self.raw_type, e))
    }

    async fn reconcile(&self) -> Result<UnitOutcome> {
        let _permit = match &self.limiter {
            Some(limiter) => Some(limiter.acquire().await.map_err(|_| Error::Cancelled)?),
            None => None,
        };

        let record_type: RecordType = self.raw_type.parse()?;
        let record = &self.record;
        let key = RecordKey::new(&record.zone_id, &record.name, record_type);

        let current_ip = self
            .resolver
            .resolve(record_type.ip_version())
            .await?;
        if !record_type.ip_version().matches(&current_ip) {
            return Err(Error::resolution(format!(
                "expected {} but got {}",
                record_type.ip_version(),
                current_ip
            )));
        }

        let last_ip = self.state_store.get_last_ip(&key).await?;
        if last_ip == Some(current_ip) {
            debug!("No change for {} ({}): {}", record.name, record_type, current_ip);
            return Ok(UnitOutcome::Skipped);
        }

        info!(
            "Updating {} ({}): {} -> {}",
            record.name,
            record_type,
            last_ip.map_or_else(|| "<none>".to_string(), |ip| ip.to_string()),
            current_ip
        );

        let content = current_ip.to_string();
        let outcome = self
            .provider
            .upsert_record(&UpsertRequest {
                zone_id: &record.zone_id,
                name: &record.name,
                record_type,
                content: &content,
                ttl: record.ttl,
                proxied: record.proxied,
            })
            .await?;

        self.state_store.set_last_ip(&key, current_ip).await?;

        Ok(match outcome {
            UpsertOutcome::Created { record_id } => {
                info!(
                    "Created {} ({}) = {} [id: {}]",
                    record.name, record_type, current_ip, record_id
                );
                UnitOutcome::Created
            }
            UpsertOutcome::Updated {
                previous_content, ..
            } => {
                info!(
                    "Successfully updated {} ({}) to {} (provider had: {})",
                    record.name, record_type, current_ip, previous_content
                );
                UnitOutcome::Updated
            }
            UpsertOutcome::Unchanged { .. } => {
                info!(
                    "{} ({}) already set to {} at provider",
                    record.name, record_type, current_ip
                );
                UnitOutcome::Unchanged
            }
        })
    }
}
