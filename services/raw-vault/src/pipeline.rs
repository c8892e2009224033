//! Pipeline orchestration
//!
//! Runs one batch over the requested entity set in strict stage order:
//!
//! 1. fetch and stage (bounded retries, malformed input quarantined)
//! 2. hubs, one job per entity
//! 3. links, after every hub job of the run has committed
//! 4. satellites, only for entities whose hub committed
//!
//! Jobs inside a stage touch disjoint stores and may run on scoped threads.
//! A failure in one entity never stops its siblings. A key collision is
//! fatal: the current stage finishes and the run halts before the next one.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use vault_types::errors::VaultError;
use vault_types::ids::{EntityKind, LinkKind, RunId};
use vault_types::time::Timestamp;

use crate::config::EngineConfig;
use crate::feed::{FeedBatch, RecordFeed};
use crate::hub::HubBuilder;
use crate::link::LinkBuilder;
use crate::loader::{IncrementalLoader, LoadMode, LoadReport, WatermarkRegistry};
use crate::model::{stage, LinkCandidate, StagedRecord};
use crate::quarantine::QuarantineLog;
use crate::satellite::SatelliteBuilder;
use crate::dedup::earliest_per_key;
use crate::store::{HubStore, InsertOutcome, LinkStore, ObservationRow, ObservationStore, SatelliteStore, TargetStore};

// ── Vault state ─────────────────────────────────────────────────────

pub const OBSERVATION_TARGET: &str = "obs_asset_price";

/// Every store of the raw vault plus the bookkeeping that must survive
/// between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub hubs: BTreeMap<EntityKind, HubStore>,
    pub links: BTreeMap<LinkKind, LinkStore>,
    pub satellites: BTreeMap<EntityKind, SatelliteStore>,
    /// Every price observation, including ones that repeat the last state.
    pub observations: ObservationStore,
    pub watermarks: WatermarkRegistry,
    /// Link candidates waiting for a hub row.
    pub deferred: BTreeMap<LinkKind, Vec<LinkCandidate>>,
    pub quarantine: QuarantineLog,
}

impl Vault {
    pub fn new() -> Self {
        Self {
            hubs: EntityKind::ALL.iter().map(|e| (*e, HubStore::new(*e))).collect(),
            links: LinkKind::ALL.iter().map(|k| (*k, LinkStore::new(*k))).collect(),
            satellites: EntityKind::ALL
                .iter()
                .map(|e| (*e, SatelliteStore::new(*e)))
                .collect(),
            observations: ObservationStore::new(EntityKind::Asset),
            watermarks: WatermarkRegistry::new(),
            deferred: BTreeMap::new(),
            quarantine: QuarantineLog::new(),
        }
    }

    pub fn hub(&self, entity: EntityKind) -> Option<&HubStore> {
        self.hubs.get(&entity)
    }

    pub fn link(&self, kind: LinkKind) -> Option<&LinkStore> {
        self.links.get(&kind)
    }

    pub fn satellite(&self, entity: EntityKind) -> Option<&SatelliteStore> {
        self.satellites.get(&entity)
    }

    pub fn deferred(&self, kind: LinkKind) -> &[LinkCandidate] {
        self.deferred.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row count per target name.
    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (entity, hub) in &self.hubs {
            counts.insert(entity.hub_target(), hub.len());
        }
        for (kind, link) in &self.links {
            counts.insert(kind.target(), link.len());
        }
        for (entity, sat) in &self.satellites {
            counts.insert(entity.satellite_target(), sat.len());
        }
        counts.insert(OBSERVATION_TARGET.to_string(), self.observations.len());
        counts
    }

    pub fn total_rows(&self) -> usize {
        self.row_counts().values().sum()
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

// ── Requests & reports ──────────────────────────────────────────────

/// What the scheduler asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub entities: BTreeSet<EntityKind>,
    pub mode: LoadMode,
}

impl RunRequest {
    pub fn new(mode: LoadMode, entities: impl IntoIterator<Item = EntityKind>) -> Self {
        Self {
            entities: entities.into_iter().collect(),
            mode,
        }
    }

    pub fn all(mode: LoadMode) -> Self {
        Self::new(mode, EntityKind::ALL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Succeeded,
    /// Completed with quarantined input, or cut short by a halted run.
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReport {
    pub status: EntityStatus,
    pub fetched: usize,
    pub quarantined: usize,
    pub hub: Option<LoadReport>,
    pub satellite: Option<LoadReport>,
    /// New observation rows; only price feeds record them.
    pub observations: usize,
    pub errors: Vec<String>,
}

impl EntityReport {
    fn new() -> Self {
        Self {
            status: EntityStatus::Succeeded,
            fetched: 0,
            quarantined: 0,
            hub: None,
            satellite: None,
            observations: 0,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, error: &VaultError) {
        self.status = EntityStatus::Failed;
        self.errors.push(error.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReport {
    pub status: EntityStatus,
    pub load: Option<LoadReport>,
    /// Candidates still deferred after this run.
    pub pending: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub mode: LoadMode,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// A fatal error stopped the run between stages.
    pub halted: bool,
    pub entities: BTreeMap<EntityKind, EntityReport>,
    pub links: BTreeMap<LinkKind, LinkReport>,
}

impl RunReport {
    pub fn rows_inserted(&self) -> usize {
        let entity_rows: usize = self
            .entities
            .values()
            .flat_map(|r| r.hub.iter().chain(r.satellite.iter()))
            .map(|l| l.build.inserted)
            .sum();
        let link_rows: usize = self
            .links
            .values()
            .filter_map(|r| r.load.as_ref())
            .map(|l| l.build.inserted)
            .sum();
        entity_rows + link_rows
    }

    pub fn status(&self, entity: EntityKind) -> Option<EntityStatus> {
        self.entities.get(&entity).map(|r| r.status)
    }

    /// Every entity and link succeeded without quarantine.
    pub fn is_clean(&self) -> bool {
        !self.halted
            && self.entities.values().all(|r| r.status == EntityStatus::Succeeded)
            && self.links.values().all(|r| r.status == EntityStatus::Succeeded)
    }
}

/// Append one row per distinct `(parent, observed_at)` event whose hub row
/// exists. Returns the number of new rows.
fn record_observations(
    store: &mut ObservationStore,
    parents: Option<&HubStore>,
    batch: Vec<StagedRecord>,
) -> usize {
    let Some(parents) = parents else {
        return 0;
    };
    let mut inserted = 0;
    for record in earliest_per_key(batch, |r| (r.hub_key().clone(), r.effective_at)) {
        if !parents.contains(record.hub_key()) {
            continue;
        }
        let row = ObservationRow {
            parent_key: record.hub_key().clone(),
            observed_at: record.effective_at,
            hashdiff: record.hashdiff,
            load_timestamp: record.load_timestamp,
            record_source: record.record_source,
        };
        if store.insert(row) == InsertOutcome::Inserted {
            inserted += 1;
        }
    }
    if inserted > 0 {
        info!(target_store = OBSERVATION_TARGET, inserted, "Observations recorded");
    }
    inserted
}

// ── Stage jobs ──────────────────────────────────────────────────────

/// Run one closure per job, on scoped threads when `parallel` is set.
/// Results come back in job order.
fn run_jobs<J, R, F>(parallel: bool, jobs: Vec<J>, f: F) -> Vec<R>
where
    J: Send,
    R: Send,
    F: Fn(J) -> R + Sync,
{
    if !parallel || jobs.len() < 2 {
        return jobs.into_iter().map(f).collect();
    }
    thread::scope(|scope| {
        let f = &f;
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| scope.spawn(move || f(job)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

// ── Pipeline ────────────────────────────────────────────────────────

pub struct Pipeline<'a, F: RecordFeed + ?Sized> {
    feed: &'a F,
    config: EngineConfig,
}

impl<'a, F: RecordFeed + ?Sized> Pipeline<'a, F> {
    pub fn new(feed: &'a F, config: EngineConfig) -> Self {
        Self { feed, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch with bounded retries on retryable errors.
    fn fetch_with_retry(
        &self,
        entity: EntityKind,
        since: Option<Timestamp>,
    ) -> Result<FeedBatch, VaultError> {
        let max_attempts = self.config.max_fetch_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.feed.fetch(entity, since) {
                Ok(batch) => return Ok(batch),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(entity = %entity, attempt, max_attempts, error = %e, "Fetch failed, retrying");
                    if self.config.retry_backoff_ms > 0 {
                        thread::sleep(Duration::from_millis(self.config.retry_backoff_ms));
                    }
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        entity = %entity,
                        attempts = attempt,
                        error = %e,
                        "Fetch failed, retry budget exhausted"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Oldest watermark among the targets an entity feeds. `None` if any of
    /// them has never been loaded.
    fn fetch_since(&self, watermarks: &WatermarkRegistry, entity: EntityKind, mode: LoadMode) -> Option<Timestamp> {
        if mode == LoadMode::Full {
            return None;
        }
        let mut targets = vec![entity.hub_target(), entity.satellite_target()];
        targets.extend(
            LinkKind::ALL
                .iter()
                .filter(|k| k.driving_entity() == entity)
                .map(LinkKind::target),
        );
        let marks: Option<Vec<Timestamp>> = targets.iter().map(|t| watermarks.get(t)).collect();
        marks.and_then(|m| m.into_iter().min())
    }

    pub fn run(&self, vault: &mut Vault, request: &RunRequest) -> RunReport {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let mode = request.mode;
        let loader = IncrementalLoader::new(mode);
        let parallel = self.config.parallel_stages;

        info!(
            run_id = %run_id,
            mode = %mode,
            entities = ?request.entities,
            "Pipeline run started"
        );

        let mut entities: BTreeMap<EntityKind, EntityReport> = request
            .entities
            .iter()
            .map(|e| (*e, EntityReport::new()))
            .collect();
        let mut links: BTreeMap<LinkKind, LinkReport> = BTreeMap::new();
        let mut halted = false;

        // ── Stage 1: fetch and stage ──

        let fetch_jobs: Vec<(EntityKind, Option<Timestamp>)> = request
            .entities
            .iter()
            .map(|e| (*e, self.fetch_since(&vault.watermarks, *e, mode)))
            .collect();
        let fetched = run_jobs(parallel, fetch_jobs, |(entity, since)| {
            (entity, self.fetch_with_retry(entity, since))
        });

        let mut staged: BTreeMap<EntityKind, Vec<StagedRecord>> = BTreeMap::new();
        for (entity, result) in fetched {
            let report = entities.entry(entity).or_insert_with(EntityReport::new);
            let batch = match result {
                Ok(batch) => batch,
                Err(e) => {
                    report.fail(&e);
                    continue;
                }
            };
            report.fetched = batch.len();

            for rejected in batch.rejected {
                warn!(entity = %entity, reason = %rejected.reason, "Quarantining unparseable record");
                vault.quarantine.push(run_id, entity, rejected.reason, rejected.payload, started_at);
                report.quarantined += 1;
            }

            let mut records = Vec::with_capacity(batch.records.len());
            for record in batch.records {
                match stage(&record) {
                    Ok(s) => records.push(s),
                    Err(e) => {
                        warn!(entity = %entity, error = %e, "Quarantining malformed record");
                        let payload = serde_json::to_value(&record).unwrap_or(serde_json::Value::Null);
                        vault.quarantine.push(run_id, entity, e.to_string(), payload, started_at);
                        report.quarantined += 1;
                    }
                }
            }
            staged.insert(entity, records);
        }

        // ── Stage 2: hubs ──

        let hub_jobs: Vec<(EntityKind, &mut HubStore, Vec<StagedRecord>, Option<Timestamp>)> = vault
            .hubs
            .iter_mut()
            .filter_map(|(entity, store)| {
                staged.get(entity).map(|records| {
                    (*entity, store, records.clone(), vault.watermarks.get(&entity.hub_target()))
                })
            })
            .collect();
        let hub_results = run_jobs(parallel, hub_jobs, |(entity, store, batch, mark)| {
            let mut builder = HubBuilder::new(entity);
            (entity, loader.run(&mut builder, store, mark, batch))
        });

        let mut hub_committed: BTreeSet<EntityKind> = BTreeSet::new();
        for (entity, result) in hub_results {
            let report = entities.entry(entity).or_insert_with(EntityReport::new);
            match result {
                Ok(load) => {
                    if let Some(mark) = load.watermark_after {
                        vault.watermarks.advance(&load.target, mark);
                    }
                    report.hub = Some(load);
                    hub_committed.insert(entity);
                }
                Err(e) => {
                    halted |= e.is_fatal();
                    report.fail(&e);
                }
            }
        }

        // ── Stage 3: links ──

        if halted {
            error!(run_id = %run_id, "Fatal error in hub stage, halting before links");
        } else {
            let mut candidates: BTreeMap<LinkKind, Vec<LinkCandidate>> = BTreeMap::new();
            for entity in &hub_committed {
                for record in staged.get(entity).into_iter().flatten() {
                    for link in &record.links {
                        candidates.entry(link.kind).or_default().push(link.clone());
                    }
                }
            }

            let hubs = &vault.hubs;
            let deferred = &mut vault.deferred;
            let watermarks = &vault.watermarks;
            let link_jobs: Vec<_> = vault
                .links
                .iter_mut()
                .filter_map(|(kind, store)| {
                    let pending = deferred.remove(kind).unwrap_or_default();
                    let batch = candidates.remove(kind).unwrap_or_default();
                    if pending.is_empty() && batch.is_empty() {
                        return None;
                    }
                    Some((*kind, store, pending, batch, watermarks.get(&kind.target())))
                })
                .collect();

            let link_results = run_jobs(parallel, link_jobs, |(kind, store, pending, batch, mark)| {
                let mut builder = LinkBuilder::new(kind, hubs, pending);
                let result = loader.run(&mut builder, store, mark, batch);
                (kind, result, builder.into_pending())
            });

            for (kind, result, pending) in link_results {
                let pending_count = pending.len();
                if !pending.is_empty() {
                    vault.deferred.insert(kind, pending);
                }
                let report = match result {
                    Ok(load) => {
                        if let Some(mark) = load.watermark_after {
                            vault.watermarks.advance(&load.target, mark);
                        }
                        LinkReport {
                            status: EntityStatus::Succeeded,
                            load: Some(load),
                            pending: pending_count,
                            error: None,
                        }
                    }
                    Err(e) => {
                        halted |= e.is_fatal();
                        LinkReport {
                            status: EntityStatus::Failed,
                            load: None,
                            pending: pending_count,
                            error: Some(e.to_string()),
                        }
                    }
                };
                links.insert(kind, report);
            }
        }

        // ── Stage 4: satellites ──

        if halted {
            error!(run_id = %run_id, "Run halted, satellites not built");
        } else {
            let mut observed = if hub_committed.contains(&EntityKind::Asset) {
                staged.get(&EntityKind::Asset).cloned().unwrap_or_default()
            } else {
                Vec::new()
            };

            let hubs = &vault.hubs;
            let watermarks = &vault.watermarks;
            let sat_jobs: Vec<_> = vault
                .satellites
                .iter_mut()
                .filter(|(entity, _)| hub_committed.contains(*entity))
                .filter_map(|(entity, store)| {
                    let parents = hubs.get(entity)?;
                    let batch = staged.remove(entity).unwrap_or_default();
                    Some((*entity, parents, store, batch, watermarks.get(&entity.satellite_target())))
                })
                .collect();

            let sat_results = run_jobs(parallel, sat_jobs, |(entity, parents, store, batch, mark)| {
                let mut builder = SatelliteBuilder::new(parents);
                (entity, loader.run(&mut builder, store, mark, batch))
            });

            for (entity, result) in sat_results {
                let report = entities.entry(entity).or_insert_with(EntityReport::new);
                match result {
                    Ok(load) => {
                        if let Some(mark) = load.watermark_after {
                            vault.watermarks.advance(&load.target, mark);
                        }
                        report.satellite = Some(load);
                        if entity == EntityKind::Asset {
                            report.observations = record_observations(
                                &mut vault.observations,
                                vault.hubs.get(&entity),
                                std::mem::take(&mut observed),
                            );
                        }
                    }
                    Err(e) => {
                        halted |= e.is_fatal();
                        report.fail(&e);
                    }
                }
            }
        }

        for report in entities.values_mut() {
            if report.status == EntityStatus::Failed {
                continue;
            }
            if report.quarantined > 0 || report.satellite.is_none() {
                report.status = EntityStatus::Partial;
            }
        }

        let finished_at = Utc::now();
        let run = RunReport {
            run_id,
            mode,
            started_at,
            finished_at,
            halted,
            entities,
            links,
        };

        if halted {
            error!(run_id = %run_id, "Pipeline run halted on a fatal error");
        } else {
            info!(
                run_id = %run_id,
                rows_inserted = run.rows_inserted(),
                clean = run.is_clean(),
                "Pipeline run finished"
            );
        }
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::testing::ts;
    use crate::feed::MemoryFeed;
    use vault_types::records::{AssetPriceRecord, CustomerRecord, SourceRecord, TransactionRecord};

    fn customer(id: &str, tier: &str, at: i64) -> SourceRecord {
        SourceRecord::Customer(CustomerRecord {
            customer_id: Some(id.to_string()),
            customer_tier: Some(tier.to_string()),
            load_timestamp: Some(ts(at)),
            record_source: Some("crm".to_string()),
            ..Default::default()
        })
    }

    fn trade(id: &str, customer: &str, symbol: &str, at: i64) -> SourceRecord {
        SourceRecord::Transaction(TransactionRecord {
            transaction_id: Some(id.to_string()),
            customer_id: Some(customer.to_string()),
            asset_symbol: Some(symbol.to_string()),
            asset_type: Some("stock".to_string()),
            transaction_type: Some("BUY".to_string()),
            load_timestamp: Some(ts(at)),
            record_source: Some("tx".to_string()),
            ..Default::default()
        })
    }

    fn price(symbol: &str, at: i64) -> SourceRecord {
        SourceRecord::Asset(AssetPriceRecord {
            symbol: Some(symbol.to_string()),
            asset_type: Some("stock".to_string()),
            observed_at: Some(ts(at)),
            load_timestamp: Some(ts(at)),
            record_source: Some("prices".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_run_jobs_preserves_order() {
        let out = run_jobs(true, vec![3, 1, 2], |x| x * 10);
        assert_eq!(out, vec![30, 10, 20]);
        let out = run_jobs(false, vec![3, 1, 2], |x| x * 10);
        assert_eq!(out, vec![30, 10, 20]);
    }

    #[test]
    fn test_full_run_builds_all_stores() {
        let mut feed = MemoryFeed::new();
        feed.extend(vec![customer("C1", "Gold", 1), price("AAPL", 1), trade("T1", "C1", "AAPL", 2)]);
        let mut vault = Vault::new();
        let report = Pipeline::new(&feed, EngineConfig::default()).run(&mut vault, &RunRequest::all(LoadMode::Full));

        assert!(!report.halted);
        let counts = vault.row_counts();
        assert_eq!(counts["hub_customer"], 1);
        assert_eq!(counts["hub_asset"], 1);
        assert_eq!(counts["hub_transaction"], 1);
        assert_eq!(counts["link_transaction_customer"], 1);
        assert_eq!(counts["link_transaction_asset"], 1);
        assert_eq!(counts["sat_customer"], 1);
        assert_eq!(report.status(EntityKind::Customer), Some(EntityStatus::Succeeded));
    }

    #[test]
    fn test_malformed_records_quarantined_batch_continues() {
        let mut feed = MemoryFeed::new();
        feed.push(customer("C1", "Gold", 1));
        feed.push(SourceRecord::Customer(CustomerRecord {
            load_timestamp: Some(ts(1)),
            record_source: Some("crm".to_string()),
            ..Default::default()
        }));
        let mut vault = Vault::new();
        let report = Pipeline::new(&feed, EngineConfig::default())
            .run(&mut vault, &RunRequest::new(LoadMode::Full, [EntityKind::Customer]));

        assert_eq!(report.status(EntityKind::Customer), Some(EntityStatus::Partial));
        assert_eq!(report.entities[&EntityKind::Customer].quarantined, 1);
        assert_eq!(vault.quarantine.len(), 1);
        assert_eq!(vault.hub(EntityKind::Customer).unwrap().len(), 1);
    }

    #[test]
    fn test_retry_then_success() {
        let mut feed = MemoryFeed::new();
        feed.push(customer("C1", "Gold", 1));
        feed.fail_next(EntityKind::Customer, 2);
        let mut vault = Vault::new();
        let report = Pipeline::new(&feed, EngineConfig::default())
            .run(&mut vault, &RunRequest::new(LoadMode::Full, [EntityKind::Customer]));
        assert_eq!(report.status(EntityKind::Customer), Some(EntityStatus::Succeeded));
    }

    #[test]
    fn test_retry_budget_exhausted_isolated_to_entity() {
        let mut feed = MemoryFeed::new();
        feed.extend(vec![customer("C1", "Gold", 1), price("AAPL", 1)]);
        feed.fail_next(EntityKind::Customer, 10);
        let mut vault = Vault::new();
        let report = Pipeline::new(&feed, EngineConfig::default()).run(
            &mut vault,
            &RunRequest::new(LoadMode::Full, [EntityKind::Customer, EntityKind::Asset]),
        );
        assert_eq!(report.status(EntityKind::Customer), Some(EntityStatus::Failed));
        assert_eq!(report.status(EntityKind::Asset), Some(EntityStatus::Succeeded));
        assert!(vault.hub(EntityKind::Customer).unwrap().is_empty());
        assert_eq!(vault.hub(EntityKind::Asset).unwrap().len(), 1);
        assert!(vault.watermarks.get("hub_customer").is_none());
    }

    #[test]
    fn test_repeated_price_recorded_as_observation() {
        let mut feed = MemoryFeed::new();
        feed.extend(vec![price("AAPL", 1), price("AAPL", 2), price("MSFT", 2)]);
        let mut vault = Vault::new();
        let pipeline = Pipeline::new(&feed, EngineConfig::default());
        let report = pipeline.run(&mut vault, &RunRequest::all(LoadMode::Incremental));

        assert_eq!(vault.satellite(EntityKind::Asset).unwrap().len(), 2);
        assert_eq!(vault.observations.len(), 3);
        assert_eq!(report.entities[&EntityKind::Asset].observations, 3);

        let again = pipeline.run(&mut vault, &RunRequest::all(LoadMode::Incremental));
        assert_eq!(again.entities[&EntityKind::Asset].observations, 0);
        assert_eq!(vault.row_counts()[OBSERVATION_TARGET], 3);
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let mut feed = MemoryFeed::new();
        feed.extend(vec![
            customer("C1", "Gold", 1),
            customer("C1", "Platinum", 3),
            price("AAPL", 1),
            trade("T1", "C1", "AAPL", 2),
            trade("T2", "C1", "MSFT", 2),
        ]);
        let mut sequential = Vault::new();
        let config = EngineConfig {
            parallel_stages: false,
            ..EngineConfig::default()
        };
        Pipeline::new(&feed, config).run(&mut sequential, &RunRequest::all(LoadMode::Incremental));

        let mut parallel = Vault::new();
        Pipeline::new(&feed, EngineConfig::default()).run(&mut parallel, &RunRequest::all(LoadMode::Incremental));

        assert_eq!(sequential, parallel);
        assert_eq!(parallel.deferred(LinkKind::TransactionAsset).len(), 1);
    }
}
