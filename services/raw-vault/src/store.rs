//! Insert-only target stores
//!
//! Hub, link and satellite stores never update or delete a row. Uniqueness
//! is enforced by an existence check before append; a second write of the
//! same identity is reported as already present, and a second write of a
//! different natural key under the same surrogate is a collision.
//!
//! All maps are `BTreeMap` so iteration and serialization are deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vault_types::errors::VaultError;
use vault_types::ids::{EntityKind, HashDiff, HashKey, LinkKind};
use vault_types::time::Timestamp;
use vault_types::value::AttributeSet;

/// Existence check exposed to the incremental loader for anti-joins.
pub trait TargetStore {
    type Identity;

    /// Target name, e.g. `hub_customer`.
    fn target(&self) -> String;

    fn contains(&self, identity: &Self::Identity) -> bool;

    fn row_count(&self) -> usize;
}

/// Result of a single append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

// ── Hubs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubRow {
    pub hub_key: HashKey,
    /// Canonical natural-key parts.
    pub business_key: Vec<String>,
    pub first_seen_at: Timestamp,
    pub record_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubStore {
    entity: EntityKind,
    rows: BTreeMap<HashKey, HubRow>,
}

impl HubStore {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            rows: BTreeMap::new(),
        }
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn get(&self, key: &HashKey) -> Option<&HubRow> {
        self.rows.get(key)
    }

    pub fn rows(&self) -> impl Iterator<Item = &HubRow> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append unless the key exists. A different natural key under an
    /// existing surrogate is a [`VaultError::DuplicateKeyCollision`].
    pub fn insert(&mut self, row: HubRow) -> Result<InsertOutcome, VaultError> {
        if let Some(existing) = self.rows.get(&row.hub_key) {
            if existing.business_key != row.business_key {
                return Err(VaultError::DuplicateKeyCollision {
                    target: self.target(),
                    key: row.hub_key,
                    existing: existing.business_key.join("|"),
                    incoming: row.business_key.join("|"),
                });
            }
            return Ok(InsertOutcome::AlreadyPresent);
        }
        self.rows.insert(row.hub_key.clone(), row);
        Ok(InsertOutcome::Inserted)
    }
}

impl TargetStore for HubStore {
    type Identity = HashKey;

    fn target(&self) -> String {
        self.entity.hub_target()
    }

    fn contains(&self, identity: &HashKey) -> bool {
        self.rows.contains_key(identity)
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// ── Links ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRow {
    pub link_key: HashKey,
    /// Participating hub keys in `LinkKind::participants` order.
    pub hub_keys: Vec<HashKey>,
    pub first_seen_at: Timestamp,
    pub record_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStore {
    kind: LinkKind,
    rows: BTreeMap<HashKey, LinkRow>,
}

impl LinkStore {
    pub fn new(kind: LinkKind) -> Self {
        Self {
            kind,
            rows: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    pub fn get(&self, key: &HashKey) -> Option<&LinkRow> {
        self.rows.get(key)
    }

    pub fn rows(&self) -> impl Iterator<Item = &LinkRow> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn insert(&mut self, row: LinkRow) -> Result<InsertOutcome, VaultError> {
        if let Some(existing) = self.rows.get(&row.link_key) {
            if existing.hub_keys != row.hub_keys {
                return Err(VaultError::DuplicateKeyCollision {
                    target: self.target(),
                    key: row.link_key,
                    existing: join_keys(&existing.hub_keys),
                    incoming: join_keys(&row.hub_keys),
                });
            }
            return Ok(InsertOutcome::AlreadyPresent);
        }
        self.rows.insert(row.link_key.clone(), row);
        Ok(InsertOutcome::Inserted)
    }
}

fn join_keys(keys: &[HashKey]) -> String {
    keys.iter().map(HashKey::short).collect::<Vec<_>>().join("|")
}

impl TargetStore for LinkStore {
    type Identity = HashKey;

    fn target(&self) -> String {
        self.kind.target()
    }

    fn contains(&self, identity: &HashKey) -> bool {
        self.rows.contains_key(identity)
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// ── Satellites ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatelliteRow {
    pub parent_key: HashKey,
    pub hashdiff: HashDiff,
    pub attributes: AttributeSet,
    /// Time the state took effect: `observed_at` for prices, otherwise the load time.
    pub effective_at: Timestamp,
    pub load_timestamp: Timestamp,
    pub record_source: String,
}

/// Identity used by the incremental anti-join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatelliteIdentity {
    pub parent_key: HashKey,
    pub hashdiff: HashDiff,
    pub effective_at: Timestamp,
}

/// Per-parent history, each vector sorted by `effective_at` with no two rows
/// sharing an effective time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteStore {
    entity: EntityKind,
    rows: BTreeMap<HashKey, Vec<SatelliteRow>>,
}

impl SatelliteStore {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            rows: BTreeMap::new(),
        }
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn parents(&self) -> impl Iterator<Item = &HashKey> {
        self.rows.keys()
    }

    /// Full history for one parent, oldest first.
    pub fn history(&self, parent: &HashKey) -> &[SatelliteRow] {
        self.rows.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All rows grouped by parent, oldest first within each parent.
    pub fn iter(&self) -> impl Iterator<Item = (&HashKey, &[SatelliteRow])> {
        self.rows.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Most recently effective row.
    pub fn latest(&self, parent: &HashKey) -> Option<&SatelliteRow> {
        self.history(parent).last()
    }

    /// The state in force at `at`: the last row effective at or before it.
    pub fn state_at(&self, parent: &HashKey, at: Timestamp) -> Option<&SatelliteRow> {
        let history = self.history(parent);
        let idx = history.partition_point(|row| row.effective_at <= at);
        idx.checked_sub(1).map(|i| &history[i])
    }

    /// The first row effective strictly after `at`.
    pub fn state_after(&self, parent: &HashKey, at: Timestamp) -> Option<&SatelliteRow> {
        let history = self.history(parent);
        history.get(history.partition_point(|row| row.effective_at <= at))
    }

    /// Membership on `(parent, hashdiff)` anywhere in the history.
    pub fn contains_state(&self, parent: &HashKey, hashdiff: &HashDiff) -> bool {
        self.history(parent).iter().any(|row| &row.hashdiff == hashdiff)
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row in effective-time order. A row already recorded at the
    /// same `(parent, effective_at)` wins and the incoming one is ignored.
    pub fn insert(&mut self, row: SatelliteRow) -> InsertOutcome {
        let history = self.rows.entry(row.parent_key.clone()).or_default();
        let idx = history.partition_point(|r| r.effective_at < row.effective_at);
        if history.get(idx).map_or(false, |r| r.effective_at == row.effective_at) {
            return InsertOutcome::AlreadyPresent;
        }
        history.insert(idx, row);
        InsertOutcome::Inserted
    }
}

impl TargetStore for SatelliteStore {
    type Identity = SatelliteIdentity;

    fn target(&self) -> String {
        self.entity.satellite_target()
    }

    fn contains(&self, identity: &SatelliteIdentity) -> bool {
        self.history(&identity.parent_key)
            .iter()
            .any(|row| row.effective_at == identity.effective_at && row.hashdiff == identity.hashdiff)
    }

    fn row_count(&self) -> usize {
        self.len()
    }
}

// ── Observations ────────────────────────────────────────────────────

/// One source event recorded against a hub row. Points at the satellite
/// state it carried by hashdiff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub parent_key: HashKey,
    pub observed_at: Timestamp,
    pub hashdiff: HashDiff,
    pub load_timestamp: Timestamp,
    pub record_source: String,
}

/// Per-parent event log, sorted by `observed_at`. Unlike a satellite it keeps
/// repeated states; only a second event at the same time is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationStore {
    entity: EntityKind,
    rows: BTreeMap<HashKey, Vec<ObservationRow>>,
}

impl ObservationStore {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            rows: BTreeMap::new(),
        }
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn history(&self, parent: &HashKey) -> &[ObservationRow] {
        self.rows.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rows(&self) -> impl Iterator<Item = &ObservationRow> {
        self.rows.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn insert(&mut self, row: ObservationRow) -> InsertOutcome {
        let history = self.rows.entry(row.parent_key.clone()).or_default();
        let idx = history.partition_point(|r| r.observed_at < row.observed_at);
        if history.get(idx).map_or(false, |r| r.observed_at == row.observed_at) {
            return InsertOutcome::AlreadyPresent;
        }
        history.insert(idx, row);
        InsertOutcome::Inserted
    }
}
