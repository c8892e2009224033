//! Quarantine for malformed input
//!
//! Records that cannot be staged are kept here with the reason and the raw
//! payload, for inspection. A payload is quarantined once: re-fetching the
//! same bad record on a rerun does not add a second entry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use vault_types::ids::{EntityKind, RunId};
use vault_types::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantinedRecord {
    pub run_id: RunId,
    pub entity: EntityKind,
    pub reason: String,
    pub payload: Value,
    pub quarantined_at: Timestamp,
    /// SHA-256 over entity and payload.
    pub fingerprint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarantineLog {
    records: Vec<QuarantinedRecord>,
    #[serde(skip)]
    seen: BTreeSet<String>,
}

fn fingerprint(entity: EntityKind, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entity.as_str().as_bytes());
    hasher.update([0x1fu8]);
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

impl PartialEq for QuarantineLog {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl QuarantineLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the same payload was already quarantined.
    pub fn push(
        &mut self,
        run_id: RunId,
        entity: EntityKind,
        reason: impl Into<String>,
        payload: Value,
        quarantined_at: Timestamp,
    ) -> bool {
        if self.seen.is_empty() && !self.records.is_empty() {
            self.reindex();
        }
        let fingerprint = fingerprint(entity, &payload);
        if !self.seen.insert(fingerprint.clone()) {
            return false;
        }
        self.records.push(QuarantinedRecord {
            run_id,
            entity,
            reason: reason.into(),
            payload,
            quarantined_at,
            fingerprint,
        });
        true
    }

    fn reindex(&mut self) {
        self.seen = self.records.iter().map(|r| r.fingerprint.clone()).collect();
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuarantinedRecord> {
        self.records.iter()
    }

    pub fn for_entity(&self, entity: EntityKind) -> impl Iterator<Item = &QuarantinedRecord> {
        self.records.iter().filter(move |r| r.entity == entity)
    }

    pub fn for_run(&self, run_id: RunId) -> impl Iterator<Item = &QuarantinedRecord> {
        self.records.iter().filter(move |r| r.run_id == run_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
