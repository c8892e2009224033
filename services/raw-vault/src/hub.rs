//! Hub Builder
//!
//! Registers each distinct natural key once. The canonical candidate for a
//! new key is the earliest sighting by the tie-break rule; its load time and
//! source become the row's `first_seen_at` and `record_source` forever.

use tracing::{debug, error};
use vault_types::errors::VaultError;
use vault_types::ids::{EntityKind, HashKey};

use crate::dedup::earliest_per_key;
use crate::loader::{BuildReport, StageBuilder};
use crate::model::StagedRecord;
use crate::store::{HubRow, HubStore, InsertOutcome};

pub struct HubBuilder {
    entity: EntityKind,
}

impl HubBuilder {
    pub fn new(entity: EntityKind) -> Self {
        Self { entity }
    }
}

impl StageBuilder for HubBuilder {
    type Input = StagedRecord;
    type Store = HubStore;

    fn identity(&self, input: &StagedRecord) -> HashKey {
        input.hub_key().clone()
    }

    fn build(
        &mut self,
        store: &mut HubStore,
        batch: Vec<StagedRecord>,
    ) -> Result<BuildReport, VaultError> {
        let mut report = BuildReport::default();

        // Group by the natural key, not the surrogate, so that two keys
        // hashing alike reach the store and surface as a collision.
        let canonical = earliest_per_key(batch, |r| r.key.parts.clone());

        for record in canonical {
            debug_assert_eq!(record.entity, self.entity);
            let row = HubRow {
                hub_key: record.key.hub_key,
                business_key: record.key.parts,
                first_seen_at: record.load_timestamp,
                record_source: record.record_source,
            };
            match store.insert(row) {
                Ok(InsertOutcome::Inserted) => report.inserted += 1,
                Ok(InsertOutcome::AlreadyPresent) => report.already_present += 1,
                Err(e) => {
                    error!(entity = %self.entity, error = %e, "Hub key collision, halting stage");
                    return Err(e);
                }
            }
        }

        debug!(
            entity = %self.entity,
            inserted = report.inserted,
            already_present = report.already_present,
            "Hub build finished"
        );
        Ok(report)
    }
}
