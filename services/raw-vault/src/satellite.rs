//! Satellite Builder
//!
//! Change-data capture over descriptive attributes. For each incoming state
//! the builder reads the state in force at that state's effective time and
//! appends a row only when the hashdiff differs. It is the only builder that
//! reads existing rows before deciding to write.
//!
//! A state arriving with an effective time earlier than the latest row is
//! slotted into history at its own time; it is compared against both of its
//! neighbours there, so history never holds two consecutive equal states.

use tracing::{debug, warn};
use vault_types::errors::VaultError;

use crate::dedup::collapse_consecutive;
use crate::loader::{BuildReport, StageBuilder};
use crate::model::StagedRecord;
use crate::store::{HubStore, InsertOutcome, SatelliteIdentity, SatelliteRow, SatelliteStore, TargetStore};

pub struct SatelliteBuilder<'a> {
    parents: &'a HubStore,
}

impl<'a> SatelliteBuilder<'a> {
    /// `parents` is the hub the satellite hangs off; it must be fully
    /// committed for this run before the builder starts.
    pub fn new(parents: &'a HubStore) -> Self {
        Self { parents }
    }
}

impl StageBuilder for SatelliteBuilder<'_> {
    type Input = StagedRecord;
    type Store = SatelliteStore;

    fn identity(&self, input: &StagedRecord) -> SatelliteIdentity {
        SatelliteIdentity {
            parent_key: input.hub_key().clone(),
            hashdiff: input.hashdiff.clone(),
            effective_at: input.effective_at,
        }
    }

    fn build(
        &mut self,
        store: &mut SatelliteStore,
        batch: Vec<StagedRecord>,
    ) -> Result<BuildReport, VaultError> {
        let mut report = BuildReport::default();
        let entity = store.entity();

        let (attached, orphans): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|r| self.parents.contains(r.hub_key()));
        if !orphans.is_empty() {
            warn!(
                entity = %entity,
                orphaned = orphans.len(),
                "Satellite input without a hub row, skipped"
            );
            report.orphaned = orphans.len();
        }

        for record in collapse_consecutive(attached) {
            let parent = record.hub_key().clone();
            let latest_at = store.latest(&parent).map(|row| row.effective_at);

            let prev = store.state_at(&parent, record.effective_at);
            if prev.map_or(false, |row| row.effective_at == record.effective_at) {
                report.already_present += 1;
                continue;
            }
            // A hashdiff never recorded for this parent cannot match either neighbour.
            if store.contains_state(&parent, &record.hashdiff) {
                let next = store.state_after(&parent, record.effective_at);
                let same = |row: Option<&SatelliteRow>| row.map_or(false, |r| r.hashdiff == record.hashdiff);
                if same(prev) || same(next) {
                    report.unchanged += 1;
                    continue;
                }
            }

            if latest_at.map_or(false, |at| record.effective_at < at) {
                debug!(
                    entity = %entity,
                    parent = parent.short(),
                    effective_at = %record.effective_at,
                    "Late-arriving state inserted into history"
                );
            }

            let row = SatelliteRow {
                parent_key: parent,
                hashdiff: record.hashdiff,
                attributes: record.attributes,
                effective_at: record.effective_at,
                load_timestamp: record.load_timestamp,
                record_source: record.record_source,
            };
            match store.insert(row) {
                InsertOutcome::Inserted => report.inserted += 1,
                InsertOutcome::AlreadyPresent => report.already_present += 1,
            }
        }

        debug!(
            entity = %entity,
            inserted = report.inserted,
            unchanged = report.unchanged,
            "Satellite build finished"
        );
        Ok(report)
    }
}
