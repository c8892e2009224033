//! Link Builder
//!
//! Resolves relationship candidates against the hub stores and writes one
//! row per distinct participant tuple. A candidate whose hubs are not all
//! present is deferred, never failed: it is carried in the builder's pending
//! list and retried on every later run until the missing hub appears.

use std::collections::BTreeMap;

use tracing::{debug, error, warn};
use vault_types::errors::VaultError;
use vault_types::ids::{EntityKind, HashKey, LinkKind};

use crate::dedup::earliest_per_key;
use crate::loader::{BuildReport, StageBuilder};
use crate::model::{LinkCandidate, Participant};
use crate::store::{HubStore, InsertOutcome, LinkRow, LinkStore, TargetStore};

pub struct LinkBuilder<'a> {
    kind: LinkKind,
    hubs: &'a BTreeMap<EntityKind, HubStore>,
    pending: Vec<LinkCandidate>,
}

impl<'a> LinkBuilder<'a> {
    /// `pending` holds candidates deferred by earlier runs.
    pub fn new(
        kind: LinkKind,
        hubs: &'a BTreeMap<EntityKind, HubStore>,
        pending: Vec<LinkCandidate>,
    ) -> Self {
        Self { kind, hubs, pending }
    }

    /// Candidates still waiting for a hub row after the last build.
    pub fn into_pending(self) -> Vec<LinkCandidate> {
        self.pending
    }

    pub fn pending(&self) -> &[LinkCandidate] {
        &self.pending
    }

    /// First participant without a hub row, if any.
    fn unresolved<'c>(&self, candidate: &'c LinkCandidate) -> Option<&'c Participant> {
        candidate.participants.iter().find(|p| {
            !self
                .hubs
                .get(&p.entity)
                .map_or(false, |hub| hub.contains(&p.hub_key))
        })
    }
}

impl StageBuilder for LinkBuilder<'_> {
    type Input = LinkCandidate;
    type Store = LinkStore;

    fn identity(&self, input: &LinkCandidate) -> HashKey {
        input.link_key.clone()
    }

    fn build(
        &mut self,
        store: &mut LinkStore,
        batch: Vec<LinkCandidate>,
    ) -> Result<BuildReport, VaultError> {
        let mut report = BuildReport::default();

        let mut all = std::mem::take(&mut self.pending);
        all.extend(batch.into_iter().filter(|c| c.kind == self.kind));
        let candidates = earliest_per_key(all, |c| c.link_key.clone());

        let mut still_pending = Vec::new();
        let mut candidates = candidates.into_iter();
        while let Some(candidate) = candidates.next() {
            if let Some(missing) = self.unresolved(&candidate) {
                let reason = VaultError::UnresolvedRelationship {
                    link: self.kind,
                    missing: missing.entity,
                    key: missing.business_key.join("|"),
                };
                warn!(link = %self.kind, reason = %reason, "Deferring link candidate");
                report.deferred += 1;
                still_pending.push(candidate);
                continue;
            }

            let row = LinkRow {
                link_key: candidate.link_key.clone(),
                hub_keys: candidate.hub_keys(),
                first_seen_at: candidate.load_timestamp,
                record_source: candidate.record_source.clone(),
            };
            match store.insert(row) {
                Ok(InsertOutcome::Inserted) => report.inserted += 1,
                Ok(InsertOutcome::AlreadyPresent) => report.already_present += 1,
                Err(e) => {
                    error!(link = %self.kind, error = %e, "Link key collision, halting stage");
                    // nothing after the collision was tried; keep it all for the next run
                    still_pending.push(candidate);
                    still_pending.extend(candidates);
                    self.pending = still_pending;
                    return Err(e);
                }
            }
        }
        self.pending = still_pending;

        debug!(
            link = %self.kind,
            inserted = report.inserted,
            deferred = report.deferred,
            "Link build finished"
        );
        Ok(report)
    }
}
