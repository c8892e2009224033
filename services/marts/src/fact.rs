//! Fact Assembler
//!
//! One immutable row per source event. A fact table is append-only: once a
//! row exists for an event key it is never replaced, even if the vault later
//! learns something that would have changed it. Events whose relationships
//! do not resolve yet are counted as pending and retried on the next
//! assembly.

use std::collections::BTreeMap;

use raw_vault::store::LinkStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vault_types::ids::{HashKey, LinkKind};
use vault_types::time::Timestamp;

// ── Tables ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactTable<R> {
    name: String,
    rows: BTreeMap<HashKey, R>,
}

impl<R> FactTable<R> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, key: &HashKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn get(&self, key: &HashKey) -> Option<&R> {
        self.rows.get(key)
    }

    /// Add a row. Returns `false` and leaves the table untouched when the
    /// key is already present.
    pub fn append(&mut self, key: HashKey, row: R) -> bool {
        if self.rows.contains_key(&key) {
            return false;
        }
        self.rows.insert(key, row);
        true
    }

    pub fn rows(&self) -> impl Iterator<Item = &R> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What assembling one event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembly<R> {
    Ready(R),
    /// A relationship or state is missing; retry later.
    Pending(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub emitted: usize,
    pub existing: usize,
    pub pending: usize,
}

/// Append every ready event whose key is not in the table yet.
///
/// `assemble` is only called for keys the table does not already hold.
pub fn assemble_into<R, I, F>(table: &mut FactTable<R>, keys: I, mut assemble: F) -> AssemblyReport
where
    I: IntoIterator<Item = HashKey>,
    F: FnMut(&HashKey) -> Assembly<R>,
{
    let mut report = AssemblyReport::default();
    for key in keys {
        if table.contains(&key) {
            report.existing += 1;
            continue;
        }
        match assemble(&key) {
            Assembly::Ready(row) => {
                table.append(key, row);
                report.emitted += 1;
            }
            Assembly::Pending(reason) => {
                debug!(table = %table.name(), event = %key.short(), reason = %reason, "Fact pending");
                report.pending += 1;
            }
        }
    }
    info!(
        table = %table.name(),
        emitted = report.emitted,
        existing = report.existing,
        pending = report.pending,
        "Fact assembly complete"
    );
    report
}

// ── Link resolution ─────────────────────────────────────────────────

/// Driver hub key to the other participant of a two-way link.
///
/// When a driver has several rows the earliest-seen one is used, ties
/// broken by the partner's key, so the resolution never depends on
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    by_driver: BTreeMap<HashKey, (Timestamp, HashKey)>,
}

impl LinkIndex {
    pub fn from_store(store: &LinkStore) -> Self {
        let mut by_driver: BTreeMap<HashKey, (Timestamp, HashKey)> = BTreeMap::new();
        for row in store.rows() {
            let (driver, other) = match row.hub_keys.as_slice() {
                [driver, other, ..] => (driver, other),
                _ => continue,
            };
            let candidate = (row.first_seen_at, other.clone());
            by_driver
                .entry(driver.clone())
                .and_modify(|current| {
                    if candidate < *current {
                        *current = candidate.clone();
                    }
                })
                .or_insert(candidate);
        }
        Self { by_driver }
    }

    pub fn resolve(&self, driver: &HashKey) -> Option<&HashKey> {
        self.by_driver.get(driver).map(|(_, other)| other)
    }

    pub fn len(&self) -> usize {
        self.by_driver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_driver.is_empty()
    }
}

/// Index for `kind`, empty if the vault has no such store.
pub fn link_index(links: &BTreeMap<LinkKind, LinkStore>, kind: LinkKind) -> LinkIndex {
    links.get(&kind).map(LinkIndex::from_store).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use raw_vault::keys::{compose_key, compose_link_key};
    use raw_vault::store::LinkRow;
    use vault_types::value::FieldValue;

    fn key(s: &str) -> HashKey {
        compose_key(&[FieldValue::from(s)])
    }

    fn link(driver: &str, other: &str, secs: i64) -> LinkRow {
        let hub_keys = vec![key(driver), key(other)];
        LinkRow {
            link_key: compose_link_key(&hub_keys),
            hub_keys,
            first_seen_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            record_source: "tx".to_string(),
        }
    }

    #[test]
    fn test_append_never_replaces() {
        let mut table = FactTable::new("fct_test");
        assert!(table.append(key("T1"), 1));
        assert!(!table.append(key("T1"), 2));
        assert_eq!(table.get(&key("T1")), Some(&1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_assemble_counts_pending_and_existing() {
        let mut table = FactTable::new("fct_test");
        table.append(key("T1"), "old".to_string());

        let mut calls = 0;
        let report = assemble_into(&mut table, vec![key("T1"), key("T2"), key("T3")], |k| {
            calls += 1;
            if *k == key("T2") {
                Assembly::Ready("new".to_string())
            } else {
                Assembly::Pending("no customer".to_string())
            }
        });
        assert_eq!(report, AssemblyReport { emitted: 1, existing: 1, pending: 1 });
        assert_eq!(calls, 2);
        assert_eq!(table.get(&key("T1")).map(String::as_str), Some("old"));
        assert!(!table.contains(&key("T3")));
    }

    #[test]
    fn test_link_index_earliest_partner_wins() {
        let mut store = LinkStore::new(LinkKind::TransactionCustomer);
        store.insert(link("T1", "C2", 10)).unwrap();
        store.insert(link("T1", "C1", 5)).unwrap();
        store.insert(link("T2", "C1", 1)).unwrap();

        let index = LinkIndex::from_store(&store);
        assert_eq!(index.len(), 2);
        assert_eq!(index.resolve(&key("T1")), Some(&key("C1")));
        assert_eq!(index.resolve(&key("T2")), Some(&key("C1")));
        assert!(index.resolve(&key("T9")).is_none());
    }
}
