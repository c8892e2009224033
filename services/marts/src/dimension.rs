//! Dimension Reconstructor
//!
//! Turns a satellite's insert-only history into SCD2 validity intervals.
//! For each parent key the rows are taken in effective-time order and every
//! row is valid until its successor takes effect; the last row stays open
//! until the `9999-12-31T23:59:59Z` sentinel.
//!
//! A late-arriving record can leave two consecutive satellite rows with the
//! same hashdiff (the state in between arrived after both). Those are
//! coalesced here, so for every parent the intervals are contiguous,
//! non-overlapping, and exactly one of them is open.

use std::collections::BTreeMap;

use raw_vault::store::{SatelliteRow, SatelliteStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vault_types::ids::{HashDiff, HashKey};
use vault_types::time::{is_open_end, open_end, Timestamp};
use vault_types::value::AttributeSet;

/// One validity interval `[effective_from, effective_to)` of a parent's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRow {
    pub parent_key: HashKey,
    pub hashdiff: HashDiff,
    pub attributes: AttributeSet,
    pub effective_from: Timestamp,
    pub effective_to: Timestamp,
    pub record_source: String,
}

impl DimensionRow {
    pub fn is_current(&self) -> bool {
        is_open_end(&self.effective_to)
    }

    /// Interval containment, closed at the start and open at the end.
    pub fn contains(&self, at: Timestamp) -> bool {
        self.effective_from <= at && at < self.effective_to
    }
}

/// Intervals for one parent's history (already sorted by effective time).
fn intervals(rows: &[SatelliteRow]) -> Vec<DimensionRow> {
    let mut kept: Vec<&SatelliteRow> = Vec::with_capacity(rows.len());
    for row in rows {
        if kept.last().map_or(false, |prev| prev.hashdiff == row.hashdiff) {
            continue;
        }
        kept.push(row);
    }

    let mut out = Vec::with_capacity(kept.len());
    for (i, row) in kept.iter().enumerate() {
        let effective_to = kept
            .get(i + 1)
            .map(|next| next.effective_at)
            .unwrap_or_else(open_end);
        out.push(DimensionRow {
            parent_key: row.parent_key.clone(),
            hashdiff: row.hashdiff.clone(),
            attributes: row.attributes.clone(),
            effective_from: row.effective_at,
            effective_to,
            record_source: row.record_source.clone(),
        });
    }
    out
}

/// SCD2 history of one parent key, oldest first.
pub fn history_for(store: &SatelliteStore, parent: &HashKey) -> Vec<DimensionRow> {
    intervals(store.history(parent))
}

/// SCD2 history of every parent, ordered by parent key then time.
pub fn history(store: &SatelliteStore) -> Vec<DimensionRow> {
    store.iter().flat_map(|(_, rows)| intervals(rows)).collect()
}

/// Current-state projection: the open interval of every parent.
pub fn current(store: &SatelliteStore) -> Vec<DimensionRow> {
    store
        .iter()
        .filter_map(|(_, rows)| intervals(rows).pop())
        .collect()
}

/// The interval containing `at`, if the parent had any state by then.
pub fn state_at(store: &SatelliteStore, parent: &HashKey, at: Timestamp) -> Option<DimensionRow> {
    history_for(store, parent).into_iter().find(|row| row.contains(at))
}

// ── Interval checks ─────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalViolation {
    #[error("Gap for {parent} between {ended} and {next_from}")]
    Gap {
        parent: HashKey,
        ended: Timestamp,
        next_from: Timestamp,
    },

    #[error("Overlap for {parent}: interval ends {ended}, next starts {next_from}")]
    Overlap {
        parent: HashKey,
        ended: Timestamp,
        next_from: Timestamp,
    },

    #[error("Empty or inverted interval for {parent} at {from}")]
    Inverted { parent: HashKey, from: Timestamp },

    #[error("No open interval for {parent}")]
    NoOpenInterval { parent: HashKey },

    #[error("Open interval for {parent} is not the latest")]
    OpenNotLast { parent: HashKey },
}

/// Verify per-parent contiguity: no gaps, no overlaps, exactly one open
/// interval and it is the last.
pub fn check_intervals(rows: &[DimensionRow]) -> Result<(), IntervalViolation> {
    let mut by_parent: BTreeMap<&HashKey, Vec<&DimensionRow>> = BTreeMap::new();
    for row in rows {
        by_parent.entry(&row.parent_key).or_default().push(row);
    }

    for (parent, mut rows) in by_parent {
        rows.sort_by_key(|r| r.effective_from);
        for row in &rows {
            if row.effective_from >= row.effective_to {
                return Err(IntervalViolation::Inverted {
                    parent: parent.clone(),
                    from: row.effective_from,
                });
            }
        }
        for pair in rows.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if prev.is_current() {
                return Err(IntervalViolation::OpenNotLast {
                    parent: parent.clone(),
                });
            }
            if prev.effective_to < next.effective_from {
                return Err(IntervalViolation::Gap {
                    parent: parent.clone(),
                    ended: prev.effective_to,
                    next_from: next.effective_from,
                });
            }
            if prev.effective_to > next.effective_from {
                return Err(IntervalViolation::Overlap {
                    parent: parent.clone(),
                    ended: prev.effective_to,
                    next_from: next.effective_from,
                });
            }
        }
        if !rows.last().map_or(false, |r| r.is_current()) {
            return Err(IntervalViolation::NoOpenInterval {
                parent: parent.clone(),
            });
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use raw_vault::keys::{compose_hashdiff, compose_key};
    use vault_types::ids::EntityKind;
    use vault_types::value::FieldValue;

    pub(crate) fn ts(day: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    pub(crate) fn parent(id: &str) -> HashKey {
        compose_key(&[FieldValue::from(id)])
    }

    pub(crate) fn sat_row(id: &str, tier: &str, day: i64) -> SatelliteRow {
        let attributes = AttributeSet::new().with("customer_tier", tier);
        SatelliteRow {
            parent_key: parent(id),
            hashdiff: compose_hashdiff(&attributes),
            attributes,
            effective_at: ts(day),
            load_timestamp: ts(day),
            record_source: "crm".to_string(),
        }
    }

    fn store(rows: Vec<SatelliteRow>) -> SatelliteStore {
        let mut store = SatelliteStore::new(EntityKind::Customer);
        for row in rows {
            store.insert(row);
        }
        store
    }

    #[test]
    fn test_two_states_two_intervals() {
        let store = store(vec![sat_row("C100", "Gold", 1), sat_row("C100", "Platinum", 2)]);
        let rows = history_for(&store, &parent("C100"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].effective_from, ts(1));
        assert_eq!(rows[0].effective_to, ts(2));
        assert_eq!(rows[1].effective_from, ts(2));
        assert!(rows[1].is_current());
        assert!(check_intervals(&rows).is_ok());
    }

    #[test]
    fn test_current_returns_open_row_only() {
        let store = store(vec![
            sat_row("C100", "Gold", 1),
            sat_row("C100", "Platinum", 2),
            sat_row("C200", "Silver", 1),
        ]);
        let current = current(&store);
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(DimensionRow::is_current));
        let c100 = current.iter().find(|r| r.parent_key == parent("C100")).unwrap();
        assert_eq!(c100.attributes.text("customer_tier"), Some("Platinum"));
    }

    #[test]
    fn test_consecutive_identical_states_coalesced() {
        // two Gold rows back to back, as left by a late arrival
        let store = store(vec![
            sat_row("C100", "Gold", 1),
            sat_row("C100", "Gold", 3),
            sat_row("C100", "Silver", 5),
        ]);
        let rows = history_for(&store, &parent("C100"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].effective_from, ts(1));
        assert_eq!(rows[0].effective_to, ts(5));
    }

    #[test]
    fn test_reversion_is_a_new_interval() {
        let store = store(vec![
            sat_row("C100", "Gold", 1),
            sat_row("C100", "Silver", 2),
            sat_row("C100", "Gold", 3),
        ]);
        assert_eq!(history_for(&store, &parent("C100")).len(), 3);
    }

    #[test]
    fn test_state_at_uses_containment() {
        let store = store(vec![sat_row("C100", "Gold", 1), sat_row("C100", "Platinum", 5)]);
        let p = parent("C100");
        assert!(state_at(&store, &p, ts(0)).is_none());
        assert_eq!(state_at(&store, &p, ts(1)).unwrap().attributes.text("customer_tier"), Some("Gold"));
        assert_eq!(state_at(&store, &p, ts(4)).unwrap().attributes.text("customer_tier"), Some("Gold"));
        assert_eq!(state_at(&store, &p, ts(5)).unwrap().attributes.text("customer_tier"), Some("Platinum"));
        assert!(state_at(&store, &parent("C999"), ts(5)).is_none());
    }

    #[test]
    fn test_check_intervals_detects_gap_and_overlap() {
        let store = store(vec![sat_row("C100", "Gold", 1), sat_row("C100", "Platinum", 5)]);
        let mut rows = history_for(&store, &parent("C100"));

        rows[0].effective_to = ts(3);
        assert!(matches!(check_intervals(&rows), Err(IntervalViolation::Gap { .. })));

        rows[0].effective_to = ts(7);
        assert!(matches!(check_intervals(&rows), Err(IntervalViolation::Overlap { .. })));

        rows[0].effective_to = ts(5);
        rows[1].effective_to = ts(9);
        assert!(matches!(check_intervals(&rows), Err(IntervalViolation::NoOpenInterval { .. })));
    }

    #[test]
    fn test_empty_store() {
        let store = SatelliteStore::new(EntityKind::Customer);
        assert!(history(&store).is_empty());
        assert!(current(&store).is_empty());
        assert!(check_intervals(&[]).is_ok());
    }
}
