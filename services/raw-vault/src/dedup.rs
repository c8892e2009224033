//! Deduplicator
//!
//! Explicit sort-then-group algorithms over in-memory batches.
//!
//! Ordering rule everywhere: `load_timestamp` ascending, then
//! `record_source` name ascending. Identical inputs in any arrival order
//! therefore produce identical outputs.

use std::cmp::Ordering;

use vault_types::ids::{HashDiff, HashKey};
use vault_types::time::Timestamp;

/// Anything that can be ordered by the tie-break rule.
pub trait Candidate {
    fn load_timestamp(&self) -> Timestamp;
    fn record_source(&self) -> &str;
}

/// `load_timestamp` ascending, `record_source` ascending.
pub fn tie_break<C: Candidate>(a: &C, b: &C) -> Ordering {
    a.load_timestamp()
        .cmp(&b.load_timestamp())
        .then_with(|| a.record_source().cmp(b.record_source()))
}

/// Keep the earliest candidate per key. Output is ordered by key.
///
/// Used for hubs and links, where only first sighting matters.
pub fn earliest_per_key<C, K, F>(batch: Vec<C>, key_of: F) -> Vec<C>
where
    C: Candidate,
    K: Ord,
    F: Fn(&C) -> K,
{
    let mut batch = batch;
    batch.sort_by(|a, b| key_of(a).cmp(&key_of(b)).then_with(|| tie_break(a, b)));

    let mut out: Vec<C> = Vec::with_capacity(batch.len());
    for candidate in batch {
        let duplicate = out
            .last()
            .map_or(false, |kept| key_of(kept) == key_of(&candidate));
        if !duplicate {
            out.push(candidate);
        }
    }
    out
}

/// Satellite-side view of a candidate.
pub trait StateCandidate: Candidate {
    fn parent_key(&self) -> &HashKey;
    fn hashdiff(&self) -> &HashDiff;
    fn effective_at(&self) -> Timestamp;
}

/// Collapse consecutive identical states per parent.
///
/// Candidates are ordered per parent by effective time, then the tie-break
/// rule. A candidate is dropped when its hashdiff equals the previously kept
/// one for the same parent, or when another candidate already claimed the
/// same effective time. Every genuine state transition survives, including
/// reversions to an earlier state.
pub fn collapse_consecutive<C: StateCandidate>(batch: Vec<C>) -> Vec<C> {
    let mut batch = batch;
    batch.sort_by(|a, b| {
        a.parent_key()
            .cmp(b.parent_key())
            .then_with(|| a.effective_at().cmp(&b.effective_at()))
            .then_with(|| tie_break(a, b))
    });

    let mut out: Vec<C> = Vec::with_capacity(batch.len());
    for candidate in batch {
        if let Some(prev) = out.last() {
            if prev.parent_key() == candidate.parent_key()
                && (prev.hashdiff() == candidate.hashdiff()
                    || prev.effective_at() == candidate.effective_at())
            {
                continue;
            }
        }
        out.push(candidate);
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::keys::{compose_hashdiff, compose_key};
    use chrono::{TimeZone, Utc};
    use vault_types::value::{AttributeSet, FieldValue};

    /// Minimal candidate for unit tests.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Row {
        pub key: String,
        pub parent: HashKey,
        pub diff: HashDiff,
        pub at: Timestamp,
        pub loaded: Timestamp,
        pub source: String,
    }

    pub fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub fn row(key: &str, state: &str, at: i64, source: &str) -> Row {
        Row {
            key: key.to_string(),
            parent: compose_key(&[FieldValue::from(key)]),
            diff: compose_hashdiff(&AttributeSet::new().with("state", state)),
            at: ts(at),
            loaded: ts(at),
            source: source.to_string(),
        }
    }

    impl Candidate for Row {
        fn load_timestamp(&self) -> Timestamp {
            self.loaded
        }
        fn record_source(&self) -> &str {
            &self.source
        }
    }

    impl StateCandidate for Row {
        fn parent_key(&self) -> &HashKey {
            &self.parent
        }
        fn hashdiff(&self) -> &HashDiff {
            &self.diff
        }
        fn effective_at(&self) -> Timestamp {
            self.at
        }
    }
}
