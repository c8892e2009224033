//! Incremental Loader
//!
//! One wrapper for every builder. In `Full` mode the whole input window is
//! handed to the builder. In `Incremental` mode the input is first cut at the
//! target's watermark and then anti-joined against the target store, so a
//! rerun over the same window writes nothing.
//!
//! The loader never commits a watermark itself: it reports the candidate
//! watermark and the caller advances the registry only once the stage
//! succeeded.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vault_types::errors::VaultError;
use vault_types::time::Timestamp;

use crate::dedup::Candidate;
use crate::store::TargetStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Process the entire available input.
    Full,
    /// Process only input at or after the watermark and absent from the target.
    Incremental,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Full => f.write_str("full"),
            LoadMode::Incremental => f.write_str("incremental"),
        }
    }
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(LoadMode::Full),
            "incremental" => Ok(LoadMode::Incremental),
            other => Err(format!("unknown load mode: {}", other)),
        }
    }
}

// ── Watermarks ──────────────────────────────────────────────────────

/// Last successfully loaded `load_timestamp` per target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatermarkRegistry {
    marks: BTreeMap<String, Timestamp>,
}

impl WatermarkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &str) -> Option<Timestamp> {
        self.marks.get(target).copied()
    }

    /// Move the watermark forward. Never moves it backwards.
    pub fn advance(&mut self, target: &str, to: Timestamp) {
        let mark = self.marks.entry(target.to_string()).or_insert(to);
        if to > *mark {
            *mark = to;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Timestamp)> {
        self.marks.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ── Builders ────────────────────────────────────────────────────────

/// Row counts produced by one builder invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub inserted: usize,
    /// Identity already in the target.
    pub already_present: usize,
    /// Satellite input whose hashdiff matched the state in force.
    pub unchanged: usize,
    /// Link candidates waiting for a hub row.
    pub deferred: usize,
    /// Satellite input whose parent hub row is missing.
    pub orphaned: usize,
}

/// A stage that writes into one target store.
pub trait StageBuilder {
    type Input: Candidate;
    type Store: TargetStore;

    /// Identity of an input row in the target, for the anti-join.
    fn identity(&self, input: &Self::Input) -> <Self::Store as TargetStore>::Identity;

    fn build(
        &mut self,
        store: &mut Self::Store,
        batch: Vec<Self::Input>,
    ) -> Result<BuildReport, VaultError>;
}

/// Outcome of one wrapped stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub target: String,
    pub mode: LoadMode,
    pub received: usize,
    /// Dropped by the watermark cut.
    pub before_watermark: usize,
    /// Dropped by the anti-join.
    pub already_loaded: usize,
    pub build: BuildReport,
    pub watermark_before: Option<Timestamp>,
    /// Watermark to commit if the stage is accepted.
    pub watermark_after: Option<Timestamp>,
}

/// Applies full/incremental semantics around any [`StageBuilder`].
#[derive(Debug, Clone, Copy)]
pub struct IncrementalLoader {
    mode: LoadMode,
}

impl IncrementalLoader {
    pub fn new(mode: LoadMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn run<B: StageBuilder>(
        &self,
        builder: &mut B,
        store: &mut B::Store,
        watermark: Option<Timestamp>,
        input: Vec<B::Input>,
    ) -> Result<LoadReport, VaultError> {
        let target = store.target();
        let received = input.len();
        let newest = input.iter().map(Candidate::load_timestamp).max();

        let mut before_watermark = 0;
        let mut already_loaded = 0;
        let batch: Vec<B::Input> = match self.mode {
            LoadMode::Full => input,
            LoadMode::Incremental => input
                .into_iter()
                .filter(|row| match watermark {
                    Some(mark) if row.load_timestamp() < mark => {
                        debug!(
                            target_store = %target,
                            load_timestamp = %row.load_timestamp(),
                            watermark = %mark,
                            "Late-arriving record below watermark"
                        );
                        before_watermark += 1;
                        false
                    }
                    _ => true,
                })
                .filter(|row| {
                    let present = store.contains(&builder.identity(row));
                    if present {
                        already_loaded += 1;
                    }
                    !present
                })
                .collect(),
        };

        let build = builder.build(store, batch)?;

        let watermark_after = match (watermark, newest) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        info!(
            target_store = %target,
            mode = %self.mode,
            received,
            before_watermark,
            already_loaded,
            inserted = build.inserted,
            deferred = build.deferred,
            "Stage load complete"
        );

        Ok(LoadReport {
            target,
            mode: self.mode,
            received,
            before_watermark,
            already_loaded,
            build,
            watermark_before: watermark,
            watermark_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::testing::ts;
    use crate::hub::HubBuilder;
    use crate::model::stage;
    use crate::store::HubStore;
    use vault_types::ids::EntityKind;
    use vault_types::records::{CustomerRecord, SourceRecord};

    fn customers(ids: &[(&str, i64)]) -> Vec<crate::model::StagedRecord> {
        ids.iter()
            .map(|(id, at)| {
                stage(&SourceRecord::Customer(CustomerRecord {
                    customer_id: Some(id.to_string()),
                    load_timestamp: Some(ts(*at)),
                    record_source: Some("crm".to_string()),
                    ..Default::default()
                }))
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_watermark_never_regresses() {
        let mut marks = WatermarkRegistry::new();
        marks.advance("hub_customer", ts(10));
        marks.advance("hub_customer", ts(5));
        assert_eq!(marks.get("hub_customer"), Some(ts(10)));
        marks.advance("hub_customer", ts(20));
        assert_eq!(marks.get("hub_customer"), Some(ts(20)));
        assert_eq!(marks.get("hub_company"), None);
    }

    #[test]
    fn test_load_mode_parse() {
        assert_eq!("FULL".parse::<LoadMode>(), Ok(LoadMode::Full));
        assert_eq!("incremental".parse::<LoadMode>(), Ok(LoadMode::Incremental));
        assert!("delta".parse::<LoadMode>().is_err());
    }

    #[test]
    fn test_incremental_rerun_is_noop() {
        let loader = IncrementalLoader::new(LoadMode::Incremental);
        let mut store = HubStore::new(EntityKind::Customer);
        let mut builder = HubBuilder::new(EntityKind::Customer);

        let first = loader
            .run(&mut builder, &mut store, None, customers(&[("C1", 1), ("C2", 2)]))
            .unwrap();
        assert_eq!(first.build.inserted, 2);
        assert_eq!(first.watermark_after, Some(ts(2)));

        let second = loader
            .run(&mut builder, &mut store, first.watermark_after, customers(&[("C1", 1), ("C2", 2)]))
            .unwrap();
        assert_eq!(second.build.inserted, 0);
        assert_eq!(second.before_watermark, 1);
        assert_eq!(second.already_loaded, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_incremental_keeps_same_instant_newcomers() {
        let loader = IncrementalLoader::new(LoadMode::Incremental);
        let mut store = HubStore::new(EntityKind::Customer);
        let mut builder = HubBuilder::new(EntityKind::Customer);
        loader.run(&mut builder, &mut store, None, customers(&[("C1", 5)])).unwrap();

        // C2 shares the watermark instant but was not loaded yet
        let report = loader
            .run(&mut builder, &mut store, Some(ts(5)), customers(&[("C1", 5), ("C2", 5)]))
            .unwrap();
        assert_eq!(report.build.inserted, 1);
        assert_eq!(report.already_loaded, 1);
    }

    #[test]
    fn test_full_mode_ignores_watermark() {
        let loader = IncrementalLoader::new(LoadMode::Full);
        let mut store = HubStore::new(EntityKind::Customer);
        let mut builder = HubBuilder::new(EntityKind::Customer);
        let report = loader
            .run(&mut builder, &mut store, Some(ts(100)), customers(&[("C1", 1)]))
            .unwrap();
        assert_eq!(report.build.inserted, 1);
        assert_eq!(report.before_watermark, 0);
        assert_eq!(report.watermark_after, Some(ts(100)));
    }
}
