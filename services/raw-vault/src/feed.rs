//! Record feeds
//!
//! The boundary to the ingestion connectors. A feed returns the append-only
//! records of one entity stream, optionally cut at a `since` timestamp.
//! Lines that cannot be parsed at all come back as rejects so the pipeline
//! can quarantine them alongside malformed records.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;
use vault_types::errors::VaultError;
use vault_types::ids::EntityKind;
use vault_types::records::SourceRecord;
use vault_types::time::Timestamp;

/// A payload that never became a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedPayload {
    pub payload: Value,
    pub reason: String,
}

/// One fetch worth of input for a single entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedBatch {
    pub records: Vec<SourceRecord>,
    pub rejected: Vec<RejectedPayload>,
}

impl FeedBatch {
    pub fn len(&self) -> usize {
        self.records.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of raw records per entity type.
pub trait RecordFeed: Sync {
    /// Records with `load_timestamp >= since`, plus any record whose load
    /// time is missing (those are quarantined downstream).
    fn fetch(&self, entity: EntityKind, since: Option<Timestamp>) -> Result<FeedBatch, VaultError>;
}

fn after(record: &SourceRecord, since: Option<Timestamp>) -> bool {
    match (record.load_timestamp(), since) {
        (Some(at), Some(since)) => at >= since,
        _ => true,
    }
}

// ── In-memory feed ──────────────────────────────────────────────────

/// Feed backed by in-memory vectors. Failures can be scripted per entity.
#[derive(Debug, Default)]
pub struct MemoryFeed {
    records: BTreeMap<EntityKind, Vec<SourceRecord>>,
    failures: Mutex<BTreeMap<EntityKind, u32>>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: SourceRecord) {
        self.records.entry(record.entity()).or_default().push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = SourceRecord>) {
        for record in records {
            self.push(record);
        }
    }

    /// Make the next `times` fetches for `entity` fail as unavailable.
    pub fn fail_next(&self, entity: EntityKind, times: u32) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(entity, times);
        }
    }
}

impl RecordFeed for MemoryFeed {
    fn fetch(&self, entity: EntityKind, since: Option<Timestamp>) -> Result<FeedBatch, VaultError> {
        let mut failures = self.failures.lock().map_err(|_| VaultError::SourceUnavailable {
            entity,
            reason: "feed state poisoned".to_string(),
        })?;
        if let Some(remaining) = failures.get_mut(&entity) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(VaultError::SourceUnavailable {
                    entity,
                    reason: "scripted outage".to_string(),
                });
            }
        }
        drop(failures);

        let records = self
            .records
            .get(&entity)
            .map(|all| all.iter().filter(|r| after(r, since)).cloned().collect())
            .unwrap_or_default();
        Ok(FeedBatch {
            records,
            rejected: Vec::new(),
        })
    }
}

// ── JSON-lines feed ─────────────────────────────────────────────────

/// Reads `<dir>/<entity>.jsonl`, one JSON object per line.
///
/// The `entity` tag is optional inside a file; it defaults to the file's
/// entity. A missing file means an empty stream; a missing directory means
/// the source is unavailable.
#[derive(Debug, Clone)]
pub struct JsonLinesFeed {
    dir: PathBuf,
}

impl JsonLinesFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, entity: EntityKind) -> PathBuf {
        self.dir.join(format!("{}.jsonl", entity.as_str()))
    }

    fn read(&self, path: &Path, entity: EntityKind, since: Option<Timestamp>) -> io::Result<FeedBatch> {
        let reader = BufReader::new(fs::File::open(path)?);
        let mut batch = FeedBatch::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line, entity) {
                Ok(record) => {
                    if after(&record, since) {
                        batch.records.push(record);
                    }
                }
                Err(reason) => {
                    debug!(entity = %entity, line = idx + 1, reason = %reason, "Rejected feed line");
                    let payload = serde_json::from_str(&line).unwrap_or(Value::String(line.clone()));
                    batch.rejected.push(RejectedPayload {
                        payload,
                        reason: format!("line {}: {}", idx + 1, reason),
                    });
                }
            }
        }
        Ok(batch)
    }
}

fn parse_line(line: &str, entity: EntityKind) -> Result<SourceRecord, String> {
    let mut value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| "expected a JSON object".to_string())?;
    let tag = object
        .entry("entity")
        .or_insert_with(|| Value::String(entity.as_str().to_string()));
    if tag.as_str() != Some(entity.as_str()) {
        return Err(format!("record tagged {} in the {} stream", tag, entity));
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

impl RecordFeed for JsonLinesFeed {
    fn fetch(&self, entity: EntityKind, since: Option<Timestamp>) -> Result<FeedBatch, VaultError> {
        if !self.dir.is_dir() {
            return Err(VaultError::SourceUnavailable {
                entity,
                reason: format!("input directory {} not found", self.dir.display()),
            });
        }
        let path = self.path_for(entity);
        if !path.exists() {
            return Ok(FeedBatch::default());
        }
        self.read(&path, entity, since)
            .map_err(|e| VaultError::SourceUnavailable {
                entity,
                reason: format!("{}: {}", path.display(), e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::testing::ts;
    use std::io::Write;
    use tempfile::TempDir;
    use vault_types::records::CustomerRecord;

    fn customer(id: &str, at: i64) -> SourceRecord {
        SourceRecord::Customer(CustomerRecord {
            customer_id: Some(id.to_string()),
            load_timestamp: Some(ts(at)),
            record_source: Some("crm".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_memory_feed_since_filter() {
        let mut feed = MemoryFeed::new();
        feed.extend(vec![customer("C1", 1), customer("C2", 5)]);
        let all = feed.fetch(EntityKind::Customer, None).unwrap();
        assert_eq!(all.records.len(), 2);
        let recent = feed.fetch(EntityKind::Customer, Some(ts(5))).unwrap();
        assert_eq!(recent.records.len(), 1);
        assert!(feed.fetch(EntityKind::News, None).unwrap().is_empty());
    }

    #[test]
    fn test_memory_feed_scripted_outage() {
        let feed = MemoryFeed::new();
        feed.fail_next(EntityKind::Asset, 2);
        assert!(feed.fetch(EntityKind::Asset, None).unwrap_err().is_retryable());
        assert!(feed.fetch(EntityKind::Asset, None).is_err());
        assert!(feed.fetch(EntityKind::Asset, None).is_ok());
    }

    #[test]
    fn test_jsonl_feed_reads_and_rejects() {
        let tmp = TempDir::new().unwrap();
        let mut file = fs::File::create(tmp.path().join("customer.jsonl")).unwrap();
        writeln!(
            file,
            r#"{{"customer_id":"C100","customer_tier":"Gold","load_timestamp":"2024-01-01T00:00:00Z","record_source":"crm"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, r#"{{"entity":"company","company_id":"X"}}"#).unwrap();

        let feed = JsonLinesFeed::new(tmp.path());
        let batch = feed.fetch(EntityKind::Customer, None).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.rejected.len(), 2);
        assert!(batch.rejected[0].reason.starts_with("line 3"));
        assert_eq!(batch.records[0].entity(), EntityKind::Customer);
    }

    #[test]
    fn test_jsonl_feed_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let feed = JsonLinesFeed::new(tmp.path());
        assert!(feed.fetch(EntityKind::News, None).unwrap().is_empty());
    }

    #[test]
    fn test_jsonl_feed_missing_dir_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let feed = JsonLinesFeed::new(tmp.path().join("nope"));
        let err = feed.fetch(EntityKind::News, None).unwrap_err();
        assert!(matches!(err, VaultError::SourceUnavailable { .. }));
    }
}
