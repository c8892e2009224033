//! Vault snapshots
//!
//! Persists the whole vault state between runs. The stores themselves are
//! the system of record; a snapshot is their serialized form plus a SHA-256
//! integrity hash.
//!
//! Features:
//! - JSON serialization over `BTreeMap`-backed stores, so equal vaults hash equally
//! - Integrity hash verified on load
//! - Versioned format
//! - Atomic write (tmp file, fsync, rename)
//! - Cleanup policy (keep last N snapshots)

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use vault_types::ids::RunId;
use vault_types::time::Timestamp;

use crate::pipeline::Vault;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("No snapshots found")]
    NoSnapshots,
}

/// Deterministic SHA-256 over the vault's JSON form.
pub fn compute_hash(vault: &Vault) -> Result<String, SnapshotError> {
    let bytes = serde_json::to_vec(vault)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub version: u32,
    /// Monotonic snapshot number, one per committed run.
    pub sequence: u64,
    pub taken_at: Timestamp,
    /// Run that produced this state, if any.
    pub run_id: Option<RunId>,
    pub vault: Vault,
    pub checksum: String,
}

impl VaultSnapshot {
    pub fn new(
        sequence: u64,
        taken_at: Timestamp,
        run_id: Option<RunId>,
        vault: Vault,
    ) -> Result<Self, SnapshotError> {
        let checksum = compute_hash(&vault)?;
        Ok(Self {
            version: SNAPSHOT_VERSION,
            sequence,
            taken_at,
            run_id,
            vault,
            checksum,
        })
    }

    pub fn verify_integrity(&self) -> Result<(), SnapshotError> {
        let actual = compute_hash(&self.vault)?;
        if actual != self.checksum {
            return Err(SnapshotError::IntegrityFailure {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }
}

// ── Writer ──────────────────────────────────────────────────────────

pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write atomically: serialize, write tmp, fsync, rename.
    pub fn write(&self, snapshot: &VaultSnapshot) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir)?;
        let data = serde_json::to_vec(snapshot)?;

        let filename = format!("vault-{:012}.json", snapshot.sequence);
        let path = self.dir.join(&filename);
        let tmp_path = self.dir.join(format!("{}.tmp", filename));
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(path)
    }
}

// ── Loader ──────────────────────────────────────────────────────────

pub struct SnapshotLoader {
    dir: PathBuf,
}

impl SnapshotLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn load(&self, path: &Path) -> Result<VaultSnapshot, SnapshotError> {
        let data = fs::read(path)?;
        let snapshot: VaultSnapshot = serde_json::from_slice(&data)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        snapshot.verify_integrity()?;
        Ok(snapshot)
    }

    /// Load the snapshot with the highest sequence number.
    pub fn load_latest(&self) -> Result<VaultSnapshot, SnapshotError> {
        let (_, path) = self
            .list_snapshots()?
            .pop()
            .ok_or(SnapshotError::NoSnapshots)?;
        self.load(&path)
    }

    /// Latest snapshot, or an empty vault at sequence 0 when none exists yet.
    pub fn load_or_empty(&self) -> Result<(u64, Vault), SnapshotError> {
        match self.load_latest() {
            Ok(snapshot) => Ok((snapshot.sequence, snapshot.vault)),
            Err(SnapshotError::NoSnapshots) => Ok((0, Vault::new())),
            Err(e) => Err(e),
        }
    }

    /// All snapshots as (sequence, path), ascending.
    pub fn list_snapshots(&self) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(seq) = parse_sequence(&name) {
                results.push((seq, entry.path()));
            }
        }
        results.sort_by_key(|(seq, _)| *seq);
        Ok(results)
    }
}

fn parse_sequence(filename: &str) -> Option<u64> {
    filename
        .strip_prefix("vault-")?
        .strip_suffix(".json")?
        .parse::<u64>()
        .ok()
}

// ── Cleanup ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SnapshotCleanupPolicy {
    pub max_snapshots: usize,
}

impl SnapshotCleanupPolicy {
    pub fn new(max_snapshots: usize) -> Self {
        Self { max_snapshots }
    }

    /// Remove old snapshots, keeping only the most recent `max_snapshots`.
    pub fn cleanup(&self, dir: &Path) -> Result<Vec<PathBuf>, SnapshotError> {
        let snapshots = SnapshotLoader::new(dir).list_snapshots()?;
        let mut removed = Vec::new();
        if snapshots.len() > self.max_snapshots {
            let to_remove = snapshots.len() - self.max_snapshots;
            for (_, path) in snapshots.into_iter().take(to_remove) {
                fs::remove_file(&path)?;
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
