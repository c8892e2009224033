//! Command implementations, separated from argument parsing so they can be
//! driven from tests.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::ValueEnum;
use marts::fact::{AssemblyReport, FactTable};
use marts::tables::{self, FCT_ASSET_PRICES, FCT_NEWS_EVENTS, FCT_TRANSACTIONS};
use raw_vault::feed::JsonLinesFeed;
use raw_vault::snapshot::{SnapshotCleanupPolicy, SnapshotLoader, SnapshotWriter, VaultSnapshot};
use raw_vault::{EngineConfig, LoadMode, Pipeline, RunRequest, Vault};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use vault_types::ids::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DimName {
    Customer,
    CustomerHistory,
    Asset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FactName {
    Transactions,
    AssetPrices,
    News,
}

/// JSON to print, and whether the process should exit non-zero.
#[derive(Debug)]
pub struct Outcome {
    pub output: Value,
    pub halted: bool,
}

impl Outcome {
    fn ok(output: Value) -> Self {
        Self { output, halted: false }
    }
}

// ── run ─────────────────────────────────────────────────────────────

pub fn run(
    config: &EngineConfig,
    input: &Path,
    state: &Path,
    mode: LoadMode,
    entities: &[EntityKind],
) -> Result<Outcome> {
    let (sequence, mut vault) = SnapshotLoader::new(state)
        .load_or_empty()
        .with_context(|| format!("loading vault state from {}", state.display()))?;

    let request = if entities.is_empty() {
        RunRequest::all(mode)
    } else {
        RunRequest::new(mode, entities.iter().copied())
    };
    let feed = JsonLinesFeed::new(input);
    let report = Pipeline::new(&feed, config.clone()).run(&mut vault, &request);
    let halted = report.halted;

    // Stages that committed stay committed, so a halted run is persisted too.
    let snapshot = VaultSnapshot::new(sequence + 1, Utc::now(), Some(report.run_id), vault)?;
    let path = SnapshotWriter::new(state).write(&snapshot)?;
    let removed = SnapshotCleanupPolicy::new(config.snapshot.keep_last).cleanup(state)?;
    info!(
        snapshot = %path.display(),
        sequence = snapshot.sequence,
        removed = removed.len(),
        "Vault snapshot written"
    );

    Ok(Outcome {
        output: json!({
            "report": report,
            "row_counts": snapshot.vault.row_counts(),
            "snapshot": path,
        }),
        halted,
    })
}

// ── dim ─────────────────────────────────────────────────────────────

fn latest_vault(state: &Path) -> Result<Vault> {
    let snapshot = SnapshotLoader::new(state)
        .load_latest()
        .with_context(|| format!("no usable snapshot in {}", state.display()))?;
    Ok(snapshot.vault)
}

pub fn dim(state: &Path, name: DimName) -> Result<Outcome> {
    let vault = latest_vault(state)?;
    let output = match name {
        DimName::Customer => serde_json::to_value(tables::dim_customer(&vault))?,
        DimName::CustomerHistory => serde_json::to_value(tables::dim_customer_history(&vault))?,
        DimName::Asset => serde_json::to_value(tables::dim_asset(&vault))?,
    };
    Ok(Outcome::ok(output))
}

// ── fact ────────────────────────────────────────────────────────────

fn table_path(state: &Path, table: &str) -> PathBuf {
    state.join(format!("{}.json", table))
}

fn load_table<R: DeserializeOwned>(state: &Path, table: &str) -> Result<FactTable<R>> {
    let path = table_path(state, table);
    if !path.exists() {
        return Ok(FactTable::new(table));
    }
    let data = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Same tmp, fsync, rename sequence as the vault snapshots.
fn save_table<R: Serialize>(state: &Path, table: &FactTable<R>) -> Result<()> {
    fs::create_dir_all(state)?;
    let path = table_path(state, table.name());
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(table)?)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, &path)?;
    Ok(())
}

fn extend_table<R, F>(state: &Path, name: &str, vault: &Vault, assemble: F) -> Result<Value>
where
    R: Serialize + DeserializeOwned,
    F: FnOnce(&Vault, &mut FactTable<R>) -> AssemblyReport,
{
    let mut table = load_table::<R>(state, name)?;
    let report = assemble(vault, &mut table);
    save_table(state, &table)?;
    let rows: Vec<&R> = table.rows().collect();
    Ok(json!({ "table": name, "report": report, "rows": rows }))
}

pub fn fact(state: &Path, name: FactName) -> Result<Outcome> {
    let vault = latest_vault(state)?;
    let output = match name {
        FactName::Transactions => extend_table(state, FCT_TRANSACTIONS, &vault, tables::fct_transactions)?,
        FactName::AssetPrices => extend_table(state, FCT_ASSET_PRICES, &vault, tables::fct_asset_prices)?,
        FactName::News => extend_table(state, FCT_NEWS_EVENTS, &vault, tables::fct_news_events)?,
    };
    Ok(Outcome::ok(output))
}
