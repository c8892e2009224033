//! vault-cli
//!
//! Runs the raw vault pipeline over a directory of JSON-lines files and
//! prints marts derived from the persisted vault. Every command writes JSON
//! to stdout; logs go to stderr.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use raw_vault::{EngineConfig, LoadMode};
use tracing_subscriber::EnvFilter;
use vault_types::ids::EntityKind;

use commands::{DimName, FactName};

#[derive(Parser, Debug)]
#[command(name = "vault-cli", version, about = "Data vault loader and marts")]
struct Cli {
    /// Engine configuration (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load source files into the vault and snapshot the result.
    Run {
        /// Directory holding `<entity>.jsonl` files.
        #[arg(long)]
        input: PathBuf,
        /// Snapshot directory.
        #[arg(long)]
        state: PathBuf,
        #[arg(long, default_value_t = LoadMode::Incremental)]
        mode: LoadMode,
        /// Restrict the run to these entity kinds (repeatable).
        #[arg(long = "entity")]
        entities: Vec<EntityKind>,
    },
    /// Print a dimension built from the latest snapshot.
    Dim {
        #[arg(long)]
        state: PathBuf,
        #[arg(long, value_enum)]
        name: DimName,
    },
    /// Extend a persisted fact table from the latest snapshot and print it.
    Fact {
        #[arg(long)]
        state: PathBuf,
        #[arg(long, value_enum)]
        name: FactName,
    },
}

fn init_logging(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    init_logging(&config);

    let outcome = match cli.command {
        Command::Run {
            input,
            state,
            mode,
            entities,
        } => commands::run(&config, &input, &state, mode, &entities)?,
        Command::Dim { state, name } => commands::dim(&state, name)?,
        Command::Fact { state, name } => commands::fact(&state, name)?,
    };

    println!("{}", serde_json::to_string_pretty(&outcome.output)?);
    if outcome.halted {
        tracing::error!("Run halted on a fatal error; see report");
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
