//! Raw Vault Service
//!
//! Builds the insert-only raw vault (hubs, links, satellites) from
//! append-only source streams, and keeps it safely re-executable: every
//! write is keyed by a deterministic identity, every stage can be rerun over
//! the same window without effect, and late or duplicated input is ordered
//! by one fixed tie-break rule.
//!
//! # Modules
//! - `keys`: Key Composer (surrogate keys, hashdiffs)
//! - `dedup`: Deduplicator (earliest-wins, consecutive-state collapse)
//! - `store`: Insert-only hub/link/satellite stores
//! - `model`: Staging of raw records into vault shape
//! - `hub`, `link`, `satellite`: Stage builders
//! - `loader`: Incremental Loader and watermarks
//! - `feed`: Record feeds (in-memory, JSON lines)
//! - `quarantine`: Malformed input retention
//! - `pipeline`: Stage ordering, parallelism, run reports
//! - `snapshot`: Vault persistence with integrity hashes
//! - `config`: Engine configuration

pub mod keys;
pub mod dedup;
pub mod store;
pub mod model;
pub mod hub;
pub mod link;
pub mod satellite;
pub mod loader;
pub mod feed;
pub mod quarantine;
pub mod pipeline;
pub mod snapshot;
pub mod config;

pub use config::EngineConfig;
pub use loader::LoadMode;
pub use pipeline::{Pipeline, RunReport, RunRequest, Vault};
