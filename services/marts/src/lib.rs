//! Marts Service
//!
//! Derives consumer-facing tables from the raw vault. Nothing here writes to
//! the vault: dimensions are recomputed from satellite history on demand and
//! fact tables only ever grow.
//!
//! # Modules
//! - `dimension`: Dimension Reconstructor (SCD2 intervals, current state)
//! - `fact`: Fact Assembler primitives (append-only tables, link indexes)
//! - `tables`: Concrete customer, asset, transaction, price and news tables

pub mod dimension;
pub mod fact;
pub mod tables;

pub use dimension::{DimensionRow, IntervalViolation};
pub use fact::{AssemblyReport, FactTable, LinkIndex};
