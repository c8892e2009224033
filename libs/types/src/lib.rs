//! Types library for the raw vault
//!
//! This library provides the type definitions shared by the vault builders,
//! the marts and the command-line tooling, so that every crate agrees on
//! identifiers, canonical value forms and the error taxonomy.
//!
//! # Modules
//! - `ids`: Digest keys (HashKey, HashDiff), run identifiers, entity and link kinds
//! - `time`: Timestamp alias and the open-interval sentinel
//! - `value`: Typed field values with a canonical string form
//! - `records`: Raw source record schemas per entity
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod time;
pub mod value;
pub mod records;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::time::*;
    pub use crate::value::*;
    pub use crate::records::*;
    pub use crate::errors::*;
}
