//! Domain layer: document kinds, source records and their invariants.

pub mod dates;
pub mod error;
pub mod records;
pub mod types;
