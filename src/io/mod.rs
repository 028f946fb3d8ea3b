//! Persistence.
//!
//! - whole-sheet read/replace in the shared workbook (`workbook`)
//! - the swap-point CSV cache (`cache`)

pub mod cache;
pub mod workbook;

pub use cache::*;
pub use workbook::*;
