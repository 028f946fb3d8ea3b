//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the time-indexed numeric series (`Series`, `Observation`)
//! - the weekday-only business calendar
//! - the cell table written to and read from workbook sheets (`Table`)

pub mod calendar;
pub mod table;
pub mod types;

pub use table::*;
pub use types::*;
