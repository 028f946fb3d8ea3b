//! Incremental update of persisted series.
//!
//! - `merge`: concatenate, deduplicate by date (last wins), sort
//! - `updater`: resume-point logic around a `SeriesSource`

pub mod merge;
pub mod updater;

pub use merge::*;
pub use updater::*;
