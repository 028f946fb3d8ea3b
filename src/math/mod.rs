//! Mathematical utilities: rolling windows, drawdowns, RSI, z-scores.

pub mod stats;

pub use stats::*;
