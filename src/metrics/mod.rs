//! Feed-specific derived tables built on `math`.
//!
//! - FX matrix shaping and regional dashboards (`fx`)
//! - foreign net-buying liquidity columns (`flow`)
//! - bid/offer to mid swap points (`swap`)

pub mod flow;
pub mod fx;
pub mod swap;
