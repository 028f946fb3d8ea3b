//! `fx-automation` library crate.
//!
//! The binary (`fxa`) is a thin wrapper around this library so that:
//!
//! - feed pipelines are testable without spawning processes or touching the network
//! - provider clients, metrics, and workbook IO are reusable on their own

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod metrics;
pub mod plot;
pub mod report;
pub mod series;
