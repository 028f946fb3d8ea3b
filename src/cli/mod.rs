//! Command-line parsing for the market data collector.
//!
//! Argument parsing and command dispatch stay separate from the feed pipelines; flags here
//! only override values that otherwise come from `config::Settings`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::parse_date;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fxa", version, about = "FX and Korean market data collector (workbook updater)")]
pub struct Cli {
    /// Log level for this crate's output (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Update the KOSPI index sheet.
    Kospi(FeedArgs),
    /// Update FX closes and the G10/Asia dashboards.
    Fx(RangeArgs),
    /// Scrape swap points and update the cache and sheet.
    SwapPoints(SwapArgs),
    /// Download the IRS and CRS rate tables.
    IrsCrs(FeedArgs),
    /// Update KOSPI foreign net buying and its derived columns.
    ForeignFlow(RangeArgs),
    /// Run every feed in order, continuing past failures.
    All(FeedArgs),
    /// Show how far behind each persisted sheet is.
    Status(StatusArgs),
    /// Print the tail of a sheet, optionally plotting one column.
    Show(ShowArgs),
}

/// Options shared by every feed.
#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    /// Workbook to update (default: FXA_WORKBOOK or FX_automation.xlsx).
    #[arg(long, value_name = "PATH")]
    pub workbook: Option<PathBuf>,

    /// Last date to fetch, YYYY-MM-DD (default: today).
    #[arg(long, value_parser = parse_date_arg)]
    pub as_of: Option<NaiveDate>,

    /// Compute and report without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Feed options plus a history start for sheets that do not exist yet.
#[derive(Debug, Args, Clone)]
pub struct RangeArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    /// First date to fetch when nothing is persisted, YYYY-MM-DD.
    #[arg(long, value_parser = parse_date_arg)]
    pub start: Option<NaiveDate>,
}

#[derive(Debug, Args, Clone)]
pub struct SwapArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    /// CSV cache of mid swap points (default: FXA_SWAP_CACHE or fx_swap_mid.csv).
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Ignore the CSV cache and resume from the workbook sheet.
    #[arg(long, conflicts_with = "cache")]
    pub no_cache: bool,
}

#[derive(Debug, Args, Clone)]
pub struct StatusArgs {
    #[arg(long, value_name = "PATH")]
    pub workbook: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    #[arg(long, value_parser = parse_date_arg)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Sheet name, e.g. FX_Data or g10.
    #[arg(long)]
    pub sheet: String,

    /// Column to plot (default: the first value column).
    #[arg(long)]
    pub column: Option<String>,

    /// Number of trailing rows to print.
    #[arg(long, default_value_t = 10)]
    pub rows: usize,

    #[arg(long, value_name = "PATH")]
    pub workbook: Option<PathBuf>,

    /// Render an ASCII plot of the column.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw).ok_or_else(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}
