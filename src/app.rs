//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and initializes logging
//! - loads settings from the environment
//! - builds the provider clients for the requested feed
//! - prints summaries, status tables, and plots

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::app::pipeline::{ASIA_SHEET, Feed, FeedRun, G10_SHEET};
use crate::cli::{Command, FeedArgs, RangeArgs, ShowArgs, StatusArgs, SwapArgs};
use crate::config::Settings;
use crate::data::{KmbClient, KrxClient, SmbsClient, YahooClient, http_client};
use crate::error::AppError;
use crate::report::StatusLine;
use crate::series::data_status;

pub mod pipeline;

/// Entry point for the `fxa` binary.
pub fn run() -> Result<(), AppError> {
    // Bare `fxa` (or `fxa --flag ...`) is a status check.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    init_logging(&cli.log_level);

    let settings = Settings::from_env()?;

    match cli.command {
        Command::Kospi(args) => run_feed(Feed::Kospi, &settings, &FeedOptions::from_feed(&settings, args)),
        Command::Fx(args) => run_feed(Feed::Fx, &settings, &FeedOptions::from_range(&settings, args)),
        Command::SwapPoints(args) => run_feed(Feed::SwapPoints, &settings, &FeedOptions::from_swap(&settings, args)),
        Command::IrsCrs(args) => run_feed(Feed::IrsCrs, &settings, &FeedOptions::from_feed(&settings, args)),
        Command::ForeignFlow(args) => {
            run_feed(Feed::ForeignFlow, &settings, &FeedOptions::from_range(&settings, args))
        }
        Command::All(args) => handle_all(&settings, args),
        Command::Status(args) => handle_status(&settings, args),
        Command::Show(args) => handle_show(&settings, args),
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("fx_automation={level}").into());
    // Logs go to stderr so stdout carries only reports.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Settings with CLI overrides applied, for one feed run.
#[derive(Debug, Clone)]
struct FeedOptions {
    workbook: PathBuf,
    as_of: NaiveDate,
    start: Option<NaiveDate>,
    swap_cache: Option<PathBuf>,
    dry_run: bool,
}

impl FeedOptions {
    fn from_feed(settings: &Settings, args: FeedArgs) -> Self {
        Self {
            workbook: args.workbook.unwrap_or_else(|| settings.workbook.clone()),
            as_of: args.as_of.unwrap_or_else(today),
            start: None,
            swap_cache: Some(settings.swap_cache.clone()),
            dry_run: args.dry_run,
        }
    }

    fn from_range(settings: &Settings, args: RangeArgs) -> Self {
        Self {
            start: args.start,
            ..Self::from_feed(settings, args.feed)
        }
    }

    fn from_swap(settings: &Settings, args: SwapArgs) -> Self {
        let swap_cache = if args.no_cache {
            None
        } else {
            Some(args.cache.unwrap_or_else(|| settings.swap_cache.clone()))
        };
        Self {
            swap_cache,
            ..Self::from_feed(settings, args.feed)
        }
    }
}

/// Where a feed starts when nothing is persisted yet.
fn default_start(feed: Feed, settings: &Settings, as_of: NaiveDate, start: Option<NaiveDate>) -> NaiveDate {
    if let Some(start) = start {
        return start;
    }
    match feed {
        Feed::Kospi => settings.kospi_default_start(as_of),
        Feed::Fx => settings.fx_start,
        Feed::SwapPoints => settings.swap_default_start(as_of),
        Feed::IrsCrs => settings.rates_start,
        Feed::ForeignFlow => settings.flow_start,
    }
}

/// Build the provider client for `feed` and run its pipeline.
fn execute(feed: Feed, settings: &Settings, opts: &FeedOptions) -> Result<FeedRun, AppError> {
    let client = http_client(settings.http_timeout)?;
    let persisted = pipeline::load_persisted(feed, &opts.workbook, opts.swap_cache.as_deref())?;
    let start = default_start(feed, settings, opts.as_of, opts.start);
    let primary = persisted
        .first()
        .map(|(_, s)| s.clone())
        .unwrap_or_else(|| feed.templates().remove(0).1);

    info!(feed = feed.name(), as_of = %opts.as_of, %start, workbook = %opts.workbook.display(), "running feed");
    match feed {
        Feed::Kospi => {
            let yahoo = YahooClient::new(client, settings.yahoo_url.as_str());
            pipeline::run_kospi(primary, &yahoo, opts.as_of, start)
        }
        Feed::Fx => {
            let yahoo = YahooClient::new(client, settings.yahoo_url.as_str());
            pipeline::run_fx(primary, &yahoo, opts.as_of, start)
        }
        Feed::SwapPoints => {
            let smbs = SmbsClient::new(client, settings.smbs_url.as_str());
            pipeline::run_swap_points(primary, &smbs, settings.pacing(), opts.as_of, start)
        }
        Feed::IrsCrs => {
            let kmb = KmbClient::new(client, settings.kmb_url.as_str());
            pipeline::run_irs_crs(persisted, &kmb, opts.as_of, start)
        }
        Feed::ForeignFlow => {
            let krx = KrxClient::new(client, settings.krx_url.as_str());
            pipeline::run_foreign_flow(primary, &krx, opts.as_of, start)
        }
    }
}

/// Run, persist unless dry-run, and print the summary.
fn run_feed(feed: Feed, settings: &Settings, opts: &FeedOptions) -> Result<(), AppError> {
    let run = execute(feed, settings, opts)?;
    let written = if opts.dry_run {
        None
    } else {
        Some(pipeline::persist(&run, &opts.workbook, opts.swap_cache.as_deref())?)
    };

    println!("{}", crate::report::format_run_summary(&run, opts.as_of, written.as_deref()));
    if feed == Feed::Fx {
        for sheet in [G10_SHEET, ASIA_SHEET] {
            if let Some(table) = run.sheet(sheet) {
                println!("[{sheet}]");
                println!("{}", crate::report::format_table(table, table.rows.len()));
            }
        }
    }
    Ok(())
}

fn handle_all(settings: &Settings, args: FeedArgs) -> Result<(), AppError> {
    let opts = FeedOptions::from_feed(settings, args);
    let mut failures = Vec::new();
    for feed in Feed::ALL {
        if let Err(e) = run_feed(feed, settings, &opts) {
            error!(feed = feed.name(), exit_code = e.exit_code(), error = %e, "feed failed, continuing");
            failures.push((feed, e));
        }
    }
    if failures.is_empty() {
        return Ok(());
    }

    println!("{}", crate::report::format_failures(&failures));
    let exit_code = failures[0].1.exit_code();
    Err(AppError::new(
        exit_code,
        format!("{} of {} feeds failed.", failures.len(), Feed::ALL.len()),
    ))
}

fn handle_status(settings: &Settings, args: StatusArgs) -> Result<(), AppError> {
    let workbook = args.workbook.unwrap_or_else(|| settings.workbook.clone());
    let cache = args.cache.unwrap_or_else(|| settings.swap_cache.clone());
    let as_of = args.as_of.unwrap_or_else(today);

    let mut lines = Vec::new();
    for feed in Feed::ALL {
        let start = default_start(feed, settings, as_of, None);
        for (sheet, series) in pipeline::load_persisted(feed, &workbook, Some(&cache))? {
            lines.push(StatusLine {
                feed,
                sheet,
                status: data_status(&series, as_of, start),
            });
        }
    }
    println!("Workbook: {}", workbook.display());
    println!("{}", crate::report::format_status(&lines, as_of));
    Ok(())
}

fn handle_show(settings: &Settings, args: ShowArgs) -> Result<(), AppError> {
    let workbook = args.workbook.unwrap_or_else(|| settings.workbook.clone());
    let table = crate::io::read_table(&workbook, &args.sheet)?.ok_or_else(|| {
        AppError::no_data(format!("Sheet '{}' not found in '{}'.", args.sheet, workbook.display()))
    })?;

    println!("[{}] {} rows", args.sheet, table.rows.len());
    println!("{}", crate::report::format_table(&table, args.rows));

    if args.plot || args.column.is_some() {
        let series = table.to_series(args.sheet.as_str());
        let column = match args.column {
            Some(c) => c,
            None => series
                .columns
                .first()
                .cloned()
                .ok_or_else(|| AppError::no_data(format!("Sheet '{}' has no value columns.", args.sheet)))?,
        };
        let values = series.column_values(&column).ok_or_else(|| {
            AppError::config(format!("Column '{column}' not found in sheet '{}'.", args.sheet))
        })?;
        let plot = crate::plot::render_series_plot(&column, &series.dates(), &values, args.width, args.height);
        println!("{plot}");
    }
    Ok(())
}

/// Rewrite argv so `fxa` defaults to `fxa status`.
///
/// Rules:
/// - `fxa`                         -> `fxa status`
/// - `fxa --as-of 2024-01-10 ...`  -> `fxa status --as-of 2024-01-10 ...`
/// - `fxa --help/--version/-h`     -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("status".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "status".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn settings() -> Settings {
        Settings::from_lookup(|_| None).unwrap()
    }

    #[test]
    fn bare_invocation_is_status() {
        assert_eq!(rewrite_args(args(&["fxa"])), args(&["fxa", "status"]));
        assert_eq!(
            rewrite_args(args(&["fxa", "--as-of", "2024-01-10"])),
            args(&["fxa", "status", "--as-of", "2024-01-10"])
        );
        assert_eq!(rewrite_args(args(&["fxa", "--help"])), args(&["fxa", "--help"]));
        assert_eq!(rewrite_args(args(&["fxa", "fx"])), args(&["fxa", "fx"]));
    }

    #[test]
    fn start_override_beats_feed_default() {
        let s = settings();
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(default_start(Feed::Fx, &s, as_of, Some(start)), start);
        assert_eq!(default_start(Feed::Fx, &s, as_of, None), s.fx_start);
        assert_eq!(default_start(Feed::ForeignFlow, &s, as_of, None), s.flow_start);
        assert_eq!(
            default_start(Feed::Kospi, &s, as_of, None),
            NaiveDate::from_ymd_opt(2023, 6, 4).unwrap()
        );
    }

    #[test]
    fn no_cache_drops_the_cache_path() {
        let cli = crate::cli::Cli::parse_from(["fxa", "swap-points", "--no-cache"]);
        let Command::SwapPoints(swap) = cli.command else {
            panic!("expected swap-points");
        };
        let opts = FeedOptions::from_swap(&settings(), swap);
        assert_eq!(opts.swap_cache, None);
        assert_eq!(opts.workbook, PathBuf::from("FX_automation.xlsx"));
    }
}
