//! Feed pipelines shared by the single-feed commands and `fxa all`.
//!
//! Every feed follows the same workflow:
//! load persisted -> fetch uncovered range -> merge -> derive -> persist
//!
//! The `run_*` functions take what is already persisted plus provider capabilities and
//! return the sheets to write back, so they run against in-memory sources in tests. Only
//! `load_persisted` and `persist` touch the filesystem.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::data::kmb::{KmbSource, RateKind, RateTableSource};
use crate::data::krx::{ForeignFlowSource, NetBuyingSource};
use crate::data::smbs::{PageSource, SwapPointSource, TENORS};
use crate::data::yahoo::{BarSource, FxSource, IndexSource, KOSPI_SYMBOL};
use crate::data::{MapSource, Pacing};
use crate::domain::{Series, Table};
use crate::error::{AppError, EXIT_SOURCE};
use crate::io::{read_cache, read_series, replace_sheets, write_cache};
use crate::metrics::flow::{flow_table, raw_from_table};
use crate::metrics::fx::{ASIA_ORDER, G10_ORDER, dashboard, dashboard_table, fx_symbols, shape_fx_matrix};
use crate::metrics::swap::empty_swap_series;
use crate::series::{UpdateOutcome, resume_point, update, update_from};

pub const KOSPI_SHEET: &str = "Kospi";
pub const FX_SHEET: &str = "FX_Data";
pub const G10_SHEET: &str = "g10";
pub const ASIA_SHEET: &str = "asia";
pub const SWAP_SHEET: &str = "Swap_Point";
pub const FLOW_SHEET: &str = "Kospi_Liquidity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Kospi,
    Fx,
    SwapPoints,
    IrsCrs,
    ForeignFlow,
}

impl Feed {
    /// Run order of `fxa all`.
    pub const ALL: [Feed; 5] = [Feed::Kospi, Feed::Fx, Feed::SwapPoints, Feed::IrsCrs, Feed::ForeignFlow];

    pub fn name(self) -> &'static str {
        match self {
            Feed::Kospi => "kospi",
            Feed::Fx => "fx",
            Feed::SwapPoints => "swap-points",
            Feed::IrsCrs => "irs-crs",
            Feed::ForeignFlow => "foreign-flow",
        }
    }

    /// Persisted series this feed updates, with the shape to start from when none exists.
    pub fn templates(self) -> Vec<(&'static str, Series)> {
        match self {
            Feed::Kospi => vec![(KOSPI_SHEET, IndexSource::empty_series())],
            Feed::Fx => vec![(FX_SHEET, Series::new(FX_SHEET, "Date", Vec::new()))],
            Feed::SwapPoints => vec![(SWAP_SHEET, empty_swap_series())],
            Feed::IrsCrs => RateKind::ALL.iter().map(|k| (k.sheet(), k.empty_series())).collect(),
            Feed::ForeignFlow => vec![(FLOW_SHEET, Series::new(FLOW_SHEET, "Date", Vec::new()))],
        }
    }
}

/// The result of updating one persisted series.
#[derive(Debug, Clone)]
pub struct SheetUpdate {
    pub sheet: &'static str,
    pub outcome: UpdateOutcome,
}

/// Everything one feed run produced, ready to persist.
#[derive(Debug, Clone)]
pub struct FeedRun {
    pub feed: Feed,
    pub updates: Vec<SheetUpdate>,
    /// Sheets to replace in the workbook, in write order.
    pub sheets: Vec<(&'static str, Table)>,
    /// Series for the local CSV cache, when the feed keeps one.
    pub cache: Option<Series>,
}

impl FeedRun {
    fn new(feed: Feed) -> Self {
        Self {
            feed,
            updates: Vec::new(),
            sheets: Vec::new(),
            cache: None,
        }
    }

    fn push(&mut self, sheet: &'static str, outcome: UpdateOutcome) {
        if !outcome.series.is_empty() {
            self.sheets.push((sheet, Table::from(&outcome.series)));
        }
        self.updates.push(SheetUpdate { sheet, outcome });
    }

    /// Exit code 3 when there is nothing to write.
    fn finish(self) -> Result<Self, AppError> {
        if self.sheets.is_empty() {
            return Err(AppError::no_data(format!(
                "{}: no rows to write (nothing persisted and nothing fetched).",
                self.feed.name()
            )));
        }
        Ok(self)
    }

    pub fn added(&self) -> usize {
        self.updates.iter().map(|u| u.outcome.added).sum()
    }

    pub fn sheet(&self, name: &str) -> Option<&Table> {
        self.sheets.iter().find(|(n, _)| *n == name).map(|(_, t)| t)
    }
}

pub fn run_kospi(
    persisted: Series,
    bars: &dyn BarSource,
    as_of: NaiveDate,
    default_start: NaiveDate,
) -> Result<FeedRun, AppError> {
    let source = IndexSource::new(bars, KOSPI_SYMBOL);
    let outcome = update(persisted, &source, as_of, default_start)?;
    let mut run = FeedRun::new(Feed::Kospi);
    run.push(KOSPI_SHEET, outcome);
    run.finish()
}

/// FX closes plus the two regional dashboards derived from the full history.
pub fn run_fx(
    persisted: Series,
    bars: &dyn BarSource,
    as_of: NaiveDate,
    default_start: NaiveDate,
) -> Result<FeedRun, AppError> {
    let symbols = fx_symbols();
    let raw = FxSource::new(bars, &symbols);
    let source = MapSource::new(&raw, shape_fx_matrix);
    let mut outcome = update(persisted, &source, as_of, default_start)?;
    // Gaps can open where a new fetch joins the persisted rows.
    outcome.series.forward_fill();

    let g10 = dashboard_table(&dashboard(&outcome.series, &G10_ORDER, as_of));
    let asia = dashboard_table(&dashboard(&outcome.series, &ASIA_ORDER, as_of));

    let mut run = FeedRun::new(Feed::Fx);
    run.push(FX_SHEET, outcome);
    if !run.sheets.is_empty() {
        run.sheets.push((G10_SHEET, g10));
        run.sheets.push((ASIA_SHEET, asia));
    }
    run.finish()
}

pub fn run_swap_points(
    persisted: Series,
    pages: &dyn PageSource,
    pacing: Pacing,
    as_of: NaiveDate,
    default_start: NaiveDate,
) -> Result<FeedRun, AppError> {
    // Older caches carry a side label column; only the tenors are kept.
    let persisted = persisted.select(&TENORS);
    let source = SwapPointSource::new(pages, pacing);
    let outcome = update(persisted, &source, as_of, default_start)?;

    let mut run = FeedRun::new(Feed::SwapPoints);
    run.cache = Some(outcome.series.clone());
    run.push(SWAP_SHEET, outcome);
    run.finish()
}

/// Both rate tables. One table failing is logged and skipped; both failing is an error.
pub fn run_irs_crs(
    persisted: Vec<(&'static str, Series)>,
    tables: &dyn RateTableSource,
    as_of: NaiveDate,
    default_start: NaiveDate,
) -> Result<FeedRun, AppError> {
    let mut run = FeedRun::new(Feed::IrsCrs);
    let mut failures = Vec::new();
    for kind in RateKind::ALL {
        let series = persisted
            .iter()
            .find(|(sheet, _)| *sheet == kind.sheet())
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| kind.empty_series());
        let source = KmbSource::new(tables, kind);
        match update(series, &source, as_of, default_start) {
            Ok(outcome) => run.push(kind.sheet(), outcome),
            Err(e) => {
                warn!(kind = kind.label(), error = %e, "rate table unavailable, skipping");
                failures.push(format!("{}: {e}", kind.label()));
            }
        }
    }
    if run.updates.is_empty() {
        return Err(AppError::new(EXIT_SOURCE, failures.join("; ")));
    }
    run.finish()
}

/// Foreign net buying. The raw daily flows are recovered from the persisted table, extended,
/// and every derived column is recomputed.
///
/// Days whose combined KOSPI+KOSDAQ value is missing (KOSDAQ failed on an earlier run) are
/// fetched again, so the gap closes once the provider answers.
pub fn run_foreign_flow(
    persisted: Series,
    krx: &dyn NetBuyingSource,
    as_of: NaiveDate,
    default_start: NaiveDate,
) -> Result<FeedRun, AppError> {
    let raw = raw_from_table(&persisted);
    let source = ForeignFlowSource::new(krx);
    let start = match raw.first_missing(ForeignFlowSource::BOTH) {
        Some(gap) => {
            info!(%gap, "re-fetching days missing the combined view");
            gap
        }
        None => resume_point(&raw, default_start),
    };
    let mut outcome = update_from(raw.clone(), &source, start, as_of)?;
    // A repeated KOSDAQ failure must not erase combined values persisted earlier.
    outcome.series.fill_missing_from(&raw);
    outcome.series = flow_table(&outcome.series);

    let mut run = FeedRun::new(Feed::ForeignFlow);
    run.push(FLOW_SHEET, outcome);
    run.finish()
}

/// Read what a feed has persisted so far.
///
/// The swap feed prefers its CSV cache and falls back to the workbook sheet while no cache
/// file exists yet.
pub fn load_persisted(
    feed: Feed,
    workbook: &Path,
    swap_cache: Option<&Path>,
) -> Result<Vec<(&'static str, Series)>, AppError> {
    feed.templates()
        .into_iter()
        .map(|(sheet, empty)| {
            let series = match (feed, swap_cache) {
                (Feed::SwapPoints, Some(cache)) if cache.exists() => read_cache(cache, empty)?,
                _ => read_series(workbook, sheet, empty)?,
            };
            Ok((sheet, series))
        })
        .collect()
}

/// Write the run's sheets (and cache). Returns the workbook path actually written.
pub fn persist(run: &FeedRun, workbook: &Path, swap_cache: Option<&Path>) -> Result<PathBuf, AppError> {
    if let (Some(series), Some(path)) = (&run.cache, swap_cache) {
        write_cache(path, series)?;
        info!(path = %path.display(), rows = series.len(), "wrote cache");
    }
    let written = replace_sheets(workbook, &run.sheets)?;
    info!(
        feed = run.feed.name(),
        path = %written.display(),
        sheets = run.sheets.len(),
        "workbook updated"
    );
    Ok(written)
}
