//! Incremental series updater.
//!
//! Given what is already persisted and a source that can fetch a date range, fetch only the
//! uncovered tail `[resume_point, as_of]` and merge it in.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::data::{SeriesSource, SourceError};
use crate::domain::Series;
use crate::domain::calendar::{business_days, next_business_day};
use crate::series::merge::merge_series;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The resume point is after the as-of date; nothing was fetched.
    UpToDate,
    /// The source was asked but returned no rows.
    NoNewData,
    /// New rows were fetched and merged.
    Updated,
}

impl UpdateStatus {
    pub fn label(self) -> &'static str {
        match self {
            UpdateStatus::UpToDate => "up to date",
            UpdateStatus::NoNewData => "no new data",
            UpdateStatus::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub series: Series,
    /// Dates present after the merge that were absent before it.
    pub added: usize,
    pub status: UpdateStatus,
    /// The range that was requested from the source, if any.
    pub requested: Option<(NaiveDate, NaiveDate)>,
}

/// First date not yet covered by `persisted`.
pub fn resume_point(persisted: &Series, default_start: NaiveDate) -> NaiveDate {
    match persisted.last_date() {
        Some(last) => next_business_day(last),
        None => default_start,
    }
}

pub fn update(
    persisted: Series,
    source: &dyn SeriesSource,
    as_of: NaiveDate,
    default_start: NaiveDate,
) -> Result<UpdateOutcome, SourceError> {
    let start = resume_point(&persisted, default_start);
    update_from(persisted, source, start, as_of)
}

/// Fetch `[start, as_of]` and merge it over `persisted`.
///
/// `start` may fall inside the persisted history; fetched rows then replace the persisted
/// rows on the same dates and `added` counts only dates that were not persisted before.
pub fn update_from(
    persisted: Series,
    source: &dyn SeriesSource,
    start: NaiveDate,
    as_of: NaiveDate,
) -> Result<UpdateOutcome, SourceError> {
    if start > as_of {
        info!(series = %persisted.name, resume = %start, %as_of, "no new business days to fetch");
        return Ok(UpdateOutcome {
            series: persisted,
            added: 0,
            status: UpdateStatus::UpToDate,
            requested: None,
        });
    }

    info!(series = %persisted.name, %start, end = %as_of, "fetching range");
    let fetched = source.fetch(start, as_of)?;
    if fetched.is_empty() {
        info!(series = %persisted.name, "source returned no rows");
        return Ok(UpdateOutcome {
            series: persisted,
            added: 0,
            status: UpdateStatus::NoNewData,
            requested: Some((start, as_of)),
        });
    }

    let before: HashSet<NaiveDate> = persisted.rows.iter().map(|r| r.date).collect();
    let merged = merge_series(&persisted, &fetched);
    let added = merged.rows.iter().filter(|r| !before.contains(&r.date)).count();
    debug!(series = %merged.name, fetched = fetched.len(), added, total = merged.len(), "merged");

    Ok(UpdateOutcome {
        series: merged,
        added,
        status: UpdateStatus::Updated,
        requested: Some((start, as_of)),
    })
}

/// How far behind a persisted series is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStatus {
    pub last_date: Option<NaiveDate>,
    pub rows: usize,
    pub resume: NaiveDate,
    pub as_of: NaiveDate,
    pub pending_business_days: usize,
}

impl DataStatus {
    pub fn needs_update(&self) -> bool {
        self.pending_business_days > 0
    }
}

pub fn data_status(persisted: &Series, as_of: NaiveDate, default_start: NaiveDate) -> DataStatus {
    let resume = resume_point(persisted, default_start);
    DataStatus {
        last_date: persisted.last_date(),
        rows: persisted.len(),
        resume,
        as_of,
        pending_business_days: business_days(resume, as_of).len(),
    }
}
