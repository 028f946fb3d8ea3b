//! Market data sources.
//!
//! Each provider sits behind a small capability trait so the pipelines can be driven by
//! in-memory fakes in tests:
//!
//! - `SeriesSource`: dated rows for a `[start, end]` range
//! - `PageSource`: raw HTML of the swap-point page for one trading date
//! - `RateTableSource`: the IRS/CRS spreadsheet download
//! - `BarSource`, `NetBuyingSource`: per-symbol and per-market provider calls

use std::time::Duration;

use chrono::NaiveDate;
use rand::Rng;
use reqwest::blocking::Client;
use thiserror::Error;

use crate::domain::Series;
use crate::error::AppError;

pub mod decode;
pub mod kmb;
pub mod krx;
pub mod smbs;
pub mod yahoo;

pub use decode::DecodeError;
pub use kmb::{KmbClient, KmbSource, RateKind, RateTableSource};
pub use krx::{ForeignFlowSource, KrxClient, Market, NetBuyingSource};
pub use smbs::{PageSource, SmbsClient, SwapPointSource};
pub use yahoo::{Bar, BarSource, FxSource, IndexSource, YahooClient};

const USER_AGENT: &str = concat!("fx-automation/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned status {status}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("failed to parse {provider} response: {message}")]
    Parse {
        provider: &'static str,
        message: String,
    },

    #[error("undecodable page content: {0}")]
    Decode(#[from] DecodeError),

    #[error("no data returned for {0}")]
    NoData(String),
}

impl SourceError {
    pub fn parse(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            provider,
            message: message.into(),
        }
    }
}

/// Anything that can produce dated observations for an inclusive date range.
pub trait SeriesSource {
    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<Series, SourceError>;
}

/// Post-processes whatever an inner source returns.
pub struct MapSource<'a, F> {
    inner: &'a dyn SeriesSource,
    map: F,
}

impl<'a, F> MapSource<'a, F>
where
    F: Fn(Series) -> Series,
{
    pub fn new(inner: &'a dyn SeriesSource, map: F) -> Self {
        Self { inner, map }
    }
}

impl<F> SeriesSource for MapSource<'_, F>
where
    F: Fn(Series) -> Series,
{
    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<Series, SourceError> {
        let raw = self.inner.fetch(start, end)?;
        if raw.is_empty() {
            return Ok(raw);
        }
        Ok((self.map)(raw))
    }
}

/// Fixed delay plus random jitter between consecutive page requests.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub delay: Duration,
    pub jitter: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn pause(&self) {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        let total = self.delay + extra;
        if !total.is_zero() {
            std::thread::sleep(total);
        }
    }
}

/// Blocking HTTP client shared by all providers.
///
/// Every call is bounded by `timeout`; a timed-out request surfaces as `SourceError::Http`.
pub fn http_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AppError::config(format!("Failed to build HTTP client: {e}")))
}

pub(crate) fn check_status(
    provider: &'static str,
    resp: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, SourceError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Status { provider, status });
    }
    Ok(resp)
}
