//! KRX data portal: daily trading value by investor type.
//!
//! The portal serves every statistics screen through one JSON endpoint selected by a `bld`
//! form field. Net buying (`askBid=3`) by value (`trdVolVal=2`) as a daily trend
//! (`inqTpCd=2`) carries the foreign total in `TRDVAL4`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::data::{SeriesSource, SourceError, check_status};
use crate::domain::{Series, parse_date, parse_number};

pub const DEFAULT_URL: &str = "http://data.krx.co.kr/comm/bldAttendant/getJsonData.cmd";
const REFERER: &str = "http://data.krx.co.kr/contents/MDC/MDI/mdiLoader";
const TRADING_BY_INVESTOR_BLD: &str = "dbms/MDC/STAT/standard/MDCSTAT02202";

const PROVIDER: &str = "KRX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    pub fn id(self) -> &'static str {
        match self {
            Market::Kospi => "STK",
            Market::Kosdaq => "KSQ",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Market::Kospi => "KOSPI",
            Market::Kosdaq => "KOSDAQ",
        }
    }
}

/// Daily foreign net buying (KRW) for one market.
pub trait NetBuyingSource {
    fn foreign_net_buying(
        &self,
        market: Market,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, f64>, SourceError>;
}

pub struct KrxClient {
    client: Client,
    url: String,
}

impl KrxClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl NetBuyingSource for KrxClient {
    fn foreign_net_buying(
        &self,
        market: Market,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, f64>, SourceError> {
        let strt = start.format("%Y%m%d").to_string();
        let endd = end.format("%Y%m%d").to_string();
        debug!(market = market.label(), %start, %end, "requesting investor trading value");
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::REFERER, REFERER)
            .form(&[
                ("bld", TRADING_BY_INVESTOR_BLD),
                ("mktId", market.id()),
                ("strtDd", strt.as_str()),
                ("endDd", endd.as_str()),
                ("inqTpCd", "2"),
                ("trdVolVal", "2"),
                ("askBid", "3"),
                ("etf", ""),
                ("etn", ""),
                ("elw", ""),
            ])
            .send()?;
        let body = check_status(PROVIDER, resp)?.text()?;
        parse_trading_value(&body)
    }
}

#[derive(Debug, Deserialize)]
struct TradingValueResponse {
    #[serde(default)]
    output: Vec<TradingValueRow>,
}

#[derive(Debug, Deserialize)]
struct TradingValueRow {
    #[serde(rename = "TRD_DD")]
    date: String,
    #[serde(rename = "TRDVAL4", default)]
    foreign: Option<String>,
}

/// Foreign net buying per date from a portal response. Rows with an unreadable date or
/// amount are dropped.
pub fn parse_trading_value(body: &str) -> Result<BTreeMap<NaiveDate, f64>, SourceError> {
    let parsed: TradingValueResponse =
        serde_json::from_str(body).map_err(|e| SourceError::parse(PROVIDER, e.to_string()))?;
    Ok(parsed
        .output
        .into_iter()
        .filter_map(|row| {
            let date = parse_date(&row.date)?;
            let value = parse_number(row.foreign.as_deref()?)?;
            Some((date, value))
        })
        .collect())
}

/// Raw daily foreign net buying for the KOSPI view and the combined KOSPI+KOSDAQ view.
pub struct ForeignFlowSource<'a> {
    krx: &'a dyn NetBuyingSource,
}

impl<'a> ForeignFlowSource<'a> {
    pub const KOSPI: &'static str = "KOSPI";
    pub const BOTH: &'static str = "KOSPI+KOSDAQ";

    pub fn new(krx: &'a dyn NetBuyingSource) -> Self {
        Self { krx }
    }

    pub fn empty_series() -> Series {
        Series::new(
            "Kospi_Liquidity",
            "Date",
            vec![Self::KOSPI.to_string(), Self::BOTH.to_string()],
        )
    }
}

impl SeriesSource for ForeignFlowSource<'_> {
    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<Series, SourceError> {
        let kospi = self.krx.foreign_net_buying(Market::Kospi, start, end)?;
        let kosdaq = match self.krx.foreign_net_buying(Market::Kosdaq, start, end) {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(error = %e, "KOSDAQ flow unavailable, combined view left empty");
                None
            }
        };

        let mut dates: Vec<NaiveDate> = kospi.keys().copied().collect();
        if let Some(kosdaq) = &kosdaq {
            dates.extend(kosdaq.keys().copied());
        }
        dates.sort();
        dates.dedup();

        let mut series = Self::empty_series();
        for date in dates {
            let k = kospi.get(&date).copied();
            // A market missing on a date contributes zero to the combined view.
            let both = kosdaq.as_ref().map(|q| {
                let kq = q.get(&date).copied();
                k.unwrap_or(0.0) + kq.unwrap_or(0.0)
            });
            series.push(date, vec![k, both]);
        }
        Ok(series)
    }
}
