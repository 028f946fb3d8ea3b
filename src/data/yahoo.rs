//! Yahoo Finance chart API: daily bars for FX pairs, the dollar index, and KOSPI.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::data::{SeriesSource, SourceError, check_status};
use crate::domain::Series;

pub const DEFAULT_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
pub const KOSPI_SYMBOL: &str = "^KS11";

const PROVIDER: &str = "Yahoo";

/// Characters that must not appear raw in the symbol path segment.
const SYMBOL_SEGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'^').add(b'/').add(b'?').add(b'#').add(b'%');

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// Daily OHLCV bars for one symbol.
pub trait BarSource {
    fn daily_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, SourceError>;
}

pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl BarSource for YahooClient {
    fn daily_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, SourceError> {
        let period1 = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0);
        let period2 = (end + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(period1);
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            utf8_percent_encode(symbol, SYMBOL_SEGMENT)
        );

        debug!(%symbol, %start, %end, "requesting chart");
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()?;
        let body = check_status(PROVIDER, resp)?.text()?;
        let bars = parse_chart(symbol, &body)?;
        Ok(bars
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Parse a chart response body into bars, one per exchange-local date.
///
/// When the provider returns two bars for one date (a settled daily bar plus a live one),
/// the later bar wins.
pub fn parse_chart(symbol: &str, body: &str) -> Result<Vec<Bar>, SourceError> {
    let parsed: ChartResponse =
        serde_json::from_str(body).map_err(|e| SourceError::parse(PROVIDER, format!("{symbol}: {e}")))?;

    if let Some(err) = parsed.chart.error {
        let detail = err.description.unwrap_or_default();
        return Err(SourceError::parse(PROVIDER, format!("{symbol}: {} {detail}", err.code)));
    }
    let Some(result) = parsed.chart.result.and_then(|r| r.into_iter().next()) else {
        return Err(SourceError::NoData(symbol.to_string()));
    };

    let offset = result.meta.map(|m| m.gmtoffset).unwrap_or(0);
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let pick = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten().filter(|x| x.is_finite());

    let mut by_date: BTreeMap<NaiveDate, Bar> = BTreeMap::new();
    for (i, ts) in result.timestamp.iter().enumerate() {
        let Some(date) = DateTime::from_timestamp(ts + offset, 0).map(|dt| dt.date_naive()) else {
            continue;
        };
        by_date.insert(
            date,
            Bar {
                date,
                open: pick(&quote.open, i),
                high: pick(&quote.high, i),
                low: pick(&quote.low, i),
                close: pick(&quote.close, i),
                volume: pick(&quote.volume, i),
            },
        );
    }
    Ok(by_date.into_values().collect())
}

/// An index level series in the layout of the `Kospi` sheet.
pub struct IndexSource<'a> {
    bars: &'a dyn BarSource,
    symbol: String,
}

impl<'a> IndexSource<'a> {
    pub const COLUMNS: [&'static str; 7] = ["Open", "High", "Low", "Close", "Volume", "Value", "MarketCap"];

    pub fn new(bars: &'a dyn BarSource, symbol: impl Into<String>) -> Self {
        Self {
            bars,
            symbol: symbol.into(),
        }
    }

    pub fn empty_series() -> Series {
        Series::new(
            "Kospi",
            "날짜",
            Self::COLUMNS.iter().map(|c| c.to_string()).collect(),
        )
    }
}

impl SeriesSource for IndexSource<'_> {
    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<Series, SourceError> {
        let mut series = Self::empty_series();
        for bar in self.bars.daily_bars(&self.symbol, start, end)? {
            // Traded value approximated as volume times close; market cap is not provided.
            let value = match (bar.volume, bar.close) {
                (Some(v), Some(c)) => Some(v * c),
                _ => None,
            };
            series.push(
                bar.date,
                vec![bar.open, bar.high, bar.low, bar.close, bar.volume, value, None],
            );
        }
        Ok(series)
    }
}

/// Close prices of several symbols joined on date, one column per symbol.
pub struct FxSource<'a> {
    bars: &'a dyn BarSource,
    symbols: Vec<String>,
}

impl<'a> FxSource<'a> {
    pub fn new(bars: &'a dyn BarSource, symbols: &[&str]) -> Self {
        Self {
            bars,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SeriesSource for FxSource<'_> {
    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<Series, SourceError> {
        let mut columns = Vec::new();
        let mut closes: Vec<BTreeMap<NaiveDate, f64>> = Vec::new();
        let mut failed = Vec::new();

        for symbol in &self.symbols {
            match self.bars.daily_bars(symbol, start, end) {
                Ok(bars) => {
                    columns.push(symbol.clone());
                    closes.push(
                        bars.into_iter()
                            .filter_map(|b| b.close.map(|c| (b.date, c)))
                            .collect(),
                    );
                }
                Err(e) => {
                    warn!(%symbol, error = %e, "symbol unavailable, skipping");
                    failed.push(symbol.as_str());
                }
            }
        }
        if columns.is_empty() && !self.symbols.is_empty() {
            return Err(SourceError::NoData(failed.join(", ")));
        }

        let mut dates: Vec<NaiveDate> = closes.iter().flat_map(|m| m.keys().copied()).collect();
        dates.sort();
        dates.dedup();

        let mut series = Series::new("FX_Data", "Date", columns);
        for date in dates {
            let values = closes.iter().map(|m| m.get(&date).copied()).collect();
            series.push(date, values);
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    const KS11_BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "^KS11", "gmtoffset": 32400},
                "timestamp": [1704153600, 1704240000, 1704268800],
                "indicators": {"quote": [{
                    "open":   [2650.0, 2640.0, 2641.0],
                    "high":   [2670.0, 2660.0, 2661.0],
                    "low":    [2640.0, 2600.0, 2601.0],
                    "close":  [2669.8, 2607.3, 2608.0],
                    "volume": [400000, null, 500000]
                }]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parse_chart_applies_exchange_offset_and_keeps_last_bar_per_date() {
        let bars = parse_chart("^KS11", KS11_BODY).unwrap();
        // 1704153600 = 2024-01-02 00:00 UTC -> 09:00 KST; the next two share 2024-01-03 KST.
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, d(2024, 1, 2));
        assert_eq!(bars[1].date, d(2024, 1, 3));
        assert_eq!(bars[1].close, Some(2608.0));
        assert_eq!(bars[1].volume, Some(500000.0));
    }

    #[test]
    fn parse_chart_surfaces_provider_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("XXX=X", body).unwrap_err();
        assert!(err.to_string().contains("Not Found"));

        let empty = r#"{"chart":{"result":[],"error":null}}"#;
        assert!(matches!(parse_chart("XXX=X", empty), Err(SourceError::NoData(_))));
    }

    struct FakeBars(HashMap<String, Vec<Bar>>);

    impl BarSource for FakeBars {
        fn daily_bars(&self, symbol: &str, _start: NaiveDate, _end: NaiveDate) -> Result<Vec<Bar>, SourceError> {
            self.0
                .get(symbol)
                .cloned()
                .ok_or_else(|| SourceError::NoData(symbol.to_string()))
        }
    }

    fn close_bar(date: NaiveDate, close: f64) -> Bar {
        Bar {
            date,
            open: None,
            high: None,
            low: None,
            close: Some(close),
            volume: Some(10.0),
        }
    }

    #[test]
    fn index_source_derives_value_and_leaves_market_cap_missing() {
        let fake = FakeBars(HashMap::from([(
            KOSPI_SYMBOL.to_string(),
            vec![close_bar(d(2024, 1, 2), 2500.0)],
        )]));
        let series = IndexSource::new(&fake, KOSPI_SYMBOL)
            .fetch(d(2024, 1, 1), d(2024, 1, 5))
            .unwrap();
        assert_eq!(series.date_label, "날짜");
        assert_eq!(series.column_values("Value").unwrap(), vec![25000.0]);
        assert_eq!(series.rows[0].values[6], None);
    }

    #[test]
    fn fx_source_joins_symbols_and_skips_failures() {
        let fake = FakeBars(HashMap::from([
            (
                "KRW=X".to_string(),
                vec![close_bar(d(2024, 1, 2), 1300.0), close_bar(d(2024, 1, 3), 1310.0)],
            ),
            ("JPY=X".to_string(), vec![close_bar(d(2024, 1, 3), 144.0)]),
        ]));
        let series = FxSource::new(&fake, &["KRW=X", "MISSING=X", "JPY=X"])
            .fetch(d(2024, 1, 1), d(2024, 1, 5))
            .unwrap();
        assert_eq!(series.columns, vec!["KRW=X", "JPY=X"]);
        assert_eq!(series.rows[0].values, vec![Some(1300.0), None]);
        assert_eq!(series.rows[1].values, vec![Some(1310.0), Some(144.0)]);

        let err = FxSource::new(&fake, &["MISSING=X"]).fetch(d(2024, 1, 1), d(2024, 1, 5));
        assert!(matches!(err, Err(SourceError::NoData(_))));
    }
}
