//! FX spot matrix and regional dashboards.
//!
//! Provider symbols are renamed to `BASE_QUOTE` form, gaps are forward-filled, and the
//! handful of pairs quoted as XXX/USD are inverted so every column reads as USD/XXX.

use chrono::{Datelike, NaiveDate};

use crate::domain::{Cell, Series, Table};
use crate::math::{annualized_vol, change_over, expanding_max, max_drawdown, pct_change, round_to, rsi, ytd_change};

pub const CORE_SYMBOLS: [&str; 1] = ["KRW=X"];
pub const ASIA_SYMBOLS: [&str; 9] = [
    "CNY=X", "TWD=X", "THB=X", "SGD=X", "MYR=X", "IDR=X", "INR=X", "PHP=X", "HKD=X",
];
pub const G10_SYMBOLS: [&str; 9] = [
    "JPY=X", "CHF=X", "CAD=X", "NOK=X", "SEK=X", "EURUSD=X", "GBPUSD=X", "AUDUSD=X", "NZDUSD=X",
];
pub const DXY_SYMBOL: &str = "DX-Y.NYB";

pub const G10_ORDER: [&str; 10] = [
    "DXY", "USD_EUR", "USD_JPY", "USD_GBP", "USD_CAD", "USD_SEK", "USD_CHF", "USD_NOK", "USD_AUD", "USD_NZD",
];
pub const ASIA_ORDER: [&str; 10] = [
    "USD_CNY", "USD_INR", "USD_KRW", "USD_IDR", "USD_TWD", "USD_THB", "USD_SGD", "USD_MYR", "USD_PHP", "USD_HKD",
];

/// XXX/USD columns and the USD/XXX column that replaces each.
const INVERTED: [(&str, &str); 4] = [
    ("EUR_USD", "USD_EUR"),
    ("GBP_USD", "USD_GBP"),
    ("AUD_USD", "USD_AUD"),
    ("NZD_USD", "USD_NZD"),
];

const WEEK_LOOKBACK: usize = 5;
const MONTH_LOOKBACK: usize = 21;
const RSI_PERIOD: usize = 14;
const VOL_WINDOW: usize = 21;

pub const DASHBOARD_HEADERS: [&str; 9] = [
    "Currency",
    "Current",
    "WoW(%)",
    "MoM(%)",
    "YTD(%)",
    "Deviation from High (%)",
    "MDD(%)",
    "RSI",
    "Vol(%)",
];

/// Every symbol the FX feed requests: spot pairs in sorted order, then the dollar index.
pub fn fx_symbols() -> Vec<&'static str> {
    let mut pairs: Vec<&str> = CORE_SYMBOLS
        .iter()
        .chain(ASIA_SYMBOLS.iter())
        .chain(G10_SYMBOLS.iter())
        .copied()
        .collect();
    pairs.sort_unstable();
    pairs.dedup();
    pairs.push(DXY_SYMBOL);
    pairs
}

pub fn rename_symbol(symbol: &str) -> Option<&'static str> {
    let name = match symbol {
        "AUDUSD=X" => "AUD_USD",
        "CAD=X" => "USD_CAD",
        "CHF=X" => "USD_CHF",
        "CNY=X" => "USD_CNY",
        "EURUSD=X" => "EUR_USD",
        "GBPUSD=X" => "GBP_USD",
        "IDR=X" => "USD_IDR",
        "INR=X" => "USD_INR",
        "JPY=X" => "USD_JPY",
        "KRW=X" => "USD_KRW",
        "MYR=X" => "USD_MYR",
        "NOK=X" => "USD_NOK",
        "NZDUSD=X" => "NZD_USD",
        "PHP=X" => "USD_PHP",
        "SEK=X" => "USD_SEK",
        "SGD=X" => "USD_SGD",
        "THB=X" => "USD_THB",
        "TWD=X" => "USD_TWD",
        "HKD=X" => "USD_HKD",
        "DX-Y.NYB" => "DXY",
        _ => return None,
    };
    Some(name)
}

/// Rename, forward-fill, and invert raw provider closes into the `FX_Data` layout.
pub fn shape_fx_matrix(raw: Series) -> Series {
    let mut series = raw.rename_columns(|c| rename_symbol(c).map(str::to_string).unwrap_or_else(|| c.to_string()));
    series.name = "FX_Data".to_string();
    series.forward_fill();

    for (from, to) in INVERTED {
        let Some(values) = series.column_values(from) else {
            continue;
        };
        let inverted: Vec<f64> = values.iter().map(|v| 1.0 / v).collect();
        series = series.with_column(to, &inverted);
    }

    let keep: Vec<&str> = series
        .columns
        .iter()
        .map(String::as_str)
        .filter(|c| !INVERTED.iter().any(|(from, _)| from == c))
        .collect();
    series.select(&keep)
}

/// Dashboard row for one currency.
#[derive(Debug, Clone, PartialEq)]
pub struct FxMetrics {
    pub currency: String,
    pub current: f64,
    pub wow: f64,
    pub mom: f64,
    pub ytd: f64,
    pub from_high: f64,
    pub mdd: f64,
    pub rsi: f64,
    pub vol: f64,
}

/// Metrics over one column's full history. Leading missing values are NaN.
///
/// YTD is measured within the calendar year of `as_of`.
pub fn currency_metrics(currency: &str, dates: &[NaiveDate], values: &[f64], as_of: NaiveDate) -> FxMetrics {
    let current = values.last().copied().unwrap_or(f64::NAN);
    let high = expanding_max(values).last().copied().unwrap_or(f64::NAN);

    // Momentum is measured on the change of daily returns.
    let returns: Vec<f64> = pct_change(values).into_iter().filter(|v| v.is_finite()).collect();
    let rsi_now = rsi(&returns, RSI_PERIOD).last().copied().unwrap_or(f64::NAN);

    FxMetrics {
        currency: currency.to_string(),
        current: round_to(current, 4),
        wow: round_to(change_over(values, WEEK_LOOKBACK), 2),
        mom: round_to(change_over(values, MONTH_LOOKBACK), 2),
        ytd: round_to(ytd_change(dates, values, as_of.year()), 2),
        from_high: round_to((current / high - 1.0) * 100.0, 2),
        mdd: round_to(max_drawdown(values) * 100.0, 2),
        rsi: round_to(rsi_now, 1),
        vol: round_to(annualized_vol(values, VOL_WINDOW), 2),
    }
}

/// Rows for the currencies in `order` that exist in `series`, in that order.
pub fn dashboard(series: &Series, order: &[&str], as_of: NaiveDate) -> Vec<FxMetrics> {
    let dates = series.dates();
    order
        .iter()
        .filter_map(|currency| {
            let values = series.column_values(currency)?;
            Some(currency_metrics(currency, &dates, &values, as_of))
        })
        .collect()
}

pub fn dashboard_table(rows: &[FxMetrics]) -> Table {
    let mut table = Table::new(DASHBOARD_HEADERS.iter().map(|h| h.to_string()).collect());
    for m in rows {
        table.rows.push(vec![
            Cell::text(m.currency.clone()),
            Cell::number(m.current),
            Cell::number(m.wow),
            Cell::number(m.mom),
            Cell::number(m.ytd),
            Cell::number(m.from_high),
            Cell::number(m.mdd),
            Cell::number(m.rsi),
            Cell::number(m.vol),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn symbols_are_sorted_pairs_then_index() {
        let symbols = fx_symbols();
        assert_eq!(symbols.len(), 20);
        assert_eq!(symbols[0], "AUDUSD=X");
        assert_eq!(*symbols.last().unwrap(), DXY_SYMBOL);
        assert!(symbols.iter().all(|s| rename_symbol(s).is_some()));
    }

    #[test]
    fn shaping_inverts_and_forward_fills() {
        let mut raw = Series::new(
            "raw",
            "Date",
            vec!["EURUSD=X".to_string(), "KRW=X".to_string(), "DX-Y.NYB".to_string()],
        );
        raw.push(d(2024, 1, 2), vec![Some(1.25), Some(1300.0), None]);
        raw.push(d(2024, 1, 3), vec![None, Some(1310.0), Some(102.0)]);

        let shaped = shape_fx_matrix(raw);
        assert_eq!(shaped.name, "FX_Data");
        assert_eq!(shaped.columns, vec!["USD_KRW", "DXY", "USD_EUR"]);
        assert_eq!(shaped.rows[0].values, vec![Some(1300.0), None, Some(0.8)]);
        assert_eq!(shaped.rows[1].values, vec![Some(1310.0), Some(102.0), Some(0.8)]);
    }

    #[test]
    fn metrics_on_short_history_clamp_lookbacks() {
        let dates = [d(2024, 12, 31), d(2025, 1, 2), d(2025, 1, 3)];
        let values = [100.0, 110.0, 99.0];
        let m = currency_metrics("USD_KRW", &dates, &values, d(2025, 1, 3));
        assert_eq!(m.current, 99.0);
        assert_eq!(m.wow, -1.0);
        assert_eq!(m.mom, -1.0);
        assert_eq!(m.ytd, -10.0);
        assert_eq!(m.from_high, -10.0);
        assert_eq!(m.mdd, -10.0);
        assert!(m.rsi.is_nan());
        assert!(m.vol.is_nan());
    }

    #[test]
    fn ytd_follows_the_as_of_year() {
        let dates = [d(2024, 1, 2), d(2024, 12, 31)];
        let values = [100.0, 120.0];
        assert_eq!(currency_metrics("USD_KRW", &dates, &values, d(2024, 12, 31)).ytd, 20.0);
        // New year, no print yet.
        assert_eq!(currency_metrics("USD_KRW", &dates, &values, d(2025, 1, 1)).ytd, 0.0);
    }

    #[test]
    fn dashboard_follows_fixed_order_and_skips_missing() {
        let mut s = Series::new("FX_Data", "Date", vec!["USD_JPY".to_string(), "DXY".to_string()]);
        s.push(d(2024, 1, 2), vec![Some(140.0), Some(101.0)]);
        s.push(d(2024, 1, 3), vec![Some(141.4), Some(102.0)]);

        let rows = dashboard(&s, &G10_ORDER, d(2024, 1, 3));
        let names: Vec<&str> = rows.iter().map(|r| r.currency.as_str()).collect();
        assert_eq!(names, vec!["DXY", "USD_JPY"]);

        let table = dashboard_table(&rows);
        assert_eq!(table.headers.len(), 9);
        assert_eq!(table.rows[1][1], Cell::Number(141.4));
        assert_eq!(table.rows[1][2], Cell::Number(1.0));
        // RSI undefined on two rows
        assert_eq!(table.rows[1][7], Cell::Empty);
    }
}
