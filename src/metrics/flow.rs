//! Foreign net-buying liquidity table (`Kospi_Liquidity`).
//!
//! The persisted sheet holds derived columns for two market views. Only the daily column of
//! each view is raw data; everything else is recomputed over the full history on each run.

use chrono::NaiveDate;

use crate::data::krx::ForeignFlowSource;
use crate::domain::Series;
use crate::math::{cumsum_by_year, rolling_sum, rolling_zscore, zscore};

pub const DAILY: &str = "Foreign Net Buying (Daily)";
pub const YTD: &str = "Foreign Net Buying (YTD Cumulative)";
pub const RECENT_20: &str = "Foreign Net Buying (Recent 20 Trading Days Cumulative)";
pub const Z_HISTORICAL: &str = "Daily Net Buying Z-score (Historical)";
pub const Z_RECENT_60: &str = "Recent 20 Trading Days Cumulative Z-score (60D)";

const RECENT_WINDOW: usize = 20;
const ZSCORE_WINDOW: usize = 60;

/// The raw market views and the suffix their derived columns carry.
pub const VIEWS: [(&str, &str); 2] = [
    (ForeignFlowSource::KOSPI, " [KOSPI]"),
    (ForeignFlowSource::BOTH, " [KOSPI+KOSDAQ]"),
];

/// The five derived columns for one view, computed over the dates where the view has data.
///
/// Output vectors are aligned with `dates`; dates without data are NaN in every column.
pub fn flow_columns(dates: &[NaiveDate], daily: &[f64]) -> Vec<(&'static str, Vec<f64>)> {
    let present: Vec<usize> = (0..daily.len()).filter(|&i| daily[i].is_finite()).collect();
    let own_dates: Vec<NaiveDate> = present.iter().map(|&i| dates[i]).collect();
    let own: Vec<f64> = present.iter().map(|&i| daily[i]).collect();

    let recent = rolling_sum(&own, RECENT_WINDOW);
    let computed = [
        (DAILY, own.clone()),
        (YTD, cumsum_by_year(&own_dates, &own)),
        (Z_HISTORICAL, zscore(&own)),
        (Z_RECENT_60, rolling_zscore(&recent, ZSCORE_WINDOW)),
        (RECENT_20, recent),
    ];

    let order = [DAILY, YTD, RECENT_20, Z_HISTORICAL, Z_RECENT_60];
    order
        .iter()
        .map(|name| {
            let mut full = vec![f64::NAN; daily.len()];
            if let Some((_, values)) = computed.iter().find(|(n, _)| n == name) {
                for (k, &i) in present.iter().enumerate() {
                    full[i] = values[k];
                }
            }
            (*name, full)
        })
        .collect()
}

/// Expand raw `KOSPI` / `KOSPI+KOSDAQ` daily flows into the full liquidity table.
pub fn flow_table(raw: &Series) -> Series {
    let dates = raw.dates();
    let mut out = Series::new("Kospi_Liquidity", raw.date_label.clone(), Vec::new());
    for date in &dates {
        out.push(*date, Vec::new());
    }
    for (view, suffix) in VIEWS {
        let Some(daily) = raw.column_values(view) else {
            continue;
        };
        for (name, values) in flow_columns(&dates, &daily) {
            out = out.with_column(format!("{name}{suffix}"), &values);
        }
    }
    out
}

/// Recover the raw daily flows from a persisted liquidity table.
pub fn raw_from_table(persisted: &Series) -> Series {
    let mut raw = ForeignFlowSource::empty_series();
    raw.date_label = persisted.date_label.clone();
    let daily_columns: Vec<String> = VIEWS
        .iter()
        .map(|(_, suffix)| format!("{DAILY}{suffix}"))
        .collect();
    let names: Vec<&str> = daily_columns.iter().map(String::as_str).collect();
    let mut selected = persisted.select(&names);
    selected.columns = raw.columns.clone();
    raw.rows = selected.rows;
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn raw_with(days: usize) -> Series {
        let mut raw = ForeignFlowSource::empty_series();
        let mut date = d(2024, 1, 1);
        for i in 0..days {
            let v = if i % 2 == 0 { 10.0 } else { -4.0 };
            raw.push(date, vec![Some(v), Some(v * 2.0)]);
            date = date.succ_opt().unwrap();
        }
        raw
    }

    #[test]
    fn table_has_suffixed_columns_per_view() {
        let table = flow_table(&raw_with(3));
        assert_eq!(table.columns.len(), 10);
        assert_eq!(table.columns[0], "Foreign Net Buying (Daily) [KOSPI]");
        assert_eq!(table.columns[5], "Foreign Net Buying (Daily) [KOSPI+KOSDAQ]");
        assert_eq!(
            table.column_values("Foreign Net Buying (YTD Cumulative) [KOSPI]").unwrap(),
            vec![10.0, 6.0, 16.0]
        );
    }

    #[test]
    fn ytd_resets_at_year_boundary() {
        let dates = [d(2023, 12, 28), d(2023, 12, 29), d(2024, 1, 2)];
        let cols = flow_columns(&dates, &[5.0, 5.0, 1.0]);
        let ytd = &cols.iter().find(|(n, _)| *n == YTD).unwrap().1;
        assert_eq!(ytd, &vec![5.0, 10.0, 1.0]);
    }

    #[test]
    fn rolling_windows_require_full_history() {
        let dates = raw_with(79).dates();
        let daily: Vec<f64> = (0..79).map(|i| (i * i % 17) as f64 - 8.0).collect();
        let cols = flow_columns(&dates, &daily);
        let recent = &cols.iter().find(|(n, _)| *n == RECENT_20).unwrap().1;
        assert!(recent[18].is_nan());
        assert!(recent[19].is_finite());

        // First full 60-window of 20-day sums ends at row 19 + 59.
        let z60 = &cols.iter().find(|(n, _)| *n == Z_RECENT_60).unwrap().1;
        assert!(z60[77].is_nan());
        assert!(z60[78].is_finite());
    }

    #[test]
    fn missing_days_are_excluded_from_view_history() {
        let dates = [d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4)];
        let cols = flow_columns(&dates, &[1.0, f64::NAN, 3.0]);
        let ytd = &cols.iter().find(|(n, _)| *n == YTD).unwrap().1;
        assert_eq!(ytd[0], 1.0);
        assert!(ytd[1].is_nan());
        assert_eq!(ytd[2], 4.0);
    }

    #[test]
    fn constant_flows_have_no_zscore() {
        let dates = raw_with(80).dates();
        let cols = flow_columns(&dates, &[0.1; 80]);
        let z = &cols.iter().find(|(n, _)| *n == Z_HISTORICAL).unwrap().1;
        assert!(z.iter().all(|v| v.is_nan()));
        let z60 = &cols.iter().find(|(n, _)| *n == Z_RECENT_60).unwrap().1;
        assert!(z60.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn raw_round_trips_through_table() {
        let raw = raw_with(4);
        assert_eq!(raw_from_table(&flow_table(&raw)), raw);
    }
}
