//! Merge a persisted series with freshly fetched rows.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::{Observation, Series};

/// Concatenate `persisted` and `fetched`, keep the last-seen row per date, sort ascending.
///
/// Fetched rows are re-mapped onto the persisted column order by name. Columns that only
/// the fetched side has are appended; cells absent on either side are missing. Running this
/// again on its own output with the same `fetched` rows returns the same series.
pub fn merge_series(persisted: &Series, fetched: &Series) -> Series {
    let mut columns = persisted.columns.clone();
    for c in &fetched.columns {
        if !columns.contains(c) {
            columns.push(c.clone());
        }
    }

    let mut merged = Series::new(persisted.name.clone(), persisted.date_label.clone(), columns);
    if persisted.columns.is_empty() && persisted.is_empty() {
        merged.name = fetched.name.clone();
        merged.date_label = fetched.date_label.clone();
    }

    let mut by_date: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    for side in [persisted, fetched] {
        let mapping: Vec<usize> = side
            .columns
            .iter()
            .filter_map(|c| merged.column_index(c))
            .collect();
        for row in &side.rows {
            let mut values = vec![None; merged.columns.len()];
            for (src, &dst) in mapping.iter().enumerate() {
                values[dst] = row.values.get(src).copied().flatten();
            }
            // Later rows overwrite earlier ones: within `fetched`, and fetched over persisted.
            by_date.insert(row.date, values);
        }
    }

    merged.rows = by_date
        .into_iter()
        .map(|(date, values)| Observation::new(date, values))
        .collect();
    merged
}

/// Deduplicate one series by date (last wins) and sort it ascending.
pub fn normalize(series: &Series) -> Series {
    merge_series(&series.empty_like(), series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn one_col(rows: &[(NaiveDate, f64)]) -> Series {
        let mut s = Series::new("s", "date", vec!["v".to_string()]);
        for (date, v) in rows {
            s.push(*date, vec![Some(*v)]);
        }
        s
    }

    #[test]
    fn duplicate_fetched_date_keeps_later_value() {
        let persisted = one_col(&[(d(2024, 1, 31), 1.0)]);
        let fetched = one_col(&[(d(2024, 2, 1), 10.0), (d(2024, 2, 1), 11.0)]);
        let merged = merge_series(&persisted, &fetched);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.rows[1].date, d(2024, 2, 1));
        assert_eq!(merged.rows[1].values, vec![Some(11.0)]);
    }

    #[test]
    fn fetched_overrides_persisted_and_sorts() {
        let persisted = one_col(&[(d(2024, 1, 3), 3.0), (d(2024, 1, 2), 2.0)]);
        let fetched = one_col(&[(d(2024, 1, 3), 30.0), (d(2024, 1, 1), 1.0)]);
        let merged = merge_series(&persisted, &fetched);
        assert_eq!(merged.dates(), vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);
        assert_eq!(merged.rows[2].values, vec![Some(30.0)]);
    }

    #[test]
    fn columns_are_aligned_by_name() {
        let mut persisted = Series::new("s", "date", vec!["a".to_string(), "b".to_string()]);
        persisted.push(d(2024, 1, 2), vec![Some(1.0), Some(2.0)]);
        let mut fetched = Series::new("s", "date", vec!["b".to_string(), "c".to_string()]);
        fetched.push(d(2024, 1, 3), vec![Some(20.0), Some(30.0)]);

        let merged = merge_series(&persisted, &fetched);
        assert_eq!(merged.columns, vec!["a", "b", "c"]);
        assert_eq!(merged.rows[0].values, vec![Some(1.0), Some(2.0), None]);
        assert_eq!(merged.rows[1].values, vec![None, Some(20.0), Some(30.0)]);
    }

    #[test]
    fn empty_persisted_takes_fetched_labels() {
        let persisted = Series::new("", "", Vec::new());
        let mut fetched = Series::new("Kospi", "날짜", vec!["Close".to_string()]);
        fetched.push(d(2024, 1, 2), vec![Some(2600.0)]);
        let merged = merge_series(&persisted, &fetched);
        assert_eq!(merged.name, "Kospi");
        assert_eq!(merged.date_label, "날짜");
    }

    proptest! {
        #[test]
        fn merged_dates_strictly_ascending_and_idempotent(
            a in prop::collection::vec((0i64..60, -1e6f64..1e6), 0..40),
            b in prop::collection::vec((0i64..60, -1e6f64..1e6), 0..40),
        ) {
            let base = d(2024, 1, 1);
            let to_series = |rows: &[(i64, f64)]| {
                let mut s = Series::new("s", "date", vec!["v".to_string()]);
                for (off, v) in rows {
                    s.push(base + chrono::Duration::days(*off), vec![Some(*v)]);
                }
                s
            };
            let persisted = to_series(&a);
            let fetched = to_series(&b);

            let once = merge_series(&persisted, &fetched);
            let dates = once.dates();
            prop_assert!(dates.windows(2).all(|w| w[0] < w[1]));

            let twice = merge_series(&once, &fetched);
            prop_assert_eq!(once, twice);
        }
    }
}
