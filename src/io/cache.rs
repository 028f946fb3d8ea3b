//! Local CSV cache of a series.
//!
//! Layout: a header row `date,<columns...>`, then one row per date with ISO dates and empty
//! cells for missing values. The file is read and rewritten in full on every run.

use std::fs::File;
use std::path::Path;

use tracing::{debug, warn};

use crate::domain::{DATE_FORMAT, Series, parse_date, parse_number};
use crate::error::AppError;

/// Load a cached series. A missing file is an empty series built from `empty`.
///
/// Rows whose date does not parse are skipped with a warning.
pub fn read_cache(path: &Path, empty: Series) -> Result<Series, AppError> {
    if !path.exists() {
        debug!(path = %path.display(), "no cache file yet");
        return Ok(empty);
    }
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open cache '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::config(format!("Failed to read cache header: {e}")))?
        .clone();
    // Spreadsheet tools write a BOM in front of the first header.
    let names: Vec<String> = headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    let Some((date_label, columns)) = names.split_first() else {
        return Ok(empty);
    };

    let mut series = Series::new(empty.name.clone(), date_label.clone(), columns.to_vec());
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(line, error = %e, "skipping unreadable cache row");
                continue;
            }
        };
        let Some(date) = record.get(0).and_then(parse_date) else {
            warn!(line, "skipping cache row without a valid date");
            continue;
        };
        let values = (1..=columns.len())
            .map(|i| record.get(i).and_then(parse_number))
            .collect();
        series.push(date, values);
    }
    debug!(path = %path.display(), rows = series.len(), "loaded cache");
    Ok(series)
}

pub fn write_cache(path: &Path, series: &Series) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::config(format!("Failed to create cache '{}': {e}", path.display())))?;

    let mut header = Vec::with_capacity(series.columns.len() + 1);
    header.push(series.date_label.as_str());
    header.extend(series.columns.iter().map(String::as_str));
    writer
        .write_record(&header)
        .map_err(|e| AppError::config(format!("Failed to write cache header: {e}")))?;

    for row in &series.rows {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.date.format(DATE_FORMAT).to_string());
        record.extend(row.values.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
        writer
            .write_record(&record)
            .map_err(|e| AppError::config(format!("Failed to write cache row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::config(format!("Failed to flush cache '{}': {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn empty() -> Series {
        Series::new("Swap_Point", "date", vec!["1M".to_string(), "2M".to_string()])
    }

    #[test]
    fn round_trip_preserves_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fx_swap_mid.csv");

        let mut s = empty();
        s.push(d(2024, 3, 4), vec![Some(-1.5), None]);
        s.push(d(2024, 3, 5), vec![None, Some(-2.25)]);
        write_cache(&path, &s).unwrap();

        let back = read_cache(&path, empty()).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn missing_file_is_empty_series() {
        let dir = tempfile::tempdir().unwrap();
        let back = read_cache(&dir.path().join("nope.csv"), empty()).unwrap();
        assert!(back.is_empty());
        assert_eq!(back.columns, vec!["1M", "2M"]);
    }

    #[test]
    fn tolerates_bom_and_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.csv");
        let mut f = File::create(&path).unwrap();
        write!(f, "\u{feff}date,Side,1M\n2024-03-04,mid,-1.5\nnot-a-date,mid,1\n2024-03-05,mid\n").unwrap();
        drop(f);

        let back = read_cache(&path, empty()).unwrap();
        assert_eq!(back.date_label, "date");
        assert_eq!(back.columns, vec!["Side", "1M"]);
        assert_eq!(back.dates(), vec![d(2024, 3, 4), d(2024, 3, 5)]);
        assert_eq!(back.rows[0].values, vec![None, Some(-1.5)]);
        assert_eq!(back.rows[1].values, vec![None, None]);
    }
}
