//! Cell tables: the shape of one workbook sheet.
//!
//! A sheet is a header row followed by data rows. Series are written as
//! `date_label, columns...`; dashboards mix text and numbers.

use chrono::NaiveDate;

use crate::domain::Series;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Numbers that are not finite cannot be stored in a sheet; they become empty cells.
    pub fn number(v: f64) -> Self {
        if v.is_finite() { Cell::Number(v) } else { Cell::Empty }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Text(s) => parse_number(s),
            Cell::Empty => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(v) => format!("{v}"),
            Cell::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Read the table back as a series: the first column is the date, the rest are numeric.
    ///
    /// Rows whose date cell does not parse are skipped. Numeric date cells are treated as
    /// spreadsheet serial dates.
    pub fn to_series(&self, name: impl Into<String>) -> Series {
        let date_label = self.headers.first().cloned().unwrap_or_else(|| "Date".to_string());
        let columns = self.headers.iter().skip(1).cloned().collect();
        let mut series = Series::new(name, date_label, columns);
        for row in &self.rows {
            let date = match row.first() {
                Some(Cell::Text(s)) => parse_date(s),
                Some(Cell::Number(v)) => excel_serial_date(*v),
                _ => None,
            };
            let Some(date) = date else {
                continue;
            };
            let values = row.iter().skip(1).map(Cell::as_number).collect();
            series.push(date, values);
        }
        series
    }
}

impl From<&Series> for Table {
    fn from(series: &Series) -> Self {
        let mut headers = Vec::with_capacity(series.columns.len() + 1);
        headers.push(series.date_label.clone());
        headers.extend(series.columns.iter().cloned());

        let rows = series
            .rows
            .iter()
            .map(|row| {
                let mut cells = Vec::with_capacity(row.values.len() + 1);
                cells.push(Cell::Text(row.date.format(DATE_FORMAT).to_string()));
                cells.extend(row.values.iter().map(|v| v.map(Cell::number).unwrap_or(Cell::Empty)));
                cells
            })
            .collect();

        Table { headers, rows }
    }
}

/// Parse a numeric cell the way exported tables write them: thousands separators are
/// dropped and a typographic minus (U+2212) is read as `-`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',')
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a date cell. Accepts ISO dates (optionally followed by a time), `YYYY/MM/DD`,
/// `YYYY.MM.DD`, `YYYYMMDD`, and two-digit-year `YY/MM/DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let head = s.split([' ', 'T']).next().unwrap_or(s);

    if head.len() == 8 && head.bytes().all(|b| b.is_ascii_digit()) {
        return ymd(&head[0..4], &head[4..6], &head[6..8]);
    }

    let parts: Vec<&str> = head.split(['-', '/', '.']).collect();
    let [y, m, d] = parts.as_slice() else {
        return None;
    };
    match y.len() {
        4 => ymd(y, m, d),
        // Two-digit years are 2000-2099.
        2 => {
            let year: i32 = y.parse().ok()?;
            NaiveDate::from_ymd_opt(2000 + year, m.parse().ok()?, d.parse().ok()?)
        }
        _ => None,
    }
}

/// Spreadsheet serial day number (1900 date system, day 0 = 1899-12-30) to a date.
pub fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(chrono::Days::new(serial.floor() as u64))
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_handles_separators_and_minus_sign() {
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("\u{2212}3.25"), Some(-3.25));
        assert_eq!(parse_number(" -"), None);
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn parse_date_formats() {
        let want = NaiveDate::from_ymd_opt(2025, 7, 22).unwrap();
        assert_eq!(parse_date("2025-07-22"), Some(want));
        assert_eq!(parse_date("2025-07-22 00:00:00"), Some(want));
        assert_eq!(parse_date("2025.07.22"), Some(want));
        assert_eq!(parse_date("20250722"), Some(want));
        assert_eq!(parse_date("25/07/22"), Some(want));
        assert_eq!(parse_date("2025/07/22"), Some(want));
        assert_eq!(parse_date("July"), None);
    }

    #[test]
    fn serial_dates() {
        assert_eq!(excel_serial_date(45000.0), NaiveDate::from_ymd_opt(2023, 3, 15));
        assert_eq!(excel_serial_date(45000.75), NaiveDate::from_ymd_opt(2023, 3, 15));
        assert_eq!(excel_serial_date(0.0), None);
    }

    #[test]
    fn table_to_series_skips_undated_rows() {
        let mut t = Table::new(vec!["전송일".to_string(), "1Y".to_string(), "2Y".to_string()]);
        t.rows.push(vec![Cell::text("25/07/22"), Cell::Number(2.5), Cell::text("2.61")]);
        t.rows.push(vec![Cell::text("평균"), Cell::Number(2.4), Cell::Number(2.5)]);
        t.rows.push(vec![Cell::Number(45000.0), Cell::Empty]);
        let s = t.to_series("IRS");
        assert_eq!(s.date_label, "전송일");
        assert_eq!(s.columns, vec!["1Y", "2Y"]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.rows[0].values, vec![Some(2.5), Some(2.61)]);
        assert_eq!(s.rows[1].date, NaiveDate::from_ymd_opt(2023, 3, 15).unwrap());
        assert_eq!(s.rows[1].values, vec![None, None]);
    }

    #[test]
    fn table_from_series_writes_iso_dates() {
        let mut s = Series::new("t", "Date", vec!["x".to_string()]);
        s.push(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), vec![None]);
        let t = Table::from(&s);
        assert_eq!(t.headers, vec!["Date", "x"]);
        assert_eq!(t.rows[0], vec![Cell::text("2024-02-01"), Cell::Empty]);
    }
}
