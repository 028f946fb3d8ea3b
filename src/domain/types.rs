//! Shared domain types.
//!
//! A `Series` is the one recurring entity: date-keyed rows of named numeric columns. Cells
//! that could not be observed or parsed are `None`; derived statistics computed from a
//! series use `f64::NAN` instead.

use std::collections::HashMap;

use chrono::NaiveDate;

/// One dated row of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

impl Observation {
    pub fn new(date: NaiveDate, values: Vec<Option<f64>>) -> Self {
        Self { date, values }
    }
}

/// A time-indexed numeric series.
///
/// Rows are expected to be unique by date and ascending once they have gone through
/// `series::merge_series`; sources may hand back rows in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Logical name, used in log lines and summaries.
    pub name: String,
    /// Header of the date column when the series is written out.
    pub date_label: String,
    pub columns: Vec<String>,
    pub rows: Vec<Observation>,
}

impl Series {
    pub fn new(name: impl Into<String>, date_label: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            date_label: date_label.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// A series with the same name, date label, and columns, but no rows.
    pub fn empty_like(&self) -> Self {
        Self::new(self.name.clone(), self.date_label.clone(), self.columns.clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).min()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).max()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column with missing cells mapped to NaN.
    pub fn column_values(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.values.get(idx).copied().flatten().unwrap_or(f64::NAN))
                .collect(),
        )
    }

    /// Append a row, padding or truncating its values to the column count.
    pub fn push(&mut self, date: NaiveDate, mut values: Vec<Option<f64>>) {
        values.resize(self.columns.len(), None);
        self.rows.push(Observation::new(date, values));
    }

    /// Replace missing cells with the previous row's value in the same column.
    ///
    /// Cells before a column's first observation stay missing.
    pub fn forward_fill(&mut self) {
        let mut last: Vec<Option<f64>> = vec![None; self.columns.len()];
        for row in &mut self.rows {
            for (idx, cell) in row.values.iter_mut().enumerate() {
                match cell {
                    Some(v) if v.is_finite() => last[idx] = Some(*v),
                    _ => *cell = last[idx],
                }
            }
        }
    }

    /// Rows with `start <= date <= end`.
    pub fn filter_range(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let mut out = self.empty_like();
        out.rows = self
            .rows
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .cloned()
            .collect();
        out
    }

    /// The last `n` rows.
    pub fn tail(&self, n: usize) -> Self {
        let mut out = self.empty_like();
        let skip = self.rows.len().saturating_sub(n);
        out.rows = self.rows[skip..].to_vec();
        out
    }

    /// Append a derived column. Non-finite values become missing cells.
    pub fn with_column(mut self, name: impl Into<String>, values: &[f64]) -> Self {
        self.columns.push(name.into());
        for (idx, row) in self.rows.iter_mut().enumerate() {
            let v = values.get(idx).copied().filter(|v| v.is_finite());
            row.values.push(v);
        }
        self
    }

    /// Keep only the named columns, in the given order. Unknown names become missing columns.
    pub fn select(&self, columns: &[&str]) -> Self {
        let indices: Vec<Option<usize>> = columns.iter().map(|c| self.column_index(c)).collect();
        let mut out = Self::new(
            self.name.clone(),
            self.date_label.clone(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        for row in &self.rows {
            let values = indices
                .iter()
                .map(|idx| idx.and_then(|i| row.values.get(i).copied().flatten()))
                .collect();
            out.rows.push(Observation::new(row.date, values));
        }
        out
    }

    /// Earliest date whose cell in `column` is missing. `None` when the column is complete
    /// or does not exist.
    pub fn first_missing(&self, column: &str) -> Option<NaiveDate> {
        let idx = self.column_index(column)?;
        self.rows
            .iter()
            .filter(|r| r.values.get(idx).copied().flatten().is_none())
            .map(|r| r.date)
            .min()
    }

    /// Fill missing cells from `other`'s row on the same date, matching columns by name.
    pub fn fill_missing_from(&mut self, other: &Series) {
        let mapping: Vec<Option<usize>> = self.columns.iter().map(|c| other.column_index(c)).collect();
        let by_date: HashMap<NaiveDate, &Observation> = other.rows.iter().map(|r| (r.date, r)).collect();
        for row in &mut self.rows {
            let Some(source) = by_date.get(&row.date) else {
                continue;
            };
            for (cell, src) in row.values.iter_mut().zip(&mapping) {
                if cell.is_none() {
                    *cell = src.and_then(|i| source.values.get(i).copied().flatten());
                }
            }
        }
    }

    /// Rename columns through `f`, keeping order.
    pub fn rename_columns(mut self, f: impl Fn(&str) -> String) -> Self {
        self.columns = self.columns.iter().map(|c| f(c)).collect();
        self
    }
}
