//! KMB derivative rate tables (IRS and CRS curves by date).
//!
//! The site serves each table as a spreadsheet download. Older exports are HTML tables
//! saved with an `.xls` name, so both shapes are accepted.

use chrono::NaiveDate;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::data::{SeriesSource, SourceError, check_status};
use crate::domain::{Cell, Series, Table};
use crate::io::workbook::first_sheet_from_bytes;

pub const DEFAULT_URL: &str = "https://www.kmbco.com/kor/rate/deri_rate.do";
/// Header of the date column in both tables ("transmission date").
pub const DATE_LABEL: &str = "전송일";

const PROVIDER: &str = "KMB";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateKind {
    Irs,
    Crs,
}

impl RateKind {
    pub const ALL: [RateKind; 2] = [RateKind::Irs, RateKind::Crs];

    pub fn label(self) -> &'static str {
        match self {
            RateKind::Irs => "IRS",
            RateKind::Crs => "CRS",
        }
    }

    /// Destination sheet; the same as the label.
    pub fn sheet(self) -> &'static str {
        self.label()
    }

    pub fn empty_series(self) -> Series {
        Series::new(self.sheet(), DATE_LABEL, Vec::new())
    }
}

/// The full history download for one table.
pub trait RateTableSource {
    fn fetch_table(&self, kind: RateKind) -> Result<Vec<u8>, SourceError>;
}

pub struct KmbClient {
    client: Client,
    url: String,
}

impl KmbClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl RateTableSource for KmbClient {
    fn fetch_table(&self, kind: RateKind) -> Result<Vec<u8>, SourceError> {
        debug!(kind = kind.label(), "downloading rate table");
        // The site serves this download from an IRS/CRS tab switch and an Excel button. The
        // `rateType`/`excel` parameters mirror those controls and are the first thing to check
        // when the download starts coming back empty or as an HTML page without a table.
        let resp = self
            .client
            .get(&self.url)
            .query(&[("rateType", kind.label()), ("excel", "Y")])
            .send()?;
        let resp = check_status(PROVIDER, resp)?;
        Ok(resp.bytes()?.to_vec())
    }
}

/// Parse a downloaded table into a series named after the destination sheet.
///
/// The first column is the date (`YY/MM/DD`, ISO, or a serial date); every other column is a
/// numeric tenor. Rows without a readable date are dropped.
pub fn parse_rate_table(kind: RateKind, bytes: Vec<u8>) -> Result<Series, SourceError> {
    let table = if looks_like_html(&bytes) {
        html_table(&String::from_utf8_lossy(&bytes))?
    } else {
        first_sheet_from_bytes(bytes).map_err(|e| SourceError::parse(PROVIDER, e))?
    };
    if table.headers.is_empty() {
        return Err(SourceError::parse(PROVIDER, format!("{} table has no header row", kind.label())));
    }
    Ok(table.to_series(kind.sheet()))
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let text = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    text.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}

fn html_table(html: &str) -> Result<Table, SourceError> {
    let selector =
        |css: &str| Selector::parse(css).map_err(|e| SourceError::parse(PROVIDER, format!("selector '{css}': {e}")));
    let table_sel = selector("table")?;
    let tr_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    let document = Html::parse_document(html);
    let Some(table) = document.select(&table_sel).next() else {
        return Err(SourceError::parse(PROVIDER, "download contains no table"));
    };

    let mut rows = table.select(&tr_sel);
    let headers = rows
        .next()
        .map(|tr| tr.select(&cell_sel).map(text_of).collect())
        .unwrap_or_default();
    let mut out = Table::new(headers);
    for tr in rows {
        let cells: Vec<Cell> = tr
            .select(&cell_sel)
            .map(|c| {
                let text = text_of(c);
                if text.is_empty() { Cell::Empty } else { Cell::Text(text) }
            })
            .collect();
        if !cells.is_empty() {
            out.rows.push(cells);
        }
    }
    Ok(out)
}

fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// One rate table restricted to the requested range.
///
/// The provider has no range query, so every fetch downloads the full history.
pub struct KmbSource<'a> {
    tables: &'a dyn RateTableSource,
    kind: RateKind,
}

impl<'a> KmbSource<'a> {
    pub fn new(tables: &'a dyn RateTableSource, kind: RateKind) -> Self {
        Self { tables, kind }
    }
}

impl SeriesSource for KmbSource<'_> {
    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<Series, SourceError> {
        let bytes = self.tables.fetch_table(self.kind)?;
        let full = parse_rate_table(self.kind, bytes)?;
        debug!(kind = self.kind.label(), rows = full.len(), "parsed rate table");
        Ok(full.filter_range(start, end))
    }
}
