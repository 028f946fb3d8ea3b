//! SMBS F/X swap point page.
//!
//! One page request per trading date. The quote table is found by its caption; each data
//! cell hides its text in an obfuscated inline script (see `data::decode`).

use chrono::NaiveDate;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::data::decode::{decode_obfuscated, script_payload};
use crate::data::{DecodeError, Pacing, SeriesSource, SourceError, check_status};
use crate::domain::calendar::business_days;
use crate::domain::{Series, parse_number};
use crate::metrics::swap::mid_series;

pub const DEFAULT_URL: &str = "http://www.smbs.biz/Exchange/FxSwapUS.jsp";
pub const TABLE_CAPTION: &str = "F/X Swap POINT 결과 표";
/// Quote columns after the side label, in page order.
pub const TENORS: [&str; 5] = ["1M", "2M", "3M", "6M", "1Y"];

const PROVIDER: &str = "SMBS";

/// Raw HTML of the swap point page as of one trading date.
pub trait PageSource {
    fn fetch_page(&self, date: NaiveDate) -> Result<String, SourceError>;
}

pub struct SmbsClient {
    client: Client,
    url: String,
}

impl SmbsClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl PageSource for SmbsClient {
    fn fetch_page(&self, date: NaiveDate) -> Result<String, SourceError> {
        let search_date = date.format("%Y%m%d").to_string();
        let resp = self
            .client
            .post(&self.url)
            .form(&[("searchDate", search_date.as_str())])
            .send()?;
        let resp = check_status(PROVIDER, resp)?;
        Ok(resp.text()?)
    }
}

/// One bid or offer row of the quote table.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuote {
    pub date: NaiveDate,
    pub side: String,
    /// One value per entry of `TENORS`; non-numeric cells are `None`.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwapPage {
    pub headers: Vec<String>,
    pub quotes: Vec<SwapQuote>,
    /// Rows dropped because a cell did not decode.
    pub rejected: usize,
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::parse(PROVIDER, format!("selector '{css}': {e}")))
}

/// Extract the quote table from one page.
///
/// A page without the captioned table (or without a body) yields an empty `SwapPage`; this
/// is how the site answers for dates it has no quotes for.
pub fn parse_swap_page(html: &str, date: NaiveDate) -> Result<SwapPage, SourceError> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let caption_sel = selector("caption")?;
    let head_cell_sel = selector("thead th")?;
    let tr_sel = selector("tr")?;
    let first_row_cell_sel = selector("th, td")?;
    let body_row_sel = selector("tbody tr")?;
    let td_sel = selector("td")?;

    let Some(table) = document.select(&table_sel).find(|t| {
        t.select(&caption_sel)
            .next()
            .is_some_and(|c| joined_text(c).contains(TABLE_CAPTION))
    }) else {
        debug!(%date, "swap table caption not found");
        return Ok(SwapPage::default());
    };

    let mut head_cells: Vec<ElementRef> = table.select(&head_cell_sel).collect();
    if head_cells.is_empty() {
        if let Some(first) = table.select(&tr_sel).next() {
            head_cells = first.select(&first_row_cell_sel).collect();
        }
    }
    let headers = head_cells
        .into_iter()
        .map(|c| cell_text(c).unwrap_or_default())
        .collect();

    let mut page = SwapPage {
        headers,
        ..SwapPage::default()
    };
    for tr in table.select(&body_row_sel) {
        let cells: Vec<ElementRef> = tr.select(&td_sel).collect();
        if cells.is_empty() {
            continue;
        }
        match parse_row(&cells, date) {
            Ok(quote) => page.quotes.push(quote),
            Err(e) => {
                warn!(%date, error = %e, "dropping swap row with undecodable cell");
                page.rejected += 1;
            }
        }
    }
    Ok(page)
}

fn parse_row(cells: &[ElementRef], date: NaiveDate) -> Result<SwapQuote, DecodeError> {
    let texts = cells
        .iter()
        .map(|c| cell_text(*c))
        .collect::<Result<Vec<_>, _>>()?;
    let side = texts.first().cloned().unwrap_or_default();
    let values = (0..TENORS.len())
        .map(|i| texts.get(i + 1).and_then(|t| parse_number(t)))
        .collect();
    Ok(SwapQuote { date, side, values })
}

/// Visible text of one cell, decoding an inline script payload when present.
fn cell_text(cell: ElementRef) -> Result<String, DecodeError> {
    let script = cell
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "script");
    if let Some(script) = script {
        let body: String = script.text().collect();
        if !body.trim().is_empty() {
            return match script_payload(&body) {
                Some(payload) => decode_obfuscated(payload),
                None => decode_obfuscated(&joined_text(script)),
            };
        }
    }
    Ok(joined_text(cell))
}

/// Text nodes trimmed and joined by single spaces, skipping blanks.
fn joined_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mid swap points per business day, scraped one page at a time.
pub struct SwapPointSource<'a> {
    pages: &'a dyn PageSource,
    pacing: Pacing,
}

impl<'a> SwapPointSource<'a> {
    pub fn new(pages: &'a dyn PageSource, pacing: Pacing) -> Self {
        Self { pages, pacing }
    }

    /// Every quote row between `start` and `end`. Dates that fail to load are skipped.
    pub fn fetch_quotes(&self, start: NaiveDate, end: NaiveDate) -> Vec<SwapQuote> {
        let days = business_days(start, end);
        let mut quotes = Vec::new();
        for (i, day) in days.iter().enumerate() {
            if i > 0 {
                self.pacing.pause();
            }
            let html = match self.pages.fetch_page(*day) {
                Ok(html) => html,
                Err(e) => {
                    warn!(date = %day, error = %e, "swap page unavailable, skipping");
                    continue;
                }
            };
            match parse_swap_page(&html, *day) {
                Ok(page) => {
                    debug!(date = %day, rows = page.quotes.len(), rejected = page.rejected, "parsed swap page");
                    quotes.extend(page.quotes);
                }
                Err(e) => warn!(date = %day, error = %e, "swap page did not parse, skipping"),
            }
        }
        info!(days = days.len(), rows = quotes.len(), "swap pages scraped");
        quotes
    }
}

impl SeriesSource for SwapPointSource<'_> {
    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<Series, SourceError> {
        Ok(mid_series(&self.fetch_quotes(start, end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn obf(payload: &str) -> String {
        format!("<td><script>d1('{payload}');</script></td>")
    }

    fn page(rows: &str) -> String {
        format!(
            r#"<html><body>
            <table><caption>환율 조회 결과 표</caption><tbody><tr><td>Bid</td><td>9.99</td></tr></tbody></table>
            <table>
              <caption>F/X Swap POINT 결과 표</caption>
              <thead><tr><th>구분</th><th>1M</th><th>2M</th><th>3M</th><th>6M</th><th>1Y</th></tr></thead>
              <tbody>{rows}</tbody>
            </table>
            </body></html>"#
        )
    }

    #[test]
    fn finds_captioned_table_and_decodes_cells() {
        let rows = format!(
            "<tr><td>Bid</td>{}{}<td>-3.10</td><td>1,234.5</td><td></td></tr>\
             <tr>{}<td>-1.00</td><td>-2.00</td><td>-3.00</td><td>-6.00</td><td>-12.00</td></tr>",
            obf("%_Q2D%_Z31%2E%u_K35"),
            obf("-2.1"),
            obf("Offer"),
        );
        let out = parse_swap_page(&page(&rows), d(2024, 3, 4)).unwrap();
        assert_eq!(out.headers, vec!["구분", "1M", "2M", "3M", "6M", "1Y"]);
        assert_eq!(out.rejected, 0);
        assert_eq!(out.quotes.len(), 2);
        assert_eq!(out.quotes[0].side, "Bid");
        assert_eq!(
            out.quotes[0].values,
            vec![Some(-1.5), Some(-2.1), Some(-3.1), Some(1234.5), None]
        );
        assert_eq!(out.quotes[1].side, "Offer");
        assert_eq!(out.quotes[1].values[4], Some(-12.0));
    }

    #[test]
    fn undecodable_cell_rejects_only_its_row() {
        let rows = format!(
            "<tr><td>Bid</td>{}<td>1</td><td>1</td><td>1</td><td>1</td></tr>\
             <tr><td>Offer</td><td>2</td><td>2</td><td>2</td><td>2</td><td>2</td></tr>",
            obf("%uD800")
        );
        let out = parse_swap_page(&page(&rows), d(2024, 3, 4)).unwrap();
        assert_eq!(out.rejected, 1);
        assert_eq!(out.quotes.len(), 1);
        assert_eq!(out.quotes[0].side, "Offer");
    }

    #[test]
    fn missing_table_is_empty_not_error() {
        let html = "<html><body><table><caption>other</caption></table></body></html>";
        let out = parse_swap_page(html, d(2024, 3, 4)).unwrap();
        assert!(out.quotes.is_empty());
    }

    #[test]
    fn typographic_minus_parses() {
        let rows = "<tr><td>Bid</td><td>\u{2212}4.25</td></tr>";
        let out = parse_swap_page(&page(rows), d(2024, 3, 4)).unwrap();
        assert_eq!(out.quotes[0].values[0], Some(-4.25));
        assert_eq!(out.quotes[0].values[1], None);
    }

    struct FakePages {
        pages: HashMap<NaiveDate, String>,
        requested: RefCell<Vec<NaiveDate>>,
    }

    impl PageSource for FakePages {
        fn fetch_page(&self, date: NaiveDate) -> Result<String, SourceError> {
            self.requested.borrow_mut().push(date);
            self.pages
                .get(&date)
                .cloned()
                .ok_or_else(|| SourceError::NoData(date.to_string()))
        }
    }

    #[test]
    fn source_skips_failed_days_and_weekends() {
        let body = "<tr><td>Bid</td><td>1</td><td>2</td><td>3</td><td>4</td><td>5</td></tr>\
                    <tr><td>Offer</td><td>3</td><td>4</td><td>5</td><td>6</td><td>7</td></tr>";
        let mut pages = HashMap::new();
        pages.insert(d(2024, 3, 1), page(body));
        pages.insert(d(2024, 3, 5), page(body));
        let fake = FakePages {
            pages,
            requested: RefCell::new(Vec::new()),
        };

        let source = SwapPointSource::new(&fake, Pacing::none());
        let series = source.fetch(d(2024, 3, 1), d(2024, 3, 5)).unwrap();

        assert_eq!(
            *fake.requested.borrow(),
            vec![d(2024, 3, 1), d(2024, 3, 4), d(2024, 3, 5)]
        );
        assert_eq!(series.dates(), vec![d(2024, 3, 1), d(2024, 3, 5)]);
        assert_eq!(series.rows[0].values[0], Some(2.0));
        assert_eq!(series.rows[0].values[4], Some(6.0));
    }
}
