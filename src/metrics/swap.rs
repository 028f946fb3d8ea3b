//! Mid swap points from scraped bid/offer rows.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::data::smbs::{SwapQuote, TENORS};
use crate::domain::Series;

pub fn empty_swap_series() -> Series {
    Series::new(
        "Swap_Point",
        "date",
        TENORS.iter().map(|t| t.to_string()).collect(),
    )
}

fn side_matches(side: &str, needle: &str) -> bool {
    side.to_lowercase().contains(needle)
}

/// One row per date that has both a bid and an offer quote: `(bid + offer) / 2` per tenor.
///
/// A tenor is missing when either side is missing. When a date has several rows for one
/// side, the last one counts.
pub fn mid_series(quotes: &[SwapQuote]) -> Series {
    let mut sides: BTreeMap<NaiveDate, (Option<&SwapQuote>, Option<&SwapQuote>)> = BTreeMap::new();
    for q in quotes {
        let entry = sides.entry(q.date).or_default();
        if side_matches(&q.side, "bid") {
            entry.0 = Some(q);
        } else if side_matches(&q.side, "offer") {
            entry.1 = Some(q);
        }
    }

    let mut series = empty_swap_series();
    for (date, pair) in sides {
        let (Some(bid), Some(offer)) = pair else {
            continue;
        };
        let values = (0..TENORS.len())
            .map(|i| {
                let b = bid.values.get(i).copied().flatten()?;
                let o = offer.values.get(i).copied().flatten()?;
                Some((b + o) / 2.0)
            })
            .collect();
        series.push(date, values);
    }
    series
}
