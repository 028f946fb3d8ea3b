//! Weekday-only business calendar.
//!
//! A business day is Monday through Friday. There is no holiday calendar: exchange holidays
//! simply produce no observation from the provider.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// First business day strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while !is_business_day(next) {
        next += Duration::days(1);
    }
    next
}

/// All business days in `[start, end]`. Empty when `start > end`.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut day = start;
    while day <= end {
        if is_business_day(day) {
            out.push(day);
        }
        day += Duration::days(1);
    }
    out
}
