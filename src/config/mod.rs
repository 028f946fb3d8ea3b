//! Runtime settings.
//!
//! Values come from the process environment (after loading an optional `.env` file) and
//! fall back to built-in defaults. CLI flags override individual settings in `app`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Days, NaiveDate};

use crate::data;
use crate::domain::parse_date;
use crate::error::AppError;

pub const DEFAULT_WORKBOOK: &str = "FX_automation.xlsx";
pub const DEFAULT_SWAP_CACHE: &str = "fx_swap_mid.csv";

/// Look-back used when a feed without a fixed history start has nothing persisted yet.
pub const DEFAULT_LOOKBACK_DAYS: u64 = 365;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub workbook: PathBuf,
    pub swap_cache: PathBuf,
    pub http_timeout: Duration,
    /// Fixed wait between consecutive swap page requests.
    pub request_delay: Duration,
    /// Upper bound of the random extra wait added to `request_delay`.
    pub request_jitter: Duration,
    pub fx_start: NaiveDate,
    pub flow_start: NaiveDate,
    pub rates_start: NaiveDate,
    /// `None` means `DEFAULT_LOOKBACK_DAYS` before the as-of date.
    pub swap_start: Option<NaiveDate>,
    pub kospi_start: Option<NaiveDate>,
    pub yahoo_url: String,
    pub krx_url: String,
    pub smbs_url: String,
    pub kmb_url: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let date = |key: &str, default: NaiveDate| -> Result<NaiveDate, AppError> {
            match get(key) {
                Some(raw) => parse_setting_date(key, &raw),
                None => Ok(default),
            }
        };
        let optional_date = |key: &str| -> Result<Option<NaiveDate>, AppError> {
            get(key).map(|raw| parse_setting_date(key, &raw)).transpose()
        };
        let millis = |key: &str, default: u64| -> Result<Duration, AppError> {
            match get(key) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| AppError::config(format!("Invalid {key}='{raw}': expected milliseconds."))),
                None => Ok(Duration::from_millis(default)),
            }
        };

        let timeout_secs = match get("FXA_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| {
                    AppError::config(format!("Invalid FXA_HTTP_TIMEOUT_SECS='{raw}': expected seconds > 0."))
                })?,
            None => 30,
        };

        Ok(Self {
            workbook: get("FXA_WORKBOOK").unwrap_or_else(|| DEFAULT_WORKBOOK.to_string()).into(),
            swap_cache: get("FXA_SWAP_CACHE").unwrap_or_else(|| DEFAULT_SWAP_CACHE.to_string()).into(),
            http_timeout: Duration::from_secs(timeout_secs),
            request_delay: millis("FXA_REQUEST_DELAY_MS", 1800)?,
            request_jitter: millis("FXA_REQUEST_JITTER_MS", 400)?,
            fx_start: date("FXA_FX_START", ymd(2009, 12, 28))?,
            flow_start: date("FXA_FLOW_START", ymd(1998, 12, 7))?,
            rates_start: date("FXA_RATES_START", ymd(2000, 1, 1))?,
            swap_start: optional_date("FXA_SWAP_START")?,
            kospi_start: optional_date("FXA_KOSPI_START")?,
            yahoo_url: get("FXA_YAHOO_URL").unwrap_or_else(|| data::yahoo::DEFAULT_URL.to_string()),
            krx_url: get("FXA_KRX_URL").unwrap_or_else(|| data::krx::DEFAULT_URL.to_string()),
            smbs_url: get("FXA_SMBS_URL").unwrap_or_else(|| data::smbs::DEFAULT_URL.to_string()),
            kmb_url: get("FXA_KMB_URL").unwrap_or_else(|| data::kmb::DEFAULT_URL.to_string()),
        })
    }

    pub fn pacing(&self) -> data::Pacing {
        data::Pacing {
            delay: self.request_delay,
            jitter: self.request_jitter,
        }
    }

    pub fn swap_default_start(&self, as_of: NaiveDate) -> NaiveDate {
        self.swap_start.unwrap_or_else(|| lookback_start(as_of))
    }

    pub fn kospi_default_start(&self, as_of: NaiveDate) -> NaiveDate {
        self.kospi_start.unwrap_or_else(|| lookback_start(as_of))
    }
}

fn lookback_start(as_of: NaiveDate) -> NaiveDate {
    as_of.checked_sub_days(Days::new(DEFAULT_LOOKBACK_DAYS)).unwrap_or(as_of)
}

fn parse_setting_date(key: &str, raw: &str) -> Result<NaiveDate, AppError> {
    parse_date(raw).ok_or_else(|| AppError::config(format!("Invalid {key}='{raw}': expected YYYY-MM-DD.")))
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EXIT_CONFIG;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, AppError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.workbook, PathBuf::from("FX_automation.xlsx"));
        assert_eq!(s.swap_cache, PathBuf::from("fx_swap_mid.csv"));
        assert_eq!(s.http_timeout, Duration::from_secs(30));
        assert_eq!(s.fx_start, ymd(2009, 12, 28));
        assert_eq!(s.flow_start, ymd(1998, 12, 7));
        assert_eq!(s.swap_start, None);
        assert_eq!(s.swap_default_start(ymd(2024, 12, 31)), ymd(2024, 1, 1));
    }

    #[test]
    fn overrides_and_blank_values() {
        let s = settings(&[
            ("FXA_WORKBOOK", "/data/book.xlsx"),
            ("FXA_SWAP_START", "2024-06-03"),
            ("FXA_REQUEST_DELAY_MS", "0"),
            ("FXA_FX_START", "  "),
        ])
        .unwrap();
        assert_eq!(s.workbook, PathBuf::from("/data/book.xlsx"));
        assert_eq!(s.swap_default_start(ymd(2025, 1, 1)), ymd(2024, 6, 3));
        assert_eq!(s.request_delay, Duration::ZERO);
        assert_eq!(s.fx_start, ymd(2009, 12, 28));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for (key, value) in [
            ("FXA_HTTP_TIMEOUT_SECS", "0"),
            ("FXA_HTTP_TIMEOUT_SECS", "soon"),
            ("FXA_FLOW_START", "yesterday"),
            ("FXA_REQUEST_JITTER_MS", "-5"),
        ] {
            let err = settings(&[(key, value)]).unwrap_err();
            assert_eq!(err.exit_code(), EXIT_CONFIG, "{key}={value}");
            assert!(err.message().contains(key));
        }
    }
}
