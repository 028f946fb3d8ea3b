//! Derived statistics over a fully materialized value history.
//!
//! All functions are pure and total: short histories clamp or yield NaN, and divisions by a
//! zero standard deviation or zero average loss are not special-cased, so NaN/inf propagate
//! instead of raising.

use chrono::{Datelike, NaiveDate};

/// Trading days per year used to annualize daily volatility.
pub const TRADING_DAYS: f64 = 252.0;

/// Element-wise `v[i] / v[i-1] - 1`. The first element is NaN.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = values[i] / values[i - 1] - 1.0;
    }
    out
}

/// Element-wise `v[i] - v[i-1]`. The first element is NaN.
pub fn diff(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = values[i] - values[i - 1];
    }
    out
}

/// Apply `f` to each full window of `window` finite values; NaN otherwise.
fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 {
        return out;
    }
    for end in window..=values.len() {
        let slice = &values[end - window..end];
        if slice.iter().all(|v| v.is_finite()) {
            out[end - 1] = f(slice);
        }
    }
    out
}

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

pub fn rolling_sum(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.iter().sum())
}

/// Mean of the finite values; NaN when there are none.
pub fn mean(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.iter().sum::<f64>() / finite.len() as f64
}

/// Standard deviation of the finite values with `ddof` degrees of freedom removed.
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() <= ddof {
        return f64::NAN;
    }
    let m = finite.iter().sum::<f64>() / finite.len() as f64;
    let ss = finite.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    (ss / (finite.len() - ddof) as f64).sqrt()
}

/// Running maximum over finite values. NaN until the first finite value.
pub fn expanding_max(values: &[f64]) -> Vec<f64> {
    let mut best = f64::NAN;
    values
        .iter()
        .map(|&v| {
            if v.is_finite() && (best.is_nan() || v > best) {
                best = v;
            }
            best
        })
        .collect()
}

/// `value / running_max - 1` per element.
pub fn drawdown(values: &[f64]) -> Vec<f64> {
    expanding_max(values)
        .iter()
        .zip(values)
        .map(|(peak, v)| v / peak - 1.0)
        .collect()
}

/// The most negative drawdown. NaN for an empty or all-missing history.
pub fn max_drawdown(values: &[f64]) -> f64 {
    drawdown(values)
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v < acc { v } else { acc })
}

/// Relative Strength Index with simple (not exponential) rolling means.
///
/// The first element has no change; it counts as a zero gain and a zero loss. The first
/// `period - 1` outputs are NaN.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let delta = diff(values);
    let gains: Vec<f64> = delta.iter().map(|&d| if d > 0.0 { d } else { 0.0 }).collect();
    let losses: Vec<f64> = delta.iter().map(|&d| if d < 0.0 { -d } else { 0.0 }).collect();
    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);
    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| {
            let rs = g / l;
            100.0 - 100.0 / (1.0 + rs)
        })
        .collect()
}

/// True when every finite value is equal (or there are none).
///
/// A float mean of equal values can be off by one ulp, which leaves a tiny non-zero std, so
/// constant samples are detected directly.
fn is_constant(values: &[f64]) -> bool {
    let mut finite = values.iter().filter(|v| v.is_finite());
    match finite.next() {
        Some(first) => finite.all(|v| v == first),
        None => true,
    }
}

/// Z-score against the full sample: `(v - mean) / population std`. NaN for a constant sample.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    if is_constant(values) {
        return vec![f64::NAN; values.len()];
    }
    let m = mean(values);
    let sd = std_dev(values, 0);
    values.iter().map(|v| (v - m) / sd).collect()
}

/// Z-score of each value against its trailing window (population std, full window required).
pub fn rolling_zscore(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| {
        if is_constant(w) {
            return f64::NAN;
        }
        let m = w.iter().sum::<f64>() / w.len() as f64;
        (w[w.len() - 1] - m) / std_dev(w, 0)
    })
}

/// Cumulative sum that restarts each calendar year. Missing values stay missing and do not
/// break the running total.
pub fn cumsum_by_year(dates: &[NaiveDate], values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut year = None;
    let mut total = 0.0;
    for (date, &v) in dates.iter().zip(values) {
        if year != Some(date.year()) {
            year = Some(date.year());
            total = 0.0;
        }
        if v.is_finite() {
            total += v;
            out.push(total);
        } else {
            out.push(f64::NAN);
        }
    }
    out
}

/// Percent change of the last value against the value `lookback` rows earlier.
///
/// When the history is shorter than the look-back, the earliest row is used.
pub fn change_over(values: &[f64], lookback: usize) -> f64 {
    let Some(&current) = values.last() else {
        return f64::NAN;
    };
    let base = values[(values.len() - 1).saturating_sub(lookback)];
    (current / base - 1.0) * 100.0
}

/// Percent change of the last value against the first row of calendar year `year`.
///
/// Zero when `year` has no rows yet: nothing has moved since the previous close.
pub fn ytd_change(dates: &[NaiveDate], values: &[f64], year: i32) -> f64 {
    let Some(&current) = values.last() else {
        return f64::NAN;
    };
    match dates.iter().position(|d| d.year() == year) {
        Some(start) => (current / values[start] - 1.0) * 100.0,
        None if current.is_finite() => 0.0,
        None => f64::NAN,
    }
}

/// Annualized volatility in percent from the last `window` daily returns.
///
/// NaN when fewer than `window` returns are available.
pub fn annualized_vol(values: &[f64], window: usize) -> f64 {
    let returns: Vec<f64> = pct_change(values).into_iter().skip(1).collect();
    if window == 0 || returns.len() < window {
        return f64::NAN;
    }
    let tail = &returns[returns.len() - window..];
    if !tail.iter().all(|v| v.is_finite()) {
        return f64::NAN;
    }
    std_dev(tail, 1) * TRADING_DAYS.sqrt() * 100.0
}

/// Round half away from zero to `digits` decimals. NaN stays NaN.
pub fn round_to(v: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (v * scale).round() / scale
}
