//! ASCII plotting for terminal output.
//!
//! Fixed-size character grid, deterministic so output can be compared in tests.
//!
//! Plot elements:
//! - the series: `-` line through consecutive observations
//! - the latest observation: `o`

use chrono::NaiveDate;

/// Line plot of one column against calendar time. Missing values are skipped.
pub fn render_series_plot(label: &str, dates: &[NaiveDate], values: &[f64], width: usize, height: usize) -> String {
    let points: Vec<(NaiveDate, f64)> = dates
        .iter()
        .zip(values)
        .filter(|(_, v)| v.is_finite())
        .map(|(d, v)| (*d, *v))
        .collect();
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return format!("Plot: {label} | no data\n");
    };
    if points.len() < 2 || first.0 == last.0 {
        return format!("Plot: {label} | single observation {} = {:.4}\n", last.0, last.1);
    }

    let width = width.max(10);
    let height = height.max(5);
    let x_span = (last.0 - first.0).num_days() as f64;
    let xy: Vec<(f64, f64)> = points
        .iter()
        .map(|(d, v)| ((*d - first.0).num_days() as f64, *v))
        .collect();

    let (y_min, y_max) = y_range(&xy).unwrap_or((last.1 - 1.0, last.1 + 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    let mut prev = None;
    for &(x, y) in &xy {
        let gx = map_x(x, 0.0, x_span, width);
        let gy = map_y(y, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(&mut grid, x0, y0, gx, gy, '-'),
            None => grid[gy][gx] = '-',
        }
        prev = Some((gx, gy));
    }
    if let Some((gx, gy)) = prev {
        grid[gy][gx] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {label} | {}..{} | y=[{y_min:.2}, {y_max:.2}]\n",
        first.0, last.0
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn y_range(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(_, y) in points {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y max is row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham-ish). Only blank cells are overwritten.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let dates = [d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4)];
        let txt = render_series_plot("USD_KRW", &dates, &[1.0, 2.0, 3.0], 10, 5);
        let expected = concat!(
            "Plot: USD_KRW | 2024-01-02..2024-01-04 | y=[0.90, 3.10]\n",
            "        -o\n",
            "      --  \n",
            "    --    \n",
            "  --      \n",
            "--        \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn missing_values_are_skipped() {
        let dates = [d(2024, 1, 2), d(2024, 1, 3)];
        let txt = render_series_plot("DXY", &dates, &[f64::NAN, 101.5], 10, 5);
        assert_eq!(txt, "Plot: DXY | single observation 2024-01-03 = 101.5000\n");
        assert_eq!(render_series_plot("DXY", &[], &[], 10, 5), "Plot: DXY | no data\n");
    }
}
