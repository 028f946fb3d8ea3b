//! Workbook sheets: read with calamine, rewrite with rust_xlsxwriter.
//!
//! Neither crate edits a workbook in place, so replacing a sheet means reading every sheet,
//! swapping in the new tables, and writing the whole file back. Other sheets keep their
//! values, cell positions, and formulas; formatting and charts are not carried over.

use std::collections::HashMap;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};

use calamine::{Data, Range, Reader, open_workbook_auto, open_workbook_auto_from_rs};
use rust_xlsxwriter::{Formula, Workbook, XlsxError};
use tracing::{debug, info, warn};

use crate::domain::{Cell, DATE_FORMAT, Series, Table, excel_serial_date};
use crate::error::AppError;

/// Convert one calamine cell. Date-typed cells come back as ISO date text.
pub fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Float(v) => Cell::number(*v),
        Data::Int(v) => Cell::number(*v as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match excel_serial_date(dt.as_f64()) {
            Some(date) => Cell::Text(date.format(DATE_FORMAT).to_string()),
            None => Cell::Empty,
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

/// First row becomes the header; trailing fully-empty rows are dropped.
pub fn table_from_range(range: &Range<Data>) -> Table {
    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|r| r.iter().map(|c| cell_from_data(c).as_text().trim().to_string()).collect())
        .unwrap_or_default();
    let mut table = Table::new(headers);
    for row in rows {
        let cells: Vec<Cell> = row.iter().map(cell_from_data).collect();
        if cells.iter().all(|c| *c == Cell::Empty) {
            continue;
        }
        table.rows.push(cells);
    }
    table
}

/// The first sheet of an in-memory `.xls`/`.xlsx` file.
pub fn first_sheet_from_bytes(bytes: Vec<u8>) -> Result<Table, String> {
    let mut book = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let name = book
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| "workbook has no sheets".to_string())?;
    let range = book.worksheet_range(&name).map_err(|e| e.to_string())?;
    Ok(table_from_range(&range))
}

/// Every sheet of the workbook at `path`, in workbook order. A missing file has no sheets.
pub fn read_all_sheets(path: &Path) -> Result<Vec<(String, Table)>, AppError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut book = open_workbook_auto(path)
        .map_err(|e| AppError::config(format!("Failed to open workbook '{}': {e}", path.display())))?;
    let mut out = Vec::new();
    for name in book.sheet_names() {
        let range = book.worksheet_range(&name).map_err(|e| {
            AppError::config(format!("Failed to read sheet '{name}' of '{}': {e}", path.display()))
        })?;
        out.push((name, table_from_range(&range)));
    }
    Ok(out)
}

/// One sheet, or `None` when the workbook or sheet does not exist.
pub fn read_table(path: &Path, sheet: &str) -> Result<Option<Table>, AppError> {
    Ok(read_all_sheets(path)?
        .into_iter()
        .find(|(name, _)| name == sheet)
        .map(|(_, table)| table))
}

/// One sheet as a series, or an empty series named `name` when it does not exist yet.
pub fn read_series(path: &Path, sheet: &str, empty: Series) -> Result<Series, AppError> {
    match read_table(path, sheet)? {
        Some(table) if !table.headers.is_empty() => {
            let series = table.to_series(empty.name.clone());
            debug!(sheet, rows = series.len(), "loaded persisted sheet");
            Ok(series)
        }
        _ => Ok(empty),
    }
}

/// One sheet as positioned cells.
///
/// Sheets the run does not replace are carried through a rewrite in this form, so their
/// cell positions and formulas survive.
#[derive(Debug, Clone, Default, PartialEq)]
struct SheetCells {
    name: String,
    values: Vec<(u32, u16, Cell)>,
    formulas: Vec<(u32, u16, String)>,
}

impl SheetCells {
    fn from_table(name: &str, table: &Table) -> Self {
        let mut sheet = SheetCells {
            name: name.to_string(),
            ..SheetCells::default()
        };
        for (col, header) in table.headers.iter().enumerate() {
            sheet.values.push((0, col as u16, Cell::text(header.clone())));
        }
        for (r, row) in table.rows.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                if *cell != Cell::Empty {
                    sheet.values.push((r as u32 + 1, col as u16, cell.clone()));
                }
            }
        }
        sheet
    }
}

/// Every sheet of the workbook at `path` as positioned values and formulas.
fn read_sheet_cells(path: &Path) -> Result<Vec<SheetCells>, AppError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut book = open_workbook_auto(path)
        .map_err(|e| AppError::config(format!("Failed to open workbook '{}': {e}", path.display())))?;
    let mut out = Vec::new();
    for name in book.sheet_names() {
        let range = book.worksheet_range(&name).map_err(|e| {
            AppError::config(format!("Failed to read sheet '{name}' of '{}': {e}", path.display()))
        })?;
        let mut sheet = SheetCells {
            name: name.clone(),
            ..SheetCells::default()
        };
        if let Some((row0, col0)) = range.start() {
            for (r, c, data) in range.used_cells() {
                let cell = cell_from_data(data);
                if cell != Cell::Empty {
                    sheet.values.push((row0 + r as u32, (col0 as usize + c) as u16, cell));
                }
            }
        }
        match book.worksheet_formula(&name) {
            Ok(formulas) => {
                if let Some((row0, col0)) = formulas.start() {
                    for (r, c, formula) in formulas.used_cells() {
                        if !formula.is_empty() {
                            sheet.formulas.push((row0 + r as u32, (col0 as usize + c) as u16, formula.clone()));
                        }
                    }
                }
            }
            Err(e) => warn!(sheet = %name, error = %e, "formulas unreadable, keeping cached values only"),
        }
        out.push(sheet);
    }
    Ok(out)
}

/// Replace (or add) the given sheets and write the workbook back.
///
/// Other sheets keep their cell values, positions, and formulas. When the workbook cannot be
/// written because another program holds it, the result goes to `<stem>_backup.xlsx` next to
/// it instead. Returns the path actually written.
pub fn replace_sheets(path: &Path, updates: &[(&str, Table)]) -> Result<PathBuf, AppError> {
    replace_sheets_with(path, updates, write_workbook)
}

fn replace_sheets_with(
    path: &Path,
    updates: &[(&str, Table)],
    write: impl Fn(&Path, &[SheetCells]) -> Result<(), XlsxError>,
) -> Result<PathBuf, AppError> {
    let fresh: Vec<SheetCells> = updates.iter().map(|(n, t)| SheetCells::from_table(n, t)).collect();
    let mut sheets = read_sheet_cells(path)?;
    for update in &fresh {
        match sheets.iter_mut().find(|s| s.name == update.name) {
            Some(slot) => *slot = update.clone(),
            None => sheets.push(update.clone()),
        }
    }
    let carried = sheets.iter().map(|s| s.formulas.len()).sum::<usize>();
    if carried > 0 {
        debug!(path = %path.display(), formulas = carried, "carrying formulas of untouched sheets");
    }

    match write(path, &sheets) {
        Ok(()) => {
            info!(path = %path.display(), sheets = updates.len(), "workbook saved");
            Ok(path.to_path_buf())
        }
        Err(e) if is_locked(&e) => {
            let backup = backup_path(path);
            warn!(path = %path.display(), backup = %backup.display(), "workbook is locked, writing backup instead");
            // The backup holds only the updated sheets.
            write(&backup, &fresh).map_err(|e| {
                AppError::config(format!("Failed to write backup workbook '{}': {e}", backup.display()))
            })?;
            Ok(backup)
        }
        Err(e) => Err(AppError::config(format!(
            "Failed to write workbook '{}': {e}",
            path.display()
        ))),
    }
}

/// Another program (usually the spreadsheet app) holds the file.
fn is_locked(err: &XlsxError) -> bool {
    matches!(err, XlsxError::IoError(e) if e.kind() == ErrorKind::PermissionDenied)
}

pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("workbook");
    path.with_file_name(format!("{stem}_backup.xlsx"))
}

fn write_workbook(path: &Path, sheets: &[SheetCells]) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;
        let mut cached: HashMap<(u32, u16), String> = HashMap::new();
        for (row, col, cell) in &sheet.values {
            match cell {
                Cell::Empty => {}
                Cell::Number(v) => {
                    worksheet.write_number(*row, *col, *v)?;
                }
                Cell::Text(s) => {
                    worksheet.write_string(*row, *col, s)?;
                }
            }
            cached.insert((*row, *col), cell.as_text());
        }
        // Written last so a formula replaces the cached value of its cell.
        for (row, col, text) in &sheet.formulas {
            let mut formula = Formula::new(text);
            if let Some(result) = cached.get(&(*row, *col)) {
                formula = formula.set_result(result);
            }
            worksheet.write_formula(*row, *col, formula)?;
        }
    }
    workbook.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_series() -> Series {
        let mut s = Series::new("Kospi", "날짜", vec!["Close".to_string(), "MarketCap".to_string()]);
        s.push(d(2024, 1, 2), vec![Some(2669.81), None]);
        s.push(d(2024, 1, 3), vec![Some(2607.31), None]);
        s
    }

    #[test]
    fn replace_preserves_other_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");

        let mut notes = Table::new(vec!["memo".to_string()]);
        notes.rows.push(vec![Cell::text("keep me")]);
        replace_sheets(&path, &[("Notes", notes.clone())]).unwrap();

        let written = replace_sheets(&path, &[("Kospi", Table::from(&sample_series()))]).unwrap();
        assert_eq!(written, path);

        let sheets = read_all_sheets(&path).unwrap();
        let names: Vec<&str> = sheets.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Notes", "Kospi"]);
        assert_eq!(sheets[0].1, notes);
    }

    #[test]
    fn series_round_trip_keeps_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        replace_sheets(&path, &[("Kospi", Table::from(&sample_series()))]).unwrap();

        let back = read_series(&path, "Kospi", Series::new("Kospi", "날짜", Vec::new())).unwrap();
        assert_eq!(back, sample_series());
    }

    #[test]
    fn replacing_a_sheet_overwrites_it_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        replace_sheets(&path, &[("Kospi", Table::from(&sample_series()))]).unwrap();
        replace_sheets(&path, &[("Kospi", Table::from(&sample_series().tail(1)))]).unwrap();

        let back = read_series(&path, "Kospi", Series::new("Kospi", "날짜", Vec::new())).unwrap();
        assert_eq!(back.dates(), vec![d(2024, 1, 3)]);
    }

    #[test]
    fn missing_workbook_or_sheet_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.xlsx");
        let empty = Series::new("Kospi", "날짜", vec!["Close".to_string()]);
        assert_eq!(read_series(&path, "Kospi", empty.clone()).unwrap(), empty);
        assert!(read_table(&path, "Kospi").unwrap().is_none());
    }

    #[test]
    fn first_sheet_from_bytes_reads_download() {
        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.write_string(0, 0, "전송일").unwrap();
        ws.write_string(0, 1, "1Y").unwrap();
        ws.write_string(1, 0, "25/07/22").unwrap();
        ws.write_number(1, 1, 2.51).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let table = first_sheet_from_bytes(bytes).unwrap();
        assert_eq!(table.headers, vec!["전송일", "1Y"]);
        assert_eq!(table.rows[0], vec![Cell::text("25/07/22"), Cell::Number(2.51)]);
    }

    #[test]
    fn untouched_sheets_keep_formulas_and_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");

        let mut book = Workbook::new();
        let ws = book.add_worksheet();
        ws.set_name("Notes").unwrap();
        ws.write_number(0, 0, 2.0).unwrap();
        ws.write_formula(0, 1, Formula::new("=A1*2").set_result("4")).unwrap();
        ws.write_string(2, 2, "offset").unwrap();
        book.save(&path).unwrap();

        replace_sheets(&path, &[("Kospi", Table::from(&sample_series()))]).unwrap();

        let mut reopened = open_workbook_auto(&path).unwrap();
        let formulas = reopened.worksheet_formula("Notes").unwrap();
        assert_eq!(formulas.get_value((0, 1)).map(String::as_str), Some("A1*2"));
        let values = reopened.worksheet_range("Notes").unwrap();
        assert_eq!(values.get_value((0, 0)), Some(&Data::Float(2.0)));
        assert_eq!(values.get_value((2, 2)), Some(&Data::String("offset".to_string())));
    }

    #[test]
    fn locked_workbook_falls_back_to_backup_with_updated_sheets_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FX_automation.xlsx");
        let mut notes = Table::new(vec!["memo".to_string()]);
        notes.rows.push(vec![Cell::text("keep me")]);
        replace_sheets(&path, &[("Notes", notes.clone())]).unwrap();

        let locked = path.clone();
        let written = replace_sheets_with(&path, &[("Kospi", Table::from(&sample_series()))], |target, sheets| {
            if target == locked.as_path() {
                return Err(XlsxError::IoError(std::io::Error::from(ErrorKind::PermissionDenied)));
            }
            write_workbook(target, sheets)
        })
        .unwrap();

        assert_eq!(written, dir.path().join("FX_automation_backup.xlsx"));
        let backup: Vec<String> = read_all_sheets(&written).unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(backup, vec!["Kospi"]);
        // The locked workbook is left as it was.
        assert_eq!(read_table(&path, "Notes").unwrap(), Some(notes));
        assert!(read_table(&path, "Kospi").unwrap().is_none());
    }

    #[test]
    fn only_permission_errors_count_as_locked() {
        assert!(is_locked(&XlsxError::IoError(std::io::Error::from(ErrorKind::PermissionDenied))));
        assert!(!is_locked(&XlsxError::IoError(std::io::Error::from(ErrorKind::NotFound))));
    }

    #[test]
    fn backup_name_sits_next_to_workbook() {
        assert_eq!(
            backup_path(Path::new("/tmp/FX_automation.xlsx")),
            PathBuf::from("/tmp/FX_automation_backup.xlsx")
        );
    }
}
