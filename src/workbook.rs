use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::Timelike;
use log::{debug, warn};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::WorkbookError;
use crate::model::{Cell, Grid, Row};
use crate::sheet::ID_COLUMN;

/// Read one worksheet of a workbook as a raw grid
///
/// Opens the workbook at `path` (xlsx, xls, xlsb or ods) and returns the
/// worksheet called `preferred`. When no worksheet has that name, the first
/// worksheet of the file is used instead.
///
/// # Arguments
/// * `path` - Workbook file to open
/// * `preferred` - Worksheet name to look for
///
/// # Returns
/// * `Result<Grid, WorkbookError>` - Cells addressed from A1, or an error
///
/// # Examples
/// ```no_run
/// use tagplan::workbook::read_grid;
///
/// match read_grid("public/data/data ref.xlsx", "Data ref") {
///     Ok(grid) => println!("Read {} rows", grid.len()),
///     Err(e) => eprintln!("Error reading workbook: {}", e),
/// }
/// ```
pub fn read_grid(path: impl AsRef<Path>, preferred: &str) -> Result<Grid, WorkbookError> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names();

    let target = match names.iter().find(|name| name.as_str() == preferred) {
        Some(name) => name.clone(),
        None => {
            let first = names.first().ok_or(WorkbookError::NoSheets)?.clone();
            debug!(
                "Worksheet {:?} not found in {}, using {:?}",
                preferred,
                path.display(),
                first
            );
            first
        }
    };

    let range = workbook.worksheet_range(&target)?;
    Ok(range_to_grid(&range))
}

/// Read every worksheet of a workbook, in workbook order.
pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<(String, Grid)>, WorkbookError> {
    let mut workbook = open_workbook_auto(path)?;
    let mut sheets = Vec::new();

    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        sheets.push((name, range_to_grid(&range)));
    }

    Ok(sheets)
}

/// Replace (or append) one worksheet of a workbook on disk
///
/// Every other worksheet already present in the file is carried over with its
/// cell values. A missing file is created with just the one worksheet.
///
/// # Arguments
/// * `path` - Workbook file to rewrite
/// * `sheet_name` - Worksheet to replace or append
/// * `grid` - New contents of that worksheet
///
/// # Returns
/// * `Result<(), WorkbookError>` - Success or an error; an unreadable existing
///   file is left untouched
pub fn replace_sheet(
    path: impl AsRef<Path>,
    sheet_name: &str,
    grid: &Grid,
) -> Result<(), WorkbookError> {
    let path = path.as_ref();

    let mut sheets = if path.exists() {
        read_all(path)?
    } else {
        Vec::new()
    };

    match sheets.iter_mut().find(|(name, _)| name == sheet_name) {
        Some((_, existing)) => *existing = grid.clone(),
        None => sheets.push((sheet_name.to_string(), grid.clone())),
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut workbook = Workbook::new();
    for (name, grid) in &sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name.as_str())?;
        write_grid(worksheet, grid)?;
    }
    workbook.save(path)?;

    Ok(())
}

/// Build a single-worksheet workbook in memory
///
/// # Arguments
/// * `sheet_name` - Name of the worksheet
/// * `grid` - Worksheet contents
///
/// # Returns
/// * `Result<Vec<u8>, WorkbookError>` - XLSX file content as bytes or an error
pub fn to_xlsx(sheet_name: &str, grid: &Grid) -> Result<Vec<u8>, WorkbookError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;
    write_grid(worksheet, grid)?;

    let buffer = workbook.save_to_buffer()?;
    Ok(buffer)
}

/// Lay out rows as a header line followed by one line per row.
///
/// With `with_id` the identifier is written as the first `_id` column so that
/// it survives a reload.
pub fn rows_to_grid(columns: &[String], rows: &[Row], with_id: bool) -> Grid {
    let mut header = Vec::with_capacity(columns.len() + 1);
    if with_id {
        header.push(Cell::Text(ID_COLUMN.to_string()));
    }
    header.extend(columns.iter().map(|column| Cell::Text(column.clone())));

    let mut grid = vec![header];
    for row in rows {
        let mut line = Vec::with_capacity(columns.len() + 1);
        if with_id {
            line.push(Cell::Text(row.id.to_string()));
        }
        for column in columns {
            let value = row.get(column);
            line.push(if value.is_empty() {
                Cell::Empty
            } else {
                Cell::Text(value.to_string())
            });
        }
        grid.push(line);
    }
    grid
}

/// Lay out arbitrary JSON records the way a record-to-sheet export does:
/// the header is the union of keys in first-seen order.
pub fn records_to_grid(records: &[Map<String, Value>]) -> Grid {
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut grid = vec![columns
        .iter()
        .map(|column| Cell::Text(column.to_string()))
        .collect::<Vec<_>>()];

    for record in records {
        grid.push(
            columns
                .iter()
                .map(|column| record.get(*column).map(json_to_cell).unwrap_or_default())
                .collect(),
        );
    }
    grid
}

fn json_to_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Empty,
        Value::Bool(b) => Cell::Bool(*b),
        Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or_default(),
        Value::String(s) if s.is_empty() => Cell::Empty,
        Value::String(s) => Cell::Text(s.clone()),
        other => Cell::Text(other.to_string()),
    }
}

fn write_grid(worksheet: &mut Worksheet, grid: &Grid) -> Result<(), WorkbookError> {
    for (r, line) in grid.iter().enumerate() {
        for (c, cell) in line.iter().enumerate() {
            let (row, col) = (r as u32, c as u16);
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    worksheet.write_string(row, col, s.as_str())?;
                }
                Cell::Number(n) => {
                    worksheet.write_number(row, col, *n)?;
                }
                Cell::Bool(b) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
            }
        }
    }
    Ok(())
}

// Calamine ranges start at the first used cell; pad so the grid starts at A1.
fn range_to_grid(range: &Range<Data>) -> Grid {
    let (start_row, start_col) = match range.start() {
        Some((r, c)) => (r as usize, c as usize),
        None => return Grid::new(),
    };

    let mut grid: Grid = vec![Vec::new(); start_row];
    for row in range.rows() {
        let mut line = vec![Cell::Empty; start_col];
        line.extend(row.iter().map(data_to_cell));
        grid.push(line);
    }
    grid
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::Text(excel_serial_to_text(dt.as_f64())),
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => {
            warn!("Cell error value in workbook: {:?}", e);
            Cell::Empty
        }
    }
}

/// Render an Excel serial date as `YYYY-MM-DD`, with the time when present.
fn excel_serial_to_text(serial: f64) -> String {
    let epoch = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0));
    let millis = (serial * 86_400_000.0).round() as i64;

    match epoch.and_then(|start| start.checked_add_signed(chrono::Duration::milliseconds(millis))) {
        Some(moment) if moment.num_seconds_from_midnight() == 0 => {
            moment.format("%Y-%m-%d").to_string()
        }
        Some(moment) => moment.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => serial.to_string(),
    }
}
