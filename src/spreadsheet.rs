//! Excel output helpers shared by the report converters and QC summaries

use anyhow::Result;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, Worksheet};
use std::path::Path;

/// Excel limits sheet names to 31 characters
pub const MAX_SHEET_NAME: usize = 30;

/// Convert a 0-based column index to Excel letters (0 -> A, 26 -> AA)
pub fn excel_column(col: usize) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Cell reference such as `B7` from 0-based row and column
pub fn cell_ref(row: u32, col: u16) -> String {
    format!("{}{}", excel_column(col as usize), row + 1)
}

/// Worksheet name derived from a file stem
pub fn sheet_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(MAX_SHEET_NAME)
        .collect()
}

/// Typed value of a report cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Int(i64),
    Number(f64),
    Text(String),
    Blank,
}

impl CellValue {
    /// All digits become integers, other finite numbers floats
    pub fn infer(text: &str) -> Self {
        if text.is_empty() {
            return CellValue::Blank;
        }
        if text.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = text.parse::<i64>() {
                return CellValue::Int(n);
            }
        }
        match text.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    Yellow,
    Gold,
}

impl Highlight {
    pub fn format(self) -> Format {
        match self {
            Highlight::Yellow => Format::new()
                .set_background_color(Color::RGB(0xFFFF00))
                .set_border(FormatBorder::Thin)
                .set_border_color(Color::RGB(0xCDCDCD)),
            Highlight::Gold => Format::new().set_background_color(Color::RGB(0xFFC000)),
        }
    }
}

/// One spreadsheet row
#[derive(Debug, Clone, Default)]
pub struct RowData {
    pub cells: Vec<String>,
    pub highlight: Option<Highlight>,
}

impl RowData {
    pub fn new(cells: Vec<String>) -> Self {
        Self {
            cells,
            highlight: None,
        }
    }

    pub fn highlighted(cells: Vec<String>, highlight: Highlight) -> Self {
        Self {
            cells,
            highlight: Some(highlight),
        }
    }

    /// Single-cell row, used for report comment lines
    pub fn comment(line: &str) -> Self {
        Self::new(vec![line.to_string()])
    }
}

/// Write a value with type inference. Blank cells are only written when
/// they carry a format.
pub fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    format: Option<&Format>,
) -> Result<()> {
    match (value, format) {
        (CellValue::Int(n), Some(fmt)) => {
            worksheet.write_number_with_format(row, col, *n as f64, fmt)?;
        }
        (CellValue::Int(n), None) => {
            worksheet.write_number(row, col, *n as f64)?;
        }
        (CellValue::Number(n), Some(fmt)) => {
            worksheet.write_number_with_format(row, col, *n, fmt)?;
        }
        (CellValue::Number(n), None) => {
            worksheet.write_number(row, col, *n)?;
        }
        (CellValue::Text(s), Some(fmt)) => {
            worksheet.write_string_with_format(row, col, s, fmt)?;
        }
        (CellValue::Text(s), None) => {
            worksheet.write_string(row, col, s)?;
        }
        (CellValue::Blank, Some(fmt)) => {
            worksheet.write_blank(row, col, fmt)?;
        }
        (CellValue::Blank, None) => {}
    }
    Ok(())
}

/// Write `rows` to a single-sheet workbook and return the number of rows written
pub fn write_rows<P: AsRef<Path>>(rows: &[RowData], path: P, name: &str) -> Result<usize> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let name = sheet_name(name);
    if !name.is_empty() {
        worksheet.set_name(&name)?;
    }

    let formats: Vec<(Highlight, Format)> = [Highlight::Yellow, Highlight::Gold]
        .into_iter()
        .map(|h| (h, h.format()))
        .collect();

    for (i, row) in rows.iter().enumerate() {
        let fmt = row
            .highlight
            .and_then(|h| formats.iter().find(|(k, _)| *k == h).map(|(_, f)| f));
        for (j, text) in row.cells.iter().enumerate() {
            write_cell(
                worksheet,
                i as u32,
                j as u16,
                &CellValue::infer(text),
                fmt,
            )?;
        }
    }

    workbook.save(path.as_ref())?;
    tracing::debug!(file = %path.as_ref().display(), rows = rows.len(), "wrote spreadsheet");
    Ok(rows.len())
}
