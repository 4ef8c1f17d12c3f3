use crate::domain::model::InputTable;
use crate::utils::error::{EtlError, Result};
use calamine::{open_workbook_auto_from_rs, Reader};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::io::Cursor;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
/// Excel 儲存格字串上限
const MAX_CELL_CHARS: usize = 32_767;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Workbook,
    Csv,
}

impl SheetFormat {
    pub fn from_path(path: &str) -> Result<Self> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("xlsx" | "xlsm" | "xls" | "xlsb" | "ods") => Ok(SheetFormat::Workbook),
            Some("csv") => Ok(SheetFormat::Csv),
            _ => Err(EtlError::InvalidConfigValueError {
                field: "path".to_string(),
                value: path.to_string(),
                reason: "Expected a .xlsx, .xlsm, .xls, .xlsb, .ods or .csv file".to_string(),
            }),
        }
    }
}

/// An output cell; numbers stay numeric in workbooks.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    pub fn as_csv_field(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

pub fn read_table(bytes: Vec<u8>, format: SheetFormat, sheet: Option<&str>) -> Result<InputTable> {
    let table = match format {
        SheetFormat::Workbook => read_workbook(bytes, sheet)?,
        SheetFormat::Csv => read_csv(&bytes)?,
    };
    Ok(normalize_table(table))
}

fn read_workbook(bytes: Vec<u8>, sheet: Option<&str>) -> Result<InputTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| EtlError::ProcessingError {
                message: "Workbook has no worksheets".to_string(),
            })?,
    };
    tracing::debug!("Reading worksheet '{}'", sheet_name);

    let range = workbook.worksheet_range(&sheet_name)?;
    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());

    let headers = rows.next().unwrap_or_default();
    Ok(InputTable {
        headers,
        rows: rows.collect(),
    })
}

fn read_csv(bytes: &[u8]) -> Result<InputTable> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }

    Ok(InputTable { headers, rows })
}

/// 補齊欄名與每列長度；空白欄名改成 "Column N"
fn normalize_table(mut table: InputTable) -> InputTable {
    let width = table
        .rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(table.headers.len()))
        .max()
        .unwrap_or(0);

    table.headers.resize(width, String::new());
    for (idx, header) in table.headers.iter_mut().enumerate() {
        let trimmed = header.trim();
        *header = if trimmed.is_empty() {
            format!("Column {}", idx + 1)
        } else {
            trimmed.to_string()
        };
    }
    for row in &mut table.rows {
        row.resize(width, String::new());
    }
    table
}

/// Header name (exact, then case-insensitive), else a 1-based column number.
pub fn resolve_column(table: &InputTable, column: &str) -> Result<usize> {
    let wanted = column.trim();

    if let Some(idx) = table.headers.iter().position(|h| h == wanted) {
        return Ok(idx);
    }
    if let Some(idx) = table
        .headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(wanted) || h.to_lowercase() == wanted.to_lowercase())
    {
        return Ok(idx);
    }
    if let Ok(position) = wanted.parse::<usize>() {
        if position >= 1 && position <= table.headers.len() {
            return Ok(position - 1);
        }
    }

    Err(EtlError::ColumnNotFoundError {
        column: column.to_string(),
        available: table.headers.clone(),
    })
}

fn clamp_cell(value: &str) -> String {
    if value.chars().count() <= MAX_CELL_CHARS {
        value.to_string()
    } else {
        value.chars().take(MAX_CELL_CHARS).collect()
    }
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &OutputSheet, header_format: &Format) -> Result<()> {
    worksheet.set_name(&sheet.name)?;

    for (col, header) in sheet.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, column_index(col)?, clamp_cell(header), header_format)?;
    }

    for (row_idx, row) in sheet.rows.iter().enumerate() {
        let row_num = u32::try_from(row_idx + 1).map_err(|_| EtlError::ProcessingError {
            message: "Too many rows for a worksheet".to_string(),
        })?;
        for (col, cell) in row.iter().enumerate() {
            let col = column_index(col)?;
            match cell {
                Cell::Text(value) => {
                    worksheet.write_string(row_num, col, clamp_cell(value))?;
                }
                Cell::Number(value) => {
                    worksheet.write_number(row_num, col, *value)?;
                }
                Cell::Empty => {}
            }
        }
    }

    if !sheet.headers.is_empty() {
        worksheet.set_freeze_panes(1, 0)?;
    }
    worksheet.autofit();
    Ok(())
}

fn column_index(col: usize) -> Result<u16> {
    u16::try_from(col).map_err(|_| EtlError::ProcessingError {
        message: format!("Column {} exceeds the worksheet limit", col + 1),
    })
}

/// Renders the sheets into one `.xlsx` document.
pub fn render_xlsx(sheets: &[OutputSheet]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        write_sheet(worksheet, sheet, &header_format)?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// CSV 以 UTF-8 BOM 開頭，讓 Excel 正確辨識編碼
pub fn render_csv(sheet: &OutputSheet) -> Result<Vec<u8>> {
    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        writer.write_record(&sheet.headers)?;
        for row in &sheet.rows {
            writer.write_record(row.iter().map(Cell::as_csv_field))?;
        }
        writer.flush()?;
    }
    Ok(buffer)
}
