use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{Data, Reader, Sheets};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::amounts::excel_serial_to_date;
use crate::error::ParseError;
use crate::models::Table;
use crate::parser::{build_table, unreadable, RawCell};

/// Ways of opening a binary workbook, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SheetStrategy {
    /// Reader chosen from the file extension.
    ByExtension,
    /// Reader chosen by sniffing the content, for mislabelled files.
    ByContent,
}

pub const STRATEGIES: &[SheetStrategy] = &[SheetStrategy::ByExtension, SheetStrategy::ByContent];

impl SheetStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ByExtension => "by-extension",
            Self::ByContent => "by-content",
        }
    }

    fn read(&self, path: &Path) -> Result<Option<Table>, calamine::Error> {
        match self {
            Self::ByExtension => {
                let workbook = calamine::open_workbook_auto(path)?;
                Ok(first_non_empty_sheet(workbook))
            }
            Self::ByContent => {
                let bytes = std::fs::read(path).map_err(calamine::Error::Io)?;
                let workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))?;
                Ok(first_non_empty_sheet(workbook))
            }
        }
    }
}

/// Opens `path` with each strategy in order. The first strategy that yields
/// a header row wins; a workbook whose sheets only carry headers produces an
/// empty table.
pub fn parse(path: &Path) -> Result<Table, ParseError> {
    for strategy in STRATEGIES {
        match strategy.read(path) {
            Ok(Some(table)) => {
                info!(strategy = strategy.name(), rows = table.row_count(), "workbook read");
                return Ok(table);
            }
            Ok(None) => debug!(strategy = strategy.name(), "workbook has no header row"),
            Err(e) => warn!(strategy = strategy.name(), error = %e, "workbook open failed"),
        }
    }
    Err(unreadable(path))
}

/// Scans sheets in file order and returns the first one with data rows,
/// falling back to the first sheet that at least has a header.
fn first_non_empty_sheet<RS: Read + Seek>(mut workbook: Sheets<RS>) -> Option<Table> {
    let mut header_only: Option<Table> = None;
    for name in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                warn!(sheet = %name, error = %e, "sheet unreadable");
                continue;
            }
        };
        let mut rows = range
            .rows()
            .skip_while(|row| row.iter().all(|c| matches!(c, Data::Empty)));
        let Some(header_row) = rows.next() else {
            continue;
        };
        let headers: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();
        let data: Vec<Vec<RawCell>> = rows
            .filter(|row| !row.iter().all(|c| matches!(c, Data::Empty)))
            .map(|row| row.iter().map(raw_cell).collect())
            .collect();
        let table = build_table(&headers, data);
        if !table.is_empty() {
            debug!(sheet = %name, "using sheet");
            return Some(table);
        }
        header_only.get_or_insert(table);
    }
    header_only
}

fn raw_cell(cell: &Data) -> RawCell {
    match cell {
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Float(f) => RawCell::Number(*f),
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Bool(b) => RawCell::Text(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()).map_or(RawCell::Empty, RawCell::Date),
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map_or_else(|| RawCell::Text(s.clone()), RawCell::Date),
        Data::DurationIso(s) => RawCell::Text(s.clone()),
        Data::Error(_) | Data::Empty => RawCell::Empty,
    }
}
