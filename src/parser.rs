use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::amounts::{excel_serial_to_date, parse_amount, parse_portal_date};
use crate::classifier::{self, FormatClassification, InvalidReason};
use crate::error::ParseError;
use crate::models::{Cell, CompanyInfo, Table};
use crate::{delimited, html_report, spreadsheet};

// ---------------------------------------------------------------------------
// Column vocabulary
// ---------------------------------------------------------------------------

pub const DATE_HEADERS: &[&str] = &["FECHA", "DATE"];

pub const MONEY_HEADERS: &[&str] = &["DEBE", "HABER", "SALDO", "DEBIT", "CREDIT", "BALANCE"];

/// Header cells that mark the start of the ledger's data section.
pub const ACCOUNTING_HEADERS: &[&str] = &[
    "FECHA",
    "COMPROBANTE",
    "GLOSA",
    "DEBE",
    "HABER",
    "SALDO",
    "DATE",
    "VOUCHER",
    "DESCRIPTION",
    "DEBIT",
    "CREDIT",
    "BALANCE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    Money,
    Text,
}

pub fn column_kind(header: &str) -> ColumnKind {
    let h = header.trim();
    if DATE_HEADERS.iter().any(|d| h.eq_ignore_ascii_case(d)) {
        ColumnKind::Date
    } else if MONEY_HEADERS.iter().any(|m| h.eq_ignore_ascii_case(m)) {
        ColumnKind::Money
    } else {
        ColumnKind::Text
    }
}

pub fn is_accounting_header(cell: &str) -> bool {
    let c = cell.trim();
    ACCOUNTING_HEADERS.iter().any(|h| c.eq_ignore_ascii_case(h))
}

// ---------------------------------------------------------------------------
// Cell typing
// ---------------------------------------------------------------------------

/// A cell as read from the source, before column typing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Empty,
}

pub fn type_cell(kind: ColumnKind, raw: RawCell) -> Cell {
    match (kind, raw) {
        (ColumnKind::Money, RawCell::Text(s)) => Cell::Decimal(parse_amount(&s)),
        (ColumnKind::Money, RawCell::Number(f)) => Cell::Decimal(decimal_from_f64(f)),
        (ColumnKind::Money, _) => Cell::Decimal(Decimal::ZERO),

        (ColumnKind::Date, RawCell::Text(s)) => parse_portal_date(&s).map_or(Cell::Empty, Cell::Date),
        (ColumnKind::Date, RawCell::Number(f)) => excel_serial_to_date(f).map_or(Cell::Empty, Cell::Date),
        (ColumnKind::Date, RawCell::Date(d)) => Cell::Date(d),
        (ColumnKind::Date, RawCell::Empty) => Cell::Empty,

        (ColumnKind::Text, RawCell::Text(s)) if s.trim().is_empty() => Cell::Empty,
        (ColumnKind::Text, RawCell::Text(s)) => Cell::Text(s),
        (ColumnKind::Text, RawCell::Number(f)) => Cell::Decimal(decimal_from_f64(f)),
        (ColumnKind::Text, RawCell::Date(d)) => Cell::Date(d),
        (ColumnKind::Text, RawCell::Empty) => Cell::Empty,
    }
}

fn decimal_from_f64(f: f64) -> Decimal {
    Decimal::try_from(f).unwrap_or(Decimal::ZERO)
}

/// Builds a typed table: column kinds come from the header names, rows are
/// padded or truncated to the header width.
pub fn build_table<I>(headers: &[String], rows: I) -> Table
where
    I: IntoIterator<Item = Vec<RawCell>>,
{
    let mut table = Table::new(headers);
    let kinds: Vec<ColumnKind> = headers.iter().map(|h| column_kind(h)).collect();
    for mut raw in rows {
        raw.resize(kinds.len(), RawCell::Empty);
        let cells = kinds
            .iter()
            .zip(raw)
            .map(|(kind, cell)| type_cell(*kind, cell))
            .collect();
        table.push_row(cells);
    }
    table
}

// ---------------------------------------------------------------------------
// classify_and_parse
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedReport {
    pub classification: FormatClassification,
    pub table: Table,
    pub company_info: CompanyInfo,
}

/// Determines the real format of `path` and parses it into a typed table.
/// An empty table is a valid outcome; only unclassifiable or unreadable
/// payloads are errors.
pub fn classify_and_parse(path: &Path) -> Result<ParsedReport, ParseError> {
    let classification = classifier::classify(path)?;
    let (table, company_info) = match &classification {
        FormatClassification::BinarySpreadsheet => {
            (spreadsheet::parse(path)?, CompanyInfo::default())
        }
        FormatClassification::HtmlDisguisedSpreadsheet => html_report::parse(path)?,
        FormatClassification::DelimitedText => (delimited::parse(path)?, CompanyInfo::default()),
        FormatClassification::Invalid(reason) => {
            let err = rejection(reason);
            warn!(path = %path.display(), reason = %err, "artifact rejected");
            return Err(err);
        }
    };
    info!(
        path = %path.display(),
        %classification,
        rows = table.row_count(),
        columns = table.column_count(),
        "parsed artifact"
    );
    Ok(ParsedReport {
        classification,
        table,
        company_info,
    })
}

fn rejection(reason: &InvalidReason) -> ParseError {
    match reason {
        InvalidReason::Empty => ParseError::Empty,
        InvalidReason::GenericHtml(indicators) => ParseError::GenericHtml {
            indicators: indicators.clone(),
        },
        InvalidReason::ErrorContent(indicators) => ParseError::ErrorContent {
            indicators: indicators.clone(),
        },
        InvalidReason::Unrecognized => ParseError::Unrecognized,
    }
}

/// Error for a payload no strategy could read: vendor error vocabulary in
/// the header window wins over the generic "unreadable".
pub(crate) fn unreadable(path: &Path) -> ParseError {
    let indicators = classifier::read_header_window(path)
        .map(|h| crate::error::find_error_indicators(&String::from_utf8_lossy(&h)))
        .unwrap_or_default();
    if indicators.is_empty() {
        ParseError::Unreadable
    } else {
        ParseError::ErrorContent { indicators }
    }
}
