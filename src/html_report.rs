//! Parser for the portal's ledger export: an Office-HTML document saved with
//! a spreadsheet extension.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::amounts::{looks_like_date, looks_like_tax_id};
use crate::error::ParseError;
use crate::models::{CompanyInfo, Table};
use crate::parser::{build_table, is_accounting_header, RawCell};

/// Leading rows scanned for company labels.
const COMPANY_INFO_ROWS: usize = 10;

/// A header row must be at least this wide.
const MIN_HEADER_CELLS: usize = 6;

const OPENING_BALANCE_MARKER: &str = "ACUMULACION ANTERIOR";
const TOTAL_MARKER: &str = "TOTAL";

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("invalid ws regex"))
}

pub fn parse(path: &Path) -> Result<(Table, CompanyInfo), ParseError> {
    let bytes = std::fs::read(path)?;
    parse_html(&String::from_utf8_lossy(&bytes))
}

pub fn parse_html(html: &str) -> Result<(Table, CompanyInfo), ParseError> {
    let document = Html::parse_document(html);
    let rows = ledger_rows(&document).ok_or(ParseError::Unreadable)?;

    let company_info = extract_company_info(&rows);
    debug!(?company_info, "company header");

    let Some(header_idx) = rows
        .iter()
        .position(|r| r.len() >= MIN_HEADER_CELLS && r.iter().any(|c| is_accounting_header(c)))
    else {
        return Err(ParseError::Unreadable);
    };
    let headers = rows[header_idx].clone();
    info!(?headers, "ledger headers found");

    let data = rows[header_idx + 1..]
        .iter()
        .filter(|r| is_data_row(r))
        .map(|r| {
            r.iter()
                .take(headers.len())
                .map(|c| RawCell::Text(c.clone()))
                .collect::<Vec<_>>()
        });
    let table = build_table(&headers, data);
    info!(rows = table.row_count(), "ledger rows extracted");
    Ok((table, company_info))
}

/// Text of every row of the bordered data table, whitespace-normalized.
fn ledger_rows(document: &Html) -> Option<Vec<Vec<String>>> {
    let table_sel = Selector::parse(r#"table[border="1"]"#).ok()?;
    let row_sel = Selector::parse("tr").ok()?;
    let cell_sel = Selector::parse("td, th").ok()?;

    let table = document.select(&table_sel).next()?;
    let rows = table
        .select(&row_sel)
        .map(|row| row.select(&cell_sel).map(cell_text).collect())
        .collect();
    Some(rows)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    let raw: String = cell.text().collect();
    ws_re().replace_all(raw.trim(), " ").into_owned()
}

fn extract_company_info(rows: &[Vec<String>]) -> CompanyInfo {
    let mut info = CompanyInfo::default();
    for row in rows.iter().take(COMPANY_INFO_ROWS) {
        if row.len() < 2 {
            continue;
        }
        let value = Some(row[1].clone()).filter(|v| !v.is_empty());
        match row[0].trim_end_matches(':').trim() {
            "Nombre" => info.name = value,
            "Rut" => info.tax_id = value,
            "Dirección" => info.address = value,
            "Representante Legal" => info.legal_representative = value,
            "Giro Comercial" => info.business_activity = value,
            _ => {}
        }
    }
    info
}

/// Dated movements, per-counterpart rows (tax id in the third cell), and
/// opening-balance or total rows are kept; everything else is layout.
pub fn is_data_row(row: &[String]) -> bool {
    if row.iter().all(|c| c.is_empty()) {
        return false;
    }
    if row.first().is_some_and(|c| looks_like_date(c)) {
        return true;
    }
    if row.get(2).is_some_and(|c| looks_like_tax_id(c)) {
        return true;
    }
    let joined = row.join(" ").to_uppercase();
    joined.contains(OPENING_BALANCE_MARKER) || joined.contains(TOTAL_MARKER)
}
