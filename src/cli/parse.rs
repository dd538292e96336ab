use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use ledger_harvest::error::Result;
use ledger_harvest::fmt::money;
use ledger_harvest::models::{self, CompanyInfo};
use ledger_harvest::parser::classify_and_parse;

pub fn run(file: &str, limit: usize) -> Result<()> {
    let report = classify_and_parse(Path::new(file))?;
    println!("Format: {}", report.classification.to_string().bold());

    if !report.company_info.is_empty() {
        print_company(&report.company_info);
    }

    let data = &report.table;
    let mut table = Table::new();
    table.set_header(data.columns().to_vec());
    for row in data.rows().iter().take(limit) {
        table.add_row(row.iter().map(render_cell));
    }
    println!("{table}");

    let shown = data.row_count().min(limit);
    println!(
        "{} of {} rows, {} columns",
        shown,
        data.row_count(),
        data.column_count()
    );
    for column in ["DEBE", "HABER"] {
        if let Some(total) = data.column_total(column) {
            println!("{column} total: {}", money(total));
        }
    }
    Ok(())
}

fn print_company(info: &CompanyInfo) {
    let mut table = Table::new();
    table.set_header(vec!["Company", ""]);
    let fields = [
        ("Name", &info.name),
        ("Tax ID", &info.tax_id),
        ("Address", &info.address),
        ("Legal representative", &info.legal_representative),
        ("Activity", &info.business_activity),
    ];
    for (label, value) in fields {
        if let Some(v) = value {
            table.add_row(vec![Cell::new(label), Cell::new(v)]);
        }
    }
    println!("{table}");
}

fn render_cell(cell: &models::Cell) -> Cell {
    match cell {
        models::Cell::Decimal(d) => Cell::new(money(*d)).set_alignment(CellAlignment::Right),
        other => Cell::new(other.display()),
    }
}
