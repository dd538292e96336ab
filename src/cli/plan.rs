use colored::Colorize;
use comfy_table::{Cell, Table};

use ledger_harvest::error::Result;
use ledger_harvest::models::SelectionCriteria;
use ledger_harvest::planner::{parse_range, plan_batches};
use ledger_harvest::settings::load_settings;

pub fn run(
    companies: &[String],
    accounts: &[String],
    from: &str,
    to: &str,
    output_format: &str,
    json: bool,
) -> Result<()> {
    let range = parse_range(from, to)?;
    let criteria = SelectionCriteria::new(range, output_format);
    let settings = load_settings();
    let plan = plan_batches(companies, accounts, &criteria, settings.monthly_split_min_days);

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    for batch in &plan {
        println!(
            "{} ({} - {})",
            batch.label.bold(),
            batch.window.from_portal(),
            batch.window.to_portal()
        );
        let mut table = Table::new();
        table.set_header(vec!["#", "Target", "Code"]);
        for (i, target) in batch.targets.iter().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(target.key()),
                Cell::new(target.code()),
            ]);
        }
        println!("{table}");
    }
    let total: usize = plan.iter().map(|b| b.targets.len()).sum();
    println!("{} windows, {} targets", plan.len(), total);
    Ok(())
}
