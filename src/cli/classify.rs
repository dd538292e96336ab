use std::path::Path;

use colored::Colorize;

use ledger_harvest::classifier::{classify, FormatClassification};
use ledger_harvest::error::Result;

pub fn run(file: &str) -> Result<()> {
    let path = Path::new(file);
    let classification = classify(path)?;
    let label = match &classification {
        FormatClassification::Invalid(_) => classification.to_string().red().bold(),
        _ => classification.to_string().green().bold(),
    };
    println!("{}: {label}", path.display());
    Ok(())
}
