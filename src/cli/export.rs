use std::path::{Path, PathBuf};

use chrono::Utc;

use ledger_harvest::error::Result;
use ledger_harvest::export::{write_handoff, DatasetHandoff, DatasetSink, ExportFormat, FileSink};
use ledger_harvest::parser::classify_and_parse;
use ledger_harvest::settings::load_settings;

pub fn run(file: &str, format: &str, output: Option<String>) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let origin = Path::new(file);
    let report = classify_and_parse(origin)?;
    let handoff = DatasetHandoff::new(report.table, report.company_info, origin, None, Utc::now())?;

    let path = match output {
        Some(out) => {
            let path = PathBuf::from(out);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            write_handoff(&handoff, format, &path)?;
            path
        }
        None => {
            let mut sink = FileSink::new(load_settings().output_path(), format);
            sink.deliver(&handoff)?;
            sink.path_for(&handoff)
        }
    };

    println!(
        "Exported {} rows from {} to {}",
        handoff.row_count,
        handoff.origin_file_name,
        path.display()
    );
    Ok(())
}
