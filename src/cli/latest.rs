use std::collections::HashSet;

use ledger_harvest::artifacts::DownloadWatcher;
use ledger_harvest::classifier::classify;
use ledger_harvest::error::Result;
use ledger_harvest::settings::load_settings;

pub fn run() -> Result<()> {
    let config = load_settings().watcher_config();
    let dir = config.downloads_dir.clone();
    let window = config.recency_window.as_secs();
    let watcher = DownloadWatcher::new(config);

    match watcher.latest(&HashSet::new()) {
        Some(path) => {
            let classification = classify(&path)?;
            println!("{} ({classification})", path.display());
        }
        None => println!(
            "No report in {} from the last {window} seconds.",
            dir.display()
        ),
    }
    Ok(())
}
