pub mod classify;
pub mod export;
pub mod init;
pub mod latest;
pub mod parse;
pub mod plan;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ledger-harvest",
    about = "Extract ledger reports and make sense of whatever the portal downloads."
)]
pub struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the settings file, keeping existing values unless overridden.
    Init {
        /// Directory the browser downloads reports into
        #[arg(long = "downloads-dir")]
        downloads_dir: Option<String>,
        /// Directory exported datasets are written to
        #[arg(long = "output-dir")]
        output_dir: Option<String>,
        /// Landing page verification: lenient or strict
        #[arg(long)]
        verification: Option<String>,
    },
    /// Detect the real format of a downloaded report.
    Classify {
        /// Path to the downloaded file
        file: String,
    },
    /// Parse a downloaded report and print its company header and rows.
    Parse {
        /// Path to the downloaded file
        file: String,
        /// Maximum rows to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Parse a downloaded report and write it as a dataset.
    Export {
        /// Path to the downloaded file
        file: String,
        /// Output format: json or csv
        #[arg(long, default_value = "json")]
        format: String,
        /// Output file (default: <output_dir>/<name>_<timestamp>.<ext>)
        #[arg(long)]
        output: Option<String>,
    },
    /// Show the targets a batch would run, split into monthly windows.
    Plan {
        /// Company selector, repeatable
        #[arg(long = "company", required = true)]
        companies: Vec<String>,
        /// Account selector, repeatable
        #[arg(long = "account", required = true)]
        accounts: Vec<String>,
        /// Start date, DD/MM/YYYY
        #[arg(long)]
        from: String,
        /// End date, DD/MM/YYYY
        #[arg(long)]
        to: String,
        /// Output format passed to the report screen
        #[arg(long = "output-format", default_value = "EXCEL")]
        output_format: String,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent report in the downloads directory.
    Latest,
}
