mod cli;

use clap::Parser;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    ledger_harvest::logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Init {
            downloads_dir,
            output_dir,
            verification,
        } => cli::init::run(downloads_dir, output_dir, verification),
        Commands::Classify { file } => cli::classify::run(&file),
        Commands::Parse { file, limit } => cli::parse::run(&file, limit),
        Commands::Export {
            file,
            format,
            output,
        } => cli::export::run(&file, &format, output),
        Commands::Plan {
            companies,
            accounts,
            from,
            to,
            output_format,
            json,
        } => cli::plan::run(&companies, &accounts, &from, &to, &output_format, json),
        Commands::Latest => cli::latest::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
