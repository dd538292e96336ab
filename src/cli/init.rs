use ledger_harvest::error::Result;
use ledger_harvest::settings::{
    load_settings_from, save_settings, settings_file_exists, settings_path, shellexpand_path,
    VerificationPolicy,
};

pub fn run(
    downloads_dir: Option<String>,
    output_dir: Option<String>,
    verification: Option<String>,
) -> Result<()> {
    let existed = settings_file_exists();
    // File values only; environment overrides are not persisted.
    let mut settings = load_settings_from(&settings_path());

    if let Some(dir) = downloads_dir {
        settings.downloads_dir = shellexpand_path(&dir);
    }
    if let Some(dir) = output_dir {
        settings.output_dir = shellexpand_path(&dir);
    }
    if let Some(policy) = verification {
        settings.verification = policy.parse::<VerificationPolicy>()?;
    }

    save_settings(&settings)?;
    std::fs::create_dir_all(settings.output_path())?;

    let verb = if existed { "Updated" } else { "Created" };
    println!("{verb} settings at {}", settings_path().display());
    println!("  downloads:    {}", settings.downloads_dir);
    println!("  output:       {}", settings.output_dir);
    println!("  verification: {:?}", settings.verification);
    Ok(())
}
