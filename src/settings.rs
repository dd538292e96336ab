use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::artifacts::WatcherConfig;
use crate::error::{HarvestError, Result};

pub const ENV_DOWNLOADS_DIR: &str = "LEDGER_HARVEST_DOWNLOADS_DIR";
pub const ENV_OUTPUT_DIR: &str = "LEDGER_HARVEST_OUTPUT_DIR";
pub const ENV_ARTIFACT_TIMEOUT: &str = "LEDGER_HARVEST_ARTIFACT_TIMEOUT";
pub const ENV_VERIFICATION: &str = "LEDGER_HARVEST_VERIFICATION";

/// What to do when a landing page cannot be confirmed as the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationPolicy {
    /// Log a warning and carry on as if verification succeeded.
    #[default]
    Lenient,
    /// Treat an inconclusive check as a failure.
    Strict,
}

impl std::str::FromStr for VerificationPolicy {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(HarvestError::Settings(format!(
                "unknown verification policy '{other}' (expected lenient or strict)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_screenshots_dir")]
    pub screenshots_dir: String,
    #[serde(default = "default_artifact_timeout_secs")]
    pub artifact_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_recency_window_secs")]
    pub recency_window_secs: u64,
    #[serde(default = "default_artifact_extensions")]
    pub artifact_extensions: Vec<String>,
    #[serde(default = "default_monthly_split_min_days")]
    pub monthly_split_min_days: i64,
    #[serde(default)]
    pub verification: VerificationPolicy,
    #[serde(default)]
    pub portal_home_url: String,
    #[serde(default)]
    pub ledger_report_url: String,
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_downloads_dir() -> String {
    dirs::download_dir()
        .unwrap_or_else(|| home().join("Downloads"))
        .to_string_lossy()
        .to_string()
}

fn default_output_dir() -> String {
    home()
        .join("Documents")
        .join("ledger-harvest")
        .to_string_lossy()
        .to_string()
}

fn default_screenshots_dir() -> String {
    config_dir().join("screenshots").to_string_lossy().to_string()
}

fn default_artifact_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_recency_window_secs() -> u64 {
    120
}

fn default_artifact_extensions() -> Vec<String> {
    vec!["xls".to_string()]
}

fn default_monthly_split_min_days() -> i64 {
    32
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
            output_dir: default_output_dir(),
            screenshots_dir: default_screenshots_dir(),
            artifact_timeout_secs: default_artifact_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            recency_window_secs: default_recency_window_secs(),
            artifact_extensions: default_artifact_extensions(),
            monthly_split_min_days: default_monthly_split_min_days(),
            verification: VerificationPolicy::default(),
            portal_home_url: String::new(),
            ledger_report_url: String::new(),
        }
    }
}

impl Settings {
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            downloads_dir: PathBuf::from(shellexpand_path(&self.downloads_dir)),
            extensions: self
                .artifact_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            recency_window: Duration::from_secs(self.recency_window_secs),
            timeout: Duration::from_secs(self.artifact_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.output_dir))
    }
}

fn config_dir() -> PathBuf {
    home().join(".config").join("ledger-harvest")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Settings file merged with environment overrides. A missing or corrupt
/// file yields defaults.
pub fn load_settings() -> Settings {
    let settings = load_settings_from(&settings_path());
    apply_env_overrides(settings, |key| std::env::var(key).ok())
}

pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }
    let content = std::fs::read_to_string(path).unwrap_or_default();
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "settings file unreadable, using defaults");
        Settings::default()
    })
}

/// Environment values win over the file. Malformed values are logged and
/// ignored.
pub fn apply_env_overrides<F>(mut settings: Settings, lookup: F) -> Settings
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_DOWNLOADS_DIR).filter(|v| !v.is_empty()) {
        settings.downloads_dir = dir;
    }
    if let Some(dir) = lookup(ENV_OUTPUT_DIR).filter(|v| !v.is_empty()) {
        settings.output_dir = dir;
    }
    if let Some(raw) = lookup(ENV_ARTIFACT_TIMEOUT) {
        match raw.trim().parse::<u64>() {
            Ok(secs) => settings.artifact_timeout_secs = secs,
            Err(_) => warn!(var = ENV_ARTIFACT_TIMEOUT, value = %raw, "ignoring non-numeric timeout"),
        }
    }
    if let Some(raw) = lookup(ENV_VERIFICATION) {
        match raw.parse::<VerificationPolicy>() {
            Ok(policy) => settings.verification = policy,
            Err(e) => warn!(var = ENV_VERIFICATION, error = %e, "ignoring override"),
        }
    }
    settings
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(settings, &settings_path())
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| HarvestError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}
