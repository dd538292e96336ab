use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

/// Produces the locally materialized file for a report that was just
/// triggered.
pub trait ArtifactSource {
    /// Blocks until an artifact not in `consumed` appears or the source's
    /// own timeout elapses.
    fn await_artifact(&mut self, consumed: &HashSet<PathBuf>) -> Option<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub downloads_dir: PathBuf,
    /// Extension prefixes, lowercase; `xls` matches `.xls` and `.xlsx`.
    pub extensions: Vec<String>,
    pub recency_window: Duration,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// Polls a downloads directory for the newest matching file.
pub struct DownloadWatcher {
    config: WatcherConfig,
}

impl DownloadWatcher {
    pub fn new(config: WatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Most recently created matching file inside the recency window, if
    /// any. Files in `consumed` are skipped.
    pub fn latest(&self, consumed: &HashSet<PathBuf>) -> Option<PathBuf> {
        let now = SystemTime::now();
        let entries = match std::fs::read_dir(&self.config.downloads_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.config.downloads_dir.display(), error = %e, "cannot read downloads dir");
                return None;
            }
        };

        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && self.matches_extension(p) && !consumed.contains(p))
            .filter_map(|p| created_at(&p).map(|t| (p, t)))
            .filter(|(_, created)| {
                now.duration_since(*created)
                    .map_or(true, |age| age <= self.config.recency_window)
            })
            .max_by_key(|(_, created)| *created)
            .map(|(p, _)| p)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        self.config.extensions.iter().any(|prefix| ext.starts_with(prefix.as_str()))
    }
}

impl ArtifactSource for DownloadWatcher {
    fn await_artifact(&mut self, consumed: &HashSet<PathBuf>) -> Option<PathBuf> {
        let deadline = Instant::now() + self.config.timeout;
        loop {
            if let Some(path) = self.latest(consumed) {
                info!(path = %path.display(), "artifact found");
                return Some(path);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(timeout_secs = self.config.timeout.as_secs(), "no artifact before timeout");
                return None;
            }
            debug!("waiting for artifact");
            std::thread::sleep(self.config.poll_interval.min(deadline - now));
        }
    }
}

fn created_at(path: &Path) -> Option<SystemTime> {
    let meta = std::fs::metadata(path).ok()?;
    meta.created().or_else(|_| meta.modified()).ok()
}
