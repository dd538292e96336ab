use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{HarvestError, Result};
use crate::models::{CompanyInfo, ExtractionResult, Outcome, SelectionCriteria, Table};

// ---------------------------------------------------------------------------
// Handoff
// ---------------------------------------------------------------------------

/// A completed dataset as passed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetHandoff {
    pub origin_file_name: String,
    pub origin_sha256: String,
    pub extracted_at: DateTime<Utc>,
    pub criteria: Option<SelectionCriteria>,
    pub company_info: CompanyInfo,
    pub row_count: usize,
    pub table: Table,
}

impl DatasetHandoff {
    pub fn new(
        table: Table,
        company_info: CompanyInfo,
        origin: &Path,
        criteria: Option<SelectionCriteria>,
        extracted_at: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            origin_file_name: file_name(origin),
            origin_sha256: compute_checksum(origin)?,
            extracted_at,
            criteria,
            company_info,
            row_count: table.row_count(),
            table,
        })
    }

    /// Handoff for a successful result; `None` for anything else.
    pub fn from_result(result: &ExtractionResult, extracted_at: DateTime<Utc>) -> Result<Option<Self>> {
        let Outcome::Succeeded(extracted) = &result.outcome else {
            return Ok(None);
        };
        Self::new(
            extracted.table.clone(),
            extracted.company_info.clone(),
            &extracted.artifact_path,
            Some(result.target.criteria.clone()),
            extracted_at,
        )
        .map(Some)
    }

    /// Origin stem plus extraction time, safe for file names.
    pub fn file_stem(&self) -> String {
        let stem = Path::new(&self.origin_file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "report".to_string());
        let stem: String = stem
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{stem}_{}", self.extracted_at.format("%Y%m%d_%H%M%S"))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receives completed datasets. Schema checks beyond a rectangular, typed
/// table are the sink's business.
pub trait DatasetSink {
    fn deliver(&mut self, handoff: &DatasetHandoff) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Whole handoff document.
    Json,
    /// Table only.
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(HarvestError::UnknownFormat(other.to_string())),
        }
    }
}

/// Writes each handoff as one file in a directory.
pub struct FileSink {
    dir: PathBuf,
    format: ExportFormat,
    written: Vec<PathBuf>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, format: ExportFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn path_for(&self, handoff: &DatasetHandoff) -> PathBuf {
        self.dir
            .join(format!("{}.{}", handoff.file_stem(), self.format.extension()))
    }
}

impl DatasetSink for FileSink {
    fn deliver(&mut self, handoff: &DatasetHandoff) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(handoff);
        write_handoff(handoff, self.format, &path)?;
        info!(path = %path.display(), rows = handoff.row_count, "dataset written");
        self.written.push(path);
        Ok(())
    }
}

pub fn write_handoff(handoff: &DatasetHandoff, format: ExportFormat, path: &Path) -> Result<()> {
    match format {
        ExportFormat::Json => {
            let json = serde_json::to_string_pretty(handoff)?;
            std::fs::write(path, format!("{json}\n"))?;
        }
        ExportFormat::Csv => write_table_csv(&handoff.table, path)?,
    }
    Ok(())
}

pub fn write_table_csv(table: &Table, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(table.columns())?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(|c| c.display()))?;
    }
    wtr.flush()?;
    Ok(())
}
