use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ExtractionError;

pub const PORTAL_DATE_FORMAT: &str = "%d/%m/%Y";

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A typed cell. `Empty` stands in for missing or unparseable dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Date(NaiveDate),
    Decimal(Decimal),
    Text(String),
    Empty,
}

impl Cell {
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Plain rendering used for CSV output and terminal tables.
    pub fn display(&self) -> String {
        match self {
            Self::Date(d) => d.format(PORTAL_DATE_FORMAT).to_string(),
            Self::Decimal(d) => d.normalize().to_string(),
            Self::Text(s) => s.clone(),
            Self::Empty => String::new(),
        }
    }
}

/// Rectangular dataset. Every row has exactly `columns.len()` cells; rows
/// are padded with [`Cell::Empty`] or truncated on insert.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Builds an empty table. Blank header names become `column_N` and
    /// repeated names get a `_2`, `_3`… suffix so names stay unique.
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut columns: Vec<String> = Vec::with_capacity(headers.len());
        for (i, raw) in headers.iter().enumerate() {
            let base = raw.as_ref().trim();
            let base = if base.is_empty() {
                format!("column_{}", i + 1)
            } else {
                base.to_string()
            };
            let mut name = base.clone();
            let mut n = 2;
            while columns.contains(&name) {
                name = format!("{base}_{n}");
                n += 1;
            }
            columns.push(name);
        }
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, mut cells: Vec<Cell>) {
        cells.resize(self.columns.len(), Cell::Empty);
        self.rows.push(cells);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn is_rectangular(&self) -> bool {
        self.rows.iter().all(|r| r.len() == self.columns.len())
    }

    /// Sum of a decimal column; non-decimal cells count as zero.
    pub fn column_total(&self, name: &str) -> Option<Decimal> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .filter_map(|r| r[idx].as_decimal())
                .sum(),
        )
    }
}

/// Header metadata of a ledger export; provenance, never data rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CompanyInfo {
    pub name: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub legal_representative: Option<String>,
    pub business_activity: Option<String>,
}

impl CompanyInfo {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.tax_id.is_none()
            && self.address.is_none()
            && self.legal_representative.is_none()
            && self.business_activity.is_none()
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days()
    }

    pub fn from_portal(&self) -> String {
        self.from.format(PORTAL_DATE_FORMAT).to_string()
    }

    pub fn to_portal(&self) -> String {
        self.to.format(PORTAL_DATE_FORMAT).to_string()
    }
}

/// Selection criteria shared by every target in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionCriteria {
    pub date_range: DateRange,
    /// Forwarded unchanged to the configuration collaborator.
    pub output_format: String,
    /// Additional dropdowns keyed by their label, applied before dates.
    pub extra_selections: BTreeMap<String, String>,
}

impl SelectionCriteria {
    pub fn new(date_range: DateRange, output_format: &str) -> Self {
        Self {
            date_range,
            output_format: output_format.to_string(),
            extra_selections: BTreeMap::new(),
        }
    }
}

/// One (company, account) unit of work. Identity is the pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionTarget {
    pub company: String,
    pub account: String,
    pub criteria: SelectionCriteria,
}

impl ExtractionTarget {
    pub fn key(&self) -> String {
        format!("{} - {}", self.company, self.account)
    }

    /// File-name friendly code: first token of each selector.
    pub fn code(&self) -> String {
        let company = match self.company.split_once(',') {
            Some((head, _)) => head.trim(),
            None => self.company.split(' ').next().unwrap_or(""),
        };
        let account = self.account.split(' ').next().unwrap_or("");
        format!("{company}_{account}").replace(['-', '/'], "_")
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extracted {
    pub table: Table,
    pub company_info: CompanyInfo,
    pub artifact_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded(Extracted),
    Failed {
        error: ExtractionError,
        artifact_path: Option<PathBuf>,
    },
    /// The batch was stopped before this target was reached.
    NotAttempted,
}

/// Outcome of one target. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub target: ExtractionTarget,
    pub outcome: Outcome,
}

impl ExtractionResult {
    pub fn succeeded(target: ExtractionTarget, extracted: Extracted) -> Self {
        Self {
            target,
            outcome: Outcome::Succeeded(extracted),
        }
    }

    pub fn failed(
        target: ExtractionTarget,
        error: ExtractionError,
        artifact_path: Option<PathBuf>,
    ) -> Self {
        Self {
            target,
            outcome: Outcome::Failed {
                error,
                artifact_path,
            },
        }
    }

    pub fn not_attempted(target: ExtractionTarget) -> Self {
        Self {
            target,
            outcome: Outcome::NotAttempted,
        }
    }

    pub fn key(&self) -> String {
        self.target.key()
    }

    pub fn success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    pub fn table(&self) -> Option<&Table> {
        match &self.outcome {
            Outcome::Succeeded(e) => Some(&e.table),
            _ => None,
        }
    }

    pub fn artifact_path(&self) -> Option<&PathBuf> {
        match &self.outcome {
            Outcome::Succeeded(e) => Some(&e.artifact_path),
            Outcome::Failed { artifact_path, .. } => artifact_path.as_ref(),
            Outcome::NotAttempted => None,
        }
    }

    pub fn error(&self) -> Option<&ExtractionError> {
        match &self.outcome {
            Outcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.table().map_or(0, Table::row_count)
    }

    pub fn column_count(&self) -> usize {
        self.table().map_or(0, Table::column_count)
    }
}

/// Derived view over a batch's results; recomputed, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
}

impl BatchSummary {
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a ExtractionResult>,
    {
        let (mut total, mut succeeded, mut failed) = (0usize, 0usize, 0usize);
        for r in results {
            total += 1;
            match r.outcome {
                Outcome::Succeeded(_) => succeeded += 1,
                Outcome::Failed { .. } => failed += 1,
                Outcome::NotAttempted => {}
            }
        }
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64 * 100.0
        };
        Self {
            total,
            succeeded,
            failed,
            success_rate,
        }
    }

    pub fn not_attempted(&self) -> usize {
        self.total - self.succeeded - self.failed
    }
}
