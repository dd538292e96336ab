use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unknown export format: {0}")]
    UnknownFormat(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, HarvestError>;

/// Words that show up in error pages served instead of a report.
pub const ERROR_VOCABULARY: &[&str] = &[
    "error",
    "session",
    "timeout",
    "expired",
    "invalid",
    "no se pudo",
    "problema",
    "access denied",
    "forbidden",
    "unauthorized",
];

/// Subset of [`ERROR_VOCABULARY`] that points at a lost or expired session.
pub const TRANSIENT_VOCABULARY: &[&str] = &[
    "session",
    "timeout",
    "expired",
    "access denied",
    "forbidden",
    "unauthorized",
];

/// Returns every vocabulary word found in `text`, in vocabulary order.
pub fn find_error_indicators(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    ERROR_VOCABULARY
        .iter()
        .filter(|word| lower.contains(*word))
        .map(|word| word.to_string())
        .collect()
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty")]
    Empty,

    #[error("{}", with_indicators("generic-html", .indicators))]
    GenericHtml { indicators: Vec<String> },

    #[error("{}", with_indicators("error-content", .indicators))]
    ErrorContent { indicators: Vec<String> },

    #[error("unrecognized")]
    Unrecognized,

    #[error("unreadable")]
    Unreadable,
}

fn with_indicators(reason: &str, indicators: &[String]) -> String {
    if indicators.is_empty() {
        reason.to_string()
    } else {
        format!("{reason}: {}", indicators.join(", "))
    }
}

impl ParseError {
    /// The reason string recorded verbatim in a failed result.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn indicators(&self) -> &[String] {
        match self {
            Self::GenericHtml { indicators } | Self::ErrorContent { indicators } => indicators,
            _ => &[],
        }
    }

    /// True when the payload looks like a session or authorization problem
    /// rather than a corrupt file, so a caller may retry the target.
    pub fn is_transient(&self) -> bool {
        self.indicators()
            .iter()
            .any(|i| TRANSIENT_VOCABULARY.contains(&i.as_str()))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("no element found for {role}")]
    ElementNotFound { role: String },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("verification failed: {0}")]
    Verification(String),
}

/// Per-target failure recorded inside an extraction result. Never raised
/// to the batch caller.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExtractionError {
    #[error("configuration failed: {0}")]
    Configuration(String),

    #[error("report generation failed: {0}")]
    Trigger(String),

    #[error("no-artifact")]
    ArtifactTimeout,

    #[error("{reason}")]
    Format { reason: String, transient: bool },

    #[error("navigation-interrupted")]
    NavigationInterrupted,
}

impl ExtractionError {
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl From<&ParseError> for ExtractionError {
    fn from(err: &ParseError) -> Self {
        Self::Format {
            reason: err.reason(),
            transient: err.is_transient(),
        }
    }
}
