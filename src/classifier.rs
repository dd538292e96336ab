use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::find_error_indicators;

/// Bytes read from the head of an artifact when classifying it.
pub const HEADER_WINDOW: usize = 2048;

const OLE2_SIGNATURE: &[u8] = b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1";
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
const BIFF_SIGNATURE: &[u8] = b"\x09\x08\x06\x00\x00\x00\x10\x00";

/// Markers of the portal's Office-HTML ledger export, which it serves with
/// a spreadsheet extension.
pub const VENDOR_MARKERS: &[&str] = &[
    "xmlns:x=\"urn:schemas-microsoft-com:office:excel\"",
    "<x:ExcelWorkbook>",
    "<x:ExcelWorksheets>",
    "LIBRO MAYOR DESDE",
];

const HTML_MARKERS: &[&str] = &["<html", "<!doctype", "<head>", "<body>", "<title>", "<table"];

const SEPARATORS: &[char] = &[',', ';', '\t', '|'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "indicators", rename_all = "kebab-case")]
pub enum InvalidReason {
    Empty,
    GenericHtml(Vec<String>),
    ErrorContent(Vec<String>),
    Unrecognized,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::GenericHtml(_) => write!(f, "generic-html"),
            Self::ErrorContent(found) => write!(f, "error-content: {}", found.join(", ")),
            Self::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", content = "detail")]
pub enum FormatClassification {
    BinarySpreadsheet,
    HtmlDisguisedSpreadsheet,
    DelimitedText,
    Invalid(InvalidReason),
}

impl fmt::Display for FormatClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BinarySpreadsheet => write!(f, "BinarySpreadsheet"),
            Self::HtmlDisguisedSpreadsheet => write!(f, "HtmlDisguisedSpreadsheet"),
            Self::DelimitedText => write!(f, "DelimitedText"),
            Self::Invalid(reason) => write!(f, "Invalid({reason})"),
        }
    }
}

/// Reads at most [`HEADER_WINDOW`] bytes from the start of `path`.
pub fn read_header_window(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut buf = Vec::with_capacity(HEADER_WINDOW);
    file.take(HEADER_WINDOW as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn classify(path: &Path) -> std::io::Result<FormatClassification> {
    let header = read_header_window(path)?;
    let classification = classify_bytes(&header);
    debug!(path = %path.display(), %classification, "classified artifact");
    Ok(classification)
}

/// Classifies a header window. Checks run in a fixed order: binary
/// signature, vendor Office-HTML markers, generic HTML, delimited text.
pub fn classify_bytes(header: &[u8]) -> FormatClassification {
    if header.iter().all(|b| b.is_ascii_whitespace()) {
        return FormatClassification::Invalid(InvalidReason::Empty);
    }
    if has_spreadsheet_signature(header) {
        return FormatClassification::BinarySpreadsheet;
    }

    let text = String::from_utf8_lossy(header);
    if VENDOR_MARKERS.iter().any(|m| text.contains(m)) {
        return FormatClassification::HtmlDisguisedSpreadsheet;
    }

    let lower = text.to_lowercase();
    if HTML_MARKERS.iter().any(|m| lower.contains(m)) {
        return FormatClassification::Invalid(InvalidReason::GenericHtml(
            find_error_indicators(&text),
        ));
    }

    if looks_delimited(&text) {
        return FormatClassification::DelimitedText;
    }

    let indicators = find_error_indicators(&text);
    if indicators.is_empty() {
        FormatClassification::Invalid(InvalidReason::Unrecognized)
    } else {
        FormatClassification::Invalid(InvalidReason::ErrorContent(indicators))
    }
}

pub fn has_spreadsheet_signature(header: &[u8]) -> bool {
    [OLE2_SIGNATURE, ZIP_SIGNATURE, BIFF_SIGNATURE]
        .iter()
        .any(|sig| header.starts_with(sig))
}

/// The first non-blank line carries at least one candidate separator.
fn looks_delimited(text: &str) -> bool {
    let text = text.trim_start_matches('\u{feff}');
    let Some(first) = text.lines().find(|l| !l.trim().is_empty()) else {
        return false;
    };
    SEPARATORS.iter().any(|sep| first.contains(*sep))
}
