use std::path::Path;

use tracing::{debug, info};

use crate::error::ParseError;
use crate::models::Table;
use crate::parser::{build_table, unreadable, RawCell};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

impl TextEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
        }
    }

    /// `None` when the bytes are not valid in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
                std::str::from_utf8(bytes).ok().map(str::to_string)
            }
            Self::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

pub const ENCODINGS: &[TextEncoding] = &[TextEncoding::Utf8, TextEncoding::Latin1];

pub const SEPARATORS: &[u8] = &[b',', b';', b'\t', b'|'];

/// Tries every (encoding, separator) pair in priority order and accepts the
/// first reading with more than one column and at least one data row.
pub fn parse(path: &Path) -> Result<Table, ParseError> {
    let bytes = std::fs::read(path)?;
    for encoding in ENCODINGS {
        let Some(text) = encoding.decode(&bytes) else {
            debug!(encoding = encoding.name(), "not decodable");
            continue;
        };
        for &sep in SEPARATORS {
            if let Some(table) = read_with(&text, sep) {
                info!(
                    encoding = encoding.name(),
                    separator = %(sep as char).escape_default(),
                    rows = table.row_count(),
                    "delimited text read"
                );
                return Ok(table);
            }
        }
    }
    Err(unreadable(path))
}

fn read_with(text: &str, sep: u8) -> Option<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sep)
        .from_reader(text.as_bytes());

    let mut records = rdr
        .records()
        .filter_map(|r| r.ok())
        .filter(|r| r.iter().any(|f| !f.trim().is_empty()));
    let header = records.next()?;
    if header.len() < 2 {
        return None;
    }
    let headers: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    let rows: Vec<Vec<RawCell>> = records
        .map(|r| r.iter().map(|f| RawCell::Text(f.trim().to_string())).collect())
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(build_table(&headers, rows))
}
