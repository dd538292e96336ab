use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::models::PORTAL_DATE_FORMAT;

fn portal_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}").expect("invalid date regex"))
}

fn tax_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\d{1,8}-[\dk]").expect("invalid tax id regex"))
}

/// Cell text begins with a `DD/MM/YYYY` date.
pub fn looks_like_date(raw: &str) -> bool {
    portal_date_re().is_match(raw.trim())
}

/// Cell text begins with a local tax id (`12345678-K`).
pub fn looks_like_tax_id(raw: &str) -> bool {
    tax_id_re().is_match(raw.trim())
}

/// Parses monetary text such as `"$1.234,56-"` or `"(500)"`. Anything that
/// cannot be read as a number becomes zero.
pub fn parse_amount(raw: &str) -> Decimal {
    let trimmed = raw.trim();
    let negative = trimmed.ends_with('-')
        || trimmed.starts_with('-')
        || (trimmed.starts_with('(') && trimmed.ends_with(')'));

    let kept: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return Decimal::ZERO;
    }

    let normalized = normalize_separators(&kept);
    let value = Decimal::from_str(&normalized).unwrap_or(Decimal::ZERO);
    if negative {
        -value
    } else {
        value
    }
}

/// Rewrites digits with `.`/`,` separators into a plain `1234.56` string.
fn normalize_separators(s: &str) -> String {
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');
    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (None, Some(_)) => {
            if s.matches(',').count() == 1 && s.len() - s.rfind(',').unwrap_or(0) - 1 <= 2 {
                Some(',')
            } else {
                None
            }
        }
        (Some(d), None) => {
            let single = s.matches('.').count() == 1;
            if single && s.len() - d - 1 != 3 {
                Some('.')
            } else {
                None
            }
        }
        (None, None) => None,
    };

    let mut out = String::with_capacity(s.len());
    let mut seen_decimal = false;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() {
            out.push(c);
        } else if Some(c) == decimal_sep && Some(i) == s.rfind(c) && !seen_decimal {
            out.push('.');
            seen_decimal = true;
        }
    }
    out
}

/// Parses a portal date (`DD/MM/YYYY`). Invalid calendar dates are `None`.
pub fn parse_portal_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), PORTAL_DATE_FORMAT).ok()
}

/// Largest serial Excel itself accepts (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Converts an Excel day serial to a date. Non-finite, negative or
/// out-of-range serials are `None`.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(0.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::try_days(serial as i64)?)
}
