use std::collections::HashSet;

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::amounts::parse_portal_date;
use crate::error::{HarvestError, Result};
use crate::models::{DateRange, ExtractionTarget, SelectionCriteria};

const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// Cross product of companies and accounts, company-major: every account of
/// the first company, then every account of the second.
pub fn build_targets(
    companies: &[String],
    accounts: &[String],
    criteria: &SelectionCriteria,
) -> Vec<ExtractionTarget> {
    let accounts = unique(accounts);
    unique(companies)
        .into_iter()
        .flat_map(|company| {
            accounts.iter().map(move |account| ExtractionTarget {
                company: company.to_string(),
                account: account.to_string(),
                criteria: criteria.clone(),
            })
        })
        .collect()
}

/// Drops repeated entries, keeping the first occurrence.
fn unique(items: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(String::as_str)
        .filter(|item| seen.insert(*item))
        .collect()
}

pub fn should_split_monthly(range: &DateRange, min_days: i64) -> bool {
    range.days() >= min_days
}

/// Consecutive windows one calendar month long. Each window ends where the
/// next begins and the last one ends at the range end. A range that does
/// not move forward comes back as a single window.
pub fn monthly_windows(range: &DateRange) -> Vec<DateRange> {
    if range.from >= range.to {
        return vec![*range];
    }
    let mut windows = Vec::new();
    let mut start = range.from;
    while start < range.to {
        let end = start
            .checked_add_months(Months::new(1))
            .map_or(range.to, |next| next.min(range.to));
        windows.push(DateRange::new(start, end));
        start = end;
    }
    debug!(count = windows.len(), "monthly windows generated");
    windows
}

/// Spanish month and year of the window start, e.g. "Enero 2025".
pub fn window_label(window: &DateRange) -> String {
    let month = MONTH_NAMES[window.from.month0() as usize];
    format!("{month} {}", window.from.year())
}

/// One batch of targets sharing a date window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedBatch {
    pub label: String,
    pub window: DateRange,
    pub targets: Vec<ExtractionTarget>,
}

/// Splits long ranges into monthly batches; shorter ranges give one batch.
pub fn plan_batches(
    companies: &[String],
    accounts: &[String],
    criteria: &SelectionCriteria,
    min_days: i64,
) -> Vec<PlannedBatch> {
    let range = criteria.date_range;
    let windows = if should_split_monthly(&range, min_days) {
        monthly_windows(&range)
    } else {
        vec![range]
    };
    info!(
        windows = windows.len(),
        targets_per_window = companies.len() * accounts.len(),
        "extraction planned"
    );
    windows
        .into_iter()
        .map(|window| {
            let mut windowed = criteria.clone();
            windowed.date_range = window;
            PlannedBatch {
                label: window_label(&window),
                window,
                targets: build_targets(companies, accounts, &windowed),
            }
        })
        .collect()
}

/// Parses a `DD/MM/YYYY` pair into a forward range.
pub fn parse_range(from: &str, to: &str) -> Result<DateRange> {
    let parse = |raw: &str| -> Result<NaiveDate> {
        parse_portal_date(raw).ok_or_else(|| HarvestError::InvalidDate(raw.to_string()))
    };
    let range = DateRange::new(parse(from)?, parse(to)?);
    if range.to < range.from {
        return Err(HarvestError::InvalidDate(format!(
            "{to} is before {from}"
        )));
    }
    Ok(range)
}
