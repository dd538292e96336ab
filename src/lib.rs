//! Batch extraction of ledger reports from an accounting portal, with a
//! parser that works out what a downloaded "spreadsheet" really is.

pub mod amounts;
pub mod artifacts;
pub mod classifier;
pub mod delimited;
pub mod driver;
pub mod error;
pub mod export;
pub mod fmt;
pub mod html_report;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod planner;
pub mod session;
pub mod settings;
pub mod spreadsheet;
