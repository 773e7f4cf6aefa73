//! Output module for run summaries and reports
//!
//! This module handles:
//! - The end-of-run summary printed after every session
//! - Offline analysis of metadata outputs

pub mod analysis;
mod summary;

pub use analysis::{
    analyze_file, analyze_records, print_report, resolve_tags, save_matches, AdultFilter,
    AnalysisFilter, AnalysisReport, MatchedRecord,
};
pub use summary::{format_duration, print_summary, RunSummary, Termination};
