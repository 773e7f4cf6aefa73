//! End-of-run summary
//!
//! The summary is produced for every session, including ones ended by a
//! suspected ban or an interruption.

use crate::config::OutputMode;
use std::fmt;
use std::time::Duration;

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Every candidate was processed, or the range boundary was reached
    Completed,

    /// The blank-page ladder was exhausted for this ID
    BanSuspected { id: u64 },

    /// The session was interrupted by the operator
    Interrupted,

    /// A record or forbidden-list write failed
    SinkFailed(String),

    /// A worker task panicked
    TaskFailed(String),
}

impl Termination {
    /// Returns true if the session stopped before finishing its work
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::BanSuspected { .. } => "ban_suspected",
            Self::Interrupted => "interrupted",
            Self::SinkFailed(_) => "sink_failed",
            Self::TaskFailed(_) => "task_failed",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::BanSuspected { id } => write!(f, "stopped: IP ban suspected at ID {}", id),
            Self::Interrupted => f.write_str("interrupted by user"),
            Self::SinkFailed(e) => write!(f, "stopped: output write failed: {}", e),
            Self::TaskFailed(e) => write!(f, "stopped: worker task failed: {}", e),
        }
    }
}

/// Totals of one session
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: OutputMode,

    /// IDs selected for processing after resume and forbidden filtering
    pub candidates: u64,

    /// IDs whose outcome was committed
    pub attempted: u64,

    /// Pages classified as real entries
    pub found: u64,

    /// Deleted or access-denied entries
    pub removed: u64,

    /// Lines written to the record output
    pub records_written: u64,

    /// Existing lines kept unchanged during a rescrape
    pub carried_forward: u64,

    /// IDs added to the forbidden list
    pub forbidden_added: u64,

    pub network_errors: u64,

    /// Assets stored or already present on disk
    pub assets_acquired: u64,

    /// Assets not stored because of the storage budget
    pub assets_over_quota: u64,

    /// Bytes counted against the storage budget at the end of the session
    pub storage_used: u64,

    pub storage_budget: u64,

    /// Lowest boundary ID observed
    pub boundary: Option<u64>,

    pub elapsed: Duration,

    pub termination: Termination,
}

impl RunSummary {
    /// Empty summary for a session of the given mode
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            candidates: 0,
            attempted: 0,
            found: 0,
            removed: 0,
            records_written: 0,
            carried_forward: 0,
            forbidden_added: 0,
            network_errors: 0,
            assets_acquired: 0,
            assets_over_quota: 0,
            storage_used: 0,
            storage_budget: 0,
            boundary: None,
            elapsed: Duration::ZERO,
            termination: Termination::Completed,
        }
    }
}

/// Formats a duration as `HHh MMm SSs`, prefixed with `Nd` past one day
///
/// # Example
///
/// ```
/// use sumi_sweep::output::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(3725)), "01h 02m 05s");
/// assert_eq!(format_duration(Duration::from_secs(90_061)), "1d 01h 01m 01s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{}d {:02}h {:02}m {:02}s", days, hours, minutes, seconds)
    } else {
        format!("{:02}h {:02}m {:02}s", hours, minutes, seconds)
    }
}

/// Prints the summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("=== Sweep Summary ===\n");

    println!("Session:");
    println!("  Mode: {:?}", summary.mode);
    println!("  Result: {}", summary.termination);
    println!("  Elapsed: {}", format_duration(summary.elapsed));
    if let Some(boundary) = summary.boundary {
        println!("  Boundary reached at ID: {}", boundary);
    }
    println!();

    println!("IDs:");
    println!("  Candidates: {}", summary.candidates);
    println!("  Attempted: {}", summary.attempted);
    println!("  Found: {}", summary.found);
    println!("  Removed: {}", summary.removed);
    println!("  Network errors: {}", summary.network_errors);
    println!("  Added to forbidden list: {}", summary.forbidden_added);
    println!();

    if summary.mode.writes_records() {
        println!("Output:");
        println!("  Lines written: {}", summary.records_written);
        if summary.carried_forward > 0 {
            println!("  Lines carried forward: {}", summary.carried_forward);
        }
        println!();
    }

    if summary.storage_budget > 0 {
        let percentage = summary.storage_used as f64 / summary.storage_budget as f64 * 100.0;
        println!("Assets:");
        println!("  Acquired: {}", summary.assets_acquired);
        if summary.assets_over_quota > 0 {
            println!("  Skipped (storage limit): {}", summary.assets_over_quota);
        }
        println!(
            "  Storage: {:.2} MiB of {:.2} MiB ({:.1}%)",
            summary.storage_used as f64 / (1024.0 * 1024.0),
            summary.storage_budget as f64 / (1024.0 * 1024.0),
            percentage
        );
        println!();
    }
}
