//! Storage module for persisting sweep results
//!
//! This module handles every file the sweeper writes or resumes from:
//! - Line-oriented record outputs (metadata JSON lines, titles)
//! - The forbidden-ID side file
//! - Scanning existing outputs for resume and rescrape

mod forbidden;
mod index;
mod lines;
mod traits;

pub use forbidden::ForbiddenList;
pub use index::{
    last_indexed_id, line_id, load_indexed_ids, load_rescrape_entries, RescrapeEntry,
};
pub use lines::{temporary_path, LineSink, SinkMode};
pub use traits::{LineFormat, RecordSink, SinkError, SinkResult};

use crate::config::{Config, OutputMode};
use std::path::Path;

/// Output file and line format a session writes records to
///
/// Returns None for modes that write no records.
pub fn record_output(config: &Config) -> Option<(&Path, LineFormat)> {
    match config.session.mode {
        OutputMode::Metadata | OutputMode::Rescrape => {
            Some((config.output.metadata_path.as_path(), LineFormat::Metadata))
        }
        OutputMode::Titles => Some((config.output.titles_path.as_path(), LineFormat::Titles)),
        OutputMode::Assets => None,
    }
}
