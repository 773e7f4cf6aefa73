//! Scanning existing outputs
//!
//! Existing outputs are the only record of earlier sessions. This module
//! recovers from them:
//! - The set of IDs already indexed (resume)
//! - The highest indexed ID (continue from last)
//! - The entry list of a metadata output (rescrape)
//!
//! Malformed lines are ignored when indexing and kept verbatim when rescraping.

use crate::record::{parse_id, PublicationStatus};
use crate::storage::traits::{LineFormat, SinkError, SinkResult};
use std::collections::HashSet;
use std::path::Path;

/// ID of one output line, if it carries one
///
/// Metadata lines are JSON objects with an `id` field (string or number).
/// Titles lines end with `", <id>"`.
pub fn line_id(line: &str, format: LineFormat) -> Option<u64> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match format {
        LineFormat::Metadata => {
            let value: serde_json::Value = serde_json::from_str(line).ok()?;
            match value.get("id")? {
                serde_json::Value::String(id) => parse_id(id),
                serde_json::Value::Number(id) => id.as_u64(),
                _ => None,
            }
        }
        LineFormat::Titles => {
            let (_, id) = line.rsplit_once(", ")?;
            parse_id(id)
        }
    }
}

/// Reads an output's lines; a missing file has none
fn read_lines(path: &Path) -> SinkResult<Option<Vec<String>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect(),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SinkError::io(path, e)),
    }
}

/// IDs already present in an output
pub fn load_indexed_ids(path: &Path, format: LineFormat) -> SinkResult<HashSet<u64>> {
    let ids: HashSet<u64> = read_lines(path)?
        .unwrap_or_default()
        .iter()
        .filter_map(|line| line_id(line, format))
        .collect();

    if !ids.is_empty() {
        tracing::info!(
            "Found {} already indexed IDs in {}",
            ids.len(),
            path.display()
        );
    }
    Ok(ids)
}

/// Highest ID present in an output
pub fn last_indexed_id(path: &Path, format: LineFormat) -> SinkResult<Option<u64>> {
    Ok(read_lines(path)?
        .unwrap_or_default()
        .iter()
        .filter_map(|line| line_id(line, format))
        .max())
}

/// One line of a metadata output considered for rescraping
#[derive(Debug, Clone, PartialEq)]
pub struct RescrapeEntry {
    /// ID of the line; None for malformed lines
    pub id: Option<u64>,

    /// The line as it appears in the output
    pub line: String,

    /// The line's record is marked completed
    pub completed: bool,
}

impl RescrapeEntry {
    /// Parses one line; `completed_label` is the site's own completed status
    /// text, which older outputs store instead of `"completed"`
    fn parse(line: &str, completed_label: &str) -> Self {
        let value: Option<serde_json::Value> = serde_json::from_str(line.trim()).ok();
        let completed = value
            .as_ref()
            .and_then(|v| v.get("publication_status"))
            .and_then(|s| s.as_str())
            .map(str::trim)
            .is_some_and(|s| {
                s == PublicationStatus::Completed.as_str()
                    || (!completed_label.is_empty() && s == completed_label)
            });

        Self {
            id: line_id(line, LineFormat::Metadata),
            line: line.to_string(),
            completed,
        }
    }
}

/// Entries of a metadata output, in file order
///
/// Blank lines are dropped. A missing output is an error.
pub fn load_rescrape_entries(
    path: &Path,
    completed_label: &str,
) -> SinkResult<Vec<RescrapeEntry>> {
    let lines = read_lines(path)?.ok_or_else(|| SinkError::MissingSource(path.to_path_buf()))?;

    Ok(lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| RescrapeEntry::parse(line, completed_label))
        .collect())
}
