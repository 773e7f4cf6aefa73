//! Record sink traits and error types
//!
//! This module defines the trait interface for record outputs and
//! associated error types.

use crate::record::Record;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Rescrape source not found: {0}")]
    MissingSource(PathBuf),

    #[error("Sink already finished")]
    Finished,
}

impl SinkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Line format of a record output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// One JSON object per line
    Metadata,

    /// One `"<title>, <id>"` line per record
    Titles,
}

impl LineFormat {
    /// Renders a record as one output line, without the trailing newline
    pub fn render(&self, record: &Record) -> SinkResult<String> {
        match self {
            Self::Metadata => Ok(serde_json::to_string(record)?),
            Self::Titles => Ok(record.title_line()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Titles => "titles",
        }
    }
}

/// Trait for record outputs
///
/// A sink writes each ID at most once per session and makes every line
/// durable before the write call returns. Only the coordinator owns a sink;
/// worker tasks never write to it.
pub trait RecordSink: Send {
    /// Writes a record
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The record was written
    /// * `Ok(false)` - A line for this ID was already written; nothing was done
    fn write_record(&mut self, record: &Record) -> SinkResult<bool>;

    /// Writes an existing output line verbatim
    ///
    /// Used when replacing an output to keep lines that were not re-fetched.
    fn write_line(&mut self, id: Option<u64>, line: &str) -> SinkResult<bool>;

    /// Makes the session's output final
    fn commit(&mut self) -> SinkResult<()>;

    /// Abandons the session's output where the sink supports it
    ///
    /// Append-style sinks keep what was already written.
    fn discard(&mut self) -> SinkResult<()>;
}
