//! Line-oriented record sink
//!
//! Supports three ways of opening an output:
//! - `Append`: keep existing lines and add new ones (resume)
//! - `Overwrite`: truncate and start over
//! - `Replace`: write a sibling temporary file and atomically rename it over
//!   the target on commit, so the target is never observed half-written

use crate::record::Record;
use crate::storage::traits::{LineFormat, RecordSink, SinkError, SinkResult};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// How a line sink treats an existing output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Append,
    Overwrite,
    Replace,
}

/// Record sink writing one line per record
#[derive(Debug)]
pub struct LineSink {
    /// Final location of the output
    target: PathBuf,

    /// File currently being written (the target, or its temporary sibling)
    path: PathBuf,

    format: LineFormat,
    mode: SinkMode,
    writer: Option<BufWriter<File>>,

    /// IDs already present in the output, indexed or written this session
    seen: HashSet<u64>,

    written: u64,
}

impl LineSink {
    /// Opens a sink
    ///
    /// # Arguments
    ///
    /// * `target` - Output file
    /// * `format` - Line format
    /// * `mode` - How an existing output is treated
    /// * `existing` - IDs already in the output; writes for them are skipped
    pub fn open(
        target: &Path,
        format: LineFormat,
        mode: SinkMode,
        existing: HashSet<u64>,
    ) -> SinkResult<Self> {
        let path = match mode {
            SinkMode::Replace => temporary_path(target),
            SinkMode::Append | SinkMode::Overwrite => target.to_path_buf(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::io(parent, e))?;
        }

        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            SinkMode::Append => options.append(true),
            SinkMode::Overwrite | SinkMode::Replace => options.write(true).truncate(true),
        };
        let file = options.open(&path).map_err(|e| SinkError::io(&path, e))?;

        tracing::debug!(
            "Opened {} sink at {} ({:?}, {} existing IDs)",
            format.as_str(),
            path.display(),
            mode,
            existing.len()
        );

        Ok(Self {
            target: target.to_path_buf(),
            path,
            format,
            mode,
            writer: Some(BufWriter::new(file)),
            seen: existing,
            written: 0,
        })
    }

    fn append_line(&mut self, line: &str) -> SinkResult<()> {
        let writer = self.writer.as_mut().ok_or(SinkError::Finished)?;
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .map_err(|e| SinkError::io(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    fn close_writer(&mut self) -> SinkResult<Option<File>> {
        match self.writer.take() {
            Some(writer) => writer
                .into_inner()
                .map(Some)
                .map_err(|e| SinkError::io(&self.path, e.into_error())),
            None => Ok(None),
        }
    }
}

impl RecordSink for LineSink {
    fn write_record(&mut self, record: &Record) -> SinkResult<bool> {
        let line = self.format.render(record)?;
        self.write_line(record.numeric_id(), &line)
    }

    fn write_line(&mut self, id: Option<u64>, line: &str) -> SinkResult<bool> {
        if let Some(id) = id {
            if self.seen.contains(&id) {
                tracing::debug!("Skipping duplicate line for ID {}", id);
                return Ok(false);
            }
        }

        self.append_line(line.trim_end_matches(['\r', '\n']))?;
        if let Some(id) = id {
            self.seen.insert(id);
        }
        Ok(true)
    }

    fn commit(&mut self) -> SinkResult<()> {
        let Some(file) = self.close_writer()? else {
            return Ok(());
        };
        file.sync_all().map_err(|e| SinkError::io(&self.path, e))?;
        drop(file);

        if self.mode == SinkMode::Replace {
            std::fs::rename(&self.path, &self.target).map_err(|e| SinkError::io(&self.target, e))?;
            tracing::info!(
                "Replaced {} with {} rescraped lines",
                self.target.display(),
                self.written
            );
            self.path = self.target.clone();
        }
        Ok(())
    }

    fn discard(&mut self) -> SinkResult<()> {
        let closed = self.close_writer();

        if self.mode == SinkMode::Replace && self.path != self.target {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {
                    tracing::info!(
                        "Discarded temporary output {}; {} left untouched",
                        self.path.display(),
                        self.target.display()
                    );
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(SinkError::io(&self.path, e)),
            }
        }

        closed.map(|_| ())
    }
}

impl Drop for LineSink {
    fn drop(&mut self) {
        if self.mode == SinkMode::Replace && self.path != self.target {
            let _ = self.discard();
        }
    }
}

/// Sibling temporary file used by `Replace` mode
pub fn temporary_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
