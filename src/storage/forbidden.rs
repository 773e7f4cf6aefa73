//! Forbidden-ID side file
//!
//! One zero-padded ID per line, appended as deleted, access-denied or
//! unparseable entries are discovered. Later runs skip these IDs.

use crate::record::{format_id, parse_id};
use crate::storage::traits::{SinkError, SinkResult};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Persistent set of IDs known not to hold a usable entry
#[derive(Debug)]
pub struct ForbiddenList {
    path: PathBuf,
    width: usize,
    ids: HashSet<u64>,
    file: Option<File>,
    added: u64,
}

impl ForbiddenList {
    /// Loads the list from `path`; a missing file is an empty list
    ///
    /// Lines that are not IDs are ignored.
    pub fn load(path: &Path, width: usize) -> SinkResult<Self> {
        let ids = match std::fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes)
                .lines()
                .filter_map(parse_id)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(SinkError::io(path, e)),
        };

        Ok(Self {
            path: path.to_path_buf(),
            width,
            ids,
            file: None,
            added: 0,
        })
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// IDs added this session
    pub fn added(&self) -> u64 {
        self.added
    }

    /// Adds an ID, appending it to the file immediately
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The ID was new and was persisted
    /// * `Ok(false)` - The ID was already listed
    pub fn add(&mut self, id: u64) -> SinkResult<bool> {
        if self.ids.contains(&id) {
            return Ok(false);
        }

        if self.file.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| SinkError::io(parent, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| SinkError::io(&self.path, e))?;
            self.file = Some(file);
        }

        let line = format!("{}\n", format_id(id, self.width));
        if let Some(file) = self.file.as_mut() {
            file.write_all(line.as_bytes())
                .and_then(|_| file.flush())
                .map_err(|e| SinkError::io(&self.path, e))?;
        }

        self.ids.insert(id);
        self.added += 1;
        Ok(true)
    }
}
