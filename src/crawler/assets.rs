//! Asset downloader
//!
//! Downloads the binary asset (cover image) referenced by a record, subject to:
//! - The adult-content policy
//! - A session-wide storage budget shared by all tasks
//! - The same admission gate, delay and identity rotation as page fetches
//!
//! Stored assets are normalized to the format implied by their file extension.

use crate::crawler::fetcher::{Transport, TransportError};
use crate::crawler::scheduler::Gate;
use crate::record::Record;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Known asset content types and the extension each is stored under
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Extension used when neither the content type nor the URL decides
const DEFAULT_EXTENSION: &str = "jpg";

/// Quality of re-encoded JPEG assets
const JPEG_QUALITY: u8 = 85;

/// Extension of in-progress asset files
const PARTIAL_EXTENSION: &str = "part";

/// Errors from a single asset download
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Transfer failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to store asset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to normalize asset: {0}")]
    Normalize(String),

    #[error("Admission gate closed")]
    Cancelled,
}

/// Result of one asset download
#[derive(Debug)]
pub enum AssetOutcome {
    /// Downloaded and stored at the path
    Stored(PathBuf),

    /// A file for this record already exists and was not re-downloaded
    AlreadyPresent(PathBuf),

    /// The record has no usable asset reference
    NoAsset,

    /// Adult-flagged record and adult downloads are disabled
    SkippedAdult,

    /// The storage budget does not allow this asset
    QuotaExceeded,

    /// The download or write failed
    Failed(AssetError),
}

impl AssetOutcome {
    /// Local path of the asset, if the record now has one
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Stored(path) | Self::AlreadyPresent(path) => Some(path),
            _ => None,
        }
    }

    /// Returns true if the record's asset is on disk after this outcome
    pub fn is_acquired(&self) -> bool {
        self.local_path().is_some()
    }
}

/// Session-wide storage counter
///
/// Reservations are atomic, so concurrent downloads can never push the
/// counter past the budget.
#[derive(Debug)]
pub struct StorageQuota {
    used: AtomicU64,
    budget: u64,
}

impl StorageQuota {
    pub fn new(budget: u64, used: u64) -> Self {
        Self {
            used: AtomicU64::new(used),
            budget,
        }
    }

    /// Creates a quota whose usage starts at the current size of `directory`
    ///
    /// Partial files left by an earlier session are removed first.
    pub fn for_directory(directory: &Path, budget: u64) -> std::io::Result<Self> {
        for partial in partial_files(directory)? {
            match std::fs::remove_file(&partial) {
                Ok(()) => tracing::debug!("Removed partial asset {}", partial.display()),
                Err(e) => tracing::warn!(
                    "Failed to remove partial asset {}: {}",
                    partial.display(),
                    e
                ),
            }
        }
        Ok(Self::new(budget, directory_size(directory)?))
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Returns true while the budget is not yet exhausted
    pub fn has_room(&self) -> bool {
        self.used() < self.budget
    }

    /// Returns true if `size` more bytes would currently fit
    pub fn fits(&self, size: u64) -> bool {
        self.used()
            .checked_add(size)
            .is_some_and(|total| total <= self.budget)
    }

    /// Atomically adds `size` bytes if the total stays within the budget
    pub fn try_reserve(&self, size: u64) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(size).filter(|total| *total <= self.budget)
            })
            .is_ok()
    }
}

/// Total size of the stored asset files under `directory`, recursively
///
/// A missing directory counts as empty. Partial files are not counted.
pub fn directory_size(directory: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    visit_files(directory, &mut |path, len| {
        if !is_partial(path) {
            total += len;
        }
    })?;
    Ok(total)
}

/// Partial files under `directory`, recursively
fn partial_files(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    visit_files(directory, &mut |path, _| {
        if is_partial(path) {
            found.push(path.to_path_buf());
        }
    })?;
    Ok(found)
}

fn is_partial(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == PARTIAL_EXTENSION)
}

/// Calls `visit` with the path and length of every regular file under `directory`
fn visit_files(directory: &Path, visit: &mut dyn FnMut(&Path, u64)) -> std::io::Result<()> {
    if !directory.exists() {
        return Ok(());
    }

    let mut pending = vec![directory.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                pending.push(entry.path());
            } else if metadata.is_file() {
                visit(&entry.path(), metadata.len());
            }
        }
    }
    Ok(())
}

/// Picks the stored file extension for an asset
///
/// The declared content type wins, then the extension of the URL path if it
/// is one of the known ones, then `jpg`.
pub fn asset_extension(mime: Option<&str>, url: &str) -> &'static str {
    if let Some(mime) = mime {
        let mime = mime.split(';').next().unwrap_or(mime).trim();
        if let Some((_, ext)) = MIME_EXTENSIONS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(mime))
        {
            return ext;
        }
    }

    let from_url = url::Url::parse(url).ok().and_then(|parsed| {
        let segment = parsed.path_segments()?.last()?.to_string();
        let (_, ext) = segment.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        let ext = if ext == "jpeg" { "jpg".to_string() } else { ext };
        MIME_EXTENSIONS
            .iter()
            .map(|(_, known)| *known)
            .find(|known| *known == ext)
    });

    from_url.unwrap_or(DEFAULT_EXTENSION)
}

/// Re-encodes image bytes into the format named by `extension`
///
/// JPEG output is flattened to RGB at a fixed quality.
pub fn normalize_image(bytes: &[u8], extension: &str) -> Result<Vec<u8>, AssetError> {
    let format = ImageFormat::from_extension(extension)
        .ok_or_else(|| AssetError::Normalize(format!("unknown format '{}'", extension)))?;
    let image =
        image::load_from_memory(bytes).map_err(|e| AssetError::Normalize(e.to_string()))?;

    let mut out = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
                .encode_image(&rgb)
                .map_err(|e| AssetError::Normalize(e.to_string()))?;
        }
        other => {
            image
                .write_to(&mut out, other)
                .map_err(|e| AssetError::Normalize(e.to_string()))?;
        }
    }

    Ok(out.into_inner())
}

/// Downloads record assets into one directory under a shared quota
pub struct AssetDownloader {
    transport: Arc<dyn Transport>,
    gate: Gate,
    quota: Arc<StorageQuota>,
    directory: PathBuf,
    download_adult: bool,
    overwrite: bool,
    timeout: Duration,
}

impl AssetDownloader {
    /// Creates a downloader
    ///
    /// # Arguments
    ///
    /// * `transport` - Network seam shared with the fetch engine
    /// * `gate` - Admission gate shared with the fetch engine
    /// * `quota` - Session-wide storage counter
    /// * `directory` - Where assets are stored, one file per record ID
    /// * `download_adult` - Download assets of adult-flagged records
    /// * `overwrite` - Replace existing files instead of keeping them
    /// * `timeout` - Transfer timeout
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: Gate,
        quota: Arc<StorageQuota>,
        directory: PathBuf,
        download_adult: bool,
        overwrite: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            gate,
            quota,
            directory,
            download_adult,
            overwrite,
            timeout,
        }
    }

    /// Local path an asset for `record` is stored at
    pub fn target_path(&self, record: &Record, url: &str) -> PathBuf {
        let ext = asset_extension(record.asset_mime.as_deref(), url);
        self.directory.join(format!("{}.{}", record.id, ext))
    }

    /// Downloads the asset of `record`
    ///
    /// The quota is checked before any network I/O, checked again against
    /// the downloaded size, and the final stored size is reserved atomically
    /// before the file is written.
    pub async fn download(&self, record: &Record) -> AssetOutcome {
        let Some(url) = record.asset_ref.as_deref().filter(|u| !u.is_empty()) else {
            return AssetOutcome::NoAsset;
        };

        if record.is_adult && !self.download_adult {
            tracing::debug!("Skipping adult asset for {}", record.id);
            return AssetOutcome::SkippedAdult;
        }

        let path = self.target_path(record, url);
        if !self.overwrite && path.exists() {
            tracing::debug!("Asset for {} already present at {}", record.id, path.display());
            return AssetOutcome::AlreadyPresent(path);
        }

        if !self.quota.has_room() {
            tracing::warn!(
                "Storage limit reached ({} of {} bytes), skipping asset for {}",
                self.quota.used(),
                self.quota.budget(),
                record.id
            );
            return AssetOutcome::QuotaExceeded;
        }

        let response = {
            let Some(_permit) = self.gate.acquire().await else {
                return AssetOutcome::Failed(AssetError::Cancelled);
            };
            self.gate.pause().await;
            self.transport
                .get(url, self.gate.user_agent(), self.timeout)
                .await
        };
        let raw = match response {
            Ok(response) => response.body,
            Err(e) => {
                tracing::warn!("Failed to download asset for {}: {}", record.id, e);
                return AssetOutcome::Failed(e.into());
            }
        };

        if !self.quota.fits(raw.len() as u64) {
            tracing::warn!(
                "Asset for {} ({} bytes) would exceed the storage limit",
                record.id,
                raw.len()
            );
            return AssetOutcome::QuotaExceeded;
        }

        let bytes = self.normalize(record, raw, &path).await;

        if !self.quota.try_reserve(bytes.len() as u64) {
            tracing::warn!(
                "Asset for {} ({} bytes) would exceed the storage limit",
                record.id,
                bytes.len()
            );
            return AssetOutcome::QuotaExceeded;
        }

        match write_atomically(&path, &bytes).await {
            Ok(()) => {
                tracing::debug!("Stored asset for {} at {}", record.id, path.display());
                AssetOutcome::Stored(path)
            }
            Err(e) => {
                tracing::warn!("Failed to store asset for {}: {}", record.id, e);
                AssetOutcome::Failed(e.into())
            }
        }
    }

    /// Normalizes off the async runtime; falls back to the raw bytes
    async fn normalize(&self, record: &Record, raw: Vec<u8>, path: &Path) -> Vec<u8> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_EXTENSION)
            .to_string();

        let raw = Arc::new(raw);
        let input = Arc::clone(&raw);
        let result =
            tokio::task::spawn_blocking(move || normalize_image(&input, &extension)).await;

        match result {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                tracing::debug!("Storing asset for {} as downloaded: {}", record.id, e);
                Arc::try_unwrap(raw).unwrap_or_else(|shared| shared.as_ref().clone())
            }
            Err(e) => {
                tracing::warn!("Asset normalization task failed for {}: {}", record.id, e);
                Arc::try_unwrap(raw).unwrap_or_else(|shared| shared.as_ref().clone())
            }
        }
    }
}

/// Writes to a sibling `.part` file and renames it into place
async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".");
    partial.push(PARTIAL_EXTENSION);
    let partial = PathBuf::from(partial);

    tokio::fs::write(&partial, bytes).await?;
    if let Err(e) = tokio::fs::rename(&partial, path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }
    Ok(())
}
