//! Crawler module for ID sweeping
//!
//! This module contains the core sweeping logic, including:
//! - HTTP fetching with the blank-page retry ladder and ban detection
//! - Page classification and field extraction
//! - Asset downloads under a storage budget
//! - Admission gating and ordered commit
//! - Overall session coordination

mod assets;
mod classifier;
mod coordinator;
mod fetcher;
mod scheduler;

pub use assets::{
    asset_extension, directory_size, normalize_image, AssetDownloader, AssetError, AssetOutcome,
    StorageQuota,
};
pub use classifier::{parse_grouped_number, PageClass, PageClassifier};
pub use coordinator::{preview, run_sweep, Coordinator, PlanPreview};
pub use fetcher::{
    build_http_client, FetchEngine, FetchOutcome, HttpTransport, Response, Transport,
    TransportError,
};
pub use scheduler::{CommitQueue, Gate};

