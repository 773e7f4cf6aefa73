use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Sweep
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub session: SessionConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub assets: AssetConfig,
    #[serde(default)]
    pub markers: MarkerConfig,
}

impl Config {
    /// Returns true if record assets are downloaded this session
    pub fn downloads_assets(&self) -> bool {
        self.session.download_assets || self.session.mode == OutputMode::Assets
    }
}

/// What a session writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// One JSON record per line
    Metadata,

    /// One `"<title>, <id>"` line per record
    Titles,

    /// No record output, assets only
    Assets,

    /// Re-fetch every ID of the existing metadata output and atomically replace it
    Rescrape,
}

impl OutputMode {
    /// Returns true if records are written to a sink in this mode
    pub fn writes_records(&self) -> bool {
        !matches!(self, Self::Assets)
    }
}

/// Session parameters: the ID range and per-run policies
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// First ID of the range (inclusive)
    #[serde(rename = "start-id")]
    pub start_id: u64,

    /// Last ID of the range (inclusive)
    #[serde(rename = "end-id")]
    pub end_id: u64,

    /// Width IDs are zero-padded to
    #[serde(rename = "id-width", default = "default_id_width")]
    pub id_width: usize,

    pub mode: OutputMode,

    /// Append to existing output and skip already indexed IDs
    #[serde(default = "default_true")]
    pub resume: bool,

    /// In rescrape mode, leave completed entries out of the rescrape list
    #[serde(rename = "skip-completed", default)]
    pub skip_completed: bool,

    /// Do not filter candidates through the forbidden-ID file
    #[serde(rename = "ignore-forbidden", default)]
    pub ignore_forbidden: bool,

    /// Write minimal records for deleted/access-denied entries instead of
    /// only forbidden-listing them
    #[serde(rename = "record-removed", default)]
    pub record_removed: bool,

    /// Download each record's asset
    #[serde(rename = "download-assets", default)]
    pub download_assets: bool,
}

/// Network behavior: target site, throttling and ban ladder timings
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Page URL prefix; the zero-padded ID is appended to it
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_referer")]
    pub referer: String,

    /// Maximum number of requests past the admission gate at once
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Lower bound of the randomized pre-request delay (seconds)
    #[serde(rename = "min-delay", default = "default_min_delay")]
    pub min_delay: f64,

    /// Upper bound of the randomized pre-request delay (seconds)
    #[serde(rename = "max-delay", default = "default_max_delay")]
    pub max_delay: f64,

    /// Timeout of the first two attempts (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: f64,

    /// Timeout of the attempt after the cooldown (seconds)
    #[serde(
        rename = "final-attempt-timeout",
        default = "default_final_attempt_timeout"
    )]
    pub final_attempt_timeout: f64,

    /// Pause before retrying a blank page (seconds)
    #[serde(rename = "short-retry-delay", default = "default_short_retry_delay")]
    pub short_retry_delay: f64,

    /// Pause after the second blank page before the final attempt (seconds)
    #[serde(rename = "ban-cooldown", default = "default_ban_cooldown")]
    pub ban_cooldown: f64,

    /// Pool of client identities; one is drawn at random per request
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout)
    }

    pub fn final_attempt_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.final_attempt_timeout)
    }

    pub fn short_retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.short_retry_delay)
    }

    pub fn ban_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.ban_cooldown)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            referer: default_referer(),
            concurrency: default_concurrency(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            request_timeout: default_request_timeout(),
            final_attempt_timeout: default_final_attempt_timeout(),
            short_retry_delay: default_short_retry_delay(),
            ban_cooldown: default_ban_cooldown(),
            user_agents: default_user_agents(),
        }
    }
}

/// Output file locations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// JSON-lines metadata output (also the rescrape source)
    #[serde(rename = "metadata-path", default = "default_metadata_path")]
    pub metadata_path: PathBuf,

    /// Titles-only output
    #[serde(rename = "titles-path", default = "default_titles_path")]
    pub titles_path: PathBuf,

    /// Forbidden-ID side file
    #[serde(rename = "forbidden-path", default = "default_forbidden_path")]
    pub forbidden_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            metadata_path: default_metadata_path(),
            titles_path: default_titles_path(),
            forbidden_path: default_forbidden_path(),
        }
    }
}

/// Asset downloader settings
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "default_asset_directory")]
    pub directory: PathBuf,

    /// Storage budget for the asset directory, in GiB
    #[serde(rename = "max-storage-gb", default = "default_max_storage_gb")]
    pub max_storage_gb: f64,

    /// Download assets of adult-flagged records
    #[serde(rename = "download-adult", default)]
    pub download_adult: bool,

    /// Transfer timeout (seconds)
    #[serde(default = "default_asset_timeout")]
    pub timeout: f64,
}

impl AssetConfig {
    /// Storage budget in bytes
    pub fn budget_bytes(&self) -> u64 {
        (self.max_storage_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            directory: default_asset_directory(),
            max_storage_gb: default_max_storage_gb(),
            download_adult: false,
            timeout: default_asset_timeout(),
        }
    }
}

/// Site-specific text fragments the page classifier matches against
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerConfig {
    /// CSS selector of the element holding the site's alert text
    #[serde(rename = "alert-selector", default = "default_alert_selector")]
    pub alert_selector: String,

    /// Alert text shown for an ID past the last real entry
    #[serde(default = "default_boundary_markers")]
    pub boundary: Vec<String>,

    /// Alert text shown for a deleted entry
    #[serde(default = "default_deleted_markers")]
    pub deleted: Vec<String>,

    /// Alert text shown when access to an entry is refused
    #[serde(rename = "access-denied", default = "default_access_denied_markers")]
    pub access_denied: Vec<String>,

    /// Prefix of the `twitter:title` meta content that precedes the real title
    #[serde(rename = "title-prefix", default = "default_title_prefix")]
    pub title_prefix: String,

    /// Tags containing any of these fragments are dropped
    #[serde(rename = "excluded-tags", default = "default_excluded_tags")]
    pub excluded_tags: Vec<String>,

    /// Asset URLs containing any of these fragments are site placeholders
    #[serde(rename = "placeholder-assets", default = "default_placeholder_assets")]
    pub placeholder_assets: Vec<String>,

    #[serde(rename = "like-label", default = "default_like_label")]
    pub like_label: String,

    #[serde(rename = "chapter-label", default = "default_chapter_label")]
    pub chapter_label: String,

    #[serde(rename = "completed-label", default = "default_completed_label")]
    pub completed_label: String,

    #[serde(rename = "discontinued-label", default = "default_discontinued_label")]
    pub discontinued_label: String,

    #[serde(rename = "adult-label", default = "default_adult_label")]
    pub adult_label: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            alert_selector: default_alert_selector(),
            boundary: default_boundary_markers(),
            deleted: default_deleted_markers(),
            access_denied: default_access_denied_markers(),
            title_prefix: default_title_prefix(),
            excluded_tags: default_excluded_tags(),
            placeholder_assets: default_placeholder_assets(),
            like_label: default_like_label(),
            chapter_label: default_chapter_label(),
            completed_label: default_completed_label(),
            discontinued_label: default_discontinued_label(),
            adult_label: default_adult_label(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_id_width() -> usize {
    6
}

fn default_base_url() -> String {
    "https://novelpia.com/novel/".to_string()
}

fn default_referer() -> String {
    "https://novelpia.com/".to_string()
}

fn default_concurrency() -> u32 {
    5
}

fn default_min_delay() -> f64 {
    0.5
}

fn default_max_delay() -> f64 {
    1.5
}

fn default_request_timeout() -> f64 {
    15.0
}

fn default_final_attempt_timeout() -> f64 {
    30.0
}

fn default_short_retry_delay() -> f64 {
    5.0
}

fn default_ban_cooldown() -> f64 {
    24.0 * 60.0 * 60.0
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/122.0".to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
    ]
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("novelpia_metadata.jsonl")
}

fn default_titles_path() -> PathBuf {
    PathBuf::from("novelpia_titles.txt")
}

fn default_forbidden_path() -> PathBuf {
    PathBuf::from("forbidden.txt")
}

fn default_asset_directory() -> PathBuf {
    PathBuf::from("novelpia_covers")
}

fn default_max_storage_gb() -> f64 {
    5.0
}

fn default_asset_timeout() -> f64 {
    20.0
}

fn default_alert_selector() -> String {
    "div#alert_modal.modal".to_string()
}

fn default_boundary_markers() -> Vec<String> {
    vec!["잘못된 소설 번호 입니다.".to_string()]
}

fn default_deleted_markers() -> Vec<String> {
    vec!["삭제된 소설 입니다.".to_string()]
}

fn default_access_denied_markers() -> Vec<String> {
    vec!["잘못된 접근입니다.".to_string()]
}

fn default_title_prefix() -> String {
    "노벨피아 - 웹소설로 꿈꾸는 세상! - ".to_string()
}

fn default_excluded_tags() -> Vec<String> {
    vec!["나만의태그".to_string()]
}

fn default_placeholder_assets() -> Vec<String> {
    vec!["novelpia.com/img/".to_string()]
}

fn default_like_label() -> String {
    "선호".to_string()
}

fn default_chapter_label() -> String {
    "회차".to_string()
}

fn default_completed_label() -> String {
    "완결".to_string()
}

fn default_discontinued_label() -> String {
    "연재중단".to_string()
}

fn default_adult_label() -> String {
    "19".to_string()
}
