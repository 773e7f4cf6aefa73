//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the sweeper, including:
//! - The `Transport` seam between the crawl logic and the network
//! - Building the reqwest-backed transport
//! - The per-ID fetch engine: blank-page retry ladder and ban escalation
//! - Error classification

use crate::config::NetworkConfig;
use crate::crawler::scheduler::Gate;
use crate::state::{FetchEvent, FetchState};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single HTTP exchange
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP error for {url}: {message}")]
    Other { url: String, message: String },
}

/// Body and declared content type of a successful (2xx) response
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns true for an empty or all-whitespace body
    pub fn is_blank(&self) -> bool {
        self.text().trim().is_empty()
    }
}

/// One HTTP GET, abstracted so the crawl logic can run against a fake network
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url` with the given client identity
    ///
    /// Non-2xx statuses are reported as `TransportError::Status`.
    async fn get(
        &self,
        url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Response, TransportError>;
}

/// Builds the HTTP client shared by all requests of a session
///
/// The client identity is set per request, so no default user agent is configured.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    referer: String,
}

impl HttpTransport {
    /// Creates a transport that sends the configured referer with every request
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sumi_sweep::config::NetworkConfig;
    /// use sumi_sweep::crawler::HttpTransport;
    ///
    /// let transport = HttpTransport::new(&NetworkConfig::default()).unwrap();
    /// ```
    pub fn new(config: &NetworkConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client()?,
            referer: config.referer.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .timeout(timeout);
        if !self.referer.is_empty() {
            request = request.header(reqwest::header::REFERER, self.referer.as_str());
        }

        let response = request.send().await.map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_error(url, e))?;

        Ok(Response {
            content_type,
            body: body.to_vec(),
        })
    }
}

/// Maps a reqwest error onto the transport error taxonomy
fn classify_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        TransportError::Connect {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else if let Some(status) = error.status() {
        TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        TransportError::Other {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result of one fetch operation
#[derive(Debug)]
pub enum FetchOutcome {
    /// Non-blank page content
    Success(String),

    /// Transport failure; the ID may succeed in a later run
    TransientFailure(TransportError),

    /// Blank pages through the whole ladder; fatal for the session
    BanSuspected,

    /// The admission gate was closed before the fetch could start
    Cancelled,
}

/// Runs the fetch state machine for one ID
///
/// The admission gate is held for the whole state machine, cooldown included,
/// and every attempt is preceded by the gate's randomized delay and uses a
/// freshly drawn client identity.
pub struct FetchEngine {
    transport: Arc<dyn Transport>,
    gate: Gate,
    base_url: String,
    request_timeout: Duration,
    final_attempt_timeout: Duration,
    short_retry_delay: Duration,
    ban_cooldown: Duration,
}

impl FetchEngine {
    pub fn new(transport: Arc<dyn Transport>, gate: Gate, config: &NetworkConfig) -> Self {
        Self {
            transport,
            gate,
            base_url: config.base_url.clone(),
            request_timeout: config.request_timeout(),
            final_attempt_timeout: config.final_attempt_timeout(),
            short_retry_delay: config.short_retry_delay(),
            ban_cooldown: config.ban_cooldown(),
        }
    }

    /// Page URL for a zero-padded ID
    pub fn page_url(&self, id: &str) -> String {
        format!("{}{}", self.base_url, id)
    }

    /// Fetches the page for `id`
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Non-blank body | Success |
    /// | Timeout / connect error / non-2xx | Immediate → TransientFailure |
    /// | First blank body | Short fixed delay, retry |
    /// | Second blank body | Long cooldown, final attempt |
    /// | Third blank body | BanSuspected |
    pub async fn fetch(&self, id: &str) -> FetchOutcome {
        let Some(_permit) = self.gate.acquire().await else {
            tracing::debug!("Admission gate closed, skipping {}", id);
            return FetchOutcome::Cancelled;
        };

        let url = self.page_url(id);
        let mut state = FetchState::Attempt1;
        let mut content = None;
        let mut last_error = None;

        while !state.is_terminal() {
            let event = match state {
                FetchState::ShortDelayRetry => {
                    tracing::warn!(
                        "Blank page for {}. Possible rate limit, retrying in {:?}",
                        id,
                        self.short_retry_delay
                    );
                    tokio::time::sleep(self.short_retry_delay).await;
                    FetchEvent::WaitElapsed
                }
                FetchState::LongCooldown => {
                    let resume_at = chrono::Duration::from_std(self.ban_cooldown)
                        .ok()
                        .map(|d| chrono::Local::now() + d);
                    tracing::warn!(
                        "Possible IP ban: blank page twice for {}. Pausing for {:?} (resuming at {})",
                        id,
                        self.ban_cooldown,
                        resume_at
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_else(|| "unknown".to_string())
                    );
                    tokio::time::sleep(self.ban_cooldown).await;
                    tracing::info!("Resuming after cooldown, final attempt for {}", id);
                    FetchEvent::WaitElapsed
                }
                _ => {
                    let timeout = if state == FetchState::FinalAttempt {
                        self.final_attempt_timeout
                    } else {
                        self.request_timeout
                    };

                    self.gate.pause().await;
                    tracing::trace!("{} for {}", state, url);

                    match self
                        .transport
                        .get(&url, self.gate.user_agent(), timeout)
                        .await
                    {
                        Ok(response) => {
                            let body = response.text();
                            if body.trim().is_empty() {
                                FetchEvent::Blank
                            } else {
                                content = Some(body);
                                FetchEvent::Content
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Network error fetching {}: {}", url, e);
                            last_error = Some(e);
                            FetchEvent::TransportError
                        }
                    }
                }
            };

            state = match state.transition(event) {
                Some(next) => next,
                None => {
                    tracing::error!("Invalid fetch transition from {} on {:?}", state, event);
                    FetchState::TransientFailure
                }
            };
        }

        match (state, content, last_error) {
            (FetchState::Success, Some(body), _) => FetchOutcome::Success(body),
            (FetchState::BanSuspected, _, _) => {
                tracing::error!(
                    "Still receiving blank pages for {} after cooldown, assuming IP ban",
                    id
                );
                FetchOutcome::BanSuspected
            }
            (_, _, Some(error)) => FetchOutcome::TransientFailure(error),
            _ => FetchOutcome::TransientFailure(TransportError::Other {
                url,
                message: "fetch ended without content".to_string(),
            }),
        }
    }
}
