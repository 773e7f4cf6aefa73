//! Shared fixtures for the integration tests

use std::path::Path;
use sumi_sweep::config::{
    AssetConfig, Config, MarkerConfig, NetworkConfig, OutputConfig, OutputMode, SessionConfig,
};
use sumi_sweep::crawler::Coordinator;
use sumi_sweep::output::RunSummary;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TITLE_PREFIX: &str = "노벨피아 - 웹소설로 꿈꾸는 세상! - ";
pub const BOUNDARY_TEXT: &str = "잘못된 소설 번호 입니다.";
pub const DELETED_TEXT: &str = "삭제된 소설 입니다.";

/// Creates a test configuration pointing at the mock server, with every wait set to zero
pub fn create_test_config(
    dir: &Path,
    server: &MockServer,
    mode: OutputMode,
    start_id: u64,
    end_id: u64,
) -> Config {
    Config {
        session: SessionConfig {
            start_id,
            end_id,
            id_width: 6,
            mode,
            resume: true,
            skip_completed: false,
            ignore_forbidden: false,
            record_removed: false,
            download_assets: false,
        },
        network: NetworkConfig {
            base_url: format!("{}/novel/", server.uri()),
            referer: format!("{}/", server.uri()),
            concurrency: 4,
            min_delay: 0.0,
            max_delay: 0.0,
            request_timeout: 5.0,
            final_attempt_timeout: 5.0,
            short_retry_delay: 0.0,
            ban_cooldown: 0.0,
            ..NetworkConfig::default()
        },
        output: OutputConfig {
            metadata_path: dir.join("metadata.jsonl"),
            titles_path: dir.join("titles.txt"),
            forbidden_path: dir.join("forbidden.txt"),
        },
        assets: AssetConfig {
            directory: dir.join("covers"),
            max_storage_gb: 1.0,
            download_adult: false,
            timeout: 5.0,
        },
        markers: MarkerConfig::default(),
    }
}

/// Entry page in the site's layout
pub fn entry_page(title: &str, asset_url: Option<&str>) -> String {
    let asset = asset_url
        .map(|url| {
            format!(
                r#"<meta property="og:image" content="{}"><meta property="og:image:type" content="image/png">"#,
                url
            )
        })
        .unwrap_or_default();

    format!(
        r#"<html><head>
        <meta name="twitter:title" content="{}{}">
        <meta name="twitter:description" content="Synopsis of {}">
        {}
        </head><body>
        <a class="writer-name">Writer</a>
        <p class="writer-tag"><span class="tag">#판타지</span></p>
        <div class="info-count2"><p>선호 1,024</p><p>회차 12</p></div>
        </body></html>"#,
        TITLE_PREFIX, title, title, asset
    )
}

pub fn alert_page(message: &str) -> String {
    format!(
        r#"<html><body><div id="alert_modal" class="modal"><div class="mg-b10">{}</div></div></body></html>"#,
        message
    )
}

pub fn page_path(id: u64) -> String {
    format!("/novel/{:06}", id)
}

/// Serves `body` as HTML for one ID
pub async fn mount_page(server: &MockServer, id: u64, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path(id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

pub async fn mount_entry(server: &MockServer, id: u64, title: &str) {
    mount_page(server, id, entry_page(title, None)).await;
}

/// Number of requests the server received for `request_path`
pub async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}

/// Runs one session over HTTP without an interrupt source
pub async fn run_session(config: Config) -> RunSummary {
    let mut coordinator = Coordinator::with_http(config).expect("Failed to create coordinator");
    coordinator
        .run_until(std::future::pending::<()>())
        .await
        .expect("Session failed to start")
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
