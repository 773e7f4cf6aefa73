//! Atomic rescrape of an existing metadata output

use crate::common::*;
use sumi_sweep::config::OutputMode;
use sumi_sweep::output::Termination;
use sumi_sweep::storage::temporary_path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ORIGINAL: &str = concat!(
    "{\"id\":\"000001\",\"title\":\"Old One\",\"publication_status\":\"serializing\"}\n",
    "{\"id\":\"000002\",\"title\":\"Old Two\",\"publication_status\":\"serializing\"}\n",
    "{\"id\":\"000003\",\"title\":\"Old Three\",\"publication_status\":\"serializing\"}\n",
    "{\"id\":\"000004\",\"title\":\"Old Four\",\"publication_status\":\"serializing\"}\n",
);

#[tokio::test]
async fn test_rescrape_replaces_output() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let metadata = dir.path().join("metadata.jsonl");
    std::fs::write(&metadata, ORIGINAL).unwrap();

    for id in 1..=4 {
        mount_entry(&server, id, &format!("New {}", id)).await;
    }

    let config = create_test_config(dir.path(), &server, OutputMode::Rescrape, 0, 0);
    let summary = run_session(config).await;

    assert_eq!(summary.termination, Termination::Completed);
    let lines = read_lines(&metadata);
    assert_eq!(lines.len(), 4);
    for (i, line) in lines.iter().enumerate() {
        assert!(line.contains(&format!("New {}", i + 1)), "{}", line);
    }
    assert!(!temporary_path(&metadata).exists());
}

#[tokio::test]
async fn test_rescrape_ban_leaves_original_untouched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let metadata = dir.path().join("metadata.jsonl");
    std::fs::write(&metadata, ORIGINAL).unwrap();

    mount_entry(&server, 1, "New 1").await;
    mount_entry(&server, 2, "New 2").await;
    Mock::given(method("GET"))
        .and(path(page_path(3)))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;
    mount_entry(&server, 4, "New 4").await;

    let mut config = create_test_config(dir.path(), &server, OutputMode::Rescrape, 0, 0);
    config.network.concurrency = 1;
    let summary = run_session(config).await;

    assert_eq!(summary.termination, Termination::BanSuspected { id: 3 });
    assert_eq!(std::fs::read_to_string(&metadata).unwrap(), ORIGINAL);
    assert!(!temporary_path(&metadata).exists());
}

#[tokio::test]
async fn test_rescrape_interrupt_leaves_original_untouched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let metadata = dir.path().join("metadata.jsonl");
    std::fs::write(&metadata, ORIGINAL).unwrap();

    mount_entry(&server, 1, "New 1").await;
    mount_entry(&server, 2, "New 2").await;
    for id in 3..=4 {
        Mock::given(method("GET"))
            .and(path(page_path(id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;
    }

    let mut config = create_test_config(dir.path(), &server, OutputMode::Rescrape, 0, 0);
    config.network.ban_cooldown = 3600.0;

    let mut coordinator = sumi_sweep::crawler::Coordinator::with_http(config).unwrap();
    let summary = coordinator
        .run_until(tokio::time::sleep(std::time::Duration::from_millis(500)))
        .await
        .unwrap();

    assert_eq!(summary.termination, Termination::Interrupted);
    assert_eq!(std::fs::read_to_string(&metadata).unwrap(), ORIGINAL);
    assert!(!temporary_path(&metadata).exists());
}

#[tokio::test]
async fn test_rescrape_keeps_lines_that_fail_to_refetch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let metadata = dir.path().join("metadata.jsonl");
    std::fs::write(&metadata, ORIGINAL).unwrap();

    mount_entry(&server, 1, "New 1").await;
    Mock::given(method("GET"))
        .and(path(page_path(2)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_entry(&server, 3, "New 3").await;
    mount_page(&server, 4, alert_page(BOUNDARY_TEXT)).await;

    let config = create_test_config(dir.path(), &server, OutputMode::Rescrape, 0, 0);
    let summary = run_session(config).await;

    assert_eq!(summary.termination, Termination::Completed);
    let lines = read_lines(&metadata);
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains("New 1"));
    assert!(lines[1].contains("Old Two"));
    assert!(lines[2].contains("New 3"));
    assert!(lines[3].contains("Old Four"));
    assert_eq!(summary.carried_forward, 2);
}
