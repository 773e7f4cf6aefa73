//! End-to-end sweeps over a mock site

use crate::common::*;
use sumi_sweep::config::OutputMode;
use sumi_sweep::output::Termination;
use sumi_sweep::record::Record;
use tempfile::TempDir;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_small_range_metadata_and_forbidden() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_entry(&server, 0, "First").await;
    mount_page(&server, 1, alert_page(DELETED_TEXT)).await;
    mount_entry(&server, 2, "Third").await;

    let config = create_test_config(dir.path(), &server, OutputMode::Metadata, 0, 2);
    let summary = run_session(config).await;

    assert_eq!(summary.termination, Termination::Completed);
    assert_eq!(summary.found, 2);

    let lines = read_lines(&dir.path().join("metadata.jsonl"));
    assert_eq!(lines.len(), 2);
    let records: Vec<Record> = lines
        .iter()
        .map(|l| serde_json::from_str(l).expect("metadata line is a record"))
        .collect();
    assert_eq!(records[0].id, "000000");
    assert_eq!(records[0].title, "First");
    assert_eq!(records[0].like_count, Some(1024));
    assert_eq!(records[0].chapter_count, Some(12));
    assert_eq!(records[1].id, "000002");

    assert_eq!(read_lines(&dir.path().join("forbidden.txt")), vec!["000001"]);
}

#[tokio::test]
async fn test_resume_never_duplicates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    for id in 1..=3 {
        mount_entry(&server, id, &format!("Title {}", id)).await;
    }

    // First session covers part of the range
    let config = create_test_config(dir.path(), &server, OutputMode::Titles, 1, 2);
    run_session(config).await;

    // Second session covers all of it
    let config = create_test_config(dir.path(), &server, OutputMode::Titles, 1, 3);
    let summary = run_session(config).await;

    assert_eq!(summary.candidates, 1);
    assert_eq!(
        read_lines(&dir.path().join("titles.txt")),
        vec!["Title 1, 000001", "Title 2, 000002", "Title 3, 000003"]
    );
    assert_eq!(requests_to(&server, &page_path(1)).await, 1);
    assert_eq!(requests_to(&server, &page_path(3)).await, 1);
}

#[tokio::test]
async fn test_forbidden_ids_are_not_fetched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("forbidden.txt"), "000002\n").unwrap();

    for id in 1..=3 {
        mount_entry(&server, id, &format!("Title {}", id)).await;
    }

    let config = create_test_config(dir.path(), &server, OutputMode::Titles, 1, 3);
    run_session(config).await;

    assert_eq!(requests_to(&server, &page_path(2)).await, 0);
    assert_eq!(read_lines(&dir.path().join("titles.txt")).len(), 2);
}

#[tokio::test]
async fn test_boundary_cancels_higher_ids() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    for id in 495..500 {
        mount_entry(&server, id, &format!("Real {}", id)).await;
    }
    mount_page(&server, 500, alert_page(BOUNDARY_TEXT)).await;
    for id in 501..=510 {
        mount_entry(&server, id, &format!("Phantom {}", id)).await;
    }

    let config = create_test_config(dir.path(), &server, OutputMode::Metadata, 495, 510);
    let summary = run_session(config).await;

    assert_eq!(summary.termination, Termination::Completed);
    assert_eq!(summary.boundary, Some(500));

    let lines = read_lines(&dir.path().join("metadata.jsonl"));
    assert_eq!(lines.len(), 5);
    for line in &lines {
        let record: Record = serde_json::from_str(line).unwrap();
        let id: u64 = record.id.parse().unwrap();
        assert!(id < 500, "record above the boundary: {}", record.id);
    }
    assert!(read_lines(&dir.path().join("forbidden.txt")).is_empty());
}

#[tokio::test]
async fn test_blank_pages_end_in_ban_after_three_attempts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(page_path(7)))
        .respond_with(ResponseTemplate::new(200).set_body_string("  \n"))
        .mount(&server)
        .await;

    let mut config = create_test_config(dir.path(), &server, OutputMode::Titles, 7, 7);
    config.network.concurrency = 1;
    let summary = run_session(config).await;

    assert_eq!(summary.termination, Termination::BanSuspected { id: 7 });
    assert!(summary.termination.is_fatal());
    assert_eq!(requests_to(&server, &page_path(7)).await, 3);
    assert!(read_lines(&dir.path().join("titles.txt")).is_empty());
}

#[tokio::test]
async fn test_http_errors_are_transient() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(page_path(1)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_entry(&server, 1, "Later").await;
    mount_entry(&server, 2, "Fine").await;

    let config = create_test_config(dir.path(), &server, OutputMode::Titles, 1, 2);
    let summary = run_session(config).await;

    assert_eq!(summary.termination, Termination::Completed);
    assert_eq!(summary.network_errors, 1);
    assert_eq!(requests_to(&server, &page_path(1)).await, 1);
    assert_eq!(read_lines(&dir.path().join("titles.txt")), vec!["Fine, 000002"]);
    assert!(read_lines(&dir.path().join("forbidden.txt")).is_empty());

    // The failed ID is retried by the next session
    let config = create_test_config(dir.path(), &server, OutputMode::Titles, 1, 2);
    run_session(config).await;
    assert_eq!(
        read_lines(&dir.path().join("titles.txt")),
        vec!["Fine, 000002", "Later, 000001"]
    );
}

#[tokio::test]
async fn test_identity_headers_sent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(page_path(1)))
        .and(header_exists("user-agent"))
        .and(header_exists("referer"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(entry_page("One", None))
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(dir.path(), &server, OutputMode::Titles, 1, 1);
    let summary = run_session(config).await;

    assert_eq!(summary.found, 1);
    assert_eq!(read_lines(&dir.path().join("titles.txt")), vec!["One, 000001"]);
}
