//! Asset downloads under a storage budget

use crate::common::*;
use std::io::Cursor;
use sumi_sweep::config::OutputMode;
use sumi_sweep::crawler::directory_size;
use sumi_sweep::record::Record;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn png_bytes(shade: u8) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(8, 8, image::Rgb([shade, 40, 90]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

async fn mount_entry_with_asset(server: &MockServer, id: u64) {
    let asset_path = format!("/covers/{:06}.png", id);
    let asset_url = format!("{}{}", server.uri(), asset_path);
    mount_page(server, id, entry_page(&format!("Title {}", id), Some(&asset_url))).await;

    Mock::given(method("GET"))
        .and(path(asset_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes(id as u8))
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_assets_downloaded_with_records() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    for id in 1..=3 {
        mount_entry_with_asset(&server, id).await;
    }

    let mut config = create_test_config(dir.path(), &server, OutputMode::Metadata, 1, 3);
    config.session.download_assets = true;
    let summary = run_session(config).await;

    assert_eq!(summary.assets_acquired, 3);
    for id in 1..=3 {
        assert!(dir.path().join("covers").join(format!("{:06}.png", id)).exists());
    }

    let records: Vec<Record> = read_lines(&dir.path().join("metadata.jsonl"))
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(records.iter().all(|r| r.asset_local_path.is_some()));
    assert!(records.iter().all(|r| r.asset_mime.as_deref() == Some("image/png")));
}

#[tokio::test]
async fn test_storage_never_exceeds_budget() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    for id in 1..=10 {
        mount_entry_with_asset(&server, id).await;
    }

    let one = png_bytes(1).len() as f64;
    let mut config = create_test_config(dir.path(), &server, OutputMode::Assets, 1, 10);
    // Room for a few assets, not all of them
    config.assets.max_storage_gb = one * 3.5 / (1024.0 * 1024.0 * 1024.0);
    let budget = config.assets.budget_bytes();
    let summary = run_session(config).await;

    let used = directory_size(&dir.path().join("covers")).unwrap();
    assert!(used <= budget, "{} bytes stored, budget {}", used, budget);
    assert!(summary.storage_used <= budget);
    assert!(summary.assets_acquired < 10);
    assert!(summary.assets_over_quota > 0);
    assert_eq!(summary.found, 10);
}

#[tokio::test]
async fn test_existing_assets_count_against_budget() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let covers = dir.path().join("covers");
    std::fs::create_dir_all(&covers).unwrap();
    std::fs::write(covers.join("old.bin"), vec![0u8; 4096]).unwrap();

    mount_entry_with_asset(&server, 1).await;

    let mut config = create_test_config(dir.path(), &server, OutputMode::Assets, 1, 1);
    config.assets.max_storage_gb = 4096.0 / (1024.0 * 1024.0 * 1024.0);
    let summary = run_session(config).await;

    assert_eq!(summary.assets_acquired, 0);
    assert_eq!(
        requests_to(&server, "/covers/000001.png").await,
        0,
        "no transfer once the budget is exhausted"
    );
}

#[tokio::test]
async fn test_adult_assets_skipped_by_default() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let asset_url = format!("{}/covers/000001.png", server.uri());
    let page = entry_page("Adult", Some(&asset_url)).replace(
        "<a class=\"writer-name\">",
        "<span class=\"b_19 s_inv\">19</span><a class=\"writer-name\">",
    );
    mount_page(&server, 1, page).await;

    let mut config = create_test_config(dir.path(), &server, OutputMode::Metadata, 1, 1);
    config.session.download_assets = true;
    let summary = run_session(config).await;

    assert_eq!(summary.found, 1);
    assert_eq!(summary.assets_acquired, 0);
    assert_eq!(requests_to(&server, "/covers/000001.png").await, 0);

    let record: Record =
        serde_json::from_str(&read_lines(&dir.path().join("metadata.jsonl"))[0]).unwrap();
    assert!(record.is_adult);
    assert_eq!(record.asset_local_path, None);
}
