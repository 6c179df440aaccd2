//! End-to-end harvest runs against a mock verification API.

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use session_harvest::config::{ApiConfig, RateLimitConfig, ThrottleConfig};
use session_harvest::{Error, RunConfig, harvest};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-key";

fn config_for(server: &MockServer, output_dir: PathBuf) -> RunConfig {
    RunConfig {
        api: ApiConfig {
            base_url: format!("{}/v2/session", server.uri()),
            api_key: API_KEY.to_string(),
            request_timeout: Duration::from_secs(5),
        },
        rate_limit: RateLimitConfig {
            interval: Duration::from_millis(1),
        },
        throttle: ThrottleConfig {
            cooldown: Duration::from_millis(50),
            max_attempts: Some(3),
        },
        workers: 3,
        checkpoint_every: 2,
        output_dir,
    }
}

/// Serve a decision with one reachable image and one video that 404s
async fn mount_api(server: &MockServer) {
    let decision = json!({
        "id_verification": {
            "front_image": format!("{}/media/front.jpg", server.uri()),
        },
        "liveness": {
            "video_url": format!("{}/media/gone/video", server.uri()),
        },
        "status": "Approved"
    });

    Mock::given(method("GET"))
        .and(path_regex(r"^/v2/session/[^/]+/decision/$"))
        .and(header("X-Api-Key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(decision))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/media/front.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/media/gone/video"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

fn write_input(dir: &Path, content: &str) -> PathBuf {
    let input = dir.join("sessions.csv");
    std::fs::write(&input, content).unwrap();
    input
}

fn status_column(input: &Path) -> Vec<String> {
    let mut reader = csv::Reader::from_path(input).unwrap();
    let col = reader
        .headers()
        .unwrap()
        .iter()
        .position(|h| h == "downloaded")
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().get(col).unwrap_or_default().to_string())
        .collect()
}

async fn requested_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

#[tokio::test]
async fn completed_rows_are_never_requested_again() {
    let server = MockServer::start().await;
    mount_api(&server).await;

    let dir = TempDir::new().unwrap();
    let input = write_input(
        dir.path(),
        "id,client_id,downloaded\n\
         s0,c0,completed\n\
         s1,c1,\n\
         s2,c2,completed\n\
         s3,c3,failed\n\
         s4,c4,\n\
         s5,c5,completed\n\
         s6,c6,\n\
         nan,c7,\n",
    );
    let config = config_for(&server, dir.path().join("downloads"));

    let summary = harvest(&config, &input).await.unwrap();

    assert_eq!(summary.total_rows, 8);
    assert_eq!(summary.queued, 5);
    assert_eq!(summary.completed, 4);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    let decision_paths: Vec<String> = requested_paths(&server)
        .await
        .into_iter()
        .filter(|p| p.ends_with("/decision/"))
        .collect();
    assert_eq!(decision_paths.len(), 4);
    for done in ["s0", "s2", "s5"] {
        let needle = format!("/v2/session/{done}/decision/");
        assert!(
            !decision_paths.contains(&needle),
            "{done} was already completed but was requested again"
        );
    }

    assert_eq!(
        status_column(&input),
        vec![
            "completed", "completed", "completed", "completed", "completed", "completed",
            "completed", "skipped",
        ]
    );

    let client_dir = dir.path().join("downloads").join("c1");
    assert_eq!(
        std::fs::read(client_dir.join("front_image.jpg")).unwrap(),
        b"jpeg-bytes"
    );
    assert!(!client_dir.join("video.mp4").exists());
}

#[tokio::test]
async fn second_run_over_finished_table_makes_no_requests() {
    let server = MockServer::start().await;
    mount_api(&server).await;

    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "id,client_id\ns1,c1\ns2,c2\n");
    let config = config_for(&server, dir.path().join("downloads"));

    harvest(&config, &input).await.unwrap();
    let after_first = requested_paths(&server).await.len();
    assert!(after_first > 0);

    let summary = harvest(&config, &input).await.unwrap();

    assert_eq!(summary.queued, 0);
    assert_eq!(summary.processed, 0);
    assert_eq!(requested_paths(&server).await.len(), after_first);
}

#[tokio::test]
async fn throttled_session_is_retried_after_cooldown() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/session/s1/decision/"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_api(&server).await;

    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "id,client_id\ns1,c1\n");
    let config = config_for(&server, dir.path().join("downloads"));

    let summary = harvest(&config, &input).await.unwrap();

    assert_eq!(summary.completed, 1);
    let attempts = requested_paths(&server)
        .await
        .into_iter()
        .filter(|p| p == "/v2/session/s1/decision/")
        .count();
    assert_eq!(attempts, 2);
    assert_eq!(status_column(&input), vec!["completed"]);
}

#[tokio::test]
async fn rejected_session_is_marked_failed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/session/bad/decision/"))
        .respond_with(ResponseTemplate::new(403))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_api(&server).await;

    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "id,client_id\nbad,c0\ngood,c1\n");
    let config = config_for(&server, dir.path().join("downloads"));

    let summary = harvest(&config, &input).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(status_column(&input), vec!["failed", "completed"]);
}

#[tokio::test]
async fn missing_input_fails_before_any_request() {
    let server = MockServer::start().await;
    mount_api(&server).await;

    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path().join("downloads"));

    let err = harvest(&config, dir.path().join("absent.csv"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InputNotFound(_)), "got {err:?}");
    assert!(requested_paths(&server).await.is_empty());
}

#[tokio::test]
async fn empty_api_key_is_rejected() {
    let server = MockServer::start().await;

    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "id,client_id\ns1,c1\n");
    let mut config = config_for(&server, dir.path().join("downloads"));
    config.api.api_key = String::new();

    let err = harvest(&config, &input).await.unwrap_err();

    assert!(matches!(err, Error::Config { .. }), "got {err:?}");
    assert!(requested_paths(&server).await.is_empty());
}
