//! Both HTTP backends driven through the orchestrator against local servers
//!
//! Every wire call is mocked with `mockito`, so these run offline. Each test
//! checks that the full media flow reaches the post, not just that the
//! primitives answer.

use std::sync::Arc;
use std::time::Duration;

use libcrosscast::backends::alpha::AlphaBackend;
use libcrosscast::backends::beta::BetaBackend;
use libcrosscast::backends::PublishingBackend;
use libcrosscast::config::{AlphaConfig, BetaConfig};
use libcrosscast::orchestrator::{ConcurrencyMode, PostOrchestrator};
use libcrosscast::types::{MediaFile, Outcome, PostRequest};
use libcrosscast::upload::PollerConfig;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tempfile::TempDir;

fn token_file(dir: &TempDir, name: &str) -> String {
    let path = dir.path().join(format!("{}.token", name));
    std::fs::write(&path, format!("{}-token\n", name)).unwrap();
    path.to_string_lossy().to_string()
}

fn poller() -> PollerConfig {
    PollerConfig {
        poll_interval: Duration::from_millis(10),
        max_wait: Duration::from_secs(5),
    }
}

fn orchestrator(backends: Vec<Arc<dyn PublishingBackend>>) -> PostOrchestrator {
    PostOrchestrator::new(backends, poller())
}

async fn alpha_video_server() -> (ServerGuard, Vec<mockito::Mock>) {
    let mut server = Server::new_async().await;
    let mut mocks = Vec::new();

    mocks.push(
        server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer alpha-token")
            .with_status(200)
            .with_body(r#"{"id":"user-42"}"#)
            .expect(1)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("POST", "/media/init")
            .match_body(Matcher::PartialJson(json!({"owner": "user-42", "total_bytes": 10})))
            .with_status(200)
            .with_body(r#"{"media_id":"m-1"}"#)
            .expect(1)
            .create_async()
            .await,
    );
    for segment in 0..2 {
        mocks.push(
            server
                .mock("PUT", format!("/media/m-1/segments/{}", segment).as_str())
                .with_status(204)
                .expect(1)
                .create_async()
                .await,
        );
    }
    mocks.push(
        server
            .mock("POST", "/media/m-1/finalize")
            .match_body(Matcher::Json(json!({"segments": ["0", "1"]})))
            .with_status(200)
            .with_body(r#"{"processing_info":{"state":"pending"}}"#)
            .expect(1)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("GET", "/media/m-1")
            .with_status(200)
            .with_body(r#"{"processing_info":{"state":"succeeded"}}"#)
            .expect_at_least(1)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("POST", "/posts")
            .match_body(Matcher::PartialJson(json!({"media_ids": ["m-1"]})))
            .with_status(200)
            .with_body(r#"{"id":"a-1"}"#)
            .expect(1)
            .create_async()
            .await,
    );

    (server, mocks)
}

async fn beta_video_server() -> (ServerGuard, Vec<mockito::Mock>) {
    let mut server = Server::new_async().await;
    let base = server.url();
    let mut mocks = Vec::new();

    mocks.push(
        server
            .mock("GET", "/me")
            .with_status(200)
            .with_body(r#"{"id":"urn:beta:person:7"}"#)
            .expect(1)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("POST", "/videos/initialize")
            .match_body(Matcher::PartialJson(json!({"file_size": 10})))
            .with_status(200)
            .with_body(
                json!({
                    "video": "urn:beta:video:1",
                    "upload_token": "ut-1",
                    "instructions": [
                        {"first_byte": 0, "last_byte": 4, "upload_url": format!("{}/part/0", base)},
                        {"first_byte": 5, "last_byte": 9, "upload_url": format!("{}/part/1", base)}
                    ]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await,
    );
    for part in 0..2 {
        mocks.push(
            server
                .mock("PUT", format!("/part/{}", part).as_str())
                .with_status(200)
                .with_header("etag", &format!("\"e{}\"", part))
                .expect(1)
                .create_async()
                .await,
        );
    }
    mocks.push(
        server
            .mock("POST", "/videos/finalize")
            .match_body(Matcher::PartialJson(json!({"part_ids": ["e0", "e1"]})))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("GET", "/videos/urn%3Abeta%3Avideo%3A1")
            .with_status(200)
            .with_body(r#"{"status":"AVAILABLE"}"#)
            .expect_at_least(1)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("POST", "/posts")
            .match_body(Matcher::PartialJson(json!({"video": "urn:beta:video:1"})))
            .with_status(201)
            .with_body(r#"{"id":"b-1"}"#)
            .expect(1)
            .create_async()
            .await,
    );

    (server, mocks)
}

#[tokio::test]
async fn test_video_reaches_both_backends() {
    let dir = TempDir::new().unwrap();
    let (alpha_server, alpha_mocks) = alpha_video_server().await;
    let (beta_server, beta_mocks) = beta_video_server().await;

    let alpha = AlphaBackend::from_config(&AlphaConfig {
        video_chunk_bytes: 6,
        ..AlphaConfig::new(alpha_server.url(), token_file(&dir, "alpha"))
    })
    .unwrap();
    let beta =
        BetaBackend::from_config(&BetaConfig::new(beta_server.url(), token_file(&dir, "beta")))
            .unwrap();

    let video = MediaFile::from_bytes((0u8..10).collect::<Vec<_>>(), "video/mp4");
    let request = Arc::new(PostRequest::builder("launch").video(video).build().unwrap());

    let backends: Vec<Arc<dyn PublishingBackend>> = vec![Arc::new(alpha), Arc::new(beta)];
    let results = orchestrator(backends)
        .publish(request, None, ConcurrencyMode::Parallel)
        .await;

    assert_eq!(Outcome::classify(&results), Outcome::AllSucceeded, "{:?}", results);
    let mut ids: Vec<_> = results
        .iter()
        .map(|r| r.post_id.clone().unwrap_or_default())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a-1", "b-1"]);

    for mock in alpha_mocks.iter().chain(beta_mocks.iter()) {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_images_reach_beta() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new_async().await;
    let upload_url = format!("{}/upload/img", server.url());

    server
        .mock("GET", "/me")
        .with_status(200)
        .with_body(r#"{"id":"urn:beta:person:7"}"#)
        .create_async()
        .await;
    let register = server
        .mock("POST", "/images/register")
        .with_status(200)
        .with_body(json!({"upload_url": upload_url, "image": "urn:beta:image:1"}).to_string())
        .expect(2)
        .create_async()
        .await;
    let put = server
        .mock("PUT", "/upload/img")
        .match_header("content-type", "image/png")
        .with_status(201)
        .expect(2)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/posts")
        .match_body(Matcher::PartialJson(json!({
            "commentary": "album",
            "images": ["urn:beta:image:1", "urn:beta:image:1"]
        })))
        .with_status(201)
        .with_body(r#"{"id":"b-2"}"#)
        .expect(1)
        .create_async()
        .await;

    let beta = BetaBackend::from_config(&BetaConfig::new(server.url(), token_file(&dir, "beta")))
        .unwrap();
    let request = PostRequest::builder("album")
        .image(MediaFile::from_bytes(vec![1u8; 4], "image/png"))
        .image(MediaFile::from_bytes(vec![2u8; 4], "image/png"))
        .build()
        .unwrap();

    let results = orchestrator(vec![Arc::new(beta)])
        .publish(Arc::new(request), None, ConcurrencyMode::Sequential)
        .await;

    assert!(results[0].success, "{:?}", results[0]);
    assert_eq!(results[0].post_id.as_deref(), Some("b-2"));
    register.assert_async().await;
    put.assert_async().await;
    post.assert_async().await;
}
