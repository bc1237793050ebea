//! End-to-end publishing workflows against mock backends
//!
//! These tests verify complete workflows including:
//! - Fan-out of a large video to two backends in parallel
//! - Sequential dispatch order and timing
//! - Identity resolution once per backend per run
//! - Per-backend publish path selection

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use libcrosscast::backends::mock::{MockBackend, MockCalls, MockConfig};
use libcrosscast::backends::{PostMedia, ProcessingState, PublishingBackend};
use libcrosscast::events::Event;
use libcrosscast::orchestrator::{ConcurrencyMode, PostOrchestrator};
use libcrosscast::types::{MediaFile, Outcome, PostRequest};
use libcrosscast::upload::{PollerConfig, SessionState};
use tokio::time::Instant;

const MB: u64 = 1024 * 1024;

fn video_backend(name: &str, delay_secs: u64) -> (Arc<dyn PublishingBackend>, Arc<MockCalls>) {
    let backend = MockBackend::new(MockConfig {
        chunk_size: 5 * MB,
        delay: Duration::from_secs(delay_secs),
        status_script: vec![ProcessingState::Ready],
        ..MockConfig::video(name)
    });
    let calls = backend.calls_handle();
    (Arc::new(backend), calls)
}

fn fifty_mb_video() -> MediaFile {
    let bytes: Vec<u8> = (0..50 * MB).map(|i| (i % 251) as u8).collect();
    MediaFile::from_bytes(bytes, "video/mp4")
}

fn poller() -> PollerConfig {
    PollerConfig {
        poll_interval: Duration::from_secs(5),
        max_wait: Duration::from_secs(300),
    }
}

/// Position of the first log entry equal to `entry`
fn position(calls: &MockCalls, entry: &str) -> Option<usize> {
    calls.log().iter().position(|e| e == entry)
}

#[tokio::test(start_paused = true)]
async fn test_large_video_parallel_fan_out() -> Result<()> {
    // Alpha: 15 operations at 1s; Beta: 15 operations at 2s
    let (alpha, alpha_calls) = video_backend("alpha", 1);
    let (beta, beta_calls) = video_backend("beta", 2);
    let orchestrator = PostOrchestrator::new(vec![alpha, beta], poller());

    let request = Arc::new(PostRequest::builder("hello").video(fifty_mb_video()).build()?);

    let started = Instant::now();
    let results = orchestrator
        .publish(request, None, ConcurrencyMode::Parallel)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success), "{:?}", results);
    assert_eq!(Outcome::classify(&results), Outcome::AllSucceeded);

    // Completion order: the faster backend reports first
    assert_eq!(results[0].backend, "alpha");
    assert_eq!(results[1].backend, "beta");

    // Wall time tracks the slower backend, not the sum (15s + 30s)
    assert!(elapsed >= Duration::from_secs(30), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(31), "elapsed {:?}", elapsed);

    for calls in [&alpha_calls, &beta_calls] {
        assert_eq!(calls.upload_chunk(), 10);
        assert_eq!(calls.finalize(), 1);
        assert_eq!(calls.create_post(), 1);

        let ready = position(calls, "status:ready").expect("media became ready");
        let created = position(calls, "create_post").expect("post created");
        assert!(ready < created, "post created before media was available");
    }

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sequential_mode_runs_in_request_order() -> Result<()> {
    let (alpha, alpha_calls) = video_backend("alpha", 1);
    let (beta, beta_calls) = video_backend("beta", 2);
    let orchestrator = PostOrchestrator::new(vec![alpha, beta], poller());

    let request = Arc::new(PostRequest::builder("hello").video(fifty_mb_video()).build()?);
    let targets = vec!["beta".to_string(), "alpha".to_string()];

    let started = Instant::now();
    let results = orchestrator
        .publish(request, Some(targets.as_slice()), ConcurrencyMode::Sequential)
        .await;
    let elapsed = started.elapsed();

    let order: Vec<_> = results.iter().map(|r| r.backend.as_str()).collect();
    assert_eq!(order, vec!["beta", "alpha"]);
    assert!(results.iter().all(|r| r.success));

    // One backend at a time: 30s + 15s
    assert_eq!(elapsed, Duration::from_secs(45));
    assert_eq!(alpha_calls.create_post(), 1);
    assert_eq!(beta_calls.create_post(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sequential_continues_after_failure() -> Result<()> {
    let failing = MockBackend::auth_failure("alpha", "token revoked");
    let (beta, beta_calls) = video_backend("beta", 0);
    let orchestrator = PostOrchestrator::new(vec![Arc::new(failing), beta], poller());

    let request = Arc::new(PostRequest::builder("hello").build()?);
    let results = orchestrator
        .publish(request, None, ConcurrencyMode::Sequential)
        .await;

    assert!(!results[0].success);
    assert!(results[0].message.as_deref().unwrap_or_default().contains("token revoked"));
    assert!(results[1].success);
    assert_eq!(beta_calls.create_post(), 1);
    assert_eq!(Outcome::classify(&results), Outcome::SomeSucceeded);

    Ok(())
}

#[tokio::test]
async fn test_identity_resolved_once_per_backend() -> Result<()> {
    let backend = MockBackend::new(MockConfig::images("alpha", 4));
    let calls = backend.calls_handle();
    let orchestrator = PostOrchestrator::new(vec![Arc::new(backend)], poller());

    let mut builder = PostRequest::builder("album");
    for _ in 0..4 {
        builder = builder.image(MediaFile::from_bytes(vec![7u8; 64], "image/png"));
    }
    let results = orchestrator
        .publish(Arc::new(builder.build()?), None, ConcurrencyMode::Parallel)
        .await;

    assert!(results[0].success);
    assert_eq!(calls.resolve_identity(), 1);
    assert_eq!(calls.register_image(), 4);
    assert_eq!(calls.put_image(), 4);
    assert_eq!(calls.create_post(), 1);

    Ok(())
}

#[tokio::test]
async fn test_each_backend_uses_its_narrowest_path() -> Result<()> {
    // Alpha takes images but not video; beta takes video but not images
    let alpha = MockBackend::new(MockConfig::images("alpha", 4));
    let beta = MockBackend::new(MockConfig {
        chunk_size: 8,
        ..MockConfig::video("beta")
    });
    let (alpha_calls, beta_calls) = (alpha.calls_handle(), beta.calls_handle());
    let orchestrator = PostOrchestrator::new(vec![Arc::new(alpha), Arc::new(beta)], poller());

    let request = PostRequest::builder("see link")
        .link("https://example.com/article")
        .title("Article")
        .build()?;
    let results = orchestrator
        .publish(Arc::new(request), None, ConcurrencyMode::Parallel)
        .await;

    assert!(results.iter().all(|r| r.success));
    assert_eq!(alpha_calls.register_image(), 0);
    assert_eq!(beta_calls.initialize(), 0);
    assert_eq!(alpha_calls.create_post(), 1);
    assert_eq!(beta_calls.create_post(), 1);

    Ok(())
}

#[tokio::test]
async fn test_video_request_fails_validation_on_image_backend() -> Result<()> {
    let alpha = MockBackend::new(MockConfig::images("alpha", 4));
    let beta = MockBackend::new(MockConfig {
        chunk_size: 8,
        ..MockConfig::video("beta")
    });
    let alpha_calls = alpha.calls_handle();
    let orchestrator = PostOrchestrator::new(vec![Arc::new(alpha), Arc::new(beta)], poller());

    let request = PostRequest::builder("clip")
        .video(MediaFile::from_bytes(vec![1u8; 20], "video/mp4"))
        .link("https://example.com")
        .build()?;
    let results = orchestrator
        .publish(Arc::new(request), None, ConcurrencyMode::Sequential)
        .await;

    assert!(!results[0].success);
    assert_eq!(results[0].backend, "alpha");
    assert_eq!(alpha_calls.network_calls(), 0);
    assert!(results[1].success);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_video_post_references_uploaded_media() -> Result<()> {
    let backend = MockBackend::new(MockConfig {
        chunk_size: 16,
        status_script: vec![ProcessingState::Pending, ProcessingState::Ready],
        ..MockConfig::video("beta")
    });
    let calls = backend.calls_handle();
    let backend = Arc::new(backend);
    let orchestrator = PostOrchestrator::new(
        vec![Arc::clone(&backend) as Arc<dyn PublishingBackend>],
        poller(),
    );
    let mut events = orchestrator.subscribe();

    let request = PostRequest::builder("clip")
        .video(MediaFile::from_bytes(vec![3u8; 40], "video/mp4"))
        .title("My clip")
        .build()?;
    let results = orchestrator
        .publish(Arc::new(request), None, ConcurrencyMode::Parallel)
        .await;

    assert!(results[0].success);
    assert_eq!(calls.upload_chunk(), 3);
    assert_eq!(calls.get_media_status(), 2);

    let posts = backend.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title.as_deref(), Some("My clip"));
    match &posts[0].media {
        PostMedia::Video { handle } => assert!(handle.starts_with("urn:beta:video:")),
        other => panic!("expected a video post, got {:?}", other),
    }

    let mut transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::SessionTransition { state, .. } = event {
            transitions.push(state);
        }
    }
    assert_eq!(
        transitions,
        vec![
            SessionState::Uploading,
            SessionState::Finalizing,
            SessionState::Processing,
            SessionState::Available
        ]
    );

    Ok(())
}
