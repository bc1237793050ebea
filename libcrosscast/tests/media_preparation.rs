//! Temporary media artifacts never outlive the publishing task

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use libcrosscast::backends::mock::{MockBackend, MockConfig};
use libcrosscast::backends::PublishingBackend;
use libcrosscast::error::{BackendError, BackendResult, ErrorKind};
use libcrosscast::orchestrator::{ConcurrencyMode, PostOrchestrator};
use libcrosscast::prepare::{MediaPreparer, PreparedMedia};
use libcrosscast::types::{MediaFile, PostRequest};
use libcrosscast::upload::PollerConfig;

/// Copies the video into a temp file and remembers where it put it
#[derive(Default)]
struct RecordingPreparer {
    artifacts: Mutex<Vec<PathBuf>>,
    fail: bool,
}

impl RecordingPreparer {
    fn artifacts(&self) -> Vec<PathBuf> {
        self.artifacts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaPreparer for RecordingPreparer {
    async fn prepare_video(&self, video: &MediaFile) -> BackendResult<PreparedMedia> {
        if self.fail {
            return Err(BackendError::Validation("remux failed: bad container".to_string()));
        }

        let bytes = video.source.read_all().await.unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        let path = file.into_temp_path();

        self.artifacts.lock().unwrap().push(path.to_path_buf());
        PreparedMedia::from_artifact(path, &video.content_type)
    }
}

fn remuxing_backend(config: MockConfig) -> MockBackend {
    MockBackend::new(MockConfig {
        chunk_size: 8,
        requires_video_remux: true,
        ..config
    })
}

fn video_request() -> Arc<PostRequest> {
    let video = MediaFile::from_bytes(vec![9u8; 30], "video/mp4");
    Arc::new(PostRequest::builder("clip").video(video).build().unwrap())
}

async fn publish_with(
    backend: MockBackend,
    preparer: Arc<RecordingPreparer>,
) -> Vec<libcrosscast::PublishResult> {
    PostOrchestrator::new(
        vec![Arc::new(backend) as Arc<dyn PublishingBackend>],
        PollerConfig::default(),
    )
    .with_preparer(preparer)
    .publish(video_request(), None, ConcurrencyMode::Parallel)
    .await
}

#[tokio::test]
async fn test_artifact_removed_after_success() {
    let preparer = Arc::new(RecordingPreparer::default());
    let backend = remuxing_backend(MockConfig::video("beta"));
    let calls = backend.calls_handle();

    let results = publish_with(backend, Arc::clone(&preparer)).await;

    assert!(results[0].success);
    // The prepared copy was what got uploaded: 30 bytes in 8-byte chunks
    assert_eq!(calls.upload_chunk(), 4);

    let artifacts = preparer.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert!(!artifacts[0].exists(), "{} left behind", artifacts[0].display());
}

#[tokio::test]
async fn test_artifact_removed_after_upload_failure() {
    let preparer = Arc::new(RecordingPreparer::default());
    let backend = remuxing_backend(MockConfig {
        fail_chunk_at: Some(1),
        ..MockConfig::video("beta")
    });

    let results = publish_with(backend, Arc::clone(&preparer)).await;

    assert_eq!(results[0].error_kind, Some(ErrorKind::ChunkUploadFailed));
    let artifacts = preparer.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert!(!artifacts[0].exists());
}

#[tokio::test]
async fn test_preparation_failure_is_backend_result() {
    let preparer = Arc::new(RecordingPreparer {
        fail: true,
        ..Default::default()
    });
    let backend = remuxing_backend(MockConfig::video("beta"));
    let calls = backend.calls_handle();

    let results = publish_with(backend, preparer).await;

    assert_eq!(results[0].error_kind, Some(ErrorKind::Validation));
    assert!(results[0].message.as_deref().unwrap().contains("bad container"));
    // The remux runs before the backend is contacted at all
    assert_eq!(calls.resolve_identity(), 0);
    assert_eq!(calls.network_calls(), 0);
}

#[tokio::test]
async fn test_backends_without_remux_skip_preparation() {
    let preparer = Arc::new(RecordingPreparer::default());
    let backend = MockBackend::new(MockConfig {
        chunk_size: 8,
        ..MockConfig::video("beta")
    });

    let results = publish_with(backend, Arc::clone(&preparer)).await;

    assert!(results[0].success);
    assert!(preparer.artifacts().is_empty());
}
