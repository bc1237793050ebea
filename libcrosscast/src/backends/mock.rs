//! Mock backend implementation for testing
//!
//! A configurable backend that simulates successes, failures, and delays at
//! every step of the publishing protocol. It is meant for integration tests
//! that exercise the upload engine and the orchestrator without credentials
//! or network access.
//!
//! Processing status follows a script. Once the script reports `Ready`, every
//! later status call reports `Ready` too, so tests never observe flapping.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::backends::{
    Capabilities, ChunkInstruction, FinalizeAck, ImageUploadTarget, MediaStatus, PostPayload,
    ProcessingState, PublishingBackend, VideoUploadInit,
};
use crate::error::{BackendError, BackendResult};
use crate::types::{CreatedPost, OwnerIdentity};

/// Configuration for mock backend behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Backend name (e.g., "alpha", "beta")
    pub name: String,

    pub capabilities: Capabilities,

    /// Whether videos go through the remux preparer first
    pub requires_video_remux: bool,

    /// Error returned by `resolve_identity`
    pub identity_error: Option<BackendError>,

    /// Error returned by `initialize_video_upload`
    pub initialize_error: Option<BackendError>,

    /// Size of each planned chunk in bytes
    pub chunk_size: u64,

    /// Chunk index whose upload fails with a network error
    pub fail_chunk_at: Option<usize>,

    /// Whether finalize is rejected
    pub reject_finalize: bool,

    /// Whether finalize reports the media as immediately available
    pub available_on_finalize: bool,

    /// Processing states reported by successive status calls; the last
    /// entry repeats once the script is exhausted
    pub status_script: Vec<ProcessingState>,

    /// Detail attached to status responses
    pub status_detail: Option<String>,

    /// Error returned by `get_media_status`
    pub status_error: Option<BackendError>,

    /// Error returned by `put_image`
    pub put_image_error: Option<BackendError>,

    /// Error returned by `create_post`
    pub create_post_error: Option<BackendError>,

    /// Delay before completing each operation (simulates network latency)
    pub delay: Duration,

    /// Extra delay for each status call
    pub status_delay: Duration,

    /// Shared call counters and recordings
    pub calls: Arc<MockCalls>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            capabilities: Capabilities::text_only().with_link(),
            requires_video_remux: false,
            identity_error: None,
            initialize_error: None,
            chunk_size: 4,
            fail_chunk_at: None,
            reject_finalize: false,
            available_on_finalize: false,
            status_script: vec![ProcessingState::Ready],
            status_detail: None,
            status_error: None,
            put_image_error: None,
            create_post_error: None,
            delay: Duration::from_millis(0),
            status_delay: Duration::from_millis(0),
            calls: Arc::new(MockCalls::default()),
        }
    }
}

impl MockConfig {
    /// Image/link backend with the given image limit
    pub fn images(name: &str, max_images: usize) -> Self {
        Self {
            name: name.to_string(),
            capabilities: Capabilities::text_only()
                .with_link()
                .with_images(max_images),
            ..Default::default()
        }
    }

    /// Chunked-video backend
    pub fn video(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capabilities: Capabilities::text_only().with_link().with_video(None),
            ..Default::default()
        }
    }
}

/// Number of calls made to each primitive, plus an ordered call log
#[derive(Debug, Default)]
pub struct MockCalls {
    resolve_identity: AtomicUsize,
    initialize: AtomicUsize,
    upload_chunk: AtomicUsize,
    finalize: AtomicUsize,
    get_media_status: AtomicUsize,
    register_image: AtomicUsize,
    put_image: AtomicUsize,
    create_post: AtomicUsize,
    log: Mutex<Vec<String>>,
    finalized: Mutex<Vec<Vec<String>>>,
    posts: Mutex<Vec<PostPayload>>,
}

impl MockCalls {
    pub fn resolve_identity(&self) -> usize {
        self.resolve_identity.load(Ordering::SeqCst)
    }

    pub fn initialize(&self) -> usize {
        self.initialize.load(Ordering::SeqCst)
    }

    pub fn upload_chunk(&self) -> usize {
        self.upload_chunk.load(Ordering::SeqCst)
    }

    pub fn finalize(&self) -> usize {
        self.finalize.load(Ordering::SeqCst)
    }

    pub fn get_media_status(&self) -> usize {
        self.get_media_status.load(Ordering::SeqCst)
    }

    pub fn register_image(&self) -> usize {
        self.register_image.load(Ordering::SeqCst)
    }

    pub fn put_image(&self) -> usize {
        self.put_image.load(Ordering::SeqCst)
    }

    pub fn create_post(&self) -> usize {
        self.create_post.load(Ordering::SeqCst)
    }

    /// Calls that touch the network in a real backend
    pub fn network_calls(&self) -> usize {
        self.resolve_identity()
            + self.initialize()
            + self.upload_chunk()
            + self.finalize()
            + self.get_media_status()
            + self.register_image()
            + self.put_image()
            + self.create_post()
    }

    /// Ordered log of operations (e.g. "upload_chunk:0", "status:ready")
    pub fn log(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    fn record(&self, entry: String) {
        lock(&self.log).push(entry);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock backend for testing
pub struct MockBackend {
    config: MockConfig,
    ready_latched: AtomicBool,
}

impl MockBackend {
    /// Create a new mock backend with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            ready_latched: AtomicBool::new(false),
        }
    }

    /// Create a text/link mock backend that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock backend whose identity resolution fails
    pub fn auth_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            identity_error: Some(BackendError::Authentication(error.to_string())),
            ..Default::default()
        })
    }

    /// Create a mock backend whose post creation fails
    pub fn post_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            create_post_error: Some(BackendError::Network(error.to_string())),
            ..Default::default()
        })
    }

    /// Create a mock backend with a delay on every operation
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> &MockCalls {
        &self.config.calls
    }

    /// Shared handle to the call counters, usable after the backend moved
    pub fn calls_handle(&self) -> Arc<MockCalls> {
        Arc::clone(&self.config.calls)
    }

    /// Chunk id lists passed to finalize, one per finalize call
    pub fn finalized_chunk_ids(&self) -> Vec<Vec<String>> {
        lock(&self.config.calls.finalized).clone()
    }

    /// Payloads passed to `create_post`
    pub fn posts(&self) -> Vec<PostPayload> {
        lock(&self.config.calls.posts).clone()
    }

    /// The chunk plan this backend issues for a payload of `size` bytes
    pub fn plan_for(&self, size: u64) -> Vec<ChunkInstruction> {
        let chunk_size = self.config.chunk_size.max(1);
        let mut plan = Vec::new();
        let mut start = 0u64;
        let mut index = 0usize;
        while start < size {
            let end = start.saturating_add(chunk_size).min(size) - 1;
            plan.push(ChunkInstruction {
                start,
                end,
                target: format!("mock://{}/chunk/{}/{}-{}", self.config.name, index, start, end),
            });
            start = end + 1;
            index += 1;
        }
        plan
    }

    /// The id returned for chunk `index` carrying `bytes`
    ///
    /// Encodes the byte range and a checksum so tests can verify that each
    /// identifier belongs to the right slice of the payload.
    pub fn chunk_id_for(index: usize, chunk: &ChunkInstruction, bytes: &[u8]) -> String {
        let checksum = bytes
            .iter()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u32));
        format!("etag-{}-{}-{}-{:08x}", index, chunk.start, chunk.end, checksum)
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }

    fn parse_chunk_target(&self, target: &str) -> BackendResult<(usize, ChunkInstruction)> {
        let prefix = format!("mock://{}/chunk/", self.config.name);
        let malformed = || BackendError::Validation(format!("unknown chunk target: {}", target));
        let rest = target.strip_prefix(&prefix).ok_or_else(malformed)?;
        let (index, range) = rest.split_once('/').ok_or_else(malformed)?;
        let (start, end) = range.split_once('-').ok_or_else(malformed)?;
        let index = index.parse().map_err(|_| malformed())?;
        let start = start.parse().map_err(|_| malformed())?;
        let end = end.parse().map_err(|_| malformed())?;
        Ok((
            index,
            ChunkInstruction {
                start,
                end,
                target: target.to_string(),
            },
        ))
    }
}

#[async_trait]
impl PublishingBackend for MockBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> Capabilities {
        self.config.capabilities
    }

    fn requires_video_remux(&self) -> bool {
        self.config.requires_video_remux
    }

    async fn resolve_identity(&self) -> BackendResult<OwnerIdentity> {
        self.config.calls.resolve_identity.fetch_add(1, Ordering::SeqCst);
        self.config.calls.record("resolve_identity".to_string());
        self.simulate_latency().await;

        match &self.config.identity_error {
            Some(e) => Err(e.clone()),
            None => Ok(OwnerIdentity::new(format!("urn:{}:owner:1", self.config.name))),
        }
    }

    async fn initialize_video_upload(
        &self,
        _owner: &OwnerIdentity,
        file_size: u64,
    ) -> BackendResult<VideoUploadInit> {
        if !self.config.capabilities.video {
            return Err(BackendError::Validation(format!(
                "{} does not support video uploads",
                self.config.name
            )));
        }
        self.config.calls.initialize.fetch_add(1, Ordering::SeqCst);
        self.config.calls.record("initialize".to_string());
        self.simulate_latency().await;

        if let Some(e) = &self.config.initialize_error {
            return Err(e.clone());
        }

        Ok(VideoUploadInit {
            media_handle: format!("urn:{}:video:{}", self.config.name, uuid::Uuid::new_v4()),
            upload_token: "mock-upload-token".to_string(),
            chunk_plan: self.plan_for(file_size),
        })
    }

    async fn upload_chunk(&self, target: &str, bytes: Vec<u8>) -> BackendResult<String> {
        self.config.calls.upload_chunk.fetch_add(1, Ordering::SeqCst);
        let (index, chunk) = self.parse_chunk_target(target)?;
        self.config.calls.record(format!("upload_chunk:{}", index));
        self.simulate_latency().await;

        if self.config.fail_chunk_at == Some(index) {
            return Err(BackendError::Network(format!(
                "Mock connection reset on chunk {}",
                index
            )));
        }
        if bytes.len() as u64 != chunk.len() {
            return Err(BackendError::Validation(format!(
                "chunk {} expected {} bytes, got {}",
                index,
                chunk.len(),
                bytes.len()
            )));
        }

        Ok(Self::chunk_id_for(index, &chunk, &bytes))
    }

    async fn finalize_video_upload(
        &self,
        _media_handle: &str,
        upload_token: &str,
        chunk_ids: &[String],
    ) -> BackendResult<FinalizeAck> {
        self.config.calls.finalize.fetch_add(1, Ordering::SeqCst);
        self.config.calls.record("finalize".to_string());
        lock(&self.config.calls.finalized).push(chunk_ids.to_vec());
        self.simulate_latency().await;

        if self.config.reject_finalize || upload_token != "mock-upload-token" {
            return Err(BackendError::FinalizeFailed(
                "Mock finalize rejected".to_string(),
            ));
        }
        if self.config.available_on_finalize {
            Ok(FinalizeAck::Available)
        } else {
            Ok(FinalizeAck::Accepted)
        }
    }

    async fn get_media_status(&self, _media_handle: &str) -> BackendResult<MediaStatus> {
        let n = self.config.calls.get_media_status.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if !self.config.status_delay.is_zero() {
            sleep(self.config.status_delay).await;
        }

        if let Some(e) = &self.config.status_error {
            self.config.calls.record("status:error".to_string());
            return Err(e.clone());
        }

        let scripted = self
            .config
            .status_script
            .get(n)
            .or(self.config.status_script.last())
            .copied()
            .unwrap_or(ProcessingState::Ready);
        let state = if self.ready_latched.load(Ordering::SeqCst) {
            ProcessingState::Ready
        } else {
            scripted
        };
        if state == ProcessingState::Ready {
            self.ready_latched.store(true, Ordering::SeqCst);
        }

        self.config.calls.record(format!("status:{:?}", state).to_lowercase());
        Ok(MediaStatus {
            state,
            detail: self.config.status_detail.clone(),
        })
    }

    async fn register_image_upload(
        &self,
        _owner: &OwnerIdentity,
    ) -> BackendResult<ImageUploadTarget> {
        if self.config.capabilities.images.is_none() {
            return Err(BackendError::Validation(format!(
                "{} does not support image uploads",
                self.config.name
            )));
        }
        let n = self.config.calls.register_image.fetch_add(1, Ordering::SeqCst);
        self.config.calls.record("register_image".to_string());
        self.simulate_latency().await;

        Ok(ImageUploadTarget {
            upload_uri: format!("mock://{}/image/{}", self.config.name, n),
            media_handle: format!("urn:{}:image:{}", self.config.name, n),
        })
    }

    async fn put_image(
        &self,
        upload_uri: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> BackendResult<()> {
        self.config.calls.put_image.fetch_add(1, Ordering::SeqCst);
        self.config
            .calls
            .record(format!("put_image:{}:{}", upload_uri, bytes.len()));
        self.simulate_latency().await;

        match &self.config.put_image_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn create_post(&self, payload: &PostPayload) -> BackendResult<CreatedPost> {
        self.config.calls.create_post.fetch_add(1, Ordering::SeqCst);
        self.config.calls.record("create_post".to_string());
        self.simulate_latency().await;

        if let Some(e) = &self.config.create_post_error {
            return Err(e.clone());
        }

        lock(&self.config.calls.posts).push(payload.clone());
        let post_id = format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4());
        Ok(CreatedPost {
            permalink: Some(format!("https://{}.example/posts/{}", self.config.name, post_id)),
            post_id,
        })
    }
}
