//! Publishing backend abstraction and implementations
//!
//! Every backend variant declares a [`Capabilities`] set and implements the
//! primitives of the [`PublishingBackend`] trait. Higher-level publish
//! operations ([`crate::publish::Publisher`]) and the upload engine
//! ([`crate::upload`]) are written once against the trait, so a new backend
//! only has to speak its own wire protocol.
//!
//! # Examples
//!
//! ```no_run
//! use libcrosscast::backends::{PublishingBackend, beta::BetaBackend};
//! use libcrosscast::config::BetaConfig;
//!
//! # async fn example(config: &BetaConfig) -> libcrosscast::error::Result<()> {
//! let backend = BetaBackend::from_config(config)?;
//!
//! if backend.capabilities().video {
//!     let owner = backend.resolve_identity().await?;
//!     println!("{} publishes as {}", backend.name(), owner.id);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, BackendResult};
use crate::types::{CreatedPost, OwnerIdentity, PostRequest};

pub mod alpha;
pub mod beta;
mod http;

// Mock backend is available for all builds (not just tests) to support integration tests
pub mod mock;

/// What a backend can publish
///
/// Checked against a [`PostRequest`] before any network call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub text: bool,
    pub link: bool,
    /// `Some(max_count)` when still images are supported
    pub images: Option<usize>,
    pub video: bool,
    /// Largest accepted video, if the backend declares one
    pub max_video_bytes: Option<u64>,
}

impl Capabilities {
    pub const fn text_only() -> Self {
        Self {
            text: true,
            link: false,
            images: None,
            video: false,
            max_video_bytes: None,
        }
    }

    pub const fn with_link(mut self) -> Self {
        self.link = true;
        self
    }

    pub const fn with_images(mut self, max_count: usize) -> Self {
        self.images = Some(max_count);
        self
    }

    pub const fn with_video(mut self, max_bytes: Option<u64>) -> Self {
        self.video = true;
        self.max_video_bytes = max_bytes;
        self
    }

    /// Check a request against this capability set and pick the publish path
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Validation` if the selected path is unsupported,
    /// the video is too large, or there are more images than allowed.
    pub fn validate(&self, backend: &str, request: &PostRequest) -> BackendResult<PublishPath> {
        let path = PublishPath::for_request(request);
        let image_count = request.images().len();

        if let Some(max) = self.images {
            if image_count > max {
                return Err(BackendError::Validation(format!(
                    "{} accepts at most {} images (got {})",
                    backend, max, image_count
                )));
            }
        }

        match path {
            PublishPath::Video => {
                if !self.video {
                    return Err(BackendError::Validation(format!(
                        "{} does not support video",
                        backend
                    )));
                }
                if let (Some(max), Some(video)) = (self.max_video_bytes, request.video()) {
                    if video.size_bytes > max {
                        return Err(BackendError::Validation(format!(
                            "{} accepts videos up to {} bytes (got {})",
                            backend, max, video.size_bytes
                        )));
                    }
                }
            }
            PublishPath::Images => {
                if self.images.is_none() {
                    return Err(BackendError::Validation(format!(
                        "{} does not support images",
                        backend
                    )));
                }
            }
            PublishPath::Link => {
                if !self.link {
                    return Err(BackendError::Validation(format!(
                        "{} does not support link posts",
                        backend
                    )));
                }
            }
            PublishPath::Text => {
                if !self.text {
                    return Err(BackendError::Validation(format!(
                        "{} does not support text-only posts",
                        backend
                    )));
                }
                if request.text().trim().is_empty() {
                    return Err(BackendError::Validation("Content cannot be empty".to_string()));
                }
            }
        }

        Ok(path)
    }
}

/// Narrowest publish operation applicable to a request
///
/// Precedence is video > images > link > text: a request carrying a video is
/// published through the video path even if it also has a link or title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishPath {
    Video,
    Images,
    Link,
    Text,
}

impl PublishPath {
    pub fn for_request(request: &PostRequest) -> Self {
        if request.video().is_some() {
            PublishPath::Video
        } else if !request.images().is_empty() {
            PublishPath::Images
        } else if request.link().is_some() {
            PublishPath::Link
        } else {
            PublishPath::Text
        }
    }
}

/// One entry of a chunk plan: an inclusive byte range and where to send it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInstruction {
    pub start: u64,
    /// Inclusive
    pub end: u64,
    pub target: String,
}

impl ChunkInstruction {
    /// Number of bytes covered by this instruction
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        (self.end - self.start).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Response to `initialize_video_upload`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoUploadInit {
    pub media_handle: String,
    pub upload_token: String,
    pub chunk_plan: Vec<ChunkInstruction>,
}

/// Response to `finalize_video_upload`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeAck {
    /// Server-side processing has started
    Accepted,
    /// Media is usable right away; no processing to wait for
    Available,
}

/// Backend-independent processing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStatus {
    pub state: ProcessingState,
    pub detail: Option<String>,
}

impl MediaStatus {
    pub fn new(state: ProcessingState) -> Self {
        Self {
            state,
            detail: None,
        }
    }
}

/// Response to `register_image_upload`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUploadTarget {
    pub upload_uri: String,
    pub media_handle: String,
}

/// Media referenced by a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostMedia {
    None,
    Link { url: String },
    Images { handles: Vec<String> },
    Video { handle: String },
}

/// Everything `create_post` needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPayload {
    pub owner: OwnerIdentity,
    pub text: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub media: PostMedia,
}

/// Publishing backend trait
///
/// Implementations speak one platform's protocol. All methods take `&self`:
/// a backend is shared (behind an `Arc`) with the task publishing to it, and
/// per-invocation state such as the resolved identity is passed in by the
/// caller rather than stored.
///
/// Upload primitives a backend does not support keep their default
/// implementation, which fails with `BackendError::Validation`.
#[async_trait]
pub trait PublishingBackend: Send + Sync {
    /// Lowercase identifier (e.g., "alpha", "beta")
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Whether videos must be remuxed locally before upload
    fn requires_video_remux(&self) -> bool {
        false
    }

    /// Resolve the account this backend publishes as
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Authentication` if the credentials are rejected.
    async fn resolve_identity(&self) -> BackendResult<OwnerIdentity>;

    /// Start a chunked video upload and obtain its chunk plan
    async fn initialize_video_upload(
        &self,
        _owner: &OwnerIdentity,
        _file_size: u64,
    ) -> BackendResult<VideoUploadInit> {
        Err(unsupported(self.name(), "video uploads"))
    }

    /// Transfer one chunk; returns the backend's identifier for it
    async fn upload_chunk(&self, _target: &str, _bytes: Vec<u8>) -> BackendResult<String> {
        Err(unsupported(self.name(), "chunk uploads"))
    }

    /// Commit all chunks, in plan order
    async fn finalize_video_upload(
        &self,
        _media_handle: &str,
        _upload_token: &str,
        _chunk_ids: &[String],
    ) -> BackendResult<FinalizeAck> {
        Err(unsupported(self.name(), "video uploads"))
    }

    async fn get_media_status(&self, _media_handle: &str) -> BackendResult<MediaStatus> {
        Err(unsupported(self.name(), "media status"))
    }

    /// Obtain a single-shot upload target for a still image
    async fn register_image_upload(
        &self,
        _owner: &OwnerIdentity,
    ) -> BackendResult<ImageUploadTarget> {
        Err(unsupported(self.name(), "image uploads"))
    }

    /// PUT the whole image to the target obtained from `register_image_upload`
    async fn put_image(
        &self,
        _upload_uri: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> BackendResult<()> {
        Err(unsupported(self.name(), "image uploads"))
    }

    async fn create_post(&self, payload: &PostPayload) -> BackendResult<CreatedPost>;
}

fn unsupported(backend: &str, what: &str) -> BackendError {
    BackendError::Validation(format!("{} does not support {}", backend, what))
}
