//! Core types for Crosscast

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BackendError, CrosscastError, ErrorKind, Result};
use crate::upload::source::PayloadSource;

/// A binary media payload: where the bytes live and how many there are
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub source: PayloadSource,
    pub size_bytes: u64,
    pub content_type: String,
}

impl MediaFile {
    /// Reference a file on disk without reading it
    ///
    /// The size is taken from file metadata so a chunk plan can be computed
    /// before any byte is loaded.
    pub fn from_path(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            CrosscastError::InvalidInput(format!("Cannot read {}: {}", path.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(CrosscastError::InvalidInput(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }
        let content_type = content_type_for_path(&path).to_string();
        Ok(Self {
            source: PayloadSource::File(path),
            size_bytes: metadata.len(),
            content_type,
        })
    }

    /// Wrap an in-memory buffer (produced by an upstream pipeline)
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            size_bytes: bytes.len() as u64,
            source: PayloadSource::Memory(bytes.into()),
            content_type: content_type.into(),
        }
    }
}

/// Guess a MIME type from a file extension
pub fn content_type_for_path(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Link,
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachmentKind::Image => write!(f, "image"),
            AttachmentKind::Video => write!(f, "video"),
            AttachmentKind::Link => write!(f, "link"),
        }
    }
}

/// One attachment of a post
#[derive(Debug, Clone)]
pub enum Attachment {
    Image(MediaFile),
    Video(MediaFile),
    Link(String),
}

impl Attachment {
    pub fn kind(&self) -> AttachmentKind {
        match self {
            Attachment::Image(_) => AttachmentKind::Image,
            Attachment::Video(_) => AttachmentKind::Video,
            Attachment::Link(_) => AttachmentKind::Link,
        }
    }

    /// Byte size of the payload; links have none
    pub fn size_bytes(&self) -> Option<u64> {
        match self {
            Attachment::Image(media) | Attachment::Video(media) => Some(media.size_bytes),
            Attachment::Link(_) => None,
        }
    }
}

/// A single logical post to publish everywhere
///
/// Built once through [`PostRequestBuilder`] and read-only afterwards; the
/// orchestrator shares it between backend tasks behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PostRequest {
    id: String,
    text: String,
    attachments: Vec<Attachment>,
    title: Option<String>,
    description: Option<String>,
}

impl PostRequest {
    pub fn builder(text: impl Into<String>) -> PostRequestBuilder {
        PostRequestBuilder {
            text: text.into(),
            attachments: Vec::new(),
            title: None,
            description: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn video(&self) -> Option<&MediaFile> {
        self.attachments.iter().find_map(|a| match a {
            Attachment::Video(media) => Some(media),
            _ => None,
        })
    }

    pub fn images(&self) -> Vec<&MediaFile> {
        self.attachments
            .iter()
            .filter_map(|a| match a {
                Attachment::Image(media) => Some(media),
                _ => None,
            })
            .collect()
    }

    pub fn link(&self) -> Option<&str> {
        self.attachments.iter().find_map(|a| match a {
            Attachment::Link(url) => Some(url.as_str()),
            _ => None,
        })
    }
}

pub struct PostRequestBuilder {
    text: String,
    attachments: Vec<Attachment>,
    title: Option<String>,
    description: Option<String>,
}

impl PostRequestBuilder {
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn image(self, media: MediaFile) -> Self {
        self.attachment(Attachment::Image(media))
    }

    pub fn video(self, media: MediaFile) -> Self {
        self.attachment(Attachment::Video(media))
    }

    pub fn link(self, url: impl Into<String>) -> Self {
        self.attachment(Attachment::Link(url.into()))
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate the backend-independent invariants and freeze the request
    ///
    /// # Errors
    ///
    /// Returns `CrosscastError::InvalidInput` if:
    /// - the text is blank and there are no attachments
    /// - more than one video or more than one link is attached
    /// - a video payload is empty
    pub fn build(self) -> Result<PostRequest> {
        if self.text.trim().is_empty() && self.attachments.is_empty() {
            return Err(CrosscastError::InvalidInput(
                "Post needs text or at least one attachment".to_string(),
            ));
        }

        let count = |kind: AttachmentKind| self.attachments.iter().filter(|a| a.kind() == kind).count();
        if count(AttachmentKind::Video) > 1 {
            return Err(CrosscastError::InvalidInput(
                "At most one video attachment is allowed".to_string(),
            ));
        }
        if count(AttachmentKind::Link) > 1 {
            return Err(CrosscastError::InvalidInput(
                "At most one link attachment is allowed".to_string(),
            ));
        }
        if let Some(Attachment::Video(media)) = self
            .attachments
            .iter()
            .find(|a| a.kind() == AttachmentKind::Video)
        {
            if media.size_bytes == 0 {
                return Err(CrosscastError::InvalidInput("Video payload is empty".to_string()));
            }
        }

        Ok(PostRequest {
            id: Uuid::new_v4().to_string(),
            text: self.text,
            attachments: self.attachments,
            title: self.title,
            description: self.description,
        })
    }
}

/// Identity of the account a backend publishes as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerIdentity {
    /// Backend-specific owner reference (e.g. "urn:alpha:person:42")
    pub id: String,
    pub display_name: Option<String>,
}

impl OwnerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }
}

/// Post created on a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPost {
    pub post_id: String,
    pub permalink: Option<String>,
}

/// Outcome of publishing to a single backend
///
/// Exactly one is produced per requested backend per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    /// Backend name (e.g., "alpha", "beta")
    pub backend: String,
    pub success: bool,
    /// Backend-specific post ID (if successful)
    pub post_id: Option<String>,
    pub permalink: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Error message (if failed)
    pub message: Option<String>,
    /// When the result was produced (Unix timestamp)
    pub completed_at: i64,
}

impl PublishResult {
    pub fn published(backend: impl Into<String>, post: CreatedPost) -> Self {
        Self {
            backend: backend.into(),
            success: true,
            post_id: Some(post.post_id),
            permalink: post.permalink,
            error_kind: None,
            message: None,
            completed_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn failed(backend: impl Into<String>, error: &BackendError) -> Self {
        Self {
            backend: backend.into(),
            success: false,
            post_id: None,
            permalink: None,
            error_kind: Some(error.kind()),
            message: Some(error.to_string()),
            completed_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// How many of the requested backends succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    AllSucceeded,
    SomeSucceeded,
    NoneSucceeded,
}

impl Outcome {
    pub fn classify(results: &[PublishResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        if succeeded == 0 {
            Outcome::NoneSucceeded
        } else if succeeded == results.len() {
            Outcome::AllSucceeded
        } else {
            Outcome::SomeSucceeded
        }
    }

    /// Process exit code for the binary
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::AllSucceeded => 0,
            Outcome::SomeSucceeded => 4,
            Outcome::NoneSucceeded => 1,
        }
    }

    /// Exit code for a finished publish
    ///
    /// Same as [`Outcome::exit_code`], except that a run where every backend
    /// failed authentication exits with 2.
    pub fn exit_code_for(results: &[PublishResult]) -> i32 {
        let all_auth = !results.is_empty()
            && results
                .iter()
                .all(|r| r.error_kind == Some(ErrorKind::Authentication));
        if all_auth {
            2
        } else {
            Outcome::classify(results).exit_code()
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::AllSucceeded => write!(f, "all backends succeeded"),
            Outcome::SomeSucceeded => write!(f, "some backends failed"),
            Outcome::NoneSucceeded => write!(f, "all backends failed"),
        }
    }
}
