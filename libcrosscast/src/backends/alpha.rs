//! Alpha backend: text, link, still-image and segmented video posts
//!
//! Images are registered one at a time; each registration returns a
//! single-shot upload URL that receives the whole file in one PUT.
//!
//! Videos go through init / append / finalize. Alpha does not hand out an
//! upload plan: the client cuts the file into fixed-size segments and PUTs
//! segment `i` to `/media/{id}/segments/{i}`. Finalize may report that the
//! media is usable right away, otherwise its `processing_info` is polled.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backends::http::ApiClient;
use crate::backends::{
    Capabilities, ChunkInstruction, FinalizeAck, ImageUploadTarget, MediaStatus, PostMedia,
    PostPayload, ProcessingState, PublishingBackend, VideoUploadInit,
};
use crate::config::{read_token, AlphaConfig};
use crate::error::{BackendError, BackendResult};
use crate::types::{CreatedPost, OwnerIdentity};

pub const NAME: &str = "alpha";

/// Longest post text when `truncate_text` is enabled
pub const ALPHA_MAX_TEXT_CHARS: usize = 280;

pub struct AlphaBackend {
    api: ApiClient,
    max_images: usize,
    max_video_bytes: Option<u64>,
    video_chunk_bytes: u64,
    remux_video: bool,
    truncate_text: bool,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterImageRequest<'a> {
    owner: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterImageResponse {
    upload_url: String,
    image: String,
}

#[derive(Debug, Serialize)]
struct InitMediaRequest<'a> {
    owner: &'a str,
    total_bytes: u64,
    media_category: &'static str,
}

#[derive(Debug, Deserialize)]
struct InitMediaResponse {
    media_id: String,
}

#[derive(Debug, Serialize)]
struct FinalizeMediaRequest<'a> {
    segments: &'a [String],
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct ProcessingInfo {
    state: String,
    #[serde(default)]
    error: Option<ProcessingError>,
}

#[derive(Debug, Deserialize)]
struct ProcessingError {
    message: String,
}

#[derive(Debug, Serialize)]
struct CreatePostRequest<'a> {
    author: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_ids: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    id: String,
    #[serde(default)]
    permalink: Option<String>,
}

/// Map Alpha's `processing_info.state` to the backend-independent state
fn processing_state(state: &str) -> BackendResult<ProcessingState> {
    match state {
        "pending" | "in_progress" => Ok(ProcessingState::Pending),
        "succeeded" => Ok(ProcessingState::Ready),
        "failed" => Ok(ProcessingState::Failed),
        other => Err(BackendError::UnexpectedResponseShape(format!(
            "unknown processing state '{}'",
            other
        ))),
    }
}

/// Cut `text` to at most `max_chars` characters, ending in "..." when cut
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

impl AlphaBackend {
    pub fn new(config: &AlphaConfig, token: SecretString) -> BackendResult<Self> {
        Ok(Self {
            api: ApiClient::new(NAME, &config.api_base, token)?,
            max_images: config.max_images,
            max_video_bytes: config.max_video_bytes,
            video_chunk_bytes: config.video_chunk_bytes.max(1),
            remux_video: config.remux_video,
            truncate_text: config.truncate_text,
        })
    }

    /// Build from configuration, reading the token file
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Authentication` if the token file is missing or empty.
    pub fn from_config(config: &AlphaConfig) -> BackendResult<Self> {
        let token = read_token(NAME, &config.token_file)?;
        Self::new(config, token)
    }

    fn media_path(media_id: &str) -> String {
        format!("/media/{}", urlencoding::encode(media_id))
    }

    /// Fixed-size segments covering `file_size` bytes
    fn segment_plan(&self, media_id: &str, file_size: u64) -> Vec<ChunkInstruction> {
        let base = self.api.url(&Self::media_path(media_id));
        let mut plan = Vec::new();
        let mut start = 0u64;
        while start < file_size {
            let end = start
                .saturating_add(self.video_chunk_bytes)
                .min(file_size)
                - 1;
            plan.push(ChunkInstruction {
                start,
                end,
                target: format!("{}/segments/{}", base, plan.len()),
            });
            start = end + 1;
        }
        plan
    }
}

/// Segment index encoded at the end of a segment upload URL
fn segment_index(target: &str) -> BackendResult<String> {
    target
        .rsplit_once("/segments/")
        .map(|(_, index)| index)
        .filter(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
        .ok_or_else(|| {
            BackendError::UnexpectedResponseShape(format!("'{}' is not a segment URL", target))
        })
}

#[async_trait]
impl PublishingBackend for AlphaBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::text_only()
            .with_link()
            .with_images(self.max_images)
            .with_video(self.max_video_bytes)
    }

    fn requires_video_remux(&self) -> bool {
        self.remux_video
    }

    async fn resolve_identity(&self) -> BackendResult<OwnerIdentity> {
        let me: MeResponse = self.api.get_json("/me").await?;
        debug!(backend = NAME, owner = %me.id, "Resolved identity");
        Ok(OwnerIdentity {
            id: me.id,
            display_name: me.name,
        })
    }

    async fn initialize_video_upload(
        &self,
        owner: &OwnerIdentity,
        file_size: u64,
    ) -> BackendResult<VideoUploadInit> {
        if file_size == 0 {
            return Err(BackendError::Validation("video is empty".to_string()));
        }

        let response: InitMediaResponse = self
            .api
            .post_json(
                "/media/init",
                &InitMediaRequest {
                    owner: &owner.id,
                    total_bytes: file_size,
                    media_category: "video",
                },
            )
            .await?;

        let chunk_plan = self.segment_plan(&response.media_id, file_size);
        debug!(
            backend = NAME,
            media_id = %response.media_id,
            segments = chunk_plan.len(),
            "Initialized video upload"
        );

        Ok(VideoUploadInit {
            upload_token: response.media_id.clone(),
            media_handle: response.media_id,
            chunk_plan,
        })
    }

    async fn upload_chunk(&self, target: &str, bytes: Vec<u8>) -> BackendResult<String> {
        let index = segment_index(target)?;
        self.api
            .put_bytes(target, bytes, "application/octet-stream")
            .await?;
        Ok(index)
    }

    async fn finalize_video_upload(
        &self,
        media_handle: &str,
        _upload_token: &str,
        chunk_ids: &[String],
    ) -> BackendResult<FinalizeAck> {
        let path = format!("{}/finalize", Self::media_path(media_handle));
        let request = FinalizeMediaRequest {
            segments: chunk_ids,
        };
        let response: MediaResponse = match self.api.post_json(&path, &request).await {
            Ok(response) => response,
            Err(BackendError::Validation(msg)) | Err(BackendError::Network(msg)) => {
                return Err(BackendError::FinalizeFailed(msg))
            }
            Err(e) => return Err(e),
        };

        match response.processing_info {
            None => Ok(FinalizeAck::Available),
            Some(info) if info.state == "succeeded" => Ok(FinalizeAck::Available),
            Some(info) if info.state == "failed" => Err(BackendError::FinalizeFailed(
                info.error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "media rejected".to_string()),
            )),
            Some(_) => Ok(FinalizeAck::Accepted),
        }
    }

    async fn get_media_status(&self, media_handle: &str) -> BackendResult<MediaStatus> {
        let response: MediaResponse = self.api.get_json(&Self::media_path(media_handle)).await?;
        match response.processing_info {
            None => Ok(MediaStatus::new(ProcessingState::Ready)),
            Some(info) => Ok(MediaStatus {
                state: processing_state(&info.state)?,
                detail: info.error.map(|e| e.message),
            }),
        }
    }

    async fn register_image_upload(&self, owner: &OwnerIdentity) -> BackendResult<ImageUploadTarget> {
        let response: RegisterImageResponse = self
            .api
            .post_json("/images/register", &RegisterImageRequest { owner: &owner.id })
            .await?;
        Ok(ImageUploadTarget {
            upload_uri: response.upload_url,
            media_handle: response.image,
        })
    }

    async fn put_image(
        &self,
        upload_uri: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> BackendResult<()> {
        self.api.put_bytes(upload_uri, bytes, content_type).await?;
        Ok(())
    }

    async fn create_post(&self, payload: &PostPayload) -> BackendResult<CreatedPost> {
        let video_ids;
        let (link, media_ids) = match &payload.media {
            PostMedia::None => (None, None),
            PostMedia::Link { url } => (Some(url.as_str()), None),
            PostMedia::Images { handles } => (None, Some(handles.as_slice())),
            PostMedia::Video { handle } => {
                video_ids = [handle.clone()];
                (None, Some(&video_ids[..]))
            }
        };

        let text = if self.truncate_text {
            truncate_text(&payload.text, ALPHA_MAX_TEXT_CHARS)
        } else {
            payload.text.clone()
        };

        let request = CreatePostRequest {
            author: &payload.owner.id,
            text: &text,
            title: payload.title.as_deref(),
            description: payload.description.as_deref(),
            link,
            media_ids,
        };
        let response: CreatePostResponse = self.api.post_json("/posts", &request).await?;

        let permalink = response
            .permalink
            .unwrap_or_else(|| format!("{}/posts/{}", self.api.api_base(), response.id));
        Ok(CreatedPost {
            post_id: response.id,
            permalink: Some(permalink),
        })
    }
}
