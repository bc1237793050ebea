//! Beta backend: text, link, still-image and chunked video posts
//!
//! Images use the same register-then-PUT flow as alpha.
//! Video uploads follow an initialize / upload parts / finalize protocol.
//! Initialization returns upload instructions covering the file in byte
//! ranges; every part PUT answers with an ETag that must be passed back,
//! in order, when finalizing. Processing status is then polled on the video
//! resource until it becomes available.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backends::http::{etag, ApiClient};
use crate::backends::{
    Capabilities, ChunkInstruction, FinalizeAck, ImageUploadTarget, MediaStatus, PostMedia,
    PostPayload, ProcessingState, PublishingBackend, VideoUploadInit,
};
use crate::config::{read_token, BetaConfig};
use crate::error::{BackendError, BackendResult};
use crate::types::{CreatedPost, OwnerIdentity};

pub const NAME: &str = "beta";

pub struct BetaBackend {
    api: ApiClient,
    max_images: usize,
    max_video_bytes: Option<u64>,
    remux_video: bool,
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
struct InitializeRequest<'a> {
    owner: &'a str,
    file_size: u64,
}

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    video: String,
    upload_token: String,
    instructions: Vec<UploadInstruction>,
}

#[derive(Debug, Deserialize)]
struct UploadInstruction {
    first_byte: u64,
    last_byte: u64,
    upload_url: String,
}

#[derive(Debug, Serialize)]
struct FinalizeRequest<'a> {
    video: &'a str,
    upload_token: &'a str,
    part_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct FinalizeResponse {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoStatusResponse {
    status: String,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatePostRequest<'a> {
    author: &'a str,
    commentary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    article: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    id: String,
    #[serde(default)]
    permalink: Option<String>,
}

/// Map Beta's processing vocabulary to the backend-independent state
fn processing_state(status: &str) -> BackendResult<ProcessingState> {
    match status {
        "WAITING_UPLOAD" | "PROCESSING" => Ok(ProcessingState::Pending),
        "AVAILABLE" => Ok(ProcessingState::Ready),
        "PROCESSING_FAILED" => Ok(ProcessingState::Failed),
        other => Err(BackendError::UnexpectedResponseShape(format!(
            "unknown video status '{}'",
            other
        ))),
    }
}

impl BetaBackend {
    pub fn new(config: &BetaConfig, token: SecretString) -> BackendResult<Self> {
        Ok(Self {
            api: ApiClient::new(NAME, &config.api_base, token)?,
            max_images: config.max_images,
            max_video_bytes: config.max_video_bytes,
            remux_video: config.remux_video,
        })
    }

    /// Build from configuration, reading the token file
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Authentication` if the token file is missing or empty.
    pub fn from_config(config: &BetaConfig) -> BackendResult<Self> {
        let token = read_token(NAME, &config.token_file)?;
        Self::new(config, token)
    }
}

#[async_trait]
impl PublishingBackend for BetaBackend {
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
        let response: InitializeResponse = self
            .api
            .post_json(
                "/videos/initialize",
                &InitializeRequest {
                    owner: &owner.id,
                    file_size,
                },
            )
            .await?;

        let chunk_plan = response
            .instructions
            .into_iter()
            .map(|i| ChunkInstruction {
                start: i.first_byte,
                end: i.last_byte,
                target: i.upload_url,
            })
            .collect();

        Ok(VideoUploadInit {
            media_handle: response.video,
            upload_token: response.upload_token,
            chunk_plan,
        })
    }

    async fn upload_chunk(&self, target: &str, bytes: Vec<u8>) -> BackendResult<String> {
        let headers = self
            .api
            .put_bytes(target, bytes, "application/octet-stream")
            .await?;
        etag(&headers)
    }

    async fn finalize_video_upload(
        &self,
        media_handle: &str,
        upload_token: &str,
        chunk_ids: &[String],
    ) -> BackendResult<FinalizeAck> {
        let request = FinalizeRequest {
            video: media_handle,
            upload_token,
            part_ids: chunk_ids,
        };
        let response: FinalizeResponse = match self.api.post_json("/videos/finalize", &request).await {
            Ok(response) => response,
            // Authentication and shape errors keep their own kind
            Err(BackendError::Validation(msg)) | Err(BackendError::Network(msg)) => {
                return Err(BackendError::FinalizeFailed(msg))
            }
            Err(e) => return Err(e),
        };

        match response.status.as_deref() {
            Some("AVAILABLE") => Ok(FinalizeAck::Available),
            _ => Ok(FinalizeAck::Accepted),
        }
    }

    async fn get_media_status(&self, media_handle: &str) -> BackendResult<MediaStatus> {
        let response: VideoStatusResponse = self
            .api
            .get_json(&format!("/videos/{}", urlencoding::encode(media_handle)))
            .await?;
        Ok(MediaStatus {
            state: processing_state(&response.status)?,
            detail: response.failure_reason,
        })
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
        let (article, video, images) = match &payload.media {
            PostMedia::None => (None, None, None),
            PostMedia::Link { url } => (Some(url.as_str()), None, None),
            PostMedia::Video { handle } => (None, Some(handle.as_str()), None),
            PostMedia::Images { handles } => (None, None, Some(handles.as_slice())),
        };

        let request = CreatePostRequest {
            author: &payload.owner.id,
            commentary: &payload.text,
            title: payload.title.as_deref(),
            description: payload.description.as_deref(),
            article,
            video,
            images,
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
