//! Publish operations shared by every backend
//!
//! These are written once against the [`PublishingBackend`] primitives. A
//! [`Publisher`] binds a backend to the identity resolved for it, so every
//! call in one run reuses the same owner without re-authenticating.

use tracing::debug;

use crate::backends::{PostMedia, PostPayload, PublishingBackend};
use crate::error::{BackendError, BackendResult};
use crate::types::{CreatedPost, MediaFile, OwnerIdentity};
use crate::upload::session::UploadSession;

/// Image bytes read from disk before any upload starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl LoadedImage {
    /// Read every image payload, in order
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Validation` naming the first unreadable image.
    pub async fn load_all(images: &[&MediaFile]) -> BackendResult<Vec<LoadedImage>> {
        let mut loaded = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            let bytes = image.source.read_all().await.map_err(|e| {
                BackendError::Validation(format!("Could not read image {}: {}", index, e))
            })?;
            loaded.push(LoadedImage {
                bytes,
                content_type: image.content_type.clone(),
            });
        }
        Ok(loaded)
    }
}

pub struct Publisher<'a> {
    backend: &'a dyn PublishingBackend,
    owner: &'a OwnerIdentity,
}

impl<'a> Publisher<'a> {
    pub fn new(backend: &'a dyn PublishingBackend, owner: &'a OwnerIdentity) -> Self {
        Self { backend, owner }
    }

    pub async fn publish_text(&self, text: &str) -> BackendResult<CreatedPost> {
        if text.trim().is_empty() {
            return Err(BackendError::Validation("Content cannot be empty".to_string()));
        }
        self.create(text, None, None, PostMedia::None).await
    }

    pub async fn publish_with_link(
        &self,
        text: &str,
        url: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> BackendResult<CreatedPost> {
        let media = PostMedia::Link {
            url: url.to_string(),
        };
        self.create(text, title, description, media).await
    }

    /// Upload each image with a single PUT, then create one post referencing all of them
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Validation` before any network call if the
    /// backend does not take images or `images` exceeds its maximum. A failed
    /// image upload aborts the post; no partial post is created.
    pub async fn publish_with_images(
        &self,
        text: &str,
        images: Vec<LoadedImage>,
        title: Option<&str>,
        description: Option<&str>,
    ) -> BackendResult<CreatedPost> {
        let name = self.backend.name();
        match self.backend.capabilities().images {
            None => {
                return Err(BackendError::Validation(format!(
                    "{} does not support images",
                    name
                )))
            }
            Some(max) if images.len() > max => {
                return Err(BackendError::Validation(format!(
                    "{} accepts at most {} images (got {})",
                    name,
                    max,
                    images.len()
                )))
            }
            Some(_) => {}
        }

        let mut handles = Vec::with_capacity(images.len());
        for (index, image) in images.into_iter().enumerate() {
            let target = self.backend.register_image_upload(self.owner).await?;
            self.backend
                .put_image(&target.upload_uri, image.bytes, &image.content_type)
                .await?;
            debug!(backend = name, image = index, media_handle = %target.media_handle, "Image uploaded");
            handles.push(target.media_handle);
        }

        self.create(text, title, description, PostMedia::Images { handles })
            .await
    }

    /// Create a post referencing a video whose upload session is `Available`
    ///
    /// # Errors
    ///
    /// A failed session's own error is returned unchanged; any other
    /// non-available session is a `BackendError::Validation`.
    pub async fn publish_with_video(
        &self,
        text: &str,
        session: &UploadSession,
        title: Option<&str>,
    ) -> BackendResult<CreatedPost> {
        if !session.is_available() {
            return Err(session.error.clone().unwrap_or_else(|| {
                BackendError::Validation(format!(
                    "video upload is {}, not available",
                    session.state
                ))
            }));
        }

        let media = PostMedia::Video {
            handle: session.media_handle.clone(),
        };
        self.create(text, title, None, media).await
    }

    async fn create(
        &self,
        text: &str,
        title: Option<&str>,
        description: Option<&str>,
        media: PostMedia,
    ) -> BackendResult<CreatedPost> {
        let payload = PostPayload {
            owner: self.owner.clone(),
            text: text.to_string(),
            title: title.map(str::to_string),
            description: description.map(str::to_string),
            media,
        };
        self.backend.create_post(&payload).await
    }
}
