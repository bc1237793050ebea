//! Local media preparation before upload
//!
//! Some backends only accept videos whose index sits at the start of the
//! file. A [`MediaPreparer`] produces such a copy. The copy lives in a
//! temporary file owned by the returned [`PreparedMedia`] and is deleted when
//! that value is dropped, whichever way the publishing task exits.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{BackendError, BackendResult};
use crate::types::MediaFile;
use crate::upload::source::PayloadSource;

/// Media ready for upload, plus the temporary artifact backing it, if any
#[derive(Debug)]
pub struct PreparedMedia {
    media: MediaFile,
    artifact: Option<TempPath>,
}

impl PreparedMedia {
    /// Use `media` as-is
    pub fn original(media: MediaFile) -> Self {
        Self {
            media,
            artifact: None,
        }
    }

    /// Media read from a temporary file that is removed on drop
    pub fn from_artifact(artifact: TempPath, content_type: &str) -> BackendResult<Self> {
        let size_bytes = std::fs::metadata(&artifact)
            .map_err(|e| {
                BackendError::Validation(format!("Prepared media is unreadable: {}", e))
            })?
            .len();
        Ok(Self {
            media: MediaFile {
                source: PayloadSource::File(artifact.to_path_buf()),
                size_bytes,
                content_type: content_type.to_string(),
            },
            artifact: Some(artifact),
        })
    }

    pub fn media(&self) -> &MediaFile {
        &self.media
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }
}

#[async_trait]
pub trait MediaPreparer: Send + Sync {
    /// Produce a backend-compatible form of `video`
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Validation` if the media cannot be converted.
    async fn prepare_video(&self, video: &MediaFile) -> BackendResult<PreparedMedia>;
}

/// Uploads the original bytes unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl MediaPreparer for PassThrough {
    async fn prepare_video(&self, video: &MediaFile) -> BackendResult<PreparedMedia> {
        Ok(PreparedMedia::original(video.clone()))
    }
}

/// Remuxes videos with ffmpeg so the index (moov atom) comes first
///
/// Streams are copied, not re-encoded.
#[derive(Debug, Clone)]
pub struct FfmpegRemux {
    ffmpeg_path: String,
}

impl FfmpegRemux {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegRemux {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

fn temp_path(suffix: &str) -> BackendResult<TempPath> {
    tempfile::Builder::new()
        .prefix("crosscast-")
        .suffix(suffix)
        .tempfile()
        .map(|file| file.into_temp_path())
        .map_err(|e| BackendError::Validation(format!("Could not create temporary file: {}", e)))
}

#[async_trait]
impl MediaPreparer for FfmpegRemux {
    async fn prepare_video(&self, video: &MediaFile) -> BackendResult<PreparedMedia> {
        // ffmpeg needs a file; in-memory payloads are spilled to a temporary input
        let (input, _spilled) = match &video.source {
            PayloadSource::File(path) => (path.clone(), None),
            PayloadSource::Memory(bytes) => {
                let spilled = temp_path(".in")?;
                tokio::fs::write(&spilled, bytes).await.map_err(|e| {
                    BackendError::Validation(format!("Could not spill video to disk: {}", e))
                })?;
                debug!(path = %spilled.display(), "Spilled in-memory video for remux");
                (spilled.to_path_buf(), Some(spilled))
            }
        };

        let output = temp_path(".mp4")?;
        debug!(ffmpeg = %self.ffmpeg_path, input = %input.display(), output = %output.display(), "Remuxing video");

        let result = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(&input)
            .args(["-c", "copy", "-movflags", "+faststart"])
            .arg(output.as_os_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                BackendError::Validation(format!("Failed to run {}: {}", self.ffmpeg_path, e))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(status = %result.status, "ffmpeg remux failed");
            return Err(BackendError::Validation(format!(
                "ffmpeg remux failed ({}): {}",
                result.status,
                stderr.trim()
            )));
        }

        PreparedMedia::from_artifact(output, "video/mp4")
    }
}
