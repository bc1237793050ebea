//! Chunked upload session state machine
//!
//! ```text
//! Initialized -> Uploading -> Finalizing -> Processing -> Available
//!                    |             |   \                     ^
//!                    |             |    `--(immediate)-------'
//!                    v             v            |
//!                  Failed        Failed       Failed
//! ```
//!
//! Every transition is attempted once. A session that ends in `Failed` is
//! discarded; retrying means starting a new session from `initialize`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backends::{ChunkInstruction, FinalizeAck, PublishingBackend};
use crate::error::{BackendError, BackendResult};
use crate::events::{Event, EventBus};
use crate::types::{MediaFile, OwnerIdentity};
use crate::upload::poller::{PollOutcome, ProcessingPoller};
use crate::upload::uploader::MediaUploader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initialized,
    Uploading,
    Finalizing,
    Processing,
    Available,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Available | SessionState::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine
    fn can_move_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, next),
            (Initialized, Uploading)
                | (Uploading, Finalizing)
                | (Finalizing, Processing)
                | (Finalizing, Available)
                | (Processing, Available)
                | (Initialized | Uploading | Finalizing | Processing, Failed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Initialized => "initialized",
            SessionState::Uploading => "uploading",
            SessionState::Finalizing => "finalizing",
            SessionState::Processing => "processing",
            SessionState::Available => "available",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Record of one attachment's multi-step upload to one backend
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub backend: String,
    pub state: SessionState,
    pub chunk_plan: Vec<ChunkInstruction>,
    /// Grows only while uploading; cleared if the upload fails
    pub uploaded_chunk_ids: Vec<String>,
    pub media_handle: String,
    pub upload_token: String,
    /// Set only in `Failed`
    pub error: Option<BackendError>,
}

impl UploadSession {
    pub fn is_available(&self) -> bool {
        self.state == SessionState::Available
    }
}

/// Drives one video upload from initialization to a terminal state
pub struct ChunkedUploadSession<'a> {
    backend: &'a dyn PublishingBackend,
    media: &'a MediaFile,
    session: UploadSession,
    events: Option<EventBus>,
}

impl<'a> ChunkedUploadSession<'a> {
    /// Ask the backend for a chunk plan and enter `Initialized`
    ///
    /// # Errors
    ///
    /// Fails if `initialize_video_upload` fails; no session exists then.
    pub async fn initialize(
        backend: &'a dyn PublishingBackend,
        owner: &OwnerIdentity,
        media: &'a MediaFile,
    ) -> BackendResult<ChunkedUploadSession<'a>> {
        let init = backend
            .initialize_video_upload(owner, media.size_bytes)
            .await?;

        debug!(
            backend = backend.name(),
            media_handle = %init.media_handle,
            chunks = init.chunk_plan.len(),
            size = media.size_bytes,
            "Upload session initialized"
        );

        Ok(Self {
            backend,
            media,
            session: UploadSession {
                backend: backend.name().to_string(),
                state: SessionState::Initialized,
                chunk_plan: init.chunk_plan,
                uploaded_chunk_ids: Vec::new(),
                media_handle: init.media_handle,
                upload_token: init.upload_token,
                error: None,
            },
            events: None,
        })
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Run the session to `Available` or `Failed`
    ///
    /// Never returns a non-terminal session. Failures are recorded in
    /// `UploadSession::error` rather than returned.
    pub async fn run(mut self, poller: &ProcessingPoller) -> UploadSession {
        self.transition(SessionState::Uploading);
        let uploader = match &self.events {
            Some(events) => MediaUploader::new(self.backend).with_events(events),
            None => MediaUploader::new(self.backend),
        };
        let uploaded = uploader
            .upload(
                &self.media.source,
                self.media.size_bytes,
                &self.session.chunk_plan,
            )
            .await;
        match uploaded {
            Ok(ids) => self.session.uploaded_chunk_ids = ids,
            Err(e) => return self.fail(e),
        }

        self.transition(SessionState::Finalizing);
        let ack = self
            .backend
            .finalize_video_upload(
                &self.session.media_handle,
                &self.session.upload_token,
                &self.session.uploaded_chunk_ids,
            )
            .await;
        match ack {
            Ok(FinalizeAck::Available) => {
                self.transition(SessionState::Available);
                return self.finish();
            }
            Ok(FinalizeAck::Accepted) => {}
            Err(e) => return self.fail(e),
        }

        self.transition(SessionState::Processing);
        match poller
            .wait_until_ready(self.backend, &self.session.media_handle)
            .await
        {
            Ok(PollOutcome::Ready) => {
                self.transition(SessionState::Available);
                self.finish()
            }
            Ok(PollOutcome::Failed(reason)) => self.fail(BackendError::ProcessingFailed(reason)),
            Ok(PollOutcome::Timeout { waited }) => {
                self.fail(BackendError::ProcessingTimeout { waited })
            }
            Err(e) => self.fail(e),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.session.state.can_move_to(next),
            "illegal session transition {} -> {}",
            self.session.state,
            next
        );
        debug!(
            backend = %self.session.backend,
            from = %self.session.state,
            to = %next,
            "Session transition"
        );
        self.session.state = next;
        if let Some(events) = &self.events {
            events.emit(Event::SessionTransition {
                backend: self.session.backend.clone(),
                state: next,
            });
        }
    }

    fn fail(mut self, error: BackendError) -> UploadSession {
        warn!(
            backend = %self.session.backend,
            state = %self.session.state,
            "Upload session failed: {}",
            error
        );
        if self.session.state == SessionState::Uploading {
            self.session.uploaded_chunk_ids.clear();
        }
        self.transition(SessionState::Failed);
        self.session.error = Some(error);
        self.session
    }

    fn finish(self) -> UploadSession {
        info!(
            backend = %self.session.backend,
            media_handle = %self.session.media_handle,
            chunks = self.session.uploaded_chunk_ids.len(),
            "Media available"
        );
        self.session
    }
}
