//! Sequential, byte-range-exact chunk transfer

use tracing::{debug, warn};

use crate::backends::{ChunkInstruction, PublishingBackend};
use crate::error::{BackendError, BackendResult};
use crate::events::{Event, EventBus};
use crate::upload::source::PayloadSource;

/// Transfers a payload to a backend following its chunk plan
///
/// Chunks are sent one at a time in plan order. Some backends require the
/// per-chunk identifiers to accumulate sequentially, so there is no
/// concurrency inside a single upload.
pub struct MediaUploader<'a> {
    backend: &'a dyn PublishingBackend,
    events: Option<&'a EventBus>,
}

impl<'a> MediaUploader<'a> {
    pub fn new(backend: &'a dyn PublishingBackend) -> Self {
        Self {
            backend,
            events: None,
        }
    }

    pub fn with_events(mut self, events: &'a EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Upload every chunk of `plan` and return the identifiers in plan order
    ///
    /// `result[i]` is the identifier the backend returned for `plan[i]`.
    ///
    /// # Errors
    ///
    /// - `BackendError::UnexpectedResponseShape` if the plan does not cover
    ///   `[0, total_size)` contiguously in ascending order; nothing is sent.
    /// - `BackendError::ChunkUploadFailed` for the first chunk that cannot be
    ///   read or transferred. No later chunk is attempted.
    pub async fn upload(
        &self,
        source: &PayloadSource,
        total_size: u64,
        plan: &[ChunkInstruction],
    ) -> BackendResult<Vec<String>> {
        validate_plan(plan, total_size)?;

        let backend = self.backend.name();
        let mut chunk_ids = Vec::with_capacity(plan.len());

        for (index, chunk) in plan.iter().enumerate() {
            let fail = |reason: String| BackendError::ChunkUploadFailed {
                index,
                start: chunk.start,
                end: chunk.end,
                reason,
            };

            let bytes = source
                .read_range(chunk.start, chunk.len())
                .await
                .map_err(|e| fail(format!("could not read payload: {}", e)))?;

            let chunk_id = match self.backend.upload_chunk(&chunk.target, bytes).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(
                        backend,
                        chunk = index,
                        start = chunk.start,
                        end = chunk.end,
                        "Chunk upload failed: {}",
                        e
                    );
                    return Err(fail(e.to_string()));
                }
            };

            debug!(backend, chunk = index, total = plan.len(), "Chunk accepted");
            if let Some(events) = self.events {
                events.emit(Event::ChunkUploaded {
                    backend: backend.to_string(),
                    index,
                    total: plan.len(),
                });
            }
            chunk_ids.push(chunk_id);
        }

        Ok(chunk_ids)
    }
}

/// Check that a chunk plan covers the whole payload exactly once, in order
pub fn validate_plan(plan: &[ChunkInstruction], total_size: u64) -> BackendResult<()> {
    if plan.is_empty() {
        return Err(BackendError::UnexpectedResponseShape(
            "chunk plan is empty".to_string(),
        ));
    }

    let mut expected_start = 0u64;
    for (index, chunk) in plan.iter().enumerate() {
        if chunk.start != expected_start || chunk.end < chunk.start {
            return Err(BackendError::UnexpectedResponseShape(format!(
                "chunk {} covers bytes {}-{}, expected to start at {}",
                index, chunk.start, chunk.end, expected_start
            )));
        }
        expected_start = chunk.end.checked_add(1).ok_or_else(|| {
            BackendError::UnexpectedResponseShape(format!(
                "chunk {} ends at byte {}, past any payload",
                index, chunk.end
            ))
        })?;
    }

    if expected_start != total_size {
        return Err(BackendError::UnexpectedResponseShape(format!(
            "chunk plan covers {} bytes, payload has {}",
            expected_start, total_size
        )));
    }

    Ok(())
}
