//! Bounded polling of server-side media processing

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::debug;

use crate::backends::{ProcessingState, PublishingBackend};
use crate::error::BackendResult;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// Terminal result of waiting for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    Failed(String),
    Timeout { waited: Duration },
}

/// Polls `get_media_status` until the media is ready, failed, or the wait
/// budget is spent
///
/// Sleeping suspends only the calling task. The loop always ends within
/// `max_wait + poll_interval`, even when the backend never reaches a terminal
/// state or a status call hangs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingPoller {
    config: PollerConfig,
}

impl ProcessingPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    /// Wait for `media_handle` to reach a terminal processing state
    ///
    /// # Errors
    ///
    /// A failing status call is returned as-is; it is not retried.
    pub async fn wait_until_ready(
        &self,
        backend: &dyn PublishingBackend,
        media_handle: &str,
    ) -> BackendResult<PollOutcome> {
        let started = Instant::now();
        let hard_deadline = started + self.config.max_wait + self.config.poll_interval;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let status = match timeout_at(hard_deadline, backend.get_media_status(media_handle)).await {
                Ok(status) => status?,
                Err(_) => {
                    return Ok(PollOutcome::Timeout {
                        waited: started.elapsed(),
                    })
                }
            };

            debug!(
                backend = backend.name(),
                media_handle,
                attempt,
                state = ?status.state,
                "Polled media status"
            );

            match status.state {
                ProcessingState::Ready => return Ok(PollOutcome::Ready),
                ProcessingState::Failed => {
                    let reason = status
                        .detail
                        .unwrap_or_else(|| "backend reported processing failure".to_string());
                    return Ok(PollOutcome::Failed(reason));
                }
                ProcessingState::Pending => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.max_wait {
                return Ok(PollOutcome::Timeout { waited: elapsed });
            }

            // Never sleep past the wait budget; one last poll happens at the boundary
            sleep(self.config.poll_interval.min(self.config.max_wait - elapsed)).await;
        }
    }
}
