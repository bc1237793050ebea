//! Event system for progress tracking
//!
//! An in-process event bus distributing publishing progress to subscribers
//! without blocking the publishing tasks.
//!
//! # Architecture
//!
//! The bus wraps `tokio::sync::broadcast`. Backend tasks emit events as they
//! move through the upload lifecycle; a CLI progress line or a log sink can
//! consume them. If nobody subscribes, events are dropped immediately. A
//! lagging subscriber misses the oldest events instead of stalling emitters.
//!
//! # Example
//!
//! ```no_run
//! use libcrosscast::events::{EventBus, Event};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::PublishStarted {
//!     post_id: "abc123".to_string(),
//!     backends: vec!["alpha".to_string()],
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Outcome, PublishResult};
use crate::upload::session::SessionState;

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

/// Event bus for distributing progress events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the specified per-subscriber capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Never blocks and never fails; with no subscribers the event is dropped.
    pub fn emit(&self, event: Event) {
        // send() only errors when there are no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Events emitted while publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Publishing started for a post
    PublishStarted {
        post_id: String,
        /// Backends being published to, in request order
        backends: Vec<String>,
    },

    /// An upload session moved to a new state
    SessionTransition { backend: String, state: SessionState },

    /// One chunk of a video was accepted
    ChunkUploaded {
        backend: String,
        /// 0-based chunk index
        index: usize,
        total: usize,
    },

    /// A backend produced its result
    BackendFinished { result: PublishResult },

    /// Every requested backend produced a result
    PublishCompleted { post_id: String, outcome: Outcome },
}
