//! Crosscast - publish one post to many backends
//!
//! This library holds the publishing engine: backend abstraction, chunked
//! media uploads with bounded processing waits, and a fan-out orchestrator
//! that isolates each backend's failures from the others.

pub mod backends;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod prepare;
pub mod publish;
pub mod types;
pub mod upload;

// Re-export commonly used types
pub use backends::{Capabilities, PublishingBackend};
pub use config::Config;
pub use error::{BackendError, CrosscastError, ErrorKind, Result};
pub use orchestrator::{ConcurrencyMode, PostOrchestrator};
pub use types::{Attachment, MediaFile, Outcome, PostRequest, PublishResult};
