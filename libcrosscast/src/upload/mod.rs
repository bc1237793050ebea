//! Media upload engine
//!
//! - [`source`]: lazily read payload bytes
//! - [`uploader`]: sequential, byte-range-exact chunk transfer
//! - [`poller`]: bounded wait for server-side processing
//! - [`session`]: the state machine composing the two for one video

pub mod poller;
pub mod session;
pub mod source;
pub mod uploader;

pub use poller::{PollOutcome, PollerConfig, ProcessingPoller};
pub use session::{ChunkedUploadSession, SessionState, UploadSession};
pub use source::PayloadSource;
pub use uploader::MediaUploader;
