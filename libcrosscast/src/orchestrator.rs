//! Fan-out publishing across backends
//!
//! [`PostOrchestrator::publish`] dispatches one [`PostRequest`] to a set of
//! backends and returns exactly one [`PublishResult`] per requested backend.
//! Each backend is handled by its own task. A failure (or even a panic) in
//! one task is captured into that backend's result and never cancels, aborts
//! or delays the others.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::backends::alpha::AlphaBackend;
use crate::backends::beta::BetaBackend;
use crate::backends::{PublishPath, PublishingBackend};
use crate::config::Config;
use crate::error::{BackendError, BackendResult};
use crate::events::{Event, EventBus, EventReceiver};
use crate::prepare::{FfmpegRemux, MediaPreparer, PassThrough, PreparedMedia};
use crate::publish::{LoadedImage, Publisher};
use crate::types::{CreatedPost, Outcome, PostRequest, PublishResult};
use crate::upload::poller::{PollerConfig, ProcessingPoller};
use crate::upload::session::ChunkedUploadSession;

/// How backends are dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    /// One task per backend; results in completion order
    #[default]
    Parallel,
    /// One backend at a time; results in request order
    Sequential,
}

impl FromStr for ConcurrencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parallel" => Ok(ConcurrencyMode::Parallel),
            "sequential" => Ok(ConcurrencyMode::Sequential),
            _ => Err(format!(
                "Invalid mode: '{}'. Valid options: parallel, sequential",
                s
            )),
        }
    }
}

impl std::fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConcurrencyMode::Parallel => write!(f, "parallel"),
            ConcurrencyMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Everything one backend task needs, cheap to clone into a spawned task
#[derive(Clone)]
struct TaskContext {
    poller: ProcessingPoller,
    preparer: Arc<dyn MediaPreparer>,
    events: EventBus,
}

/// Dispatcher producing one isolated result per backend
pub struct PostOrchestrator {
    backends: Vec<Arc<dyn PublishingBackend>>,
    /// Backends that are configured but could not be constructed
    unavailable: Vec<(String, BackendError)>,
    context: TaskContext,
}

impl PostOrchestrator {
    /// Create an orchestrator over already-constructed backends
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use libcrosscast::backends::mock::MockBackend;
    /// use libcrosscast::orchestrator::{ConcurrencyMode, PostOrchestrator};
    /// use libcrosscast::types::PostRequest;
    /// use libcrosscast::upload::PollerConfig;
    ///
    /// # async fn example() -> libcrosscast::error::Result<()> {
    /// let orchestrator = PostOrchestrator::new(
    ///     vec![Arc::new(MockBackend::success("alpha"))],
    ///     PollerConfig::default(),
    /// );
    /// let request = Arc::new(PostRequest::builder("Hello").build()?);
    ///
    /// for result in orchestrator.publish(request, None, ConcurrencyMode::Parallel).await {
    ///     println!("{}: {}", result.backend, result.success);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(backends: Vec<Arc<dyn PublishingBackend>>, poller: PollerConfig) -> Self {
        Self {
            backends,
            unavailable: Vec::new(),
            context: TaskContext {
                poller: ProcessingPoller::new(poller),
                preparer: Arc::new(PassThrough),
                events: EventBus::default(),
            },
        }
    }

    /// Build every enabled backend from configuration
    ///
    /// A backend that cannot be constructed (e.g. its token file is missing)
    /// does not prevent the others from being used; any publish that targets
    /// it yields a failed result carrying the construction error.
    pub fn from_config(config: &Config) -> Self {
        let mut backends: Vec<Arc<dyn PublishingBackend>> = Vec::new();
        let mut unavailable = Vec::new();

        if let Some(alpha) = config.alpha.as_ref().filter(|a| a.enabled) {
            match AlphaBackend::from_config(alpha) {
                Ok(backend) => backends.push(Arc::new(backend)),
                Err(e) => {
                    warn!(backend = "alpha", "Backend unavailable: {}", e);
                    unavailable.push(("alpha".to_string(), e));
                }
            }
        }

        if let Some(beta) = config.beta.as_ref().filter(|b| b.enabled) {
            match BetaBackend::from_config(beta) {
                Ok(backend) => backends.push(Arc::new(backend)),
                Err(e) => {
                    warn!(backend = "beta", "Backend unavailable: {}", e);
                    unavailable.push(("beta".to_string(), e));
                }
            }
        }

        let mut orchestrator = Self::new(backends, config.poller_config())
            .with_preparer(Arc::new(FfmpegRemux::new(config.media.ffmpeg_path.clone())));
        orchestrator.unavailable = unavailable;
        orchestrator
    }

    pub fn with_preparer(mut self, preparer: Arc<dyn MediaPreparer>) -> Self {
        self.context.preparer = preparer;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.context.events = events;
        self
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> EventReceiver {
        self.context.events.subscribe()
    }

    /// Names of every configured backend, usable or not
    pub fn backend_names(&self) -> Vec<String> {
        self.backends
            .iter()
            .map(|b| b.name().to_string())
            .chain(self.unavailable.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    /// Publish `request` to `targets` (default: every configured backend)
    ///
    /// Returns one result per distinct target. In sequential mode results
    /// follow target order; in parallel mode they arrive in completion order.
    pub async fn publish(
        &self,
        request: Arc<PostRequest>,
        targets: Option<&[String]>,
        mode: ConcurrencyMode,
    ) -> Vec<PublishResult> {
        let targets = match targets {
            Some(names) => dedup(names),
            None => self.backend_names(),
        };

        info!(
            post_id = request.id(),
            backends = ?targets,
            mode = %mode,
            "Publishing post"
        );
        self.context.events.emit(Event::PublishStarted {
            post_id: request.id().to_string(),
            backends: targets.clone(),
        });

        let results = match mode {
            ConcurrencyMode::Parallel => self.publish_parallel(&request, &targets).await,
            ConcurrencyMode::Sequential => self.publish_sequential(&request, &targets).await,
        };

        let outcome = Outcome::classify(&results);
        info!(post_id = request.id(), outcome = %outcome, "Publishing finished");
        self.context.events.emit(Event::PublishCompleted {
            post_id: request.id().to_string(),
            outcome,
        });

        results
    }

    async fn publish_sequential(
        &self,
        request: &Arc<PostRequest>,
        targets: &[String],
    ) -> Vec<PublishResult> {
        let mut results = Vec::with_capacity(targets.len());
        for name in targets {
            let result = match self.lookup(name) {
                Ok(backend) => {
                    run_guarded(backend, Arc::clone(request), self.context.clone()).await
                }
                Err(result) => result,
            };
            self.finish(&result);
            results.push(result);
        }
        results
    }

    async fn publish_parallel(
        &self,
        request: &Arc<PostRequest>,
        targets: &[String],
    ) -> Vec<PublishResult> {
        let mut results = Vec::with_capacity(targets.len());
        let mut tasks = JoinSet::new();

        for name in targets {
            match self.lookup(name) {
                Ok(backend) => {
                    tasks.spawn(run_guarded(backend, Arc::clone(request), self.context.clone()));
                }
                Err(result) => {
                    self.finish(&result);
                    results.push(result);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    self.finish(&result);
                    results.push(result);
                }
                Err(e) => warn!("Backend task did not complete: {}", e),
            }
        }

        // Every requested backend yields a result, even if its task vanished
        let reported: HashSet<String> = results.iter().map(|r| r.backend.clone()).collect();
        for name in targets {
            if !reported.contains(name) {
                let error = BackendError::Network("publishing task was cancelled".to_string());
                let result = PublishResult::failed(name.clone(), &error);
                self.finish(&result);
                results.push(result);
            }
        }

        results
    }

    /// Find the backend for `name`, or the failed result to report instead
    fn lookup(&self, name: &str) -> Result<Arc<dyn PublishingBackend>, PublishResult> {
        if let Some(backend) = self.backends.iter().find(|b| b.name() == name) {
            return Ok(Arc::clone(backend));
        }
        if let Some((_, error)) = self.unavailable.iter().find(|(n, _)| n == name) {
            return Err(PublishResult::failed(name, error));
        }
        Err(PublishResult::failed(
            name,
            &BackendError::Validation(format!("Unknown backend: {}", name)),
        ))
    }

    fn finish(&self, result: &PublishResult) {
        if result.success {
            info!(
                backend = %result.backend,
                post_id = result.post_id.as_deref().unwrap_or_default(),
                "Published"
            );
        } else {
            warn!(
                backend = %result.backend,
                error_kind = ?result.error_kind,
                "Publishing failed: {}",
                result.message.as_deref().unwrap_or_default()
            );
        }
        self.context.events.emit(Event::BackendFinished {
            result: result.clone(),
        });
    }
}

fn dedup(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

/// Run one backend task, turning a panic into a failed result
async fn run_guarded(
    backend: Arc<dyn PublishingBackend>,
    request: Arc<PostRequest>,
    context: TaskContext,
) -> PublishResult {
    let name = backend.name().to_string();
    let outcome = AssertUnwindSafe(publish_to_backend(backend.as_ref(), &request, &context))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(post)) => PublishResult::published(name, post),
        Ok(Err(e)) => PublishResult::failed(name, &e),
        Err(_) => PublishResult::failed(
            name,
            &BackendError::Network("publishing task panicked".to_string()),
        ),
    }
}

/// Local media made ready for upload, before the backend is contacted
enum StagedMedia<'a> {
    Video(PreparedMedia),
    Images(Vec<LoadedImage>),
    Link(&'a str),
    Text,
}

/// Remux the video or read the images for `path`
///
/// Dropping a staged video removes any temporary copy, on every exit path.
async fn stage_media<'a>(
    backend: &dyn PublishingBackend,
    request: &'a PostRequest,
    path: PublishPath,
    context: &TaskContext,
) -> BackendResult<StagedMedia<'a>> {
    match path {
        PublishPath::Video => {
            let video = request.video().ok_or_else(|| {
                BackendError::Validation("video path selected without a video".to_string())
            })?;
            let prepared = if backend.requires_video_remux() {
                context.preparer.prepare_video(video).await?
            } else {
                PreparedMedia::original(video.clone())
            };
            Ok(StagedMedia::Video(prepared))
        }
        PublishPath::Images => Ok(StagedMedia::Images(
            LoadedImage::load_all(&request.images()).await?,
        )),
        PublishPath::Link => Ok(StagedMedia::Link(request.link().unwrap_or_default())),
        PublishPath::Text => Ok(StagedMedia::Text),
    }
}

/// Validate, stage local media, resolve identity, then run the narrowest publish path
async fn publish_to_backend(
    backend: &dyn PublishingBackend,
    request: &PostRequest,
    context: &TaskContext,
) -> BackendResult<CreatedPost> {
    let path = backend.capabilities().validate(backend.name(), request)?;
    debug!(backend = backend.name(), path = ?path, "Selected publish path");

    // Local failures surface before any network call
    let staged = stage_media(backend, request, path, context).await?;

    let owner = backend.resolve_identity().await?;
    let publisher = Publisher::new(backend, &owner);

    match staged {
        StagedMedia::Video(prepared) => {
            let session = ChunkedUploadSession::initialize(backend, &owner, prepared.media())
                .await?
                .with_events(context.events.clone())
                .run(&context.poller)
                .await;

            publisher
                .publish_with_video(request.text(), &session, request.title())
                .await
        }
        StagedMedia::Images(images) => {
            publisher
                .publish_with_images(request.text(), images, request.title(), request.description())
                .await
        }
        StagedMedia::Link(url) => {
            publisher
                .publish_with_link(request.text(), url, request.title(), request.description())
                .await
        }
        StagedMedia::Text => publisher.publish_text(request.text()).await,
    }
}
