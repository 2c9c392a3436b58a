use crate::blobs::{BlobHandle, BlobStore};
use crate::clock::{CancelToken, Clock, TokioClock};
use crate::normalizer;
use crate::orchestrator::{PollPolicy, VideoOrchestrator};
use crate::prompt::{compose_instruction, TransitionPromptBuilder, TransitionStyle};
use crate::traits::{TextGenerator, VideoGenerator};
use crate::types::{
    ApiKey, AppStatus, AspectRatio, NormalizedImage, Result, Slot, SourceImage, VibeshiftError,
    CREDENTIAL_MESSAGE,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Collaborators and policies shared by every operation of a session.
pub struct SessionContext {
    pub text: Arc<dyn TextGenerator>,
    pub video: Arc<dyn VideoGenerator>,
    pub blobs: BlobStore,
    pub clock: Arc<dyn Clock>,
    pub poll_policy: PollPolicy,
    pub resolution: String,
}

impl SessionContext {
    pub fn new(text: Arc<dyn TextGenerator>, video: Arc<dyn VideoGenerator>) -> Self {
        Self {
            text,
            video,
            blobs: BlobStore::new(),
            clock: Arc::new(TokioClock),
            poll_policy: PollPolicy::default(),
            resolution: "720p".to_string(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }
}

struct ImageSlot {
    source: SourceImage,
    normalized: NormalizedImage,
    preview: BlobHandle,
}

struct SessionState {
    status: AppStatus,
    start: Option<ImageSlot>,
    end: Option<ImageSlot>,
    aspect_ratio: AspectRatio,
    style: TransitionStyle,
    prompt: Option<String>,
    video: Option<BlobHandle>,
    error: Option<String>,
    api_key: Option<ApiKey>,
    // Bumped on every start and on cancelling reset; stale pipelines compare against it.
    generation: u64,
    cancel: Option<CancelToken>,
}

impl SessionState {
    fn slot(&self, slot: Slot) -> &Option<ImageSlot> {
        match slot {
            Slot::Start => &self.start,
            Slot::End => &self.end,
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Option<ImageSlot> {
        match slot {
            Slot::Start => &mut self.start,
            Slot::End => &mut self.end,
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.status.is_in_flight() {
            return Err(VibeshiftError::GenerationInProgress);
        }
        Ok(())
    }
}

/// Read-only snapshot for presentation.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub status: AppStatus,
    pub aspect_ratio: AspectRatio,
    pub style: TransitionStyle,
    pub start: Option<NormalizedImage>,
    pub end: Option<NormalizedImage>,
    pub start_preview: Option<BlobHandle>,
    pub end_preview: Option<BlobHandle>,
    pub prompt: Option<String>,
    pub video: Option<BlobHandle>,
    pub error: Option<String>,
    pub has_api_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// One or both frames are missing; nothing happened.
    MissingImages,
    /// Local precondition failed before any remote call.
    Rejected(String),
    Completed(BlobHandle),
    Failed(String),
    /// Superseded by a reset while in flight.
    Cancelled,
}

/// One user's session: two frames in, one transition video out.
pub struct AppSession {
    id: Uuid,
    context: Arc<SessionContext>,
    prompts: TransitionPromptBuilder,
    orchestrator: VideoOrchestrator,
    state: Arc<RwLock<SessionState>>,
}

impl AppSession {
    pub fn new(context: SessionContext) -> Self {
        let context = Arc::new(context);
        let prompts = TransitionPromptBuilder::new(context.text.clone());
        let orchestrator = VideoOrchestrator::new(
            context.video.clone(),
            context.blobs.clone(),
            context.clock.clone(),
            context.poll_policy.clone(),
        )
        .with_resolution(context.resolution.clone());

        let id = Uuid::new_v4();
        info!("Created session {}", id);

        Self {
            id,
            context,
            prompts,
            orchestrator,
            state: Arc::new(RwLock::new(SessionState {
                status: AppStatus::Idle,
                start: None,
                end: None,
                aspect_ratio: AspectRatio::default(),
                style: TransitionStyle::default(),
                prompt: None,
                video: None,
                error: None,
                api_key: None,
                generation: 0,
                cancel: None,
            })),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub async fn supply_api_key(&self, api_key: ApiKey) {
        let mut state = self.state.write().await;
        state.api_key = Some(api_key);
        info!("Session {}: API key supplied", self.id);
    }

    pub async fn has_api_key(&self) -> bool {
        self.state.read().await.api_key.is_some()
    }

    pub async fn status(&self) -> AppStatus {
        self.state.read().await.status
    }

    pub async fn view(&self) -> SessionView {
        let state = self.state.read().await;
        SessionView {
            status: state.status,
            aspect_ratio: state.aspect_ratio,
            style: state.style.clone(),
            start: state.start.as_ref().map(|s| s.normalized.clone()),
            end: state.end.as_ref().map(|s| s.normalized.clone()),
            start_preview: state.start.as_ref().map(|s| s.preview.clone()),
            end_preview: state.end.as_ref().map(|s| s.preview.clone()),
            prompt: state.prompt.clone(),
            video: state.video.clone(),
            error: state.error.clone(),
            has_api_key: state.api_key.is_some(),
        }
    }

    /// Bytes of the finished video, if any.
    pub async fn video_bytes(&self) -> Option<Arc<Vec<u8>>> {
        let video = self.state.read().await.video.clone()?;
        self.context.blobs.get(&video).await
    }

    /// Normalize `source` into `slot`, replacing (and releasing) what was there.
    pub async fn load_image(&self, slot: Slot, source: SourceImage) -> Result<NormalizedImage> {
        let mut aspect_ratio = {
            let state = self.state.read().await;
            state.ensure_idle()?;
            state.aspect_ratio
        };

        // Decode outside the lock; redo it if the framing changed meanwhile.
        let (mut state, normalized) = loop {
            let normalized = normalize_off_thread(source.clone(), aspect_ratio).await?;
            let state = self.state.write().await;
            state.ensure_idle()?;
            if state.aspect_ratio == aspect_ratio {
                break (state, normalized);
            }
            debug!("Session {}: aspect ratio changed while loading {}, retrying", self.id, slot);
            aspect_ratio = state.aspect_ratio;
        };

        let preview = self
            .context
            .blobs
            .register(normalized.data.clone(), normalized.mime_type.clone())
            .await;

        let previous = state.slot_mut(slot).replace(ImageSlot {
            source,
            normalized: normalized.clone(),
            preview,
        });
        if let Some(previous) = previous {
            self.context.blobs.release(&previous.preview).await;
        }

        info!(
            "Session {}: loaded {} ({}x{})",
            self.id, slot, normalized.width, normalized.height
        );
        Ok(normalized)
    }

    pub async fn remove_image(&self, slot: Slot) -> Result<bool> {
        let mut state = self.state.write().await;
        state.ensure_idle()?;

        match state.slot_mut(slot).take() {
            Some(previous) => {
                self.context.blobs.release(&previous.preview).await;
                debug!("Session {}: removed {}", self.id, slot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Switch framing; both held images are re-cropped from their sources.
    pub async fn set_aspect_ratio(&self, aspect_ratio: AspectRatio) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_idle()?;
        if state.aspect_ratio == aspect_ratio {
            return Ok(());
        }

        let mut renormalized = Vec::new();
        for slot in [Slot::Start, Slot::End] {
            if let Some(held) = state.slot(slot) {
                let normalized = normalize_off_thread(held.source.clone(), aspect_ratio).await?;
                renormalized.push((slot, normalized));
            }
        }

        for (slot, normalized) in renormalized {
            let preview = self
                .context
                .blobs
                .register(normalized.data.clone(), normalized.mime_type.clone())
                .await;
            if let Some(held) = state.slot_mut(slot).as_mut() {
                let stale = std::mem::replace(&mut held.preview, preview);
                held.normalized = normalized;
                self.context.blobs.release(&stale).await;
            }
        }

        state.aspect_ratio = aspect_ratio;
        info!("Session {}: aspect ratio set to {}", self.id, aspect_ratio);
        Ok(())
    }

    pub async fn select_style(&self, style: TransitionStyle) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_idle()?;
        debug!("Session {}: style {}", self.id, style.id());
        state.style = style;
        Ok(())
    }

    /// Run the whole pipeline: prompt, video, download.
    ///
    /// Returns `Err(GenerationInProgress)` if a pipeline is already running.
    /// Every other failure lands in the ERROR state and is reported as
    /// [`GenerateOutcome::Failed`].
    pub async fn generate(&self) -> Result<GenerateOutcome> {
        let (start, end, style, aspect_ratio, api_key, epoch, cancel) = {
            let mut state = self.state.write().await;

            if state.status.is_in_flight() {
                warn!("Session {}: generate rejected, pipeline already running", self.id);
                return Err(VibeshiftError::GenerationInProgress);
            }
            if !state.status.can_start_generation() {
                let message = "Start over before generating a new transition.".to_string();
                return Ok(GenerateOutcome::Rejected(message));
            }

            let (start, end) = match (&state.start, &state.end) {
                (Some(start), Some(end)) => (start.normalized.clone(), end.normalized.clone()),
                _ => {
                    debug!("Session {}: generate ignored, frames missing", self.id);
                    return Ok(GenerateOutcome::MissingImages);
                }
            };

            if let Err(e) = compose_instruction(&state.style) {
                let message = e.user_message();
                state.error = Some(message.clone());
                return Ok(GenerateOutcome::Rejected(message));
            }

            let api_key = match state.api_key.clone() {
                Some(key) => key,
                None => {
                    state.status = AppStatus::Error;
                    state.error = Some(CREDENTIAL_MESSAGE.to_string());
                    return Ok(GenerateOutcome::Failed(CREDENTIAL_MESSAGE.to_string()));
                }
            };

            if let Some(stale) = state.video.take() {
                self.context.blobs.release(&stale).await;
            }
            state.prompt = None;
            state.error = None;
            state.status = AppStatus::Analyzing;
            state.generation += 1;
            let cancel = CancelToken::new();
            state.cancel = Some(cancel.clone());
            info!("Session {}: ANALYZING (generation {})", self.id, state.generation);

            (start, end, state.style.clone(), state.aspect_ratio, api_key, state.generation, cancel)
        };

        let result = self
            .run_pipeline(epoch, &start, &end, &style, aspect_ratio, &api_key, &cancel)
            .await;
        self.finish(epoch, result).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pipeline(
        &self,
        epoch: u64,
        start: &NormalizedImage,
        end: &NormalizedImage,
        style: &TransitionStyle,
        aspect_ratio: AspectRatio,
        api_key: &ApiKey,
        cancel: &CancelToken,
    ) -> Result<BlobHandle> {
        let prompt = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VibeshiftError::Cancelled),
            prompt = self.prompts.build_prompt(start, end, style, api_key) => prompt,
        }?;

        {
            let mut state = self.state.write().await;
            if state.generation != epoch {
                return Err(VibeshiftError::Cancelled);
            }
            state.prompt = Some(prompt.clone());
            state.status = AppStatus::Generating;
            info!("Session {}: GENERATING", self.id);
        }

        self.orchestrator
            .generate_video(&prompt, start, end, aspect_ratio, api_key, cancel)
            .await
    }

    async fn finish(&self, epoch: u64, result: Result<BlobHandle>) -> Result<GenerateOutcome> {
        let mut state = self.state.write().await;

        if state.generation != epoch {
            if let Ok(orphan) = &result {
                self.context.blobs.release(orphan).await;
            }
            info!("Session {}: discarded result of cancelled generation {}", self.id, epoch);
            return Ok(GenerateOutcome::Cancelled);
        }
        state.cancel = None;

        match result {
            Ok(video) => {
                state.video = Some(video.clone());
                state.status = AppStatus::Complete;
                info!("Session {}: COMPLETE ({})", self.id, video);
                Ok(GenerateOutcome::Completed(video))
            }
            Err(VibeshiftError::Cancelled) => {
                state.prompt = None;
                state.status = AppStatus::Idle;
                Ok(GenerateOutcome::Cancelled)
            }
            Err(e) => {
                if e.is_credential() {
                    state.api_key = None;
                }
                let message = e.user_message();
                error!("Session {}: ERROR: {}", self.id, e);
                state.status = AppStatus::Error;
                state.error = Some(message.clone());
                Ok(GenerateOutcome::Failed(message))
            }
        }
    }

    /// Start over: back to IDLE, dropping prompt, video and error.
    /// A generation still in flight is cancelled and its result discarded.
    pub async fn reset(&self) -> bool {
        let mut state = self.state.write().await;
        if state.status == AppStatus::Idle && state.error.is_none() {
            return false;
        }

        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
            state.generation += 1;
            warn!("Session {}: cancelled in-flight generation", self.id);
        }
        if let Some(video) = state.video.take() {
            self.context.blobs.release(&video).await;
        }
        state.prompt = None;
        state.error = None;
        state.status = AppStatus::Idle;
        info!("Session {}: reset to IDLE", self.id);
        true
    }
}

async fn normalize_off_thread(source: SourceImage, aspect_ratio: AspectRatio) -> Result<NormalizedImage> {
    tokio::task::spawn_blocking(move || normalizer::normalize(&source, aspect_ratio))
        .await
        .map_err(|e| VibeshiftError::General(format!("normalization task failed: {}", e)))?
}
