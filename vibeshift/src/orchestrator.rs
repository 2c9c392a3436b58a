use crate::blobs::{BlobHandle, BlobStore};
use crate::clock::{CancelToken, Clock};
use crate::traits::VideoGenerator;
use crate::types::{
    ApiKey, AspectRatio, GenerationOperation, NormalizedImage, OperationPhase, RemoteError, Result,
    VibeshiftError, VideoRequest,
};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const VIDEO_MIME_TYPE: &str = "video/mp4";

/// Growth applied to the poll interval when backoff is enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub multiplier: f64,
    pub max_interval: Duration,
}

/// How often and for how long a submitted operation is re-queried.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits forever.
    pub max_wait: Option<Duration>,
    pub backoff: Option<BackoffPolicy>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_wait: Some(Duration::from_secs(600)),
            backoff: None,
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.backoff = Some(BackoffPolicy {
            multiplier,
            max_interval,
        });
        self
    }

    fn schedule(&self) -> PollSchedule {
        match self.backoff {
            None => PollSchedule::Fixed(self.interval),
            Some(policy) => PollSchedule::Exponential(ExponentialBackoff {
                current_interval: self.interval,
                initial_interval: self.interval,
                randomization_factor: 0.0,
                multiplier: policy.multiplier,
                max_interval: policy.max_interval,
                // The deadline is enforced against the injected clock instead.
                max_elapsed_time: None,
                ..Default::default()
            }),
        }
    }
}

enum PollSchedule {
    Fixed(Duration),
    Exponential(ExponentialBackoff),
}

impl PollSchedule {
    fn next_delay(&mut self) -> Duration {
        match self {
            PollSchedule::Fixed(interval) => *interval,
            PollSchedule::Exponential(backoff) => backoff
                .next_backoff()
                .unwrap_or(backoff.max_interval),
        }
    }
}

/// Drives a video job from submission to a playable local handle.
pub struct VideoOrchestrator {
    generator: Arc<dyn VideoGenerator>,
    blobs: BlobStore,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
    resolution: String,
}

impl VideoOrchestrator {
    pub fn new(
        generator: Arc<dyn VideoGenerator>,
        blobs: BlobStore,
        clock: Arc<dyn Clock>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            generator,
            blobs,
            clock,
            policy,
            resolution: "720p".to_string(),
        }
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }

    pub async fn generate_video(
        &self,
        prompt: &str,
        start: &NormalizedImage,
        end: &NormalizedImage,
        aspect_ratio: AspectRatio,
        api_key: &ApiKey,
        cancel: &CancelToken,
    ) -> Result<BlobHandle> {
        if cancel.is_cancelled() {
            return Err(VibeshiftError::Cancelled);
        }

        let request = VideoRequest {
            prompt: prompt.to_string(),
            first_frame: start.to_inline(),
            last_frame: end.to_inline(),
            aspect_ratio,
            resolution: self.resolution.clone(),
            sample_count: 1,
        };

        info!(
            "Submitting video job to {} ({}, {})",
            self.generator.name(),
            aspect_ratio,
            self.resolution
        );
        let first = with_cancel(cancel, self.generator.submit(&request, api_key))
            .await?
            .map_err(submission_error)?;

        let mut operation = GenerationOperation::submitted(prompt.to_string(), first);
        info!("Video operation started: {}", operation.handle);

        let started = self.clock.now();
        let mut schedule = self.policy.schedule();

        while !operation.is_terminal() {
            let waited = self.clock.now().saturating_duration_since(started);
            let mut delay = schedule.next_delay();
            if let Some(max_wait) = self.policy.max_wait {
                if waited >= max_wait {
                    warn!(
                        "Giving up on operation {} after {:?} ({} polls)",
                        operation.handle, waited, operation.polls
                    );
                    return Err(VibeshiftError::PollTimeout { waited });
                }
                // Last poll lands on the deadline, not past it.
                delay = delay.min(max_wait - waited);
            }

            debug!("Operation {} not done, polling again in {:?}", operation.handle, delay);
            with_cancel(cancel, self.clock.sleep(delay)).await?;

            let snapshot = with_cancel(cancel, self.generator.poll(&operation.handle, api_key))
                .await?
                .map_err(poll_error)?;
            operation.apply(snapshot);
            debug!(
                "Polled operation {} (attempt {}, phase {:?})",
                operation.handle, operation.polls, operation.phase
            );
        }

        let locator = match (operation.phase, operation.error.take(), operation.result_locator.take()) {
            (OperationPhase::Failed, Some(remote), _) => {
                error!("Video operation {} failed: {}", operation.handle, remote.message);
                return Err(VibeshiftError::operation(remote));
            }
            (_, _, Some(locator)) => locator,
            _ => {
                return Err(VibeshiftError::operation(RemoteError {
                    code: None,
                    message: "No video URI returned from the video model.".to_string(),
                }));
            }
        };

        info!(
            "Video operation {} finished after {} polls ({}s since submission)",
            operation.handle,
            operation.polls,
            (chrono::Utc::now() - operation.submitted_at).num_seconds()
        );

        let bytes = with_cancel(cancel, self.generator.fetch(&locator, api_key))
            .await?
            .map_err(fetch_error)?;
        if bytes.is_empty() {
            return Err(VibeshiftError::Transport("Downloaded video is empty.".to_string()));
        }

        let handle = self.blobs.register(bytes, VIDEO_MIME_TYPE).await;
        info!("Video ready: {} ({} bytes)", handle, handle.size);
        Ok(handle)
    }
}

/// Races `fut` against the cancel token.
async fn with_cancel<T>(cancel: &CancelToken, fut: impl Future<Output = T>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VibeshiftError::Cancelled),
        out = fut => Ok(out),
    }
}

fn submission_error(e: VibeshiftError) -> VibeshiftError {
    match e {
        VibeshiftError::Credential(_) | VibeshiftError::Submission(_) => e,
        other => VibeshiftError::Submission(other.to_string()),
    }
}

fn poll_error(e: VibeshiftError) -> VibeshiftError {
    match e {
        VibeshiftError::Credential(_)
        | VibeshiftError::Operation { .. }
        | VibeshiftError::Transport(_) => e,
        other => VibeshiftError::Transport(other.to_string()),
    }
}

fn fetch_error(e: VibeshiftError) -> VibeshiftError {
    match e {
        VibeshiftError::Credential(_) | VibeshiftError::Transport(_) => e,
        other => VibeshiftError::Transport(format!("Failed to download video bytes: {}", other)),
    }
}
