#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use vibeshift::{
    ApiKey, Clock, NormalizedImage, OperationHandle, OperationSnapshot, RemoteError, Result, SourceImage,
    TextGenerator, TextRequest, VibeshiftError, VideoGenerator, VideoRequest,
};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .try_init();
    });
}

pub fn test_key() -> ApiKey {
    ApiKey::new("test-key").expect("non-empty key")
}

// --- image fixtures ---

fn gradient(width: u32, height: u32) -> DynamicImage {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    DynamicImage::ImageRgb8(image)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).expect("fixture encodes");
    buf.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Jpeg)
}

pub fn png_source(width: u32, height: u32) -> SourceImage {
    SourceImage::new(Some(format!("{}x{}.png", width, height)), "image/png", png_bytes(width, height))
}

pub fn jpeg_source(width: u32, height: u32) -> SourceImage {
    SourceImage::new(Some(format!("{}x{}.jpg", width, height)), "image/jpeg", jpeg_bytes(width, height))
}

/// Already-normalized frame tagged by its base64 payload.
pub fn frame(tag: &str, width: u32, height: u32) -> NormalizedImage {
    NormalizedImage {
        data: tag.as_bytes().to_vec(),
        base64: tag.to_string(),
        width,
        height,
        mime_type: "image/png".to_string(),
    }
}

// --- clock ---

/// Clock whose time only moves when something sleeps on it.
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

// --- text collaborator ---

/// Answers from a script (falling back to `default_reply`) and records every request.
pub struct RecordingTextGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    default_reply: String,
    requests: Mutex<Vec<TextRequest>>,
    keys: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
}

impl RecordingTextGenerator {
    pub fn new(default_reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_string(),
            requests: Mutex::new(Vec::new()),
            keys: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn with_reply(self, reply: Result<String>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Every call waits for `gate.notify_one()` before answering.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<TextRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for RecordingTextGenerator {
    fn name(&self) -> String {
        "recording-text".to_string()
    }

    async fn generate(&self, request: &TextRequest, api_key: &ApiKey) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.keys.lock().unwrap().push(api_key.expose().to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let scripted = self.replies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_reply.clone()))
    }
}

// --- video collaborator ---

pub const OPERATION_NAME: &str = "models/veo/operations/op-1";
pub const VIDEO_LOCATOR: &str = "https://files.example.com/v1beta/files/video-1:download?alt=media";
pub const VIDEO_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42fake-video";

pub fn pending() -> OperationSnapshot {
    OperationSnapshot::pending(OperationHandle(OPERATION_NAME.to_string()))
}

pub fn done() -> OperationSnapshot {
    OperationSnapshot {
        done: true,
        result_locator: Some(VIDEO_LOCATOR.to_string()),
        ..pending()
    }
}

pub fn failed(code: i32, message: &str) -> OperationSnapshot {
    OperationSnapshot {
        done: true,
        error: Some(RemoteError {
            code: Some(code),
            message: message.to_string(),
        }),
        ..pending()
    }
}

/// Replays a fixed sequence of poll answers and counts every call.
pub struct ScriptedVideoGenerator {
    submit_reply: Mutex<Option<Result<OperationSnapshot>>>,
    polls: Mutex<VecDeque<Result<OperationSnapshot>>>,
    video: Vec<u8>,
    requests: Mutex<Vec<VideoRequest>>,
    pub submit_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    fetched: Mutex<Vec<String>>,
    poll_gate: Option<Arc<Notify>>,
}

impl ScriptedVideoGenerator {
    /// Submits to a pending operation, then answers `false` `pending_polls` times before `done`.
    pub fn succeeding_after(pending_polls: usize) -> Self {
        let mut script: Vec<Result<OperationSnapshot>> = (0..pending_polls).map(|_| Ok(pending())).collect();
        script.push(Ok(done()));
        Self::with_polls(script)
    }

    pub fn with_polls(polls: Vec<Result<OperationSnapshot>>) -> Self {
        Self {
            submit_reply: Mutex::new(None),
            polls: Mutex::new(polls.into()),
            video: VIDEO_BYTES.to_vec(),
            requests: Mutex::new(Vec::new()),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
            poll_gate: None,
        }
    }

    /// Every status query waits for `gate.notify_one()` before answering.
    pub fn gated_polls(mut self, gate: Arc<Notify>) -> Self {
        self.poll_gate = Some(gate);
        self
    }

    pub fn with_submit(self, reply: Result<OperationSnapshot>) -> Self {
        *self.submit_reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn with_video(mut self, bytes: Vec<u8>) -> Self {
        self.video = bytes;
        self
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<VideoRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoGenerator for ScriptedVideoGenerator {
    fn name(&self) -> String {
        "scripted-video".to_string()
    }

    async fn submit(&self, request: &VideoRequest, _api_key: &ApiKey) -> Result<OperationSnapshot> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self.submit_reply.lock().unwrap().take();
        scripted.unwrap_or_else(|| Ok(pending()))
    }

    async fn poll(&self, _handle: &OperationHandle, _api_key: &ApiKey) -> Result<OperationSnapshot> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.poll_gate {
            gate.notified().await;
        }
        let next = self.polls.lock().unwrap().pop_front();
        // An exhausted script keeps the operation running.
        next.unwrap_or_else(|| Ok(pending()))
    }

    async fn fetch(&self, locator: &str, _api_key: &ApiKey) -> Result<Vec<u8>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(locator.to_string());
        Ok(self.video.clone())
    }
}

pub fn credential_error() -> VibeshiftError {
    VibeshiftError::Credential("HTTP 403 Forbidden".to_string())
}
