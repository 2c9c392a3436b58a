use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
// Use the interfaces crate for core types
pub use interfaces::defs::{AspectRatio, InlineImage, TextRequest, VideoRequest};
pub use interfaces::defs::{OperationHandle, OperationSnapshot, RemoteError};
pub use interfaces::state::AppStatus;

/// Raw upload as selected by the user.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub name: Option<String>,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SourceImage {
    pub fn new(name: Option<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name,
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// An image cropped to the session aspect ratio, bounded and re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub data: Vec<u8>,
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
}

impl NormalizedImage {
    /// Text-embeddable preview reference.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    pub fn to_inline(&self) -> InlineImage {
        InlineImage {
            mime_type: self.mime_type.clone(),
            data: self.base64.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Start,
    End,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Start => f.write_str("start frame"),
            Slot::End => f.write_str("end frame"),
        }
    }
}

/// Access credential for the remote models. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationPhase {
    Submitted,
    Polling,
    Done,
    Failed,
}

/// Local record of a submitted video job.
#[derive(Debug, Clone)]
pub struct GenerationOperation {
    pub prompt: String,
    pub handle: OperationHandle,
    pub phase: OperationPhase,
    pub polls: u32,
    pub error: Option<RemoteError>,
    pub result_locator: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl GenerationOperation {
    pub fn submitted(prompt: String, snapshot: OperationSnapshot) -> Self {
        let mut operation = Self {
            prompt,
            handle: snapshot.handle.clone(),
            phase: OperationPhase::Submitted,
            polls: 0,
            error: None,
            result_locator: None,
            submitted_at: Utc::now(),
        };
        operation.absorb(snapshot);
        operation
    }

    /// Apply a status query result.
    pub fn apply(&mut self, snapshot: OperationSnapshot) {
        self.polls += 1;
        self.absorb(snapshot);
    }

    fn absorb(&mut self, snapshot: OperationSnapshot) {
        if snapshot.handle.0 != self.handle.0 && !snapshot.handle.0.is_empty() {
            self.handle = snapshot.handle;
        }
        self.error = snapshot.error;
        self.result_locator = snapshot.result_locator;
        self.phase = match (snapshot.done, self.error.is_some()) {
            (_, true) => OperationPhase::Failed,
            (true, false) => OperationPhase::Done,
            (false, false) if self.polls == 0 => OperationPhase::Submitted,
            (false, false) => OperationPhase::Polling,
        };
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, OperationPhase::Done | OperationPhase::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub text_model: String,
    pub video_model: String,
    pub resolution: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            text_model: "gemini-3-pro-preview".to_string(),
            video_model: "veo-3.1-fast-generate-preview".to_string(),
            resolution: "720p".to_string(),
            user_agent: "VibeShift/0.1".to_string(),
            timeout_seconds: 120,
        }
    }
}

impl GeminiConfig {
    /// Defaults overridden by `VIBESHIFT_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var("VIBESHIFT_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("VIBESHIFT_TEXT_MODEL") {
            config.text_model = model;
        }
        if let Ok(model) = std::env::var("VIBESHIFT_VIDEO_MODEL") {
            config.video_model = model;
        }
        config
    }
}

pub const CREDENTIAL_MESSAGE: &str =
    "API Key missing or invalid. Please select a project or check your configuration.";

#[derive(Debug, thiserror::Error)]
pub enum VibeshiftError {
    #[error("{0}")]
    Validation(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Prompt generation failed: {0}")]
    PromptGeneration(String),

    #[error("Video request rejected: {0}")]
    Submission(String),

    #[error("Video generation failed: {message}")]
    Operation { code: Option<i32>, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Video operation did not finish within {waited:?}")]
    PollTimeout { waited: Duration },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("A generation is already in progress")]
    GenerationInProgress,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

impl VibeshiftError {
    pub fn operation(remote: RemoteError) -> Self {
        Self::Operation {
            code: remote.code,
            message: remote.message,
        }
    }

    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential(_))
    }

    /// Text shown to the user in the ERROR state.
    pub fn user_message(&self) -> String {
        match self {
            Self::Credential(_) => CREDENTIAL_MESSAGE.to_string(),
            Self::Validation(msg) => msg.clone(),
            Self::PromptGeneration(_) => "Failed to analyze images for transition style.".to_string(),
            Self::Cancelled => "Generation was cancelled.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for VibeshiftError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VibeshiftError>;
