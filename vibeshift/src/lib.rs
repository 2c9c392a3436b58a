pub mod types;
pub mod traits;
pub mod normalizer;
pub mod blobs;
pub mod clock;
pub mod prompt;
pub mod orchestrator;
pub mod gemini;
pub mod session;

pub use types::*;
pub use traits::{TextGenerator, VideoGenerator};
pub use normalizer::{normalize, plan_crop, plan_output, validate, CropRect};
pub use blobs::{BlobHandle, BlobStore};
pub use clock::{CancelToken, Clock, TokioClock};
pub use prompt::{compose_instruction, TransitionPromptBuilder, TransitionStyle};
pub use orchestrator::{PollPolicy, VideoOrchestrator};
pub use gemini::GeminiClient;
pub use session::{AppSession, GenerateOutcome, SessionContext, SessionView};
