use crate::traits::TextGenerator;
use crate::types::{ApiKey, NormalizedImage, Result, TextRequest, VibeshiftError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CUSTOM_TEXT_REQUIRED: &str = "Please enter a custom transition description.";

/// Used when the model answers with nothing but whitespace.
pub const FALLBACK_PROMPT: &str =
    "A smooth cinematic camera move that seamlessly transforms the first scene into the second.";

const TASK_FRAME: &str = "\
Analyze these two images. The first image is the starting frame and the second image is the ending frame of a short video.

Write a prompt for a video generation model that creates a seamless transition between them.

Task:
1. Identify the shared visual elements, lighting and mood of both frames.
2. Bridge the two scenes with the camera movement described below.
3. Output a SINGLE concise sentence describing only the visual movement and transition. Do not add introductory text.

Transition direction:";

/// Camera/scene transformation applied between the two frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionStyle {
    /// Let the model pick the most fitting move.
    #[default]
    Auto,
    DroneFlyThrough,
    SubjectMorph,
    PortalWarp,
    Hyperlapse,
    GeometricRebuild,
    ObjectTracking,
    Custom(String),
}

impl TransitionStyle {
    /// Every preset, in display order. `Custom` carries user text and is listed last.
    pub fn presets() -> Vec<TransitionStyle> {
        vec![
            TransitionStyle::Auto,
            TransitionStyle::DroneFlyThrough,
            TransitionStyle::SubjectMorph,
            TransitionStyle::PortalWarp,
            TransitionStyle::Hyperlapse,
            TransitionStyle::GeometricRebuild,
            TransitionStyle::ObjectTracking,
            TransitionStyle::Custom(String::new()),
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            TransitionStyle::Auto => "auto",
            TransitionStyle::DroneFlyThrough => "drone",
            TransitionStyle::SubjectMorph => "morph",
            TransitionStyle::PortalWarp => "portal",
            TransitionStyle::Hyperlapse => "hyperlapse",
            TransitionStyle::GeometricRebuild => "geometric",
            TransitionStyle::ObjectTracking => "tracking",
            TransitionStyle::Custom(_) => "custom",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TransitionStyle::Auto => "Creative Choice",
            TransitionStyle::DroneFlyThrough => "Drone Fly-Through",
            TransitionStyle::SubjectMorph => "Subject Morph",
            TransitionStyle::PortalWarp => "Portal Warp",
            TransitionStyle::Hyperlapse => "Hyperlapse",
            TransitionStyle::GeometricRebuild => "Geometric Rebuild",
            TransitionStyle::ObjectTracking => "Object Tracking",
            TransitionStyle::Custom(_) => "Custom",
        }
    }

    /// Instruction fragment sent to the text model.
    pub fn instruction(&self) -> &str {
        match self {
            TransitionStyle::Auto => {
                "Choose whichever camera movement best connects the two scenes. Be creative and cinematic."
            }
            TransitionStyle::DroneFlyThrough => {
                "A continuous aerial drone shot that flies forward through the first scene and emerges into the second, keeping altitude and motion smooth."
            }
            TransitionStyle::SubjectMorph => {
                "Keep the main subject anchored in frame while it fluidly morphs, and let the surroundings reshape from the first scene into the second."
            }
            TransitionStyle::PortalWarp => {
                "Open a glowing portal inside the first scene; the camera pushes through it and the space warps into the second scene on the other side."
            }
            TransitionStyle::Hyperlapse => {
                "A hyperlapse: the camera glides steadily while time accelerates, light and crowds streak, and the first scene gradually becomes the second."
            }
            TransitionStyle::GeometricRebuild => {
                "The first scene breaks apart into geometric shards and blocks that rotate and reassemble into the structure of the second scene."
            }
            TransitionStyle::ObjectTracking => {
                "Pick a moving object in the first frame and track it closely; follow its trajectory until it leads the camera into the second scene."
            }
            TransitionStyle::Custom(text) => text.as_str(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, TransitionStyle::Custom(_))
    }
}

impl fmt::Display for TransitionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for TransitionStyle {
    type Err = String;

    /// Parses a preset id. Custom text is attached separately.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        TransitionStyle::presets()
            .into_iter()
            .find(|style| style.id() == wanted)
            .ok_or_else(|| {
                let ids: Vec<&str> = TransitionStyle::presets().iter().map(|s| s.id()).collect();
                format!("Unknown transition style '{}'. Expected one of: {}", s, ids.join(", "))
            })
    }
}

/// Full instruction for a style. Fails on blank custom text.
pub fn compose_instruction(style: &TransitionStyle) -> Result<String> {
    let direction = style.instruction().trim();
    if style.is_custom() && direction.is_empty() {
        return Err(VibeshiftError::Validation(CUSTOM_TEXT_REQUIRED.to_string()));
    }
    Ok(format!("{}\n{}", TASK_FRAME, direction))
}

/// Turns two frames and a style into a single-sentence video prompt.
pub struct TransitionPromptBuilder {
    generator: Arc<dyn TextGenerator>,
}

impl TransitionPromptBuilder {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn build_prompt(
        &self,
        start: &NormalizedImage,
        end: &NormalizedImage,
        style: &TransitionStyle,
        api_key: &ApiKey,
    ) -> Result<String> {
        let instruction = compose_instruction(style)?;

        let request = TextRequest {
            instruction,
            images: vec![start.to_inline(), end.to_inline()],
        };

        debug!(
            "Requesting transition prompt from {} (style: {})",
            self.generator.name(),
            style.id()
        );

        let text = self.generator.generate(&request, api_key).await.map_err(|e| match e {
            VibeshiftError::Credential(msg) => VibeshiftError::Credential(msg),
            VibeshiftError::PromptGeneration(msg) => VibeshiftError::PromptGeneration(msg),
            other => VibeshiftError::PromptGeneration(other.to_string()),
        })?;

        let prompt = text.trim();
        if prompt.is_empty() {
            warn!("Text model returned an empty prompt, using fallback");
            return Ok(FALLBACK_PROMPT.to_string());
        }

        info!("Generated transition prompt: {}", prompt);
        Ok(prompt.to_string())
    }
}
