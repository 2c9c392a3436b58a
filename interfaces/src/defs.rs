use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output framing shared by the normalizer and the video request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 2] = [AspectRatio::Landscape, AspectRatio::Portrait];

    /// Width term of the ratio.
    pub fn width_term(self) -> u32 {
        match self {
            AspectRatio::Landscape => 16,
            AspectRatio::Portrait => 9,
        }
    }

    /// Height term of the ratio.
    pub fn height_term(self) -> u32 {
        match self {
            AspectRatio::Landscape => 9,
            AspectRatio::Portrait => 16,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Portrait),
            other => Err(format!("Unsupported aspect ratio '{}'. Use 16:9 or 9:16", other)),
        }
    }
}

/// An image passed inline to a remote model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64 payload without any `data:` prefix.
    pub data: String,
}

/// Instruction plus ordered images for the text model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextRequest {
    pub instruction: String,
    pub images: Vec<InlineImage>,
}

/// One video job: prompt, first and last frame, framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoRequest {
    pub prompt: String,
    pub first_frame: InlineImage,
    pub last_frame: InlineImage,
    pub aspect_ratio: AspectRatio,
    pub resolution: String,
    pub sample_count: u32,
}

/// Opaque handle of a long-running remote operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationHandle(pub String);

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteError {
    pub code: Option<i32>,
    pub message: String,
}

/// Status of a remote operation as reported by the video collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationSnapshot {
    pub handle: OperationHandle,
    pub done: bool,
    pub error: Option<RemoteError>,
    pub result_locator: Option<String>,
}

impl OperationSnapshot {
    pub fn pending(handle: OperationHandle) -> Self {
        Self {
            handle,
            done: false,
            error: None,
            result_locator: None,
        }
    }
}
