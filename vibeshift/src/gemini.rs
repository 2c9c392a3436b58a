use crate::traits::{TextGenerator, VideoGenerator};
use crate::types::{
    ApiKey, GeminiConfig, InlineImage, OperationHandle, OperationSnapshot, RemoteError, Result,
    TextRequest, VibeshiftError, VideoRequest,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

const API_KEY_HEADER: &str = "x-goog-api-key";

// --- generateContent wire types ---

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
struct InlineData<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize, Debug, Default)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
pub struct CandidatePart {
    pub text: Option<String>,
}

// --- predictLongRunning wire types ---

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<VideoInstance<'a>>,
    parameters: VideoParameters<'a>,
}

#[derive(Serialize)]
struct VideoInstance<'a> {
    prompt: &'a str,
    image: FrameBytes<'a>,
    #[serde(rename = "lastFrame")]
    last_frame: FrameBytes<'a>,
}

#[derive(Serialize)]
struct FrameBytes<'a> {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: &'a str,
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
}

impl<'a> From<&'a InlineImage> for FrameBytes<'a> {
    fn from(image: &'a InlineImage) -> Self {
        Self {
            bytes_base64_encoded: &image.data,
            mime_type: &image.mime_type,
        }
    }
}

#[derive(Serialize)]
struct VideoParameters<'a> {
    #[serde(rename = "aspectRatio")]
    aspect_ratio: &'a str,
    resolution: &'a str,
    #[serde(rename = "sampleCount")]
    sample_count: u32,
}

#[derive(Deserialize, Debug)]
pub struct OperationResponse {
    pub name: String,
    #[serde(default)]
    pub done: Option<bool>,
    pub error: Option<OperationErrorBody>,
    pub response: Option<VideoResponseBody>,
}

#[derive(Deserialize, Debug)]
pub struct OperationErrorBody {
    pub code: Option<i32>,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub struct VideoResponseBody {
    #[serde(rename = "generateVideoResponse")]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Deserialize, Debug)]
pub struct GenerateVideoResponse {
    #[serde(rename = "generatedSamples")]
    pub generated_samples: Option<Vec<GeneratedSample>>,
}

#[derive(Deserialize, Debug)]
pub struct GeneratedSample {
    pub video: Option<VideoRef>,
}

#[derive(Deserialize, Debug)]
pub struct VideoRef {
    pub uri: Option<String>,
}

/// Concatenated text of the first candidate, `None` when the model sent no text part.
pub fn extract_text(response: &GenerateContentResponse) -> Option<String> {
    let parts = &response.candidates.first()?.content.as_ref()?.parts;
    let texts: Vec<&str> = parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}

pub fn to_snapshot(response: OperationResponse) -> OperationSnapshot {
    let result_locator = response
        .response
        .and_then(|r| r.generate_video_response)
        .and_then(|r| r.generated_samples)
        .and_then(|samples| samples.into_iter().next())
        .and_then(|sample| sample.video)
        .and_then(|video| video.uri);

    OperationSnapshot {
        handle: OperationHandle(response.name),
        done: response.done.unwrap_or(false),
        error: response.error.map(|e| RemoteError {
            code: e.code,
            message: e.message,
        }),
        result_locator,
    }
}

/// Authentication failures, including the "entity not found" answer the
/// service gives for keys without access to the model.
pub fn is_credential_failure(status: u16, body: &str) -> bool {
    match status {
        401 | 403 => true,
        404 => body.contains("Requested entity was not found"),
        400 => body.contains("API_KEY_INVALID") || body.contains("API key not valid"),
        _ => false,
    }
}

/// Result locator with the credential appended as the `key` query parameter.
pub fn download_url(locator: &str, api_key: &ApiKey) -> Result<Url> {
    let mut url = Url::parse(locator)
        .map_err(|e| VibeshiftError::Transport(format!("Invalid video locator '{}': {}", locator, e)))?;
    url.query_pairs_mut().append_pair("key", api_key.expose());
    Ok(url)
}

/// HTTP collaborator for the Gemini text model and the Veo video model.
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .map_err(|e| VibeshiftError::General(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.config.base_url, model, method)
    }

    fn operation_url(&self, handle: &OperationHandle) -> String {
        format!("{}/v1beta/{}", self.config.base_url, handle.0)
    }

    /// Passes successful responses through; turns the rest into errors via `otherwise`.
    async fn check(
        response: Response,
        otherwise: impl FnOnce(String) -> VibeshiftError,
    ) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Request failed with HTTP {}: {}", status, body);
        if is_credential_failure(status.as_u16(), &body) {
            return Err(VibeshiftError::Credential(format!("HTTP {}", status)));
        }
        Err(otherwise(format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        )))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn name(&self) -> String {
        format!("Gemini ({})", self.config.text_model)
    }

    async fn generate(&self, request: &TextRequest, api_key: &ApiKey) -> Result<String> {
        let mut parts = vec![Part::Text {
            text: &request.instruction,
        }];
        parts.extend(request.images.iter().map(|image| Part::Inline {
            inline_data: InlineData {
                mime_type: &image.mime_type,
                data: &image.data,
            },
        }));

        let body = GenerateContentRequest {
            contents: vec![Content { role: "user", parts }],
        };

        let start = Instant::now();
        let response = self
            .client
            .post(self.model_url(&self.config.text_model, "generateContent"))
            .header(API_KEY_HEADER, api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| VibeshiftError::PromptGeneration(e.to_string()))?;
        let response = Self::check(response, VibeshiftError::PromptGeneration).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| VibeshiftError::PromptGeneration(e.to_string()))?;
        let parsed: GenerateContentResponse = serde_json::from_slice(&body)?;
        debug!("generateContent answered in {}ms", start.elapsed().as_millis());

        extract_text(&parsed)
            .ok_or_else(|| VibeshiftError::PromptGeneration("No text response from the text model".to_string()))
    }
}

#[async_trait]
impl VideoGenerator for GeminiClient {
    fn name(&self) -> String {
        format!("Veo ({})", self.config.video_model)
    }

    async fn submit(&self, request: &VideoRequest, api_key: &ApiKey) -> Result<OperationSnapshot> {
        let body = PredictRequest {
            instances: vec![VideoInstance {
                prompt: &request.prompt,
                image: (&request.first_frame).into(),
                last_frame: (&request.last_frame).into(),
            }],
            parameters: VideoParameters {
                aspect_ratio: request.aspect_ratio.as_str(),
                resolution: &request.resolution,
                sample_count: request.sample_count,
            },
        };

        let response = self
            .client
            .post(self.model_url(&self.config.video_model, "predictLongRunning"))
            .header(API_KEY_HEADER, api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| VibeshiftError::Submission(e.to_string()))?;
        let response = Self::check(response, VibeshiftError::Submission).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| VibeshiftError::Submission(e.to_string()))?;
        let operation: OperationResponse = serde_json::from_slice(&body)?;
        info!("Submitted video operation {}", operation.name);
        Ok(to_snapshot(operation))
    }

    async fn poll(&self, handle: &OperationHandle, api_key: &ApiKey) -> Result<OperationSnapshot> {
        let response = self
            .client
            .get(self.operation_url(handle))
            .header(API_KEY_HEADER, api_key.expose())
            .send()
            .await?;
        let response = Self::check(response, VibeshiftError::Transport).await?;

        let operation: OperationResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(to_snapshot(operation))
    }

    async fn fetch(&self, locator: &str, api_key: &ApiKey) -> Result<Vec<u8>> {
        let url = download_url(locator, api_key)?;
        let response = self.client.get(url).send().await?;
        let response = Self::check(response, VibeshiftError::Transport).await?;

        let bytes = response.bytes().await?;
        info!("Downloaded {} bytes of video", bytes.len());
        Ok(bytes.to_vec())
    }
}
