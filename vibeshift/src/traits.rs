use crate::types::{ApiKey, OperationHandle, OperationSnapshot, Result, TextRequest, VideoRequest};
use async_trait::async_trait;

/// Multimodal text-generation collaborator
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Human-readable name for this collaborator
    fn name(&self) -> String;

    /// Generate text from an instruction and inline images.
    /// Returns the raw text; an empty string is a valid answer.
    async fn generate(&self, request: &TextRequest, api_key: &ApiKey) -> Result<String>;
}

/// Long-running video-generation collaborator
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    fn name(&self) -> String;

    /// Submit a job and return its first status
    async fn submit(&self, request: &VideoRequest, api_key: &ApiKey) -> Result<OperationSnapshot>;

    /// Re-query the status of a submitted job
    async fn poll(&self, handle: &OperationHandle, api_key: &ApiKey) -> Result<OperationSnapshot>;

    /// Download the finished asset behind a result locator
    async fn fetch(&self, locator: &str, api_key: &ApiKey) -> Result<Vec<u8>>;
}
