//! Seams to the two external services.
//!
//! The core never talks to an LLM SDK directly: the coordinator holds an
//! `Arc<dyn TextExtractionService>` and the strategist an
//! `Arc<dyn TextAnalysisService>`. Production code injects the adapters in
//! [`crate::pipeline::llm`]; tests inject in-memory fakes.

use crate::error::ServiceError;
use async_trait::async_trait;
use edgequake_llm::ImageData;

/// Transcribes one rendered page image to text.
#[async_trait]
pub trait TextExtractionService: Send + Sync {
    /// `page_num` is 1-indexed and is used only for logging/attribution.
    async fn extract_page(&self, page_num: usize, image: ImageData) -> Result<String, ServiceError>;
}

/// One analysis call: optional system instructions plus the task text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub max_tokens: usize,
}

impl AnalysisRequest {
    pub fn new(user_prompt: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            system_prompt: None,
            user_prompt: user_prompt.into(),
            max_tokens,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Produces a free-form rule-extraction report from a block of text.
#[async_trait]
pub trait TextAnalysisService: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<String, ServiceError>;
}
