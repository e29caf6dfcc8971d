//! LLM-backed implementations of the service traits.
//!
//! Both adapters are thin: they translate a request into `edgequake-llm` chat
//! messages, send it, and classify any provider error into a
//! [`ServiceError`]. Timeouts, retries and failure isolation live in the core
//! ([`crate::coordinator`], [`crate::strategy`]) so they behave identically
//! for every provider and can be tested with in-memory services.

use crate::config::DEFAULT_MODEL;
use crate::error::{Pdf2RulesError, ServiceError};
use crate::prompts::{EXTRACTION_SYSTEM_PROMPT, EXTRACTION_USER_PROMPT};
use crate::service::{AnalysisRequest, TextAnalysisService, TextExtractionService};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Transcribes page images with a vision-capable model.
///
/// ## Message Layout
///
/// 1. **System message** — the transcription prompt (or a caller override)
/// 2. **User message** — a short instruction plus the page image at high detail
pub struct VisionPageExtractor {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
}

impl VisionPageExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            system_prompt: EXTRACTION_SYSTEM_PROMPT.to_string(),
            temperature: 0.1,
            max_tokens: 1500,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl TextExtractionService for VisionPageExtractor {
    async fn extract_page(&self, page_num: usize, image: ImageData) -> Result<String, ServiceError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(EXTRACTION_USER_PROMPT, vec![image]),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ServiceError::classify(e.to_string()))?;

        debug!(
            "Page {}: {} input tokens, {} output tokens, {:?}",
            page_num,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Runs rule-analysis prompts against a text model.
pub struct LlmRuleAnalyzer {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
}

impl LlmRuleAnalyzer {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            temperature: 0.2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl TextAnalysisService for LlmRuleAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<String, ServiceError> {
        let start = Instant::now();
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(request.user_prompt));

        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ServiceError::classify(e.to_string()))?;

        debug!(
            "Analysis: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** — used as-is (tests, custom middleware).
/// 2. **Named provider + model** — [`ProviderFactory::create_llm_provider`]
///    reads the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **`OPENAI_API_KEY` present** — OpenAI with the configured model.
/// 5. **Full auto-detection** ([`ProviderFactory::from_env`]).
pub fn resolve_provider(
    provider: Option<&Arc<dyn LLMProvider>>,
    provider_name: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, Pdf2RulesError> {
    if let Some(provider) = provider {
        return Ok(Arc::clone(provider));
    }

    let model = model.unwrap_or(DEFAULT_MODEL);

    if let Some(name) = provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2RulesError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2RulesError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2RulesError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
