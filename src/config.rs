//! Configuration for the two pipeline stages.
//!
//! Stage 1 (page extraction) is controlled by [`ExtractionConfig`], stage 2
//! (rule analysis) by [`AnalysisConfig`]. Both are built through builders that
//! clamp out-of-range values and validate the rest, so a config that exists is
//! a config that can run.

use crate::error::Pdf2RulesError;
use crate::parser::ParseMode;
use crate::progress::ProgressCallback;
use crate::strategy::Strategy;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default model for both the vision and the analysis service.
pub const DEFAULT_MODEL: &str = "gpt-4o";

// ── Stage 1 ──────────────────────────────────────────────────────────────

/// Configuration for rendering a PDF and transcribing its pages.
///
/// # Example
/// ```rust
/// use pdf2rules::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(150)
///     .concurrency(8)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI. Range: 72–400. Default: 150.
    ///
    /// 100 renders faster and uploads smaller images; 200 helps with small print.
    pub dpi: u32,

    /// Maximum concurrent extraction calls. Default: 5.
    ///
    /// Clamped to the page count at run time.
    pub concurrency: usize,

    /// Vision model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for transcription. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 1500.
    pub max_tokens: usize,

    /// Per-page extraction timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Path to an existing pdfium shared library. If None, the cached copy is
    /// used, downloading it on first run.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Custom transcription system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Receives one event per page as it completes.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            concurrency: 5,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 1500,
            api_timeout_secs: 60,
            password: None,
            pdfium_lib_path: None,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2RulesError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Pdf2RulesError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2RulesError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2RulesError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        if c.max_tokens == 0 {
            return Err(Pdf2RulesError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Stage 2 ──────────────────────────────────────────────────────────────

/// What to do when one sliding-window call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowFailurePolicy {
    /// Mark the window as failed and continue with the rest. (default)
    ///
    /// The run fails only if every window fails.
    #[default]
    Isolate,
    /// Abort the whole analysis on the first failed window.
    FailFast,
}

/// Configuration for rule analysis over a page document.
///
/// # Example
/// ```rust
/// use pdf2rules::{AnalysisConfig, Strategy, WindowFailurePolicy};
///
/// let config = AnalysisConfig::builder()
///     .strategy(Strategy::SlidingWindow)
///     .window_concurrency(4)
///     .window_failure_policy(WindowFailurePolicy::FailFast)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Analysis model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for analysis. Default: 0.2.
    pub temperature: f32,

    /// Forced strategy. If None, chosen from the page count.
    pub strategy: Option<Strategy>,

    /// Largest page count analysed in a single pass when no strategy is
    /// forced. Default: 10.
    pub single_pass_max_pages: usize,

    /// Documents with at most this many pages are always analysed in a single
    /// pass, even when sliding window is forced. Default: 3.
    pub min_window_pages: usize,

    /// Maximum concurrent window calls. Default: 1 (sequential, page order).
    pub window_concurrency: usize,

    /// Failure handling for individual windows. Default: [`WindowFailurePolicy::Isolate`].
    pub window_failure_policy: WindowFailurePolicy,

    /// Token limit for the single-pass call. Default: 4000.
    pub single_pass_max_tokens: usize,

    /// Token limit for each window call. Default: 1500.
    pub window_max_tokens: usize,

    /// Token limit for the consolidation call. Default: 4000.
    pub consolidation_max_tokens: usize,

    /// Retries for transient analysis failures. Default: 0.
    ///
    /// Authentication and rejected-request errors are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds; doubles after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call analysis timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Page grammar enforcement when reading the page document. Default: best effort.
    pub parse_mode: ParseMode,

    /// Receives window and consolidation events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            strategy: None,
            single_pass_max_pages: 10,
            min_window_pages: 3,
            window_concurrency: 1,
            window_failure_policy: WindowFailurePolicy::default(),
            single_pass_max_tokens: 4000,
            window_max_tokens: 1500,
            consolidation_max_tokens: 4000,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            parse_mode: ParseMode::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("strategy", &self.strategy)
            .field("single_pass_max_pages", &self.single_pass_max_pages)
            .field("min_window_pages", &self.min_window_pages)
            .field("window_concurrency", &self.window_concurrency)
            .field("window_failure_policy", &self.window_failure_policy)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("parse_mode", &self.parse_mode)
            .finish()
    }
}

impl AnalysisConfig {
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = Some(strategy);
        self
    }

    pub fn single_pass_max_pages(mut self, n: usize) -> Self {
        self.config.single_pass_max_pages = n;
        self
    }

    pub fn min_window_pages(mut self, n: usize) -> Self {
        self.config.min_window_pages = n;
        self
    }

    pub fn window_concurrency(mut self, n: usize) -> Self {
        self.config.window_concurrency = n.max(1);
        self
    }

    pub fn window_failure_policy(mut self, policy: WindowFailurePolicy) -> Self {
        self.config.window_failure_policy = policy;
        self
    }

    pub fn single_pass_max_tokens(mut self, n: usize) -> Self {
        self.config.single_pass_max_tokens = n;
        self
    }

    pub fn window_max_tokens(mut self, n: usize) -> Self {
        self.config.window_max_tokens = n;
        self
    }

    pub fn consolidation_max_tokens(mut self, n: usize) -> Self {
        self.config.consolidation_max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn parse_mode(mut self, mode: ParseMode) -> Self {
        self.config.parse_mode = mode;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, Pdf2RulesError> {
        let c = &self.config;
        if c.window_concurrency == 0 {
            return Err(Pdf2RulesError::InvalidConfig(
                "Window concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2RulesError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        if c.single_pass_max_tokens == 0 || c.window_max_tokens == 0 || c.consolidation_max_tokens == 0 {
            return Err(Pdf2RulesError::InvalidConfig(
                "Token limits must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.dpi, 150);
        assert_eq!(c.concurrency, 5);
        assert_eq!(c.max_tokens, 1500);
        assert!((c.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn extraction_builder_clamps() {
        let c = ExtractionConfig::builder()
            .dpi(10)
            .concurrency(0)
            .temperature(9.0)
            .build()
            .expect("clamped values are valid");
        assert_eq!(c.dpi, 72);
        assert_eq!(c.concurrency, 1);
        assert!((c.temperature - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn extraction_rejects_zero_timeout() {
        let err = ExtractionConfig::builder().api_timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, Pdf2RulesError::InvalidConfig(_)));
    }

    #[test]
    fn analysis_defaults_match_reference_behaviour() {
        let c = AnalysisConfig::default();
        assert_eq!(c.strategy, None);
        assert_eq!(c.single_pass_max_pages, 10);
        assert_eq!(c.min_window_pages, 3);
        assert_eq!(c.window_concurrency, 1);
        assert_eq!(c.window_failure_policy, WindowFailurePolicy::Isolate);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.single_pass_max_tokens, 4000);
        assert_eq!(c.window_max_tokens, 1500);
    }

    #[test]
    fn analysis_builder_sets_strategy() {
        let c = AnalysisConfig::builder()
            .strategy(Strategy::SinglePass)
            .window_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.strategy, Some(Strategy::SinglePass));
        assert_eq!(c.window_concurrency, 1);
    }

    #[test]
    fn analysis_rejects_zero_token_limit() {
        let err = AnalysisConfig::builder().window_max_tokens(0).build().unwrap_err();
        assert!(err.to_string().contains("Token limits"));
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", AnalysisConfig::default());
        assert!(s.contains("AnalysisConfig"));
        assert!(s.contains("provider: None"));
    }
}
