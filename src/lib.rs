//! # pdf2rules
//!
//! Extract rules, guidelines and constraints from PDF documents with
//! vision and text LLMs, attributing each rule to the page or page range it
//! came from.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ Stage 1  pages
//!  │   ├─ render    rasterise pages via pdfium (spawn_blocking)
//!  │   ├─ encode    JPEG q85 → base64 ImageData
//!  │   ├─ extract   bounded-concurrency vision calls, reassembled 1..N
//!  │   └─ output    page document: "## Page N" blocks separated by "---"
//!  │
//!  └─ Stage 2  rules
//!      ├─ parse     page document → page index
//!      ├─ select    single-pass (≤ 10 pages) or sliding window
//!      ├─ analyse   one call, or one call per 3-page window
//!      └─ merge     windows only: one consolidation call
//! ```
//!
//! Both stages talk to external models through the
//! [`TextExtractionService`] and [`TextAnalysisService`] traits. The
//! `edgequake-llm` adapters in [`pipeline::llm`] are used by default; tests and
//! embedders can inject their own implementations into
//! [`PageExtractionCoordinator`] and [`RuleExtractionStrategist`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2rules::{extract_pages, extract_rules, AnalysisConfig, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let pages = extract_pages("handbook.pdf", &ExtractionConfig::default()).await?;
//!     let text = pages.document.to_markdown();
//!
//!     let outcome = extract_rules(&text, &AnalysisConfig::default()).await?;
//!     println!("{} ({} calls)", outcome.strategy, outcome.analysis_calls);
//!     for rule in outcome.report.rules().rules {
//!         println!("[{}] {}", rule.pages, rule.text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2rules` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! ```toml
//! pdf2rules = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod consolidate;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod extract;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod service;
pub mod strategy;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, ExtractionConfig, ExtractionConfigBuilder, WindowFailurePolicy,
    DEFAULT_MODEL,
};
pub use consolidate::Consolidator;
pub use coordinator::{ExtractedDocument, ExtractionStats, PageExtractionCoordinator};
pub use document::{Page, PageDocument};
pub use error::{AnalysisStage, PageError, Pdf2RulesError, ServiceError};
pub use extract::{
    extract_pages, extract_pages_to_file, extract_rules, extract_rules_from_file, run_pipeline, save_report,
    PipelineOutput,
};
pub use parser::{parse_pages, PageIndex, PageIndexParser, ParseError, ParseMode};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use report::{ExtractionReport, PageRange, ReportProvenance, RuleEntry, RuleReport};
pub use service::{AnalysisRequest, TextAnalysisService, TextExtractionService};
pub use strategy::{
    build_windows, plan_analysis, select_strategy, AnalysisPlan, ExtractionOutcome, RuleExtractionStrategist,
    Strategy, Window,
};
