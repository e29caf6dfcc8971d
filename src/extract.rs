//! End-to-end entry points for both pipeline stages.
//!
//! ```text
//! extract_pages        PDF ──▶ render ──▶ encode ──▶ coordinator ──▶ PageDocument
//! extract_rules        page document text ──▶ strategist ──▶ ExtractionOutcome
//! run_pipeline         both, with the page document written in between
//! ```
//!
//! Each entry point resolves its own LLM provider from the stage config and
//! injects it into the core through the service traits.

use crate::config::{AnalysisConfig, ExtractionConfig};
use crate::coordinator::{ExtractedDocument, PageExtractionCoordinator};
use crate::error::{PageError, Pdf2RulesError};
use crate::pipeline::llm::{resolve_provider, LlmRuleAnalyzer, VisionPageExtractor};
use crate::pipeline::{encode, input, render};
use crate::report::format_report_file;
use crate::strategy::{ExtractionOutcome, RuleExtractionStrategist};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of [`run_pipeline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub pages: ExtractedDocument,
    pub rules: ExtractionOutcome,
}

/// Stage 1: transcribe every page of a PDF.
///
/// Returns `Ok` even when some pages failed; those pages carry a failure
/// marker (see [`ExtractedDocument::errors`]).
///
/// # Errors
/// Fatal input problems only: missing/unreadable file, not a PDF, wrong or
/// missing password, pdfium unavailable, no provider configured.
pub async fn extract_pages(
    pdf_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractedDocument, Pdf2RulesError> {
    let start = Instant::now();
    let pdf_path = input::resolve_pdf(pdf_path)?;
    info!("Starting page extraction: {}", pdf_path.display());

    // ── Provider ─────────────────────────────────────────────────────────
    let provider = resolve_provider(
        config.provider.as_ref(),
        config.provider_name.as_deref(),
        config.model.as_deref(),
    )?;
    let mut extractor =
        VisionPageExtractor::new(provider).with_sampling(config.temperature, config.max_tokens);
    if let Some(prompt) = &config.system_prompt {
        extractor = extractor.with_system_prompt(prompt.as_str());
    }

    // ── Render + encode ──────────────────────────────────────────────────
    let render_start = Instant::now();
    let rendered = render::render_pages(&pdf_path, config).await?;
    info!(
        "Rendered {} pages in {}ms",
        rendered.len(),
        render_start.elapsed().as_millis()
    );

    let images: Vec<_> = rendered
        .iter()
        .enumerate()
        .map(|(idx, img)| {
            encode::encode_page(img).map_err(|e| PageError::EncodingFailed {
                page: idx + 1,
                detail: e.to_string(),
            })
        })
        .collect();
    drop(rendered);

    // ── Transcribe ───────────────────────────────────────────────────────
    let coordinator = PageExtractionCoordinator::from_config(Arc::new(extractor), config);
    let mut extracted = coordinator.extract_prepared(images).await;

    if let Some(name) = pdf_path.file_name() {
        extracted.document.title = Some(name.to_string_lossy().into_owned());
    }
    if !extracted.errors.is_empty() {
        warn!(
            "{} of {} pages failed: {:?}",
            extracted.errors.len(),
            extracted.stats.total_pages,
            extracted.failed_pages()
        );
    }
    debug!("Stage 1 finished in {}ms", start.elapsed().as_millis());

    Ok(extracted)
}

/// Stage 1, then write the page document to `output_path` atomically.
pub async fn extract_pages_to_file(
    pdf_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractedDocument, Pdf2RulesError> {
    let extracted = extract_pages(pdf_path, config).await?;
    let output_path = output_path.as_ref();
    input::write_atomic(output_path, &extracted.document.to_markdown()).await?;
    info!("Page document saved to {}", output_path.display());
    Ok(extracted)
}

/// Stage 2: extract rules from page document text.
pub async fn extract_rules(
    document_text: &str,
    config: &AnalysisConfig,
) -> Result<ExtractionOutcome, Pdf2RulesError> {
    let provider = resolve_provider(
        config.provider.as_ref(),
        config.provider_name.as_deref(),
        config.model.as_deref(),
    )?;
    let analyzer = LlmRuleAnalyzer::new(provider).with_temperature(config.temperature);
    let strategist = RuleExtractionStrategist::new(Arc::new(analyzer), config.clone());
    strategist.run(document_text).await
}

/// Stage 2 from a page document file, writing the report file atomically.
pub async fn extract_rules_from_file(
    markdown_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<ExtractionOutcome, Pdf2RulesError> {
    let markdown_path = markdown_path.as_ref();
    let text = input::read_page_document(markdown_path).await?;
    let outcome = extract_rules(&text, config).await?;
    save_report(markdown_path, output_path.as_ref(), &outcome).await?;
    Ok(outcome)
}

/// Both stages: PDF → page document file → report file.
pub async fn run_pipeline(
    pdf_path: impl AsRef<Path>,
    pages_path: impl AsRef<Path>,
    rules_path: impl AsRef<Path>,
    extraction: &ExtractionConfig,
    analysis: &AnalysisConfig,
) -> Result<PipelineOutput, Pdf2RulesError> {
    let pages_path = pages_path.as_ref();
    let pages = extract_pages_to_file(pdf_path, pages_path, extraction).await?;

    let text = pages.document.to_markdown();
    let rules = extract_rules(&text, analysis).await?;
    save_report(pages_path, rules_path.as_ref(), &rules).await?;

    Ok(PipelineOutput { pages, rules })
}

/// Write the report file for `outcome` atomically; `source` is the page
/// document it was extracted from.
pub async fn save_report(
    source: &Path,
    output_path: &Path,
    outcome: &ExtractionOutcome,
) -> Result<(), Pdf2RulesError> {
    let contents = format_report_file(
        &source.display().to_string(),
        outcome.page_count,
        &outcome.report.text,
    );
    input::write_atomic(output_path, &contents).await?;
    info!("Rules saved to {}", output_path.display());
    Ok(())
}
