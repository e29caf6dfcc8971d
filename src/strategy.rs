//! Stage 2: choose between single-pass and sliding-window rule extraction
//! and run it.
//!
//! ## Strategy selection
//!
//! [`select_strategy`] is a pure function of the page count and config:
//! an explicit override wins, otherwise documents of up to
//! `single_pass_max_pages` pages go single-pass. A sliding-window choice on a
//! document of `min_window_pages` pages or fewer falls back to single-pass,
//! because a window of radius 1 would already cover the whole document.
//!
//! ## Sliding window
//!
//! ```text
//! pages:    1   2   3   4   5
//! window 1 [1   2]
//! window 2 [1   2   3]
//! window 3     [2   3   4]
//! window 4         [3   4   5]
//! window 5             [4   5]
//!                  │
//!                  ▼
//!            Consolidator (one call, all reports)
//! ```
//!
//! Window calls run through `buffered(window_concurrency)`, so reports are
//! collected in page order whatever order the calls finish in.

use crate::config::{AnalysisConfig, WindowFailurePolicy};
use crate::consolidate::Consolidator;
use crate::document::page_header;
use crate::error::{AnalysisStage, Pdf2RulesError, ServiceError};
use crate::parser::{PageIndex, PageIndexParser};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::{single_pass_prompt, window_prompt, SINGLE_PASS_SYSTEM_PROMPT, WINDOW_SYSTEM_PROMPT};
use crate::report::{ExtractionReport, ReportProvenance};
use crate::service::{AnalysisRequest, TextAnalysisService};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// How a document is analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One call over the whole document.
    SinglePass,
    /// One call per page-centred window, then a consolidation call.
    SlidingWindow,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::SinglePass => write!(f, "single-pass"),
            Strategy::SlidingWindow => write!(f, "sliding-window"),
        }
    }
}

/// Pick the strategy for a document of `page_count` pages.
pub fn select_strategy(page_count: usize, requested: Option<Strategy>, config: &AnalysisConfig) -> Strategy {
    let chosen = requested.unwrap_or(if page_count <= config.single_pass_max_pages {
        Strategy::SinglePass
    } else {
        Strategy::SlidingWindow
    });

    // Windows need at least one page to focus on, whatever the configured minimum.
    if chosen == Strategy::SlidingWindow && (page_count == 0 || page_count <= config.min_window_pages) {
        debug!(
            "{} pages is at or below the window minimum ({}); using single-pass",
            page_count, config.min_window_pages
        );
        return Strategy::SinglePass;
    }
    chosen
}

// ── Windows ──────────────────────────────────────────────────────────────

/// A focus page plus its immediate neighbours, borrowing page text from the
/// parsed index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window<'a> {
    pub focus_page: usize,
    pub start_page: usize,
    pub end_page: usize,
    pub pages: Vec<(usize, &'a str)>,
}

impl Window<'_> {
    /// The window's pages, each under its page header.
    pub fn content(&self) -> String {
        self.pages
            .iter()
            .map(|(number, text)| format!("{}\n\n{}\n", page_header(*number), text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn prompt(&self) -> String {
        window_prompt(self.start_page, self.end_page, self.focus_page, &self.content())
    }

    pub fn provenance(&self) -> ReportProvenance {
        ReportProvenance::Window {
            focus_page: self.focus_page,
            start_page: self.start_page,
            end_page: self.end_page,
        }
    }
}

/// One window per page, radius 1, clamped to the document.
///
/// Neighbours are taken by position among the parsed page numbers, so a
/// best-effort index with a gap still yields three-page windows.
pub fn build_windows(index: &PageIndex) -> Vec<Window<'_>> {
    let pages: Vec<(usize, &str)> = index.iter().collect();
    let last = pages.len().saturating_sub(1);

    (0..pages.len())
        .map(|i| {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(last);
            Window {
                focus_page: pages[i].0,
                start_page: pages[lo].0,
                end_page: pages[hi].0,
                pages: pages[lo..=hi].to_vec(),
            }
        })
        .collect()
}

// ── Plan ─────────────────────────────────────────────────────────────────

/// What a run would do, computed without calling any service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPlan {
    pub page_count: usize,
    pub page_numbers: Vec<usize>,
    pub strategy: Strategy,
    pub window_count: usize,
    /// Analysis calls a successful run issues (retries excluded).
    pub analysis_calls: usize,
}

/// Parse `document_text` and report the strategy and call count.
pub fn plan_analysis(document_text: &str, config: &AnalysisConfig) -> Result<AnalysisPlan, Pdf2RulesError> {
    let index = PageIndexParser::new(config.parse_mode).parse(document_text)?;
    let page_count = index.len();
    let strategy = select_strategy(page_count, config.strategy, config);
    let window_count = match strategy {
        Strategy::SinglePass => 0,
        Strategy::SlidingWindow => page_count,
    };
    Ok(AnalysisPlan {
        page_count,
        page_numbers: index.page_numbers(),
        strategy,
        window_count,
        analysis_calls: if window_count == 0 { 1 } else { window_count + 1 },
    })
}

// ── Strategist ───────────────────────────────────────────────────────────

/// Everything a stage-2 run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub strategy: Strategy,
    pub page_count: usize,
    /// Per-window reports in page order; empty for single-pass.
    pub window_reports: Vec<ExtractionReport>,
    /// Focus pages of windows whose call failed and was isolated.
    pub failed_windows: Vec<usize>,
    /// Analysis calls issued, retries excluded.
    pub analysis_calls: usize,
    pub report: ExtractionReport,
}

/// Runs rule extraction over a page document.
pub struct RuleExtractionStrategist {
    service: Arc<dyn TextAnalysisService>,
    config: AnalysisConfig,
    consolidator: Consolidator,
    progress: ProgressCallback,
}

impl RuleExtractionStrategist {
    pub fn new(service: Arc<dyn TextAnalysisService>, config: AnalysisConfig) -> Self {
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        let consolidator = Consolidator::new(Arc::clone(&service), config.clone());
        Self {
            service,
            config,
            consolidator,
            progress,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Parse `document_text` and extract its rules.
    pub async fn run(&self, document_text: &str) -> Result<ExtractionOutcome, Pdf2RulesError> {
        let index = PageIndexParser::new(self.config.parse_mode).parse(document_text)?;
        self.run_indexed(document_text, &index).await
    }

    /// Extract rules from an already-parsed document.
    ///
    /// `document_text` is sent as-is for single-pass; windows are built
    /// from `index`.
    pub async fn run_indexed(
        &self,
        document_text: &str,
        index: &PageIndex,
    ) -> Result<ExtractionOutcome, Pdf2RulesError> {
        let page_count = index.len();
        let strategy = select_strategy(page_count, self.config.strategy, &self.config);
        info!("Analysing {} pages using {} extraction", page_count, strategy);

        match strategy {
            Strategy::SinglePass => self.run_single_pass(document_text, page_count).await,
            Strategy::SlidingWindow => self.run_windows(index).await,
        }
    }

    async fn run_single_pass(
        &self,
        document_text: &str,
        page_count: usize,
    ) -> Result<ExtractionOutcome, Pdf2RulesError> {
        self.progress.on_analysis_start(page_count, 0);

        let request = AnalysisRequest::new(single_pass_prompt(document_text), self.config.single_pass_max_tokens)
            .with_system(SINGLE_PASS_SYSTEM_PROMPT);
        let text = analyze_with_retry(self.service.as_ref(), request, &self.config, AnalysisStage::SinglePass)
            .await
            .map_err(|source| Pdf2RulesError::Analysis {
                stage: AnalysisStage::SinglePass,
                source,
            })?;

        Ok(ExtractionOutcome {
            strategy: Strategy::SinglePass,
            page_count,
            window_reports: Vec::new(),
            failed_windows: Vec::new(),
            analysis_calls: 1,
            report: ExtractionReport::new(text, ReportProvenance::FullDocument),
        })
    }

    async fn run_windows(&self, index: &PageIndex) -> Result<ExtractionOutcome, Pdf2RulesError> {
        let page_count = index.len();
        let windows = build_windows(index);
        let total = windows.len();
        self.progress.on_analysis_start(page_count, total);

        let attempted = AtomicUsize::new(0);
        let attempted_ref = &attempted;
        let mut results = std::pin::pin!(stream::iter(windows.iter())
            .map(move |window| async move {
                attempted_ref.fetch_add(1, Ordering::SeqCst);
                info!(
                    "Window {}/{}: pages {}-{} (focusing on page {})",
                    window.focus_page, total, window.start_page, window.end_page, window.focus_page
                );
                let request = AnalysisRequest::new(window.prompt(), self.config.window_max_tokens)
                    .with_system(WINDOW_SYSTEM_PROMPT);
                let stage = AnalysisStage::Window {
                    focus_page: window.focus_page,
                };
                let result = analyze_with_retry(self.service.as_ref(), request, &self.config, stage).await;
                (window, result)
            })
            .buffered(self.config.window_concurrency.max(1)));

        let mut reports = Vec::with_capacity(total);
        let mut failures: Vec<(usize, ServiceError)> = Vec::new();
        while let Some((window, result)) = results.next().await {
            self.progress
                .on_window_complete(window.focus_page, total, result.is_ok());
            match result {
                Ok(text) => reports.push(ExtractionReport::new(text, window.provenance())),
                Err(e) => {
                    warn!(
                        "Window {} (pages {}-{}) failed: {}",
                        window.focus_page, window.start_page, window.end_page, e
                    );
                    if self.config.window_failure_policy == WindowFailurePolicy::FailFast {
                        return Err(Pdf2RulesError::Analysis {
                            stage: AnalysisStage::Window {
                                focus_page: window.focus_page,
                            },
                            source: e,
                        });
                    }
                    let marker = format!("[Error: window {} failed: {}]", window.focus_page, e);
                    reports.push(ExtractionReport::new(marker, window.provenance()));
                    failures.push((window.focus_page, e));
                }
            }
        }

        if total > 0 && failures.len() == total {
            return Err(Pdf2RulesError::AllWindowsFailed {
                total,
                first_error: failures[0].1.to_string(),
            });
        }
        let window_calls = attempted.load(Ordering::SeqCst);
        info!(
            "All windows processed ({} failed). Consolidating results...",
            failures.len()
        );

        self.progress.on_consolidation_start(total);
        let report = self.consolidator.consolidate(page_count, &reports).await?;

        Ok(ExtractionOutcome {
            strategy: Strategy::SlidingWindow,
            page_count,
            window_reports: reports,
            failed_windows: failures.into_iter().map(|(page, _)| page).collect(),
            analysis_calls: window_calls + 1,
            report,
        })
    }
}

/// Send one analysis request, bounded by the per-call timeout and retried on
/// transient errors with exponential backoff.
pub(crate) async fn analyze_with_retry(
    service: &dyn TextAnalysisService,
    request: AnalysisRequest,
    config: &AnalysisConfig,
    stage: AnalysisStage,
) -> Result<String, ServiceError> {
    let timeout = Duration::from_secs(config.api_timeout_secs);
    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config
                .retry_backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                "{}: retry {}/{} after {}ms",
                stage, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let result = match tokio::time::timeout(timeout, service.analyze(request.clone())).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout {
                secs: config.api_timeout_secs,
            }),
        };

        match result {
            Ok(text) => {
                debug!("{}: {} chars returned", stage, text.len());
                return Ok(text);
            }
            Err(e) if e.is_retryable() => {
                warn!("{}: attempt {} failed — {}", stage, attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| ServiceError::Rejected("no attempt was made".into())))
}
