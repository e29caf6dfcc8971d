//! Merge sliding-window reports into one final report.
//!
//! All window reports go to the analysis service in a single request, each
//! under a `=== WINDOW k ===` label. Deduplication and stitching of rules
//! that were flagged INCOMPLETE across window boundaries are left to that
//! call; nothing is merged locally.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisStage, Pdf2RulesError};
use crate::prompts::consolidation_prompt;
use crate::report::{ExtractionReport, ReportProvenance};
use crate::service::{AnalysisRequest, TextAnalysisService};
use crate::strategy::analyze_with_retry;
use std::sync::Arc;
use tracing::info;

pub struct Consolidator {
    service: Arc<dyn TextAnalysisService>,
    config: AnalysisConfig,
}

impl Consolidator {
    pub fn new(service: Arc<dyn TextAnalysisService>, config: AnalysisConfig) -> Self {
        Self { service, config }
    }

    /// Merge `window_reports` (in window order) from a `total_pages`-page
    /// document.
    pub async fn consolidate(
        &self,
        total_pages: usize,
        window_reports: &[ExtractionReport],
    ) -> Result<ExtractionReport, Pdf2RulesError> {
        if window_reports.is_empty() {
            return Err(Pdf2RulesError::Internal(
                "consolidation requires at least one window report".into(),
            ));
        }

        let texts: Vec<&str> = window_reports.iter().map(|r| r.text.as_str()).collect();
        let request = AnalysisRequest::new(
            consolidation_prompt(total_pages, &texts),
            self.config.consolidation_max_tokens,
        );
        info!("Consolidating {} window reports", texts.len());

        let text = analyze_with_retry(
            self.service.as_ref(),
            request,
            &self.config,
            AnalysisStage::Consolidation,
        )
        .await
        .map_err(|source| Pdf2RulesError::Analysis {
            stage: AnalysisStage::Consolidation,
            source,
        })?;

        Ok(ExtractionReport::new(
            text,
            ReportProvenance::Consolidated {
                windows: window_reports.len(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        requests: Mutex<Vec<AnalysisRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl TextAnalysisService for Capture {
        async fn analyze(&self, request: AnalysisRequest) -> Result<String, ServiceError> {
            self.requests.lock().unwrap().push(request);
            if self.fail {
                return Err(ServiceError::Rejected("context length exceeded".into()));
            }
            Ok("CONSOLIDATED RULES:\n[Page 1-3] Rule 1: merged".into())
        }
    }

    fn window_reports(n: usize) -> Vec<ExtractionReport> {
        (1..=n)
            .map(|i| {
                ExtractionReport::new(
                    format!("[Page {i}] Rule: r{i}"),
                    ReportProvenance::Window {
                        focus_page: i,
                        start_page: i.saturating_sub(1).max(1),
                        end_page: (i + 1).min(n),
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn one_call_with_every_report_labelled() {
        let service = Arc::new(Capture::default());
        let consolidator = Consolidator::new(service.clone(), AnalysisConfig::default());
        let report = consolidator.consolidate(4, &window_reports(4)).await.unwrap();

        assert_eq!(report.provenance, ReportProvenance::Consolidated { windows: 4 });
        assert_eq!(report.text, "CONSOLIDATED RULES:\n[Page 1-3] Rule 1: merged");

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert!(req.system_prompt.is_none());
        assert_eq!(req.max_tokens, 4000);
        for i in 1..=4 {
            assert!(req
                .user_prompt
                .contains(&format!("=== WINDOW {i} ===\n[Page {i}] Rule: r{i}\n")));
        }
        assert!(req.user_prompt.contains("4-page document"));
    }

    #[tokio::test]
    async fn failure_is_attributed_to_consolidation() {
        let service = Arc::new(Capture {
            fail: true,
            ..Default::default()
        });
        let err = Consolidator::new(service, AnalysisConfig::default())
            .consolidate(2, &window_reports(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Pdf2RulesError::Analysis {
                stage: AnalysisStage::Consolidation,
                ..
            }
        ));
    }

    #[test]
    fn empty_input_is_rejected_without_a_call() {
        let service = Arc::new(Capture::default());
        let consolidator = Consolidator::new(service.clone(), AnalysisConfig::default());
        let result = tokio_test::block_on(consolidator.consolidate(0, &[]));
        assert!(matches!(result, Err(Pdf2RulesError::Internal(_))));
        assert!(service.requests.lock().unwrap().is_empty());
    }
}
