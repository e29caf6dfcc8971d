//! Stage 1: bounded-concurrency page extraction with ordered reassembly.
//!
//! Every page image becomes one call to the injected
//! [`TextExtractionService`]. At most `concurrency` calls are in flight
//! (`buffer_unordered`), results land in a `BTreeMap` keyed by page number as
//! they complete, and the document is assembled 1..N from that map. A page
//! that fails, times out or could not be encoded carries a failure marker
//! instead of content; the run itself never fails.

use crate::config::ExtractionConfig;
use crate::document::PageDocument;
use crate::error::PageError;
use crate::pipeline::postprocess::clean_transcription;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::service::TextExtractionService;
use edgequake_llm::ImageData;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default number of extraction calls in flight.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Aggregate statistics for one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// The assembled page document plus what went wrong along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub document: PageDocument,
    pub stats: ExtractionStats,
    /// One entry per failed page, in page order.
    pub errors: Vec<PageError>,
}

impl ExtractedDocument {
    /// Page numbers whose content is a failure marker.
    pub fn failed_pages(&self) -> Vec<usize> {
        self.errors.iter().map(PageError::page).collect()
    }
}

/// Fans page images out to the extraction service and reassembles the result.
pub struct PageExtractionCoordinator {
    service: Arc<dyn TextExtractionService>,
    concurrency: usize,
    timeout: Duration,
    progress: ProgressCallback,
}

impl PageExtractionCoordinator {
    pub fn new(service: Arc<dyn TextExtractionService>) -> Self {
        Self {
            service,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(60),
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Take concurrency, timeout and callback from a stage-1 config.
    pub fn from_config(service: Arc<dyn TextExtractionService>, config: &ExtractionConfig) -> Self {
        let mut coordinator = Self::new(service)
            .with_concurrency(config.concurrency)
            .with_timeout(Duration::from_secs(config.api_timeout_secs));
        if let Some(cb) = &config.progress_callback {
            coordinator = coordinator.with_progress(Arc::clone(cb));
        }
        coordinator
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Transcribe `images` (page 1 first) into a complete page document.
    ///
    /// The returned document always has exactly `images.len()` pages.
    pub async fn extract(&self, images: Vec<ImageData>) -> ExtractedDocument {
        self.extract_prepared(images.into_iter().map(Ok).collect()).await
    }

    /// Like [`extract`](Self::extract), but pages that could not be prepared
    /// arrive as errors. They keep their slot as a failure marker and are
    /// never sent to the service.
    pub async fn extract_prepared(&self, images: Vec<Result<ImageData, PageError>>) -> ExtractedDocument {
        let start = Instant::now();
        let total = images.len();
        if total == 0 {
            return ExtractedDocument {
                document: PageDocument::default(),
                stats: ExtractionStats::default(),
                errors: Vec::new(),
            };
        }

        let workers = self.concurrency.clamp(1, total);
        info!("Extracting {} pages with {} concurrent calls", total, workers);
        self.progress.on_extraction_start(total);

        let mut results: BTreeMap<usize, Result<String, PageError>> =
            stream::iter(images.into_iter().enumerate())
                .map(|(idx, image)| async move {
                    let page = idx + 1;
                    (page, self.extract_one(page, total, image).await)
                })
                .buffer_unordered(workers)
                .collect()
                .await;

        let mut contents = Vec::with_capacity(total);
        let mut errors = Vec::new();
        for page in 1..=total {
            let outcome = results
                .remove(&page)
                .unwrap_or(Err(PageError::Missing { page }));
            match outcome {
                Ok(text) => contents.push(text),
                Err(e) => {
                    contents.push(e.marker());
                    errors.push(e);
                }
            }
        }

        let failed = errors.len();
        let succeeded = total - failed;
        self.progress.on_extraction_complete(total, succeeded);

        let stats = ExtractionStats {
            total_pages: total,
            succeeded,
            failed,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Extraction finished: {}/{} pages in {}ms",
            succeeded, total, stats.duration_ms
        );

        ExtractedDocument {
            document: PageDocument::from_contents(contents),
            stats,
            errors,
        }
    }

    async fn extract_one(
        &self,
        page: usize,
        total: usize,
        image: Result<ImageData, PageError>,
    ) -> Result<String, PageError> {
        let outcome = match image {
            Ok(image) => self.call_service(page, image).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(text) => self.progress.on_page_complete(page, total, text.len()),
            Err(e) => {
                warn!("{}", e);
                self.progress.on_page_error(page, total, &e.to_string());
            }
        }
        outcome
    }

    async fn call_service(&self, page: usize, image: ImageData) -> Result<String, PageError> {
        let call = self.service.extract_page(page, image);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => Ok(clean_transcription(&text)),
            Ok(Err(e)) => Err(PageError::ExtractionFailed {
                page,
                detail: e.to_string(),
            }),
            Err(_) => Err(PageError::Timeout {
                page,
                ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}
