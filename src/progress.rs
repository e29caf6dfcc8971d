//! Progress-callback trait for per-page and per-window events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] or
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to observe the
//! pipeline. Events never affect the result.
//!
//! Page events may arrive concurrently and out of page order; implementations
//! must protect shared mutable state (`Mutex`, atomics).

use std::sync::Arc;

/// Called by both pipeline stages as work completes.
///
/// All methods have no-op defaults so callers override only what they need.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Stage 1 is about to dispatch `total_pages` extraction calls.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// A page transcription succeeded.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    /// A page transcription failed; the page carries a failure marker.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Stage 1 finished; every page has either content or a marker.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }

    /// Stage 2 is starting with `window_count` windows (0 for single-pass).
    fn on_analysis_start(&self, page_count: usize, window_count: usize) {
        let _ = (page_count, window_count);
    }

    /// One sliding-window call finished (successfully or not).
    fn on_window_complete(&self, focus_page: usize, window_count: usize, ok: bool) {
        let _ = (focus_page, window_count, ok);
    }

    /// The consolidation call is about to be sent.
    fn on_consolidation_start(&self, window_count: usize) {
        let _ = window_count;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in the config structs.
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
