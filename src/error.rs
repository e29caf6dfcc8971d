//! Error types for the pdf2rules library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`Pdf2RulesError`] — **Fatal**: the run cannot proceed (missing input,
//!   corrupt PDF, provider not configured, every analysis window failed).
//!   Returned as `Err(Pdf2RulesError)` from the top-level entry points.
//!
//! * [`PageError`] — **Non-fatal**: a single page transcription failed. It is
//!   embedded in the page document as a failure marker and the run continues.
//!
//! * [`ServiceError`] — a classified failure from an external service call.
//!   Transient kinds may be retried by the analysis adapter; fatal kinds never
//!   are.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

use crate::parser::ParseError;

/// All fatal errors returned by the pdf2rules library.
#[derive(Debug, Error)]
pub enum Pdf2RulesError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The page document could not be read as UTF-8 text.
    #[error("Failed to read page document '{path}': {source}")]
    DocumentReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The page document violates the page grammar (strict parsing only).
    #[error("Malformed page document: {0}")]
    MalformedDocument(#[from] ParseError),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The PDF opened but contains no pages.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, set PDFIUM_LIB_PATH=/path/to/libpdfium\n\
or pass --pdfium-lib <PATH> to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// An analysis call failed and the failure was not isolated.
    #[error("Rule analysis failed during {stage}: {source}")]
    Analysis {
        stage: AnalysisStage,
        #[source]
        source: ServiceError,
    },

    /// Every sliding-window call failed; there is nothing to consolidate.
    #[error("All {total} analysis windows failed.\nFirst error: {first_error}")]
    AllWindowsFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which analysis call an [`Pdf2RulesError::Analysis`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    SinglePass,
    Window { focus_page: usize },
    Consolidation,
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStage::SinglePass => write!(f, "single-pass extraction"),
            AnalysisStage::Window { focus_page } => write!(f, "window {focus_page}"),
            AnalysisStage::Consolidation => write!(f, "consolidation"),
        }
    }
}

/// A non-fatal error for a single page.
///
/// Rendered into the page document as a failure marker via
/// [`PageError::marker`]; the surrounding pages are unaffected.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The extraction service returned an error.
    #[error("Page {page}: extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// The extraction call exceeded the per-call timeout.
    #[error("Page {page}: extraction timed out after {}", format_elapsed(.ms))]
    Timeout { page: usize, ms: u64 },

    /// The rendered page could not be encoded for the extraction service.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodingFailed { page: usize, detail: String },

    /// No result was recorded for the page.
    #[error("Page {page}: missing result")]
    Missing { page: usize },
}

impl PageError {
    pub fn page(&self) -> usize {
        match self {
            PageError::ExtractionFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::EncodingFailed { page, .. }
            | PageError::Missing { page } => *page,
        }
    }

    /// The inline placeholder substituted for the page's content.
    pub fn marker(&self) -> String {
        match self {
            PageError::ExtractionFailed { detail, .. } => format!("[Error: {detail}]"),
            PageError::Timeout { ms, .. } => format!("[Error: timed out after {}]", format_elapsed(ms)),
            PageError::EncodingFailed { detail, .. } => format!("[Error: image encoding failed: {detail}]"),
            PageError::Missing { .. } => "[Missing]".to_string(),
        }
    }
}

/// `30s` for whole seconds, `250ms` otherwise.
fn format_elapsed(ms: &u64) -> String {
    if *ms >= 1000 && ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

/// A classified failure from an external extraction/analysis call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// HTTP 429 or equivalent.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The call did not complete within the per-call timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// 5xx, connection reset, overloaded backend.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// 401/403, missing or invalid API key.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request itself was refused (bad request, content filter, unknown model).
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ServiceError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::RateLimited(_) | ServiceError::Timeout { .. } | ServiceError::Unavailable(_)
        )
    }

    /// Classify a provider's free-form error message.
    ///
    /// Provider crates surface HTTP failures as text; the status code or a
    /// well-known phrase is the only stable signal across providers. Status
    /// codes only count as whole numbers, so token counts such as `15000`
    /// never look like a 500.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();

        if RE_RATE_LIMITED.is_match(&message) {
            ServiceError::RateLimited(message)
        } else if RE_AUTH.is_match(&message) {
            ServiceError::Auth(message)
        } else if RE_UNAVAILABLE.is_match(&message) {
            ServiceError::Unavailable(message)
        } else {
            ServiceError::Rejected(message)
        }
    }
}

static RE_RATE_LIMITED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b429\b|rate[ _-]?limit|too many requests").unwrap());

static RE_AUTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b40[13]\b|unauthori[sz]ed|forbidden|api[ _-]?key|authentication").unwrap()
});

static RE_UNAVAILABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b5\d\d\b|overloaded|unavailable|connection|network|timed out|timeout").unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_error_marker_embeds_cause() {
        let e = PageError::ExtractionFailed {
            page: 4,
            detail: "connection reset".into(),
        };
        assert_eq!(e.marker(), "[Error: connection reset]");
        assert!(e.to_string().contains("Page 4"));
    }

    #[test]
    fn timeout_marker() {
        let e = PageError::Timeout { page: 2, ms: 30_000 };
        assert_eq!(e.marker(), "[Error: timed out after 30s]");

        let e = PageError::Timeout { page: 2, ms: 250 };
        assert_eq!(e.marker(), "[Error: timed out after 250ms]");
        assert!(e.to_string().ends_with("timed out after 250ms"));
    }

    #[test]
    fn classify_rate_limit() {
        let e = ServiceError::classify("HTTP 429 Too Many Requests");
        assert!(matches!(e, ServiceError::RateLimited(_)));
        assert!(e.is_retryable());
    }

    #[test]
    fn classify_auth_is_fatal() {
        let e = ServiceError::classify("401 Unauthorized: Incorrect API key provided");
        assert!(matches!(e, ServiceError::Auth(_)));
        assert!(!e.is_retryable());
    }

    #[test]
    fn classify_server_error_is_transient() {
        let e = ServiceError::classify("upstream returned 503 Service Unavailable");
        assert!(e.is_retryable());
    }

    #[test]
    fn classify_unknown_is_rejected() {
        let e = ServiceError::classify("model `gpt-9` does not exist");
        assert!(matches!(e, ServiceError::Rejected(_)));
        assert!(!e.is_retryable());
    }

    #[test]
    fn token_counts_are_not_status_codes() {
        let e = ServiceError::classify("Invalid request: max_tokens is too large: 15000. This model supports at most 4096");
        assert!(matches!(e, ServiceError::Rejected(_)), "got: {e:?}");
        assert!(!e.is_retryable());

        let e = ServiceError::classify("This model's maximum context length is 8192, but the prompt is 24010 tokens");
        assert!(matches!(e, ServiceError::Rejected(_)), "got: {e:?}");

        let e = ServiceError::classify("request of 14290 tokens exceeds the limit");
        assert!(matches!(e, ServiceError::Rejected(_)), "got: {e:?}");
    }

    #[test]
    fn status_codes_match_as_whole_numbers() {
        assert!(matches!(ServiceError::classify("status 502: bad gateway"), ServiceError::Unavailable(_)));
        assert!(matches!(ServiceError::classify("HTTP 403"), ServiceError::Auth(_)));
        assert!(matches!(ServiceError::classify("error 429"), ServiceError::RateLimited(_)));
    }

    #[test]
    fn analysis_error_display_names_stage() {
        let e = Pdf2RulesError::Analysis {
            stage: AnalysisStage::Window { focus_page: 7 },
            source: ServiceError::Timeout { secs: 60 },
        };
        let msg = e.to_string();
        assert!(msg.contains("window 7"), "got: {msg}");
        assert!(msg.contains("60s"), "got: {msg}");
    }

    #[test]
    fn all_windows_failed_display() {
        let e = Pdf2RulesError::AllWindowsFailed {
            total: 12,
            first_error: "rate limited".into(),
        };
        assert!(e.to_string().contains("12"));
    }
}
