//! Offline integration tests for both pipeline stages.
//!
//! The extraction and analysis services are in-memory fakes, so these tests
//! need neither pdfium nor an API key. They drive the public API the way an
//! embedder would: coordinator → page document file → strategist → report
//! file.

use async_trait::async_trait;
use edgequake_llm::ImageData;
use pdf2rules::pipeline::input::read_page_document;
use pdf2rules::{
    parse_pages, save_report, AnalysisConfig, AnalysisRequest, AnalysisStage, PageExtractionCoordinator,
    ParseMode, Pdf2RulesError, ReportProvenance, RuleExtractionStrategist, ServiceError, Strategy,
    TextAnalysisService, TextExtractionService, WindowFailurePolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Transcribes page N as a short policy page; optionally fails some pages.
struct FakeVision {
    failing: Vec<usize>,
    calls: AtomicUsize,
}

impl FakeVision {
    fn new(failing: &[usize]) -> Self {
        Self {
            failing: failing.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextExtractionService for FakeVision {
    async fn extract_page(&self, page_num: usize, _image: ImageData) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Out-of-order completion.
        tokio::time::sleep(Duration::from_millis((page_num % 4) as u64 * 3)).await;
        if self.failing.contains(&page_num) {
            return Err(ServiceError::classify("HTTP 503 Service Unavailable"));
        }
        Ok(format!(
            "# Section {page_num}\n\nEmployees must follow policy {page_num}.\n\n---\n\nFootnote {page_num}."
        ))
    }
}

/// Answers every analysis request from the prompt's shape and records it.
#[derive(Default)]
struct FakeAnalyst {
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl FakeAnalyst {
    fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextAnalysisService for FakeAnalyst {
    async fn analyze(&self, request: AnalysisRequest) -> Result<String, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        let prompt = request.user_prompt;

        if let Some(rest) = prompt.split("focusing on page ").nth(1) {
            let focus = rest.split(':').next().unwrap_or("?");
            return Ok(format!("[Page {focus}] Rule: Employees must follow policy {focus}."));
        }
        if prompt.contains("=== WINDOW 1 ===") {
            return Ok("DOCUMENT SUMMARY:\nA policy manual.\n\nCONSOLIDATED RULES:\n\
                       [Page 1] Rule 1: Employees must follow policy 1.\n\
                       [Page 2-3] Rule 2: Spanning rule.\n\nNOTES:\nMerged."
                .into());
        }
        Ok("DOCUMENT SUMMARY:\nA short policy.\n\nEXTRACTED RULES:\n\
            [Page 1] Rule 1: Employees must follow policy 1.\n\n\
            CROSS-PAGE OBSERVATIONS:\nNone.\n\nNOTES:\nNone."
            .into())
    }
}

fn images(n: usize) -> Vec<ImageData> {
    (0..n).map(|i| ImageData::new(format!("page-{i}"), "image/jpeg")).collect()
}

// ── Stage 1 ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn extracted_document_round_trips_through_the_parser() {
    let vision = Arc::new(FakeVision::new(&[]));
    let extracted = PageExtractionCoordinator::new(vision.clone())
        .with_concurrency(3)
        .extract(images(7))
        .await;

    assert_eq!(vision.calls.load(Ordering::SeqCst), 7);
    assert_eq!(extracted.stats.succeeded, 7);

    let text = extracted.document.clone().with_title("manual.pdf").to_markdown();
    assert!(text.starts_with("# manual.pdf\n\n**Pages:** 7\n\n---\n\n## Page 1\n\n"));

    let index = parse_pages(&text);
    assert_eq!(index.len(), 7);
    for page in extracted.document.pages() {
        // Inner horizontal rules survive as content.
        assert_eq!(index.get(page.number), Some(page.content.as_str()));
        assert!(page.content.contains("\n---\n"));
    }
}

#[tokio::test]
async fn failed_pages_keep_their_slot() {
    let vision = Arc::new(FakeVision::new(&[2, 5]));
    let extracted = PageExtractionCoordinator::new(vision)
        .with_concurrency(5)
        .extract(images(6))
        .await;

    assert_eq!(extracted.document.page_count(), 6);
    assert_eq!(extracted.failed_pages(), vec![2, 5]);
    let page2 = &extracted.document.page(2).unwrap().content;
    assert!(page2.starts_with("[Error: service unavailable"));

    let index = parse_pages(&extracted.document.to_markdown());
    assert_eq!(index.len(), 6);
    assert_eq!(index.get(5), Some(extracted.document.page(5).unwrap().content.as_str()));
}

// ── Stage 2 ──────────────────────────────────────────────────────────────────

async fn page_document(pages: usize) -> String {
    PageExtractionCoordinator::new(Arc::new(FakeVision::new(&[])))
        .extract(images(pages))
        .await
        .document
        .with_title("manual.pdf")
        .to_markdown()
}

#[tokio::test]
async fn short_document_is_analysed_in_one_call() {
    let analyst = Arc::new(FakeAnalyst::default());
    let strategist = RuleExtractionStrategist::new(analyst.clone(), AnalysisConfig::default());
    let outcome = strategist.run(&page_document(2).await).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::SinglePass);
    assert_eq!(outcome.analysis_calls, 1);
    assert_eq!(analyst.requests().len(), 1);

    let rules = outcome.report.rules();
    assert_eq!(rules.summary.as_deref(), Some("A short policy."));
    assert_eq!(rules.rules.len(), 1);
    assert_eq!(rules.rules[0].pages.to_string(), "Page 1");
}

#[tokio::test]
async fn long_document_uses_windows_and_consolidation() {
    let analyst = Arc::new(FakeAnalyst::default());
    let config = AnalysisConfig::builder().window_concurrency(3).build().unwrap();
    let outcome = RuleExtractionStrategist::new(analyst.clone(), config)
        .run(&page_document(15).await)
        .await
        .unwrap();

    assert_eq!(outcome.strategy, Strategy::SlidingWindow);
    assert_eq!(outcome.analysis_calls, 16);
    assert_eq!(outcome.window_reports.len(), 15);
    assert_eq!(outcome.report.provenance, ReportProvenance::Consolidated { windows: 15 });

    let requests = analyst.requests();
    assert_eq!(requests.len(), 16);
    let consolidation = requests
        .iter()
        .find(|r| r.user_prompt.contains("=== WINDOW 1 ==="))
        .expect("consolidation request");
    for k in 1..=15 {
        assert!(consolidation.user_prompt.contains(&format!("=== WINDOW {k} ===")));
    }

    let window5 = requests
        .iter()
        .find(|r| r.user_prompt.contains("focusing on page 5:"))
        .expect("window 5 request");
    assert!(window5.user_prompt.starts_with("Analyzing pages 4-6, focusing on page 5:"));
    assert!(window5.user_prompt.contains("## Page 4\n\n"));
    assert!(window5.user_prompt.contains("## Page 6\n\n"));
    assert!(!window5.user_prompt.contains("## Page 7\n\n"));

    let rules = outcome.report.rules();
    assert_eq!(rules.rules.len(), 2);
    assert_eq!(rules.rules[1].pages.to_string(), "Page 2-3");
}

/// Fails one window, then behaves like [`FakeAnalyst`].
struct OneBadWindow {
    inner: FakeAnalyst,
    bad_focus: usize,
}

#[async_trait]
impl TextAnalysisService for OneBadWindow {
    async fn analyze(&self, request: AnalysisRequest) -> Result<String, ServiceError> {
        if request
            .user_prompt
            .contains(&format!("focusing on page {}:", self.bad_focus))
        {
            self.inner.requests.lock().unwrap().push(request);
            return Err(ServiceError::classify("429 Too Many Requests"));
        }
        self.inner.analyze(request).await
    }
}

#[tokio::test]
async fn window_failure_policy_is_honoured() {
    let text = page_document(12).await;

    let isolate = Arc::new(OneBadWindow {
        inner: FakeAnalyst::default(),
        bad_focus: 4,
    });
    let outcome = RuleExtractionStrategist::new(isolate.clone(), AnalysisConfig::default())
        .run(&text)
        .await
        .unwrap();
    assert_eq!(outcome.failed_windows, vec![4]);
    assert_eq!(outcome.analysis_calls, 13);
    assert_eq!(isolate.inner.requests().len(), 13);

    let fail_fast = Arc::new(OneBadWindow {
        inner: FakeAnalyst::default(),
        bad_focus: 4,
    });
    let config = AnalysisConfig::builder()
        .window_failure_policy(WindowFailurePolicy::FailFast)
        .build()
        .unwrap();
    let err = RuleExtractionStrategist::new(fail_fast, config)
        .run(&text)
        .await
        .unwrap_err();
    match err {
        Pdf2RulesError::Analysis { stage, source } => {
            assert_eq!(stage, AnalysisStage::Window { focus_page: 4 });
            assert!(matches!(source, ServiceError::RateLimited(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn strict_mode_rejects_duplicate_pages() {
    let text = "## Page 1\n\na\n\n---\n\n## Page 1\n\nb\n\n---\n";
    let config = AnalysisConfig::builder().parse_mode(ParseMode::Strict).build().unwrap();
    let analyst = Arc::new(FakeAnalyst::default());
    let err = RuleExtractionStrategist::new(analyst.clone(), config)
        .run(text)
        .await
        .unwrap_err();

    assert!(matches!(err, Pdf2RulesError::MalformedDocument(_)));
    assert!(analyst.requests().is_empty());
}

// ── Files ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn page_document_and_report_files() {
    let dir = tempfile::tempdir().unwrap();
    let pages_path = dir.path().join("out").join("extracted_content.md");
    let rules_path = dir.path().join("out").join("extracted_rules.txt");

    let text = page_document(3).await;
    pdf2rules::pipeline::input::write_atomic(&pages_path, &text)
        .await
        .unwrap();

    let loaded = read_page_document(&pages_path).await.unwrap();
    assert_eq!(loaded, text);

    let analyst = Arc::new(FakeAnalyst::default());
    let outcome = RuleExtractionStrategist::new(analyst, AnalysisConfig::default())
        .run(&loaded)
        .await
        .unwrap();
    save_report(&pages_path, &rules_path, &outcome).await.unwrap();

    let report = std::fs::read_to_string(&rules_path).unwrap();
    let banner = "=".repeat(70);
    let expected_head = format!(
        "{banner}\nRULE EXTRACTION RESULTS\nSource Markdown: {}\nTotal Pages: 3\n{banner}\n\n",
        pages_path.display()
    );
    assert!(report.starts_with(&expected_head));
    assert!(report.ends_with(&outcome.report.text));

    // No temp files left behind.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("out"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn missing_page_document_is_reported_before_any_call() {
    let err = tokio_test::block_on(read_page_document("/definitely/not/here.md")).unwrap_err();
    assert!(matches!(err, Pdf2RulesError::FileNotFound { .. }));
}
