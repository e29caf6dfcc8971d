//! CLI binary for pdf2rules.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` / `AnalysisConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2rules::{
    extract_pages_to_file, extract_rules_from_file, plan_analysis, run_pipeline, AnalysisConfig,
    ExtractedDocument, ExtractionConfig, ExtractionOutcome, ExtractionProgressCallback, ParseMode,
    ProgressCallback, Strategy, WindowFailurePolicy,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar for both stages. Page events arrive out of order in
/// concurrent mode, so the bar only counts completions.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize, prefix: &'static str, unit: &str) {
        let template = format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  ⏱ {{elapsed_precise}}"
        );
        let style = ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS);

        self.bar.set_position(0);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix(prefix);
        self.bar.reset_eta();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages, "Extracting", "pages");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting text from {total_pages} pages…"))
        ));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{text_len:>5} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            self.bar.println(format!(
                "{} {} pages extracted",
                green("✔"),
                bold(&success_count.to_string())
            ));
        } else {
            self.bar.println(format!(
                "{} {}/{} pages extracted  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            ));
        }
    }

    fn on_analysis_start(&self, page_count: usize, window_count: usize) {
        if window_count == 0 {
            self.bar.set_prefix("Analysing");
            self.bar.set_message(format!("{page_count} pages in a single pass…"));
        } else {
            self.activate_bar(window_count, "Windows", "windows");
            self.bar.println(format!(
                "{} {}",
                cyan("◆"),
                bold(&format!("Analysing {page_count} pages in {window_count} windows…"))
            ));
        }
    }

    fn on_window_complete(&self, focus_page: usize, window_count: usize, ok: bool) {
        let mark = if ok { green("✓") } else { red("✗") };
        self.bar
            .println(format!("  {} Window {:>3}/{:<3}", mark, focus_page, window_count));
        self.bar.inc(1);
    }

    fn on_consolidation_start(&self, window_count: usize) {
        self.bar.set_prefix("Consolidating");
        self.bar.set_message(format!("merging {window_count} window reports…"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Stage 1: PDF → page document
  pdf2rules pages handbook.pdf -o extracted_content.md

  # Stage 2: page document → rules (strategy chosen by page count)
  pdf2rules rules extracted_content.md -o extracted_rules.txt

  # Force the sliding-window strategy with 4 concurrent windows
  pdf2rules --window-concurrency 4 rules extracted_content.md --strategy window

  # Both stages
  pdf2rules run handbook.pdf

  # Show page count and chosen strategy (no API key needed)
  pdf2rules inspect extracted_content.md

STRATEGIES:
  single   One call over the whole document (default for ≤ 10 pages)
  window   One call per page with its neighbours, then one consolidation call
           (default for > 10 pages; documents of ≤ 3 pages always use single)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium — skips auto-download
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

/// Extract page-attributed rules from PDF documents using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2rules",
    version,
    about = "Extract page-attributed rules from PDF documents using LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a PDF and transcribe every page into a page document.
    Pages {
        /// Local PDF file.
        input: PathBuf,

        /// Page document output path.
        #[arg(short, long, env = "PDF2RULES_PAGES_OUTPUT", default_value = "extracted_content.md")]
        output: PathBuf,
    },

    /// Extract rules from a page document.
    Rules {
        /// Page document produced by `pages`.
        input: PathBuf,

        /// Report output path.
        #[arg(short, long, env = "PDF2RULES_RULES_OUTPUT", default_value = "extracted_rules.txt")]
        output: PathBuf,

        #[arg(long, env = "PDF2RULES_STRATEGY", value_enum, default_value = "auto")]
        strategy: StrategyArg,
    },

    /// Run both stages: PDF → page document → rules.
    Run {
        /// Local PDF file.
        input: PathBuf,

        /// Page document output path.
        #[arg(long, env = "PDF2RULES_PAGES_OUTPUT", default_value = "extracted_content.md")]
        pages_output: PathBuf,

        /// Report output path.
        #[arg(short, long, env = "PDF2RULES_RULES_OUTPUT", default_value = "extracted_rules.txt")]
        output: PathBuf,

        #[arg(long, env = "PDF2RULES_STRATEGY", value_enum, default_value = "auto")]
        strategy: StrategyArg,
    },

    /// Parse a page document and show the analysis plan.
    Inspect {
        /// Page document produced by `pages`.
        input: PathBuf,

        #[arg(long, env = "PDF2RULES_STRATEGY", value_enum, default_value = "auto")]
        strategy: StrategyArg,
    },
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// LLM model ID (default: gpt-4o).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, global = true, env = "PDF2RULES_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Concurrent page extraction calls.
    #[arg(short, long, global = true, env = "PDF2RULES_WORKERS", default_value_t = 5)]
    workers: usize,

    /// Concurrent sliding-window calls.
    #[arg(long, global = true, env = "PDF2RULES_WINDOW_CONCURRENCY", default_value_t = 1)]
    window_concurrency: usize,

    /// Abort on the first failed window instead of isolating it.
    #[arg(long, global = true, env = "PDF2RULES_FAIL_FAST")]
    fail_fast: bool,

    /// Retries for transient analysis errors (rate limit, timeout, 5xx).
    #[arg(long, global = true, env = "PDF2RULES_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, global = true, env = "PDF2RULES_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Reject page documents with missing, duplicate or out-of-order pages.
    #[arg(long, global = true, env = "PDF2RULES_STRICT")]
    strict: bool,

    /// Path to an existing pdfium shared library.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "PDF2RULES_PASSWORD")]
    password: Option<String>,

    /// Print structured JSON instead of the report text.
    #[arg(long, global = true, env = "PDF2RULES_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "PDF2RULES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2RULES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2RULES_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Auto,
    Single,
    Window,
}

impl StrategyArg {
    fn requested(self) -> Option<Strategy> {
        match self {
            StrategyArg::Auto => None,
            StrategyArg::Single => Some(Strategy::SinglePass),
            StrategyArg::Window => Some(Strategy::SlidingWindow),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let inspecting = matches!(cli.command, Command::Inspect { .. });
    let show_progress = !g.quiet && !g.no_progress && !g.json && !inspecting;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn ExtractionProgressCallback>);

    match &cli.command {
        Command::Pages { input, output } => {
            ensure_pdfium(g)?;
            let config = extraction_config(g, progress)?;
            let pages = extract_pages_to_file(input, output, &config)
                .await
                .context("Page extraction failed")?;
            if g.json {
                print_json(&pages)?;
            } else if !g.quiet {
                print_pages_summary(&pages, output);
            }
        }

        Command::Rules {
            input,
            output,
            strategy,
        } => {
            let config = analysis_config(g, strategy.requested(), progress)?;
            let outcome = extract_rules_from_file(input, output, &config)
                .await
                .context("Rule extraction failed")?;
            print_outcome(g, &outcome, output)?;
        }

        Command::Run {
            input,
            pages_output,
            output,
            strategy,
        } => {
            ensure_pdfium(g)?;
            let extraction = extraction_config(g, progress.clone())?;
            let analysis = analysis_config(g, strategy.requested(), progress)?;
            let result = run_pipeline(input, pages_output, output, &extraction, &analysis)
                .await
                .context("Pipeline failed")?;
            if g.json {
                print_json(&result)?;
            } else {
                if !g.quiet {
                    print_pages_summary(&result.pages, pages_output);
                }
                print_outcome(g, &result.rules, output)?;
            }
        }

        Command::Inspect { input, strategy } => {
            let config = analysis_config(g, strategy.requested(), None)?;
            let text = tokio::fs::read_to_string(input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let plan = plan_analysis(&text, &config).context("Failed to parse page document")?;
            if g.json {
                print_json(&plan)?;
            } else {
                println!("File:            {}", input.display());
                println!("Pages:           {}", plan.page_count);
                println!("Strategy:        {}", plan.strategy);
                println!("Windows:         {}", plan.window_count);
                println!("Analysis calls:  {}", plan.analysis_calls);
            }
        }
    }

    if let Some(cb) = cli_progress {
        cb.bar.finish_and_clear();
    }
    Ok(())
}

/// Make sure a pdfium library is available, downloading it on first run.
fn ensure_pdfium(g: &GlobalArgs) -> Result<()> {
    if g.pdfium_lib.is_some() || pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if g.quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn extraction_config(g: &GlobalArgs, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder().dpi(g.dpi).concurrency(g.workers);
    if let Some(secs) = g.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(model) = &g.model {
        builder = builder.model(model.as_str());
    }
    if let Some(provider) = &g.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(password) = &g.password {
        builder = builder.password(password.as_str());
    }
    if let Some(lib) = &g.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// Map CLI args to `AnalysisConfig`.
fn analysis_config(
    g: &GlobalArgs,
    strategy: Option<Strategy>,
    progress: Option<ProgressCallback>,
) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .window_concurrency(g.window_concurrency)
        .max_retries(g.max_retries)
        .parse_mode(if g.strict { ParseMode::Strict } else { ParseMode::BestEffort })
        .window_failure_policy(if g.fail_fast {
            WindowFailurePolicy::FailFast
        } else {
            WindowFailurePolicy::Isolate
        });
    if let Some(strategy) = strategy {
        builder = builder.strategy(strategy);
    }
    if let Some(secs) = g.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(model) = &g.model {
        builder = builder.model(model.as_str());
    }
    if let Some(provider) = &g.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

fn print_pages_summary(pages: &ExtractedDocument, output: &std::path::Path) {
    eprintln!(
        "{}  {}/{} pages  {}ms  →  {}",
        if pages.stats.failed == 0 { green("✔") } else { cyan("⚠") },
        pages.stats.succeeded,
        pages.stats.total_pages,
        pages.stats.duration_ms,
        bold(&output.display().to_string()),
    );
    if !pages.errors.is_empty() {
        eprintln!("   failed pages: {}", dim(&format!("{:?}", pages.failed_pages())));
    }
}

fn print_outcome(g: &GlobalArgs, outcome: &ExtractionOutcome, output: &std::path::Path) -> Result<()> {
    if g.json {
        return print_json(outcome);
    }
    if g.quiet {
        return Ok(());
    }

    println!("{}", outcome.report.text);
    eprintln!(
        "{}  {} pages  {}  {} calls  →  {}",
        if outcome.failed_windows.is_empty() { green("✔") } else { cyan("⚠") },
        outcome.page_count,
        outcome.strategy,
        outcome.analysis_calls,
        bold(&output.display().to_string()),
    );
    if !outcome.failed_windows.is_empty() {
        eprintln!(
            "   failed windows: {}",
            red(&format!("{:?}", outcome.failed_windows))
        );
    }
    Ok(())
}
