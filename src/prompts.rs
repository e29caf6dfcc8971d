//! Prompts for page transcription and rule analysis.
//!
//! Every instruction sent to an external service lives here so that a prompt
//! change touches exactly one file, and so tests can assert on the report
//! structure the services are asked to produce.
//!
//! The section headers (`DOCUMENT SUMMARY:`, `EXTRACTED RULES:`, …) are the
//! external contract of a report; [`crate::report::RuleReport::parse`] reads
//! them back.

/// Section header: short overview of the document.
pub const SECTION_SUMMARY: &str = "DOCUMENT SUMMARY:";
/// Section header: page-tagged rules from a single pass.
pub const SECTION_RULES: &str = "EXTRACTED RULES:";
/// Section header: page-tagged rules after consolidation.
pub const SECTION_CONSOLIDATED_RULES: &str = "CONSOLIDATED RULES:";
/// Section header: rules observed to continue across pages.
pub const SECTION_CROSS_PAGE: &str = "CROSS-PAGE OBSERVATIONS:";
/// Section header: free-form notes.
pub const SECTION_NOTES: &str = "NOTES:";

/// System prompt for transcribing one page image.
///
/// Used when `ExtractionConfig::system_prompt` is `None`.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an expert document transcriber. Extract all text from the page image in Markdown format.

- Preserve ALL text content, in reading order
- Keep headings, numbered and bulleted lists, and tables as Markdown
- Be concise but complete: do not summarise, paraphrase or omit clauses
- Output ONLY the page content, with no commentary and no ```markdown fences"#;

/// User text accompanying the page image.
pub const EXTRACTION_USER_PROMPT: &str = "Extract content:";

/// System prompt for single-pass rule extraction over a whole document.
pub const SINGLE_PASS_SYSTEM_PROMPT: &str = r#"You are an expert document analyst specializing in extracting rules, guidelines, and constraints.

Your task:
1. Analyze the complete markdown document provided
2. Identify ALL rules, guidelines, constraints, instructions, or requirements
3. Track which pages contain each rule
4. If a rule spans multiple pages, note the page range
5. Preserve the complete context of each rule

Output format:

DOCUMENT SUMMARY:
<2-4 sentence overview of the document>

EXTRACTED RULES:
[Page X] Rule 1: <complete rule description>
[Page Y-Z] Rule 2: <rule spanning pages Y to Z>
[Page Z] Rule 3: <another rule>

CROSS-PAGE OBSERVATIONS:
<Note any rules or content that continues across multiple pages>

NOTES:
<Additional context or observations>"#;

/// System prompt for one sliding window.
pub const WINDOW_SYSTEM_PROMPT: &str = r#"You are analyzing a section of a larger document.

Extract:
1. All rules, guidelines, and constraints in these pages
2. Note if any rule appears incomplete (continues from previous or to next pages)
3. Include page numbers for each rule

Format:
[Page X] Rule: <rule text>

If incomplete:
[Page X] INCOMPLETE: <description of what continues>"#;

/// User prompt for single-pass extraction.
pub fn single_pass_prompt(document: &str) -> String {
    format!("Analyze this document and extract all rules:\n\n{document}")
}

/// User prompt for one window.
pub fn window_prompt(start_page: usize, end_page: usize, focus_page: usize, content: &str) -> String {
    format!("Analyzing pages {start_page}-{end_page}, focusing on page {focus_page}:\n\n{content}")
}

/// Build the single consolidation request from labelled window reports.
///
/// `reports` must be in window order; labels are 1-based window indices.
pub fn consolidation_prompt<S: AsRef<str>>(total_pages: usize, reports: &[S]) -> String {
    let extractions: String = reports
        .iter()
        .enumerate()
        .map(|(i, r)| format!("=== WINDOW {} ===\n{}\n", i + 1, r.as_ref()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You have received rule extractions from a {total_pages}-page document, processed in overlapping windows.

Your task:
1. Merge duplicate rules (same rule extracted multiple times)
2. Combine incomplete rules split across windows
3. Remove redundancy while keeping all unique rules
4. Create a final clean list with page references

Extractions:

{extractions}

Provide consolidated output:

DOCUMENT SUMMARY:
<brief summary>

CONSOLIDATED RULES:
[Page X] Rule 1: <complete rule>
[Page Y-Z] Rule 2: <rule spanning pages>

NOTES:
<Observations about cross-page rules>"#
    )
}
