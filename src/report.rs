//! Rule reports: the opaque analysis output, its provenance, and a typed
//! best-effort view of it.
//!
//! The analysis service answers in free text. The pipeline forwards that text
//! verbatim ([`ExtractionReport`]); callers that want structure ask for a
//! [`RuleReport`], which recognises the section headings the prompts request
//! and the `[Page X]` / `[Page X-Y]` tags on rule lines. Parsing never fails:
//! anything unrecognised is still available in [`RuleReport::raw`].

use crate::prompts::{
    SECTION_CONSOLIDATED_RULES, SECTION_CROSS_PAGE, SECTION_NOTES, SECTION_RULES, SECTION_SUMMARY,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of the `=` banner in the report file.
const BANNER_WIDTH: usize = 70;

/// Where a report's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportProvenance {
    /// One call over the whole document.
    FullDocument,
    /// One sliding window.
    Window {
        focus_page: usize,
        start_page: usize,
        end_page: usize,
    },
    /// The merge of `windows` window reports.
    Consolidated { windows: usize },
}

/// Analysis output plus provenance. The text is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub text: String,
    pub provenance: ReportProvenance,
}

impl ExtractionReport {
    pub fn new(text: impl Into<String>, provenance: ReportProvenance) -> Self {
        Self {
            text: text.into(),
            provenance,
        }
    }

    /// Parse the text into a [`RuleReport`].
    pub fn rules(&self) -> RuleReport {
        RuleReport::parse(&self.text)
    }
}

/// An inclusive, 1-based page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    /// Build a range, swapping the bounds if they arrive reversed.
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn single(page: usize) -> Self {
        Self { start: page, end: page }
    }

    pub fn contains(&self, page: usize) -> bool {
        (self.start..=self.end).contains(&page)
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "Page {}", self.start)
        } else {
            write!(f, "Page {}-{}", self.start, self.end)
        }
    }
}

/// One page-tagged rule line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub pages: PageRange,
    pub text: String,
    /// The model flagged the rule as continuing beyond its window.
    pub incomplete: bool,
}

/// Typed view of a rule report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleReport {
    pub summary: Option<String>,
    pub rules: Vec<RuleEntry>,
    pub cross_page: Option<String>,
    pub notes: Option<String>,
    /// The report text exactly as received.
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Summary,
    Rules,
    CrossPage,
    Notes,
}

static RE_RULE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[-*•]\s*)?\[Pages?\s+(\d+)(?:\s*[-–]\s*(\d+))?\]\s*(.*)$").unwrap()
});

static RE_RULE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)rule(?:\s+\d+)?\s*:\s*").unwrap());

static RE_INCOMPLETE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)incomplete\s*:?\s*").unwrap());

impl RuleReport {
    /// Best-effort parse of a report's text.
    pub fn parse(text: &str) -> Self {
        let mut report = RuleReport {
            raw: text.to_string(),
            ..Default::default()
        };
        let mut section = Section::Preamble;
        let mut summary = Vec::new();
        let mut cross_page = Vec::new();
        let mut notes = Vec::new();

        for line in text.lines() {
            let trimmed = line.trim();

            if let Some((next, rest)) = section_heading(trimmed) {
                section = next;
                if !rest.is_empty() {
                    push_section_line(section, rest, &mut summary, &mut cross_page, &mut notes);
                }
                continue;
            }

            if let Some(entry) = parse_rule_line(trimmed) {
                report.rules.push(entry);
                continue;
            }

            if trimmed.is_empty() {
                push_section_line(section, "", &mut summary, &mut cross_page, &mut notes);
                continue;
            }

            match section {
                // Wrapped rule text continues the previous entry.
                Section::Rules => {
                    if let Some(last) = report.rules.last_mut() {
                        last.text.push(' ');
                        last.text.push_str(trimmed);
                    }
                }
                _ => push_section_line(section, trimmed, &mut summary, &mut cross_page, &mut notes),
            }
        }

        report.summary = join_section(summary);
        report.cross_page = join_section(cross_page);
        report.notes = join_section(notes);
        report
    }

    /// Rules flagged as continuing beyond their window.
    pub fn incomplete_rules(&self) -> impl Iterator<Item = &RuleEntry> {
        self.rules.iter().filter(|r| r.incomplete)
    }

    /// Rules whose page range covers `page`.
    pub fn rules_for_page(&self, page: usize) -> impl Iterator<Item = &RuleEntry> {
        self.rules.iter().filter(move |r| r.pages.contains(page))
    }
}

/// Recognise a section heading, tolerating Markdown emphasis and `#` prefixes.
/// Returns the section plus any text that follows the heading on the same line.
fn section_heading(line: &str) -> Option<(Section, &str)> {
    let stripped = line.trim_start_matches(['#', '*', ' ']);
    let headings = [
        (SECTION_SUMMARY, Section::Summary),
        (SECTION_CONSOLIDATED_RULES, Section::Rules),
        (SECTION_RULES, Section::Rules),
        (SECTION_CROSS_PAGE, Section::CrossPage),
        (SECTION_NOTES, Section::Notes),
    ];
    headings.iter().find_map(|(heading, section)| {
        stripped
            .strip_prefix(heading)
            .map(|rest| (*section, rest.trim_start_matches('*').trim()))
    })
}

fn parse_rule_line(line: &str) -> Option<RuleEntry> {
    let caps = RE_RULE_LINE.captures(line)?;
    let start: usize = caps[1].parse().ok()?;
    let end: usize = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => start,
    };
    let body = caps.get(3).map_or("", |m| m.as_str()).trim();

    let (incomplete, text) = match RE_INCOMPLETE.find(body) {
        Some(m) => (true, &body[m.end()..]),
        None => {
            let label_end = RE_RULE_LABEL.find(body).map_or(0, |m| m.end());
            (false, &body[label_end..])
        }
    };

    Some(RuleEntry {
        pages: PageRange::new(start, end),
        text: text.trim().to_string(),
        incomplete,
    })
}

fn push_section_line(
    section: Section,
    line: &str,
    summary: &mut Vec<String>,
    cross_page: &mut Vec<String>,
    notes: &mut Vec<String>,
) {
    let target = match section {
        Section::Summary => summary,
        Section::CrossPage => cross_page,
        Section::Notes => notes,
        Section::Preamble | Section::Rules => return,
    };
    target.push(line.to_string());
}

fn join_section(lines: Vec<String>) -> Option<String> {
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Render the report file: a banner block naming the source, then the body.
pub fn format_report_file(source: &str, total_pages: usize, body: &str) -> String {
    let banner = "=".repeat(BANNER_WIDTH);
    format!(
        "{banner}\nRULE EXTRACTION RESULTS\nSource Markdown: {source}\nTotal Pages: {total_pages}\n{banner}\n\n{body}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_PASS: &str = "\
DOCUMENT SUMMARY:
A handbook for lab safety.

EXTRACTED RULES:
[Page 1] Rule 1: Wear goggles at all times.
[Page 2-3] Rule 2: Dispose of solvents in the
marked container only.

CROSS-PAGE OBSERVATIONS:
Rule 2 starts on page 2 and ends on page 3.

NOTES:
None.";

    #[test]
    fn parses_single_pass_sections() {
        let report = RuleReport::parse(SINGLE_PASS);
        assert_eq!(report.summary.as_deref(), Some("A handbook for lab safety."));
        assert_eq!(report.rules.len(), 2);
        assert_eq!(report.rules[0].pages, PageRange::single(1));
        assert_eq!(report.rules[0].text, "Wear goggles at all times.");
        assert_eq!(report.rules[1].pages, PageRange::new(2, 3));
        assert_eq!(
            report.rules[1].text,
            "Dispose of solvents in the marked container only."
        );
        assert_eq!(
            report.cross_page.as_deref(),
            Some("Rule 2 starts on page 2 and ends on page 3.")
        );
        assert_eq!(report.notes.as_deref(), Some("None."));
        assert_eq!(report.raw, SINGLE_PASS);
    }

    #[test]
    fn recognises_incomplete_window_rules() {
        let text = "[Page 4] Rule: Badges must be worn.\n[Page 5] INCOMPLETE: visitor policy continues on page 6";
        let report = RuleReport::parse(text);
        assert_eq!(report.rules.len(), 2);
        assert!(!report.rules[0].incomplete);
        assert!(report.rules[1].incomplete);
        assert_eq!(report.rules[1].text, "visitor policy continues on page 6");
        assert_eq!(report.incomplete_rules().count(), 1);
    }

    #[test]
    fn consolidated_heading_and_markdown_emphasis() {
        let text = "**DOCUMENT SUMMARY:** Short.\n\n## CONSOLIDATED RULES:\n- [Page 7-9] Rule 3: Spanning rule";
        let report = RuleReport::parse(text);
        assert_eq!(report.summary.as_deref(), Some("Short."));
        assert_eq!(report.rules.len(), 1);
        assert_eq!(report.rules[0].pages.to_string(), "Page 7-9");
        assert_eq!(report.rules_for_page(8).count(), 1);
        assert_eq!(report.rules_for_page(10).count(), 0);
    }

    #[test]
    fn reversed_range_is_normalised() {
        assert_eq!(PageRange::new(5, 2), PageRange { start: 2, end: 5 });
        assert_eq!(PageRange::single(3).to_string(), "Page 3");
    }

    #[test]
    fn unstructured_text_is_kept_raw() {
        let report = RuleReport::parse("The model said something else entirely.");
        assert!(report.rules.is_empty());
        assert!(report.summary.is_none());
        assert_eq!(report.raw, "The model said something else entirely.");
    }

    #[test]
    fn report_file_layout() {
        let out = format_report_file("doc.md", 12, "BODY");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "=".repeat(70));
        assert_eq!(lines[1], "RULE EXTRACTION RESULTS");
        assert_eq!(lines[2], "Source Markdown: doc.md");
        assert_eq!(lines[3], "Total Pages: 12");
        assert_eq!(lines[4], "=".repeat(70));
        assert_eq!(lines[5], "");
        assert_eq!(lines[6], "BODY");
    }

    #[test]
    fn provenance_serialises_with_kind_tag() {
        let json = serde_json::to_string(&ReportProvenance::Consolidated { windows: 15 }).unwrap();
        assert_eq!(json, r#"{"kind":"consolidated","windows":15}"#);
    }
}
