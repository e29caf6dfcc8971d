//! Post-processing: deterministic cleanup of page transcriptions.
//!
//! Vision models occasionally wrap output in ```` ```markdown ```` fences,
//! emit CRLF line endings or zero-width characters, and now and then
//! transcribe a line that looks exactly like one of our own page headers.
//! The last case matters most: a stray `## Page 7` inside page 3 would split
//! page 3 in two when the document is parsed back. These rules run in a fixed
//! order on every successful transcription before the page document is
//! assembled.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::is_page_header_line;

/// Apply all cleanup rules to a raw transcription.
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Demote lines that collide with the page header grammar
/// 7. Trim surrounding whitespace
pub fn clean_transcription(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    let s = demote_page_headers(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Demote page-header look-alikes ───────────────────────────────────

// Uses the parser's own header grammar so nothing it would split on survives.
fn demote_page_headers(input: &str) -> String {
    input
        .split('\n')
        .map(|line| {
            if is_page_header_line(line) {
                format!("#{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_pages;

    #[test]
    fn strips_fences() {
        let raw = "```markdown\n# Title\n\nBody\n```";
        assert_eq!(clean_transcription(raw), "# Title\n\nBody");
    }

    #[test]
    fn leaves_inner_code_blocks() {
        let raw = "Intro\n\n```rust\nfn main() {}\n```\n\nOutro";
        assert_eq!(clean_transcription(raw), raw);
    }

    #[test]
    fn normalises_crlf_and_trailing_space() {
        assert_eq!(clean_transcription("a  \r\nb\t\r\n"), "a\nb");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean_transcription("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn removes_zero_width() {
        assert_eq!(clean_transcription("ab\u{200B}c\u{FEFF}"), "abc");
    }

    #[test]
    fn demotes_header_collisions() {
        let cleaned = clean_transcription("Intro\n## Page 7\nMore\n## Pages overview");
        assert_eq!(cleaned, "Intro\n### Page 7\nMore\n## Pages overview");
    }

    #[test]
    fn demoted_header_does_not_split_page() {
        let body = clean_transcription("See below\n## Page 9\nstill page one");
        let doc = crate::document::PageDocument::from_contents([body.clone(), "two".to_string()]);
        let index = parse_pages(&doc.to_markdown());
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1), Some(body.as_str()));
    }

    #[test]
    fn demotes_headers_with_unicode_spacing() {
        for raw in [
            "See below\n##\u{00A0}Page 9\nstill page one",
            "See below\n##\u{3000}Page\u{3000}9\nstill page one",
        ] {
            let body = clean_transcription(raw);
            assert!(body.contains("\n###"), "not demoted: {body:?}");

            let doc = crate::document::PageDocument::from_contents([body.clone(), "two".to_string()]);
            let index = parse_pages(&doc.to_markdown());
            assert_eq!(index.page_numbers(), vec![1, 2]);
            assert_eq!(index.get(1), Some(body.as_str()));
        }
    }
}
