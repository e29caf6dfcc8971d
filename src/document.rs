//! The page-indexed document model.
//!
//! A [`PageDocument`] is the hand-off between the two pipeline stages: stage 1
//! builds it from per-page transcriptions, stage 2 reads it back through
//! [`crate::parser`]. Its text form is deliberately simple Markdown:
//!
//! ```text
//! # report.pdf
//!
//! **Pages:** 2
//!
//! ---
//!
//! ## Page 1
//!
//! <content>
//!
//! ---
//!
//! ## Page 2
//!
//! <content>
//!
//! ---
//!
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Page header grammar. `\s` is Unicode-aware, so NBSP or ideographic spaces
/// between the tokens still form a header.
static RE_PAGE_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^##\s+Page\s+(\d+)\s*$").unwrap());

/// Prefix of a page header line; followed by the page number.
pub const PAGE_HEADER_PREFIX: &str = "## Page ";

/// The inter-page separator line.
pub const PAGE_SEPARATOR: &str = "---";

/// Render the header line for page `number`.
pub fn page_header(number: usize) -> String {
    format!("{PAGE_HEADER_PREFIX}{number}")
}

/// Whether `line` has the shape of a page header, whatever its number.
///
/// Transcription cleanup and the parser must agree on this, or a demoted
/// line could still be read back as a page boundary.
pub fn is_page_header_line(line: &str) -> bool {
    RE_PAGE_HEADER.is_match(line)
}

/// The page number of a header line; `None` for other lines, page 0 and
/// numbers that overflow.
pub fn parse_page_header(line: &str) -> Option<usize> {
    let caps = RE_PAGE_HEADER.captures(line)?;
    caps[1].parse::<usize>().ok().filter(|&n| n >= 1)
}

/// One transcribed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed page number.
    pub number: usize,
    /// Page text, or a failure marker when extraction failed.
    pub content: String,
}

impl Page {
    pub fn new(number: usize, content: impl Into<String>) -> Self {
        Self {
            number,
            content: content.into(),
        }
    }
}

/// An ordered, gap-free sequence of pages numbered 1..N.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDocument {
    /// Optional title rendered as the `#` preamble (usually the source file name).
    pub title: Option<String>,
    pages: Vec<Page>,
}

impl PageDocument {
    /// Build a document from page contents in page order; page `i` of the
    /// iterator becomes page `i + 1`.
    pub fn from_contents<I, S>(contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = contents
            .into_iter()
            .enumerate()
            .map(|(i, c)| Page::new(i + 1, c))
            .collect();
        Self { title: None, pages }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Look up a page by its 1-indexed number.
    pub fn page(&self, number: usize) -> Option<&Page> {
        number
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
    }

    /// Serialise to the page-delimited text form read by [`crate::parser`].
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();

        if let Some(ref title) = self.title {
            out.push_str(&format!("# {title}\n\n"));
            out.push_str(&format!("**Pages:** {}\n\n", self.pages.len()));
            out.push_str(PAGE_SEPARATOR);
            out.push_str("\n\n");
        }

        for page in &self.pages {
            out.push_str(&page_header(page.number));
            out.push_str("\n\n");
            out.push_str(page.content.trim());
            out.push_str("\n\n");
            out.push_str(PAGE_SEPARATOR);
            out.push_str("\n\n");
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_contents_numbers_from_one() {
        let doc = PageDocument::from_contents(["a", "b", "c"]);
        let numbers: Vec<usize> = doc.pages().iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(doc.page(2).map(|p| p.content.as_str()), Some("b"));
        assert!(doc.page(0).is_none());
        assert!(doc.page(4).is_none());
    }

    #[test]
    fn markdown_has_header_and_trailing_separator_per_page() {
        let doc = PageDocument::from_contents(["first", "second"]).with_title("policy.pdf");
        let md = doc.to_markdown();

        assert!(md.starts_with("# policy.pdf\n\n**Pages:** 2\n\n---\n\n"));
        assert!(md.contains("## Page 1\n\nfirst\n\n---\n\n"));
        assert!(md.ends_with("## Page 2\n\nsecond\n\n---\n\n"));
    }

    #[test]
    fn header_grammar_accepts_unicode_spacing() {
        assert_eq!(parse_page_header("## Page 12"), Some(12));
        assert_eq!(parse_page_header("##\u{00A0}Page\u{3000}9 "), Some(9));
        assert_eq!(parse_page_header("## Page 0"), None);
        assert!(is_page_header_line("## Page 0"));
        assert!(!is_page_header_line("### Page 3"));
        assert!(!is_page_header_line("## Pages 3"));
    }

    #[test]
    fn untitled_document_starts_with_first_page() {
        let md = PageDocument::from_contents(["only"]).to_markdown();
        assert!(md.starts_with("## Page 1\n\n"));
    }
}
