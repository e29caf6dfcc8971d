//! Page index parsing: recover `page number → page text` from a page document.
//!
//! The parser is a line tokenizer feeding a two-state machine rather than a
//! single regex over the whole blob. Every line is one of three tokens:
//!
//! | Token       | Line shape      |
//! |-------------|-----------------|
//! | `Header(n)` | `## Page <n>`, n ≥ 1 |
//! | `Separator` | `---`           |
//! | `Text`      | anything else   |
//!
//! A page span starts at a header and runs to the next header or end of
//! input. A separator that is the last non-blank line of a span is the page
//! boundary and is dropped; separators elsewhere are page content (a
//! transcribed horizontal rule). Lines before the first header are the title
//! preamble and are ignored.
//!
//! [`ParseMode::BestEffort`] returns whatever pages match; a repeated page
//! number overwrites the earlier span. [`ParseMode::Strict`] requires pages
//! numbered exactly 1..N in order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a document was rejected by strict parsing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no '## Page <N>' headers found")]
    NoPages,

    #[error("page {page} appears more than once")]
    DuplicatePage { page: usize },

    #[error("page {page} follows page {previous}")]
    OutOfOrder { page: usize, previous: usize },

    #[error("expected page {expected}, found page {found}")]
    MissingPage { expected: usize, found: usize },
}

/// How strictly the page grammar is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    /// Keep every page that matches; later duplicates overwrite earlier ones. (default)
    #[default]
    BestEffort,
    /// Reject empty, duplicated, out-of-order or gapped documents.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Header(usize),
    Separator(&'a str),
    Text(&'a str),
}

impl<'a> Token<'a> {
    fn of(line: &'a str) -> Self {
        if let Some(n) = crate::document::parse_page_header(line.trim_end()) {
            return Token::Header(n);
        }
        if line.trim() == crate::document::PAGE_SEPARATOR {
            Token::Separator(line)
        } else {
            Token::Text(line)
        }
    }

    fn line(&self) -> Option<&'a str> {
        match self {
            Token::Header(_) => None,
            Token::Separator(l) | Token::Text(l) => Some(l),
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Token::Text(l) if l.trim().is_empty())
    }
}

/// One header plus the tokens up to the next header.
struct Span<'a> {
    number: usize,
    body: Vec<Token<'a>>,
}

impl Span<'_> {
    fn content(&self) -> String {
        let mut end = self.body.len();
        while end > 0 && self.body[end - 1].is_blank() {
            end -= 1;
        }
        if end > 0 && matches!(self.body[end - 1], Token::Separator(_)) {
            end -= 1;
        }
        self.body[..end]
            .iter()
            .filter_map(Token::line)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

fn spans(text: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut current: Option<Span<'_>> = None;

    for line in text.lines() {
        match Token::of(line) {
            Token::Header(number) => {
                spans.extend(current.take());
                current = Some(Span {
                    number,
                    body: Vec::new(),
                });
            }
            token => {
                if let Some(ref mut span) = current {
                    span.body.push(token);
                }
            }
        }
    }
    spans.extend(current);
    spans
}

/// Page number → trimmed page text, ordered by page number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIndex {
    pages: BTreeMap<usize, String>,
}

impl PageIndex {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, number: usize) -> Option<&str> {
        self.pages.get(&number).map(String::as_str)
    }

    /// Pages in ascending page-number order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.pages.iter().map(|(n, c)| (*n, c.as_str()))
    }

    pub fn page_numbers(&self) -> Vec<usize> {
        self.pages.keys().copied().collect()
    }
}

impl FromIterator<(usize, String)> for PageIndex {
    fn from_iter<T: IntoIterator<Item = (usize, String)>>(iter: T) -> Self {
        Self {
            pages: iter.into_iter().collect(),
        }
    }
}

/// Parser for the page-delimited document format.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageIndexParser {
    mode: ParseMode,
}

impl PageIndexParser {
    pub fn new(mode: ParseMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    /// Parse `text` into a [`PageIndex`].
    ///
    /// Never fails in [`ParseMode::BestEffort`].
    pub fn parse(&self, text: &str) -> Result<PageIndex, ParseError> {
        let spans = spans(text);
        if self.mode == ParseMode::Strict {
            validate(&spans)?;
        }

        let mut pages = BTreeMap::new();
        for span in &spans {
            if pages.insert(span.number, span.content()).is_some() {
                warn!("Page {} appears more than once; keeping the last occurrence", span.number);
            }
        }
        debug!("Parsed {} pages from {} header(s)", pages.len(), spans.len());

        Ok(PageIndex { pages })
    }
}

/// Best-effort parse; see [`PageIndexParser`].
pub fn parse_pages(text: &str) -> PageIndex {
    PageIndexParser::new(ParseMode::BestEffort)
        .parse(text)
        .unwrap_or_default()
}

fn validate(spans: &[Span<'_>]) -> Result<(), ParseError> {
    if spans.is_empty() {
        return Err(ParseError::NoPages);
    }

    let mut previous: Option<usize> = None;
    for (idx, span) in spans.iter().enumerate() {
        let page = span.number;
        if let Some(prev) = previous {
            if page < prev {
                return Err(ParseError::OutOfOrder {
                    page,
                    previous: prev,
                });
            }
            if page == prev {
                return Err(ParseError::DuplicatePage { page });
            }
        }
        let expected = idx + 1;
        if page != expected {
            return Err(ParseError::MissingPage {
                expected,
                found: page,
            });
        }
        previous = Some(page);
    }
    Ok(())
}
