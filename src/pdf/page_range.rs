//! Page range parsing ("1-3,5,7-9")

use std::fmt;
use std::str::FromStr;
use crate::error::{Error, Result};

/// One comma-separated token of a page range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSpan {
    /// A single 1-based page
    Single(u32),
    /// An inclusive `start-end` span
    Span(u32, u32),
}

/// A parsed page range
///
/// Tokens keep the order in which they were written, so `"5,1-2"` selects
/// page 5 before pages 1 and 2. Repeated pages are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRange {
    source: String,
    spans: Vec<PageSpan>,
}

impl PageRange {
    /// Parse a page range string
    ///
    /// Whitespace is not trimmed: `"1, 2"` is malformed.
    pub fn parse(range: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidPageRange {
            range: range.to_string(),
            reason,
        };

        if range.is_empty() {
            return Err(invalid("empty range".to_string()));
        }

        let mut spans = Vec::new();
        for token in range.split(',') {
            if token.is_empty() {
                return Err(invalid("empty token".to_string()));
            }

            let span = match token.split_once('-') {
                Some((start, end)) => {
                    let start = parse_page_number(start).map_err(&invalid)?;
                    let end = parse_page_number(end).map_err(&invalid)?;
                    if start > end {
                        return Err(invalid(format!("span {} ends before it starts", token)));
                    }
                    PageSpan::Span(start, end)
                }
                None => PageSpan::Single(parse_page_number(token).map_err(&invalid)?),
            };
            spans.push(span);
        }

        Ok(Self {
            source: range.to_string(),
            spans,
        })
    }

    /// The parsed tokens in written order
    pub fn spans(&self) -> &[PageSpan] {
        &self.spans
    }

    /// Expand into concrete 1-based page numbers for a document with `page_count` pages
    pub fn resolve(&self, page_count: u32) -> Result<Vec<u32>> {
        let mut pages = Vec::new();

        for span in &self.spans {
            let (start, end) = match *span {
                PageSpan::Single(page) => (page, page),
                PageSpan::Span(start, end) => (start, end),
            };

            if end > page_count {
                return Err(Error::PageOutOfBounds {
                    range: self.source.clone(),
                    page: end,
                    total: page_count,
                });
            }

            pages.extend(start..=end);
        }

        Ok(pages)
    }
}

impl FromStr for PageRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_page_number(token: &str) -> std::result::Result<u32, String> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{}' is not a page number", token));
    }

    match token.parse::<u32>() {
        Ok(0) => Err("pages are numbered from 1".to_string()),
        Ok(page) => Ok(page),
        Err(_) => Err(format!("page number {} is too large", token)),
    }
}

/// Resolve an optional page range against a document
///
/// Absent or blank ranges select every page in order.
pub fn select_pages(range: Option<&str>, page_count: u32) -> Result<Vec<u32>> {
    match range {
        Some(range) if !range.trim().is_empty() => PageRange::parse(range)?.resolve(page_count),
        _ => Ok((1..=page_count).collect()),
    }
}
