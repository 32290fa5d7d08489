//! Fetching and extraction. Target detection, the fetch seam, the shared client, and the archive adapter.

mod ao3;
mod chapters;
mod client;
mod error;
mod listing;
mod markup;
mod meta;
mod series;

#[cfg(test)]
pub(crate) mod fixtures;

pub use ao3::{Ao3Scraper, ARCHIVE_BASE};
pub use chapters::split_chapters;
pub use client::{PoliteClient, PoliteClientBuilder};
pub use error::ScraperError;
pub use meta::{extract_metadata, WorkMetadata};
pub use series::{parse_series_entries, SeriesEntry};

use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

static TARGET_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?archiveofourown\.org/(works|series|users)/([^/?#]+)")
        .expect("target regex is valid")
});
static FIRST_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("integer regex is valid"));

/// A fetched page after redirects.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

/// Outcome of a successful request: the page, or the login gate.
#[derive(Debug, Clone)]
pub enum Fetched {
    Page(Page),
    Restricted { url: String },
}

/// Source of pages. Implemented by [PoliteClient]; tests substitute canned pages.
pub trait Fetch {
    fn fetch(&mut self, url: &str) -> Result<Fetched, ScraperError>;
}

/// What the user asked to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Work(u64),
    Series(u64),
    User(String),
}

/// Classify a work/series/user URL or a bare work id.
pub fn parse_target(input: &str) -> Result<Target, ScraperError> {
    let trimmed = input.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed
            .parse()
            .map(Target::Work)
            .map_err(|e: std::num::ParseIntError| ScraperError::InvalidTarget {
                input: input.to_string(),
                reason: e.to_string(),
            });
    }
    let captures = TARGET_URL
        .captures(trimmed)
        .ok_or_else(|| ScraperError::InvalidTarget {
            input: input.to_string(),
            reason: "expected an archiveofourown.org works, series, or users URL, or a work id"
                .to_string(),
        })?;
    let kind = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let value = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    match kind {
        "users" => Ok(Target::User(value.to_string())),
        _ => {
            let id: u64 = value.parse().map_err(|_| ScraperError::InvalidTarget {
                input: input.to_string(),
                reason: format!("'{}' is not a numeric id", value),
            })?;
            if kind == "works" {
                Ok(Target::Work(id))
            } else {
                Ok(Target::Series(id))
            }
        }
    }
}

/// Parse a CSS selector or return an error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::InvalidSelector {
        selector: sel.to_string(),
        message: e.to_string(),
    })
}

/// First run of digits in `text`, e.g. `work_123` -> 123, `/series/45` -> 45.
pub(crate) fn extract_int(text: &str) -> Option<u64> {
    FIRST_INT
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

/// Collapse an element's text to one trimmed string.
pub(crate) fn element_text(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
