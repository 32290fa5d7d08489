//! Shared error type for fetching and extraction.

use thiserror::Error;

/// Scraper error for target parsing, HTTP, and page structure.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Invalid link: {input}: {reason}")]
    InvalidTarget { input: String, reason: String },

    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Giving up on {url} after {attempts} attempt(s): {reason}")]
    RetryExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    /// A series or user page redirected to the login gate.
    #[error("Access restricted at {url}. Log in and download manually.")]
    AccessRestricted { url: String },

    #[error("Could not parse {what} at {url} (page layout may have changed).")]
    MissingStructure { what: &'static str, url: String },

    #[error("Invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Could not read chapter count at {url}: {source}")]
    ChapterProgress {
        url: String,
        source: crate::model::ChapterProgressError,
    },
}
