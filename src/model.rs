//! Data model for downloaded works, series, and users.
//!
//! Everything here is built once from a fetched page and never mutated afterwards.
//! The renderers (HTML, PDF, EPUB, JSON) consume these types.

use crate::formats::html_escape_attr;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// One fully extracted work.
///
/// Restricted works never become a `Work`; see [WorkOutcome].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    pub id: u64,
    pub title: String,
    pub author: String,
    pub rating: Option<String>,
    pub warning: Option<String>,
    pub category: Option<Vec<String>>,
    pub fandoms: Option<Vec<String>>,
    pub language: Option<String>,
    /// Value of the `lang` attribute on the language field (e.g. `en`).
    pub language_code: Option<String>,
    pub published: NaiveDate,
    pub updated: Option<NaiveDate>,
    pub words: Option<u64>,
    pub progress: ChapterProgress,
    pub relationships: Option<Vec<String>>,
    pub characters: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    /// Summary markup, without the surrounding module.
    pub summary: Option<String>,
    pub series: Vec<SeriesMembership>,
    pub chapters: Vec<Chapter>,
}

impl Work {
    pub fn is_single_chapter(&self) -> bool {
        self.progress.is_single_chapter()
    }

    pub fn completed(&self) -> bool {
        self.progress.completed()
    }

    pub fn released_chapters(&self) -> u32 {
        self.progress.released
    }

    /// Membership entry for the given series, if this work belongs to it.
    pub fn membership(&self, series_id: u64) -> Option<&SeriesMembership> {
        self.series.iter().find(|s| s.id == series_id)
    }

    /// Document title: the work title, or `title|Series(part/length)|...` when the work is in series.
    pub fn meta_title(&self) -> String {
        if self.series.is_empty() {
            return self.title.clone();
        }
        let mut out = self.title.replace('|', "_");
        for s in &self.series {
            out.push_str(&format!("|{}({}/{})", s.title, s.part, s.length_label()));
        }
        out
    }
}

/// Result of fetching a work page.
#[derive(Debug, Clone)]
pub enum WorkOutcome {
    Extracted(Box<Work>),
    /// Access-gated work; only the id is known.
    Restricted { id: u64 },
}

/// Released/total chapter counter as shown on the work page ("3/10", "3/?").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterProgress {
    pub released: u32,
    /// None when the author has not set a total (`?`).
    pub total: Option<u32>,
}

impl ChapterProgress {
    pub fn new(released: u32, total: Option<u32>) -> Self {
        Self { released, total }
    }

    pub fn completed(&self) -> bool {
        self.total == Some(self.released)
    }

    pub fn is_single_chapter(&self) -> bool {
        self.released == 1 && self.total == Some(1)
    }
}

/// Error for a chapter counter whose released side is not a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterProgressError(pub String);

impl fmt::Display for ChapterProgressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid chapter count '{}'", self.0)
    }
}

impl std::error::Error for ChapterProgressError {}

impl FromStr for ChapterProgress {
    type Err = ChapterProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (released, total) = match s.split_once('/') {
            Some((l, r)) => (l, Some(r)),
            None => (s, None),
        };
        let released: u32 = released
            .trim()
            .replace(',', "")
            .parse()
            .map_err(|_| ChapterProgressError(s.to_string()))?;
        let total = total
            .map(|t| t.trim().replace(',', ""))
            .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))
            .and_then(|t| t.parse().ok());
        Ok(Self { released, total })
    }
}

impl fmt::Display for ChapterProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "{}/{}", self.released, total),
            None => write!(f, "{}/?", self.released),
        }
    }
}

/// One chapter in page order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// 1-based chapter number from the page's own numbering.
    pub index: u32,
    pub title: String,
    /// Markup for this chapter only, with its title heading already labelled.
    pub content: String,
}

/// A work's place in one series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMembership {
    pub id: u64,
    pub title: String,
    /// 1-based position of the work in the series.
    pub part: u32,
    /// Total works in the series; None when the series page could not be read.
    pub length: Option<u32>,
}

impl SeriesMembership {
    /// "5", or "?" when the length is unknown.
    pub fn length_label(&self) -> String {
        self.length
            .map(|l| l.to_string())
            .unwrap_or_else(|| "?".to_string())
    }
}

/// Series index: title, length, and member work ids in listing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: u64,
    pub title: String,
    pub length: Option<u32>,
    pub work_ids: Vec<u64>,
}

impl Series {
    pub fn hint(&self) -> SeriesHint {
        SeriesHint {
            id: self.id,
            length: self.length,
        }
    }
}

/// Already-known series length, passed along while expanding that series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesHint {
    pub id: u64,
    pub length: Option<u32>,
}

/// A user's works index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub work_ids: Vec<u64>,
}

/// A piece of document content: plain text (escaped on render) or markup (passed through).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Markup(String),
}

impl Content {
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Content::Text(t) => Cow::Owned(html_escape_attr(t)),
            Content::Markup(m) => Cow::Borrowed(m),
        }
    }
}
