//! Series entries on a work page (`dd.series`).
//!
//! Each `span.series` entry reads "Part N of <series>". Past part 1 the entry starts with a
//! link to the previous work, so the series link is the second anchor.

use crate::scraper::{element_text, extract_int, parse_selector, ScraperError};
use scraper::Html;

/// A series reference before its length is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesEntry {
    pub id: u64,
    pub title: String,
    pub part: u32,
}

/// Read every series entry on a work page. Entries without a series id are dropped.
pub fn parse_series_entries(doc: &Html) -> Result<Vec<SeriesEntry>, ScraperError> {
    let dd_sel = parse_selector("dd.series")?;
    let entry_sel = parse_selector("span.series")?;
    let position_sel = parse_selector("span.position")?;
    let a_sel = parse_selector("a")?;

    let Some(dd) = doc.select(&dd_sel).next() else {
        return Ok(Vec::new());
    };
    let mut entries = Vec::new();
    for entry in dd.select(&entry_sel) {
        let part = entry
            .select(&position_sel)
            .next()
            .map(element_text)
            .and_then(|t| extract_int(&t))
            .and_then(|n| u32::try_from(n).ok());
        let anchor_index = if part == Some(1) { 0 } else { 1 };
        let Some(anchor) = entry.select(&a_sel).nth(anchor_index) else {
            tracing::debug!(?part, "series entry has no series link");
            continue;
        };
        let Some(id) = anchor.value().attr("href").and_then(extract_int) else {
            continue;
        };
        entries.push(SeriesEntry {
            id,
            title: element_text(anchor),
            part: part.unwrap_or(0),
        });
    }
    Ok(entries)
}
