//! Work listings on series and user index pages, with pagination.

use crate::scraper::{element_text, extract_int, parse_selector, ScraperError};
use reqwest::Url;
use scraper::Html;

/// Work list on a series page.
pub(crate) const SERIES_WORK_LIST: &str = "ul.series.work.index.group";
/// Work list on a user's works page.
pub(crate) const USER_WORK_LIST: &str = "ol.work.index.group";

/// One page of a work listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListingPage {
    pub work_ids: Vec<u64>,
    /// Absolute URL of the next page, if any.
    pub next: Option<String>,
}

/// Read work ids (from `li#work_N` direct children of the list) and the next-page link.
pub(crate) fn parse_listing(
    doc: &Html,
    list_selector: &str,
    page_url: &str,
) -> Result<ListingPage, ScraperError> {
    let list_sel = parse_selector(list_selector)?;
    let item_sel = parse_selector(&format!("{} > li", list_selector))?;
    if doc.select(&list_sel).next().is_none() {
        return Err(ScraperError::MissingStructure {
            what: "work listing",
            url: page_url.to_string(),
        });
    }
    let mut work_ids = Vec::new();
    for li in doc.select(&item_sel) {
        match li
            .value()
            .attr("id")
            .filter(|id| id.starts_with("work_"))
            .and_then(extract_int)
        {
            Some(id) => work_ids.push(id),
            None => tracing::debug!(url = page_url, "listing item without work id skipped"),
        }
    }
    Ok(ListingPage {
        work_ids,
        next: next_page_url(doc, page_url)?,
    })
}

/// Resolve `ol.pagination li.next a[href]` against the current page URL.
fn next_page_url(doc: &Html, page_url: &str) -> Result<Option<String>, ScraperError> {
    let next_sel = parse_selector("ol.pagination li.next a[href]")?;
    let Some(href) = doc
        .select(&next_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
    else {
        return Ok(None);
    };
    let base = Url::parse(page_url).map_err(|e| ScraperError::InvalidTarget {
        input: page_url.to_string(),
        reason: e.to_string(),
    })?;
    Ok(base.join(href).ok().map(|u| u.to_string()))
}

/// Series title (`h2.heading`) and length (`dd.works`) from a series page.
pub(crate) fn parse_series_header(
    doc: &Html,
    page_url: &str,
) -> Result<(String, Option<u32>), ScraperError> {
    let title_sel = parse_selector("h2.heading")?;
    let title = doc
        .select(&title_sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ScraperError::MissingStructure {
            what: "series title",
            url: page_url.to_string(),
        })?;
    Ok((title, series_length(doc)?))
}

/// Total works in a series, from `dd.works`; None when absent or not a number.
pub(crate) fn series_length(doc: &Html) -> Result<Option<u32>, ScraperError> {
    let works_sel = parse_selector("dd.works")?;
    Ok(doc
        .select(&works_sel)
        .next()
        .map(element_text)
        .and_then(|t| t.replace(',', "").parse().ok()))
}
