//! Canned archive pages and an in-memory fetcher for tests.

use crate::scraper::{Fetch, Fetched, Page, ScraperError};
use std::collections::HashMap;

pub(crate) const SINGLE_CHAPTER_BODY: &str = r#"<div id="chapters" role="article"><h3 class="landmark heading" id="work">Work Text:</h3><div class="userstuff"><p>Hello world.</p></div></div>"#;

/// Knobs for [work_page]. Defaults describe a complete one-chapter work.
#[derive(Debug, Clone)]
pub(crate) struct WorkPage {
    pub title: &'static str,
    pub author: &'static str,
    pub chapters: &'static str,
    /// Raw `dt`/`dd` pairs appended to the metadata block.
    pub extra_meta: &'static str,
    /// `span.series` entries; no series field when empty.
    pub series: Vec<String>,
    pub body: String,
}

impl Default for WorkPage {
    fn default() -> Self {
        Self {
            title: "A Test / Work",
            author: "tester",
            chapters: "1/1",
            extra_meta: "",
            series: Vec::new(),
            body: SINGLE_CHAPTER_BODY.to_string(),
        }
    }
}

fn tag_list(class: &str, label: &str, tags: &[&str]) -> String {
    let items: String = tags
        .iter()
        .map(|t| format!(r#"<li><a class="tag" href="/tags/{0}/works">{0}</a></li>"#, t))
        .collect();
    format!(
        r#"<dt class="{0}">{1}:</dt><dd class="{0}"><ul class="commas">{2}</ul></dd>"#,
        class, label, items
    )
}

/// A full work page in the archive's layout.
pub(crate) fn work_page(page: WorkPage) -> String {
    let series = if page.series.is_empty() {
        String::new()
    } else {
        format!(
            r#"<dt class="series">Series:</dt><dd class="series">{}</dd>"#,
            page.series.concat()
        )
    };
    format!(
        concat!(
            r#"<!DOCTYPE html><html><head><title>{title}</title></head><body><div id="main">"#,
            r#"<div class="wrapper"><dl class="work meta group">"#,
            "{rating}{warning}{category}{fandom}",
            r#"<dt class="language">Language:</dt><dd class="language" lang="en">English</dd>"#,
            "{freeform}{series}",
            r#"<dt class="stats">Stats:</dt><dd class="stats"><dl class="stats">"#,
            r#"<dt class="published">Published:</dt><dd class="published">2021-03-04</dd>"#,
            r#"<dt class="words">Words:</dt><dd class="words">1,234</dd>"#,
            r#"<dt class="chapters">Chapters:</dt><dd class="chapters">{chapters}</dd>"#,
            "</dl></dd>{extra}</dl></div>",
            r#"<div class="preface group"><h2 class="title heading">{title}</h2>"#,
            r#"<h3 class="byline heading"><a rel="author" href="/users/{author}/pseuds/{author}">{author}</a></h3>"#,
            r#"<div class="summary module"><h3 class="heading">Summary:</h3>"#,
            r#"<blockquote class="userstuff"><p>A short summary.</p></blockquote></div></div>"#,
            "{body}</div></body></html>"
        ),
        title = page.title,
        author = page.author,
        rating = tag_list("rating tags", "Rating", &["Teen And Up Audiences"]),
        warning = tag_list("warning tags", "Archive Warning", &["No Archive Warnings Apply"]),
        category = tag_list("category tags", "Category", &["Gen"]),
        fandom = tag_list("fandom tags", "Fandom", &["Fandom One", "Fandom Two"]),
        freeform = tag_list("freeform tags", "Additional Tags", &["Fluff", "Angst"]),
        series = series,
        chapters = page.chapters,
        extra = page.extra_meta,
        body = page.body,
    )
}

/// Only the series field of a work page.
pub(crate) fn series_block(spans: &[String]) -> String {
    format!(
        r#"<html><body><dl class="work meta group"><dt class="series">Series:</dt><dd class="series">{}</dd></dl></body></html>"#,
        spans.concat()
    )
}

/// One `span.series` entry. Later parts carry a link to the previous work first.
pub(crate) fn series_span(part: u32, series_id: u64, name: &str, prev_work: Option<u64>) -> String {
    let prev = prev_work
        .map(|id| format!(r#"<a class="previous" href="/works/{}">←</a> "#, id))
        .unwrap_or_default();
    format!(
        r#"<span class="series">{}<span class="position">Part {} of <a href="/series/{}">{}</a></span></span>"#,
        prev, part, series_id, name
    )
}

/// Chapter blocks as rendered with `view_full_work=true`.
pub(crate) fn multi_chapter_body(chapters: &[(u32, &str)]) -> String {
    let blocks: String = chapters
        .iter()
        .map(|(i, heading)| {
            format!(
                concat!(
                    r#"<div class="chapter" id="chapter-{0}">"#,
                    r#"<div class="chapter preface group"><h3 class="title">{1}</h3></div>"#,
                    r#"<div class="userstuff module"><h3 class="landmark heading" id="work">Chapter Text</h3>"#,
                    "<p>Body of chapter {0}.</p></div></div>"
                ),
                i, heading
            )
        })
        .collect();
    format!(r#"<div id="chapters">{}</div>"#, blocks)
}

fn blurbs(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| {
            format!(
                concat!(
                    r#"<li id="work_{0}" class="work blurb group" role="article">"#,
                    r#"<div class="header module"><h4 class="heading"><a href="/works/{0}">Work {0}</a></h4></div>"#,
                    r#"<ul class="tags commas"><li class="freeforms" id="work_999"><a class="tag">Tag</a></li></ul>"#,
                    "</li>"
                ),
                id
            )
        })
        .collect()
}

fn pagination(next: Option<&str>) -> String {
    next.map(|href| {
        format!(
            r#"<ol class="pagination actions"><li class="previous">Previous</li><li class="next"><a rel="next" href="{}">Next</a></li></ol>"#,
            href
        )
    })
    .unwrap_or_default()
}

/// A series index page.
pub(crate) fn series_page(title: &str, length: Option<u32>, ids: &[u64], next: Option<&str>) -> String {
    let works = length
        .map(|n| format!(r#"<dt class="works">Works:</dt><dd class="works">{}</dd>"#, n))
        .unwrap_or_default();
    format!(
        concat!(
            r#"<html><body><div id="main" class="series-show"><h2 class="heading">{0}</h2>"#,
            r#"<div class="wrapper"><dl class="series meta group"><dt>Creator:</dt><dd>tester</dd>"#,
            r#"<dt class="stats">Stats:</dt><dd class="stats"><dl class="stats">{1}</dl></dd></dl></div>"#,
            r#"<ul class="series work index group">{2}</ul>{3}</div></body></html>"#
        ),
        title,
        works,
        blurbs(ids),
        pagination(next)
    )
}

/// A user's works index page.
pub(crate) fn user_page(ids: &[u64], next: Option<&str>) -> String {
    format!(
        r#"<html><body><div id="main"><h2 class="heading">Works by tester</h2><ol class="work index group">{}</ol>{}</div></body></html>"#,
        blurbs(ids),
        pagination(next)
    )
}

/// In-memory [Fetch] that serves canned responses and records every request.
#[derive(Debug, Default)]
pub(crate) struct StaticFetcher {
    responses: HashMap<String, Fetched>,
    pub requests: Vec<String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.responses.insert(
            url.to_string(),
            Fetched::Page(Page {
                url: url.to_string(),
                body: body.into(),
            }),
        );
        self
    }

    pub fn restricted(mut self, url: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            Fetched::Restricted {
                url: format!("https://archiveofourown.org/users/login?restricted=true&return_to={}", url),
            },
        );
        self
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests.iter().filter(|r| r.as_str() == url).count()
    }
}

impl Fetch for StaticFetcher {
    fn fetch(&mut self, url: &str) -> Result<Fetched, ScraperError> {
        self.requests.push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| ScraperError::RetryExhausted {
                url: url.to_string(),
                attempts: 1,
                reason: "HTTP 404".to_string(),
            })
    }
}
