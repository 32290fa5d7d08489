//! Split a full-work page into chapters.
//!
//! Single-chapter works keep the whole `div#chapters` block. Multi-chapter works are split
//! on `.chapter#chapter-N` blocks, each labelled "Chapter N" or "Chapter N: Title".

use crate::model::{Chapter, ChapterProgress};
use crate::scraper::markup::{render_element, Override};
use crate::scraper::{element_text, parse_selector, ScraperError};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static CHAPTER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Chapter\s+\d+\s*(?::\s*|$)").expect("chapter prefix regex is valid")
});

/// Split `doc` into chapters. Blocks that cannot be located are skipped with a warning.
pub fn split_chapters(
    doc: &Html,
    work_title: &str,
    progress: ChapterProgress,
) -> Result<Vec<Chapter>, ScraperError> {
    let landmark_sel = parse_selector("h3.landmark.heading#work")?;
    // Blank every "Chapter Text" landmark so it never leaks into chapter content.
    let landmarks: Vec<Override<'_>> = doc
        .select(&landmark_sel)
        .map(|element| Override {
            element,
            text: String::new(),
        })
        .collect();

    if progress.is_single_chapter() {
        let chapters_sel = parse_selector("div#chapters")?;
        return Ok(doc
            .select(&chapters_sel)
            .next()
            .map(|block| Chapter {
                index: 1,
                title: work_title.to_string(),
                content: render_element(block, &landmarks),
            })
            .into_iter()
            .collect());
    }

    let title_sel = parse_selector("h3.title")?;
    let page_titles: Vec<ElementRef<'_>> = doc.select(&title_sel).collect();
    let blocks = chapter_blocks(doc, progress.released)?;
    let mut chapters = Vec::with_capacity(blocks.len());
    let mut expected: u64 = 1;
    for (&index, &block) in &blocks {
        if u64::from(index) > expected {
            tracing::warn!(from = expected, to = index - 1, "chapter content not found on page; skipped");
        }
        expected = u64::from(index) + 1;
        let heading = block
            .select(&title_sel)
            .next()
            .or_else(|| page_titles.get(index as usize - 1).copied());
        let title = match heading.map(element_text).and_then(|t| clean_title(&t)) {
            Some(t) => format!("Chapter {}: {}", index, t),
            None => format!("Chapter {}", index),
        };
        let mut overrides = landmarks.clone();
        if let Some(h) = heading.filter(|h| is_descendant(*h, block)) {
            overrides.push(Override {
                element: h,
                text: title.clone(),
            });
        }
        chapters.push(Chapter {
            index,
            content: render_element(block, &overrides),
            title,
        });
    }
    if expected <= u64::from(progress.released) {
        tracing::warn!(
            from = expected,
            to = progress.released,
            "chapter content not found on page; skipped"
        );
    }
    Ok(chapters)
}

/// `.chapter#chapter-N` blocks keyed by N, for 1 <= N <= `released`. First block wins.
fn chapter_blocks(
    doc: &Html,
    released: u32,
) -> Result<BTreeMap<u32, ElementRef<'_>>, ScraperError> {
    let sel = parse_selector(r#".chapter[id^="chapter-"]"#)?;
    let mut blocks = BTreeMap::new();
    for block in doc.select(&sel) {
        let index = block
            .value()
            .id()
            .and_then(|id| id.strip_prefix("chapter-"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(index) = index.filter(|i| (1..=released).contains(i)) {
            blocks.entry(index).or_insert(block);
        }
    }
    Ok(blocks)
}

/// Strip leading "Chapter N:" prefixes from a heading; None when nothing else is left.
fn clean_title(heading: &str) -> Option<String> {
    let mut title = heading.trim();
    while let Some(m) = CHAPTER_PREFIX.find(title) {
        title = title[m.end()..].trim_start();
    }
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

fn is_descendant(element: ElementRef<'_>, ancestor: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .any(|node| ElementRef::wrap(node) == Some(ancestor))
}
