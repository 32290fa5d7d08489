//! Work metadata: title, author, and the `dl.work.meta.group` block.

use crate::model::ChapterProgress;
use crate::scraper::markup::render_children;
use crate::scraper::{element_text, parse_selector, ScraperError};
use chrono::{Local, NaiveDate};
use scraper::{ElementRef, Html};

const UNKNOWN: &str = "Unknown";

/// Fields read from a work page, before chapters and series are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkMetadata {
    pub title: String,
    pub author: String,
    pub rating: Option<String>,
    pub warning: Option<String>,
    pub category: Option<Vec<String>>,
    pub fandoms: Option<Vec<String>>,
    pub language: Option<String>,
    pub language_code: Option<String>,
    pub published: NaiveDate,
    pub updated: Option<NaiveDate>,
    pub words: Option<u64>,
    pub progress: ChapterProgress,
    pub relationships: Option<Vec<String>>,
    pub characters: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub summary: Option<String>,
}

/// The metadata `dl`, looked up by `dd` class.
struct MetaBlock<'a> {
    block: Option<ElementRef<'a>>,
}

impl<'a> MetaBlock<'a> {
    fn new(doc: &'a Html) -> Result<Self, ScraperError> {
        let sel = parse_selector("dl.work.meta.group")?;
        Ok(Self {
            block: doc.select(&sel).next(),
        })
    }

    fn field(&self, class: &str) -> Result<Option<ElementRef<'a>>, ScraperError> {
        let Some(block) = self.block else {
            return Ok(None);
        };
        let sel = parse_selector(&format!("dd.{}", class.replace(' ', ".")))?;
        Ok(block.select(&sel).next())
    }

    /// Trimmed text of a single-valued field; None when absent.
    fn single(&self, class: &str) -> Result<Option<String>, ScraperError> {
        Ok(self.field(class)?.map(element_text))
    }

    /// Link texts of a multi-valued field in page order; None when the field is absent.
    fn multiple(&self, class: &str) -> Result<Option<Vec<String>>, ScraperError> {
        let Some(dd) = self.field(class)? else {
            return Ok(None);
        };
        let a_sel = parse_selector("a")?;
        Ok(Some(dd.select(&a_sel).map(element_text).collect()))
    }
}

/// Read title, author, and the metadata block. Missing optional fields become None;
/// only an unreadable chapter count is an error.
pub fn extract_metadata(doc: &Html, url: &str) -> Result<WorkMetadata, ScraperError> {
    let title = heading_text(doc, "h2.title.heading")?.unwrap_or_else(|| UNKNOWN.to_string());
    let author = heading_text(doc, "h3.byline.heading")?.unwrap_or_else(|| UNKNOWN.to_string());

    let meta = MetaBlock::new(doc)?;
    let chapters = meta
        .single("chapters")?
        .ok_or_else(|| ScraperError::MissingStructure {
            what: "chapter count",
            url: url.to_string(),
        })?;
    let progress: ChapterProgress =
        chapters
            .parse()
            .map_err(|source| ScraperError::ChapterProgress {
                url: url.to_string(),
                source,
            })?;

    let published = meta
        .single("published")?
        .and_then(|s| parse_date(&s))
        .unwrap_or_else(|| {
            tracing::debug!(url, "no published date; using today");
            Local::now().date_naive()
        });
    let updated = meta.single("status")?.and_then(|s| parse_date(&s));
    let language_field = meta.field("language")?;

    Ok(WorkMetadata {
        title,
        author,
        rating: meta.single("rating tags")?,
        warning: meta.single("warning tags")?,
        category: meta.multiple("category tags")?,
        fandoms: meta.multiple("fandom tags")?,
        language: language_field.map(element_text),
        language_code: language_field
            .and_then(|dd| dd.value().attr("lang"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        published,
        updated,
        words: meta
            .single("words")?
            .and_then(|w| w.replace([',', ' '], "").parse().ok()),
        progress,
        relationships: meta.multiple("relationship tags")?,
        characters: meta.multiple("character tags")?,
        tags: meta.multiple("freeform tags")?,
        summary: summary_markup(doc)?,
    })
}

fn heading_text(doc: &Html, selector: &str) -> Result<Option<String>, ScraperError> {
    let sel = parse_selector(selector)?;
    Ok(doc
        .select(&sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty()))
}

fn summary_markup(doc: &Html) -> Result<Option<String>, ScraperError> {
    let module_sel = parse_selector("div.summary.module")?;
    let quote_sel = parse_selector("blockquote.userstuff")?;
    let Some(module) = doc.select(&module_sel).next() else {
        return Ok(None);
    };
    let body = module.select(&quote_sel).next().unwrap_or(module);
    let markup = render_children(body, &[]).trim().to_string();
    Ok(Some(markup).filter(|m| !m.is_empty()))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}
