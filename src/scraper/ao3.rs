//! Archive adapter: builds page URLs, fetches work/series/user pages, and assembles the model.

use crate::model::{Series, SeriesHint, SeriesMembership, User, Work, WorkOutcome};
use crate::scraper::listing::{self, ListingPage, SERIES_WORK_LIST, USER_WORK_LIST};
use crate::scraper::{
    extract_metadata, parse_series_entries, split_chapters, Fetch, Fetched, Page, ScraperError,
    SeriesEntry,
};
use scraper::Html;
use std::collections::{HashMap, HashSet};

pub const ARCHIVE_BASE: &str = "https://archiveofourown.org";

/// Archive scraper. Holds a reference to the page source (normally the shared polite client).
pub struct Ao3Scraper<'a> {
    fetcher: &'a mut dyn Fetch,
    base: String,
}

impl<'a> Ao3Scraper<'a> {
    pub fn new(fetcher: &'a mut dyn Fetch) -> Self {
        Self::with_base(fetcher, ARCHIVE_BASE)
    }

    /// Scraper against another host (mirrors, local test servers).
    pub fn with_base(fetcher: &'a mut dyn Fetch, base: &str) -> Self {
        Self {
            fetcher,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Full-work view with the adult-content interstitial skipped.
    pub fn work_url(&self, id: u64) -> String {
        format!(
            "{}/works/{}?view_full_work=true&view_adult=true",
            self.base, id
        )
    }

    pub fn series_url(&self, id: u64) -> String {
        format!("{}/series/{}", self.base, id)
    }

    pub fn user_url(&self, username: &str) -> String {
        format!("{}/users/{}/works", self.base, username)
    }

    /// Fetch and extract one work.
    ///
    /// `hint` carries a series length already known to the caller (while expanding that
    /// series), so its page is not fetched again.
    pub fn fetch_work(
        &mut self,
        id: u64,
        hint: Option<SeriesHint>,
    ) -> Result<WorkOutcome, ScraperError> {
        let url = self.work_url(id);
        let page = match self.fetcher.fetch(&url)? {
            Fetched::Page(page) => page,
            Fetched::Restricted { url } => {
                tracing::debug!(id, %url, "work redirected to login");
                return Ok(WorkOutcome::Restricted { id });
            }
        };

        let (meta, entries, chapters) = {
            let doc = Html::parse_document(&page.body);
            let meta = extract_metadata(&doc, &page.url)?;
            let entries = parse_series_entries(&doc)?;
            let chapters = split_chapters(&doc, &meta.title, meta.progress)?;
            (meta, entries, chapters)
        };
        if chapters.is_empty() {
            tracing::warn!(id, "no chapter content found on work page");
        }
        let series = self.resolve_series(entries, hint);
        tracing::debug!(id, chapters = chapters.len(), series = series.len(), "work extracted");

        Ok(WorkOutcome::Extracted(Box::new(Work {
            id,
            title: meta.title,
            author: meta.author,
            rating: meta.rating,
            warning: meta.warning,
            category: meta.category,
            fandoms: meta.fandoms,
            language: meta.language,
            language_code: meta.language_code,
            published: meta.published,
            updated: meta.updated,
            words: meta.words,
            progress: meta.progress,
            relationships: meta.relationships,
            characters: meta.characters,
            tags: meta.tags,
            summary: meta.summary,
            series,
            chapters,
        })))
    }

    /// Attach a length to each series entry. Lengths are looked up once per series id.
    fn resolve_series(
        &mut self,
        entries: Vec<SeriesEntry>,
        hint: Option<SeriesHint>,
    ) -> Vec<SeriesMembership> {
        let mut lengths: HashMap<u64, Option<u32>> = HashMap::new();
        if let Some(h) = hint {
            lengths.insert(h.id, h.length);
        }
        entries
            .into_iter()
            .map(|entry| {
                let length = match lengths.get(&entry.id) {
                    Some(known) => *known,
                    None => {
                        let looked_up = self.series_length(entry.id);
                        lengths.insert(entry.id, looked_up);
                        looked_up
                    }
                };
                SeriesMembership {
                    id: entry.id,
                    title: entry.title,
                    part: entry.part,
                    length,
                }
            })
            .collect()
    }

    /// Number of works in a series; None (with a warning) when the page cannot be read.
    pub fn series_length(&mut self, id: u64) -> Option<u32> {
        let url = self.series_url(id);
        let page = match self.fetcher.fetch(&url) {
            Ok(Fetched::Page(page)) => page,
            Ok(Fetched::Restricted { .. }) => {
                tracing::warn!(series = id, "series page is restricted; length unknown");
                return None;
            }
            Err(e) => {
                tracing::warn!(series = id, error = %e, "could not fetch series page; length unknown");
                return None;
            }
        };
        let doc = Html::parse_document(&page.body);
        match listing::series_length(&doc) {
            Ok(Some(n)) => Some(n),
            Ok(None) => {
                tracing::warn!(series = id, "series page has no work count; length unknown");
                None
            }
            Err(e) => {
                tracing::warn!(series = id, error = %e, "series length lookup failed");
                None
            }
        }
    }

    /// Series index: title, length, and every member work id across all listing pages.
    pub fn fetch_series(&mut self, id: u64) -> Result<Series, ScraperError> {
        let url = self.series_url(id);
        let first = self.fetch_index_page(&url)?;
        let (title, length) = {
            let doc = Html::parse_document(&first.body);
            listing::parse_series_header(&doc, &first.url)?
        };
        let work_ids = self.collect_listing(first, SERIES_WORK_LIST)?;
        tracing::info!(series = id, %title, works = work_ids.len(), "series index read");
        Ok(Series {
            id,
            title,
            length,
            work_ids,
        })
    }

    /// All work ids on a user's works index, across all listing pages.
    pub fn fetch_user(&mut self, username: &str) -> Result<User, ScraperError> {
        let url = self.user_url(username);
        let first = self.fetch_index_page(&url)?;
        let work_ids = self.collect_listing(first, USER_WORK_LIST)?;
        tracing::info!(user = username, works = work_ids.len(), "user index read");
        Ok(User {
            username: username.to_string(),
            work_ids,
        })
    }

    fn fetch_index_page(&mut self, url: &str) -> Result<Page, ScraperError> {
        match self.fetcher.fetch(url)? {
            Fetched::Page(page) => Ok(page),
            Fetched::Restricted { .. } => Err(ScraperError::AccessRestricted {
                url: url.to_string(),
            }),
        }
    }

    /// Walk `next` links from `first`, collecting ids in listing order. Stops on a repeated page.
    fn collect_listing(
        &mut self,
        first: Page,
        list_selector: &str,
    ) -> Result<Vec<u64>, ScraperError> {
        let mut visited = HashSet::new();
        let mut ids = Vec::new();
        let mut page = first;
        loop {
            visited.insert(page.url.clone());
            let ListingPage { work_ids, next } = {
                let doc = Html::parse_document(&page.body);
                listing::parse_listing(&doc, list_selector, &page.url)?
            };
            ids.extend(work_ids);
            match next {
                Some(next) if !visited.contains(&next) => {
                    tracing::debug!(url = %next, "following listing page");
                    page = self.fetch_index_page(&next)?;
                }
                _ => break,
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::fixtures::{self, StaticFetcher, WorkPage};

    const BASE: &str = "https://archiveofourown.org";

    fn work_url(id: u64) -> String {
        format!("{}/works/{}?view_full_work=true&view_adult=true", BASE, id)
    }

    fn series_url(id: u64) -> String {
        format!("{}/series/{}", BASE, id)
    }

    fn extracted(outcome: WorkOutcome) -> Box<Work> {
        match outcome {
            WorkOutcome::Extracted(work) => work,
            WorkOutcome::Restricted { id } => panic!("work {} unexpectedly restricted", id),
        }
    }

    #[test]
    fn single_chapter_work_end_to_end() -> Result<(), ScraperError> {
        let mut fetcher =
            StaticFetcher::new().page(&work_url(1), fixtures::work_page(WorkPage::default()));
        let work = extracted(Ao3Scraper::new(&mut fetcher).fetch_work(1, None)?);
        assert_eq!(work.id, 1);
        assert_eq!(work.title, "A Test / Work");
        assert_eq!(work.chapters.len(), 1);
        assert_eq!(work.chapters[0].title, "A Test / Work");
        assert!(work.is_single_chapter());
        assert!(work.completed());
        assert_eq!(work.released_chapters(), 1);
        assert!(work.series.is_empty());
        assert_eq!(fetcher.requests, vec![work_url(1)]);
        Ok(())
    }

    #[test]
    fn restricted_work_is_reported_not_extracted() -> Result<(), ScraperError> {
        let mut fetcher = StaticFetcher::new().restricted(&work_url(9));
        let outcome = Ao3Scraper::new(&mut fetcher).fetch_work(9, None)?;
        assert!(matches!(outcome, WorkOutcome::Restricted { id: 9 }));
        Ok(())
    }

    #[test]
    fn series_length_is_fetched_once_per_series() -> Result<(), ScraperError> {
        let page = WorkPage {
            series: vec![fixtures::series_span(2, 5, "Saga", Some(100))],
            ..Default::default()
        };
        let mut fetcher = StaticFetcher::new()
            .page(&work_url(1), fixtures::work_page(page))
            .page(&series_url(5), fixtures::series_page("Saga", Some(4), &[100, 1], None));
        let work = extracted(Ao3Scraper::new(&mut fetcher).fetch_work(1, None)?);
        assert_eq!(
            work.series,
            vec![SeriesMembership {
                id: 5,
                title: "Saga".to_string(),
                part: 2,
                length: Some(4),
            }]
        );
        assert_eq!(fetcher.count(&series_url(5)), 1);
        Ok(())
    }

    #[test]
    fn matching_hint_skips_series_fetch() -> Result<(), ScraperError> {
        let page = WorkPage {
            series: vec![fixtures::series_span(1, 5, "Saga", None)],
            ..Default::default()
        };
        let mut fetcher = StaticFetcher::new().page(&work_url(1), fixtures::work_page(page));
        let hint = SeriesHint {
            id: 5,
            length: Some(7),
        };
        let work = extracted(Ao3Scraper::new(&mut fetcher).fetch_work(1, Some(hint))?);
        assert_eq!(work.series[0].length, Some(7));
        assert_eq!(fetcher.count(&series_url(5)), 0);
        Ok(())
    }

    #[test]
    fn unreadable_series_page_leaves_length_unknown() -> Result<(), ScraperError> {
        let page = WorkPage {
            series: vec![fixtures::series_span(3, 6, "Gone", Some(2))],
            ..Default::default()
        };
        let mut fetcher = StaticFetcher::new().page(&work_url(1), fixtures::work_page(page));
        let work = extracted(Ao3Scraper::new(&mut fetcher).fetch_work(1, None)?);
        assert_eq!(work.series[0].length, None);
        assert_eq!(work.series[0].part, 3);
        assert_eq!(work.meta_title(), "A Test / Work|Gone(3/?)");
        Ok(())
    }

    #[test]
    fn series_listing_follows_pagination() -> Result<(), ScraperError> {
        let page2 = format!("{}?page=2", series_url(5));
        let mut fetcher = StaticFetcher::new()
            .page(
                &series_url(5),
                fixtures::series_page("Saga", Some(3), &[10, 20], Some("/series/5?page=2")),
            )
            .page(&page2, fixtures::series_page("Saga", Some(3), &[30], None));
        let series = Ao3Scraper::new(&mut fetcher).fetch_series(5)?;
        assert_eq!(series.title, "Saga");
        assert_eq!(series.length, Some(3));
        assert_eq!(series.work_ids, vec![10, 20, 30]);
        assert_eq!(series.hint(), SeriesHint { id: 5, length: Some(3) });
        Ok(())
    }

    #[test]
    fn self_referencing_next_link_stops() -> Result<(), ScraperError> {
        let url = format!("{}/users/someone/works", BASE);
        let mut fetcher = StaticFetcher::new().page(
            &url,
            fixtures::user_page(&[1, 2], Some("/users/someone/works")),
        );
        let user = Ao3Scraper::new(&mut fetcher).fetch_user("someone")?;
        assert_eq!(user.username, "someone");
        assert_eq!(user.work_ids, vec![1, 2]);
        assert_eq!(fetcher.count(&url), 1);
        Ok(())
    }

    #[test]
    fn restricted_index_is_an_error() {
        let mut fetcher = StaticFetcher::new().restricted(&series_url(8));
        assert!(matches!(
            Ao3Scraper::new(&mut fetcher).fetch_series(8),
            Err(ScraperError::AccessRestricted { .. })
        ));
    }

    #[test]
    fn base_url_is_normalised() {
        let mut fetcher = StaticFetcher::new();
        let scraper = Ao3Scraper::with_base(&mut fetcher, "http://127.0.0.1:9000/");
        assert_eq!(
            scraper.work_url(3),
            "http://127.0.0.1:9000/works/3?view_full_work=true&view_adult=true"
        );
        assert_eq!(scraper.user_url("x"), "http://127.0.0.1:9000/users/x/works");
    }
}
