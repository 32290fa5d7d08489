//! ao3dl: CLI downloader for Archive of Our Own works, series, and user listings,
//! writing PDF, EPUB, HTML, and JSON.

pub mod cli;
pub mod config;
pub mod epub;
pub mod formats;
pub mod model;
pub mod pdf;
pub mod scraper;

// Re-exports for CLI and consumers.
pub use epub::{write_epub, EpubError, EpubOptions};
pub use formats::{html_document, write_html, write_json, FormatError, OutputFormat};
pub use model::{Chapter, Series, SeriesMembership, User, Work, WorkOutcome};
pub use pdf::{render_pdf, Chrome, RenderError};
pub use scraper::{
    parse_target, Ao3Scraper, Fetch, PoliteClient, PoliteClientBuilder, ScraperError, Target,
};
