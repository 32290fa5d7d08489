//! CLI parsing and orchestration: expand the target into works and write the selected
//! formats for each. Errors map to exit codes.

use crate::config::{self, Config, DefaultFormats};
use crate::epub::{write_epub, EpubError, EpubOptions};
use crate::formats::{
    directory_name, file_stem, html_document, write_html, write_json, FormatError, OutputFormat,
    DEFAULT_STYLESHEET,
};
use crate::model::{Series, SeriesHint, Work, WorkOutcome};
use crate::pdf::{self, Chrome, RenderError};
use crate::scraper::{parse_target, Ao3Scraper, PoliteClient, ScraperError, Target};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use thiserror::Error;

const NO_FORMAT_MESSAGE: &str = "Select at least 1 output format: --pdf --epub --html";

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("{0}")]
    Epub(#[from] EpubError),

    #[error("{0}")]
    Format(#[from] FormatError),

    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Scraper(_) => 2,
            CliRunError::Render(_)
            | CliRunError::Epub(_)
            | CliRunError::Format(_)
            | CliRunError::OutputDir { .. } => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ao3dl")]
#[command(about = "Download Archive of Our Own works, series, or a user's works as PDF, EPUB, HTML, or JSON")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs, chrome_path, stylesheet, [default_formats]) are read from ./ao3dl.toml or the user config directory. CLI flags override config."
)]
pub struct Args {
    /// Work, series, or user URL, or a bare work id.
    pub url: Option<String>,

    /// Write a PDF (rendered with headless Chrome).
    #[arg(long)]
    pub pdf: bool,

    /// Write an EPUB 3 book.
    #[arg(long)]
    pub epub: bool,

    /// Write a standalone HTML document.
    #[arg(long)]
    pub html: bool,

    /// Write the extracted work as JSON.
    #[arg(long)]
    pub json: bool,

    /// Directory to create output folders in (overrides config; default: current directory).
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 2).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 10).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Attempts per request (overrides config; default 5).
    #[arg(long)]
    pub retries: Option<u32>,

    /// Chrome/Chromium executable for PDF rendering (overrides config).
    #[arg(long)]
    pub chrome: Option<PathBuf>,

    /// Only log warnings and errors; no progress bar.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Debug logging and the full error chain on failure.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Which outputs to write for every work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatSelection {
    pub pdf: bool,
    pub epub: bool,
    pub html: bool,
    pub json: bool,
}

impl FormatSelection {
    /// Flags when any is given; otherwise the config defaults. Empty is an input error.
    pub fn resolve(args: &Args, defaults: DefaultFormats) -> Result<Self, CliRunError> {
        let from_flags = Self {
            pdf: args.pdf,
            epub: args.epub,
            html: args.html,
            json: args.json,
        };
        let selection = if from_flags.is_empty() {
            Self {
                pdf: defaults.pdf,
                epub: defaults.epub,
                html: defaults.html,
                json: defaults.json,
            }
        } else {
            from_flags
        };
        if selection.is_empty() {
            return Err(CliRunError::InvalidInput(NO_FORMAT_MESSAGE.to_string()));
        }
        Ok(selection)
    }

    pub fn is_empty(&self) -> bool {
        !(self.pdf || self.epub || self.html || self.json)
    }

    /// A PDF is rendered for PDF output and as the source of the EPUB cover.
    pub fn needs_pdf(&self) -> bool {
        self.pdf || self.epub
    }
}

/// Everything needed to write one work's files.
#[derive(Debug)]
pub struct OutputContext {
    pub dir: PathBuf,
    pub formats: FormatSelection,
    pub stylesheet: String,
    pub chrome: Option<Chrome>,
}

impl OutputContext {
    /// Resolve output directory, stylesheet, and Chrome from args and config.
    pub fn prepare(
        args: &Args,
        config: &Config,
        formats: FormatSelection,
    ) -> Result<Self, CliRunError> {
        let dir = args
            .output_dir
            .clone()
            .or_else(|| config.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        ensure_output_dir(&dir)?;

        let stylesheet = match &config.stylesheet {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                CliRunError::InvalidInput(format!(
                    "Cannot read stylesheet {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => DEFAULT_STYLESHEET.to_string(),
        };

        let chrome = if formats.needs_pdf() {
            let explicit = args.chrome.as_deref().or(config.chrome_path.as_deref());
            match Chrome::discover(explicit) {
                Ok(chrome) => Some(chrome),
                Err(e) if !formats.pdf => {
                    tracing::warn!(error = %e, "EPUBs will be written without a cover image");
                    None
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        Ok(Self {
            dir,
            formats,
            stylesheet,
            chrome,
        })
    }
}

/// The output directory must be a directory; it is created when missing.
fn ensure_output_dir(dir: &Path) -> Result<(), CliRunError> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(CliRunError::InvalidInput(format!(
                "Output path {} is not a directory.",
                dir.display()
            )));
        }
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        CliRunError::InvalidInput(format!(
            "Cannot create output directory {}: {}",
            dir.display(),
            e
        ))
    })
}

fn build_client(args: &Args, config: &Config) -> Result<PoliteClient, CliRunError> {
    let mut builder = PoliteClient::builder();
    if let Some(secs) = args.delay.or(config.request_delay_secs) {
        builder = builder.delay_secs(secs);
    }
    if let Some(secs) = args.timeout.or(config.timeout_secs) {
        builder = builder.timeout_secs(secs);
    }
    if let Some(n) = args.retries.or(config.retry_count) {
        builder = builder.retry_count(n);
    }
    if let Some(backoff) = config.retry_backoff_secs.clone() {
        builder = builder.retry_backoff_secs(backoff);
    }
    if let Some(ua) = args.user_agent.clone().or_else(|| config.user_agent.clone()) {
        builder = builder.user_agent(ua);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let url = args.url.as_deref().ok_or_else(|| {
        CliRunError::InvalidInput(
            "Missing URL. Usage: ao3dl [--pdf] [--epub] [--html] [--json] <URL or work id>"
                .to_string(),
        )
    })?;
    let target = parse_target(url).map_err(|e| CliRunError::InvalidInput(e.to_string()))?;

    let config = config::load_config()
        .map_err(CliRunError::InvalidInput)?
        .unwrap_or_default();
    let formats = FormatSelection::resolve(args, config.default_formats)?;
    let output = OutputContext::prepare(args, &config, formats)?;

    let mut client = build_client(args, &config)?;
    let mut scraper = Ao3Scraper::new(&mut client);
    download_target(&mut scraper, &target, &output, args.quiet)
}

/// Download everything `target` names.
///
/// A single work's scrape or render failure is returned. Inside a series or user batch each
/// work's failure is logged and the batch continues.
pub fn download_target(
    scraper: &mut Ao3Scraper<'_>,
    target: &Target,
    output: &OutputContext,
    quiet: bool,
) -> Result<(), CliRunError> {
    match target {
        Target::Work(id) => {
            tracing::info!(work = id, "downloading work");
            match scraper.fetch_work(*id, None)? {
                WorkOutcome::Extracted(work) => {
                    download_work(&work, None, output)?;
                }
                WorkOutcome::Restricted { id } => warn_restricted(id),
            }
        }
        Target::Series(id) => {
            let series = scraper.fetch_series(*id)?;
            let summary = download_batch(
                scraper,
                &series.work_ids,
                Some(&series),
                output,
                quiet,
            );
            summary.log(&format!("series \"{}\"", series.title));
        }
        Target::User(name) => {
            let user = scraper.fetch_user(name)?;
            let summary = download_batch(scraper, &user.work_ids, None, output, quiet);
            summary.log(&format!("user {}", user.username));
        }
    }
    Ok(())
}

fn warn_restricted(id: u64) {
    tracing::warn!(
        work = id,
        "work {} is restricted to logged-in users; download it manually",
        id
    );
}

/// Per-batch tally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub downloaded: usize,
    pub restricted: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn log(&self, what: &str) {
        tracing::info!(
            downloaded = self.downloaded,
            restricted = self.restricted,
            failed = self.failed,
            "finished {}",
            what
        );
    }
}

fn progress_bar(len: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
        .map(|s| s.progress_chars("█▉▊▋▌▍▎▏ "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Download each work in order, isolating failures per work.
fn download_batch(
    scraper: &mut Ao3Scraper<'_>,
    work_ids: &[u64],
    series: Option<&Series>,
    output: &OutputContext,
    quiet: bool,
) -> BatchSummary {
    let hint: Option<SeriesHint> = series.map(Series::hint);
    let bar = progress_bar(work_ids.len(), quiet);
    let mut summary = BatchSummary::default();
    for (i, id) in work_ids.iter().copied().enumerate() {
        bar.set_message(format!("Work {} ({}/{})", id, i + 1, work_ids.len()));
        let result = match scraper.fetch_work(id, hint) {
            Ok(WorkOutcome::Extracted(work)) => {
                bar.suspend(|| download_work(&work, series, output)).map(|_| ())
            }
            Ok(WorkOutcome::Restricted { id }) => {
                bar.suspend(|| warn_restricted(id));
                summary.restricted += 1;
                bar.inc(1);
                continue;
            }
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => summary.downloaded += 1,
            Err(e) => {
                summary.failed += 1;
                bar.suspend(|| tracing::error!(work = id, error = %e, "work skipped"));
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    summary
}

/// Write every selected format for one work. Returns the files left on disk.
pub fn download_work(
    work: &Work,
    series: Option<&Series>,
    output: &OutputContext,
) -> Result<Vec<PathBuf>, CliRunError> {
    tracing::info!(
        work = work.id,
        chapters = work.released_chapters(),
        completed = work.completed(),
        "writing \"{}\"",
        work.title
    );
    let formats = output.formats;
    let dir = output.dir.join(directory_name(work, series));
    std::fs::create_dir_all(&dir).map_err(|e| CliRunError::OutputDir {
        path: dir.clone(),
        source: e,
    })?;
    let active = series.and_then(|s| work.membership(s.id));
    let stem = file_stem(work, active);
    let path_for = |format: OutputFormat| dir.join(format!("{}.{}", stem, format.extension()));
    let mut written = Vec::new();

    let pdf_path = path_for(OutputFormat::Pdf);
    let mut pdf_rendered = false;
    if formats.needs_pdf() {
        let html = html_document(work, &output.stylesheet);
        match (&output.chrome, formats.pdf) {
            (Some(chrome), true) => {
                pdf::render_pdf(chrome, &html, &pdf_path)?;
                pdf_rendered = true;
            }
            (Some(chrome), false) => match pdf::render_pdf(chrome, &html, &pdf_path) {
                Ok(()) => pdf_rendered = true,
                Err(e) => tracing::warn!(work = work.id, error = %e, "PDF for cover failed; EPUB will have no cover image"),
            },
            (None, true) => return Err(RenderError::ChromeNotFound.into()),
            (None, false) => {}
        }
    }

    // The intermediate PDF is removed whether or not the remaining writes succeed.
    let result = (|| -> Result<(), CliRunError> {
        if formats.html {
            let path = path_for(OutputFormat::Html);
            write_html(work, &output.stylesheet, &path)?;
            written.push(path);
        }
        if formats.json {
            let path = path_for(OutputFormat::Json);
            write_json(work, &path)?;
            written.push(path);
        }
        if formats.epub {
            let cover = if pdf_rendered {
                match pdf::thumbnail(&pdf_path) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        tracing::warn!(work = work.id, error = %e, "no thumbnail; EPUB will have no cover image");
                        None
                    }
                }
            } else {
                None
            };
            let path = path_for(OutputFormat::Epub);
            write_epub(
                work,
                &path,
                &EpubOptions {
                    series: active,
                    cover_image: cover.as_deref(),
                    stylesheet: &output.stylesheet,
                },
            )?;
            written.push(path);
        }
        Ok(())
    })();
    if pdf_rendered {
        if formats.pdf {
            written.push(pdf_path);
        } else if let Err(e) = std::fs::remove_file(&pdf_path) {
            tracing::warn!(path = %pdf_path.display(), error = %e, "could not remove intermediate PDF");
        }
    }
    result?;

    for path in &written {
        tracing::info!(path = %path.display(), "wrote");
    }
    Ok(written)
}
