//! Document assembly and the single-file writers (HTML, JSON).
//! Also owns output naming: directory and file stem for a work.

use crate::model::{Content, Series, SeriesMembership, Work};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Stylesheet embedded in HTML/PDF output and packaged into EPUBs.
pub const DEFAULT_STYLESHEET: &str = include_str!("../assets/style.css");

/// Page break emitted after the cover block of single-chapter works.
const PAGE_BREAK: &str = r#"<div style="page-break-after: always"></div>"#;

/// Output format selector for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Pdf,
    Epub,
    Html,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Epub => "epub",
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
        }
    }
}

/// Errors from the single-file writers.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize work to {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Escape text for HTML/XHTML text and double-quoted attribute values.
pub(crate) fn html_escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Output directory name: the series title when downloading a series, else the work title.
pub fn directory_name(work: &Work, series: Option<&Series>) -> String {
    match series {
        Some(s) => path_component(&s.title),
        None => path_component(&work.title),
    }
}

/// `/` becomes `-`; a name that is empty or only dots becomes "Unknown".
fn path_component(name: &str) -> String {
    let name = name.replace('/', "-");
    if name.trim().trim_matches('.').is_empty() {
        return "Unknown".to_string();
    }
    name
}

/// File stem `{prefix}{author} - {title}`, where the prefix orders works within the active series.
pub fn file_stem(work: &Work, active: Option<&SeriesMembership>) -> String {
    let prefix = active.map(series_prefix).unwrap_or_default();
    format!("{}{} - {}", prefix, work.author, path_component(&work.title))
}

/// `(03 of 12) `, or `(3) ` when the series length is unknown.
fn series_prefix(membership: &SeriesMembership) -> String {
    match membership.length {
        Some(length) => {
            let width = length.to_string().len();
            format!("({:0width$} of {}) ", membership.part, length, width = width)
        }
        None => format!("({}) ", membership.part),
    }
}

/// One labelled metadata line; empty when the value is absent.
pub(crate) fn compile_tag(label: &str, value: Option<Content>) -> String {
    match value {
        Some(v) => format!(
            r#"<div><span class="meta tag">{}:</span> {}</div>"#,
            label,
            v.render()
        ),
        None => String::new(),
    }
}

fn joined(values: &Option<Vec<String>>) -> Option<Content> {
    values.as_ref().map(|v| Content::Text(v.join(";\t")))
}

fn text(value: Option<String>) -> Option<Content> {
    value.map(Content::Text)
}

fn series_list(series: &[SeriesMembership]) -> String {
    if series.is_empty() {
        return String::new();
    }
    let items: String = series
        .iter()
        .map(|s| {
            let of = s.length.map(|l| format!(" of {}", l)).unwrap_or_default();
            format!(
                r#"<li class="entry"><span class="name">{}</span> - Part {}{}</li>"#,
                Content::Text(s.title.clone()).render(),
                s.part,
                of
            )
        })
        .collect();
    format!(r#"<div class="series"><ul>{}</ul></div><hr/>"#, items)
}

/// Cover block: heading, series list, labelled metadata, and summary.
pub fn cover_block(work: &Work) -> String {
    let mut out = String::new();
    out.push_str("<hr/>");
    out.push_str(&format!(
        r#"<div class="title">{}</div><div class="author">{}</div>"#,
        Content::Text(work.title.clone()).render(),
        Content::Text(work.author.clone()).render()
    ));
    out.push_str("<hr/><hr/>");

    out.push_str(r#"<div class="meta">"#);
    out.push_str(&series_list(&work.series));
    let lines = [
        ("Rating", text(work.rating.clone())),
        ("Archive Warning", text(work.warning.clone())),
        ("Category", joined(&work.category)),
        ("Fandoms", joined(&work.fandoms)),
        ("Characters", joined(&work.characters)),
        ("Relationships", joined(&work.relationships)),
        ("Language", text(work.language.clone())),
        (
            "Published",
            text(Some(work.published.format("%d %b %Y").to_string())),
        ),
        (
            "Updated",
            text(work.updated.map(|d| d.format("%d %b %Y").to_string())),
        ),
        ("Words", text(work.words.map(|w| w.to_string()))),
        ("Tags", joined(&work.tags)),
        ("Chapters", text(Some(work.progress.to_string()))),
    ];
    for (label, value) in lines {
        out.push_str(&compile_tag(label, value));
    }
    out.push_str("</div>");

    if let Some(summary) = &work.summary {
        out.push_str(&format!(
            r#"<hr/><div class="summary module"><h3 class="heading">Summary:</h3><blockquote class="userstuff">{}</blockquote></div>"#,
            Content::Markup(summary.clone()).render()
        ));
    }
    out
}

/// Complete standalone HTML document for a work: head metadata, stylesheet, cover, chapters.
pub fn html_document(work: &Work, stylesheet: &str) -> String {
    let description = work
        .fandoms
        .as_ref()
        .map(|f| f.join(";"))
        .unwrap_or_default();
    let keywords = work.tags.as_ref().map(|t| t.join(";")).unwrap_or_default();
    let lang = work.language_code.as_deref().unwrap_or("en");

    let mut doc = String::new();
    doc.push_str("<!DOCTYPE html>\n");
    doc.push_str(&format!("<html lang=\"{}\">\n<head>\n", html_escape_attr(lang)));
    doc.push_str("<meta charset=\"utf-8\"/>\n");
    doc.push_str(&format!(
        "<title>{}</title>\n",
        Content::Text(work.meta_title()).render()
    ));
    doc.push_str(&format!(
        "<meta name=\"author\" content=\"{}\"/>\n",
        html_escape_attr(&work.author)
    ));
    doc.push_str(&format!(
        "<meta name=\"description\" content=\"{}\"/>\n",
        html_escape_attr(&description)
    ));
    doc.push_str(&format!(
        "<meta name=\"keywords\" content=\"{}\"/>\n",
        html_escape_attr(&keywords)
    ));
    doc.push_str(&format!("<style>\n{}\n</style>\n", stylesheet));
    doc.push_str("</head>\n<body class=\"wrapper\">\n");
    doc.push_str(&cover_block(work));
    doc.push('\n');
    if work.is_single_chapter() {
        doc.push_str(PAGE_BREAK);
        doc.push('\n');
    }
    for chapter in &work.chapters {
        doc.push_str(&chapter.content);
        doc.push('\n');
    }
    doc.push_str("</body>\n</html>\n");
    doc
}

fn create(path: &Path) -> Result<BufWriter<File>, FormatError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| FormatError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write the standalone HTML document.
pub fn write_html(work: &Work, stylesheet: &str, path: &Path) -> Result<(), FormatError> {
    let mut f = create(path)?;
    f.write_all(html_document(work, stylesheet).as_bytes())
        .and_then(|_| f.flush())
        .map_err(|e| FormatError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write the extracted work as pretty-printed JSON.
pub fn write_json(work: &Work, path: &Path) -> Result<(), FormatError> {
    let mut f = create(path)?;
    serde_json::to_writer_pretty(&mut f, work).map_err(|e| FormatError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    f.flush().map_err(|e| FormatError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::sample_work;
    use crate::model::ChapterProgress;

    fn membership(part: u32, length: Option<u32>) -> SeriesMembership {
        SeriesMembership {
            id: 3,
            title: "Cycle".to_string(),
            part,
            length,
        }
    }

    #[test]
    fn file_stem_without_series() {
        assert_eq!(file_stem(&sample_work(), None), "writer - Night-Day");
    }

    #[test]
    fn file_stem_pads_part_to_length_width() {
        let work = sample_work();
        assert_eq!(
            file_stem(&work, Some(&membership(3, Some(12)))),
            "(03 of 12) writer - Night-Day"
        );
        assert_eq!(
            file_stem(&work, Some(&membership(7, Some(7)))),
            "(7 of 7) writer - Night-Day"
        );
        assert_eq!(
            file_stem(&work, Some(&membership(4, Some(150)))),
            "(004 of 150) writer - Night-Day"
        );
    }

    #[test]
    fn file_stem_with_unknown_length() {
        assert_eq!(
            file_stem(&sample_work(), Some(&membership(2, None))),
            "(2) writer - Night-Day"
        );
    }

    #[test]
    fn dot_titles_stay_inside_output_dir() {
        let mut work = sample_work();
        for title in ["..", ".", "", " . "] {
            work.title = title.to_string();
            assert_eq!(directory_name(&work, None), "Unknown");
            assert_eq!(file_stem(&work, None), "writer - Unknown");
        }
        work.title = "...And Then".to_string();
        assert_eq!(directory_name(&work, None), "...And Then");
        let series = Series {
            id: 1,
            title: "..".to_string(),
            length: None,
            work_ids: Vec::new(),
        };
        assert_eq!(directory_name(&work, Some(&series)), "Unknown");
    }

    #[test]
    fn directory_prefers_series_title() {
        let work = sample_work();
        assert_eq!(directory_name(&work, None), "Night-Day");
        let series = Series {
            id: 3,
            title: "Day/Night Cycle".to_string(),
            length: Some(2),
            work_ids: vec![777],
        };
        assert_eq!(directory_name(&work, Some(&series)), "Day-Night Cycle");
    }

    #[test]
    fn compile_tag_omits_absent_values() {
        assert_eq!(compile_tag("Rating", None), "");
        assert_eq!(
            compile_tag("Tags", joined(&Some(vec!["a".into(), "b".into()]))),
            "<div><span class=\"meta tag\">Tags:</span> a;\tb</div>"
        );
    }

    #[test]
    fn cover_block_lists_metadata_in_order() {
        let cover = cover_block(&sample_work());
        let rating = cover.find("Rating:").unwrap();
        let fandoms = cover.find("Fandoms:").unwrap();
        let published = cover.find("Published:").unwrap();
        let chapters = cover.find("Chapters:").unwrap();
        assert!(rating < fandoms && fandoms < published && published < chapters);
        assert!(cover.contains("09 May 2023"));
        assert!(cover.contains("Alpha;\tBeta"));
        assert!(cover.contains("F/M"));
        assert!(cover.contains("Characters:</span> </div>"));
        assert!(!cover.contains("Relationships:"));
        assert!(!cover.contains("Updated:"));
        assert!(cover.contains("<p>Summary & more.</p>"));
    }

    #[test]
    fn cover_block_shows_series_parts() {
        let mut work = sample_work();
        work.series = vec![membership(2, Some(5)), {
            let mut m = membership(1, None);
            m.title = "Other".to_string();
            m
        }];
        let cover = cover_block(&work);
        assert!(cover.contains(r#"<span class="name">Cycle</span> - Part 2 of 5"#));
        assert!(cover.contains(r#"<span class="name">Other</span> - Part 1</li>"#));
    }

    #[test]
    fn html_document_head_and_chapters() {
        let doc = html_document(&sample_work(), "body{}");
        assert!(doc.contains("<title>Night/Day</title>"));
        assert!(doc.contains(r#"<meta name="author" content="writer"/>"#));
        assert!(doc.contains(r#"<meta name="description" content="Alpha;Beta"/>"#));
        assert!(doc.contains(r#"<meta name="keywords" content="Fluff;Slow Burn"/>"#));
        assert!(doc.contains("body{}"));
        assert!(!doc.contains(PAGE_BREAK));
        let one = doc.find("One.").unwrap();
        let two = doc.find("Two.").unwrap();
        assert!(doc.find("Summary:").unwrap() < one && one < two);
    }

    #[test]
    fn single_chapter_document_breaks_after_cover() {
        let mut work = sample_work();
        work.progress = ChapterProgress::new(1, Some(1));
        work.chapters.truncate(1);
        let doc = html_document(&work, "");
        let brk = doc.find(PAGE_BREAK).unwrap();
        assert!(doc.find("Summary:").unwrap() < brk);
        assert!(brk < doc.find("One.").unwrap());
    }

    #[test]
    fn titles_are_escaped() {
        let mut work = sample_work();
        work.title = "<b>Bold</b> & Co".to_string();
        let doc = html_document(&work, "");
        assert!(doc.contains("<title>&lt;b&gt;Bold&lt;/b&gt; &amp; Co</title>"));
        assert!(!doc.contains("<b>Bold</b>"));
    }

    #[test]
    fn write_html_and_json_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let work = sample_work();
        let html_path = dir.path().join("w.html");
        write_html(&work, DEFAULT_STYLESHEET, &html_path)?;
        let html = std::fs::read_to_string(&html_path)?;
        assert!(html.starts_with("<!DOCTYPE html>"));

        let json_path = dir.path().join("w.json");
        write_json(&work, &json_path)?;
        let back: Work = serde_json::from_str(&std::fs::read_to_string(&json_path)?)?;
        assert_eq!(back.id, 777);
        assert_eq!(back.chapters.len(), 2);
        Ok(())
    }

    #[test]
    fn write_to_missing_directory_is_io_error() {
        let path = Path::new("/nonexistent-ao3dl-dir/x.html");
        assert!(matches!(
            write_html(&sample_work(), "", path),
            Err(FormatError::Io { .. })
        ));
    }
}
