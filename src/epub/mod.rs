//! EPUB 3 writer. Consumes an extracted `Work` and writes mimetype, container, OPF, nav/NCX,
//! the cover-metadata page, one XHTML file per chapter, the stylesheet, and an optional cover image.

use crate::formats::{cover_block, html_escape_attr};
use crate::model::{SeriesMembership, Work};
use chrono::Utc;
use scraper::Html;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";
const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";
const STYLE_HREF: &str = "style/nav.css";
const COVER_IMAGE_HREF: &str = "images/thumbnail.jpg";
const DEFAULT_LANGUAGE: &str = "en";

/// Errors from the EPUB writer.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Failed to create EPUB file: {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

/// Extra inputs for one EPUB.
#[derive(Debug, Clone, Copy)]
pub struct EpubOptions<'a> {
    /// Series being downloaded; recorded as the book's collection.
    pub series: Option<&'a SeriesMembership>,
    /// JPEG thumbnail of the PDF's first page.
    pub cover_image: Option<&'a [u8]>,
    pub stylesheet: &'a str,
}

/// Write `work` to an EPUB 3 file at `path`.
pub fn write_epub(work: &Work, path: &Path, options: &EpubOptions<'_>) -> Result<(), EpubError> {
    let file = std::fs::File::create(path).map_err(|e| EpubError::CreateFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(file);

    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Mimetype first and uncompressed.
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML)?;

    write_opf(work, options, &mut zip, options_deflate)?;
    write_nav_xhtml(work, &mut zip, options_deflate)?;
    write_ncx(work, &mut zip, options_deflate)?;

    zip.start_file(format!("{}{}", OEBPS_PREFIX, STYLE_HREF), options_deflate)?;
    zip.write_all(options.stylesheet.as_bytes())?;

    write_page(
        &mut zip,
        options_deflate,
        "cover_meta.xhtml",
        &html_escape_attr(&work.title),
        language(work),
        &cover_block(work),
    )?;
    for (i, chapter) in work.chapters.iter().enumerate() {
        write_page(
            &mut zip,
            options_deflate,
            &chapter_file(i),
            &html_escape_attr(&chapter.title),
            language(work),
            &chapter.content,
        )?;
    }

    if let Some(image) = options.cover_image {
        zip.start_file(format!("{}{}", OEBPS_PREFIX, COVER_IMAGE_HREF), options_stored)?;
        zip.write_all(image)?;
    }

    zip.finish()?;
    tracing::debug!(path = %path.display(), chapters = work.chapters.len(), "EPUB written");
    Ok(())
}

fn language(work: &Work) -> &str {
    work.language_code
        .as_deref()
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_LANGUAGE)
}

/// `chap_001.xhtml` for the first chapter.
fn chapter_file(i: usize) -> String {
    format!("chap_{:03}.xhtml", i + 1)
}

fn chapter_id(i: usize) -> String {
    format!("chap_{:03}", i + 1)
}

/// Plain text of summary markup.
fn summary_text(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn write_opf(
    work: &Work,
    options: &EpubOptions<'_>,
    zip: &mut ZipWriter<impl Write + Seek>,
    file_options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut metadata = String::new();
    metadata.push_str(&format!(
        "    <dc:identifier id=\"book-id\">{}</dc:identifier>\n",
        work.id
    ));
    metadata.push_str(&format!("    <dc:title>{}</dc:title>\n", html_escape_attr(&work.title)));
    metadata.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        html_escape_attr(language(work))
    ));
    metadata.push_str(&format!(
        "    <dc:creator id=\"creator\">{}</dc:creator>\n",
        html_escape_attr(&work.author)
    ));
    metadata.push_str(&format!(
        "    <dc:date>{}</dc:date>\n",
        work.published.format("%Y-%m-%d")
    ));
    metadata.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    ));
    let subjects = work
        .fandoms
        .iter()
        .flatten()
        .chain(work.tags.iter().flatten());
    for subject in subjects {
        metadata.push_str(&format!("    <dc:subject>{}</dc:subject>\n", html_escape_attr(subject)));
    }
    if let Some(summary) = work.summary.as_deref().map(summary_text) {
        if !summary.is_empty() {
            metadata.push_str(&format!(
                "    <dc:description>{}</dc:description>\n",
                html_escape_attr(&summary)
            ));
        }
    }
    if let Some(series) = options.series {
        let name = html_escape_attr(&series.title);
        metadata.push_str(&format!(
            "    <meta property=\"belongs-to-collection\" id=\"series\">{}</meta>\n",
            name
        ));
        metadata.push_str("    <meta refines=\"#series\" property=\"collection-type\">series</meta>\n");
        metadata.push_str(&format!(
            "    <meta refines=\"#series\" property=\"group-position\">{}</meta>\n",
            series.part
        ));
        metadata.push_str(&format!(
            "    <meta name=\"calibre:series\" content=\"{}\"/>\n",
            name
        ));
        metadata.push_str(&format!(
            "    <meta name=\"calibre:series_index\" content=\"{}\"/>\n",
            series.part
        ));
    }
    if options.cover_image.is_some() {
        metadata.push_str("    <meta name=\"cover\" content=\"cover-img\"/>\n");
    }

    let mut manifest = String::from(
        r#"    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="style_nav" href="style/nav.css" media-type="text/css"/>
    <item id="cover_meta" href="cover_meta.xhtml" media-type="application/xhtml+xml"/>
"#,
    );
    if options.cover_image.is_some() {
        manifest.push_str(&format!(
            "    <item id=\"cover-img\" href=\"{}\" media-type=\"image/jpeg\" properties=\"cover-image\"/>\n",
            COVER_IMAGE_HREF
        ));
    }
    let mut spine = String::from("    <itemref idref=\"cover_meta\"/>\n");
    for i in 0..work.chapters.len() {
        manifest.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            chapter_id(i),
            chapter_file(i)
        ));
        spine.push_str(&format!("    <itemref idref=\"{}\"/>\n", chapter_id(i)));
    }

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
{metadata}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
        metadata = metadata,
        manifest = manifest,
        spine = spine
    );

    zip.start_file(format!("{}content.opf", OEBPS_PREFIX), file_options)?;
    zip.write_all(opf.as_bytes())?;
    Ok(())
}

fn write_nav_xhtml(
    work: &Work,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut nav_links = String::new();
    for (i, ch) in work.chapters.iter().enumerate() {
        nav_links.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            chapter_file(i),
            html_escape_attr(&ch.title)
        ));
    }
    let nav = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>{}</title>
  <link rel="stylesheet" type="text/css" href="{}"/>
</head>
<body>
  <nav epub:type="toc">
    <ol>
      <li><a href="cover_meta.xhtml">{}</a></li>
{}    </ol>
  </nav>
</body>
</html>
"#,
        html_escape_attr(&work.title),
        STYLE_HREF,
        html_escape_attr(&work.title),
        nav_links
    );
    zip.start_file(format!("{}nav.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(nav.as_bytes())?;
    Ok(())
}

fn write_ncx(
    work: &Work,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut nav_points = String::new();
    for (i, ch) in work.chapters.iter().enumerate() {
        nav_points.push_str(&format!(
            r#"    <navPoint id="navpoint-{0}" playOrder="{0}">
      <navLabel><text>{1}</text></navLabel>
      <content src="{2}"/>
    </navPoint>
"#,
            i + 1,
            html_escape_attr(&ch.title),
            chapter_file(i)
        ));
    }
    let ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{}  </navMap>
</ncx>
"#,
        work.id,
        html_escape_attr(&work.title),
        nav_points
    );
    zip.start_file(format!("{}toc.ncx", OEBPS_PREFIX), options)?;
    zip.write_all(ncx.as_bytes())?;
    Ok(())
}

/// One XHTML content document linked to the stylesheet.
fn write_page(
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
    file_name: &str,
    title: &str,
    lang: &str,
    body: &str,
) -> Result<(), EpubError> {
    let lang = html_escape_attr(lang);
    let page = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" lang="{lang}" xml:lang="{lang}">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="{style}"/>
</head>
<body class="wrapper">
{body}
</body>
</html>
"#,
        lang = lang,
        title = title,
        style = STYLE_HREF,
        body = body
    );
    zip.start_file(format!("{}{}", OEBPS_PREFIX, file_name), options)?;
    zip.write_all(page.as_bytes())?;
    Ok(())
}
