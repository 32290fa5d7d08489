//! PDF rendering through headless Chrome, and first-page thumbnails through `pdftoppm`.

use reqwest::Url;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;

const CHROME_EXECUTABLES: [&str; 4] = ["google-chrome", "chromium", "chromium-browser", "chrome"];
const CHROME_FLATPAKS: [&str; 2] = ["com.google.Chrome", "org.chromium.Chromium"];
/// Thumbnail resolution in DPI.
const THUMBNAIL_DPI: &str = "100";

/// Errors from PDF rendering and thumbnail extraction.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Chrome/Chromium not found. Install it or set --chrome / chrome_path.")]
    ChromeNotFound,

    #[error("Chrome not found at {0}")]
    ChromeMissingAt(PathBuf),

    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{0} not found in PATH")]
    ToolNotFound(&'static str),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} reported success but wrote no file at {path}")]
    MissingOutput { program: String, path: PathBuf },

    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// A Chrome/Chromium installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chrome {
    /// A directly executable binary.
    Binary { path: PathBuf },
    /// A Flatpak-installed application.
    Flatpak { flatpak: PathBuf, app_id: String },
}

impl Chrome {
    /// Use `explicit` when given, otherwise search PATH and then Flatpak.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, RenderError> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(Self::Binary {
                    path: path.to_path_buf(),
                });
            }
            return which::which(path)
                .map(|path| Self::Binary { path })
                .map_err(|_| RenderError::ChromeMissingAt(path.to_path_buf()));
        }
        for exe in CHROME_EXECUTABLES {
            if let Ok(path) = which::which(exe) {
                tracing::debug!(chrome = %path.display(), "found Chrome in PATH");
                return Ok(Self::Binary { path });
            }
        }
        tracing::debug!("Chrome executable not found in PATH");
        if let Ok(flatpak) = which::which("flatpak") {
            for app_id in CHROME_FLATPAKS {
                let installed = Command::new(&flatpak)
                    .args(["info", app_id])
                    .output()
                    .is_ok_and(|o| o.status.success());
                if installed {
                    tracing::debug!(app_id, "found Chrome as Flatpak");
                    return Ok(Self::Flatpak {
                        flatpak,
                        app_id: app_id.to_string(),
                    });
                }
            }
        }
        Err(RenderError::ChromeNotFound)
    }

    fn command(&self) -> Command {
        match self {
            Self::Binary { path } => Command::new(path),
            Self::Flatpak { flatpak, app_id } => {
                let mut cmd = Command::new(flatpak);
                cmd.args(["run", "--filesystem=host", app_id]);
                cmd
            }
        }
    }

    fn program(&self) -> String {
        match self {
            Self::Binary { path } => path.display().to_string(),
            Self::Flatpak { app_id, .. } => app_id.clone(),
        }
    }

    /// Print the HTML file at `input` to a PDF at `output`.
    pub fn print_to_pdf(&self, input: &Path, output: &Path) -> Result<(), RenderError> {
        let url = Url::from_file_path(input)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| input.display().to_string());
        let mut cmd = self.command();
        cmd.arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(url);
        let program = self.program();
        tracing::debug!(%program, output = %output.display(), "printing PDF");
        let result = cmd.output().map_err(|e| RenderError::Spawn {
            program: program.clone(),
            source: e,
        })?;
        check_status(&program, &result)?;
        if !output.is_file() {
            return Err(RenderError::MissingOutput {
                program,
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

fn check_status(program: &str, output: &Output) -> Result<(), RenderError> {
    if output.status.success() {
        return Ok(());
    }
    Err(RenderError::ToolFailed {
        program: program.to_string(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Write `html` to a temporary file and print it to `output`.
pub fn render_pdf(chrome: &Chrome, html: &str, output: &Path) -> Result<(), RenderError> {
    let mut input = tempfile::Builder::new()
        .prefix("ao3dl-")
        .suffix(".html")
        .tempfile()
        .map_err(|e| RenderError::Io {
            context: "creating temporary HTML",
            source: e,
        })?;
    input
        .write_all(html.as_bytes())
        .and_then(|_| input.flush())
        .map_err(|e| RenderError::Io {
            context: "writing temporary HTML",
            source: e,
        })?;
    chrome.print_to_pdf(input.path(), output)
}

/// JPEG of the first page of `pdf`, rasterised with `pdftoppm`.
pub fn thumbnail(pdf: &Path) -> Result<Vec<u8>, RenderError> {
    let pdftoppm = which::which("pdftoppm").map_err(|_| RenderError::ToolNotFound("pdftoppm"))?;
    thumbnail_with(&pdftoppm, pdf)
}

fn thumbnail_with(pdftoppm: &Path, pdf: &Path) -> Result<Vec<u8>, RenderError> {
    let dir = tempfile::tempdir().map_err(|e| RenderError::Io {
        context: "creating thumbnail directory",
        source: e,
    })?;
    let prefix = dir.path().join("thumbnail");
    let program = pdftoppm.display().to_string();
    let result = Command::new(pdftoppm)
        .args(["-jpeg", "-r", THUMBNAIL_DPI, "-f", "1", "-l", "1", "-singlefile"])
        .arg(pdf)
        .arg(&prefix)
        .output()
        .map_err(|e| RenderError::Spawn {
            program: program.clone(),
            source: e,
        })?;
    check_status(&program, &result)?;
    let jpeg = prefix.with_extension("jpg");
    if !jpeg.is_file() {
        return Err(RenderError::MissingOutput { program, path: jpeg });
    }
    std::fs::read(&jpeg).map_err(|e| RenderError::Io {
        context: "reading thumbnail",
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_chrome_is_reported() {
        let missing = Path::new("/nonexistent/ao3dl/chrome");
        assert!(matches!(
            Chrome::discover(Some(missing)),
            Err(RenderError::ChromeMissingAt(p)) if p == missing
        ));
    }

    #[test]
    fn explicit_file_is_used_as_binary() -> Result<(), Box<dyn std::error::Error>> {
        let file = tempfile::NamedTempFile::new()?;
        let chrome = Chrome::discover(Some(file.path()))?;
        assert_eq!(
            chrome,
            Chrome::Binary {
                path: file.path().to_path_buf()
            }
        );
        Ok(())
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> Result<PathBuf, std::io::Error> {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    #[cfg(unix)]
    #[test]
    fn render_passes_output_path_to_chrome() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let fake = script(
            dir.path(),
            "fake-chrome",
            r#"for arg in "$@"; do case "$arg" in --print-to-pdf=*) printf 'PDF' > "${arg#--print-to-pdf=}";; esac; done"#,
        )?;
        let out = dir.path().join("out.pdf");
        render_pdf(&Chrome::Binary { path: fake }, "<html></html>", &out)?;
        assert_eq!(std::fs::read_to_string(&out)?, "PDF");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failing_chrome_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let fake = script(dir.path(), "broken-chrome", "echo boom >&2; exit 3")?;
        let out = dir.path().join("out.pdf");
        match render_pdf(&Chrome::Binary { path: fake }, "<html></html>", &out) {
            Err(RenderError::ToolFailed { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("expected ToolFailed, got {:?}", other),
        }
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn silent_chrome_without_output_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let fake = script(dir.path(), "lazy-chrome", "exit 0")?;
        let out = dir.path().join("out.pdf");
        assert!(matches!(
            render_pdf(&Chrome::Binary { path: fake }, "<html></html>", &out),
            Err(RenderError::MissingOutput { .. })
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn thumbnail_reads_single_page_jpeg() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        // Last argument is the output prefix.
        let fake = script(
            dir.path(),
            "fake-pdftoppm",
            r#"for last in "$@"; do :; done; printf 'JPEG' > "$last.jpg""#,
        )?;
        let bytes = thumbnail_with(&fake, &dir.path().join("in.pdf"))?;
        assert_eq!(bytes, b"JPEG");
        Ok(())
    }
}
