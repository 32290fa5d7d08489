//! Optional config file loading. Search order: ./ao3dl.toml, then
//! $XDG_CONFIG_HOME/ao3dl/config.toml (or ~/.config/ao3dl/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

const LOCAL_CONFIG: &str = "ao3dl.toml";

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 5).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4, 8]).
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Chrome/Chromium executable used for PDF rendering.
    pub chrome_path: Option<PathBuf>,
    /// CSS file replacing the built-in stylesheet.
    pub stylesheet: Option<PathBuf>,
    /// Formats produced when no format flag is given.
    pub default_formats: DefaultFormats,
}

/// `[default_formats]` table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DefaultFormats {
    pub pdf: bool,
    pub epub: bool,
    pub html: bool,
    pub json: bool,
}

/// Search order: (1) ./ao3dl.toml, (2) $XDG_CONFIG_HOME/ao3dl/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join(LOCAL_CONFIG)];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("ao3dl").join("config.toml"));
    }
    load_first(&paths)
}

/// First existing file among `paths`, parsed.
fn load_first(paths: &[PathBuf]) -> Result<Option<Config>, String> {
    for path in paths {
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            return load_file(path).map(Some);
        }
    }
    Ok(None)
}

fn load_file(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}
