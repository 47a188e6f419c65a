//! Filesystem layout under the kiln home directory.
//!
//! ```text
//! ~/.kiln/
//! ├── cellar/<name>/<version>/   # install prefixes
//! ├── opt/<name> -> cellar/...   # stable per-package symlinks
//! ├── cache/                     # downloaded sources
//! ├── logs/                      # build logs
//! └── config.toml
//! ```

use std::path::{Path, PathBuf};

use dirs::home_dir;

/// Returns the kiln home directory, or None if the user's home cannot be resolved.
///
/// `KILN_HOME` overrides the default of `~/.kiln`.
pub fn try_kiln_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("KILN_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".kiln"))
}

/// Versioned install prefixes: `<home>/cellar`
pub fn cellar_dir(home: &Path) -> PathBuf {
    home.join("cellar")
}

/// Stable per-package links: `<home>/opt`
pub fn opt_dir(home: &Path) -> PathBuf {
    home.join("opt")
}

/// Download cache: `<home>/cache`
pub fn cache_dir(home: &Path) -> PathBuf {
    home.join("cache")
}

/// Logs directory: `<home>/logs`
pub fn log_dir(home: &Path) -> PathBuf {
    home.join("logs")
}

/// Configuration file: `<home>/config.toml`
pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.toml")
}

/// Scratch space for builds and self-tests: `<home>/tmp`
pub fn tmp_dir(home: &Path) -> PathBuf {
    home.join("tmp")
}

/// Generate a build log path for a package
pub fn build_log_path(home: &Path, package: &str, version: &str) -> PathBuf {
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    log_dir(home).join(format!("build-{package}-{version}-{timestamp}.log"))
}

/// Cache location for a recipe's source archive.
pub fn cached_source_path(home: &Path, package: &str, version: &str, url: &str) -> PathBuf {
    let file = filename_from_url(url);
    let file = if file.is_empty() { "source" } else { file };
    cache_dir(home).join(format!("{package}--{version}--{file}"))
}

/// Extract the filename from a URL.
///
/// ```
/// use kiln_core::filename_from_url;
///
/// assert_eq!(filename_from_url("https://example.com/a/qtwebkit-5.7.0.tar.gz"), "qtwebkit-5.7.0.tar.gz");
/// assert_eq!(filename_from_url(""), "");
/// ```
pub fn filename_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.split('/').next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_source_is_namespaced() {
        let p = cached_source_path(
            Path::new("/k"),
            "qt5-webkit",
            "5.7.0",
            "https://download.qt.io/x/qtwebkit.tar.gz?raw=1",
        );
        assert_eq!(p, PathBuf::from("/k/cache/qt5-webkit--5.7.0--qtwebkit.tar.gz"));
    }

    #[test]
    fn build_log_lives_in_logs() {
        let p = build_log_path(Path::new("/k"), "x", "1.0");
        assert!(p.starts_with("/k/logs"));
        assert!(p.to_string_lossy().ends_with(".log"));
    }
}
