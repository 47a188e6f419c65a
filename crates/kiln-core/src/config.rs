//! User configuration (`<home>/config.toml`).
//!
//! ```toml
//! jobs = 8
//!
//! [host]
//! compiler = "clang"
//! os_version = "10.12"
//!
//! [dependencies.qt5]
//! prefix = "/usr/local/opt/qt5"
//! version = "5.7.0"
//! ```
//!
//! A missing file is equivalent to an empty one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use kiln_schema::{Compiler, OsVersion};
use serde::{Deserialize, Serialize};

/// Parsed `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default parallel job count (falls back to the logical CPU count).
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Overrides for detected host identity.
    #[serde(default)]
    pub host: HostOverrides,

    /// Dependencies installed outside the kiln home.
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencyOverride>,
}

/// The `[host]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostOverrides {
    /// Active compiler family
    #[serde(default)]
    pub compiler: Option<Compiler>,
    /// Host OS version
    #[serde(default)]
    pub os_version: Option<OsVersion>,
}

/// A `[dependencies.NAME]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyOverride {
    /// Install prefix of the dependency
    pub prefix: PathBuf,
    /// Installed version, if known
    #[serde(default)]
    pub version: Option<String>,
}

impl Config {
    /// Load `<home>/config.toml`, returning the default config when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(home: &Path) -> Result<Self> {
        let path = crate::paths::config_path(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}
