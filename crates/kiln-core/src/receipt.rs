//! Install receipt and the stable `opt/<name>` link.
//!
//! Every successful install leaves `INSTALL_RECEIPT.json` in its prefix.
//! Later runs read it to learn the installed version of a dependency.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::context::Layout;
use crate::fsutil;

/// File name of the receipt inside a prefix.
pub const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

/// Record of how a prefix was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    /// Package name
    pub name: String,
    /// Package version
    pub version: String,
    /// Source URL as declared in the recipe
    pub source_url: String,
    /// Verified source digest
    pub sha256: String,
    /// RFC 3339 install time
    pub installed_at: String,
    /// Compiler detected on the host
    #[serde(default)]
    pub compiler: Option<String>,
    /// OS version detected on the host
    #[serde(default)]
    pub os_version: Option<String>,
    /// Flags substituted for `{toolchain_flags}`
    #[serde(default)]
    pub toolchain_flags: Vec<String>,
    /// Dependencies as `name` / `name version`
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Reason the package is not linked into shared locations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keg_only: Option<String>,
    /// Number of paths relocated into the prefix
    #[serde(default)]
    pub relocated: usize,
}

impl InstallReceipt {
    /// Write the receipt into `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, prefix: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(prefix.join(RECEIPT_FILE), json)
    }

    /// Read the receipt from `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn read(prefix: &Path) -> Result<Self> {
        let path = prefix.join(RECEIPT_FILE);
        let content =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Point `<home>/opt/<name>` at the versioned prefix.
///
/// # Errors
///
/// Fails if something other than a symlink already occupies the opt path.
pub fn link_opt(layout: &Layout) -> io::Result<()> {
    fsutil::replace_symlink(&layout.prefix, &layout.opt_prefix)
}
