//! kiln - run declarative build recipes
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Loads one recipe, checks it against the host and runs it: fetch, build,
//! install, move the installed files into place, fix up library references
//! and config fragments, and optionally smoke-test the result.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.kiln/
//! ├── cellar/     # Installed prefixes by name/version
//! ├── opt/        # Stable links to the current version of each package
//! ├── cache/      # Downloaded sources
//! ├── logs/       # Build logs
//! ├── tmp/        # Scratch build and test directories
//! └── config.toml # Host and dependency overrides
//! ```

pub mod cmd;
pub mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kiln_core::{Config, Host};
use kiln_schema::Recipe;

#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "kiln - run declarative build recipes")]
pub struct Cli {
    /// Show what would happen without making changes
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build and install a recipe
    Install {
        /// Path to the recipe TOML
        recipe: PathBuf,
        /// Run the recipe's self-test after installing
        #[arg(short, long)]
        test: bool,
        /// Stream build output instead of writing it to the build log
        #[arg(short, long)]
        verbose: bool,
    },
    /// Run the self-test of an installed recipe
    Test {
        /// Path to the recipe TOML
        recipe: PathBuf,
        /// Stream test output
        #[arg(short, long)]
        verbose: bool,
    },
    /// Validate a recipe and check preconditions and dependencies
    Check {
        /// Path to the recipe TOML
        recipe: PathBuf,
    },
    /// Show a recipe summary
    Info {
        /// Path to the recipe TOML
        recipe: PathBuf,
    },
    /// Compute SHA256 hash of a file (for recipe authoring)
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// The kiln home directory (`KILN_HOME` or `~/.kiln`).
pub fn kiln_home() -> Result<PathBuf> {
    kiln_core::try_kiln_home().context("Could not determine home directory; set KILN_HOME")
}

/// Load and validate a recipe file.
pub fn load_recipe(path: &Path) -> Result<Recipe> {
    tracing::debug!(path = %path.display(), "loading recipe");
    let recipe = Recipe::load(path)?;
    recipe
        .validate()
        .with_context(|| format!("Invalid recipe {}", path.display()))?;
    Ok(recipe)
}

/// Detect the host for `home`, applying `config.toml`.
pub fn detect_host(home: &Path) -> Result<Host> {
    let config = Config::load(home)?;
    Ok(Host::detect(home, &config))
}
