//! Console implementation of [`kiln_core::Reporter`].

use std::path::Path;

use crossterm::style::Stylize;
use kiln_core::{Reporter, Stage};

use super::format_elapsed;

/// Prints progress to stdout and failures to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Reporter for ConsoleReporter {
    fn stage(&self, stage: Stage) {
        if !self.quiet {
            println!("{} {}", "==>".blue().bold(), stage.as_str().bold());
        }
    }

    fn command(&self, _stage: Stage, command_line: &str) {
        if !self.quiet {
            println!("    {}", command_line.dark_grey());
        }
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            println!("    {msg}");
        }
    }

    fn warning(&self, msg: &str) {
        eprintln!("{} {msg}", "warning:".yellow().bold());
    }

    fn failed(&self, stage: Stage, reason: &str) {
        eprintln!(
            "{} {} {reason}",
            "✘".red().bold(),
            format!("[{stage}]").red()
        );
    }

    fn done(&self, name: &str, version: &str, prefix: &Path, elapsed_secs: f64) {
        if self.quiet {
            return;
        }
        println!(
            "{} {} {} installed to {} ({})",
            "✔".green().bold(),
            name.white().bold(),
            version.dark_grey(),
            prefix.display(),
            format_elapsed(elapsed_secs)
        );
    }
}
