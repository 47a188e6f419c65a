//! Rewriting recorded dynamic-library paths in relocated binaries.
//!
//! A Mach-O binary records the absolute path of every library it links
//! against. When the libraries are relocated after installation, those
//! references still point into the old prefix. The relinker lists the
//! references of each binary, picks the ones under the old prefix whose
//! remainder matches the rule, and rewrites them to the new prefix.
//!
//! The listing and rewriting tools sit behind [`LinkageTool`] so the selection
//! logic can be exercised without `otool`.

use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use kiln_schema::RelinkRule;
use regex::Regex;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::BuildError;
use crate::fsutil;

/// Lists and rewrites the dynamic-library references of a binary.
pub trait LinkageTool: Send + Sync {
    /// Every library path `binary` records.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ExternalToolFailed`] if the listing tool fails.
    fn references(&self, binary: &Path) -> Result<Vec<String>, BuildError>;

    /// Replace the reference `old` with `new`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ExternalToolFailed`] if the rewrite fails.
    fn change(&self, binary: &Path, old: &str, new: &str) -> Result<(), BuildError>;

    /// Called once after a binary has been modified.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn finish(&self, _binary: &Path) -> Result<(), BuildError> {
        Ok(())
    }
}

/// `otool -L` / `install_name_tool -change`, with an ad-hoc re-sign after
/// modification.
#[derive(Debug, Default, Clone, Copy)]
pub struct MachoTool;

impl MachoTool {
    fn run(step: &str, program: &str, args: &[&str], path: &Path) -> Result<String, BuildError> {
        let output = Command::new(program).args(args).arg(path).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                warn!("'{program}' not found; install the Xcode Command Line Tools");
            }
            BuildError::ExternalToolFailed {
                step: format!("{step} ({program})"),
                code: None,
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(program, path = %path.display(), %stderr, "linkage tool failed");
            return Err(BuildError::ExternalToolFailed {
                step: format!("{step} ({program})"),
                code: output.status.code(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl LinkageTool for MachoTool {
    fn references(&self, binary: &Path) -> Result<Vec<String>, BuildError> {
        if !is_macho(binary) {
            debug!(path = %binary.display(), "not a Mach-O file, skipping");
            return Ok(Vec::new());
        }
        let out = Self::run("relink", "otool", &["-L"], binary)?;
        Ok(parse_otool_output(&out))
    }

    fn change(&self, binary: &Path, old: &str, new: &str) -> Result<(), BuildError> {
        Self::run("relink", "install_name_tool", &["-change", old, new], binary).map(drop)
    }

    fn finish(&self, binary: &Path) -> Result<(), BuildError> {
        // Editing load commands invalidates the signature; arm64 refuses to
        // load unsigned code.
        let _ = Command::new("codesign")
            .args([
                "-s",
                "-",
                "--force",
                "--preserve-metadata=entitlements,requirements,flags,runtime",
            ])
            .arg(binary)
            .output();
        Ok(())
    }
}

/// Extract library paths from `otool -L` output.
///
/// The first line names the binary itself; each following indented line is
/// `<path> (compatibility version ..., current version ...)`.
pub fn parse_otool_output(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with(['\t', ' ']))
        .map(|line| {
            let line = line.trim();
            line.rsplit_once(" (").map_or(line, |(path, _)| path).to_string()
        })
        .filter(|path| !path.is_empty())
        .collect()
}

/// Checks if a file is a Mach-O binary (magic bytes).
fn is_macho(path: &Path) -> bool {
    use std::io::Read;
    let Ok(mut f) = fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_err() {
        return false;
    }
    // feedface, feedfacf, cafebabe (universal) and their byte-swapped forms
    matches!(
        magic,
        [0xfe, 0xed, 0xfa, 0xce]
            | [0xfe, 0xed, 0xfa, 0xcf]
            | [0xcf, 0xfa, 0xed, 0xfe]
            | [0xce, 0xfa, 0xed, 0xfe]
            | [0xca, 0xfe, 0xba, 0xbe]
    )
}

/// Makes a file owner-writable and restores its original mode on drop.
#[derive(Debug)]
struct WritableGuard {
    path: PathBuf,
    original: Option<Permissions>,
}

impl WritableGuard {
    fn new(path: &Path) -> Result<Self, BuildError> {
        let perms = fs::metadata(path)
            .map_err(|e| BuildError::io(format!("cannot stat {}", path.display()), e))?
            .permissions();

        let mode = perms.mode();
        let original = if mode & 0o200 == 0 {
            fs::set_permissions(path, Permissions::from_mode(mode | 0o200))
                .map_err(|e| BuildError::io(format!("cannot make {} writable", path.display()), e))?;
            Some(perms)
        } else {
            None
        };

        Ok(Self {
            path: path.to_path_buf(),
            original,
        })
    }
}

impl Drop for WritableGuard {
    fn drop(&mut self) {
        if let Some(perms) = self.original.take() {
            if let Err(e) = fs::set_permissions(&self.path, perms) {
                warn!(path = %self.path.display(), "failed to restore mode: {e}");
            }
        }
    }
}

/// A relink rule with templates expanded and globs resolved.
#[derive(Debug, Clone)]
pub struct ResolvedRelink {
    /// Binaries to inspect
    pub binaries: Vec<PathBuf>,
    /// Prefix of the references to rewrite
    pub old_prefix: String,
    /// Other spellings of `old_prefix`, such as its target when it is a symlink
    pub aliases: Vec<String>,
    /// Constraint on the part after `old_prefix`
    pub matching: Option<Regex>,
    /// Replacement prefix
    pub new_prefix: String,
}

impl ResolvedRelink {
    /// Expand templates, compile the pattern and resolve binary globs.
    ///
    /// With `require_binaries` set, a binary pattern matching nothing is an
    /// error; dry runs pass `false` since nothing is installed yet.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Recipe`] for a bad template, glob or regex, and
    /// [`BuildError::RelocationFailed`] for a missing binary.
    pub fn resolve(
        rule: &RelinkRule,
        ctx: &Context<'_>,
        require_binaries: bool,
    ) -> Result<Self, BuildError> {
        let matching = rule
            .matching
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| BuildError::Recipe(format!("invalid relink pattern: {e}")))?;

        let mut binaries = Vec::new();
        for pattern in &rule.binaries {
            let pattern = ctx.render(pattern)?;
            let found = fsutil::expand_glob(&pattern)
                .map_err(|e| BuildError::Recipe(format!("invalid glob '{pattern}': {e}")))?;
            if found.is_empty() {
                if require_binaries {
                    return Err(BuildError::relocation(&pattern, "binary to relink not found"));
                }
                binaries.push(PathBuf::from(pattern));
            }
            binaries.extend(found);
        }

        let old_prefix = ctx.render(&rule.old_prefix)?;
        let aliases = canonical_alias(&old_prefix).into_iter().collect();

        Ok(Self {
            binaries,
            old_prefix,
            aliases,
            matching,
            new_prefix: ctx.render(&rule.new_prefix)?,
        })
    }

    /// The rewritten form of `reference`, if this rule applies to it.
    pub fn rewrite(&self, reference: &str) -> Option<String> {
        if reference.starts_with(&self.new_prefix) {
            return None;
        }
        let rest = std::iter::once(&self.old_prefix)
            .chain(&self.aliases)
            .find_map(|prefix| reference.strip_prefix(prefix.as_str()))?;
        if let Some(re) = &self.matching {
            if !re.is_match(rest) {
                return None;
            }
        }
        Some(format!("{}{rest}", self.new_prefix))
    }
}

/// Binaries record the resolved install name, so a prefix reached through
/// an `opt/` symlink is also matched by the directory it points at.
fn canonical_alias(prefix: &str) -> Option<String> {
    let canonical = fs::canonicalize(prefix).ok()?;
    let canonical = canonical.to_str()?.trim_end_matches('/').to_string();
    (canonical != prefix.trim_end_matches('/')).then(|| {
        debug!(%prefix, %canonical, "relink prefix alias");
        canonical
    })
}

/// One rewritten reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Binary that was modified
    pub binary: PathBuf,
    /// Previous reference
    pub old: String,
    /// New reference
    pub new: String,
}

/// Rewrite the matching references of every binary in `rule`.
///
/// Binaries with nothing to rewrite are not touched at all, so running the
/// same rule twice changes nothing the second time.
///
/// # Errors
///
/// Returns the first tool or permission error.
pub fn relink(tool: &dyn LinkageTool, rule: &ResolvedRelink) -> Result<Vec<Rewrite>, BuildError> {
    let mut rewrites = Vec::new();

    for binary in &rule.binaries {
        let pending: Vec<(String, String)> = tool
            .references(binary)?
            .into_iter()
            .filter_map(|old| rule.rewrite(&old).map(|new| (old, new)))
            .collect();

        if pending.is_empty() {
            debug!(binary = %binary.display(), "no references to rewrite");
            continue;
        }

        let guard = WritableGuard::new(binary)?;
        for (old, new) in pending {
            debug!(binary = %binary.display(), %old, %new, "change");
            tool.change(binary, &old, &new)?;
            rewrites.push(Rewrite {
                binary: binary.clone(),
                old,
                new,
            });
        }
        tool.finish(binary)?;
        drop(guard);
    }

    Ok(rewrites)
}
