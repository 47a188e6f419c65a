//! The recipe document (`<name>.toml`).
//!
//! A recipe is loaded once, validated, and then treated as immutable by the
//! executor. String fields may contain `{placeholders}` which are expanded
//! against the host layout at execution time; see [`crate::template`].

use std::collections::BTreeMap;
use std::path::{Component, Path};

use semver::VersionReq;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::Sha256Digest;
use crate::os::{Compiler, OsVersion};
use crate::template::{BUILTIN, DEPENDENCY_SUBDIRS, placeholders};

/// Errors that can occur while loading or validating a [`Recipe`].
#[derive(Error, Debug)]
pub enum RecipeError {
    /// The recipe file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was being read
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The document is not valid recipe TOML.
    #[error("invalid recipe: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required field is empty.
    #[error("empty field: {0}")]
    EmptyField(&'static str),

    /// The package name or version cannot be used as a directory name.
    #[error("{field} '{value}' must be a single path segment")]
    InvalidSegment {
        /// Offending field
        field: &'static str,
        /// Its value
        value: String,
    },

    /// A placeholder the executor has no value for.
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    /// A `{dep:NAME}` placeholder references an undeclared dependency.
    #[error("placeholder {{{placeholder}}} references undeclared dependency '{name}'")]
    UndeclaredDependency {
        /// The full placeholder text
        placeholder: String,
        /// The dependency name it references
        name: String,
    },

    /// The `{toolchain_flags}` argument is used but no `[[toolchain]]` is declared.
    #[error("step '{0}' uses {{toolchain_flags}} but the recipe declares no [[toolchain]] flag sets")]
    NoToolchain(String),
}

/// A complete build recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Identity and descriptive metadata.
    pub package: PackageMeta,

    /// Where to fetch the source archive from.
    pub source: Source,

    /// Packages that must already be installed.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    /// Host checks evaluated before any side effect.
    #[serde(default)]
    pub preconditions: Vec<Precondition>,

    /// Candidate flag sets for the configure step; the first match wins.
    #[serde(default)]
    pub toolchain: Vec<FlagSet>,

    /// External commands, run in declaration order.
    #[serde(default)]
    pub steps: Vec<InstallStep>,

    /// Moves/links from other prefixes into this recipe's prefix.
    #[serde(default)]
    pub relocations: Vec<FileRelocation>,

    /// Dynamic-library reference rewrites for relocated binaries.
    #[serde(default)]
    pub relink: Vec<RelinkRule>,

    /// Text substitutions in relocated config fragments.
    #[serde(default)]
    pub patches: Vec<TextPatch>,

    /// Convenience symlinks created after patching.
    #[serde(default)]
    pub links: Vec<LinkRule>,

    /// Optional smoke test.
    #[serde(default)]
    pub test: Option<SelfTest>,
}

/// The `[package]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageMeta {
    /// Package name (e.g. `qt5-webkit`)
    pub name: String,
    /// Upstream version (e.g. `5.7.0`)
    pub version: String,
    /// One-line description
    #[serde(default)]
    pub description: String,
    /// Project homepage
    #[serde(default)]
    pub homepage: Option<String>,
    /// Reason the package is not linked into the shared prefix, if any.
    #[serde(default)]
    pub keg_only: Option<String>,
}

/// The `[source]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Source {
    /// `http(s)://`, `file://` or a plain filesystem path.
    pub url: String,
    /// Expected SHA256 digest of the archive.
    pub sha256: Sha256Digest,
}

/// Whether a dependency is needed at runtime or only while building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Needed by the installed package
    #[default]
    Runtime,
    /// Needed only during the build
    Build,
}

/// A declared dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
    /// Package name
    pub name: String,
    /// Required version range, if any.
    #[serde(default)]
    pub version: Option<VersionReq>,
    /// Runtime or build-only
    #[serde(default)]
    pub kind: DependencyKind,
}

/// The predicate a [`Precondition`] evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Check {
    /// Fails if the path exists (e.g. a conflicting installation).
    PathAbsent {
        /// Path template
        path: String,
    },
    /// Fails unless the path exists.
    PathExists {
        /// Path template
        path: String,
    },
    /// Fails unless the host OS is at least this version.
    MinOsVersion {
        /// Minimum version (numeric or release name)
        version: OsVersion,
    },
    /// Fails unless the program is on `PATH`.
    Tool {
        /// Program name
        name: String,
    },
}

/// A fatal host requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Precondition {
    /// What to check.
    #[serde(flatten)]
    pub check: Check,
    /// Message shown when the check fails; a default is derived otherwise.
    #[serde(default)]
    pub message: Option<String>,
}

impl Precondition {
    /// The message reported when this precondition fails.
    pub fn failure_message(&self) -> String {
        if let Some(msg) = &self.message {
            return msg.trim().to_string();
        }
        match &self.check {
            Check::PathAbsent { path } => format!("{path} already exists"),
            Check::PathExists { path } => format!("{path} does not exist"),
            Check::MinOsVersion { version } => format!("requires OS version {version} or newer"),
            Check::Tool { name } => format!("'{name}' is required but was not found on PATH"),
        }
    }
}

/// A configure flag set guarded by host constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagSet {
    /// Only match this compiler family.
    #[serde(default)]
    pub compiler: Option<Compiler>,
    /// Only match when the OS is at least this version.
    #[serde(default)]
    pub min_os: Option<OsVersion>,
    /// Arguments substituted for `{toolchain_flags}`.
    pub args: Vec<String>,
}

impl FlagSet {
    /// Whether this flag set applies to the given host.
    ///
    /// An unknown OS version never satisfies a `min_os` constraint.
    pub fn matches(&self, compiler: Option<Compiler>, os: Option<OsVersion>) -> bool {
        let compiler_ok = self.compiler.is_none_or(|want| compiler == Some(want));
        let os_ok = self
            .min_os
            .is_none_or(|min| os.is_some_and(|have| have >= min));
        compiler_ok && os_ok
    }
}

/// Pipeline phase an [`InstallStep`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Build-system generation (`qmake`, `cmake`, `./configure`)
    Configure,
    /// Compilation
    Build,
    /// Copying build output into a prefix
    Install,
}

impl Phase {
    /// All phases, in execution order.
    pub const ALL: [Phase; 3] = [Phase::Configure, Phase::Build, Phase::Install];

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Install => "install",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One external command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallStep {
    /// Phase this step runs in.
    pub phase: Phase,
    /// Program to execute (template).
    pub program: String,
    /// Arguments (templates). An argument equal to `{toolchain_flags}`
    /// expands to the selected flag set.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory relative to the extracted source; created on demand.
    #[serde(default)]
    pub workdir: Option<String>,
    /// Parallel job limit; `1` forces a serial build.
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Extra environment variables (values are templates).
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// How a relocation is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelocationKind {
    /// Rename; the source no longer exists afterwards.
    #[default]
    Move,
    /// Leave the source and create a symlink at the destination.
    Symlink,
}

/// Moves build output into this recipe's prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRelocation {
    /// Move or symlink
    #[serde(default)]
    pub kind: RelocationKind,
    /// Source path or glob (template)
    pub from: String,
    /// Destination (template); a trailing `/` means "into this directory".
    pub to: String,
}

/// Rewrites recorded dynamic-library paths in relocated binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelinkRule {
    /// Binaries to inspect (templates, globs allowed)
    pub binaries: Vec<String>,
    /// References starting with this prefix are candidates (template).
    pub old_prefix: String,
    /// Optional regex the remainder after `old_prefix` must match.
    #[serde(default)]
    pub matching: Option<String>,
    /// Replacement prefix (template).
    pub new_prefix: String,
}

/// How a [`Replacement`] matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Plain substring
    #[default]
    Literal,
    /// Regular expression (`regex` crate syntax)
    Regex,
}

const fn default_true() -> bool {
    true
}

/// A single find/replace pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Replacement {
    /// Text or pattern to find. Literal finds are templates; regex finds are not.
    pub find: String,
    /// Replacement (template). Regex mode supports `${1}` captures.
    pub replace: String,
    /// Literal or regex
    #[serde(default)]
    pub mode: MatchMode,
    /// Replace every occurrence (`true`) or only the first.
    #[serde(default = "default_true")]
    pub all: bool,
}

/// Substitutions applied to a set of files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextPatch {
    /// Glob of files to patch (template)
    pub files: String,
    /// File-name globs to leave untouched (e.g. `*_private.pri`)
    #[serde(default)]
    pub skip: Vec<String>,
    /// Substitutions, applied in order
    pub replacements: Vec<Replacement>,
}

/// How the name of a created link is derived from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkName {
    /// Same file name as the source
    #[default]
    Name,
    /// Parent directory name without extension
    /// (`lib/QtWebKit.framework/Headers` becomes `QtWebKit`)
    ParentStem,
}

/// Creates symlinks to every match of `from` inside `into`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkRule {
    /// Source glob (template)
    pub from: String,
    /// Directory in which links are created (template)
    pub into: String,
    /// Naming scheme
    #[serde(default)]
    pub name: LinkName,
}

/// A program plus arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    /// Program (template)
    pub program: String,
    /// Arguments (templates)
    #[serde(default)]
    pub args: Vec<String>,
}

/// A file written into the self-test directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestFile {
    /// Path relative to the test directory
    pub path: String,
    /// File contents (template)
    pub content: String,
}

/// The `[test]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfTest {
    /// Sources to write
    #[serde(default)]
    pub files: Vec<TestFile>,
    /// Build commands, run in order in the test directory
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
    /// Paths (relative to the test directory) that must exist afterwards
    #[serde(default)]
    pub expect: Vec<String>,
    /// Final command that must exit with status 0
    #[serde(default)]
    pub run: Option<CommandSpec>,
    /// Seconds before `run` is killed
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Recipe {
    /// Parse and validate a recipe from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`RecipeError::Parse`] for malformed TOML or any validation
    /// error from [`Recipe::validate`].
    pub fn from_toml(text: &str) -> Result<Self, RecipeError> {
        let recipe: Recipe = toml::from_str(text)?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Read, parse and validate a recipe file.
    ///
    /// # Errors
    ///
    /// Returns [`RecipeError::Read`] if the file cannot be read, otherwise
    /// the errors of [`Recipe::from_toml`].
    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let text = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Steps belonging to `phase`, in declaration order.
    pub fn steps_in(&self, phase: Phase) -> impl Iterator<Item = &InstallStep> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// Look up a declared dependency by name.
    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    /// Check structural invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.package.name.trim().is_empty() {
            return Err(RecipeError::EmptyField("package.name"));
        }
        if self.package.version.trim().is_empty() {
            return Err(RecipeError::EmptyField("package.version"));
        }
        check_segment("package.name", &self.package.name)?;
        check_segment("package.version", &self.package.version)?;
        if self.source.url.trim().is_empty() {
            return Err(RecipeError::EmptyField("source.url"));
        }

        for step in &self.steps {
            if step.program.trim().is_empty() {
                return Err(RecipeError::EmptyField("steps.program"));
            }
            if self.toolchain.is_empty() && step.args.iter().any(|a| a == "{toolchain_flags}") {
                return Err(RecipeError::NoToolchain(step.phase.to_string()));
            }
        }

        for text in self.templates() {
            for name in placeholders(text) {
                self.check_placeholder(name, false)?;
            }
        }
        for text in self.test_templates() {
            for name in placeholders(text) {
                self.check_placeholder(name, true)?;
            }
        }

        Ok(())
    }

    /// `{testpath}` only has a value while the self-test runs.
    fn check_placeholder(&self, name: &str, in_test: bool) -> Result<(), RecipeError> {
        if BUILTIN.contains(&name) || (in_test && name == "testpath") {
            return Ok(());
        }
        let Some(rest) = name.strip_prefix("dep:") else {
            return Err(RecipeError::UnknownPlaceholder(name.to_string()));
        };
        let (dep, sub) = rest.split_once(':').unwrap_or((rest, ""));
        if self.dependency(dep).is_none() {
            return Err(RecipeError::UndeclaredDependency {
                placeholder: name.to_string(),
                name: dep.to_string(),
            });
        }
        if sub.is_empty() || DEPENDENCY_SUBDIRS.contains(&sub) {
            Ok(())
        } else {
            Err(RecipeError::UnknownPlaceholder(name.to_string()))
        }
    }

    /// Every template string outside the `[test]` table.
    fn templates(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for p in &self.preconditions {
            match &p.check {
                Check::PathAbsent { path } | Check::PathExists { path } => out.push(path),
                Check::MinOsVersion { .. } | Check::Tool { .. } => {}
            }
        }
        for s in &self.steps {
            out.push(&s.program);
            out.extend(expanded_args(&s.args));
            out.extend(s.workdir.as_deref());
            out.extend(s.env.values().map(String::as_str));
        }
        for r in &self.relocations {
            out.push(&r.from);
            out.push(&r.to);
        }
        for r in &self.relink {
            out.extend(r.binaries.iter().map(String::as_str));
            out.push(&r.old_prefix);
            out.push(&r.new_prefix);
        }
        for p in &self.patches {
            out.push(&p.files);
            for r in &p.replacements {
                if r.mode == MatchMode::Literal {
                    out.push(&r.find);
                }
                out.push(&r.replace);
            }
        }
        for l in &self.links {
            out.push(&l.from);
            out.push(&l.into);
        }
        out
    }

    /// Template strings of the `[test]` table.
    fn test_templates(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        if let Some(test) = &self.test {
            out.extend(test.files.iter().map(|f| f.content.as_str()));
            out.extend(test.expect.iter().map(String::as_str));
            for c in test.commands.iter().chain(test.run.iter()) {
                out.push(&c.program);
                out.extend(expanded_args(&c.args));
            }
        }
        out
    }
}

/// Arguments that go through placeholder expansion; a whole
/// `{toolchain_flags}` argument is spliced separately.
fn expanded_args(args: &[String]) -> impl Iterator<Item = &str> {
    args.iter()
        .map(String::as_str)
        .filter(|a| *a != "{toolchain_flags}")
}

/// `value` becomes a directory under the cellar, so it must be exactly one
/// ordinary path component.
fn check_segment(field: &'static str, value: &str) -> Result<(), RecipeError> {
    let mut parts = Path::new(value).components();
    let single = matches!(
        (parts.next(), parts.next()),
        (Some(Component::Normal(_)), None)
    );
    if single && !value.contains(['/', '\\']) && !value.starts_with('-') {
        Ok(())
    } else {
        Err(RecipeError::InvalidSegment {
            field,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[package]
name = "widget"
version = "1.0.0"

[source]
url = "https://example.com/widget-1.0.0.tar.gz"
sha256 = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"

[[dependencies]]
name = "qt5"
version = ">=5.7"

[[preconditions]]
kind = "path_absent"
path = "{dep:qt5:lib}/QtWebKit.framework"
message = "already installed"

[[preconditions]]
kind = "min_os_version"
version = "mountain_lion"

[[toolchain]]
compiler = "clang"
min_os = "mavericks"
args = ["-spec", "macx-clang"]

[[toolchain]]
args = ["-spec", "macx-g++"]

[[steps]]
phase = "configure"
program = "{dep:qt5:bin}/qmake"
args = ["../Widget.pro", "{toolchain_flags}"]
workdir = "build"

[[steps]]
phase = "install"
program = "make"
args = ["install"]
workdir = "build"
jobs = 1
"#;

    #[test]
    fn parses_minimal_recipe() {
        let recipe = Recipe::from_toml(MINIMAL).unwrap();
        assert_eq!(recipe.package.name, "widget");
        assert_eq!(recipe.preconditions.len(), 2);
        assert_eq!(
            recipe.preconditions[1].check,
            Check::MinOsVersion {
                version: OsVersion::new(10, 8, 0)
            }
        );
        assert_eq!(recipe.steps_in(Phase::Install).next().unwrap().jobs, Some(1));
        assert!(recipe.test.is_none());
    }

    #[test]
    fn flag_set_selection_rules() {
        let recipe = Recipe::from_toml(MINIMAL).unwrap();
        let clang = &recipe.toolchain[0];
        let fallback = &recipe.toolchain[1];
        let sierra = Some(OsVersion::new(10, 12, 0));
        let lion = Some(OsVersion::new(10, 8, 0));

        assert!(clang.matches(Some(Compiler::Clang), sierra));
        assert!(!clang.matches(Some(Compiler::Clang), lion));
        assert!(!clang.matches(Some(Compiler::Gcc), sierra));
        assert!(!clang.matches(Some(Compiler::Clang), None));
        assert!(fallback.matches(None, None));
    }

    #[test]
    fn rejects_undeclared_dependency_placeholder() {
        let text = MINIMAL.replace("{dep:qt5:bin}/qmake", "{dep:qt6:bin}/qmake");
        let err = Recipe::from_toml(&text).unwrap_err();
        assert!(matches!(err, RecipeError::UndeclaredDependency { ref name, .. } if name == "qt6"));
    }

    #[test]
    fn rejects_bad_checksum() {
        let text = MINIMAL.replace("b94d27b9", "nothex!!");
        assert!(matches!(Recipe::from_toml(&text), Err(RecipeError::Parse(_))));
    }

    #[test]
    fn toolchain_flags_require_flag_sets() {
        let text = MINIMAL
            .replace(
                "[[toolchain]]\ncompiler = \"clang\"\nmin_os = \"mavericks\"\nargs = [\"-spec\", \"macx-clang\"]\n",
                "",
            )
            .replace("[[toolchain]]\nargs = [\"-spec\", \"macx-g++\"]\n", "");
        let err = Recipe::from_toml(&text).unwrap_err();
        assert!(matches!(err, RecipeError::NoToolchain(_)));
    }

    #[test]
    fn name_and_version_must_be_single_segments() {
        for version in ["..", ".", "1.0/../..", "-rf", "a\\b"] {
            let text = MINIMAL.replace("version = \"1.0.0\"", &format!("version = '{version}'"));
            let err = Recipe::from_toml(&text).unwrap_err();
            assert!(
                matches!(err, RecipeError::InvalidSegment { field: "package.version", .. }),
                "{version}: {err}"
            );
        }
        let text = MINIMAL.replace("name = \"widget\"", "name = \"../widget\"");
        assert!(matches!(
            Recipe::from_toml(&text),
            Err(RecipeError::InvalidSegment { field: "package.name", .. })
        ));
        let text = MINIMAL.replace("version = \"1.0.0\"", "version = \"5.7.0-beta..1\"");
        assert!(Recipe::from_toml(&text).is_ok());
    }

    #[test]
    fn rejects_unknown_placeholders_on_load() {
        let patch = "\n[[patches]]\nfiles = \"{prefx}/*.pri\"\nreplacements = [{ find = \"a\", replace = \"b\" }]\n";
        let err = Recipe::from_toml(&format!("{MINIMAL}{patch}")).unwrap_err();
        assert!(matches!(err, RecipeError::UnknownPlaceholder(ref n) if n == "prefx"));

        let text = MINIMAL.replace("{dep:qt5:bin}/qmake", "{dep:qt5:sbin}/qmake");
        assert!(matches!(
            Recipe::from_toml(&text),
            Err(RecipeError::UnknownPlaceholder(ref n)) if n == "dep:qt5:sbin"
        ));

        let literal = "\n[[patches]]\nfiles = \"{prefix}/*.pri\"\nreplacements = [{ find = \"{opt_lbi}\", replace = \"b\" }]\n";
        assert!(Recipe::from_toml(&format!("{MINIMAL}{literal}")).is_err());

        let regex = "\n[[patches]]\nfiles = \"{prefix}/*.pc\"\nreplacements = [{ find = '^(x{2})$', replace = \"${1}{prefix}\", mode = \"regex\" }]\n";
        assert!(Recipe::from_toml(&format!("{MINIMAL}{regex}")).is_ok());
    }

    #[test]
    fn testpath_only_inside_test_table() {
        let test = "\n[test]\ncommands = [{ program = \"{testpath}/run\" }]\n";
        assert!(Recipe::from_toml(&format!("{MINIMAL}{test}")).is_ok());

        let text = MINIMAL.replace("workdir = \"build\"\njobs", "workdir = \"{testpath}\"\njobs");
        assert!(matches!(
            Recipe::from_toml(&text),
            Err(RecipeError::UnknownPlaceholder(ref n)) if n == "testpath"
        ));
    }

    #[test]
    fn misspelled_tables_and_keys_are_rejected() {
        let relocation = "\n[[relocation]]\nfrom = \"{dep:qt5:lib}/X\"\nto = \"{lib}/\"\n";
        assert!(matches!(
            Recipe::from_toml(&format!("{MINIMAL}{relocation}")),
            Err(RecipeError::Parse(_))
        ));

        let text = MINIMAL.replace("jobs = 1", "job = 1");
        assert!(matches!(Recipe::from_toml(&text), Err(RecipeError::Parse(_))));
    }

    #[test]
    fn default_failure_messages() {
        let p = Precondition {
            check: Check::Tool {
                name: "xcodebuild".to_string(),
            },
            message: None,
        };
        assert!(p.failure_message().contains("xcodebuild"));
    }
}
