//! In-place text substitution on installed files.
//!
//! Used to point generated config fragments (`.pc`, `.pri`) at the recipe's
//! own prefix after relocation.

use std::path::PathBuf;

use kiln_schema::{MatchMode, TextPatch};
use regex::Regex;
use tracing::debug;

use crate::context::Context;
use crate::error::BuildError;
use crate::fsutil;

#[derive(Debug, Clone)]
enum Matcher {
    Literal(String),
    Regex(Regex),
}

#[derive(Debug, Clone)]
struct CompiledReplacement {
    matcher: Matcher,
    replace: String,
    all: bool,
}

impl CompiledReplacement {
    fn apply(&self, text: &str) -> String {
        match (&self.matcher, self.all) {
            (Matcher::Literal(find), true) => text.replace(find.as_str(), &self.replace),
            (Matcher::Literal(find), false) => text.replacen(find.as_str(), &self.replace, 1),
            (Matcher::Regex(re), true) => re.replace_all(text, self.replace.as_str()).into_owned(),
            (Matcher::Regex(re), false) => re.replace(text, self.replace.as_str()).into_owned(),
        }
    }
}

/// A [`TextPatch`] with templates expanded and patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledPatch {
    files: String,
    skip: Vec<glob::Pattern>,
    replacements: Vec<CompiledReplacement>,
}

impl CompiledPatch {
    /// Expand templates and compile every pattern.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Recipe`] for an unknown placeholder, a malformed
    /// skip glob or an invalid regex.
    pub fn resolve(patch: &TextPatch, ctx: &Context<'_>) -> Result<Self, BuildError> {
        let skip = patch
            .skip
            .iter()
            .map(|s| {
                glob::Pattern::new(s)
                    .map_err(|e| BuildError::Recipe(format!("invalid skip glob '{s}': {e}")))
            })
            .collect::<Result<_, _>>()?;

        let mut replacements = Vec::with_capacity(patch.replacements.len());
        for r in &patch.replacements {
            let (matcher, replace) = match r.mode {
                MatchMode::Literal => (
                    Matcher::Literal(ctx.render(&r.find)?),
                    ctx.render(&r.replace)?,
                ),
                MatchMode::Regex => (
                    Matcher::Regex(
                        Regex::new(&r.find)
                            .map_err(|e| BuildError::Recipe(format!("invalid pattern '{}': {e}", r.find)))?,
                    ),
                    // `$` in an expanded path is not a capture reference
                    ctx.render_escaped(&r.replace, |v| v.replace('$', "$$"))?,
                ),
            };
            replacements.push(CompiledReplacement {
                matcher,
                replace,
                all: r.all,
            });
        }

        Ok(Self {
            files: ctx.render(&patch.files)?,
            skip,
            replacements,
        })
    }

    /// The expanded file glob.
    pub fn files(&self) -> &str {
        &self.files
    }

    /// Apply every replacement, in order, to `text`.
    pub fn apply_to(&self, text: &str) -> String {
        self.replacements
            .iter()
            .fold(text.to_string(), |acc, r| r.apply(&acc))
    }

    fn is_skipped(&self, path: &std::path::Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.skip.iter().any(|p| p.matches(name))
    }
}

/// Files a patch touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Files whose content changed
    pub patched: Vec<PathBuf>,
    /// Files matching the glob that were left alone because of a skip rule
    pub skipped: Vec<PathBuf>,
    /// Files processed without any substitution taking effect
    pub unchanged: Vec<PathBuf>,
}

/// Apply a patch to every matching file.
///
/// # Errors
///
/// Returns [`BuildError::PatchFailed`] if the glob matches nothing or a file
/// cannot be read or written.
pub fn apply(patch: &CompiledPatch) -> Result<PatchReport, BuildError> {
    let files = fsutil::expand_glob(&patch.files)
        .map_err(|e| BuildError::Recipe(format!("invalid glob '{}': {e}", patch.files)))?;
    if files.is_empty() {
        return Err(BuildError::patch(&patch.files, "no files match"));
    }

    let mut report = PatchReport::default();
    for file in files {
        if patch.is_skipped(&file) {
            debug!(file = %file.display(), "skipped");
            report.skipped.push(file);
            continue;
        }

        let before = std::fs::read_to_string(&file).map_err(|e| BuildError::patch(&file, e))?;
        let after = patch.apply_to(&before);
        if after == before {
            debug!(file = %file.display(), "no substitution applied");
            report.unchanged.push(file);
            continue;
        }

        std::fs::write(&file, after).map_err(|e| BuildError::patch(&file, e))?;
        debug!(file = %file.display(), "patched");
        report.patched.push(file);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Layout;
    use crate::host::Host;
    use kiln_schema::Replacement;
    use tempfile::tempdir;

    fn replacement(find: &str, replace: &str, mode: MatchMode, all: bool) -> Replacement {
        Replacement {
            find: find.into(),
            replace: replace.into(),
            mode,
            all,
        }
    }

    #[test]
    fn skip_rules_leave_private_files_untouched() {
        let tmp = tempdir().unwrap();
        let mkspecs = tmp.path().join("mkspecs/modules");
        std::fs::create_dir_all(&mkspecs).unwrap();
        let public = "QT.webkit.bins = $$QT_MODULE_BIN_BASE\n";
        std::fs::write(mkspecs.join("qt_lib_webkit.pri"), public).unwrap();
        std::fs::write(mkspecs.join("qt_lib_webkitwidgets.pri"), public).unwrap();
        std::fs::write(mkspecs.join("qt_lib_webkit_private.pri"), public).unwrap();

        let host = Host::new(tmp.path());
        let layout = Layout::new(tmp.path(), "qt5-webkit", "5.7.0");
        let ctx = Context::new(&host, &layout);
        let patch = TextPatch {
            files: format!("{}/*.pri", mkspecs.display()),
            skip: vec!["*_private.pri".into()],
            replacements: vec![replacement(
                "$$QT_MODULE_BIN_BASE",
                "{opt_bin}",
                MatchMode::Literal,
                true,
            )],
        };
        let report = apply(&CompiledPatch::resolve(&patch, &ctx).unwrap()).unwrap();

        assert_eq!(report.patched.len(), 2);
        assert_eq!(report.skipped, vec![mkspecs.join("qt_lib_webkit_private.pri")]);

        let expected = format!("QT.webkit.bins = {}\n", layout.opt_prefix.join("bin").display());
        assert_eq!(
            std::fs::read_to_string(mkspecs.join("qt_lib_webkit.pri")).unwrap(),
            expected
        );
        assert_eq!(
            std::fs::read_to_string(mkspecs.join("qt_lib_webkit_private.pri")).unwrap(),
            public
        );
    }

    #[test]
    fn regex_first_only_with_capture() {
        let tmp = tempdir().unwrap();
        let pc = tmp.path().join("Qt5WebKit.pc");
        std::fs::write(&pc, "prefix=/usr/local/Cellar/qt5/5.7.0\nprefix=/second\n").unwrap();

        let host = Host::new(tmp.path());
        let layout = Layout::new(tmp.path(), "qt5-webkit", "5.7.0");
        let ctx = Context::new(&host, &layout);
        let patch = TextPatch {
            files: pc.to_string_lossy().into_owned(),
            skip: Vec::new(),
            replacements: vec![replacement(r"(?m)^(prefix=).*$", "${1}{prefix}", MatchMode::Regex, false)],
        };
        apply(&CompiledPatch::resolve(&patch, &ctx).unwrap()).unwrap();

        assert_eq!(
            std::fs::read_to_string(&pc).unwrap(),
            format!("prefix={}\nprefix=/second\n", layout.prefix.display())
        );
    }

    #[test]
    fn dollar_in_expanded_path_is_not_a_capture() {
        let tmp = tempdir().unwrap();
        let home = tmp.path().join("$1${2}home");
        std::fs::create_dir_all(&home).unwrap();
        let pc = home.join("Qt5WebKit.pc");
        std::fs::write(&pc, "prefix=/usr/local/Cellar/qt5/5.7.0\n").unwrap();

        let host = Host::new(&home);
        let layout = Layout::new(&home, "qt5-webkit", "5.7.0");
        let ctx = Context::new(&host, &layout);
        let patch = TextPatch {
            files: pc.to_string_lossy().into_owned(),
            skip: Vec::new(),
            replacements: vec![replacement(r"(?m)^(prefix=).*$", "${1}{prefix}", MatchMode::Regex, true)],
        };
        apply(&CompiledPatch::resolve(&patch, &ctx).unwrap()).unwrap();

        let text = std::fs::read_to_string(&pc).unwrap();
        assert_eq!(text, format!("prefix={}\n", layout.prefix.display()));
        assert!(text.contains("$1${2}home"));
    }

    #[test]
    fn literal_first_only() {
        let tmp = tempdir().unwrap();
        let host = Host::new(tmp.path());
        let layout = Layout::new(tmp.path(), "x", "1");
        let ctx = Context::new(&host, &layout);
        let patch = TextPatch {
            files: "unused".into(),
            skip: Vec::new(),
            replacements: vec![replacement("a", "b", MatchMode::Literal, false)],
        };
        assert_eq!(CompiledPatch::resolve(&patch, &ctx).unwrap().apply_to("aaa"), "baa");
    }

    #[test]
    fn unmatched_glob_is_patch_failure() {
        let tmp = tempdir().unwrap();
        let host = Host::new(tmp.path());
        let layout = Layout::new(tmp.path(), "x", "1");
        let ctx = Context::new(&host, &layout);
        let patch = TextPatch {
            files: format!("{}/nothing/*.pri", tmp.path().display()),
            skip: Vec::new(),
            replacements: vec![replacement("a", "b", MatchMode::Literal, true)],
        };
        let err = apply(&CompiledPatch::resolve(&patch, &ctx).unwrap()).unwrap_err();
        assert!(matches!(err, BuildError::PatchFailed { .. }));
    }

    #[test]
    fn invalid_regex_is_recipe_error() {
        let tmp = tempdir().unwrap();
        let host = Host::new(tmp.path());
        let layout = Layout::new(tmp.path(), "x", "1");
        let ctx = Context::new(&host, &layout);
        let patch = TextPatch {
            files: "x".into(),
            skip: Vec::new(),
            replacements: vec![replacement("(", "b", MatchMode::Regex, true)],
        };
        assert!(matches!(
            CompiledPatch::resolve(&patch, &ctx),
            Err(BuildError::Recipe(_))
        ));
    }
}
