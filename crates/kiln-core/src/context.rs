//! Install layout and `{placeholder}` resolution.

use std::path::{Path, PathBuf};

use kiln_schema::template;
use kiln_schema::{FlagSet, Recipe};

use crate::error::BuildError;
use crate::host::Host;

/// Where a recipe installs: its versioned prefix and its stable opt link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Package name
    pub name: String,
    /// Package version
    pub version: String,
    /// `<home>/cellar/<name>/<version>`
    pub prefix: PathBuf,
    /// `<home>/opt/<name>`
    pub opt_prefix: PathBuf,
}

impl Layout {
    /// Layout for `name`/`version` under `home`.
    pub fn new(home: &Path, name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            prefix: crate::paths::cellar_dir(home).join(name).join(version),
            opt_prefix: crate::paths::opt_dir(home).join(name),
        }
    }

    /// Layout for a recipe.
    pub fn for_recipe(home: &Path, recipe: &Recipe) -> Self {
        Self::new(home, &recipe.package.name, &recipe.package.version)
    }

    /// `<prefix>/lib`
    pub fn lib(&self) -> PathBuf {
        self.prefix.join("lib")
    }

    /// `<prefix>/bin`
    pub fn bin(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    /// `<prefix>/include`
    pub fn include(&self) -> PathBuf {
        self.prefix.join("include")
    }

    /// `<prefix>/libexec`
    pub fn libexec(&self) -> PathBuf {
        self.prefix.join("libexec")
    }

    /// `<prefix>/Frameworks`
    pub fn frameworks(&self) -> PathBuf {
        self.prefix.join("Frameworks")
    }
}

/// Pick the first flag set whose constraints match the host.
///
/// Returns an empty list when the recipe declares none or none match.
pub fn select_toolchain_flags(flag_sets: &[FlagSet], host: &Host) -> Vec<String> {
    flag_sets
        .iter()
        .find(|set| set.matches(host.compiler(), host.os_version()))
        .map(|set| set.args.clone())
        .unwrap_or_default()
}

/// Resolves recipe templates against a host and layout.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    host: &'a Host,
    layout: &'a Layout,
    toolchain_flags: Vec<String>,
    testpath: Option<PathBuf>,
}

impl<'a> Context<'a> {
    /// Context with no toolchain flags and no test directory.
    pub fn new(host: &'a Host, layout: &'a Layout) -> Self {
        Self {
            host,
            layout,
            toolchain_flags: Vec::new(),
            testpath: None,
        }
    }

    /// Set the flags substituted for a `{toolchain_flags}` argument.
    pub fn with_toolchain_flags(mut self, flags: Vec<String>) -> Self {
        self.toolchain_flags = flags;
        self
    }

    /// Set the directory `{testpath}` resolves to.
    pub fn with_testpath(mut self, testpath: impl Into<PathBuf>) -> Self {
        self.testpath = Some(testpath.into());
        self
    }

    /// The host this context resolves against.
    pub fn host(&self) -> &'a Host {
        self.host
    }

    /// The layout this context resolves against.
    pub fn layout(&self) -> &'a Layout {
        self.layout
    }

    /// The selected toolchain flags.
    pub fn toolchain_flags(&self) -> &[String] {
        &self.toolchain_flags
    }

    fn lookup(&self, name: &str) -> Option<String> {
        let l = self.layout;
        let path = match name {
            "name" => return Some(l.name.clone()),
            "version" => return Some(l.version.clone()),
            "jobs" => return Some(self.host.jobs().to_string()),
            "home" => self.host.home().to_path_buf(),
            "prefix" => l.prefix.clone(),
            "lib" => l.lib(),
            "bin" => l.bin(),
            "include" => l.include(),
            "libexec" => l.libexec(),
            "frameworks" => l.frameworks(),
            "opt_prefix" => l.opt_prefix.clone(),
            "opt_lib" => l.opt_prefix.join("lib"),
            "opt_bin" => l.opt_prefix.join("bin"),
            "opt_libexec" => l.opt_prefix.join("libexec"),
            "testpath" => self.testpath.clone()?,
            other => {
                let rest = other.strip_prefix("dep:")?;
                let (dep, sub) = rest.split_once(':').unwrap_or((rest, ""));
                let prefix = self.host.dependency_prefix(dep);
                match sub {
                    "" => prefix,
                    sub if template::DEPENDENCY_SUBDIRS.contains(&sub) => prefix.join(sub),
                    _ => return None,
                }
            }
        };
        Some(path.to_string_lossy().into_owned())
    }

    /// Expand every placeholder in `s`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Recipe`] naming the first unknown placeholder.
    pub fn render(&self, s: &str) -> Result<String, BuildError> {
        Ok(template::render(s, |name| self.lookup(name))?)
    }

    /// [`Context::render`] with every substituted value passed through
    /// `escape` first. The literal parts of `s` are kept as written.
    ///
    /// # Errors
    ///
    /// See [`Context::render`].
    pub fn render_escaped(
        &self,
        s: &str,
        escape: fn(&str) -> String,
    ) -> Result<String, BuildError> {
        Ok(template::render(s, |name| self.lookup(name).map(|v| escape(&v)))?)
    }

    /// [`Context::render`] into a path.
    ///
    /// # Errors
    ///
    /// See [`Context::render`].
    pub fn render_path(&self, s: &str) -> Result<PathBuf, BuildError> {
        self.render(s).map(PathBuf::from)
    }

    /// Render an argument list, splicing the toolchain flags in place of a
    /// `{toolchain_flags}` argument.
    ///
    /// # Errors
    ///
    /// See [`Context::render`].
    pub fn render_args(&self, args: &[String]) -> Result<Vec<String>, BuildError> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            if arg == "{toolchain_flags}" {
                out.extend(self.toolchain_flags.iter().cloned());
            } else {
                out.push(self.render(arg)?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_schema::{Compiler, OsVersion};

    fn flag_sets() -> Vec<FlagSet> {
        vec![
            FlagSet {
                compiler: Some(Compiler::Clang),
                min_os: Some(OsVersion::new(10, 9, 0)),
                args: vec!["-spec".into(), "macx-clang".into()],
            },
            FlagSet {
                compiler: None,
                min_os: None,
                args: vec!["-spec".into(), "macx-g++".into()],
            },
        ]
    }

    #[test]
    fn selects_clang_on_mavericks_and_newer() {
        let host = Host::new("/k")
            .with_compiler(Some(Compiler::Clang))
            .with_os_version(Some(OsVersion::new(10, 11, 0)));
        assert_eq!(select_toolchain_flags(&flag_sets(), &host), ["-spec", "macx-clang"]);
    }

    #[test]
    fn falls_back_on_older_os_or_gcc() {
        let old = Host::new("/k")
            .with_compiler(Some(Compiler::Clang))
            .with_os_version(Some(OsVersion::new(10, 8, 0)));
        let gcc = Host::new("/k")
            .with_compiler(Some(Compiler::Gcc))
            .with_os_version(Some(OsVersion::new(10, 12, 0)));
        assert_eq!(select_toolchain_flags(&flag_sets(), &old), ["-spec", "macx-g++"]);
        assert_eq!(select_toolchain_flags(&flag_sets(), &gcc), ["-spec", "macx-g++"]);
    }

    #[test]
    fn renders_layout_and_dependency_paths() {
        let host = Host::new("/k").with_dependency("qt5", "/usr/local/opt/qt5", None);
        let layout = Layout::new(Path::new("/k"), "qt5-webkit", "5.7.0");
        let ctx = Context::new(&host, &layout);

        assert_eq!(ctx.render("{lib}").unwrap(), "/k/cellar/qt5-webkit/5.7.0/lib");
        assert_eq!(ctx.render("{opt_lib}").unwrap(), "/k/opt/qt5-webkit/lib");
        assert_eq!(
            ctx.render("{dep:qt5:lib}/QtWebKit.framework").unwrap(),
            "/usr/local/opt/qt5/lib/QtWebKit.framework"
        );
        assert!(ctx.render("{testpath}").is_err());
        assert!(ctx.render("{dep:qt5:nope}").is_err());
    }

    #[test]
    fn splices_toolchain_flags() {
        let host = Host::new("/k");
        let layout = Layout::new(Path::new("/k"), "x", "1");
        let ctx = Context::new(&host, &layout)
            .with_toolchain_flags(vec!["-spec".into(), "macx-clang".into()]);
        let args = ctx
            .render_args(&["../WebKit.pro".into(), "{toolchain_flags}".into()])
            .unwrap();
        assert_eq!(args, ["../WebKit.pro", "-spec", "macx-clang"]);
    }
}
