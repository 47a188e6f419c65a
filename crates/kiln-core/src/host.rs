//! The host environment a recipe runs against.
//!
//! Provides the facts recipes make decisions on: the active compiler family,
//! the OS version, the job count, and where dependencies are installed.
//! Detection is best-effort; anything `config.toml` sets wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use kiln_schema::{Compiler, OsVersion};
use tracing::debug;

use crate::config::{Config, DependencyOverride};
use crate::receipt::InstallReceipt;

/// An installed dependency as seen by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledDependency {
    /// Package name
    pub name: String,
    /// Install prefix
    pub prefix: PathBuf,
    /// Installed version, when it can be determined
    pub version: Option<semver::Version>,
}

/// Snapshot of the host, taken once per invocation.
#[derive(Debug, Clone)]
pub struct Host {
    home: PathBuf,
    compiler: Option<Compiler>,
    os_version: Option<OsVersion>,
    jobs: usize,
    dependencies: BTreeMap<String, DependencyOverride>,
}

impl Host {
    /// A host with nothing detected: no compiler, unknown OS, one job per CPU.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            compiler: None,
            os_version: None,
            jobs: num_cpus::get(),
            dependencies: BTreeMap::new(),
        }
    }

    /// Detect the host, then apply `config` and environment overrides.
    ///
    /// Precedence for the compiler is `KILN_CC`, then `config.toml`, then
    /// `CC`, then whichever of `clang`/`gcc` is on `PATH`. `KILN_JOBS`
    /// overrides the configured job count.
    pub fn detect(home: impl Into<PathBuf>, config: &Config) -> Self {
        let compiler = std::env::var("KILN_CC")
            .ok()
            .and_then(|cc| Compiler::from_program(&cc))
            .or(config.host.compiler)
            .or_else(detect_compiler);

        let os_version = config.host.os_version.or_else(detect_os_version);

        let jobs = std::env::var("KILN_JOBS")
            .ok()
            .and_then(|j| j.parse().ok())
            .or(config.jobs)
            .filter(|j| *j > 0)
            .unwrap_or_else(num_cpus::get);

        debug!(?compiler, ?os_version, jobs, "detected host");

        Self {
            home: home.into(),
            compiler,
            os_version,
            jobs,
            dependencies: config.dependencies.clone(),
        }
    }

    /// Override the compiler family.
    pub fn with_compiler(mut self, compiler: Option<Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Override the OS version.
    pub fn with_os_version(mut self, os_version: Option<OsVersion>) -> Self {
        self.os_version = os_version;
        self
    }

    /// Override the job count (clamped to at least one).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Register a dependency installed at `prefix`.
    pub fn with_dependency(
        mut self,
        name: impl Into<String>,
        prefix: impl Into<PathBuf>,
        version: Option<&str>,
    ) -> Self {
        self.dependencies.insert(
            name.into(),
            DependencyOverride {
                prefix: prefix.into(),
                version: version.map(str::to_string),
            },
        );
        self
    }

    /// Root of the kiln home.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Active compiler family, if known.
    pub fn compiler(&self) -> Option<Compiler> {
        self.compiler
    }

    /// Host OS version, if known.
    pub fn os_version(&self) -> Option<OsVersion> {
        self.os_version
    }

    /// Default parallel job count.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Where `name` is (or would be) installed: the configured prefix, or
    /// `<home>/opt/<name>`.
    pub fn dependency_prefix(&self, name: &str) -> PathBuf {
        self.dependencies.get(name).map_or_else(
            || crate::paths::opt_dir(&self.home).join(name),
            |dep| dep.prefix.clone(),
        )
    }

    /// The installed dependency, or `None` if its prefix does not exist.
    ///
    /// The version comes from `config.toml` when set there, otherwise from
    /// the dependency's install receipt.
    pub fn installed(&self, name: &str) -> Option<InstalledDependency> {
        let prefix = self.dependency_prefix(name);
        if !prefix.is_dir() {
            return None;
        }

        let version = self
            .dependencies
            .get(name)
            .and_then(|d| d.version.as_deref())
            .and_then(parse_version_lenient)
            .or_else(|| {
                InstallReceipt::read(&prefix)
                    .ok()
                    .and_then(|r| parse_version_lenient(&r.version))
            });

        Some(InstalledDependency {
            name: name.to_string(),
            prefix,
            version,
        })
    }

    /// Whether `program` can be found on `PATH`.
    pub fn has_tool(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Parse a version that may omit minor/patch (`5.7` becomes `5.7.0`).
pub fn parse_version_lenient(s: &str) -> Option<semver::Version> {
    let s = s.trim().trim_start_matches('v');
    if let Ok(v) = semver::Version::parse(s) {
        return Some(v);
    }
    let mut parts = s.split('.').map(str::parse::<u64>);
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    if parts.next().is_some() {
        return None;
    }
    Some(semver::Version::new(major, minor, patch))
}

fn detect_compiler() -> Option<Compiler> {
    if let Some(cc) = std::env::var("CC").ok().and_then(|cc| Compiler::from_program(&cc)) {
        return Some(cc);
    }
    if which::which("clang").is_ok() {
        Some(Compiler::Clang)
    } else if which::which("gcc").is_ok() {
        Some(Compiler::Gcc)
    } else {
        None
    }
}

fn detect_os_version() -> Option<OsVersion> {
    if !cfg!(target_os = "macos") {
        return None;
    }
    let output = Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}
