//! The recipe pipeline.
//!
//! [`Executor::execute`] runs every stage in order and stops at the first
//! error. [`Executor::plan`] resolves the same stages without side effects so
//! a dry run can show exactly what would happen.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use kiln_schema::{Check, InstallStep, LinkName, Phase, Recipe, RelocationKind};
use reqwest::Client;
use tracing::{debug, info};

use crate::context::{Context, Layout, select_toolchain_flags};
use crate::error::BuildError;
use crate::host::{Host, InstalledDependency};
use crate::io::extract::unpack_source;
use crate::io::fetch;
use crate::links::{ResolvedLink, create_links};
use crate::patch::{CompiledPatch, apply as apply_patch};
use crate::paths;
use crate::precondition;
use crate::receipt::{InstallReceipt, link_opt};
use crate::relinker::{LinkageTool, MachoTool, ResolvedRelink, Rewrite, relink};
use crate::relocate::{Relocated, ResolvedRelocation, relocate};
use crate::reporter::Reporter;
use crate::runner::{Invocation, ProcessRunner, ToolRunner};
use crate::selftest::{self, SelfTestReport};
use crate::stage::Stage;

/// Result of a successful install.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// The versioned prefix
    pub prefix: PathBuf,
    /// Flags substituted for `{toolchain_flags}`
    pub toolchain_flags: Vec<String>,
    /// Dependencies found on the host
    pub dependencies: Vec<InstalledDependency>,
    /// Whether the source came from the download cache
    pub source_cached: bool,
    /// Paths moved or linked into the prefix
    pub relocated: Vec<Relocated>,
    /// Rewritten library references
    pub relinked: Vec<Rewrite>,
    /// Files changed by text patches
    pub patched: Vec<PathBuf>,
    /// Convenience links created
    pub links: Vec<PathBuf>,
    /// The receipt written into the prefix
    pub receipt: InstallReceipt,
    /// Self-test results, if it ran
    pub self_test: Option<SelfTestReport>,
    /// Build log, if output was captured
    pub log_path: Option<PathBuf>,
    /// Wall time of the whole run
    pub elapsed: Duration,
}

/// One step of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// A host check
    Check {
        /// Rendered check
        description: String,
        /// Whether it currently holds
        holds: bool,
    },
    /// A required dependency
    Dependency {
        /// Name
        name: String,
        /// Expected prefix
        prefix: PathBuf,
        /// Whether it is present
        present: bool,
    },
    /// Source download
    Fetch {
        /// Source URL
        url: String,
        /// Cache location
        dest: PathBuf,
    },
    /// An external command
    Run {
        /// Pipeline stage
        stage: Stage,
        /// Shell-quoted command line
        command: String,
        /// Working directory, relative to the source root
        workdir: Option<String>,
    },
    /// A relocation rule
    Relocate {
        /// Move or symlink
        kind: RelocationKind,
        /// Source glob
        from: String,
        /// Destination
        to: PathBuf,
    },
    /// A relink over one binary
    Relink {
        /// Binary
        binary: PathBuf,
        /// Prefix being replaced
        old_prefix: String,
        /// Replacement prefix
        new_prefix: String,
    },
    /// A text patch
    Patch {
        /// File glob
        files: String,
        /// Skip globs
        skip: Vec<String>,
        /// Number of replacements
        replacements: usize,
    },
    /// Symlink creation
    Link {
        /// Source glob
        from: String,
        /// Link directory
        into: PathBuf,
        /// Naming scheme
        name: LinkName,
    },
    /// Receipt and opt link
    Finalize {
        /// Versioned prefix
        prefix: PathBuf,
        /// Stable opt link
        opt_prefix: PathBuf,
    },
    /// A self-test command
    SelfTest {
        /// Shell-quoted command line
        command: String,
    },
}

impl PlannedAction {
    /// The stage this action belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Check { .. } => Stage::Preconditions,
            Self::Dependency { .. } => Stage::Dependencies,
            Self::Fetch { .. } => Stage::Fetch,
            Self::Run { stage, .. } => *stage,
            Self::Relocate { .. } => Stage::Relocate,
            Self::Relink { .. } => Stage::Relink,
            Self::Patch { .. } => Stage::Patch,
            Self::Link { .. } => Stage::Link,
            Self::Finalize { .. } => Stage::Finalize,
            Self::SelfTest { .. } => Stage::SelfTest,
        }
    }
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check { description, holds } => {
                write!(f, "{description} [{}]", if *holds { "ok" } else { "FAILS" })
            }
            Self::Dependency {
                name,
                prefix,
                present,
            } => write!(
                f,
                "{name} at {} [{}]",
                prefix.display(),
                if *present { "present" } else { "MISSING" }
            ),
            Self::Fetch { url, dest } => write!(f, "{url} -> {}", dest.display()),
            Self::Run {
                command, workdir, ..
            } => match workdir {
                Some(dir) => write!(f, "(in {dir}) {command}"),
                None => f.write_str(command),
            },
            Self::Relocate { kind, from, to } => {
                let verb = match kind {
                    RelocationKind::Move => "mv",
                    RelocationKind::Symlink => "ln -s",
                };
                write!(f, "{verb} {from} {}", to.display())
            }
            Self::Relink {
                binary,
                old_prefix,
                new_prefix,
            } => write!(f, "{}: {old_prefix} -> {new_prefix}", binary.display()),
            Self::Patch {
                files,
                skip,
                replacements,
            } => {
                write!(f, "{files} ({replacements} replacements")?;
                if !skip.is_empty() {
                    write!(f, ", skipping {}", skip.join(", "))?;
                }
                f.write_str(")")
            }
            Self::Link { from, into, name } => {
                let scheme = match name {
                    LinkName::Name => "",
                    LinkName::ParentStem => " (named after parent)",
                };
                write!(f, "{from} -> {}/{scheme}", into.display())
            }
            Self::Finalize { prefix, opt_prefix } => write!(
                f,
                "receipt in {}, {} -> {}",
                prefix.display(),
                opt_prefix.display(),
                prefix.display()
            ),
            Self::SelfTest { command } => f.write_str(command),
        }
    }
}

/// Runs recipes against a host.
pub struct Executor<'a, R: Reporter> {
    host: &'a Host,
    reporter: R,
    runner: Option<Box<dyn ToolRunner>>,
    linkage: Box<dyn LinkageTool>,
    client: Client,
    verbose: bool,
    self_test: bool,
}

impl<R: Reporter> fmt::Debug for Executor<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("host", self.host)
            .field("verbose", &self.verbose)
            .field("self_test", &self.self_test)
            .finish_non_exhaustive()
    }
}

impl<'a, R: Reporter> Executor<'a, R> {
    /// An executor that spawns real processes, logging to
    /// `<home>/logs`, and relinks with `otool`/`install_name_tool`.
    pub fn new(host: &'a Host, reporter: R) -> Self {
        Self {
            host,
            reporter,
            runner: None,
            linkage: Box::new(MachoTool),
            client: Client::new(),
            verbose: false,
            self_test: false,
        }
    }

    /// Run commands through `runner` instead of spawning processes.
    pub fn with_runner(mut self, runner: Box<dyn ToolRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Use a different tool for listing and rewriting library references.
    pub fn with_linkage_tool(mut self, tool: Box<dyn LinkageTool>) -> Self {
        self.linkage = tool;
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Stream command output to the terminal instead of the build log.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run the recipe's self-test after installing.
    pub fn with_self_test(mut self, enabled: bool) -> Self {
        self.self_test = enabled;
        self
    }

    fn context<'c>(&self, recipe: &Recipe, layout: &'c Layout) -> Context<'c>
    where
        'a: 'c,
    {
        Context::new(self.host, layout)
            .with_toolchain_flags(select_toolchain_flags(&recipe.toolchain, self.host))
    }

    fn enter(&self, current: &mut Stage, next: Stage) {
        *current = next;
        info!(stage = %next, "stage");
        self.reporter.stage(next);
    }

    /// Validate the recipe and check preconditions and dependencies without
    /// fetching or building anything.
    ///
    /// # Errors
    ///
    /// Returns the first recipe, precondition or dependency error.
    pub fn check(&self, recipe: &Recipe) -> Result<Vec<InstalledDependency>, BuildError> {
        recipe.validate()?;
        let layout = Layout::for_recipe(self.host.home(), recipe);
        let ctx = self.context(recipe, &layout);
        precondition::check_all(&recipe.preconditions, &ctx)?;
        precondition::check_dependencies(&recipe.dependencies, self.host)
    }

    /// Install `recipe`.
    ///
    /// # Errors
    ///
    /// Returns the first error from any stage; nothing after it runs.
    pub async fn execute(&self, recipe: &Recipe) -> Result<InstallOutcome, BuildError> {
        let mut stage = Stage::Preconditions;
        let result = self.run_pipeline(recipe, &mut stage).await;
        if let Err(e) = &result {
            let failed = e.stage().unwrap_or(stage);
            debug!(stage = %failed, error = %e, "pipeline aborted");
            self.reporter.failed(failed, &e.to_string());
        }
        result
    }

    async fn run_pipeline(
        &self,
        recipe: &Recipe,
        stage: &mut Stage,
    ) -> Result<InstallOutcome, BuildError> {
        let start = Instant::now();
        // Resolve every rule before anything is fetched or built.
        let planned = self.plan(recipe)?;
        debug!(actions = planned.len(), "recipe resolved");

        let home = self.host.home();
        let name = recipe.package.name.as_str();
        let version = recipe.package.version.as_str();
        let layout = Layout::for_recipe(home, recipe);
        let ctx = self.context(recipe, &layout);

        let log_path = paths::build_log_path(home, name, version);
        let default_runner;
        let runner: &dyn ToolRunner = if let Some(r) = &self.runner {
            r.as_ref()
        } else {
            default_runner = ProcessRunner::new()
                .with_log(&log_path)
                .verbose(self.verbose);
            &default_runner
        };
        let log_path = (self.runner.is_none() && !self.verbose).then_some(log_path);

        self.enter(stage, Stage::Preconditions);
        precondition::check_all(&recipe.preconditions, &ctx)?;

        self.enter(stage, Stage::Dependencies);
        let dependencies = precondition::check_dependencies(&recipe.dependencies, self.host)?;

        self.enter(stage, Stage::Fetch);
        let url = recipe.source.url.as_str();
        let dest = paths::cached_source_path(home, name, version, url);
        let fetched = fetch::fetch(&self.client, url, &dest, &recipe.source.sha256).await?;
        if fetched.cached {
            self.reporter.info("using cached source");
        }

        self.enter(stage, Stage::Extract);
        let scratch_root = paths::tmp_dir(home);
        std::fs::create_dir_all(&scratch_root)
            .map_err(|e| BuildError::io("failed to create scratch directory", e))?;
        let build_dir = tempfile::Builder::new()
            .prefix(&format!("{name}-{version}-"))
            .tempdir_in(&scratch_root)
            .map_err(|e| BuildError::io("failed to create build directory", e))?;
        let source_root = unpack_source(
            &fetched.path,
            paths::filename_from_url(url),
            build_dir.path(),
        )
        .map_err(|e| BuildError::FetchFailed(format!("cannot unpack {url}: {e}")))?;
        debug!(root = %source_root.display(), "source unpacked");

        if layout.prefix.exists() {
            std::fs::remove_dir_all(&layout.prefix)
                .map_err(|e| BuildError::io("failed to remove previous install", e))?;
        }
        std::fs::create_dir_all(&layout.prefix)
            .map_err(|e| BuildError::io("failed to create prefix", e))?;

        for phase in Phase::ALL {
            self.enter(stage, phase.into());
            for step in recipe.steps_in(phase) {
                let inv = self.step_invocation(step, &ctx, &source_root)?;
                std::fs::create_dir_all(&inv.cwd).map_err(|e| {
                    BuildError::io(format!("failed to create {}", inv.cwd.display()), e)
                })?;
                self.reporter.command(*stage, &inv.command_line());
                runner.run(&inv)?;
            }
        }

        self.enter(stage, Stage::Relocate);
        let mut relocated = Vec::new();
        for rule in &recipe.relocations {
            relocated.extend(relocate(&ResolvedRelocation::resolve(rule, &ctx)?)?);
        }

        self.enter(stage, Stage::Relink);
        let mut relinked = Vec::new();
        for rule in &recipe.relink {
            let rule = ResolvedRelink::resolve(rule, &ctx, true)?;
            relinked.extend(relink(self.linkage.as_ref(), &rule)?);
        }

        self.enter(stage, Stage::Patch);
        let mut patched = Vec::new();
        for patch in &recipe.patches {
            let report = apply_patch(&CompiledPatch::resolve(patch, &ctx)?)?;
            if !report.skipped.is_empty() {
                debug!(skipped = report.skipped.len(), files = %patch.files, "skip rules applied");
            }
            patched.extend(report.patched);
        }

        self.enter(stage, Stage::Link);
        let mut links = Vec::new();
        for rule in &recipe.links {
            links.extend(create_links(&ResolvedLink::resolve(rule, &ctx)?)?);
        }

        self.enter(stage, Stage::Finalize);
        let receipt = InstallReceipt {
            name: name.to_string(),
            version: version.to_string(),
            source_url: url.to_string(),
            sha256: recipe.source.sha256.to_string(),
            installed_at: chrono::Utc::now().to_rfc3339(),
            compiler: self.host.compiler().map(|c| c.as_str().to_string()),
            os_version: self.host.os_version().as_ref().map(ToString::to_string),
            toolchain_flags: ctx.toolchain_flags().to_vec(),
            dependencies: dependencies
                .iter()
                .map(|d| match &d.version {
                    Some(v) => format!("{} {v}", d.name),
                    None => d.name.clone(),
                })
                .collect(),
            keg_only: recipe.package.keg_only.clone(),
            relocated: relocated.len(),
        };
        receipt
            .write(&layout.prefix)
            .map_err(|e| BuildError::io("failed to write install receipt", e))?;
        link_opt(&layout).map_err(|e| {
            BuildError::io(format!("failed to link {}", layout.opt_prefix.display()), e)
        })?;

        let self_test = match (&recipe.test, self.self_test) {
            (Some(test), true) => {
                self.enter(stage, Stage::SelfTest);
                Some(selftest::run(test, &ctx, runner)?)
            }
            (None, true) => {
                self.reporter.warning("recipe declares no self-test");
                None
            }
            (_, false) => None,
        };

        drop(build_dir);
        let elapsed = start.elapsed();
        self.reporter
            .done(name, version, &layout.prefix, elapsed.as_secs_f64());

        Ok(InstallOutcome {
            prefix: layout.prefix.clone(),
            toolchain_flags: ctx.toolchain_flags().to_vec(),
            dependencies,
            source_cached: fetched.cached,
            relocated,
            relinked,
            patched,
            links,
            receipt,
            self_test,
            log_path,
            elapsed,
        })
    }

    /// Run the self-test of an already installed recipe.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Recipe`] if the recipe declares no test or the
    /// package is not installed, otherwise the self-test's own errors.
    pub fn run_self_test(&self, recipe: &Recipe) -> Result<SelfTestReport, BuildError> {
        recipe.validate()?;
        let Some(test) = &recipe.test else {
            return Err(BuildError::Recipe(format!(
                "{} declares no self-test",
                recipe.package.name
            )));
        };
        let layout = Layout::for_recipe(self.host.home(), recipe);
        if !layout.prefix.is_dir() {
            return Err(BuildError::Recipe(format!(
                "{} {} is not installed",
                layout.name, layout.version
            )));
        }
        let ctx = self.context(recipe, &layout);

        let default_runner = ProcessRunner::new().verbose(self.verbose);
        let runner: &dyn ToolRunner = self.runner.as_deref().unwrap_or(&default_runner);

        self.reporter.stage(Stage::SelfTest);
        selftest::run(test, &ctx, runner).inspect_err(|e| {
            self.reporter.failed(Stage::SelfTest, &e.to_string());
        })
    }

    fn step_invocation(
        &self,
        step: &InstallStep,
        ctx: &Context<'_>,
        source_root: &Path,
    ) -> Result<Invocation, BuildError> {
        let cwd = match &step.workdir {
            Some(dir) => source_root.join(ctx.render(dir)?),
            None => source_root.to_path_buf(),
        };
        let jobs = step.jobs.unwrap_or_else(|| self.host.jobs()).max(1);

        let mut inv = Invocation::new(step.phase.as_str(), ctx.render(&step.program)?, cwd)
            .args(ctx.render_args(&step.args)?)
            .env("MAKEFLAGS", format!("-j{jobs}"));
        for (key, value) in &step.env {
            inv = inv.env(key, ctx.render(value)?);
        }
        Ok(inv)
    }

    /// Resolve every stage without touching the filesystem or network.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Recipe`] if the recipe is invalid or a template
    /// cannot be expanded.
    pub fn plan(&self, recipe: &Recipe) -> Result<Vec<PlannedAction>, BuildError> {
        recipe.validate()?;
        let home = self.host.home();
        let layout = Layout::for_recipe(home, recipe);
        let ctx = self.context(recipe, &layout);
        let mut plan = Vec::new();

        for p in &recipe.preconditions {
            plan.push(PlannedAction::Check {
                description: describe_check(&p.check, &ctx)?,
                holds: precondition::holds(&p.check, &ctx)?,
            });
        }

        for dep in &recipe.dependencies {
            plan.push(PlannedAction::Dependency {
                name: dep.name.clone(),
                prefix: self.host.dependency_prefix(&dep.name),
                present: self.host.installed(&dep.name).is_some(),
            });
        }

        plan.push(PlannedAction::Fetch {
            url: recipe.source.url.clone(),
            dest: paths::cached_source_path(
                home,
                &recipe.package.name,
                &recipe.package.version,
                &recipe.source.url,
            ),
        });

        let source_root = Path::new(".");
        for phase in Phase::ALL {
            for step in recipe.steps_in(phase) {
                let inv = self.step_invocation(step, &ctx, source_root)?;
                plan.push(PlannedAction::Run {
                    stage: phase.into(),
                    command: inv.command_line(),
                    workdir: step.workdir.clone(),
                });
            }
        }

        for rule in &recipe.relocations {
            let r = ResolvedRelocation::resolve(rule, &ctx)?;
            let to = if r.into_dir { r.to.join("") } else { r.to };
            plan.push(PlannedAction::Relocate {
                kind: r.kind,
                from: r.from,
                to,
            });
        }

        for rule in &recipe.relink {
            let r = ResolvedRelink::resolve(rule, &ctx, false)?;
            for binary in r.binaries {
                plan.push(PlannedAction::Relink {
                    binary,
                    old_prefix: r.old_prefix.clone(),
                    new_prefix: r.new_prefix.clone(),
                });
            }
        }

        for patch in &recipe.patches {
            let compiled = CompiledPatch::resolve(patch, &ctx)?;
            plan.push(PlannedAction::Patch {
                files: compiled.files().to_string(),
                skip: patch.skip.clone(),
                replacements: patch.replacements.len(),
            });
        }

        for rule in &recipe.links {
            let r = ResolvedLink::resolve(rule, &ctx)?;
            plan.push(PlannedAction::Link {
                from: r.from,
                into: r.into,
                name: r.name,
            });
        }

        plan.push(PlannedAction::Finalize {
            prefix: layout.prefix.clone(),
            opt_prefix: layout.opt_prefix.clone(),
        });

        if let (true, Some(test)) = (self.self_test, &recipe.test) {
            let ctx = ctx.clone().with_testpath(paths::tmp_dir(home).join("kiln-test"));
            for cmd in test.commands.iter().chain(&test.run) {
                let inv = Invocation::new("test", ctx.render(&cmd.program)?, ".")
                    .args(ctx.render_args(&cmd.args)?);
                plan.push(PlannedAction::SelfTest {
                    command: inv.command_line(),
                });
            }
        }

        Ok(plan)
    }
}

fn describe_check(check: &Check, ctx: &Context<'_>) -> Result<String, BuildError> {
    Ok(match check {
        Check::PathAbsent { path } => format!("{} must not exist", ctx.render(path)?),
        Check::PathExists { path } => format!("{} must exist", ctx.render(path)?),
        Check::MinOsVersion { version } => match ctx.host().os_version() {
            Some(os) => format!("OS {version} or newer (host {os})"),
            None => format!("OS {version} or newer (host unknown)"),
        },
        Check::Tool { name } => format!("'{name}' on PATH"),
    })
}
