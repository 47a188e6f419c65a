//! Post-install smoke test.
//!
//! Writes the recipe's test sources into a scratch directory, builds them
//! against the installed prefix, checks the expected artifacts exist and
//! finally runs the produced binary under a timeout.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use kiln_schema::{CommandSpec, SelfTest};
use tracing::{debug, info};

use crate::context::Context;
use crate::error::BuildError;
use crate::runner::{Invocation, ToolRunner};

/// Timeout for the final binary when the recipe does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// What a passing self-test did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfTestReport {
    /// Commands that ran, in order
    pub commands: Vec<String>,
    /// Artifacts confirmed present
    pub artifacts: Vec<PathBuf>,
}

fn relative(path: &str) -> Result<&Path, BuildError> {
    let p = Path::new(path);
    let escapes = p
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(BuildError::Recipe(format!(
            "test path '{path}' must be relative to the test directory"
        )));
    }
    Ok(p)
}

fn invocation(cmd: &CommandSpec, ctx: &Context<'_>, dir: &Path) -> Result<Invocation, BuildError> {
    Ok(Invocation::new("test", ctx.render(&cmd.program)?, dir)
        .args(ctx.render_args(&cmd.args)?)
        .env("MAKEFLAGS", format!("-j{}", ctx.host().jobs())))
}

/// Run `test` inside a fresh temporary directory.
///
/// `ctx` is the install context; `{testpath}` is bound to the scratch
/// directory, which is removed afterwards.
///
/// # Errors
///
/// Returns [`BuildError::SelfTestFailed`] if a command fails, an expected
/// artifact is missing, or the final binary exits non-zero or times out.
pub fn run(
    test: &SelfTest,
    ctx: &Context<'_>,
    runner: &dyn ToolRunner,
) -> Result<SelfTestReport, BuildError> {
    let scratch_root = crate::paths::tmp_dir(ctx.host().home());
    std::fs::create_dir_all(&scratch_root)
        .map_err(|e| BuildError::io("failed to create scratch directory", e))?;
    let scratch = tempfile::Builder::new()
        .prefix("kiln-test-")
        .tempdir_in(&scratch_root)
        .map_err(|e| BuildError::io("failed to create test directory", e))?;
    let dir = scratch.path();
    let ctx = ctx.clone().with_testpath(dir);
    debug!(dir = %dir.display(), "self-test directory");

    for file in &test.files {
        let path = dir.join(relative(&file.path)?);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BuildError::io(format!("failed to create {}", parent.display()), e))?;
        }
        std::fs::write(&path, ctx.render(&file.content)?)
            .map_err(|e| BuildError::io(format!("failed to write {}", path.display()), e))?;
    }

    let mut report = SelfTestReport::default();
    let fail = |e: BuildError| BuildError::SelfTestFailed(e.to_string());

    for cmd in &test.commands {
        let inv = invocation(cmd, &ctx, dir)?;
        report.commands.push(inv.command_line());
        runner.run(&inv).map_err(fail)?;
    }

    for expected in &test.expect {
        let rendered = ctx.render(expected)?;
        let path = dir.join(relative(&rendered)?);
        if !path.exists() {
            return Err(BuildError::SelfTestFailed(format!(
                "expected '{rendered}' to be produced"
            )));
        }
        report.artifacts.push(PathBuf::from(rendered));
    }

    if let Some(cmd) = &test.run {
        let timeout = test.timeout_secs.map_or(DEFAULT_TIMEOUT, Duration::from_secs);
        let inv = invocation(cmd, &ctx, dir)?.timeout(Some(timeout));
        info!(cmd = %inv.command_line(), ?timeout, "running test binary");
        report.commands.push(inv.command_line());
        runner.run(&inv).map_err(fail)?;
    }

    Ok(report)
}
