//! External command execution.
//!
//! Every configure/build/install command and every self-test command goes
//! through a [`ToolRunner`]. [`ProcessRunner`] spawns real processes and
//! captures their output in the build log; tests substitute a recording
//! runner to observe which commands would have run.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::error::BuildError;

/// A fully-resolved external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Pipeline step name used in error messages (e.g. `configure`).
    pub step: String,
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Additional environment variables
    pub env: Vec<(String, String)>,
    /// Kill the process after this long
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// A command with no arguments, extra environment or timeout.
    pub fn new(step: impl Into<String>, program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            step: step.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Set the argument list.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set a timeout.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command as it would be typed in a shell.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn failure(&self, code: Option<i32>) -> BuildError {
        let tool = Path::new(&self.program)
            .file_name()
            .map_or_else(|| self.program.clone(), |n| n.to_string_lossy().into_owned());
        BuildError::ExternalToolFailed {
            step: format!("{} ({tool})", self.step),
            code,
        }
    }
}

fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:+@%,".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Runs external commands; any non-zero exit is an error.
pub trait ToolRunner: Send + Sync {
    /// Run `invocation` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ExternalToolFailed`] if the process cannot be
    /// started, exits non-zero, or times out.
    fn run(&self, invocation: &Invocation) -> Result<(), BuildError>;
}

/// Spawns real processes, appending their output to a build log.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    log_path: Option<PathBuf>,
    verbose: bool,
}

impl ProcessRunner {
    /// A runner that inherits stdout/stderr.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append command output to `log_path` instead of the terminal.
    pub fn with_log(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(log_path.into());
        self
    }

    /// Stream output to the terminal even when a log is configured.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The build log, if any.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    fn open_log(&self, invocation: &Invocation) -> Result<Option<File>, BuildError> {
        let Some(path) = self.log_path.as_deref().filter(|_| !self.verbose) else {
            return Ok(None);
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BuildError::io("failed to create log directory", e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| BuildError::io("failed to open build log", e))?;
        writeln!(
            file,
            "==> [{}] {} (in {})",
            invocation.step,
            invocation.command_line(),
            invocation.cwd.display()
        )
        .map_err(|e| BuildError::io("failed to write build log", e))?;
        Ok(Some(file))
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), BuildError> {
        debug!(step = %invocation.step, cmd = %invocation.command_line(), "running");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(invocation.env.iter().cloned());

        let log = self.open_log(invocation)?;
        if let Some(file) = log {
            let stderr = file
                .try_clone()
                .map_err(|e| BuildError::io("failed to open build log", e))?;
            cmd.stdout(Stdio::from(file)).stderr(Stdio::from(stderr));
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %invocation.program, error = %e, "failed to spawn");
                return Err(invocation.failure(None));
            }
        };

        let status = match invocation.timeout {
            Some(limit) => match child.wait_timeout(limit) {
                Ok(Some(status)) => status,
                Ok(None) => {
                    warn!(step = %invocation.step, ?limit, "timed out, killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(invocation.failure(None));
                }
                Err(e) => return Err(BuildError::io("failed to wait for child", e)),
            },
            None => child
                .wait()
                .map_err(|e| BuildError::io("failed to wait for child", e))?,
        };

        if status.success() {
            return Ok(());
        }

        if let Some(path) = self.log_path.as_deref().filter(|_| !self.verbose) {
            if let Ok(tail) = read_last_lines(path, 20) {
                eprintln!("\n{} failed. Last 20 lines:", invocation.step);
                eprintln!("{tail}");
                eprintln!("\nFull log: {}", path.display());
            }
        }
        Err(invocation.failure(status.code()))
    }
}

/// Read the last N lines from a file efficiently.
///
/// Seeks to near the end and reads a fixed-size tail buffer, so a multi-gigabyte
/// WebKit build log is never loaded whole.
fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    use std::io::{Read, Seek, SeekFrom};

    // Read at most 16KB from the end (enough for ~400 lines at 40 chars each)
    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let seek_pos = file_len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let buffer = String::from_utf8_lossy(&bytes);

    // If we seeked mid-file, skip the first (partial) line
    let content = if seek_pos > 0 {
        buffer.find('\n').map_or(&*buffer, |idx| &buffer[idx + 1..])
    } else {
        &*buffer
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn command_line_quotes_when_needed() {
        let inv = Invocation::new("configure", "/opt/qt5/bin/qmake", "/tmp")
            .args(["../WebKit.pro", "-spec", "macx-g++", "has space"]);
        assert_eq!(
            inv.command_line(),
            "/opt/qt5/bin/qmake ../WebKit.pro -spec macx-g++ 'has space'"
        );
    }

    #[test]
    fn success_and_failure_exit_codes() {
        let tmp = tempdir().unwrap();
        let runner = ProcessRunner::new().with_log(tmp.path().join("build.log"));

        let ok = Invocation::new("build", "sh", tmp.path()).args(["-c", "echo hi"]);
        runner.run(&ok).unwrap();

        let bad = Invocation::new("build", "sh", tmp.path()).args(["-c", "exit 3"]);
        match runner.run(&bad) {
            Err(BuildError::ExternalToolFailed { step, code }) => {
                assert_eq!(step, "build (sh)");
                assert_eq!(code, Some(3));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let log = std::fs::read_to_string(tmp.path().join("build.log")).unwrap();
        assert!(log.contains("==> [build] sh -c 'echo hi'"));
        assert!(log.contains("hi"));
    }

    #[test]
    fn missing_program_is_a_tool_failure() {
        let tmp = tempdir().unwrap();
        let inv = Invocation::new("configure", "/nonexistent/qmake", tmp.path());
        let err = ProcessRunner::new().run(&inv).unwrap_err();
        assert!(matches!(err, BuildError::ExternalToolFailed { code: None, .. }));
    }

    #[test]
    fn timeout_kills_the_child() {
        let tmp = tempdir().unwrap();
        let inv = Invocation::new("test", "sh", tmp.path())
            .args(["-c", "sleep 5"])
            .timeout(Some(Duration::from_millis(100)));
        let err = ProcessRunner::new().run(&inv).unwrap_err();
        assert!(matches!(err, BuildError::ExternalToolFailed { code: None, .. }));
    }

    #[test]
    fn env_is_passed_through() {
        let tmp = tempdir().unwrap();
        let out = tmp.path().join("out");
        let inv = Invocation::new("build", "sh", tmp.path())
            .args(["-c", "printf %s \"$MAKEFLAGS\" > out"])
            .env("MAKEFLAGS", "-j1");
        ProcessRunner::new().run(&inv).unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "-j1");
    }

    #[test]
    fn tail_returns_last_lines() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("log");
        let body: String = (0..100).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, body).unwrap();
        let tail = read_last_lines(&path, 2).unwrap();
        assert_eq!(tail, "line 98\nline 99");
    }
}
