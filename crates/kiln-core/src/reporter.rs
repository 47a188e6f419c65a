//! Reporter trait for dependency injection
//!
//! This trait allows the executor to report progress and status without
//! being coupled to a specific terminal implementation.

use std::path::Path;

use crate::stage::Stage;

/// Receives progress events from the executor.
pub trait Reporter: Send + Sync {
    /// A pipeline stage has started.
    fn stage(&self, stage: Stage);

    /// An external command is about to run.
    fn command(&self, stage: Stage, command_line: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// A stage failed; the run is about to stop.
    fn failed(&self, stage: Stage, reason: &str);

    /// The package was installed successfully.
    fn done(&self, name: &str, version: &str, prefix: &Path, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn stage(&self, stage: Stage) {
        (**self).stage(stage);
    }
    fn command(&self, stage: Stage, command_line: &str) {
        (**self).command(stage, command_line);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn failed(&self, stage: Stage, reason: &str) {
        (**self).failed(stage, reason);
    }
    fn done(&self, name: &str, version: &str, prefix: &Path, elapsed_secs: f64) {
        (**self).done(name, version, prefix, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn stage(&self, _: Stage) {}
    fn command(&self, _: Stage, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn failed(&self, _: Stage, _: &str) {}
    fn done(&self, _: &str, _: &str, _: &Path, _: f64) {}
}
