//! The error type for a recipe run.
//!
//! Every variant is fatal: the executor stops at the first error and the
//! caller is expected to re-run from scratch.

use std::path::PathBuf;

use thiserror::Error;

use crate::io::fetch::FetchError;
use crate::stage::Stage;

/// Errors that abort a recipe run.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The recipe is malformed or references something that cannot be resolved.
    #[error("invalid recipe: {0}")]
    Recipe(String),

    /// A host precondition did not hold.
    #[error("{0}")]
    PreconditionFailed(String),

    /// A declared dependency is not installed (or has the wrong version).
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// The source could not be retrieved.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// The retrieved source does not match the declared digest.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Digest declared by the recipe
        expected: String,
        /// Digest of the downloaded bytes
        actual: String,
    },

    /// An external command could not be started or exited non-zero.
    #[error("{step} failed: {}", describe_exit(.code))]
    ExternalToolFailed {
        /// Step or tool name
        step: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
    },

    /// A relocation source was missing or could not be moved.
    #[error("relocation failed for {}: {reason}", .path.display())]
    RelocationFailed {
        /// The path that could not be relocated
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A patch target was missing or could not be rewritten.
    #[error("patch failed for {}: {reason}", .path.display())]
    PatchFailed {
        /// The file (or glob) being patched
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The self-test did not produce an artifact or its binary failed.
    #[error("self-test failed: {0}")]
    SelfTestFailed(String),

    /// Any other filesystem error.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted
        context: String,
        /// Underlying error
        source: std::io::Error,
    },
}

fn describe_exit(code: impl std::borrow::Borrow<Option<i32>>) -> String {
    match *code.borrow() {
        Some(c) => format!("exit code {c}"),
        None => "terminated by signal or could not be started".to_string(),
    }
}

impl BuildError {
    /// Wrap an I/O error with a description of the attempted operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Shorthand for [`BuildError::RelocationFailed`].
    pub fn relocation(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::RelocationFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`BuildError::PatchFailed`].
    pub fn patch(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::PatchFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// The pipeline stage this kind of error belongs to, if it is specific
    /// to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::PreconditionFailed(_) => Some(Stage::Preconditions),
            Self::MissingDependency(_) => Some(Stage::Dependencies),
            Self::FetchFailed(_) | Self::ChecksumMismatch { .. } => Some(Stage::Fetch),
            Self::RelocationFailed { .. } => Some(Stage::Relocate),
            Self::PatchFailed { .. } => Some(Stage::Patch),
            Self::SelfTestFailed(_) => Some(Stage::SelfTest),
            Self::Recipe(_) | Self::ExternalToolFailed { .. } | Self::Io { .. } => None,
        }
    }
}

impl From<kiln_schema::RecipeError> for BuildError {
    fn from(err: kiln_schema::RecipeError) -> Self {
        Self::Recipe(err.to_string())
    }
}

impl From<kiln_schema::template::TemplateError> for BuildError {
    fn from(err: kiln_schema::template::TemplateError) -> Self {
        Self::Recipe(err.to_string())
    }
}

impl From<FetchError> for BuildError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::HashMismatch { expected, actual } => {
                Self::ChecksumMismatch { expected, actual }
            }
            other => Self::FetchFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_message_names_step() {
        let err = BuildError::ExternalToolFailed {
            step: "configure".to_string(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "configure failed: exit code 2");
    }

    #[test]
    fn hash_mismatch_maps_to_checksum_error() {
        let err: BuildError = FetchError::HashMismatch {
            expected: "a".into(),
            actual: "b".into(),
        }
        .into();
        assert!(matches!(err, BuildError::ChecksumMismatch { .. }));
        assert_eq!(err.stage(), Some(Stage::Fetch));
    }
}
