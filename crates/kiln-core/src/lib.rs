//! Core library for kiln.
//!
//! Runs a [`kiln_schema::Recipe`] as a fixed, sequential pipeline: host
//! preconditions, dependency presence, fetch and checksum verification,
//! extraction, the configure/build/install commands, relocation of the
//! installed files into the recipe's own prefix, Mach-O re-linking, text
//! patching of generated config fragments, convenience symlinks, an install
//! receipt, and an optional self-test.
//!
//! Every step either succeeds or aborts the whole run with a
//! [`BuildError`]; nothing is retried or resumed.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod fsutil;
pub mod host;
pub mod io;
pub mod links;
pub mod patch;
pub mod paths;
pub mod precondition;
pub mod receipt;
pub mod relinker;
pub mod relocate;
pub mod reporter;
pub mod runner;
pub mod selftest;
pub mod stage;

pub use config::Config;
pub use context::{Context, Layout};
pub use error::BuildError;
pub use executor::{Executor, InstallOutcome, PlannedAction};
pub use host::Host;
pub use paths::*;
pub use reporter::{NullReporter, Reporter};
pub use runner::{Invocation, ProcessRunner, ToolRunner};
pub use stage::Stage;

/// User Agent string for source downloads
pub const USER_AGENT: &str = concat!("kiln/", env!("CARGO_PKG_VERSION"));
