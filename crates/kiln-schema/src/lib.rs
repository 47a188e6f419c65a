//! Shared types for kiln recipes.
//!
//! A recipe is a TOML document describing how to fetch, build, install and
//! relocate a single package. This crate owns the data model and its
//! validation; execution lives in `kiln-core`.

pub mod hash;
pub mod os;
pub mod recipe;
pub mod template;

// Re-exports
pub use hash::*;
pub use os::*;
pub use recipe::*;
