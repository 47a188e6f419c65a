//! Source retrieval: download with checksum verification, and unpacking.

pub mod extract;
pub mod fetch;
