//! Hash command

use std::path::PathBuf;

use anyhow::{Context, Result};
use kiln_schema::Sha256Digest;

/// Print the SHA256 digest of each file, in `sha256sum` format.
pub fn hash(files: &[PathBuf]) -> Result<()> {
    for file in files {
        let digest = Sha256Digest::compute_file(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        println!("{digest}  {}", file.display());
    }
    Ok(())
}
