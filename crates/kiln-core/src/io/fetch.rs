//! Source download with streaming SHA256 verification.
//!
//! `http(s)://` URLs are streamed with reqwest; `file://` URLs and plain
//! paths are copied from disk. Either way the bytes are hashed as they are
//! written, and a mismatching file is deleted before the error is returned.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use kiln_schema::Sha256Digest;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Errors raised while fetching a source archive.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The fetched bytes do not match the declared digest
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Declared digest
        expected: String,
        /// Computed digest
        actual: String,
    },
}

/// Where a source URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// `http://` or `https://`
    Remote(String),
    /// `file://` URL or bare filesystem path
    Local(PathBuf),
}

impl SourceLocation {
    /// Classify a recipe's source URL.
    pub fn parse(url: &str) -> Self {
        if url.starts_with("http://") || url.starts_with("https://") {
            Self::Remote(url.to_string())
        } else if let Some(path) = url.strip_prefix("file://") {
            Self::Local(PathBuf::from(path))
        } else {
            Self::Local(PathBuf::from(url))
        }
    }
}

/// Outcome of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Where the verified archive now lives
    pub path: PathBuf,
    /// Whether an already-verified cached copy was reused
    pub cached: bool,
}

/// Fetch `url` into `dest` and verify it against `expected`.
///
/// If `dest` already exists with the expected digest it is reused without
/// touching the network. Data is written to `<dest>.part` and renamed into
/// place only after verification succeeds.
///
/// # Errors
///
/// Returns [`FetchError::HashMismatch`] if the digest differs (the partial
/// file is removed), or a transport/IO error.
pub async fn fetch(
    client: &Client,
    url: &str,
    dest: &Path,
    expected: &Sha256Digest,
) -> Result<Fetched, FetchError> {
    if dest.is_file() {
        let existing = Sha256Digest::compute_file(dest)?;
        if existing == *expected {
            debug!(path = %dest.display(), "using cached source");
            return Ok(Fetched {
                path: dest.to_path_buf(),
                cached: true,
            });
        }
        tokio::fs::remove_file(dest).await?;
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let part = part_path(dest);
    let actual = match SourceLocation::parse(url) {
        SourceLocation::Remote(url) => {
            info!(%url, "downloading");
            download(client, &url, &part).await
        }
        SourceLocation::Local(path) => {
            info!(path = %path.display(), "copying local source");
            copy_local(&path, &part).await
        }
    };

    let actual = match actual {
        Ok(actual) => actual,
        Err(e) => {
            tokio::fs::remove_file(&part).await.ok();
            return Err(e);
        }
    };

    if actual != expected.as_str() {
        tokio::fs::remove_file(&part).await.ok();
        return Err(FetchError::HashMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    tokio::fs::rename(&part, dest).await?;
    Ok(Fetched {
        path: dest.to_path_buf(),
        cached: false,
    })
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn download(client: &Client, url: &str, dest: &Path) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await?
        .error_for_status()?;

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
    }

    file.flush().await?;
    Ok(hex::encode(hasher.finalize()))
}

async fn copy_local(src: &Path, dest: &Path) -> Result<String, FetchError> {
    let mut input = File::open(src).await?;
    let mut output = File::create(dest).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n]).await?;
        hasher.update(&buf[..n]);
    }

    output.flush().await?;
    Ok(hex::encode(hasher.finalize()))
}
