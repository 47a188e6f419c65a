//! Archive extraction module
//!
//! Handles tar.gz, tar.zst and zip sources. Upstream tarballs almost always
//! wrap their contents in a single top-level directory
//! (`qtwebkit-opensource-src-5.7.0/`); [`unpack_source`] returns that
//! directory as the source root.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;
use zstd::stream::Decoder as ZstdDecoder;

/// Errors raised while unpacking a source archive.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or hostile archive
    #[error("Archive error: {0}")]
    Archive(String),
}

/// Recognised source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `.tar.gz` / `.tgz`
    TarGz,
    /// `.tar.zst` / `.tzst`
    TarZst,
    /// `.tar`
    Tar,
    /// `.zip`
    Zip,
    /// Anything else; copied verbatim
    Plain,
}

/// Detect archive format from file extension
pub fn detect_format(path: &Path) -> SourceFormat {
    let path_str = path.to_string_lossy().to_lowercase();

    if path_str.ends_with(".tar.zst") || path_str.ends_with(".tzst") {
        SourceFormat::TarZst
    } else if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
        SourceFormat::TarGz
    } else if path_str.ends_with(".tar") {
        SourceFormat::Tar
    } else if path_str.ends_with(".zip") {
        SourceFormat::Zip
    } else {
        SourceFormat::Plain
    }
}

/// Unpack `archive` into `dest_dir` and return the source root.
///
/// `archive_name` decides the format; it is usually the file name from the
/// source URL, since cached downloads carry a `name--version--` prefix.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or contains entries that
/// would escape `dest_dir`.
pub fn unpack_source(
    archive: &Path,
    archive_name: &str,
    dest_dir: &Path,
) -> Result<PathBuf, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    match detect_format(Path::new(archive_name)) {
        SourceFormat::TarGz => {
            let reader = BufReader::new(File::open(archive)?);
            extract_tar(flate2::read::GzDecoder::new(reader), dest_dir)?;
        }
        SourceFormat::TarZst => {
            let reader = BufReader::new(File::open(archive)?);
            extract_tar(ZstdDecoder::new(reader)?, dest_dir)?;
        }
        SourceFormat::Tar => extract_tar(BufReader::new(File::open(archive)?), dest_dir)?,
        SourceFormat::Zip => extract_zip(archive, dest_dir)?,
        SourceFormat::Plain => {
            let name = if archive_name.is_empty() { "source" } else { archive_name };
            fs::copy(archive, dest_dir.join(name))?;
            return Ok(dest_dir.to_path_buf());
        }
    }

    Ok(single_top_level_dir(dest_dir)?.unwrap_or_else(|| dest_dir.to_path_buf()))
}

/// Extract a tar stream, rejecting entries that escape `dest_dir`.
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        // unpack_in refuses `..` and absolute paths and reports them as false
        if !entry.unpack_in(dest_dir)? {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                entry.path()?.display()
            )));
        }
    }
    Ok(())
}

/// Extract a zip archive
fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let Some(relative_path) = file.enclosed_name() else {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                file.name()
            )));
        };

        let absolute_path = dest_dir.join(&relative_path);
        if file.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }
        if let Some(p) = absolute_path.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile)?;

        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

/// If `dir` contains exactly one entry and it is a directory, return it.
fn single_top_level_dir(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)?;
    let Some(first) = entries.next().transpose()? else {
        return Ok(None);
    };
    if entries.next().is_some() || !first.file_type()?.is_dir() {
        return Ok(None);
    }
    Ok(Some(first.path()))
}
