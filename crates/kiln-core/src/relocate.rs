//! Moving installed files from a dependency's prefix into this prefix.
//!
//! Some upstream build systems can only install into the prefix of the
//! package they extend (QtWebKit installs into Qt's own tree). Relocation
//! rules move those files into the recipe's prefix afterwards, in declaration
//! order, preserving their directory structure.

use std::path::{Path, PathBuf};

use kiln_schema::{FileRelocation, RelocationKind};
use tracing::debug;

use crate::context::Context;
use crate::error::BuildError;
use crate::fsutil;

/// One completed move or link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocated {
    /// Original location
    pub from: PathBuf,
    /// New location
    pub to: PathBuf,
    /// Move or symlink
    pub kind: RelocationKind,
}

/// A rule with its templates expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelocation {
    /// Move or symlink
    pub kind: RelocationKind,
    /// Source path or glob
    pub from: String,
    /// Destination
    pub to: PathBuf,
    /// `to` is a directory that receives every match under its own name
    pub into_dir: bool,
}

impl ResolvedRelocation {
    /// Expand a rule's templates.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Recipe`] for unknown placeholders.
    pub fn resolve(rule: &FileRelocation, ctx: &Context<'_>) -> Result<Self, BuildError> {
        let from = ctx.render(&rule.from)?;
        let to = ctx.render(&rule.to)?;
        let into_dir = to.ends_with('/');
        let to = PathBuf::from(to.trim_end_matches('/'));
        Ok(Self {
            kind: rule.kind,
            from,
            to,
            into_dir,
        })
    }

    fn destination(&self, source: &Path) -> Result<PathBuf, BuildError> {
        if !self.into_dir {
            return Ok(self.to.clone());
        }
        let name = source
            .file_name()
            .ok_or_else(|| BuildError::relocation(source, "source has no file name"))?;
        Ok(self.to.join(name))
    }
}

/// Apply one relocation rule.
///
/// # Errors
///
/// Returns [`BuildError::RelocationFailed`] if the source matches nothing,
/// a destination already exists, or the move fails; and
/// [`BuildError::Recipe`] if a multi-match glob targets a single path.
pub fn relocate(rule: &ResolvedRelocation) -> Result<Vec<Relocated>, BuildError> {
    let sources = fsutil::expand_glob(&rule.from)
        .map_err(|e| BuildError::Recipe(format!("invalid glob '{}': {e}", rule.from)))?;

    if sources.is_empty() {
        return Err(BuildError::relocation(&rule.from, "no such file or directory"));
    }
    if sources.len() > 1 && !rule.into_dir {
        return Err(BuildError::Recipe(format!(
            "'{}' matches {} paths; end the destination with '/' to move them into a directory",
            rule.from,
            sources.len()
        )));
    }

    let mut done = Vec::with_capacity(sources.len());
    for source in sources {
        let dest = rule.destination(&source)?;
        if fsutil::exists_no_follow(&dest) {
            return Err(BuildError::relocation(&dest, "destination already exists"));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BuildError::relocation(parent, format!("cannot create directory: {e}")))?;
        }

        match rule.kind {
            RelocationKind::Move => fsutil::move_path(&source, &dest),
            RelocationKind::Symlink => fsutil::replace_symlink(&source, &dest),
        }
        .map_err(|e| BuildError::relocation(&source, e))?;

        debug!(from = %source.display(), to = %dest.display(), kind = ?rule.kind, "relocated");
        done.push(Relocated {
            from: source,
            to: dest,
            kind: rule.kind,
        });
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rule(kind: RelocationKind, from: &Path, to: &str) -> ResolvedRelocation {
        ResolvedRelocation {
            kind,
            from: from.to_string_lossy().into_owned(),
            to: PathBuf::from(to.trim_end_matches('/')),
            into_dir: to.ends_with('/'),
        }
    }

    #[test]
    fn moves_glob_matches_into_directory() {
        let tmp = tempdir().unwrap();
        let dep_lib = tmp.path().join("qt5/lib/pkgconfig");
        std::fs::create_dir_all(&dep_lib).unwrap();
        std::fs::write(dep_lib.join("Qt5WebKit.pc"), "prefix=/old\n").unwrap();
        std::fs::write(dep_lib.join("Qt5WebKitWidgets.pc"), "prefix=/old\n").unwrap();
        std::fs::write(dep_lib.join("Qt5Core.pc"), "prefix=/old\n").unwrap();

        let dest = tmp.path().join("prefix/lib/pkgconfig/");
        let r = rule(
            RelocationKind::Move,
            &dep_lib.join("Qt5WebKit*.pc"),
            dest.to_str().unwrap(),
        );
        let done = relocate(&r).unwrap();

        assert_eq!(done.len(), 2);
        for moved in &done {
            assert!(!moved.from.exists());
            assert!(moved.to.is_file());
        }
        assert!(dep_lib.join("Qt5Core.pc").exists());
    }

    #[test]
    fn single_path_to_exact_destination() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("qt5/libexec/QtWebProcess");
        std::fs::create_dir_all(src.parent().unwrap()).unwrap();
        std::fs::write(&src, "bin").unwrap();

        let dest = tmp.path().join("prefix/libexec/QtWebProcess");
        let r = rule(RelocationKind::Move, &src, dest.to_str().unwrap());
        relocate(&r).unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "bin");
    }

    #[test]
    fn missing_source_fails() {
        let tmp = tempdir().unwrap();
        let r = rule(RelocationKind::Move, &tmp.path().join("nope/*.pc"), "/tmp/x/");
        assert!(matches!(relocate(&r), Err(BuildError::RelocationFailed { .. })));
    }

    #[test]
    fn existing_destination_fails() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("a");
        let dest = tmp.path().join("b");
        std::fs::write(&src, "").unwrap();
        std::fs::write(&dest, "").unwrap();
        let r = rule(RelocationKind::Move, &src, dest.to_str().unwrap());
        assert!(matches!(relocate(&r), Err(BuildError::RelocationFailed { .. })));
        assert!(src.exists());
    }

    #[test]
    fn multi_match_needs_directory_destination() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("a.pri"), "").unwrap();
        std::fs::write(tmp.path().join("b.pri"), "").unwrap();
        let r = rule(RelocationKind::Move, &tmp.path().join("*.pri"), "/tmp/single");
        assert!(matches!(relocate(&r), Err(BuildError::Recipe(_))));
    }

    #[test]
    fn symlink_keeps_source() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("qt5/plugins/webkit");
        std::fs::create_dir_all(&src).unwrap();
        let dest = tmp.path().join("prefix/plugins/");
        let r = rule(RelocationKind::Symlink, &src, dest.to_str().unwrap());
        let done = relocate(&r).unwrap();
        assert!(src.is_dir());
        assert!(done[0].to.symlink_metadata().unwrap().is_symlink());
        assert!(done[0].to.is_dir());
    }
}
