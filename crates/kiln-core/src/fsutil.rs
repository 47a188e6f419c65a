//! Small filesystem helpers shared by relocation and link creation.

use std::io;
use std::path::{Path, PathBuf};

/// Compute a relative path from `from_dir` to `to_path`.
///
/// Both arguments must be absolute paths. The function walks up from
/// `from_dir` to the common ancestor and then descends into `to_path`.
///
/// Example: `relative_path("/a/b/c", "/a/b/d/e")` returns `"../d/e"`.
pub fn relative_path(from_dir: &Path, to_path: &Path) -> PathBuf {
    let from_components: Vec<_> = from_dir.components().collect();
    let to_components: Vec<_> = to_path.components().collect();

    let common_len = from_components
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common_len..from_components.len() {
        result.push("..");
    }
    for part in &to_components[common_len..] {
        result.push(part);
    }
    result
}

/// Whether anything (including a dangling symlink) exists at `path`.
pub fn exists_no_follow(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Paths matching `pattern`, sorted.
///
/// A pattern without glob metacharacters matches itself if anything exists
/// there, so literal paths and dangling symlinks are handled uniformly.
///
/// # Errors
///
/// Returns the parse error for a malformed pattern.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>, glob::PatternError> {
    if !pattern.contains(['*', '?', '[']) {
        let path = PathBuf::from(pattern);
        return Ok(if exists_no_follow(&path) { vec![path] } else { Vec::new() });
    }
    let mut matches: Vec<PathBuf> = glob::glob(pattern)?.filter_map(Result::ok).collect();
    matches.sort();
    Ok(matches)
}

/// Move a file, directory or symlink, falling back to copy-and-remove when
/// `rename(2)` fails (e.g. across filesystems).
///
/// # Errors
///
/// Returns the copy or removal error if the fallback also fails.
pub fn move_path(src: &Path, dst: &Path) -> io::Result<()> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let meta = src.symlink_metadata()?;
    if meta.is_symlink() {
        let target = std::fs::read_link(src)?;
        std::os::unix::fs::symlink(target, dst)?;
        std::fs::remove_file(src)
    } else if meta.is_dir() {
        std::fs::create_dir_all(dst)?;
        fs_extra::dir::copy(
            src,
            dst,
            &fs_extra::dir::CopyOptions::new()
                .content_only(true)
                .overwrite(true),
        )
        .map_err(|e| io::Error::other(format!("copy failed: {e}")))?;
        std::fs::remove_dir_all(src)
    } else {
        std::fs::copy(src, dst)?;
        std::fs::remove_file(src)
    }
}

/// Create a relative symlink at `link` pointing to `target`, replacing an
/// existing symlink.
///
/// # Errors
///
/// Returns [`io::ErrorKind::AlreadyExists`] if `link` exists and is not a
/// symlink, or any error from creating the link.
pub fn replace_symlink(target: &Path, link: &Path) -> io::Result<()> {
    if let Ok(meta) = link.symlink_metadata() {
        if !meta.is_symlink() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a symlink", link.display()),
            ));
        }
        std::fs::remove_file(link)?;
    }
    let dir = link.parent().unwrap_or_else(|| Path::new("/"));
    std::fs::create_dir_all(dir)?;
    std::os::unix::fs::symlink(relative_path(dir, target), link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_relative_path_same_dir() {
        let result = relative_path(Path::new("/a/b/c"), Path::new("/a/b/c/file"));
        assert_eq!(result, PathBuf::from("file"));
    }

    #[test]
    fn test_relative_path_cross_dir() {
        let result = relative_path(Path::new("/a/b/include"), Path::new("/a/b/lib/X.framework/Headers"));
        assert_eq!(result, PathBuf::from("../lib/X.framework/Headers"));
    }

    #[test]
    fn expand_glob_literal_and_wildcard() {
        let tmp = tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("lib/QtWebKit.framework")).unwrap();
        std::fs::create_dir_all(tmp.path().join("lib/QtWebKitWidgets.framework")).unwrap();
        std::fs::create_dir_all(tmp.path().join("lib/QtCore.framework")).unwrap();

        let pattern = format!("{}/lib/QtWebKit*.framework", tmp.path().display());
        let found = expand_glob(&pattern).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("QtWebKit.framework"));

        let literal = tmp.path().join("lib/QtCore.framework");
        assert_eq!(expand_glob(literal.to_str().unwrap()).unwrap(), vec![literal]);
        assert!(expand_glob("/definitely/not/here").unwrap().is_empty());
    }

    #[test]
    fn move_path_moves_directories() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src/QtWebKit.framework");
        std::fs::create_dir_all(src.join("Headers")).unwrap();
        std::fs::write(src.join("Headers/qwebview.h"), "").unwrap();

        let dst = tmp.path().join("dst/QtWebKit.framework");
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        move_path(&src, &dst).unwrap();

        assert!(!src.exists());
        assert!(dst.join("Headers/qwebview.h").is_file());
    }

    #[test]
    fn replace_symlink_is_relative_and_idempotent() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("lib/X.framework");
        std::fs::create_dir_all(&target).unwrap();
        let link = tmp.path().join("Frameworks/X.framework");

        replace_symlink(&target, &link).unwrap();
        replace_symlink(&target, &link).unwrap();

        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            PathBuf::from("../lib/X.framework")
        );
        assert!(link.is_dir());
    }

    #[test]
    fn replace_symlink_refuses_real_files() {
        let tmp = tempdir().unwrap();
        let link = tmp.path().join("include");
        std::fs::create_dir_all(&link).unwrap();
        let err = replace_symlink(tmp.path(), &link).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
