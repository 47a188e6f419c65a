//! Host preconditions and dependency presence.
//!
//! Both run before anything touches the filesystem. A precondition is a
//! plain predicate over the host plus a message; the first one that fails
//! aborts the run.

use kiln_schema::{Check, Dependency, Precondition};
use tracing::debug;

use crate::context::Context;
use crate::error::BuildError;
use crate::host::{Host, InstalledDependency};

/// Evaluate a single check against the host.
///
/// # Errors
///
/// Returns [`BuildError::Recipe`] if a path template cannot be rendered.
pub fn holds(check: &Check, ctx: &Context<'_>) -> Result<bool, BuildError> {
    let host = ctx.host();
    Ok(match check {
        Check::PathAbsent { path } => !crate::fsutil::exists_no_follow(&ctx.render_path(path)?),
        Check::PathExists { path } => ctx.render_path(path)?.exists(),
        Check::MinOsVersion { version } => host.os_version().is_some_and(|v| v >= *version),
        Check::Tool { name } => host.has_tool(name),
    })
}

/// Evaluate every precondition in order.
///
/// # Errors
///
/// Returns [`BuildError::PreconditionFailed`] with the message of the first
/// failing precondition.
pub fn check_all(preconditions: &[Precondition], ctx: &Context<'_>) -> Result<(), BuildError> {
    for p in preconditions {
        let ok = holds(&p.check, ctx)?;
        debug!(check = ?p.check, ok, "precondition");
        if !ok {
            return Err(BuildError::PreconditionFailed(p.failure_message()));
        }
    }
    Ok(())
}

/// Resolve every declared dependency against the host.
///
/// # Errors
///
/// Returns [`BuildError::MissingDependency`] for the first dependency that
/// is absent or whose installed version does not satisfy its requirement.
pub fn check_dependencies(
    dependencies: &[Dependency],
    host: &Host,
) -> Result<Vec<InstalledDependency>, BuildError> {
    let mut resolved = Vec::with_capacity(dependencies.len());
    for dep in dependencies {
        let Some(installed) = host.installed(&dep.name) else {
            return Err(BuildError::MissingDependency(dep.name.clone()));
        };

        if let Some(req) = &dep.version {
            match &installed.version {
                Some(v) if req.matches(v) => {}
                Some(v) => {
                    return Err(BuildError::MissingDependency(format!(
                        "{} {req} (found {v})",
                        dep.name
                    )));
                }
                None => {
                    return Err(BuildError::MissingDependency(format!(
                        "{} {req} (installed version unknown)",
                        dep.name
                    )));
                }
            }
        }

        debug!(name = %dep.name, prefix = %installed.prefix.display(), "dependency present");
        resolved.push(installed);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Layout;
    use kiln_schema::{DependencyKind, OsVersion};
    use tempfile::tempdir;

    fn precondition(check: Check, message: &str) -> Precondition {
        Precondition {
            check,
            message: Some(message.to_string()),
        }
    }

    #[test]
    fn path_absent_fails_when_conflict_exists() {
        let tmp = tempdir().unwrap();
        let qt5 = tmp.path().join("qt5");
        std::fs::create_dir_all(qt5.join("lib/QtWebKit.framework")).unwrap();

        let host = Host::new(tmp.path()).with_dependency("qt5", &qt5, None);
        let layout = Layout::new(tmp.path(), "qt5-webkit", "5.7.0");
        let ctx = Context::new(&host, &layout);

        let pre = [precondition(
            Check::PathAbsent {
                path: "{dep:qt5:lib}/QtWebKit.framework".into(),
            },
            "Qt5 already has QtWebKit installed",
        )];
        let err = check_all(&pre, &ctx).unwrap_err();
        assert!(
            matches!(err, BuildError::PreconditionFailed(ref m) if m == "Qt5 already has QtWebKit installed")
        );

        std::fs::remove_dir_all(qt5.join("lib/QtWebKit.framework")).unwrap();
        check_all(&pre, &ctx).unwrap();
    }

    #[test]
    fn unknown_os_fails_min_version() {
        let tmp = tempdir().unwrap();
        let layout = Layout::new(tmp.path(), "x", "1");
        let check = Check::MinOsVersion {
            version: OsVersion::new(10, 8, 0),
        };

        let unknown = Host::new(tmp.path());
        assert!(!holds(&check, &Context::new(&unknown, &layout)).unwrap());

        let sierra = Host::new(tmp.path()).with_os_version(Some(OsVersion::new(10, 12, 0)));
        assert!(holds(&check, &Context::new(&sierra, &layout)).unwrap());
    }

    #[test]
    fn dependency_version_requirements() {
        let tmp = tempdir().unwrap();
        let qt5 = tmp.path().join("qt5");
        std::fs::create_dir_all(&qt5).unwrap();

        let dep = |req: Option<&str>| Dependency {
            name: "qt5".into(),
            version: req.map(|r| r.parse().unwrap()),
            kind: DependencyKind::Runtime,
        };

        let host = Host::new(tmp.path()).with_dependency("qt5", &qt5, Some("5.7.0"));
        assert_eq!(check_dependencies(&[dep(Some(">=5.7"))], &host).unwrap().len(), 1);
        assert!(matches!(
            check_dependencies(&[dep(Some(">=5.9"))], &host),
            Err(BuildError::MissingDependency(_))
        ));

        let unversioned = Host::new(tmp.path()).with_dependency("qt5", &qt5, None);
        assert!(check_dependencies(&[dep(None)], &unversioned).is_ok());
        assert!(check_dependencies(&[dep(Some(">=5"))], &unversioned).is_err());
    }

    #[test]
    fn absent_dependency_is_missing() {
        let tmp = tempdir().unwrap();
        let host = Host::new(tmp.path());
        let deps = [Dependency {
            name: "qt5".into(),
            version: None,
            kind: DependencyKind::Runtime,
        }];
        let err = check_dependencies(&deps, &host).unwrap_err();
        assert!(matches!(err, BuildError::MissingDependency(ref n) if n == "qt5"));
    }
}
