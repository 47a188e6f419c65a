//! `{placeholder}` expansion for recipe strings.
//!
//! A placeholder is a brace-delimited name that starts with a lowercase
//! letter and contains only `[a-z0-9_:.-]`. Anything else in braces
//! (`${1}`, `{2,3}`) is left untouched, so regex replacement syntax survives.

use thiserror::Error;

/// Errors raised while expanding a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The placeholder is well-formed but has no value.
    #[error("unknown placeholder {{{0}}}")]
    Unknown(String),
}

/// Placeholders naming a value or directory of the package being built.
pub const BUILTIN: &[&str] = &[
    "name",
    "version",
    "jobs",
    "home",
    "prefix",
    "lib",
    "bin",
    "include",
    "libexec",
    "frameworks",
    "opt_prefix",
    "opt_lib",
    "opt_bin",
    "opt_libexec",
];

/// Subdirectories accepted in `{dep:NAME:SUBDIR}`.
pub const DEPENDENCY_SUBDIRS: &[&str] = &["lib", "bin", "include", "libexec", "share"];

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | ':' | '.' | '-')
        })
}

/// Iterate over `(start, end, name)` for each placeholder in `s`, where
/// `start..end` spans the braces.
fn scan(s: &str) -> impl Iterator<Item = (usize, usize, &str)> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        while let Some(open) = s[pos..].find('{').map(|i| pos + i) {
            let Some(close) = s[open..].find('}').map(|i| open + i) else {
                pos = s.len();
                return None;
            };
            let name = &s[open + 1..close];
            if is_name(name) {
                pos = close + 1;
                return Some((open, close + 1, name));
            }
            pos = open + 1;
        }
        None
    })
}

/// Names of all placeholders appearing in `s`, in order.
///
/// ```
/// use kiln_schema::template::placeholders;
///
/// assert_eq!(placeholders("{dep:qt5}/lib ${1}{prefix}"), vec!["dep:qt5", "prefix"]);
/// ```
pub fn placeholders(s: &str) -> Vec<&str> {
    scan(s).map(|(_, _, name)| name).collect()
}

/// Expand every placeholder in `s` using `lookup`.
///
/// # Errors
///
/// Returns [`TemplateError::Unknown`] for the first placeholder `lookup`
/// cannot resolve.
pub fn render<F>(s: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for (start, end, name) in scan(s) {
        let value = lookup(name).ok_or_else(|| TemplateError::Unknown(name.to_string()))?;
        out.push_str(&s[last..start]);
        out.push_str(&value);
        last = end;
    }
    out.push_str(&s[last..]);
    Ok(out)
}
