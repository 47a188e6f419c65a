//! Convenience symlinks inside the prefix (`Frameworks/X.framework`,
//! `include/X -> ../lib/X.framework/Headers`).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use kiln_schema::{LinkName, LinkRule};
use tracing::debug;

use crate::context::Context;
use crate::error::BuildError;
use crate::fsutil;

/// A link rule with templates expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// Source glob
    pub from: String,
    /// Directory receiving the links
    pub into: PathBuf,
    /// Naming scheme
    pub name: LinkName,
}

impl ResolvedLink {
    /// Expand a rule's templates.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Recipe`] for unknown placeholders.
    pub fn resolve(rule: &LinkRule, ctx: &Context<'_>) -> Result<Self, BuildError> {
        Ok(Self {
            from: ctx.render(&rule.from)?,
            into: ctx.render_path(&rule.into)?,
            name: rule.name,
        })
    }
}

fn link_name(source: &Path, scheme: LinkName) -> Option<OsString> {
    match scheme {
        LinkName::Name => source.file_name().map(ToOwned::to_owned),
        LinkName::ParentStem => source.parent()?.file_stem().map(ToOwned::to_owned),
    }
}

/// Create (or replace) a relative symlink in `rule.into` for every match of
/// `rule.from`, returning the created links.
///
/// A glob that matches nothing creates nothing.
///
/// # Errors
///
/// Returns [`BuildError::RelocationFailed`] if a link cannot be created or
/// a non-symlink already occupies its place.
pub fn create_links(rule: &ResolvedLink) -> Result<Vec<PathBuf>, BuildError> {
    let sources = fsutil::expand_glob(&rule.from)
        .map_err(|e| BuildError::Recipe(format!("invalid glob '{}': {e}", rule.from)))?;

    let mut created = Vec::with_capacity(sources.len());
    for source in sources {
        let name = link_name(&source, rule.name)
            .ok_or_else(|| BuildError::relocation(&source, "cannot derive link name"))?;
        let link = rule.into.join(name);
        fsutil::replace_symlink(&source, &link).map_err(|e| BuildError::relocation(&link, e))?;
        debug!(link = %link.display(), target = %source.display(), "linked");
        created.push(link);
    }
    Ok(created)
}
