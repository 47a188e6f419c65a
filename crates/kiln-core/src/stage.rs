//! Pipeline stages, in execution order.

/// One step of the install pipeline.
///
/// Used for progress reporting and to name the failing step in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Host preconditions
    Preconditions,
    /// Dependency presence and versions
    Dependencies,
    /// Source download and checksum verification
    Fetch,
    /// Unpacking the source archive
    Extract,
    /// Build-system generation
    Configure,
    /// Compilation
    Build,
    /// `make install` (or equivalent)
    Install,
    /// Moving installed files into this prefix
    Relocate,
    /// Rewriting dynamic-library references
    Relink,
    /// Rewriting paths inside config fragments
    Patch,
    /// Convenience symlinks
    Link,
    /// Install receipt and opt link
    Finalize,
    /// Optional smoke test
    SelfTest,
}

impl Stage {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preconditions => "preconditions",
            Self::Dependencies => "dependencies",
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Install => "install",
            Self::Relocate => "relocate",
            Self::Relink => "relink",
            Self::Patch => "patch",
            Self::Link => "link",
            Self::Finalize => "finalize",
            Self::SelfTest => "test",
        }
    }
}

impl From<kiln_schema::Phase> for Stage {
    fn from(phase: kiln_schema::Phase) -> Self {
        match phase {
            kiln_schema::Phase::Configure => Self::Configure,
            kiln_schema::Phase::Build => Self::Build,
            kiln_schema::Phase::Install => Self::Install,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
