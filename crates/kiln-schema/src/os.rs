//! Host identity types: the active compiler family and the OS release.
//!
//! Toolchain flag sets and `min_os_version` preconditions are matched against
//! these values.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Compiler family of the active toolchain.
///
/// # Example
///
/// ```
/// use kiln_schema::Compiler;
///
/// assert_eq!(Compiler::from_program("/usr/bin/clang++"), Some(Compiler::Clang));
/// assert_eq!("g++".parse::<Compiler>().unwrap(), Compiler::Gcc);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compiler {
    /// LLVM clang (Apple clang included)
    Clang,
    /// GNU gcc / g++
    Gcc,
}

impl Compiler {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clang => "clang",
            Self::Gcc => "gcc",
        }
    }

    /// Infer the family from a compiler program name or path.
    pub fn from_program(program: &str) -> Option<Self> {
        let name = program.rsplit('/').next().unwrap_or(program);
        if name.contains("clang") {
            Some(Self::Clang)
        } else if name.contains("gcc") || name.contains("g++") {
            Some(Self::Gcc)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Compiler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_program(&s.to_lowercase()).ok_or_else(|| format!("Unknown compiler: {s}"))
    }
}

/// macOS release names accepted wherever an [`OsVersion`] is expected.
const MACOS_RELEASES: &[(&str, u32, u32)] = &[
    ("mountain_lion", 10, 8),
    ("mavericks", 10, 9),
    ("yosemite", 10, 10),
    ("el_capitan", 10, 11),
    ("sierra", 10, 12),
    ("high_sierra", 10, 13),
    ("mojave", 10, 14),
    ("catalina", 10, 15),
    ("big_sur", 11, 0),
    ("monterey", 12, 0),
    ("ventura", 13, 0),
    ("sonoma", 14, 0),
    ("sequoia", 15, 0),
];

/// Operating system version, compared numerically.
///
/// Parses dotted versions with one to three components (`13`, `10.9`,
/// `10.12.6`) as well as macOS release names (`mavericks`, `big_sur`).
///
/// # Example
///
/// ```
/// use kiln_schema::OsVersion;
///
/// let mavericks: OsVersion = "mavericks".parse().unwrap();
/// let sierra: OsVersion = "10.12.6".parse().unwrap();
/// assert!(sierra >= mavericks);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsVersion {
    /// Major component
    pub major: u32,
    /// Minor component (0 when absent)
    pub minor: u32,
    /// Patch component (0 when absent)
    pub patch: u32,
}

impl OsVersion {
    /// Construct a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl std::fmt::Display for OsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

impl std::str::FromStr for OsVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let key = trimmed.to_lowercase().replace([' ', '-'], "_");
        if let Some((_, major, minor)) = MACOS_RELEASES.iter().find(|(name, _, _)| *name == key) {
            return Ok(Self::new(*major, *minor, 0));
        }

        let mut parts = [0u32; 3];
        let mut count = 0;
        for piece in trimmed.split('.') {
            if count == 3 {
                return Err(format!("Invalid OS version: {s}"));
            }
            parts[count] = piece
                .parse()
                .map_err(|_| format!("Invalid OS version: {s}"))?;
            count += 1;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl Serialize for OsVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OsVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
