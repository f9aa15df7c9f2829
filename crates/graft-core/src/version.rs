//! Versions and version requirements.
//!
//! A [`Version`] is either a semantic version (totally ordered), a pinned
//! revision, or a floating branch. Revisions and branches only compare by
//! equality. A [`Requirement`] constrains acceptable versions:
//!
//! - `1.0.0..<2.0.0` half-open range, `>=1.6.0` unbounded range
//! - `=1.5.0` exact pin
//! - `revision:<id>` and `branch:<name>`
//!
//! Requirements intersect into narrower requirements; an empty intersection
//! is `None`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced when parsing versions or requirements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid version string: {0}")]
    InvalidVersion(String),

    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("Empty version range: {0}")]
    EmptyRange(String),

    #[error("Version has no next release: {0}")]
    OutOfRange(String),
}

/// A concrete version a package can be checked out at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    Semantic(semver::Version),
    /// An opaque pinned commit.
    Revision(String),
    /// A floating branch together with the commit it pointed at when resolved.
    Branch { name: String, revision: String },
}

impl Version {
    /// Parse a semantic version, accepting the short `1` and `1.5` spellings.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        parse_semver(s).map(Version::Semantic)
    }

    pub fn semantic(&self) -> Option<&semver::Version> {
        match self {
            Version::Semantic(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_prerelease(&self) -> bool {
        self.semantic().is_some_and(|v| !v.pre.is_empty())
    }

    /// Branch versions float and must be re-resolved on every run.
    pub fn is_floating(&self) -> bool {
        matches!(self, Version::Branch { .. })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Semantic(v) => write!(f, "{v}"),
            Version::Revision(rev) => f.write_str(rev),
            Version::Branch { name, revision } => write!(f, "{name}@{revision}"),
        }
    }
}

/// Semantic versions are ordered by precedence; revisions and branches are
/// only comparable to an identical value.
impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Version::Semantic(a), Version::Semantic(b)) => Some(a.cmp(b)),
            _ if self == other => Some(Ordering::Equal),
            _ => None,
        }
    }
}

/// Parse `MAJOR[.MINOR[.PATCH]][-PRE][+BUILD]`, padding missing components
/// with zero.
pub fn parse_semver(s: &str) -> Result<semver::Version, VersionError> {
    let s = s.trim();
    let split_at = s.find(|c: char| c == '-' || c == '+').unwrap_or(s.len());
    let (core, rest) = s.split_at(split_at);
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{rest}"),
        2 => format!("{core}.0{rest}"),
        _ => s.to_string(),
    };
    semver::Version::parse(&padded).map_err(|_| VersionError::InvalidVersion(s.to_string()))
}

/// A half-open range `[lower, upper)`; `upper == None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub lower: semver::Version,
    pub upper: Option<semver::Version>,
}

impl VersionRange {
    pub fn new(
        lower: semver::Version,
        upper: Option<semver::Version>,
    ) -> Result<Self, VersionError> {
        let range = Self { lower, upper };
        if range.is_empty() {
            return Err(VersionError::EmptyRange(range.to_string()));
        }
        Ok(range)
    }

    fn is_empty(&self) -> bool {
        self.upper.as_ref().is_some_and(|u| *u <= self.lower)
    }

    pub fn contains(&self, version: &semver::Version) -> bool {
        *version >= self.lower && self.upper.as_ref().map_or(true, |u| version < u)
    }

    /// The overlap of two ranges, or `None` when they are disjoint.
    pub fn intersect(&self, other: &VersionRange) -> Option<VersionRange> {
        let lower = self.lower.clone().max(other.lower.clone());
        let upper = match (&self.upper, &other.upper) {
            (Some(a), Some(b)) => Some(a.clone().min(b.clone())),
            (Some(a), None) | (None, Some(a)) => Some(a.clone()),
            (None, None) => None,
        };
        let range = VersionRange { lower, upper };
        (!range.is_empty()).then_some(range)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.upper {
            Some(upper) => write!(f, "{}..<{}", self.lower, upper),
            None => write!(f, ">={}", self.lower),
        }
    }
}

/// A constraint a dependency places on acceptable versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Requirement {
    Range(VersionRange),
    Exact(semver::Version),
    Revision(String),
    Branch(String),
}

impl Requirement {
    /// Every release version.
    pub fn any() -> Self {
        Requirement::Range(VersionRange {
            lower: semver::Version::new(0, 0, 0),
            upper: None,
        })
    }

    /// `[version, next major)`, or `[version, next minor)` for `0.x` versions.
    pub fn up_to_next_major(version: semver::Version) -> Result<Self, VersionError> {
        let upper = if version.major == 0 {
            version
                .minor
                .checked_add(1)
                .map(|minor| semver::Version::new(0, minor, 0))
        } else {
            version
                .major
                .checked_add(1)
                .map(|major| semver::Version::new(major, 0, 0))
        };
        let upper = upper.ok_or_else(|| VersionError::OutOfRange(version.to_string()))?;
        Ok(Requirement::Range(VersionRange {
            lower: version,
            upper: Some(upper),
        }))
    }

    /// `[major.0.0, major+1.0.0)`.
    pub fn major(major: u64) -> Result<Self, VersionError> {
        let next = major
            .checked_add(1)
            .ok_or_else(|| VersionError::OutOfRange(format!("major {major}")))?;
        Ok(Requirement::Range(VersionRange {
            lower: semver::Version::new(major, 0, 0),
            upper: Some(semver::Version::new(next, 0, 0)),
        }))
    }

    pub fn contains(&self, version: &Version) -> bool {
        match (self, version) {
            (Requirement::Range(range), Version::Semantic(v)) => range.contains(v),
            (Requirement::Exact(e), Version::Semantic(v)) => e == v,
            (Requirement::Revision(r), Version::Revision(v)) => r == v,
            (Requirement::Branch(b), Version::Branch { name, .. }) => b == name,
            _ => false,
        }
    }

    /// Whether automatic selection may pick `version`.
    ///
    /// Pre-release versions are only selected when the requirement names a
    /// pre-release of the same `major.minor.patch` (or `allow_prerelease` is
    /// set).
    pub fn selects(&self, version: &Version, allow_prerelease: bool) -> bool {
        if !self.contains(version) {
            return false;
        }
        let Some(v) = version.semantic() else {
            return true;
        };
        if v.pre.is_empty() || allow_prerelease {
            return true;
        }
        let same_triple = |b: &semver::Version| {
            !b.pre.is_empty() && (b.major, b.minor, b.patch) == (v.major, v.minor, v.patch)
        };
        match self {
            Requirement::Exact(e) => e == v,
            Requirement::Range(range) => {
                same_triple(&range.lower) || range.upper.as_ref().is_some_and(same_triple)
            }
            _ => false,
        }
    }

    /// Narrow two requirements to what both accept; `None` when nothing is.
    pub fn intersect(&self, other: &Requirement) -> Option<Requirement> {
        match (self, other) {
            (Requirement::Range(a), Requirement::Range(b)) => a.intersect(b).map(Requirement::Range),
            (Requirement::Exact(e), Requirement::Range(r))
            | (Requirement::Range(r), Requirement::Exact(e)) => {
                r.contains(e).then(|| Requirement::Exact(e.clone()))
            }
            (Requirement::Exact(a), Requirement::Exact(b)) => {
                (a == b).then(|| Requirement::Exact(a.clone()))
            }
            (Requirement::Revision(a), Requirement::Revision(b)) => {
                (a == b).then(|| Requirement::Revision(a.clone()))
            }
            (Requirement::Branch(a), Requirement::Branch(b)) => {
                (a == b).then(|| Requirement::Branch(a.clone()))
            }
            _ => None,
        }
    }

    /// Revision and branch requirements are resolved through the repository
    /// rather than by picking among tags.
    pub fn is_reference(&self) -> bool {
        matches!(self, Requirement::Revision(_) | Requirement::Branch(_))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Range(range) => write!(f, "{range}"),
            Requirement::Exact(v) => write!(f, "={v}"),
            Requirement::Revision(r) => write!(f, "revision:{r}"),
            Requirement::Branch(b) => write!(f, "branch:{b}"),
        }
    }
}

impl FromStr for Requirement {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rev) = s.strip_prefix("revision:") {
            return non_empty(rev, s).map(|r| Requirement::Revision(r.to_string()));
        }
        if let Some(branch) = s.strip_prefix("branch:") {
            return non_empty(branch, s).map(|b| Requirement::Branch(b.to_string()));
        }
        if let Some(exact) = s.strip_prefix('=') {
            return parse_semver(exact).map(Requirement::Exact);
        }
        if let Some(lower) = s.strip_prefix(">=") {
            return VersionRange::new(parse_semver(lower)?, None).map(Requirement::Range);
        }
        if let Some((lower, upper)) = s.split_once("..<") {
            let range = VersionRange::new(parse_semver(lower)?, Some(parse_semver(upper)?))?;
            return Ok(Requirement::Range(range));
        }
        Err(VersionError::InvalidRequirement(s.to_string()))
    }
}

fn non_empty<'a>(value: &'a str, whole: &str) -> Result<&'a str, VersionError> {
    let value = value.trim();
    if value.is_empty() {
        Err(VersionError::InvalidRequirement(whole.to_string()))
    } else {
        Ok(value)
    }
}
