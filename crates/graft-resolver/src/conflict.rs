//! Conflict explanations gathered while backtracking.

use std::fmt;

use graft_core::identity::PackageIdentity;
use graft_core::version::{Requirement, Version};

/// One package's contribution to the requirement on another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirer {
    pub requirer: PackageIdentity,
    pub requirement: Requirement,
}

impl fmt::Display for Requirer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requires {}", self.requirer, self.requirement)
    }
}

/// A dead end hit during the search: no candidate for `identity` satisfied
/// `requirers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub identity: PackageIdentity,
    pub requirers: Vec<Requirer>,
    pub available: Vec<Version>,
}

/// All conflicts encountered during one resolution run, in discovery order.
#[derive(Debug, Default)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conflict: Conflict) {
        tracing::debug!(identity = %conflict.identity, "conflict: {}", conflict);
        self.conflicts.push(conflict);
    }

    pub fn last(&self) -> Option<&Conflict> {
        self.conflicts.last()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "No version conflicts.");
        }
        writeln!(f, "Version conflicts ({}):", self.conflicts.len())?;
        for c in &self.conflicts {
            writeln!(f, "  {c}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reqs: Vec<String> = self.requirers.iter().map(|r| r.to_string()).collect();
        write!(f, "{}: {}", self.identity, reqs.join(", "))
    }
}

/// Multi-line explanation used by `ResolveError::UnresolvableRequirement`.
pub fn describe_conflict(requirers: &[Requirer], available: &[Version]) -> String {
    let mut out = String::new();
    for r in requirers {
        out.push_str(&format!("  {r}\n"));
    }
    if available.is_empty() {
        out.push_str("  available: none");
    } else {
        let versions: Vec<String> = available.iter().map(|v| v.to_string()).collect();
        out.push_str(&format!("  available: {}", versions.join(", ")));
    }
    out
}
