use graft_core::identity::PackageIdentity;
use graft_core::version::Version;
use miette::Diagnostic;
use thiserror::Error;

use crate::conflict::{describe_conflict, Requirer};

/// Errors produced while resolving versions.
///
/// `Clone` so a single cached fetch failure can be handed to every task that
/// was waiting on the same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ResolveError {
    #[error("no version of '{identity}' satisfies all requirements\n{}", describe_conflict(.requirers, .available))]
    #[diagnostic(
        code(graft::resolve::unresolvable),
        help("relax one of the listed requirements or publish a compatible version")
    )]
    UnresolvableRequirement {
        identity: PackageIdentity,
        requirers: Vec<Requirer>,
        available: Vec<Version>,
    },

    #[error("no manifest found for '{identity}' at {version}")]
    #[diagnostic(code(graft::resolve::manifest_not_found))]
    ManifestNotFound {
        identity: PackageIdentity,
        version: Version,
    },

    #[error("invalid manifest for '{identity}' at {version}: {detail}")]
    #[diagnostic(code(graft::resolve::manifest_invalid))]
    ManifestInvalid {
        identity: PackageIdentity,
        version: Version,
        detail: String,
    },

    #[error("repository for '{identity}' is unavailable: {detail}")]
    #[diagnostic(code(graft::resolve::repository_unavailable))]
    RepositoryUnavailable {
        identity: PackageIdentity,
        detail: String,
    },

    #[error("{operation} for '{identity}' timed out after {seconds}s")]
    #[diagnostic(
        code(graft::resolve::timeout),
        help("raise [resolver] timeout-secs in ~/.graft/config.toml")
    )]
    Timeout {
        identity: PackageIdentity,
        operation: String,
        seconds: u64,
    },

    #[error("pin for '{identity}' is no longer valid: {reason}")]
    #[diagnostic(
        code(graft::resolve::pin_invalidated),
        help("run `graft resolve` without --locked to refresh Graft.resolved")
    )]
    PinInvalidated {
        identity: PackageIdentity,
        reason: String,
    },
}

impl ResolveError {
    /// Failures worth retrying and, once retries run out, worth skipping to
    /// the next candidate for.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ResolveError::RepositoryUnavailable { .. } | ResolveError::Timeout { .. }
        )
    }

    /// The package the error is about.
    pub fn identity(&self) -> &PackageIdentity {
        match self {
            ResolveError::UnresolvableRequirement { identity, .. }
            | ResolveError::ManifestNotFound { identity, .. }
            | ResolveError::ManifestInvalid { identity, .. }
            | ResolveError::RepositoryUnavailable { identity, .. }
            | ResolveError::Timeout { identity, .. }
            | ResolveError::PinInvalidated { identity, .. } => identity,
        }
    }
}
