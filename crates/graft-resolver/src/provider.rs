//! Capability interfaces the resolver consumes.
//!
//! Manifest loading and source access are external collaborators; the
//! resolver only ever talks to them through these traits so a declarative
//! reader, a sandboxed interpreter, or an in-memory fixture can stand behind
//! them.

use std::future::Future;
use std::path::PathBuf;

use graft_core::identity::PackageIdentity;
use graft_core::manifest::ManifestDescriptor;
use graft_core::version::{Requirement, Version};

use crate::error::ResolveError;

/// Supplies the parsed description of a package at a version.
///
/// Implementations must be idempotent. Calls may be expensive; the resolver
/// memoizes them per `(identity, version)` for the duration of a run.
pub trait ManifestProvider: Send + Sync + 'static {
    fn load(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> impl Future<Output = Result<ManifestDescriptor, ResolveError>> + Send;
}

/// Lists and materializes source versions.
///
/// Safe to call concurrently for distinct identities.
pub trait RepositoryProvider: Send + Sync + 'static {
    /// Tagged versions available for `identity`.
    fn list_versions(
        &self,
        identity: &PackageIdentity,
    ) -> impl Future<Output = Result<Vec<Version>, ResolveError>> + Send;

    /// Pin a branch or revision requirement to a concrete version.
    fn resolve_floating(
        &self,
        identity: &PackageIdentity,
        requirement: &Requirement,
    ) -> impl Future<Output = Result<Version, ResolveError>> + Send;

    /// Make `version` available locally and return its path.
    fn checkout(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> impl Future<Output = Result<PathBuf, ResolveError>> + Send;
}
