//! A directory-backed package registry.
//!
//! ```text
//! <root>/<package-name>/<version-or-revision>/Graft.toml
//! <root>/<package-name>/refs.toml        # [branches] main = "<revision>"
//! ```
//!
//! Version directories whose names parse as semantic versions are tags; any
//! other directory is a revision.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use graft_core::identity::PackageIdentity;
use graft_core::manifest::{find_manifest, ManifestDescriptor};
use graft_core::version::{parse_semver, Requirement, Version};
use serde::Deserialize;

use crate::error::ResolveError;
use crate::provider::{ManifestProvider, RepositoryProvider};

pub const REFS_FILE_NAME: &str = "refs.toml";

#[derive(Debug, Default, Deserialize)]
struct Refs {
    #[serde(default)]
    branches: BTreeMap<String, String>,
}

/// Serves manifests and checkouts from a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    root: PathBuf,
}

impl LocalRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.root.join(identity.name())
    }

    fn unavailable(identity: &PackageIdentity, detail: impl Into<String>) -> ResolveError {
        ResolveError::RepositoryUnavailable {
            identity: identity.clone(),
            detail: detail.into(),
        }
    }

    /// Directory names under the package directory, or none if the package
    /// is not in the registry.
    async fn entries(&self, identity: &PackageIdentity) -> Result<Vec<String>, ResolveError> {
        let dir = self.package_dir(identity);
        let mut read = match tokio::fs::read_dir(&dir).await {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(identity = %identity, "not in registry {}", self.root.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(Self::unavailable(identity, format!("{}: {e}", dir.display()))),
        };
        let mut names = Vec::new();
        loop {
            match read.next_entry().await {
                Ok(Some(entry)) => {
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    if is_dir {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                Ok(None) => break,
                Err(e) => return Err(Self::unavailable(identity, format!("{}: {e}", dir.display()))),
            }
        }
        names.sort();
        Ok(names)
    }

    /// The directory holding `version`, if it exists.
    async fn version_dir(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Result<Option<PathBuf>, ResolveError> {
        let dir = self.package_dir(identity);
        let name = match version {
            Version::Semantic(v) => self
                .entries(identity)
                .await?
                .into_iter()
                .find(|name| parse_semver(name).ok().as_ref() == Some(v)),
            Version::Revision(rev) | Version::Branch { revision: rev, .. } => {
                self.entries(identity).await?.into_iter().find(|name| name == rev)
            }
        };
        Ok(name.map(|n| dir.join(n)))
    }

    async fn refs(&self, identity: &PackageIdentity) -> Result<Refs, ResolveError> {
        let path = self.package_dir(identity).join(REFS_FILE_NAME);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Refs::default()),
            Err(e) => return Err(Self::unavailable(identity, format!("{}: {e}", path.display()))),
        };
        toml::from_str(&content)
            .map_err(|e| Self::unavailable(identity, format!("{}: {e}", path.display())))
    }
}

impl ManifestProvider for LocalRegistry {
    async fn load(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Result<ManifestDescriptor, ResolveError> {
        let not_found = || ResolveError::ManifestNotFound {
            identity: identity.clone(),
            version: version.clone(),
        };
        let dir = self.version_dir(identity, version).await?.ok_or_else(not_found)?;
        let path = find_manifest(&dir).ok_or_else(not_found)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Self::unavailable(identity, format!("{}: {e}", path.display())))?;
        ManifestDescriptor::parse(&content, identity.clone()).map_err(|e| {
            ResolveError::ManifestInvalid {
                identity: identity.clone(),
                version: version.clone(),
                detail: e.to_string(),
            }
        })
    }
}

impl RepositoryProvider for LocalRegistry {
    async fn list_versions(&self, identity: &PackageIdentity) -> Result<Vec<Version>, ResolveError> {
        Ok(self
            .entries(identity)
            .await?
            .iter()
            .filter_map(|name| parse_semver(name).ok())
            .map(Version::Semantic)
            .collect())
    }

    async fn resolve_floating(
        &self,
        identity: &PackageIdentity,
        requirement: &Requirement,
    ) -> Result<Version, ResolveError> {
        let version = match requirement {
            Requirement::Branch(name) => {
                let refs = self.refs(identity).await?;
                let revision = refs.branches.get(name).cloned().ok_or_else(|| {
                    ResolveError::ManifestNotFound {
                        identity: identity.clone(),
                        version: Version::Branch {
                            name: name.clone(),
                            revision: "?".to_string(),
                        },
                    }
                })?;
                Version::Branch {
                    name: name.clone(),
                    revision,
                }
            }
            Requirement::Revision(rev) => Version::Revision(rev.clone()),
            other => {
                return Err(Self::unavailable(
                    identity,
                    format!("'{other}' is not a branch or revision"),
                ))
            }
        };
        if self.version_dir(identity, &version).await?.is_none() {
            return Err(ResolveError::ManifestNotFound {
                identity: identity.clone(),
                version,
            });
        }
        Ok(version)
    }

    async fn checkout(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Result<PathBuf, ResolveError> {
        self.version_dir(identity, version)
            .await?
            .ok_or_else(|| ResolveError::ManifestNotFound {
                identity: identity.clone(),
                version: version.clone(),
            })
    }
}
