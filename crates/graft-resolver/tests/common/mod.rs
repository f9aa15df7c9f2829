#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use graft_core::config::ResolverConfig;
use graft_core::identity::PackageIdentity;
use graft_core::manifest::ManifestDescriptor;
use graft_core::version::{Requirement, Version};
use graft_resolver::provider::{ManifestProvider, RepositoryProvider};
use graft_resolver::ResolveError;

pub fn id(name: &str) -> PackageIdentity {
    PackageIdentity::from_location(&format!("https://example.com/{name}"))
}

pub fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

pub fn root_id() -> PackageIdentity {
    PackageIdentity::from_location("/work/app")
}

/// Build a manifest for `name` depending on `(package, requirement)` pairs.
///
/// Each package gets one library target and one product, both named after
/// the package.
pub fn manifest(identity: PackageIdentity, deps: &[(&str, &str)]) -> ManifestDescriptor {
    let name = identity.name().to_string();
    let mut toml = format!("[package]\nname = \"{name}\"\n");
    for (dep, req) in deps {
        toml.push_str(&format!(
            "\n[[dependencies]]\nurl = \"https://example.com/{dep}\"\nversion = \"{req}\"\n"
        ));
    }
    toml.push_str(&format!("\n[[targets]]\nname = \"{name}\"\n"));
    toml.push_str(&format!(
        "\n[[products]]\nname = \"{name}\"\ntargets = [\"{name}\"]\n"
    ));
    ManifestDescriptor::parse(&toml, identity).unwrap()
}

pub fn root(deps: &[(&str, &str)]) -> ManifestDescriptor {
    manifest(root_id(), deps)
}

/// Test configuration: short timeout, no retries.
pub fn config() -> ResolverConfig {
    ResolverConfig {
        timeout_secs: 1,
        max_retries: 0,
        retry_delay_ms: 10,
        ..ResolverConfig::default()
    }
}

/// In-memory repository and manifest source with call accounting.
#[derive(Default)]
pub struct MockRepo {
    versions: HashMap<PackageIdentity, Vec<Version>>,
    manifests: HashMap<(PackageIdentity, Version), Result<ManifestDescriptor, ResolveError>>,
    branches: HashMap<(PackageIdentity, String), String>,
    slow_loads: HashMap<(PackageIdentity, Version), Duration>,
    list_failures: Mutex<HashMap<PackageIdentity, u32>>,
    list_calls: Mutex<HashMap<PackageIdentity, usize>>,
    load_calls: Mutex<HashMap<(PackageIdentity, Version), usize>>,
}

impl MockRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `name` at `version` with the given dependencies.
    pub fn publish(&mut self, name: &str, version: &str, deps: &[(&str, &str)]) -> &mut Self {
        let identity = id(name);
        let version = v(version);
        self.versions
            .entry(identity.clone())
            .or_default()
            .push(version.clone());
        self.manifests
            .insert((identity.clone(), version), Ok(manifest(identity, deps)));
        self
    }

    /// Publish a version whose manifest fails to load with `error`.
    pub fn publish_broken(&mut self, name: &str, version: &str, error: ResolveError) -> &mut Self {
        let identity = id(name);
        let version = v(version);
        self.versions
            .entry(identity.clone())
            .or_default()
            .push(version.clone());
        self.manifests.insert((identity, version), Err(error));
        self
    }

    /// Point `branch` of `name` at `revision`, whose manifest has `deps`.
    pub fn branch(&mut self, name: &str, branch: &str, revision: &str, deps: &[(&str, &str)]) -> &mut Self {
        let identity = id(name);
        self.branches
            .insert((identity.clone(), branch.to_string()), revision.to_string());
        let version = Version::Branch {
            name: branch.to_string(),
            revision: revision.to_string(),
        };
        self.manifests
            .insert((identity.clone(), version), Ok(manifest(identity, deps)));
        self
    }

    pub fn slow_load(&mut self, name: &str, version: &str, delay: Duration) -> &mut Self {
        self.slow_loads.insert((id(name), v(version)), delay);
        self
    }

    /// Fail the next `times` version listings for `name`.
    pub fn fail_listing(&mut self, name: &str, times: u32) -> &mut Self {
        self.list_failures
            .lock()
            .unwrap()
            .insert(id(name), times);
        self
    }

    pub fn list_calls(&self, name: &str) -> usize {
        self.list_calls
            .lock()
            .unwrap()
            .get(&id(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn load_calls(&self, name: &str, version: &str) -> usize {
        self.load_calls
            .lock()
            .unwrap()
            .get(&(id(name), v(version)))
            .copied()
            .unwrap_or(0)
    }

    pub fn max_load_calls(&self) -> usize {
        self.load_calls
            .lock()
            .unwrap()
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }
}

impl ManifestProvider for MockRepo {
    async fn load(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Result<ManifestDescriptor, ResolveError> {
        let key = (identity.clone(), version.clone());
        *self.load_calls.lock().unwrap().entry(key.clone()).or_default() += 1;
        if let Some(delay) = self.slow_loads.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        match self.manifests.get(&key) {
            Some(result) => result.clone(),
            None => Err(ResolveError::ManifestNotFound {
                identity: identity.clone(),
                version: version.clone(),
            }),
        }
    }
}

impl RepositoryProvider for MockRepo {
    async fn list_versions(&self, identity: &PackageIdentity) -> Result<Vec<Version>, ResolveError> {
        *self
            .list_calls
            .lock()
            .unwrap()
            .entry(identity.clone())
            .or_default() += 1;
        {
            let mut failures = self.list_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(identity) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ResolveError::RepositoryUnavailable {
                        identity: identity.clone(),
                        detail: "connection reset".to_string(),
                    });
                }
            }
        }
        tokio::task::yield_now().await;
        Ok(self.versions.get(identity).cloned().unwrap_or_default())
    }

    async fn resolve_floating(
        &self,
        identity: &PackageIdentity,
        requirement: &Requirement,
    ) -> Result<Version, ResolveError> {
        match requirement {
            Requirement::Branch(name) => self
                .branches
                .get(&(identity.clone(), name.clone()))
                .map(|revision| Version::Branch {
                    name: name.clone(),
                    revision: revision.clone(),
                })
                .ok_or_else(|| ResolveError::RepositoryUnavailable {
                    identity: identity.clone(),
                    detail: format!("no branch {name}"),
                }),
            Requirement::Revision(rev) => Ok(Version::Revision(rev.clone())),
            other => panic!("not a reference: {other}"),
        }
    }

    async fn checkout(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Result<PathBuf, ResolveError> {
        Ok(PathBuf::from("/checkouts")
            .join(identity.name())
            .join(version.to_string()))
    }
}
