//! Backtracking version solver.
//!
//! Decisions are made one identity at a time, in breadth-first order from the
//! root with siblings ordered by identity. Each decision tries its candidates
//! newest first; a candidate whose dependencies contradict an earlier
//! decision is rejected, and when a decision runs out of candidates the
//! search pops back to the previous one. Provider calls for the frontier are
//! prefetched concurrently, but every decision is taken sequentially, so the
//! outcome depends only on the inputs.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use graft_core::config::ResolverConfig;
use graft_core::identity::PackageIdentity;
use graft_core::manifest::ManifestDescriptor;
use graft_core::version::{Requirement, Version};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::FetchCache;
use crate::conflict::{Conflict, ConflictReport, Requirer};
use crate::error::ResolveError;
use crate::provider::{ManifestProvider, RepositoryProvider};

/// A package with its chosen version, manifest and local checkout.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub identity: PackageIdentity,
    /// Source location as first declared by a requirer.
    pub location: String,
    pub version: Version,
    pub manifest: Arc<ManifestDescriptor>,
    pub path: PathBuf,
}

/// The outcome of a successful resolution.
#[derive(Debug)]
pub struct Resolution {
    /// One entry per identity, ordered by identity.
    pub packages: BTreeMap<PackageIdentity, ResolvedPackage>,
    /// Who required each resolved package, and with what requirement.
    pub requirers: BTreeMap<PackageIdentity, Vec<Requirer>>,
    /// Dead ends the search backtracked out of.
    pub conflicts: ConflictReport,
}

impl Resolution {
    pub fn get(&self, identity: &PackageIdentity) -> Option<&ResolvedPackage> {
        self.packages.get(identity)
    }

    /// `identity -> version` for every resolved package.
    pub fn assignments(&self) -> BTreeMap<PackageIdentity, Version> {
        self.packages
            .iter()
            .map(|(id, pkg)| (id.clone(), pkg.version.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Resolves a root manifest against a pair of providers.
pub struct Resolver<M, R> {
    cache: Arc<FetchCache<M, R>>,
    fetch_limit: Arc<Semaphore>,
}

impl<M: ManifestProvider, R: RepositoryProvider> Resolver<M, R> {
    pub fn new(manifests: Arc<M>, repository: Arc<R>, config: ResolverConfig) -> Self {
        let permits = config.max_concurrent_fetches.max(1);
        Self {
            cache: Arc::new(FetchCache::new(manifests, repository, config)),
            fetch_limit: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn cache(&self) -> &Arc<FetchCache<M, R>> {
        &self.cache
    }

    /// Resolve every package reachable from `root`.
    ///
    /// `preferred` holds retained pins: a pinned version still accepted by the
    /// current requirements is tried without listing the repository. If it
    /// cannot be used the identity is widened to every matching version.
    pub async fn resolve(
        &self,
        root: &ManifestDescriptor,
        preferred: &BTreeMap<PackageIdentity, Version>,
    ) -> Result<Resolution, ResolveError> {
        tracing::info!(
            root = %root.identity,
            dependencies = root.dependencies.len(),
            pinned = preferred.len(),
            "resolving"
        );
        let search = Search {
            cache: &self.cache,
            fetch_limit: &self.fetch_limit,
            root,
            preferred,
            stack: Vec::new(),
            conflicts: ConflictReport::new(),
            last_failure: None,
            prefetch: JoinSet::new(),
        };
        search.run().await
    }
}

/// Versions left to try for one decision.
#[derive(Debug, Default)]
struct Candidates {
    versions: VecDeque<Version>,
    /// Set while only a retained pin is queued. Exhausting the pin widens the
    /// decision to every version matching this requirement.
    widen: Option<Requirement>,
    pinned: Option<Version>,
}

impl Candidates {
    fn exact(version: Version) -> Self {
        Self {
            versions: VecDeque::from([version]),
            ..Self::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.widen.is_none()
    }
}

struct Decision {
    identity: PackageIdentity,
    version: Version,
    manifest: Arc<ManifestDescriptor>,
    remaining: Candidates,
}

/// State of one resolution run.
struct Search<'a, M, R> {
    cache: &'a Arc<FetchCache<M, R>>,
    fetch_limit: &'a Arc<Semaphore>,
    root: &'a ManifestDescriptor,
    preferred: &'a BTreeMap<PackageIdentity, Version>,
    stack: Vec<Decision>,
    conflicts: ConflictReport,
    last_failure: Option<ResolveError>,
    /// Dropped with the search, which aborts fetches nobody needs anymore.
    prefetch: JoinSet<()>,
}

impl<'a, M: ManifestProvider, R: RepositoryProvider> Search<'a, M, R> {
    async fn run(mut self) -> Result<Resolution, ResolveError> {
        self.prefetch_dependencies(self.root);
        let mut pending: Option<(PackageIdentity, Candidates)> = None;

        loop {
            let (identity, mut candidates) = match pending.take() {
                Some(next) => next,
                None => {
                    let Some(identity) = self.next_undecided() else {
                        break;
                    };
                    match self.open_decision(&identity).await? {
                        Some(candidates) => (identity, candidates),
                        None => {
                            pending = Some(self.backtrack()?);
                            continue;
                        }
                    }
                }
            };

            match self.choose(&identity, &mut candidates).await? {
                Some((version, manifest)) => {
                    tracing::debug!(identity = %identity, version = %version, "decided");
                    self.prefetch_dependencies(&manifest);
                    self.stack.push(Decision {
                        identity,
                        version,
                        manifest,
                        remaining: candidates,
                    });
                }
                None => pending = Some(self.backtrack()?),
            }
        }

        self.finish().await
    }

    /// Compute the candidates for a fresh decision, or `None` when the
    /// identity is already known to be in conflict.
    async fn open_decision(
        &mut self,
        identity: &PackageIdentity,
    ) -> Result<Option<Candidates>, ResolveError> {
        let requirers = self
            .requirements()
            .remove(identity)
            .unwrap_or_default();
        let Some(requirement) = intersect_all(&requirers) else {
            self.record_conflict(identity, requirers).await;
            return Ok(None);
        };

        match self.candidates_for(identity, &requirement).await {
            Ok(candidates) if candidates.is_empty() => {
                self.record_conflict(identity, requirers).await;
                Ok(None)
            }
            Ok(candidates) => Ok(Some(candidates)),
            Err(e) if e.is_transient() => {
                tracing::warn!(identity = %identity, "{e}");
                self.last_failure = Some(e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn candidates_for(
        &self,
        identity: &PackageIdentity,
        requirement: &Requirement,
    ) -> Result<Candidates, ResolveError> {
        if requirement.is_reference() {
            let version = self.cache.resolve_floating(identity, requirement).await?;
            return Ok(Candidates::exact(version));
        }
        if let Some(pin) = self.preferred.get(identity) {
            if !pin.is_floating() && requirement.contains(pin) {
                tracing::debug!(identity = %identity, version = %pin, "trying pinned version");
                return Ok(Candidates {
                    versions: VecDeque::from([pin.clone()]),
                    widen: Some(requirement.clone()),
                    pinned: Some(pin.clone()),
                });
            }
        }
        self.matching(identity, requirement, None).await
    }

    /// Listed versions accepted by `requirement`, newest first.
    async fn matching(
        &self,
        identity: &PackageIdentity,
        requirement: &Requirement,
        exclude: Option<&Version>,
    ) -> Result<Candidates, ResolveError> {
        let allow_prerelease = self.cache.config().allow_prerelease;
        let versions = self.cache.versions(identity).await?;
        let versions = versions
            .iter()
            .filter(|v| requirement.selects(v, allow_prerelease))
            .filter(|v| Some(*v) != exclude)
            .cloned()
            .collect();
        Ok(Candidates {
            versions,
            ..Candidates::default()
        })
    }

    /// Take candidates in order until one loads and agrees with every earlier
    /// decision.
    async fn choose(
        &mut self,
        identity: &PackageIdentity,
        candidates: &mut Candidates,
    ) -> Result<Option<(Version, Arc<ManifestDescriptor>)>, ResolveError> {
        let requirements = self.requirements();
        loop {
            let Some(version) = candidates.versions.pop_front() else {
                let Some(requirement) = candidates.widen.take() else {
                    return Ok(None);
                };
                if let Some(pin) = &candidates.pinned {
                    tracing::info!(
                        identity = %identity,
                        version = %pin,
                        "pinned version cannot be used; considering all matching versions"
                    );
                }
                match self
                    .matching(identity, &requirement, candidates.pinned.as_ref())
                    .await
                {
                    Ok(wider) => candidates.versions = wider.versions,
                    Err(e) if e.is_transient() => {
                        self.last_failure = Some(e);
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                }
                continue;
            };

            let manifest = match self.cache.manifest(identity, &version).await {
                Ok(manifest) => manifest,
                Err(e) if e.is_transient() => {
                    tracing::warn!(identity = %identity, version = %version, "skipping candidate: {e}");
                    self.last_failure = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.incompatibility(&manifest, &requirements).await {
                Some(conflict) => {
                    tracing::debug!(
                        identity = %identity,
                        version = %version,
                        "rejected: conflicts on {}",
                        conflict.identity
                    );
                    self.record(conflict);
                }
                None => return Ok(Some((version, manifest))),
            }
        }
    }

    /// The first dependency of `manifest` that contradicts the current state.
    async fn incompatibility(
        &self,
        manifest: &ManifestDescriptor,
        requirements: &BTreeMap<PackageIdentity, Vec<Requirer>>,
    ) -> Option<Conflict> {
        let decided = self.decided();
        for dep in &manifest.dependencies {
            if dep.identity == self.root.identity || dep.identity == manifest.identity {
                continue;
            }
            let mut requirers = requirements.get(&dep.identity).cloned().unwrap_or_default();
            requirers.push(Requirer {
                requirer: manifest.identity.clone(),
                requirement: dep.requirement.clone(),
            });

            let compatible = match decided.get(&dep.identity) {
                Some(d) => dep.requirement.contains(&d.version),
                None => intersect_all(&requirers).is_some(),
            };
            if !compatible {
                let available = self.available(&dep.identity).await;
                return Some(Conflict {
                    identity: dep.identity.clone(),
                    requirers,
                    available,
                });
            }
        }
        None
    }

    /// Undo the newest decision and resume it with its untried candidates.
    fn backtrack(&mut self) -> Result<(PackageIdentity, Candidates), ResolveError> {
        match self.stack.pop() {
            Some(decision) => {
                tracing::debug!(
                    identity = %decision.identity,
                    version = %decision.version,
                    "backtracking"
                );
                Ok((decision.identity, decision.remaining))
            }
            None => Err(self.last_failure.take().unwrap_or_else(|| {
                ResolveError::UnresolvableRequirement {
                    identity: self.root.identity.clone(),
                    requirers: Vec::new(),
                    available: Vec::new(),
                }
            })),
        }
    }

    async fn record_conflict(&mut self, identity: &PackageIdentity, requirers: Vec<Requirer>) {
        let available = self.available(identity).await;
        self.record(Conflict {
            identity: identity.clone(),
            requirers,
            available,
        });
    }

    fn record(&mut self, conflict: Conflict) {
        self.last_failure = Some(ResolveError::UnresolvableRequirement {
            identity: conflict.identity.clone(),
            requirers: conflict.requirers.clone(),
            available: conflict.available.clone(),
        });
        self.conflicts.add(conflict);
    }

    async fn available(&self, identity: &PackageIdentity) -> Vec<Version> {
        self.cache
            .cached_versions(identity)
            .await
            .map(|v| v.to_vec())
            .unwrap_or_default()
    }

    fn decided(&self) -> HashMap<&PackageIdentity, &Decision> {
        self.stack.iter().map(|d| (&d.identity, d)).collect()
    }

    /// Requirements contributed by the root and every decided package.
    fn requirements(&self) -> BTreeMap<PackageIdentity, Vec<Requirer>> {
        let mut map: BTreeMap<PackageIdentity, Vec<Requirer>> = BTreeMap::new();
        let manifests =
            std::iter::once(self.root).chain(self.stack.iter().map(|d| d.manifest.as_ref()));
        for manifest in manifests {
            for dep in &manifest.dependencies {
                if dep.identity == self.root.identity {
                    continue;
                }
                map.entry(dep.identity.clone()).or_default().push(Requirer {
                    requirer: manifest.identity.clone(),
                    requirement: dep.requirement.clone(),
                });
            }
        }
        map
    }

    /// First undecided identity in breadth-first order from the root.
    fn next_undecided(&self) -> Option<PackageIdentity> {
        let decided = self.decided();
        let mut seen: HashSet<&PackageIdentity> = HashSet::new();
        let mut queue: VecDeque<&PackageIdentity> = sorted_dependencies(self.root).into();
        while let Some(identity) = queue.pop_front() {
            if identity == &self.root.identity || !seen.insert(identity) {
                continue;
            }
            match decided.get(identity) {
                Some(decision) => queue.extend(sorted_dependencies(&decision.manifest)),
                None => return Some(identity.clone()),
            }
        }
        None
    }

    /// Warm the cache for dependencies nobody has decided yet.
    fn prefetch_dependencies(&mut self, manifest: &ManifestDescriptor) {
        let allow_prerelease = self.cache.config().allow_prerelease;
        let decided: HashSet<PackageIdentity> =
            self.stack.iter().map(|d| d.identity.clone()).collect();
        for dep in &manifest.dependencies {
            if dep.requirement.is_reference()
                || decided.contains(&dep.identity)
                || dep.identity == self.root.identity
            {
                continue;
            }
            let cache = Arc::clone(self.cache);
            let limit = Arc::clone(self.fetch_limit);
            let identity = dep.identity.clone();
            let requirement = dep.requirement.clone();
            // A usable pin is tried first and must not cause a listing.
            let pinned = self
                .preferred
                .get(&dep.identity)
                .filter(|pin| !pin.is_floating() && requirement.contains(pin))
                .cloned();
            self.prefetch.spawn(async move {
                let Ok(_permit) = limit.acquire_owned().await else {
                    return;
                };
                let version = match pinned {
                    Some(pin) => Some(pin),
                    None => match cache.versions(&identity).await {
                        Ok(versions) => versions
                            .iter()
                            .find(|v| requirement.selects(v, allow_prerelease))
                            .cloned(),
                        Err(_) => None,
                    },
                };
                if let Some(version) = version {
                    let _ = cache.manifest(&identity, &version).await;
                }
            });
        }
    }

    /// Check out every decided package and assemble the resolution.
    async fn finish(self) -> Result<Resolution, ResolveError> {
        let mut requirers = self.requirements();
        let locations = self.locations();

        let mut checkouts = JoinSet::new();
        for decision in &self.stack {
            let cache = Arc::clone(self.cache);
            let limit = Arc::clone(self.fetch_limit);
            let identity = decision.identity.clone();
            let version = decision.version.clone();
            checkouts.spawn(async move {
                let _permit = limit.acquire_owned().await;
                let path = cache.checkout(&identity, &version).await;
                (identity, path)
            });
        }
        let mut paths: HashMap<PackageIdentity, PathBuf> = HashMap::new();
        while let Some(joined) = checkouts.join_next().await {
            let Ok((identity, path)) = joined else {
                continue;
            };
            paths.insert(identity, path?);
        }

        let mut packages = BTreeMap::new();
        for decision in self.stack {
            let Some(path) = paths.remove(&decision.identity) else {
                return Err(ResolveError::RepositoryUnavailable {
                    identity: decision.identity,
                    detail: "checkout task did not complete".to_string(),
                });
            };
            let location = locations
                .get(&decision.identity)
                .cloned()
                .unwrap_or_else(|| decision.identity.to_string());
            packages.insert(
                decision.identity.clone(),
                ResolvedPackage {
                    identity: decision.identity,
                    location,
                    version: decision.version,
                    manifest: decision.manifest,
                    path,
                },
            );
        }
        requirers.retain(|identity, _| packages.contains_key(identity));

        tracing::info!(
            packages = packages.len(),
            backtracks = self.conflicts.len(),
            "resolution complete"
        );
        Ok(Resolution {
            packages,
            requirers,
            conflicts: self.conflicts,
        })
    }

    /// First declared location of every dependency identity.
    fn locations(&self) -> HashMap<PackageIdentity, String> {
        let mut locations = HashMap::new();
        let manifests =
            std::iter::once(self.root).chain(self.stack.iter().map(|d| d.manifest.as_ref()));
        for manifest in manifests {
            for dep in &manifest.dependencies {
                locations
                    .entry(dep.identity.clone())
                    .or_insert_with(|| dep.location.clone());
            }
        }
        locations
    }
}

fn intersect_all(requirers: &[Requirer]) -> Option<Requirement> {
    let (first, rest) = requirers.split_first()?;
    rest.iter().try_fold(first.requirement.clone(), |acc, r| {
        acc.intersect(&r.requirement)
    })
}

fn sorted_dependencies(manifest: &ManifestDescriptor) -> Vec<&PackageIdentity> {
    let mut ids: Vec<&PackageIdentity> = manifest.dependencies.iter().map(|d| &d.identity).collect();
    ids.sort();
    ids.dedup();
    ids
}
