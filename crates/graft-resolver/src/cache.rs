//! Per-run memoization of provider calls.
//!
//! Every provider call goes through [`FetchCache`], which bounds it with the
//! configured timeout, retries transient failures with linear backoff, and
//! collapses concurrent requests for the same key into one in-flight call.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

use graft_core::config::ResolverConfig;
use graft_core::identity::PackageIdentity;
use graft_core::manifest::ManifestDescriptor;
use graft_core::version::{Requirement, Version};
use tokio::sync::{Mutex, OnceCell};

use crate::error::ResolveError;
use crate::provider::{ManifestProvider, RepositoryProvider};

type Slot<T> = Arc<OnceCell<Result<T, ResolveError>>>;

/// A map of one-shot cells. The first caller for a key runs the fetch; later
/// callers await the same cell.
struct Memo<K, T> {
    cells: Mutex<HashMap<K, Slot<T>>>,
}

impl<K: Eq + Hash, T: Clone> Memo<K, T> {
    fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, key: K) -> Slot<T> {
        let mut cells = self.cells.lock().await;
        Arc::clone(cells.entry(key).or_default())
    }

    async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<T, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>>,
    {
        let slot = self.slot(key).await;
        slot.get_or_init(fetch).await.clone()
    }

    async fn is_cached(&self, key: &K) -> bool {
        let cells = self.cells.lock().await;
        cells.get(key).is_some_and(|cell| cell.initialized())
    }
}

/// Provider front-end shared by the resolver and its prefetch tasks.
pub struct FetchCache<M, R> {
    manifests: Arc<M>,
    repository: Arc<R>,
    config: ResolverConfig,
    versions: Memo<PackageIdentity, Arc<Vec<Version>>>,
    loaded: Memo<(PackageIdentity, Version), Arc<ManifestDescriptor>>,
    floating: Memo<(PackageIdentity, Requirement), Version>,
}

impl<M: ManifestProvider, R: RepositoryProvider> FetchCache<M, R> {
    pub fn new(manifests: Arc<M>, repository: Arc<R>, config: ResolverConfig) -> Self {
        Self {
            manifests,
            repository,
            config,
            versions: Memo::new(),
            loaded: Memo::new(),
            floating: Memo::new(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Tagged versions of `identity`, newest first.
    pub async fn versions(&self, identity: &PackageIdentity) -> Result<Arc<Vec<Version>>, ResolveError> {
        self.versions
            .get_or_fetch(identity.clone(), || async {
                let mut versions = self
                    .with_retry(identity, "listing versions", || {
                        self.repository.list_versions(identity)
                    })
                    .await?;
                versions.retain(|v| v.semantic().is_some());
                versions.sort_by(|a, b| b.semantic().cmp(&a.semantic()));
                versions.dedup();
                tracing::debug!(identity = %identity, count = versions.len(), "listed versions");
                Ok(Arc::new(versions))
            })
            .await
    }

    /// The manifest of `identity` at `version`, loaded at most once per run.
    pub async fn manifest(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Result<Arc<ManifestDescriptor>, ResolveError> {
        self.loaded
            .get_or_fetch((identity.clone(), version.clone()), || async {
                let manifest = self
                    .with_retry(identity, "loading manifest", || {
                        self.manifests.load(identity, version)
                    })
                    .await?;
                tracing::debug!(identity = %identity, version = %version, "loaded manifest");
                Ok(Arc::new(manifest))
            })
            .await
    }

    /// Resolve a branch or revision requirement to a concrete version.
    pub async fn resolve_floating(
        &self,
        identity: &PackageIdentity,
        requirement: &Requirement,
    ) -> Result<Version, ResolveError> {
        self.floating
            .get_or_fetch((identity.clone(), requirement.clone()), || {
                self.with_retry(identity, "resolving reference", || {
                    self.repository.resolve_floating(identity, requirement)
                })
            })
            .await
    }

    /// Checkouts are not memoized; the repository provider caches them.
    pub async fn checkout(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Result<PathBuf, ResolveError> {
        self.with_retry(identity, "checking out", || {
            self.repository.checkout(identity, version)
        })
        .await
    }

    /// Versions of `identity` if they were already listed this run.
    pub async fn cached_versions(&self, identity: &PackageIdentity) -> Option<Arc<Vec<Version>>> {
        if !self.versions.is_cached(identity).await {
            return None;
        }
        self.versions(identity).await.ok()
    }

    /// Run `call` under the configured timeout, retrying transient failures
    /// with a delay of `attempt * retry-delay-ms`.
    async fn with_retry<T, F, Fut>(
        &self,
        identity: &PackageIdentity,
        operation: &str,
        mut call: F,
    ) -> Result<T, ResolveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(self.config.timeout(), call()).await {
                Ok(result) => result,
                Err(_) => Err(ResolveError::Timeout {
                    identity: identity.clone(),
                    operation: operation.to_string(),
                    seconds: self.config.timeout_secs,
                }),
            };
            match result {
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(identity = %identity, attempt, "{operation} failed: {e}; retrying");
                    tokio::time::sleep(self.config.retry_delay() * attempt).await;
                }
                other => return other,
            }
        }
    }
}
