//! Deciding which recorded pins survive a run, and recording new ones.
//!
//! A pin is invalidated when the requirements the current manifest tree places
//! on its identity no longer accept the pinned version. Requirements are
//! collected by walking from the root through valid pins only. Every other
//! pin stays a preference, so a package below a stale pin keeps its version
//! whenever the re-resolved parent still accepts it. Pins the finished
//! resolution no longer contains are reported by [`dropped`].

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use graft_core::identity::PackageIdentity;
use graft_core::manifest::ManifestDescriptor;
use graft_core::pinfile::{PinEntry, PinFile};
use graft_core::version::Version;
use graft_util::hash::sha256_lines;

use crate::cache::FetchCache;
use crate::conflict::Requirer;
use crate::error::ResolveError;
use crate::provider::{ManifestProvider, RepositoryProvider};
use crate::resolver::Resolution;

/// How recorded pins are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PinMode {
    /// Reuse valid pins, re-resolve the rest.
    #[default]
    Resolve,
    /// Ignore pins and resolve from scratch.
    Update,
    /// Pins are mandatory; any stale or missing pin is an error.
    Locked,
}

/// The outcome of checking recorded pins against the current manifests.
#[derive(Debug, Default)]
pub struct PinPlan {
    /// Pins handed to the resolver as preferred versions.
    pub retained: BTreeMap<PackageIdentity, Version>,
    /// Pins that no longer apply, with the reason.
    pub invalidated: BTreeMap<PackageIdentity, String>,
    /// Reachable identities without a pin.
    pub missing: BTreeSet<PackageIdentity>,
}

/// Pinned identities that `resolution` no longer contains.
pub fn dropped(pins: Option<&PinFile>, resolution: &Resolution) -> BTreeSet<PackageIdentity> {
    let Some(file) = pins else {
        return BTreeSet::new();
    };
    file.pins
        .iter()
        .filter(|p| !resolution.packages.contains_key(&p.identity))
        .map(|p| {
            tracing::info!(identity = %p.identity, "dropping pin for package no longer required");
            p.identity.clone()
        })
        .collect()
}

/// Hash of the requirements that justified a pin, independent of order.
pub fn requirement_hash(requirers: &[Requirer]) -> String {
    sha256_lines(
        requirers
            .iter()
            .map(|r| format!("{} {}", r.requirer, r.requirement)),
    )
}

/// Build the pin file recording `resolution`.
pub fn pin_file(resolution: &Resolution) -> PinFile {
    let pins = resolution
        .packages
        .values()
        .map(|pkg| {
            let requirers = resolution
                .requirers
                .get(&pkg.identity)
                .map(Vec::as_slice)
                .unwrap_or_default();
            PinEntry::new(
                pkg.identity.clone(),
                pkg.location.clone(),
                &pkg.version,
                requirement_hash(requirers),
            )
        })
        .collect();
    PinFile::new(pins)
}

/// Check `pins` against the manifest tree rooted at `root`.
pub async fn plan<M: ManifestProvider, R: RepositoryProvider>(
    cache: &FetchCache<M, R>,
    root: &ManifestDescriptor,
    pins: Option<&PinFile>,
    mode: PinMode,
) -> Result<PinPlan, ResolveError> {
    if mode == PinMode::Update {
        tracing::debug!("ignoring recorded pins");
        return Ok(PinPlan::default());
    }

    let entries: BTreeMap<&PackageIdentity, &PinEntry> = pins
        .map(|file| file.pins.iter().map(|p| (&p.identity, p)).collect())
        .unwrap_or_default();

    // Invalidating a pin removes its requirements from the walk, which can
    // invalidate others; repeat until nothing changes.
    let mut invalidated: BTreeMap<PackageIdentity, String> = BTreeMap::new();
    let walk = loop {
        let walk = walk_pins(cache, root, &entries, &invalidated).await;
        let mut changed = false;
        for identity in &walk.reached {
            if invalidated.contains_key(identity) {
                continue;
            }
            let Some(entry) = entries.get(identity) else {
                continue;
            };
            let requirers = walk.requirers.get(identity).map(Vec::as_slice).unwrap_or_default();
            if let Some(reason) = stale_reason(entry, requirers, walk.failures.get(identity)) {
                tracing::info!(identity = %identity, "pin invalidated: {reason}");
                invalidated.insert(identity.clone(), reason);
                changed = true;
            }
        }
        if !changed {
            break walk;
        }
    };

    let mut plan = PinPlan {
        invalidated,
        ..PinPlan::default()
    };
    // Every pin that was not invalidated stays a preference, including pins
    // below an invalidated one; the resolver only uses those still accepted
    // by the requirements it ends up with.
    for (identity, entry) in &entries {
        match entry.pinned() {
            Some(version) if version.is_floating() => {
                tracing::debug!(identity = %identity, "branch pin will be refreshed");
            }
            Some(version) if !plan.invalidated.contains_key(*identity) => {
                plan.retained.insert((*identity).clone(), version);
            }
            _ => {}
        }
    }
    for identity in &walk.reached {
        if !entries.contains_key(identity) {
            plan.missing.insert(identity.clone());
        }
    }

    if mode == PinMode::Locked {
        if let Some((identity, reason)) = plan.invalidated.iter().next() {
            return Err(ResolveError::PinInvalidated {
                identity: identity.clone(),
                reason: reason.clone(),
            });
        }
        if let Some(identity) = plan.missing.iter().next() {
            return Err(ResolveError::PinInvalidated {
                identity: identity.clone(),
                reason: "no pin recorded".to_string(),
            });
        }
    }

    tracing::debug!(
        retained = plan.retained.len(),
        invalidated = plan.invalidated.len(),
        missing = plan.missing.len(),
        "pin plan"
    );
    Ok(plan)
}

fn stale_reason(
    entry: &PinEntry,
    requirers: &[Requirer],
    failure: Option<&ResolveError>,
) -> Option<String> {
    let Some(version) = entry.pinned() else {
        return Some("malformed pin entry".to_string());
    };
    if version.is_floating() {
        return None;
    }
    if let Some(e) = failure {
        return Some(format!("pinned version {version} cannot be loaded: {e}"));
    }
    if let Some(r) = requirers.iter().find(|r| !r.requirement.contains(&version)) {
        return Some(format!("pinned {version}, but {r}"));
    }
    if requirement_hash(requirers) != entry.requirement_hash {
        tracing::debug!(
            identity = %entry.identity,
            version = %version,
            "requirements changed but still accept the pinned version"
        );
    }
    None
}

struct Walk {
    /// Every identity reachable from the root through retained pins.
    reached: BTreeSet<PackageIdentity>,
    requirers: HashMap<PackageIdentity, Vec<Requirer>>,
    /// Pinned manifests that failed to load.
    failures: HashMap<PackageIdentity, ResolveError>,
}

/// Collect requirements from the root and from every pinned package that is
/// still considered valid.
async fn walk_pins<M: ManifestProvider, R: RepositoryProvider>(
    cache: &FetchCache<M, R>,
    root: &ManifestDescriptor,
    entries: &BTreeMap<&PackageIdentity, &PinEntry>,
    invalidated: &BTreeMap<PackageIdentity, String>,
) -> Walk {
    let mut walk = Walk {
        reached: BTreeSet::new(),
        requirers: HashMap::new(),
        failures: HashMap::new(),
    };
    let mut queue: VecDeque<PackageIdentity> = VecDeque::new();
    add_requirers(&mut walk, &mut queue, root);

    while let Some(identity) = queue.pop_front() {
        if identity == root.identity || !walk.reached.insert(identity.clone()) {
            continue;
        }
        if invalidated.contains_key(&identity) {
            continue;
        }
        let Some(version) = entries.get(&identity).and_then(|e| e.pinned()) else {
            continue;
        };
        if version.is_floating() {
            continue;
        }
        match cache.manifest(&identity, &version).await {
            Ok(manifest) => add_requirers(&mut walk, &mut queue, &manifest),
            Err(e) => {
                walk.failures.insert(identity, e);
            }
        }
    }
    walk
}

fn add_requirers(walk: &mut Walk, queue: &mut VecDeque<PackageIdentity>, manifest: &ManifestDescriptor) {
    let mut deps: Vec<_> = manifest.dependencies.iter().collect();
    deps.sort_by(|a, b| a.identity.cmp(&b.identity));
    for dep in deps {
        walk.requirers
            .entry(dep.identity.clone())
            .or_default()
            .push(Requirer {
                requirer: manifest.identity.clone(),
                requirement: dep.requirement.clone(),
            });
        queue.push_back(dep.identity.clone());
    }
}
