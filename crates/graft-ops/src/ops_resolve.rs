//! Operation: resolve dependencies honoring recorded pins, check out every
//! package, validate the package graph and write `Graft.resolved`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use graft_core::config::GraftConfig;
use graft_core::identity::PackageIdentity;
use graft_core::manifest::{find_manifest, ManifestDescriptor};
use graft_core::pinfile::{PinFile, PIN_FILE_NAME};
use graft_resolver::pins::{self, PinMode, PinPlan};
use graft_resolver::registry::LocalRegistry;
use graft_resolver::{PackageGraph, Resolution, Resolver};
use graft_util::errors::GraftError;
use graft_util::progress::{spinner, status, status_info, status_warn};

/// Everything an operation needs to know about the invocation.
#[derive(Debug, Clone)]
pub struct ProjectOptions {
    /// Directory containing the root `Graft.toml`.
    pub project_root: PathBuf,
    pub config: GraftConfig,
    /// Overrides `[registry] path` from the configuration.
    pub registry: Option<PathBuf>,
    /// Fail instead of re-resolving when a pin is stale or missing.
    pub locked: bool,
    pub verbose: bool,
}

impl ProjectOptions {
    pub fn new(project_root: impl Into<PathBuf>, config: GraftConfig) -> Self {
        Self {
            project_root: project_root.into(),
            config,
            registry: None,
            locked: false,
            verbose: false,
        }
    }

    /// Pin handling for commands that honor recorded pins.
    pub fn pin_mode(&self) -> PinMode {
        if self.locked {
            PinMode::Locked
        } else {
            PinMode::Resolve
        }
    }

    pub fn pins_path(&self) -> PathBuf {
        self.project_root.join(PIN_FILE_NAME)
    }

    fn registry_path(&self) -> miette::Result<PathBuf> {
        self.registry
            .clone()
            .or_else(|| self.config.registry.path.clone())
            .ok_or_else(|| {
                GraftError::Config {
                    message: "No package registry configured; pass --registry or set [registry] path"
                        .to_string(),
                }
                .into()
            })
    }
}

/// The outcome of one successful run.
#[derive(Debug)]
pub struct ResolvedProject {
    pub root: ManifestDescriptor,
    pub resolution: Resolution,
    pub graph: PackageGraph,
    pub plan: PinPlan,
    /// Pins as they were before this run.
    pub previous: Option<PinFile>,
    /// Pins recording this run's resolution.
    pub pins: PinFile,
}

/// A difference between two pin files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinChange {
    Added {
        identity: PackageIdentity,
        version: String,
    },
    Updated {
        identity: PackageIdentity,
        from: String,
        to: String,
    },
    Removed {
        identity: PackageIdentity,
    },
}

impl std::fmt::Display for PinChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PinChange::Added { identity, version } => write!(f, "added {identity} {version}"),
            PinChange::Updated { identity, from, to } => {
                write!(f, "updated {identity} {from} -> {to}")
            }
            PinChange::Removed { identity } => write!(f, "removed {identity}"),
        }
    }
}

/// Load the root manifest for `project_root`. Its identity is derived from
/// the directory path.
pub fn load_root(project_root: &Path) -> miette::Result<ManifestDescriptor> {
    let manifest_path = find_manifest(project_root).ok_or_else(|| GraftError::Manifest {
        message: format!("No Graft.toml found in {}", project_root.display()),
    })?;
    let identity = PackageIdentity::from_location(&project_root.to_string_lossy());
    ManifestDescriptor::from_path(&manifest_path, identity)
}

/// Resolve, build and validate the package graph, and persist pins.
///
/// The pin file is written once, after the graph validated, and only when
/// its content changed. Locked runs never write it.
pub async fn load_graph(opts: &ProjectOptions, mode: PinMode) -> miette::Result<ResolvedProject> {
    let root = load_root(&opts.project_root)?;
    let registry = Arc::new(LocalRegistry::new(opts.registry_path()?));
    tracing::debug!(registry = %registry.root().display(), mode = ?mode, "resolving");
    let resolver = Resolver::new(
        Arc::clone(&registry),
        Arc::clone(&registry),
        opts.config.resolver.clone(),
    );

    let pins_path = opts.pins_path();
    let previous = PinFile::load(&pins_path)?;
    let plan = pins::plan(resolver.cache(), &root, previous.as_ref(), mode).await?;
    for (identity, reason) in &plan.invalidated {
        status_warn("Invalidated", &format!("{identity}: {reason}"));
    }

    let sp = spinner("Resolving dependencies...");
    let result = resolver.resolve(&root, &plan.retained).await;
    sp.finish_and_clear();
    let resolution = result?;

    let dropped = pins::dropped(previous.as_ref(), &resolution);
    if !dropped.is_empty() {
        status_info(
            "Dropped",
            &format!("{} pin(s) no longer required", dropped.len()),
        );
    }

    if opts.verbose && !resolution.conflicts.is_empty() {
        eprint!("{}", resolution.conflicts);
    }

    let graph = PackageGraph::build(&root, &opts.project_root, &resolution)?;

    let pins = pins::pin_file(&resolution);
    if mode != PinMode::Locked && previous.as_ref() != Some(&pins) {
        pins.save(&pins_path)?;
        tracing::info!(path = %pins_path.display(), "pins written");
    }

    Ok(ResolvedProject {
        root,
        resolution,
        graph,
        plan,
        previous,
        pins,
    })
}

/// Compare two pin files, ordered by identity.
pub fn pin_changes(old: Option<&PinFile>, new: &PinFile) -> Vec<PinChange> {
    let version_of = |file: &PinFile, identity: &PackageIdentity| {
        file.get(identity)
            .and_then(|p| p.pinned())
            .map(|v| v.to_string())
    };

    let mut changes = Vec::new();
    for pin in &new.pins {
        let to = version_of(new, &pin.identity).unwrap_or_default();
        match old.and_then(|o| version_of(o, &pin.identity)) {
            None => changes.push(PinChange::Added {
                identity: pin.identity.clone(),
                version: to,
            }),
            Some(from) if from != to => changes.push(PinChange::Updated {
                identity: pin.identity.clone(),
                from,
                to,
            }),
            Some(_) => {}
        }
    }
    if let Some(old) = old {
        for pin in &old.pins {
            if new.get(&pin.identity).is_none() {
                changes.push(PinChange::Removed {
                    identity: pin.identity.clone(),
                });
            }
        }
    }
    changes.sort_by(|a, b| change_identity(a).cmp(change_identity(b)));
    changes
}

fn change_identity(change: &PinChange) -> &PackageIdentity {
    match change {
        PinChange::Added { identity, .. }
        | PinChange::Updated { identity, .. }
        | PinChange::Removed { identity } => identity,
    }
}

/// `graft resolve`.
pub async fn resolve(opts: &ProjectOptions) -> miette::Result<()> {
    let project = load_graph(opts, opts.pin_mode()).await?;

    for change in pin_changes(project.previous.as_ref(), &project.pins) {
        eprintln!("  {change}");
    }
    let kept = project
        .plan
        .retained
        .iter()
        .filter(|(identity, version)| {
            project
                .resolution
                .get(identity)
                .is_some_and(|pkg| &pkg.version == *version)
        })
        .count();
    status(
        "Resolved",
        &format!(
            "{} package(s), {} pinned, {} module(s)",
            project.resolution.len(),
            kept,
            project.graph.module_count()
        ),
    );
    Ok(())
}
