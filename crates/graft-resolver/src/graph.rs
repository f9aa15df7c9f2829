//! Package graph construction, validation and traversal.
//!
//! Modules are stored in an arena (a petgraph `DiGraph`) addressed by
//! [`ModuleId`]; edges point from a module to the modules it depends on.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use graft_core::identity::PackageIdentity;
use graft_core::manifest::{ManifestDescriptor, TargetKind};
use graft_core::version::Version;
use miette::Diagnostic;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use thiserror::Error;

use crate::resolver::Resolution;

/// A module is one target of one package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleId {
    pub package: PackageIdentity,
    pub target: String,
}

impl ModuleId {
    pub fn new(package: &PackageIdentity, target: &str) -> Self {
        Self {
            package: package.clone(),
            target: target.to_string(),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.package, self.target)
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    pub kind: TargetKind,
    /// Checkout path of the owning package.
    pub path: PathBuf,
}

/// A package in the graph. The root has no version.
#[derive(Debug, Clone)]
pub struct PackageNode {
    pub identity: PackageIdentity,
    pub version: Option<Version>,
    pub path: PathBuf,
    pub manifest: Arc<ManifestDescriptor>,
}

impl PackageNode {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }
}

impl fmt::Display for PackageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} {}", self.name(), version),
            None => write!(f, "{}", self.name()),
        }
    }
}

/// An unresolved reference found during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingModule {
    pub name: String,
    pub referenced_by: String,
}

impl fmt::Display for MissingModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' (referenced by {})", self.name, self.referenced_by)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("module not found: {}", join(.missing, ", "))]
    #[diagnostic(
        code(graft::graph::module_not_found),
        help("check target names and product references in Graft.toml")
    )]
    ModuleNotFound { missing: Vec<MissingModule> },

    #[error("package '{package}' declares target '{name}' more than once")]
    #[diagnostic(code(graft::graph::duplicate_module))]
    DuplicateModuleName {
        package: PackageIdentity,
        name: String,
    },

    #[error("package '{package}' declares product '{name}' more than once")]
    #[diagnostic(code(graft::graph::duplicate_product))]
    DuplicateProductName {
        package: PackageIdentity,
        name: String,
    },

    #[error("dependency cycle: {}", join(.path, " -> "))]
    #[diagnostic(code(graft::graph::cycle))]
    DependencyCycle { path: Vec<ModuleId> },

    #[error("the package graph has {} problems", .problems.len())]
    #[diagnostic(code(graft::graph::invalid))]
    Invalid {
        #[related]
        problems: Vec<GraphError>,
    },
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// The validated graph of packages and modules.
#[derive(Debug)]
pub struct PackageGraph {
    root: PackageIdentity,
    packages: BTreeMap<PackageIdentity, PackageNode>,
    modules: DiGraph<Module, ()>,
    module_index: HashMap<ModuleId, NodeIndex>,
    package_edges: DiGraph<PackageIdentity, ()>,
    package_index: HashMap<PackageIdentity, NodeIndex>,
    order: Vec<ModuleId>,
}

impl PackageGraph {
    /// Build and validate the graph for `root` and its resolved packages.
    ///
    /// Every problem found is reported: a single one as itself, several as
    /// [`GraphError::Invalid`].
    pub fn build(
        root: &ManifestDescriptor,
        root_path: &Path,
        resolution: &Resolution,
    ) -> Result<Self, GraphError> {
        let mut packages = BTreeMap::new();
        packages.insert(
            root.identity.clone(),
            PackageNode {
                identity: root.identity.clone(),
                version: None,
                path: root_path.to_path_buf(),
                manifest: Arc::new(root.clone()),
            },
        );
        for pkg in resolution.packages.values() {
            packages.insert(
                pkg.identity.clone(),
                PackageNode {
                    identity: pkg.identity.clone(),
                    version: Some(pkg.version.clone()),
                    path: pkg.path.clone(),
                    manifest: Arc::clone(&pkg.manifest),
                },
            );
        }

        let mut graph = PackageGraph {
            root: root.identity.clone(),
            packages,
            modules: DiGraph::new(),
            module_index: HashMap::new(),
            package_edges: DiGraph::new(),
            package_index: HashMap::new(),
            order: Vec::new(),
        };

        let mut missing = Vec::new();
        let mut problems = graph.add_modules(&mut missing);
        graph.link_modules(&mut missing);
        if !missing.is_empty() {
            problems.push(GraphError::ModuleNotFound { missing });
        }
        graph.link_packages();

        if let Some(path) = graph.find_cycle() {
            problems.push(GraphError::DependencyCycle { path });
        }

        match problems.len() {
            0 => {
                graph.order = graph.compute_order();
                tracing::debug!(
                    packages = graph.packages.len(),
                    modules = graph.modules.node_count(),
                    "package graph built"
                );
                Ok(graph)
            }
            1 => Err(problems.remove(0)),
            _ => Err(GraphError::Invalid { problems }),
        }
    }

    /// One module per unique target. Duplicate targets and products are
    /// returned; products exposing unknown targets go to `missing`.
    fn add_modules(&mut self, missing: &mut Vec<MissingModule>) -> Vec<GraphError> {
        let mut problems = Vec::new();

        for node in self.packages.values() {
            let manifest = &node.manifest;
            let mut targets = HashSet::new();
            for target in &manifest.targets {
                if !targets.insert(target.name.as_str()) {
                    problems.push(GraphError::DuplicateModuleName {
                        package: node.identity.clone(),
                        name: target.name.clone(),
                    });
                    continue;
                }
                let id = ModuleId::new(&node.identity, &target.name);
                let idx = self.modules.add_node(Module {
                    id: id.clone(),
                    kind: target.kind,
                    path: node.path.clone(),
                });
                self.module_index.insert(id, idx);
            }

            let mut products = HashSet::new();
            for product in &manifest.products {
                if !products.insert(product.name.as_str()) {
                    problems.push(GraphError::DuplicateProductName {
                        package: node.identity.clone(),
                        name: product.name.clone(),
                    });
                    continue;
                }
                for target in &product.targets {
                    if !targets.contains(target.as_str()) {
                        missing.push(MissingModule {
                            name: target.clone(),
                            referenced_by: format!("product {}.{}", node.identity, product.name),
                        });
                    }
                }
            }
        }

        problems
    }

    /// Resolve target and product references into edges, collecting every
    /// reference that could not be resolved.
    fn link_modules(&mut self, missing: &mut Vec<MissingModule>) {
        let mut edges: Vec<(NodeIndex, NodeIndex)> = Vec::new();

        for node in self.packages.values() {
            for target in &node.manifest.targets {
                let from_id = ModuleId::new(&node.identity, &target.name);
                let Some(&from) = self.module_index.get(&from_id) else {
                    continue;
                };

                for dep in &target.dependencies {
                    match self.module_index.get(&ModuleId::new(&node.identity, dep)) {
                        Some(&to) => edges.push((from, to)),
                        None => missing.push(MissingModule {
                            name: dep.clone(),
                            referenced_by: from_id.to_string(),
                        }),
                    }
                }

                for product_ref in &target.products {
                    let product = self
                        .packages
                        .get(&product_ref.package)
                        .and_then(|p| p.manifest.product(&product_ref.product));
                    let Some(product) = product else {
                        missing.push(MissingModule {
                            name: product_ref.to_string(),
                            referenced_by: from_id.to_string(),
                        });
                        continue;
                    };
                    for exposed in &product.targets {
                        let to_id = ModuleId::new(&product_ref.package, exposed);
                        if let Some(&to) = self.module_index.get(&to_id) {
                            edges.push((from, to));
                        }
                    }
                }
            }
        }

        for (from, to) in edges {
            self.add_edge(from, to);
        }
    }

    fn link_packages(&mut self) {
        for identity in self.packages.keys() {
            let idx = self.package_edges.add_node(identity.clone());
            self.package_index.insert(identity.clone(), idx);
        }
        for node in self.packages.values() {
            let from = self.package_index[&node.identity];
            for dep in &node.manifest.dependencies {
                if let Some(&to) = self.package_index.get(&dep.identity) {
                    if !self.package_edges.edges(from).any(|e| e.target() == to) {
                        self.package_edges.add_edge(from, to, ());
                    }
                }
            }
        }
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if !self.modules.edges(from).any(|e| e.target() == to) {
            self.modules.add_edge(from, to, ());
        }
    }

    fn sorted_modules(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self.modules.node_indices().collect();
        nodes.sort_by(|a, b| self.modules[*a].id.cmp(&self.modules[*b].id));
        nodes
    }

    fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self.modules.neighbors_directed(idx, direction).collect();
        nodes.sort_by(|a, b| self.modules[*a].id.cmp(&self.modules[*b].id));
        nodes.dedup();
        nodes
    }

    /// Depth-first search with an in-progress set. Returns the first cycle
    /// found, closed by repeating its first module.
    fn find_cycle(&self) -> Option<Vec<ModuleId>> {
        let mut done: HashSet<NodeIndex> = HashSet::new();
        let mut path: Vec<NodeIndex> = Vec::new();
        for start in self.sorted_modules() {
            if done.contains(&start) {
                continue;
            }
            if let Some(cycle) = self.visit(start, &mut done, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit(
        &self,
        idx: NodeIndex,
        done: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<ModuleId>> {
        path.push(idx);
        for next in self.sorted_neighbors(idx, Direction::Outgoing) {
            if let Some(start) = path.iter().position(|&n| n == next) {
                let mut cycle: Vec<ModuleId> =
                    path[start..].iter().map(|&n| self.modules[n].id.clone()).collect();
                cycle.push(self.modules[next].id.clone());
                return Some(cycle);
            }
            if done.contains(&next) {
                continue;
            }
            if let Some(cycle) = self.visit(next, done, path) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(idx);
        None
    }

    /// Leaves first; among modules that are ready at the same time the
    /// smallest `(package, target)` goes first.
    fn compute_order(&self) -> Vec<ModuleId> {
        let mut pending: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready: BTreeSet<ModuleId> = BTreeSet::new();
        for idx in self.modules.node_indices() {
            let count = self.sorted_neighbors(idx, Direction::Outgoing).len();
            if count == 0 {
                ready.insert(self.modules[idx].id.clone());
            }
            pending.insert(idx, count);
        }

        let mut order = Vec::with_capacity(self.modules.node_count());
        while let Some(id) = ready.pop_first() {
            let idx = self.module_index[&id];
            order.push(id);
            for dependent in self.sorted_neighbors(idx, Direction::Incoming) {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(self.modules[dependent].id.clone());
                    }
                }
            }
        }
        order
    }

    pub fn root(&self) -> &PackageNode {
        &self.packages[&self.root]
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageNode> {
        self.packages.values()
    }

    pub fn package(&self, identity: &PackageIdentity) -> Option<&PackageNode> {
        self.packages.get(identity)
    }

    pub fn module(&self, id: &ModuleId) -> Option<&Module> {
        self.module_index.get(id).map(|&idx| &self.modules[idx])
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.order.iter().filter_map(|id| self.module(id))
    }

    /// Modules in build order: every module follows everything it depends on.
    pub fn topological_order(&self) -> &[ModuleId] {
        &self.order
    }

    /// Direct dependencies of a module, ordered by id.
    pub fn dependencies_of(&self, id: &ModuleId) -> Vec<&ModuleId> {
        let Some(&idx) = self.module_index.get(id) else {
            return Vec::new();
        };
        self.sorted_neighbors(idx, Direction::Outgoing)
            .into_iter()
            .map(|n| &self.modules[n].id)
            .collect()
    }

    /// Packages `identity` depends on directly, ordered by identity.
    pub fn package_dependencies(&self, identity: &PackageIdentity) -> Vec<&PackageNode> {
        let Some(&idx) = self.package_index.get(identity) else {
            return Vec::new();
        };
        let mut deps: Vec<&PackageNode> = self
            .package_edges
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.packages.get(&self.package_edges[n]))
            .collect();
        deps.sort_by(|a, b| a.identity.cmp(&b.identity));
        deps
    }

    pub fn module_count(&self) -> usize {
        self.modules.node_count()
    }

    /// Number of packages excluding the root.
    pub fn len(&self) -> usize {
        self.packages.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Print the package dependency tree.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = String::new();
        let root = self.root();
        output.push_str(&format!("{root}\n"));

        let mut visited = HashSet::new();
        visited.insert(root.identity.clone());
        let deps = self.package_dependencies(&root.identity);
        let count = deps.len();
        for (i, dep) in deps.into_iter().enumerate() {
            self.print_subtree(&mut output, dep, "", i == count - 1, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        node: &PackageNode,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<PackageIdentity>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{node}\n"));

        if max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        if !visited.insert(node.identity.clone()) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.package_dependencies(&node.identity);
        let count = deps.len();
        for (i, dep) in deps.into_iter().enumerate() {
            self.print_subtree(
                output,
                dep,
                &child_prefix,
                i == count - 1,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&node.identity);
    }

    /// Find the chain of packages from the root to `key`.
    ///
    /// Accepts a canonical identity or a package name.
    pub fn find_path(&self, key: &str) -> Option<Vec<&PackageNode>> {
        let target = self
            .packages
            .values()
            .find(|p| p.identity.as_str() == key)
            .or_else(|| self.packages.values().find(|p| p.name() == key || p.identity.name() == key))?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(&self.root, &target.identity, &mut path, &mut visited) {
            Some(path.into_iter().filter_map(|id| self.packages.get(id)).collect())
        } else {
            None
        }
    }

    fn dfs_path<'g>(
        &'g self,
        current: &'g PackageIdentity,
        target: &PackageIdentity,
        path: &mut Vec<&'g PackageIdentity>,
        visited: &mut HashSet<&'g PackageIdentity>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for dep in self.package_dependencies(current) {
            if self.dfs_path(&dep.identity, target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Serializable view for machine-readable output.
    pub fn summary(&self) -> GraphSummary {
        let packages = self
            .packages
            .values()
            .map(|p| PackageSummary {
                identity: p.identity.to_string(),
                name: p.name().to_string(),
                version: p.version.as_ref().map(|v| v.to_string()),
                path: p.path.clone(),
                dependencies: self
                    .package_dependencies(&p.identity)
                    .iter()
                    .map(|d| d.identity.to_string())
                    .collect(),
            })
            .collect();
        let modules = self
            .modules()
            .map(|m| ModuleSummary {
                package: m.id.package.to_string(),
                target: m.id.target.clone(),
                kind: m.kind,
                path: m.path.clone(),
                dependencies: self
                    .dependencies_of(&m.id)
                    .iter()
                    .map(|d| d.to_string())
                    .collect(),
            })
            .collect();
        GraphSummary {
            root: self.root.to_string(),
            packages,
            modules,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GraphSummary {
    pub root: String,
    pub packages: Vec<PackageSummary>,
    /// In build order.
    pub modules: Vec<ModuleSummary>,
}

#[derive(Debug, Serialize)]
pub struct PackageSummary {
    pub identity: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub path: PathBuf,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModuleSummary {
    pub package: String,
    pub target: String,
    pub kind: TargetKind,
    pub path: PathBuf,
    pub dependencies: Vec<String>,
}
