//! Operation: list modules in build order.

use graft_core::manifest::TargetKind;
use graft_resolver::PackageGraph;

use crate::ops_resolve::{self, ProjectOptions};

fn kind_label(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Library => "library",
        TargetKind::Executable => "executable",
        TargetKind::Test => "test",
    }
}

/// One line per module, dependencies before dependents, with the owning
/// package and its checkout path.
pub fn describe_graph(graph: &PackageGraph) -> String {
    let root = graph.root();
    let mut out = format!(
        "{} ({} package(s), {} module(s))\n",
        root.name(),
        graph.len(),
        graph.module_count()
    );
    for (i, module) in graph.modules().enumerate() {
        let owner = graph
            .package(&module.id.package)
            .map(|p| p.to_string())
            .unwrap_or_else(|| module.id.package.to_string());
        out.push_str(&format!(
            "{:>4}. {} [{}] {} {}\n",
            i + 1,
            module.id.target,
            kind_label(module.kind),
            owner,
            module.path.display()
        ));
        let deps = graph.dependencies_of(&module.id);
        if !deps.is_empty() {
            let names: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
            out.push_str(&format!("      depends on {}\n", names.join(", ")));
        }
    }
    out
}

/// `graft describe`.
pub async fn describe(project: &ProjectOptions) -> miette::Result<()> {
    let resolved = ops_resolve::load_graph(project, project.pin_mode()).await?;
    print!("{}", describe_graph(&resolved.graph));
    Ok(())
}
