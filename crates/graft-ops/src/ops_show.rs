//! Operation: display the resolved dependency tree.

use std::str::FromStr;

use graft_resolver::PackageGraph;
use graft_util::errors::GraftError;

use crate::ops_resolve::{self, ProjectOptions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShowFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ShowFormat {
    type Err = GraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ShowFormat::Text),
            "json" => Ok(ShowFormat::Json),
            other => Err(GraftError::Generic {
                message: format!("Unknown format '{other}' (expected text or json)"),
            }),
        }
    }
}

/// Options for `graft show-dependencies`.
#[derive(Debug, Default)]
pub struct ShowOptions {
    pub format: ShowFormat,
    /// Maximum tree depth to display.
    pub depth: Option<usize>,
    /// Explain why a package is included.
    pub why: Option<String>,
}

/// Render the graph as requested.
pub fn render(graph: &PackageGraph, opts: &ShowOptions) -> miette::Result<String> {
    if let Some(ref target) = opts.why {
        let Some(path) = graph.find_path(target) else {
            return Ok(format!("Package '{target}' is not in the graph.\n"));
        };
        let mut out = format!("Path to {target}:\n");
        for (i, node) in path.iter().enumerate() {
            out.push_str(&format!("{}{node}\n", "  ".repeat(i)));
        }
        return Ok(out);
    }

    match opts.format {
        ShowFormat::Text => Ok(graph.print_tree(opts.depth)),
        ShowFormat::Json => {
            let mut json = serde_json::to_string_pretty(&graph.summary()).map_err(|e| {
                GraftError::Generic {
                    message: format!("Failed to serialize graph: {e}"),
                }
            })?;
            json.push('\n');
            Ok(json)
        }
    }
}

/// `graft show-dependencies`.
pub async fn show(project: &ProjectOptions, opts: &ShowOptions) -> miette::Result<()> {
    let resolved = ops_resolve::load_graph(project, project.pin_mode()).await?;
    print!("{}", render(&resolved.graph, opts)?);
    Ok(())
}
