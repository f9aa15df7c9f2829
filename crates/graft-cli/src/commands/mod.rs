//! Command dispatch and handler modules.

mod describe;
mod resolve;
mod show;
mod update;

use miette::Result;

use graft_core::config::GraftConfig;
use graft_core::manifest::{find_manifest, MANIFEST_FILE_NAME};
use graft_ops::ops_resolve::ProjectOptions;
use graft_util::errors::GraftError;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let opts = project_options(&cli)?;
    match cli.command {
        Command::Resolve => resolve::exec(&opts).await,
        Command::Update => update::exec(&opts).await,
        Command::ShowDependencies { format, depth, why } => {
            show::exec(&opts, &format, depth, why).await
        }
        Command::Describe => describe::exec(&opts).await,
    }
}

/// Locate the project from the current directory and load configuration.
fn project_options(cli: &Cli) -> Result<ProjectOptions> {
    let cwd = std::env::current_dir().map_err(GraftError::Io)?;
    let project_root = graft_util::fs::find_ancestor(&cwd, |dir| find_manifest(dir).is_some())
        .ok_or_else(|| GraftError::Manifest {
            message: format!(
                "No {MANIFEST_FILE_NAME} found in {} or any parent directory",
                cwd.display()
            ),
        })?;

    let config = match &cli.config {
        Some(path) if !path.is_file() => {
            return Err(GraftError::Config {
                message: format!("Config file {} not found", path.display()),
            }
            .into())
        }
        Some(path) => GraftConfig::load_from(path)?,
        None => GraftConfig::load()?,
    };

    tracing::debug!(project = %project_root.display(), "project located");
    let mut opts = ProjectOptions::new(project_root, config);
    opts.registry = cli.registry.clone();
    opts.locked = cli.locked;
    opts.verbose = cli.verbose;
    Ok(opts)
}
