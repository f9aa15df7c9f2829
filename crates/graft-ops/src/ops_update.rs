//! Operation: discard recorded pins and resolve every dependency afresh.

use graft_resolver::pins::PinMode;
use graft_util::errors::GraftError;
use graft_util::progress::status;

use crate::ops_resolve::{self, pin_changes, ProjectOptions};

/// `graft update`: ignore `Graft.resolved`, resolve to the newest versions
/// the manifests allow, and overwrite the pins.
pub async fn update(opts: &ProjectOptions) -> miette::Result<()> {
    if opts.locked {
        return Err(GraftError::Generic {
            message: "--locked cannot be combined with update".to_string(),
        }
        .into());
    }

    let project = ops_resolve::load_graph(opts, PinMode::Update).await?;
    let changes = pin_changes(project.previous.as_ref(), &project.pins);
    if changes.is_empty() {
        status("Updated", "all pins already at the newest allowed versions");
        return Ok(());
    }
    for change in &changes {
        eprintln!("  {change}");
    }
    status(
        "Updated",
        &format!("{} pin(s) across {} package(s)", changes.len(), project.resolution.len()),
    );
    Ok(())
}
