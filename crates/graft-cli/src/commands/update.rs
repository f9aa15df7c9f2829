//! Handler for `graft update`.

use miette::Result;

use graft_ops::ops_resolve::ProjectOptions;
use graft_ops::ops_update;

pub async fn exec(opts: &ProjectOptions) -> Result<()> {
    ops_update::update(opts).await
}
