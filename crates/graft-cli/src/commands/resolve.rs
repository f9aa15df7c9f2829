//! Handler for `graft resolve`.

use miette::Result;

use graft_ops::ops_resolve::{self, ProjectOptions};

pub async fn exec(opts: &ProjectOptions) -> Result<()> {
    ops_resolve::resolve(opts).await
}
