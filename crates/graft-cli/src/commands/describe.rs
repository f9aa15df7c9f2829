//! Handler for `graft describe`.

use miette::Result;

use graft_ops::ops_describe;
use graft_ops::ops_resolve::ProjectOptions;

pub async fn exec(opts: &ProjectOptions) -> Result<()> {
    ops_describe::describe(opts).await
}
