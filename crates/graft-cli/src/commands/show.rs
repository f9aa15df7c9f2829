//! Handler for `graft show-dependencies`.

use miette::Result;

use graft_ops::ops_resolve::ProjectOptions;
use graft_ops::ops_show::{self, ShowFormat, ShowOptions};

pub async fn exec(
    opts: &ProjectOptions,
    format: &str,
    depth: Option<usize>,
    why: Option<String>,
) -> Result<()> {
    let show = ShowOptions {
        format: format.parse::<ShowFormat>()?,
        depth,
        why,
    };
    ops_show::show(opts, &show).await
}
