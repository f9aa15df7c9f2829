//! High-level operations behind the `graft` commands.
//!
//! Every command goes through [`ops_resolve::load_graph`]: load the root
//! manifest, check recorded pins, resolve against the configured registry,
//! build the package graph, and persist pins.

pub mod ops_describe;
pub mod ops_resolve;
pub mod ops_show;
pub mod ops_update;
