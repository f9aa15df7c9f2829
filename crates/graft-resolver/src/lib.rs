//! Dependency resolution engine: backtracking version solver over pluggable
//! manifest and repository providers, pin planning, and package graph
//! construction with module validation and build ordering.

pub mod cache;
pub mod conflict;
pub mod error;
pub mod graph;
pub mod pins;
pub mod provider;
pub mod registry;
pub mod resolver;

pub use error::ResolveError;
pub use graph::{GraphError, PackageGraph};
pub use resolver::{Resolution, ResolvedPackage, Resolver};
