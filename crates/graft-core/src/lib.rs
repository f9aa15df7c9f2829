//! Core data types for graft.
//!
//! This crate defines the values the resolver and graph builder exchange:
//! canonical package identities, semantic versions and requirements, parsed
//! manifest descriptors, the persisted pin file format, and configuration.
//!
//! This crate is intentionally free of async code and network I/O.

/// Manifest format version of this tool. A package directory may carry a
/// `Graft@<version>.toml` that is preferred when it matches this version.
pub const TOOLS_VERSION: (u64, u64, u64) = (0, 1, 0);

pub mod config;
pub mod identity;
pub mod manifest;
pub mod pinfile;
pub mod version;
