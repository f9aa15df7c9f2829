//! Shared utilities for graft.
//!
//! This crate provides cross-cutting concerns used by the other graft crates:
//! the loader error type, filesystem helpers (including crash-safe atomic
//! writes), hashing, and terminal status output.

pub mod errors;
pub mod fs;
pub mod hash;
pub mod progress;
