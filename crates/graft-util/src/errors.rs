use miette::Diagnostic;
use thiserror::Error;

/// Error type for loading and persisting graft files.
///
/// Resolution and graph validation have their own structured error types in
/// `graft-resolver`; this one covers everything that touches disk.
#[derive(Debug, Error, Diagnostic)]
pub enum GraftError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed package manifest (`Graft.toml`).
    #[error("Manifest error: {message}")]
    #[diagnostic(code(graft::manifest), help("Check your Graft.toml for syntax errors"))]
    Manifest { message: String },

    /// Pin store (`Graft.resolved`) could not be read or written.
    #[error("Pin store error: {message}")]
    #[diagnostic(code(graft::pins))]
    Pins { message: String },

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(graft::config), help("Check ~/.graft/config.toml"))]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}
