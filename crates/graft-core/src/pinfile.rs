use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::identity::PackageIdentity;
use crate::version::{parse_semver, Version};

/// File name of the pin store, kept next to the root `Graft.toml`.
pub const PIN_FILE_NAME: &str = "Graft.resolved";

/// Schema version written by this tool. Files declaring any other version are
/// treated as absent.
pub const PIN_FORMAT_VERSION: u32 = 1;

/// The persisted result of the last successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinFile {
    pub version: u32,
    #[serde(default, rename = "pin")]
    pub pins: Vec<PinEntry>,
}

/// A single pinned package.
///
/// Exactly one of `version` or `revision` is set; `branch` accompanies
/// `revision` for branch pins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PinEntry {
    pub identity: PackageIdentity,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Hash of the requirements that justified this pin.
    pub requirement_hash: String,
}

#[derive(Deserialize)]
struct Header {
    version: u32,
}

impl PinEntry {
    pub fn new(
        identity: PackageIdentity,
        location: String,
        pinned: &Version,
        requirement_hash: String,
    ) -> Self {
        let (version, branch, revision) = match pinned {
            Version::Semantic(v) => (Some(v.to_string()), None, None),
            Version::Revision(r) => (None, None, Some(r.clone())),
            Version::Branch { name, revision } => {
                (None, Some(name.clone()), Some(revision.clone()))
            }
        };
        Self {
            identity,
            location,
            version,
            branch,
            revision,
            requirement_hash,
        }
    }

    /// The pinned version, or `None` when the entry is malformed.
    pub fn pinned(&self) -> Option<Version> {
        match (&self.version, &self.branch, &self.revision) {
            (Some(v), None, None) => parse_semver(v).ok().map(Version::Semantic),
            (None, Some(name), Some(revision)) => Some(Version::Branch {
                name: name.clone(),
                revision: revision.clone(),
            }),
            (None, None, Some(revision)) => Some(Version::Revision(revision.clone())),
            _ => None,
        }
    }
}

impl PinFile {
    /// Build a pin file with entries sorted by identity.
    pub fn new(mut pins: Vec<PinEntry>) -> Self {
        pins.sort_by(|a, b| a.identity.cmp(&b.identity));
        Self {
            version: PIN_FORMAT_VERSION,
            pins,
        }
    }

    pub fn get(&self, identity: &PackageIdentity) -> Option<&PinEntry> {
        self.pins.iter().find(|p| &p.identity == identity)
    }

    /// Load the pin file at `path`.
    ///
    /// A missing file, an unknown schema version, or unparseable contents all
    /// yield `Ok(None)` so the caller falls back to a full resolution. Only
    /// I/O failures other than "not found" are errors.
    pub fn load(path: &Path) -> miette::Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(graft_util::errors::GraftError::Pins {
                    message: format!("Failed to read {}: {e}", path.display()),
                }
                .into())
            }
        };

        let header: Header = match toml::from_str(&content) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!("Ignoring unreadable pin file {}: {e}", path.display());
                return Ok(None);
            }
        };
        if header.version != PIN_FORMAT_VERSION {
            tracing::warn!(
                "Ignoring pin file {} with unsupported format version {}",
                path.display(),
                header.version
            );
            return Ok(None);
        }

        match toml::from_str::<PinFile>(&content) {
            Ok(file) => Ok(Some(file)),
            Err(e) => {
                tracing::warn!("Ignoring malformed pin file {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    pub fn to_string_pretty(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Write the pin file atomically.
    pub fn save(&self, path: &Path) -> miette::Result<()> {
        let content = self.to_string_pretty().map_err(|e| {
            graft_util::errors::GraftError::Pins {
                message: format!("Failed to serialize pins: {e}"),
            }
        })?;
        graft_util::fs::write_atomic(path, content.as_bytes()).map_err(|e| {
            graft_util::errors::GraftError::Pins {
                message: format!("Failed to write {}: {e}", path.display()),
            }
        })?;
        Ok(())
    }
}
