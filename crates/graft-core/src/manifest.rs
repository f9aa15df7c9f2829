//! Parsed package descriptions.
//!
//! The resolver and graph builder only ever see [`ManifestDescriptor`]
//! values. This module also ships the declarative `Graft.toml` reader used by
//! the local registry and the root package.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::PackageIdentity;
use crate::version::{parse_semver, Requirement, VersionError};

pub const MANIFEST_BASENAME: &str = "Graft";
pub const MANIFEST_FILE_NAME: &str = "Graft.toml";

/// Problems found while turning a manifest file into a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ManifestError {
    #[error("empty manifest")]
    #[diagnostic(help("declare at least a [package] section with a name"))]
    Empty,

    #[error("{0}")]
    Syntax(String),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(
        "dependency '{url}' must declare exactly one of version, from, major, exact, branch or revision"
    )]
    Requirement { url: String },

    #[error("target '{target}' references package '{package}', which is not a declared dependency")]
    UnknownPackage { target: String, package: String },
}

/// The parsed description of one package at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDescriptor {
    pub name: String,
    pub identity: PackageIdentity,
    pub dependencies: Vec<Dependency>,
    pub targets: Vec<TargetDescriptor>,
    pub products: Vec<ProductDescriptor>,
}

/// A package-level dependency and the versions it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub identity: PackageIdentity,
    /// The location as written, kept for checkouts and the pin file.
    pub location: String,
    pub requirement: Requirement,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    #[default]
    Library,
    Executable,
    Test,
}

/// A buildable unit inside a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub name: String,
    pub kind: TargetKind,
    /// Names of other targets in the same package.
    pub dependencies: Vec<String>,
    /// Products of dependency packages.
    pub products: Vec<ProductRef>,
}

/// A cross-package reference, `identity.product`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductRef {
    pub package: PackageIdentity,
    pub product: String,
}

impl std::fmt::Display for ProductRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.package, self.product)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductKind {
    #[default]
    Library,
    StaticLibrary,
    DynamicLibrary,
    Executable,
}

/// An externally consumable grouping of targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDescriptor {
    pub name: String,
    pub kind: ProductKind,
    pub targets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    package: Option<PackageSection>,
    #[serde(default)]
    dependencies: Vec<DependencyEntry>,
    #[serde(default)]
    targets: Vec<TargetEntry>,
    #[serde(default)]
    products: Vec<ProductEntry>,
}

#[derive(Debug, Deserialize)]
struct PackageSection {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DependencyEntry {
    url: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    major: Option<u64>,
    #[serde(default)]
    exact: Option<String>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    revision: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TargetEntry {
    name: String,
    #[serde(default)]
    kind: TargetKind,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    products: Vec<ProductRefEntry>,
}

#[derive(Debug, Deserialize)]
struct ProductRefEntry {
    package: String,
    product: String,
}

#[derive(Debug, Deserialize)]
struct ProductEntry {
    name: String,
    #[serde(default)]
    kind: ProductKind,
    #[serde(default)]
    targets: Vec<String>,
}

impl ManifestDescriptor {
    /// Parse `Graft.toml` content for the package with the given identity.
    pub fn parse(content: &str, identity: PackageIdentity) -> Result<Self, ManifestError> {
        if content.trim().is_empty() {
            return Err(ManifestError::Empty);
        }
        let file: ManifestFile =
            toml::from_str(content).map_err(|e| ManifestError::Syntax(e.to_string()))?;
        let package = file.package.ok_or(ManifestError::Empty)?;

        let dependencies = file
            .dependencies
            .into_iter()
            .map(DependencyEntry::into_dependency)
            .collect::<Result<Vec<_>, _>>()?;

        let mut targets = Vec::with_capacity(file.targets.len());
        for entry in file.targets {
            let products = entry
                .products
                .into_iter()
                .map(|r| resolve_product_ref(&entry.name, r, &dependencies))
                .collect::<Result<Vec<_>, _>>()?;
            targets.push(TargetDescriptor {
                name: entry.name,
                kind: entry.kind,
                dependencies: entry.dependencies,
                products,
            });
        }

        let products = file
            .products
            .into_iter()
            .map(|p| ProductDescriptor {
                name: p.name,
                kind: p.kind,
                targets: p.targets,
            })
            .collect();

        Ok(Self {
            name: package.name,
            identity,
            dependencies,
            targets,
            products,
        })
    }

    /// Load and parse a manifest file from disk.
    pub fn from_path(path: &Path, identity: PackageIdentity) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            graft_util::errors::GraftError::Manifest {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;
        Self::parse(&content, identity).map_err(|e| {
            graft_util::errors::GraftError::Manifest {
                message: format!("{}: {e}", path.display()),
            }
            .into()
        })
    }

    pub fn target(&self, name: &str) -> Option<&TargetDescriptor> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn product(&self, name: &str) -> Option<&ProductDescriptor> {
        self.products.iter().find(|p| p.name == name)
    }

    pub fn dependency(&self, identity: &PackageIdentity) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| &d.identity == identity)
    }
}

impl DependencyEntry {
    fn into_dependency(self) -> Result<Dependency, ManifestError> {
        let mut forms: Vec<Requirement> = Vec::new();
        if let Some(ref v) = self.version {
            forms.push(parse_version_field(v)?);
        }
        if let Some(ref v) = self.from {
            forms.push(Requirement::up_to_next_major(parse_semver(v)?)?);
        }
        if let Some(major) = self.major {
            forms.push(Requirement::major(major)?);
        }
        if let Some(ref v) = self.exact {
            forms.push(Requirement::Exact(parse_semver(v)?));
        }
        if let Some(ref b) = self.branch {
            forms.push(Requirement::Branch(b.clone()));
        }
        if let Some(ref r) = self.revision {
            forms.push(Requirement::Revision(r.clone()));
        }

        if forms.len() != 1 {
            return Err(ManifestError::Requirement { url: self.url });
        }
        let requirement = forms.remove(0);
        Ok(Dependency {
            identity: PackageIdentity::from_location(&self.url),
            location: self.url,
            requirement,
        })
    }
}

/// `version = "..."` takes requirement syntax; a plain version means "this
/// version up to the next major".
fn parse_version_field(s: &str) -> Result<Requirement, VersionError> {
    match s.parse::<Requirement>() {
        Ok(req) => Ok(req),
        Err(VersionError::InvalidRequirement(_)) => {
            parse_semver(s).and_then(Requirement::up_to_next_major)
        }
        Err(e) => Err(e),
    }
}

fn resolve_product_ref(
    target: &str,
    entry: ProductRefEntry,
    dependencies: &[Dependency],
) -> Result<ProductRef, ManifestError> {
    let by_location = PackageIdentity::from_location(&entry.package);
    let package = dependencies
        .iter()
        .find(|d| d.identity == by_location)
        .or_else(|| dependencies.iter().find(|d| d.identity.name() == entry.package))
        .map(|d| d.identity.clone())
        .ok_or_else(|| ManifestError::UnknownPackage {
            target: target.to_string(),
            package: entry.package.clone(),
        })?;
    Ok(ProductRef {
        package,
        product: entry.product,
    })
}

/// Pick the manifest file for a package directory.
///
/// `Graft@<major>.<minor>.<patch>.toml`, then `Graft@<major>.<minor>.toml`,
/// then `Graft@<major>.toml` for the current [`crate::TOOLS_VERSION`] win over
/// the plain `Graft.toml`.
pub fn find_manifest(dir: &Path) -> Option<PathBuf> {
    let (major, minor, patch) = crate::TOOLS_VERSION;
    let candidates = [
        format!("{MANIFEST_BASENAME}@{major}.{minor}.{patch}.toml"),
        format!("{MANIFEST_BASENAME}@{major}.{minor}.toml"),
        format!("{MANIFEST_BASENAME}@{major}.toml"),
        MANIFEST_FILE_NAME.to_string(),
    ];
    candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}
