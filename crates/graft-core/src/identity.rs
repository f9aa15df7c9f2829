//! Canonical package identities derived from source locations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical key for a package, derived from where its source lives.
///
/// Equivalent spellings of the same location (scheme, letter case of the
/// host, a trailing `.git` or `/`, scp-style `git@host:path`) map to the same
/// identity. The path part keeps its case, so distinct repositories never
/// collide. Filesystem paths are never mistaken for URLs: a relative path is
/// written with a leading `./` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageIdentity(String);

impl PackageIdentity {
    /// Canonicalize a raw repository URL or filesystem path.
    pub fn from_location(location: &str) -> Self {
        Self(canonicalize(location))
    }

    /// The canonical key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last path component, used as a short display name.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonicalize(location: &str) -> String {
    let mut loc = location.trim().trim_end_matches('/');
    let suffix = loc.get(loc.len().saturating_sub(4)..);
    if loc.len() > 4 && suffix.is_some_and(|s| s.eq_ignore_ascii_case(".git")) {
        loc = &loc[..loc.len() - 4];
    }
    let loc = loc.trim_end_matches('/');

    if let Some((_scheme, rest)) = loc.split_once("://") {
        let (authority, path) = match rest.split_once('/') {
            Some((a, p)) => (a, p),
            None => (rest, ""),
        };
        // Drop `user[:password]@` and keep the host (with any port).
        let host = authority.rsplit('@').next().unwrap_or(authority);
        return join_host_path(host, path);
    }

    if let Some((authority, path)) = split_scp(loc) {
        let host = authority.rsplit('@').next().unwrap_or(authority);
        return join_host_path(host, path);
    }

    local_path(loc)
}

/// Filesystem locations keep a leading `/`, a drive letter, or `./` or `..`,
/// so a relative path never reads like a `host/path` URL identity.
fn local_path(loc: &str) -> String {
    let path = normalize_path(&loc.replace('\\', "/"));
    if path.starts_with('/') || path == ".." || path.starts_with("../") || has_drive(&path) {
        path
    } else if path.is_empty() {
        ".".to_string()
    } else {
        format!("./{path}")
    }
}

fn has_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Recognize `user@host:path` without mistaking `C:\dir` or `/a:b` for it.
fn split_scp(loc: &str) -> Option<(&str, &str)> {
    let (authority, path) = loc.split_once(':')?;
    if authority.is_empty() || authority.contains('/') || authority.contains('\\') {
        return None;
    }
    if authority.len() == 1 && authority.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((authority, path))
}

fn join_host_path(host: &str, path: &str) -> String {
    let host = host.to_ascii_lowercase();
    let path = normalize_path(path);
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        host
    } else {
        format!("{host}/{path}")
    }
}

/// Lexically normalize a `/`-separated path: collapse repeated separators,
/// drop `.` components, and fold `..` into its parent.
fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(&last) if last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}
