use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of a byte slice, returning a lowercase hex string.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a set of lines independent of the order they are given in.
///
/// Lines are sorted and joined with `\n` before hashing, so two callers that
/// collect the same lines from differently ordered maps agree on the digest.
pub fn sha256_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut lines: Vec<String> = lines.into_iter().map(|s| s.as_ref().to_string()).collect();
    lines.sort();
    sha256_bytes(lines.join("\n").as_bytes())
}
