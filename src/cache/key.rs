use std::fmt;

use sha2::{Digest, Sha256};

/// Stable on-disk name for a repository's mirror.
///
/// The key is the SHA-256 of the repository identifier, rendered as lowercase
/// hex. The identifier is treated as an opaque, untrusted string: a
/// cryptographic hash keeps adversarial identifiers from colliding with
/// another tenant's workspace, and the hex rendering contains no path
/// separators or reserved characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_repository(identifier: &str) -> CacheKey {
        let digest = Sha256::digest(identifier.as_bytes());
        CacheKey(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
