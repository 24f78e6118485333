use std::fmt;

use sha2::{Digest, Sha256};

/// Stable storage key for a (profile, URL) pair.
///
/// The key is the SHA-256 digest of the UTF-8 bytes of `"{profile_id}-{url}"`,
/// rendered as 64 lowercase hex characters. This string is persisted as the
/// primary key of every seen-link record, so the format must never change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct Fingerprint(String);

/// Length of a rendered fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 64;

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the fingerprint of a URL as seen by one analytics profile.
pub fn fingerprint(profile_id: &str, url: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(profile_id.as_bytes());
    hasher.update(b"-");
    hasher.update(url.as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}
