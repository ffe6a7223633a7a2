//! Configuration fingerprints.
//!
//! A fingerprint is the SHA256 hex digest of a configuration's canonical
//! JSON. It names the version line holding that configuration's runs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::config::Configuration;
use crate::domain::error::VersioningError;

/// Version fingerprint (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always 64
/// lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct VersionFingerprint(String);

impl VersionFingerprint {
    /// Fingerprint a configuration.
    pub fn of(config: &Configuration) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(config.canonical_json().as_bytes());
        VersionFingerprint(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

/// Fingerprint a configuration; same as [`VersionFingerprint::of`].
pub fn fingerprint(config: &Configuration) -> VersionFingerprint {
    VersionFingerprint::of(config)
}

impl TryFrom<String> for VersionFingerprint {
    type Error = VersioningError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(VersioningError::ConfigurationInvalid(format!(
                "not a version fingerprint: {s}"
            )));
        }
        Ok(VersionFingerprint(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for VersionFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
