//! Domain types: configurations, fingerprints and the error taxonomy.

pub mod config;
pub mod error;
pub mod fingerprint;

pub use config::Configuration;
pub use error::{Result, VersioningError};
pub use fingerprint::{fingerprint, VersionFingerprint};
