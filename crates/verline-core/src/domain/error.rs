//! Error taxonomy for Verline.

use std::path::PathBuf;

use verline_remote::RemoteError;

/// Verline errors.
#[derive(Debug, thiserror::Error)]
pub enum VersioningError {
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("line {line} has no upstream to pull from")]
    NoUpstream { line: String },

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(#[source] RemoteError),

    #[error("storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Local working copy cannot be used as is: uncommitted changes block a
    /// line switch, or the directory is no longer a working copy.
    #[error("working copy unusable: {0}")]
    WorkingCopyInvalid(#[source] RemoteError),

    #[error("remote deletion failed: {0}")]
    RemoteDeletionFailed(#[source] RemoteError),

    #[error("artifact could not be serialized: {0}")]
    Artifact(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VersioningError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VersioningError::StorageUnavailable {
            path: path.into(),
            source,
        }
    }
}

impl From<RemoteError> for VersioningError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NoUpstream { line } => VersioningError::NoUpstream { line },
            local @ (RemoteError::DirtyWorkingCopy { .. } | RemoteError::NotAWorkingCopy { .. }) => {
                VersioningError::WorkingCopyInvalid(local)
            }
            other => VersioningError::RemoteUnavailable(other),
        }
    }
}

/// Result type for Verline operations.
pub type Result<T> = std::result::Result<T, VersioningError>;
