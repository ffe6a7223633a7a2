//! Error types for verline-remote

use thiserror::Error;

/// Errors raised by a repository host or one of its working copies.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Host unreachable, or a network-bound git command (fetch/pull/push) failed
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// Credentials missing or rejected by the host
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Repository does not exist on the host
    #[error("Repository not found: {id}")]
    RepositoryNotFound { id: String },

    /// Line does not exist locally or remotely and creation was not requested
    #[error("Line not found: {line}")]
    LineNotFound { line: String },

    /// Pull attempted on a line that was never pushed
    #[error("Line {line} has no upstream to pull from")]
    NoUpstream { line: String },

    /// Uncommitted changes would be lost by a checkout or pull
    #[error("Working copy on line {line} has uncommitted changes")]
    DirtyWorkingCopy { line: String },

    /// Directory is not (or no longer) a working copy
    #[error("Not a working copy: {path}")]
    NotAWorkingCopy { path: String },

    /// Invalid repository identifier
    #[error("Invalid repository id: {0}")]
    InvalidRepoId(String),

    /// A local git command failed
    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// `true` for the "nothing to pull yet" condition.
    pub fn is_no_upstream(&self) -> bool {
        matches!(self, RemoteError::NoUpstream { .. })
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            RemoteError::Unavailable(err.to_string())
        } else {
            RemoteError::Http(err.to_string())
        }
    }
}
