//! Trait definitions for the backing versioned store.
//!
//! A store is split in two halves:
//! - `RepositoryHost`: remote repository lifecycle (ensure, open a working
//!   copy, delete) and the public URL of a repository.
//! - `WorkingCopySync`: the local working-copy protocol for one checked-out
//!   directory (current line, checkout, pull, push, discard).
//!
//! All traits are async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Result type for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Repository identifier on a host, `name` or `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoId(String);

impl RepoId {
    /// Validate and wrap a repository identifier.
    pub fn new(id: impl Into<String>) -> RemoteResult<Self> {
        let id = id.into();
        let parts: Vec<&str> = id.split('/').collect();
        let valid_part = |p: &str| {
            !p.is_empty()
                && p != "."
                && p != ".."
                && p
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
            return Err(RemoteError::InvalidRepoId(id));
        }
        Ok(RepoId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owning namespace (user or organization), if any.
    pub fn namespace(&self) -> Option<&str> {
        self.0.split_once('/').map(|(ns, _)| ns)
    }

    /// Repository name without the namespace.
    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or(&self.0)
    }
}

impl std::str::FromStr for RepoId {
    type Err = RemoteError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RepoId::new(s)
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote repository lifecycle.
///
/// Guarantees:
/// - `ensure_repository` is idempotent: an existing repository is left as is.
/// - `open_working_copy` reuses an existing working copy at `local_dir` and
///   clones otherwise; a fresh clone is positioned on the default line.
/// - `delete_repository` fails with `RepositoryNotFound` when absent.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Create the repository if it does not exist yet.
    async fn ensure_repository(&self, id: &RepoId) -> RemoteResult<()>;

    /// Clone `id` into `local_dir`, or open the working copy already there.
    async fn open_working_copy(
        &self,
        id: &RepoId,
        local_dir: &Path,
    ) -> RemoteResult<Box<dyn WorkingCopySync>>;

    /// Delete the repository and every line it holds.
    async fn delete_repository(&self, id: &RepoId) -> RemoteResult<()>;

    /// Human-facing URL of the repository.
    fn repository_url(&self, id: &RepoId) -> String;

    /// Human-facing URL of one line inside the repository.
    fn line_url(&self, id: &RepoId, line: &str) -> String {
        format!("{}/tree/{}", self.repository_url(id), line)
    }
}

/// Working-copy protocol for one local directory.
///
/// Semantics:
/// - `checkout(line, true)` switches to `line`, tracking the remote line if
///   one exists, otherwise branching from the current head.
/// - `pull` fails with `RemoteError::NoUpstream` when the current line was
///   never pushed; callers treat that as "nothing to reconcile".
/// - `push` commits every change in the directory (if any) with `message`
///   and publishes the current line, establishing its upstream.
/// - `discard_changes` resets the directory to the last commit of the
///   current line. It never talks to the remote, so it works offline.
#[async_trait]
pub trait WorkingCopySync: Send + Sync {
    /// Name of the line currently checked out.
    async fn current_line(&self) -> RemoteResult<String>;

    /// Switch to `line`, creating it when absent and `create_if_absent`.
    async fn checkout(&self, line: &str, create_if_absent: bool) -> RemoteResult<()>;

    /// Fast-forward the current line from its remote counterpart.
    async fn pull(&self) -> RemoteResult<()>;

    /// Commit all changes and publish the current line.
    async fn push(&self, message: &str) -> RemoteResult<()>;

    /// Drop uncommitted changes, untracked files included.
    async fn discard_changes(&self) -> RemoteResult<()>;
}
