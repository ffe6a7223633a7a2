//! Git-backed working copies.
//!
//! `GitWorkingCopy` drives the `git` executable in a local directory whose
//! `origin` remote is the repository on the host. `LocalGitHost` serves bare
//! repositories from a directory, which is handy offline and in tests.
//!
//! Large artifacts need git-lfs: hosts such as the Hugging Face Hub reject
//! plain blobs over 10 MB. A fresh clone installs the lfs filters locally
//! when `git lfs` is available, so files matched by the repository's
//! `.gitattributes` (the Hub tracks `*.bin` by default) go through lfs.
//! Without it, a warning is logged and large pushes will fail on such hosts.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::host_traits::{RemoteResult, RepoId, RepositoryHost, WorkingCopySync};

const DEFAULT_LINE: &str = "main";

/// A local git working copy whose `origin` points at the hosted repository.
#[derive(Debug, Clone)]
pub struct GitWorkingCopy {
    root: PathBuf,
}

impl GitWorkingCopy {
    /// Open the working copy at `root`, cloning `remote_url` into it first if
    /// it is not a git repository yet. `root` may already exist and hold files.
    pub async fn open(remote_url: &str, root: &Path) -> RemoteResult<Self> {
        tokio::fs::create_dir_all(root).await?;
        let wc = GitWorkingCopy {
            root: root.to_path_buf(),
        };

        if root.join(".git").exists() {
            debug!("Opening existing working copy at {:?}", root);
            return Ok(wc);
        }

        info!("Cloning into {:?}", root);
        wc.git(&["init", "--quiet"]).await?;
        wc.git(&["remote", "add", "origin", remote_url]).await?;
        wc.network(&["fetch", "--quiet", "origin"]).await?;
        wc.ensure_identity().await?;
        wc.ensure_lfs().await?;

        let default = wc.remote_default_line().await;
        match default {
            Some(line) => {
                let upstream = format!("origin/{line}");
                wc.git(&[
                    "checkout",
                    "--quiet",
                    "-B",
                    line.as_str(),
                    "--track",
                    upstream.as_str(),
                ])
                .await?;
            }
            None => {
                // Empty remote: give the default line a root commit so later
                // lines have something to branch from.
                let head = format!("refs/heads/{DEFAULT_LINE}");
                wc.git(&["symbolic-ref", "HEAD", head.as_str()]).await?;
                wc.git(&["commit", "--quiet", "--allow-empty", "-m", "initial commit"])
                    .await?;
            }
        }
        Ok(wc)
    }

    /// Directory of the working copy.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run(&self, args: &[&str]) -> RemoteResult<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await
            .map_err(|e| RemoteError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: format!("failed to run git: {e}"),
            })
    }

    /// Run a local git command, returning trimmed stdout.
    async fn git(&self, args: &[&str]) -> RemoteResult<String> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a git command that talks to `origin`.
    async fn network(&self, args: &[&str]) -> RemoteResult<String> {
        match self.git(args).await {
            Err(RemoteError::CommandFailed { command, stderr }) => Err(RemoteError::Unavailable(
                format!("`{command}` failed: {stderr}"),
            )),
            other => other,
        }
    }

    async fn succeeds(&self, args: &[&str]) -> RemoteResult<bool> {
        Ok(self.run(args).await?.status.success())
    }

    async fn has_ref(&self, reference: &str) -> RemoteResult<bool> {
        self.succeeds(&["rev-parse", "--verify", "--quiet", reference])
            .await
    }

    async fn remote_default_line(&self) -> Option<String> {
        let advertised = self
            .succeeds(&["remote", "set-head", "origin", "--auto"])
            .await
            .unwrap_or(false);
        if advertised {
            if let Some(line) = self
                .git(&["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])
                .await
                .ok()
                .and_then(|r| r.strip_prefix("origin/").map(str::to_string))
            {
                return Some(line);
            }
        }
        // Remote HEAD may name a branch that was never pushed.
        let fallback = format!("refs/remotes/origin/{DEFAULT_LINE}");
        match self.has_ref(&fallback).await {
            Ok(true) => Some(DEFAULT_LINE.to_string()),
            _ => None,
        }
    }

    /// Commits need an identity; fall back to a local one when the user has none.
    async fn ensure_identity(&self) -> RemoteResult<()> {
        if !self.succeeds(&["config", "user.email"]).await? {
            self.git(&["config", "user.email", "verline@localhost"])
                .await?;
        }
        if !self.succeeds(&["config", "user.name"]).await? {
            self.git(&["config", "user.name", "verline"]).await?;
        }
        Ok(())
    }

    /// Install the lfs filters and pre-push hook for this clone. Returns
    /// whether lfs is in use.
    async fn ensure_lfs(&self) -> RemoteResult<bool> {
        if !self.succeeds(&["lfs", "version"]).await? {
            warn!("git-lfs not found; artifacts over 10 MB may be rejected by the host");
            return Ok(false);
        }
        self.git(&["lfs", "install", "--local"]).await?;
        debug!("git-lfs filters installed");
        Ok(true)
    }

    async fn ensure_clean(&self, line: &str) -> RemoteResult<()> {
        let status = self.git(&["status", "--porcelain"]).await?;
        if !status.is_empty() {
            return Err(RemoteError::DirtyWorkingCopy {
                line: line.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WorkingCopySync for GitWorkingCopy {
    async fn current_line(&self) -> RemoteResult<String> {
        if !self.root.join(".git").exists() {
            return Err(RemoteError::NotAWorkingCopy {
                path: self.root.display().to_string(),
            });
        }
        self.git(&["symbolic-ref", "--short", "HEAD"]).await
    }

    async fn checkout(&self, line: &str, create_if_absent: bool) -> RemoteResult<()> {
        let current = self.current_line().await?;
        self.network(&["fetch", "--quiet", "--prune", "origin"])
            .await?;
        self.ensure_clean(&current).await?;
        if current == line {
            return Ok(());
        }

        if self.has_ref(&format!("refs/heads/{line}")).await? {
            self.git(&["checkout", "--quiet", line]).await?;
        } else if self.has_ref(&format!("refs/remotes/origin/{line}")).await? {
            let upstream = format!("origin/{line}");
            self.git(&["checkout", "--quiet", "-b", line, "--track", upstream.as_str()])
                .await?;
        } else if create_if_absent {
            self.git(&["checkout", "--quiet", "-b", line]).await?;
        } else {
            return Err(RemoteError::LineNotFound {
                line: line.to_string(),
            });
        }
        debug!(line = %line, "checked out");
        Ok(())
    }

    async fn pull(&self) -> RemoteResult<()> {
        let line = self.current_line().await?;
        let has_upstream = self
            .succeeds(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .await?;
        if !has_upstream {
            return Err(RemoteError::NoUpstream { line });
        }
        self.ensure_clean(&line).await?;
        self.network(&["pull", "--quiet", "--ff-only"]).await?;
        Ok(())
    }

    async fn push(&self, message: &str) -> RemoteResult<()> {
        self.git(&["add", "--all"]).await?;
        let status = self.git(&["status", "--porcelain"]).await?;
        if !status.is_empty() {
            self.git(&["commit", "--quiet", "-m", message]).await?;
        }
        self.network(&["push", "--quiet", "--set-upstream", "origin", "HEAD"])
            .await?;
        Ok(())
    }

    async fn discard_changes(&self) -> RemoteResult<()> {
        self.current_line().await?;
        self.git(&["reset", "--quiet", "--hard", "HEAD"]).await?;
        self.git(&["clean", "-fdq"]).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LocalGitHost
// ---------------------------------------------------------------------------

/// Host serving bare repositories from `<root>/<id>.git`.
#[derive(Debug, Clone)]
pub struct LocalGitHost {
    root: PathBuf,
}

impl LocalGitHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalGitHost { root: root.into() }
    }

    /// Path of the bare repository backing `id`.
    pub fn repository_path(&self, id: &RepoId) -> PathBuf {
        self.root.join(format!("{}.git", id.as_str()))
    }
}

#[async_trait]
impl RepositoryHost for LocalGitHost {
    async fn ensure_repository(&self, id: &RepoId) -> RemoteResult<()> {
        let path = self.repository_path(id);
        if path.join("HEAD").exists() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&path).await?;
        for args in [
            &["init", "--quiet", "--bare"][..],
            &["symbolic-ref", "HEAD", "refs/heads/main"][..],
        ] {
            let output = Command::new("git")
                .args(args)
                .current_dir(&path)
                .output()
                .await?;
            if !output.status.success() {
                return Err(RemoteError::CommandFailed {
                    command: format!("git {}", args.join(" ")),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
        }
        info!("Created bare repository {:?}", path);
        Ok(())
    }

    async fn open_working_copy(
        &self,
        id: &RepoId,
        local_dir: &Path,
    ) -> RemoteResult<Box<dyn WorkingCopySync>> {
        let path = self.repository_path(id);
        if !path.exists() {
            return Err(RemoteError::RepositoryNotFound { id: id.to_string() });
        }
        let wc = GitWorkingCopy::open(&path.to_string_lossy(), local_dir).await?;
        Ok(Box::new(wc))
    }

    async fn delete_repository(&self, id: &RepoId) -> RemoteResult<()> {
        match tokio::fs::remove_dir_all(self.repository_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RemoteError::RepositoryNotFound { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn repository_url(&self, id: &RepoId) -> String {
        format!("file://{}", self.repository_path(id).display())
    }
}
