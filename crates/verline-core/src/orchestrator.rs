//! The versioning orchestrator.
//!
//! One orchestrator owns one local working copy and one remote repository.
//! Each `record` call resolves the configuration to its version line, pushes
//! a fresh artifact snapshot there and, when the configuration changed, adds
//! it to the global index on the primary line.
//!
//! Every step is awaited in order; nothing runs in the background. Callers
//! are expected to be the only writer against the remote repository.
//!
//! A failed `record` can be retried with the same arguments. Uncommitted
//! files are discarded first, and a failure on the changed path drops the
//! stored configuration so the retry pushes the index entry as well.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn, Instrument};
use verline_remote::{RemoteError, RepoId, RepositoryHost, WorkingCopySync};

use crate::artifact::Artifact;
use crate::domain::{Configuration, Result, VersionFingerprint, VersioningError};
use crate::index::GlobalIndex;
use crate::obs;
use crate::reporting::{render_index, render_line_report};
use crate::working_copy::LocalWorkingCopy;

pub const CONFIG_COMMIT_MESSAGE: &str = "Configuration added.";
pub const ARTIFACT_COMMIT_MESSAGE: &str = "Artifact weights updated.";
pub const INDEX_COMMIT_MESSAGE: &str = "Index updated.";

pub const DEFAULT_PRIMARY_LINE: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Line holding the global index and nothing else.
    pub primary_line: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            primary_line: DEFAULT_PRIMARY_LINE.to_string(),
        }
    }
}

impl OrchestratorOptions {
    pub fn with_primary_line(mut self, line: impl Into<String>) -> Self {
        self.primary_line = line.into();
        self
    }
}

/// What a `record` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub fingerprint: VersionFingerprint,
    /// Line the artifact snapshot was pushed to.
    pub line: String,
    /// The configuration differed from the one in the working copy.
    pub changed: bool,
    /// The global index was rewritten and pushed.
    pub index_updated: bool,
}

pub struct VersioningOrchestrator<H: RepositoryHost> {
    host: H,
    repo_id: RepoId,
    working_copy: LocalWorkingCopy,
    sync: Box<dyn WorkingCopySync>,
    options: OrchestratorOptions,
}

impl<H: RepositoryHost> VersioningOrchestrator<H> {
    /// Prepare `local_dir`, make sure the remote repository exists and open
    /// (or clone) the working copy.
    pub async fn open(host: H, repo_id: RepoId, local_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(host, repo_id, local_dir, OrchestratorOptions::default()).await
    }

    pub async fn open_with_options(
        host: H,
        repo_id: RepoId,
        local_dir: impl AsRef<Path>,
        options: OrchestratorOptions,
    ) -> Result<Self> {
        let working_copy = LocalWorkingCopy::init(local_dir)?;
        host.ensure_repository(&repo_id).await?;
        let sync = host
            .open_working_copy(&repo_id, working_copy.root())
            .await?;

        Ok(Self {
            host,
            repo_id,
            working_copy,
            sync,
            options,
        })
    }

    pub fn repo_id(&self) -> &RepoId {
        &self.repo_id
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn working_copy(&self) -> &LocalWorkingCopy {
        &self.working_copy
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn repository_url(&self) -> String {
        self.host.repository_url(&self.repo_id)
    }

    pub async fn current_line(&self) -> Result<String> {
        Ok(self.sync.current_line().await?)
    }

    /// Whether `config` differs from the configuration in the working copy.
    ///
    /// Only local state is consulted: a working copy without a stored
    /// configuration always counts as changed, even when the remote already
    /// holds a line for this fingerprint.
    pub fn has_configuration_changed(&self, config: &Configuration) -> Result<bool> {
        Ok(self.working_copy.load_configuration()?.as_ref() != Some(config))
    }

    /// Record one run: `config` resolves the version line, `artifact` is
    /// snapshotted onto it.
    pub async fn record(
        &mut self,
        config: &Configuration,
        artifact: &dyn Artifact,
    ) -> Result<RecordOutcome> {
        let span = obs::record_span(self.repo_id.as_str());
        self.record_steps(config, artifact).instrument(span).await
    }

    async fn record_steps(
        &mut self,
        config: &Configuration,
        artifact: &dyn Artifact,
    ) -> Result<RecordOutcome> {
        let started = Instant::now();
        let repo_id = self.repo_id.to_string();
        let fingerprint = config.fingerprint();
        obs::emit_record_started(&repo_id, fingerprint.as_str());

        let changed = self.has_configuration_changed(config)?;
        obs::emit_drift_checked(fingerprint.as_str(), changed);

        // Files left behind by an interrupted record would block checkout.
        self.sync.discard_changes().await?;

        let line = match self
            .publish(config, artifact, &fingerprint, changed)
            .await
        {
            Ok(line) => line,
            Err(e) => {
                let rolled_back = changed && self.forget_configuration();
                obs::emit_record_failed(&repo_id, fingerprint.as_str(), rolled_back, &e);
                return Err(e);
            }
        };

        info!(
            "Version {} recorded, see {}",
            fingerprint.short(),
            self.repository_url()
        );
        obs::emit_record_finished(
            &repo_id,
            fingerprint.as_str(),
            changed,
            started.elapsed().as_millis() as u64,
        );

        Ok(RecordOutcome {
            fingerprint,
            line,
            changed,
            index_updated: changed,
        })
    }

    /// Push the configuration (when changed), the artifact and the index
    /// entry (when changed). Returns the line holding the artifact.
    async fn publish(
        &mut self,
        config: &Configuration,
        artifact: &dyn Artifact,
        fingerprint: &VersionFingerprint,
        changed: bool,
    ) -> Result<String> {
        if changed {
            self.switch_to(fingerprint.as_str(), true).await?;
            self.sync_current_line().await?;
            self.working_copy.clear_index()?;
            self.working_copy.store_configuration(config)?;
            let report = render_line_report(fingerprint, config, &self.repository_url());
            self.working_copy.write_report(&report)?;
            self.sync.push(CONFIG_COMMIT_MESSAGE).await?;
        }

        let bytes = artifact.serialize_state()?;
        self.working_copy.write_artifact(&bytes)?;
        self.sync.push(ARTIFACT_COMMIT_MESSAGE).await?;
        let line = self.sync.current_line().await?;
        obs::emit_artifact_pushed(&line, bytes.len());

        if changed {
            self.update_index(fingerprint, config).await?;
            self.switch_to(&line, false).await?;
        }
        Ok(line)
    }

    /// After a failed changed-path record the configuration may already sit
    /// on its line while the index misses it. Dropping the local copy makes
    /// the retry take the changed path again; `discard_changes` restores the
    /// file before the line switch.
    fn forget_configuration(&self) -> bool {
        match self.working_copy.forget_configuration() {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not drop stored configuration after failed record: {}", e);
                false
            }
        }
    }

    /// Read the global index from the primary line, then return to the line
    /// that was checked out.
    pub async fn load_index(&mut self) -> Result<GlobalIndex> {
        let previous = self.sync.current_line().await?;
        let primary = self.options.primary_line.clone();

        if previous != primary {
            match self.sync.checkout(&primary, false).await {
                Ok(()) => {}
                Err(RemoteError::LineNotFound { .. }) => return Ok(GlobalIndex::new()),
                Err(e) => return Err(e.into()),
            }
        }

        let loaded = match self.sync_current_line().await {
            Ok(()) => self.working_copy.load_index(),
            Err(e) => Err(e),
        };

        if previous != primary {
            self.sync.checkout(&previous, false).await?;
        }
        loaded
    }

    /// Remove the local working copy and, with `purge_remote`, the remote
    /// repository too.
    ///
    /// Local removal happens first and is not rolled back when the remote
    /// deletion fails.
    pub async fn delete(self, purge_remote: bool) -> Result<()> {
        let VersioningOrchestrator {
            host,
            repo_id,
            working_copy,
            sync,
            ..
        } = self;
        drop(sync);

        working_copy.remove()?;

        if purge_remote {
            if let Err(e) = host.delete_repository(&repo_id).await {
                obs::emit_remote_delete_failed(repo_id.as_str(), &e);
                return Err(VersioningError::RemoteDeletionFailed(e));
            }
        }

        obs::emit_repository_deleted(repo_id.as_str(), purge_remote);
        Ok(())
    }

    async fn switch_to(&self, line: &str, create_if_absent: bool) -> Result<()> {
        let current = self.sync.current_line().await?;
        if current != line {
            self.sync.checkout(line, create_if_absent).await?;
            obs::emit_line_switched(&current, line);
        }
        Ok(())
    }

    /// Pull the current line. A line that was never pushed has nothing to
    /// pull, which is not an error.
    async fn sync_current_line(&self) -> Result<()> {
        match self.sync.pull().await {
            Ok(()) => Ok(()),
            Err(RemoteError::NoUpstream { line }) => {
                obs::emit_pull_skipped(&line);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_index(
        &mut self,
        fingerprint: &VersionFingerprint,
        config: &Configuration,
    ) -> Result<()> {
        let primary = self.options.primary_line.clone();
        self.switch_to(&primary, true).await?;
        self.sync_current_line().await?;

        self.working_copy.clear_line_files()?;
        let mut index = self.working_copy.load_index()?;
        index.upsert(fingerprint.clone(), config.clone());
        self.working_copy.store_index(&index)?;
        self.working_copy
            .write_report(&render_index(&index, &self.repository_url()))?;
        self.sync.push(INDEX_COMMIT_MESSAGE).await?;

        obs::emit_index_updated(&primary, index.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verline_remote::fakes::MemoryHost;

    fn config(value: serde_json::Value) -> Configuration {
        Configuration::from_value(value).unwrap()
    }

    #[test]
    fn default_primary_line_is_main() {
        assert_eq!(OrchestratorOptions::default().primary_line, "main");
        let options = OrchestratorOptions::default().with_primary_line("index");
        assert_eq!(options.primary_line, "index");
    }

    #[tokio::test]
    async fn open_creates_remote_and_local_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let host = MemoryHost::new();
        let id = RepoId::new("team/models").unwrap();

        let orch = VersioningOrchestrator::open(host.clone(), id.clone(), tmp.path().join("wc"))
            .await
            .unwrap();

        assert!(host.has_repository(&id));
        assert!(orch.working_copy().root().is_dir());
        assert_eq!(orch.current_line().await.unwrap(), "main");
        assert_eq!(orch.repository_url(), "memory://team/models");
    }

    #[tokio::test]
    async fn fresh_working_copy_counts_as_changed() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = VersioningOrchestrator::open(
            MemoryHost::new(),
            RepoId::new("team/models").unwrap(),
            tmp.path(),
        )
        .await
        .unwrap();

        assert!(orch
            .has_configuration_changed(&config(json!({"h": 8})))
            .unwrap());
    }

    #[tokio::test]
    async fn record_returns_to_recorded_line() {
        let tmp = tempfile::tempdir().unwrap();
        let mut orch = VersioningOrchestrator::open(
            MemoryHost::new(),
            RepoId::new("team/models").unwrap(),
            tmp.path(),
        )
        .await
        .unwrap();

        let c = config(json!({"h": 8}));
        let outcome = orch.record(&c, &b"w1".to_vec()).await.unwrap();

        assert!(outcome.changed);
        assert!(outcome.index_updated);
        assert_eq!(outcome.line, c.fingerprint().as_str());
        assert_eq!(orch.current_line().await.unwrap(), outcome.line);
        assert!(!orch.has_configuration_changed(&c).unwrap());
    }

    #[tokio::test]
    async fn custom_primary_line_holds_the_index() {
        let tmp = tempfile::tempdir().unwrap();
        let host = MemoryHost::new();
        let id = RepoId::new("team/models").unwrap();
        let mut orch = VersioningOrchestrator::open_with_options(
            host.clone(),
            id.clone(),
            tmp.path(),
            OrchestratorOptions::default().with_primary_line("versions"),
        )
        .await
        .unwrap();

        orch.record(&config(json!({"h": 8})), &b"w".to_vec())
            .await
            .unwrap();

        assert!(host.file_at(&id, "versions", "index.json").is_some());
        assert!(host.file_at(&id, "main", "index.json").is_none());
        assert_eq!(orch.load_index().await.unwrap().len(), 1);
    }
}
