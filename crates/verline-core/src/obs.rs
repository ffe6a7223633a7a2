//! Structured events for the record lifecycle.
//!
//! Every event carries an `event` field so JSON logs can be filtered by it.

use tracing::{debug, info, warn};

/// Span covering one `record` call, tagged with the repository id.
///
/// Attach it with `tracing::Instrument` so it stays valid across awaits.
pub fn record_span(repo_id: &str) -> tracing::Span {
    tracing::info_span!("verline.record", repo_id = %repo_id)
}

pub fn emit_record_started(repo_id: &str, fingerprint: &str) {
    info!(event = "record.started", repo_id = %repo_id, fingerprint = %fingerprint);
}

/// Result of comparing the stored configuration with the requested one.
pub fn emit_drift_checked(fingerprint: &str, changed: bool) {
    debug!(event = "record.drift_checked", fingerprint = %fingerprint, changed = changed);
}

pub fn emit_line_switched(from: &str, to: &str) {
    info!(event = "line.switched", from = %from, to = %to);
}

/// A pull was skipped because the line has never been pushed.
pub fn emit_pull_skipped(line: &str) {
    debug!(event = "line.pull_skipped", line = %line);
}

pub fn emit_artifact_pushed(line: &str, bytes: usize) {
    info!(event = "artifact.pushed", line = %line, bytes = bytes);
}

pub fn emit_index_updated(line: &str, entries: usize) {
    info!(event = "index.updated", line = %line, entries = entries);
}

pub fn emit_record_finished(repo_id: &str, fingerprint: &str, changed: bool, duration_ms: u64) {
    info!(
        event = "record.finished",
        repo_id = %repo_id,
        fingerprint = %fingerprint,
        changed = changed,
        duration_ms = duration_ms,
    );
}

/// A record failed partway. `rolled_back` tells whether the stored
/// configuration was dropped so the next attempt redoes every step.
pub fn emit_record_failed(
    repo_id: &str,
    fingerprint: &str,
    rolled_back: bool,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "record.failed",
        repo_id = %repo_id,
        fingerprint = %fingerprint,
        rolled_back = rolled_back,
        error = %error,
    );
}

pub fn emit_repository_deleted(repo_id: &str, purge_remote: bool) {
    info!(event = "repository.deleted", repo_id = %repo_id, purge_remote = purge_remote);
}

/// Remote deletion failed after the local copy was already removed.
pub fn emit_remote_delete_failed(repo_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "repository.delete_failed", repo_id = %repo_id, error = %error);
}
