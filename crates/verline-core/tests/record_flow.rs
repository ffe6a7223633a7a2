use std::path::Path;

use serde_json::json;
use verline_core::domain::VersioningError;
use verline_core::working_copy::{ARTIFACT_FILE, CONFIG_FILE, INDEX_FILE, REPORT_FILE};
use verline_core::{
    Artifact, Configuration, GlobalIndex, StateDict, Tensor, VersioningOrchestrator,
};
use verline_remote::fakes::MemoryHost;
use verline_remote::{RepoId, RepositoryHost};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn repo() -> RepoId {
    RepoId::new("team/boring-model").expect("repo id")
}

fn config(value: serde_json::Value) -> Configuration {
    Configuration::from_value(value).expect("valid configuration")
}

fn weights(tag: &[u8]) -> Vec<u8> {
    let mut bytes = b"weights:".to_vec();
    bytes.extend_from_slice(tag);
    bytes
}

async fn open(host: &MemoryHost, dir: &Path) -> VersioningOrchestrator<MemoryHost> {
    VersioningOrchestrator::open(host.clone(), repo(), dir)
        .await
        .expect("open orchestrator")
}

fn remote_index(host: &MemoryHost) -> GlobalIndex {
    let bytes = host
        .file_at(&repo(), "main", INDEX_FILE)
        .expect("index on main");
    serde_json::from_slice(&bytes).expect("index json")
}

// ---------------------------------------------------------------------------
// Change detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_record_takes_changed_path() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;

    let c = config(json!({"hidden_size": 8}));
    let fp = c.fingerprint();
    let outcome = orch.record(&c, &weights(b"1")).await.expect("record");

    assert!(outcome.changed);
    assert!(outcome.index_updated);
    assert_eq!(outcome.fingerprint, fp);
    assert_eq!(outcome.line, fp.as_str());

    assert_eq!(
        host.commit_messages(&repo(), fp.as_str()),
        vec!["Configuration added.", "Artifact weights updated."]
    );
    assert_eq!(
        host.commit_messages(&repo(), "main"),
        vec!["initial commit", "Index updated."]
    );
    assert_eq!(
        host.file_at(&repo(), fp.as_str(), ARTIFACT_FILE),
        Some(weights(b"1"))
    );
}

#[tokio::test]
async fn unchanged_config_only_pushes_artifact() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;

    let c = config(json!({"hidden_size": 8}));
    orch.record(&c, &weights(b"1")).await.expect("first record");
    host.clear_operations();

    // Same value, written as a float.
    let same = config(json!({"hidden_size": 8.0}));
    let outcome = orch.record(&same, &weights(b"2")).await.expect("second record");

    assert!(!outcome.changed);
    assert!(!outcome.index_updated);

    let ops = host.operations();
    assert!(!ops.iter().any(|op| op.starts_with("checkout:")), "{ops:?}");
    assert!(!ops.iter().any(|op| op.ends_with("Index updated.")), "{ops:?}");
    assert_eq!(
        ops,
        vec![format!("push:{}:Artifact weights updated.", c.fingerprint())]
    );

    assert_eq!(
        host.commit_messages(&repo(), c.fingerprint().as_str()),
        vec![
            "Configuration added.",
            "Artifact weights updated.",
            "Artifact weights updated."
        ]
    );
}

#[tokio::test]
async fn changed_config_switches_line() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;

    let a = config(json!({"lr": 0.1}));
    let b = config(json!({"lr": 0.01}));
    orch.record(&a, &weights(b"a")).await.expect("record a");
    let outcome = orch.record(&b, &weights(b"b")).await.expect("record b");

    assert!(outcome.changed);
    assert_eq!(orch.current_line().await.expect("line"), b.fingerprint().as_str());

    // Each line keeps its own configuration and artifact.
    let stored_a = host
        .file_at(&repo(), a.fingerprint().as_str(), CONFIG_FILE)
        .expect("params on a");
    let stored_a: Configuration = serde_json::from_slice(&stored_a).expect("params json");
    assert_eq!(stored_a, a);
    assert_eq!(
        host.file_at(&repo(), a.fingerprint().as_str(), ARTIFACT_FILE),
        Some(weights(b"a"))
    );
    assert_eq!(
        host.file_at(&repo(), b.fingerprint().as_str(), ARTIFACT_FILE),
        Some(weights(b"b"))
    );
}

#[tokio::test]
async fn version_lines_carry_no_index_and_main_carries_no_artifact() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;

    let a = config(json!({"a": 1}));
    let b = config(json!({"b": 2}));
    orch.record(&a, &weights(b"a")).await.expect("record a");
    orch.record(&b, &weights(b"b")).await.expect("record b");

    for c in [&a, &b] {
        let line = c.fingerprint();
        assert!(host.file_at(&repo(), line.as_str(), INDEX_FILE).is_none());
        let report = host
            .file_at(&repo(), line.as_str(), REPORT_FILE)
            .expect("line report");
        let report = String::from_utf8(report).expect("utf8");
        assert!(report.contains("| parameter | value |"));
    }

    assert!(host.file_at(&repo(), "main", CONFIG_FILE).is_none());
    assert!(host.file_at(&repo(), "main", ARTIFACT_FILE).is_none());
}

// ---------------------------------------------------------------------------
// Index accumulation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn index_accumulates_distinct_fingerprints() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;

    let a = config(json!({"a": 1}));
    let b = config(json!({"b": 2}));
    orch.record(&a, &weights(b"1")).await.expect("record a");
    orch.record(&b, &weights(b"2")).await.expect("record b");
    orch.record(&a, &weights(b"3")).await.expect("record a again");

    let index = remote_index(&host);
    assert_eq!(index.len(), 2);
    assert_eq!(index.get(&a.fingerprint()), Some(&a));
    assert_eq!(index.get(&b.fingerprint()), Some(&b));

    assert_eq!(orch.load_index().await.expect("load index"), index);
    // Reading the index leaves the working copy where it was.
    assert_eq!(orch.current_line().await.expect("line"), a.fingerprint().as_str());
}

#[tokio::test]
async fn index_document_links_every_line() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;

    let a = config(json!({"hidden_size": 8}));
    orch.record(&a, &weights(b"1")).await.expect("record");

    let readme = host
        .file_at(&repo(), "main", REPORT_FILE)
        .expect("readme on main");
    let readme = String::from_utf8(readme).expect("utf8");
    let fp = a.fingerprint();
    assert!(readme.contains(&format!(
        "[{fp}](memory://team/boring-model/tree/{fp})"
    )));
    assert_eq!(
        host.line_url(&repo(), fp.as_str()),
        format!("memory://team/boring-model/tree/{fp}")
    );
}

#[tokio::test]
async fn load_index_before_any_record_is_empty() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut orch = open(&MemoryHost::new(), tmp.path()).await;
    assert!(orch.load_index().await.expect("load index").is_empty());
}

// ---------------------------------------------------------------------------
// Local-only change detection across working copies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_working_copy_rerecords_known_configuration() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let c = config(json!({"hidden_size": 16}));

    let mut first = open(&host, &tmp.path().join("one")).await;
    first.record(&c, &weights(b"1")).await.expect("record");

    let mut second = open(&host, &tmp.path().join("two")).await;
    let outcome = second.record(&c, &weights(b"2")).await.expect("record");

    // No local params.json yet, so the full path runs again; the remote
    // line and index entry are reused.
    assert!(outcome.changed);
    assert_eq!(remote_index(&host).len(), 1);
    assert_eq!(
        host.commit_messages(&repo(), c.fingerprint().as_str()),
        vec![
            "Configuration added.",
            "Artifact weights updated.",
            "Artifact weights updated."
        ]
    );
}

#[tokio::test]
async fn reopening_existing_directory_keeps_state() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let c = config(json!({"hidden_size": 16}));

    let mut orch = open(&host, tmp.path()).await;
    orch.record(&c, &weights(b"1")).await.expect("record");
    drop(orch);

    let reopened = open(&host, tmp.path()).await;
    assert!(!reopened.has_configuration_changed(&c).expect("compare"));
    assert!(tmp.path().join(CONFIG_FILE).exists());
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_local_only_keeps_remote_lines() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let dir = tmp.path().join("wc");
    let c = config(json!({"a": 1}));

    let mut orch = open(&host, &dir).await;
    orch.record(&c, &weights(b"1")).await.expect("record");
    orch.delete(false).await.expect("delete");

    assert!(!dir.exists());
    assert!(host.has_repository(&repo()));
    assert_eq!(host.lines(&repo()).len(), 2);

    // Re-cloning brings back the published state.
    let mut orch = open(&host, &dir).await;
    assert_eq!(orch.current_line().await.expect("line"), "main");
    assert!(dir.join(INDEX_FILE).exists());
    assert_eq!(orch.load_index().await.expect("index").len(), 1);
}

#[tokio::test]
async fn delete_with_purge_removes_remote() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let dir = tmp.path().join("wc");

    let mut orch = open(&host, &dir).await;
    orch.record(&config(json!({"a": 1})), &weights(b"1"))
        .await
        .expect("record");
    orch.delete(true).await.expect("delete");

    assert!(!dir.exists());
    assert!(!host.has_repository(&repo()));

    let mut orch = open(&host, &dir).await;
    assert_eq!(host.lines(&repo()), vec!["main"]);
    assert!(orch.load_index().await.expect("index").is_empty());
}

#[tokio::test]
async fn delete_is_idempotent_for_missing_directory() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let dir = tmp.path().join("wc");

    let orch = open(&host, &dir).await;
    std::fs::remove_dir_all(&dir).expect("remove behind its back");
    orch.delete(false).await.expect("delete");
}

#[tokio::test]
async fn failed_remote_deletion_is_reported_after_local_removal() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let dir = tmp.path().join("wc");

    let orch = open(&host, &dir).await;
    host.delete_repository(&repo()).await.expect("delete remote");

    let err = orch.delete(true).await.unwrap_err();
    assert!(matches!(err, VersioningError::RemoteDeletionFailed(_)), "{err}");
    assert!(!dir.exists());
}

// ---------------------------------------------------------------------------
// Recovery after a failed push
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_after_failed_artifact_push_still_indexes() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;
    let c = config(json!({"h": 8}));
    let fp = c.fingerprint();

    host.fail_next_push("Artifact weights updated.");
    let err = orch.record(&c, &weights(b"1")).await.unwrap_err();
    assert!(matches!(err, VersioningError::RemoteUnavailable(_)), "{err}");
    // The configuration reached its line, the index did not.
    assert_eq!(
        host.commit_messages(&repo(), fp.as_str()),
        vec!["Configuration added."]
    );
    assert!(host.file_at(&repo(), "main", INDEX_FILE).is_none());

    let retry = orch.record(&c, &weights(b"1")).await.expect("retry");
    assert!(retry.changed);
    assert!(retry.index_updated);
    assert_eq!(remote_index(&host).len(), 1);
    assert!(remote_index(&host).contains(&fp));
    assert_eq!(
        host.commit_messages(&repo(), fp.as_str()),
        vec!["Configuration added.", "Artifact weights updated."]
    );

    let third = orch.record(&c, &weights(b"2")).await.expect("third");
    assert!(!third.changed);
    assert_eq!(remote_index(&host).len(), 1);
}

#[tokio::test]
async fn retry_after_failed_config_push_still_indexes() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;
    let c = config(json!({"h": 16}));

    host.fail_next_push("Configuration added.");
    orch.record(&c, &weights(b"1")).await.unwrap_err();
    assert!(!host.lines(&repo()).contains(&c.fingerprint().to_string()));

    let retry = orch.record(&c, &weights(b"1")).await.expect("retry");
    assert!(retry.changed);
    assert!(remote_index(&host).contains(&c.fingerprint()));
}

#[tokio::test]
async fn failed_index_push_does_not_block_later_records() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;
    let a = config(json!({"h": 8}));
    let b = config(json!({"h": 16}));

    host.fail_next_push("Index updated.");
    let err = orch.record(&a, &weights(b"a")).await.unwrap_err();
    assert!(matches!(err, VersioningError::RemoteUnavailable(_)), "{err}");
    // Left on main with the unpublished index document.
    assert_eq!(orch.current_line().await.expect("line"), "main");
    assert!(tmp.path().join(INDEX_FILE).exists());

    let retry = orch.record(&a, &weights(b"a")).await.expect("retry");
    assert!(retry.changed);
    assert_eq!(remote_index(&host).len(), 1);

    orch.record(&b, &weights(b"b")).await.expect("next config");
    let index = remote_index(&host);
    assert_eq!(index.len(), 2);
    assert!(index.contains(&a.fingerprint()));
    assert!(index.contains(&b.fingerprint()));
}

#[tokio::test]
async fn leftover_files_are_discarded_before_recording() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;
    let c = config(json!({"h": 8}));
    orch.record(&c, &weights(b"1")).await.expect("first record");

    std::fs::write(tmp.path().join("scratch.txt"), b"unsaved").expect("write scratch");
    let outcome = orch
        .record(&config(json!({"h": 32})), &weights(b"2"))
        .await
        .expect("record over leftovers");

    assert!(outcome.changed);
    assert!(!tmp.path().join("scratch.txt").exists());
    assert!(host
        .file_at(&repo(), outcome.line.as_str(), "scratch.txt")
        .is_none());
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offline_remote_is_unavailable() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;

    host.set_offline(true);
    let err = orch
        .record(&config(json!({"a": 1})), &weights(b"1"))
        .await
        .unwrap_err();
    assert!(matches!(err, VersioningError::RemoteUnavailable(_)), "{err}");
}

#[tokio::test]
async fn open_against_offline_host_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    host.set_offline(true);

    let err = VersioningOrchestrator::open(host, repo(), tmp.path())
        .await
        .err()
        .expect("open should fail");
    assert!(matches!(err, VersioningError::RemoteUnavailable(_)));
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

fn toy_model(hidden: usize, seed: f32) -> StateDict {
    let fill = |n: usize| (0..n).map(|i| seed + i as f32 * 0.01).collect::<Vec<_>>();
    let mut sd = StateDict::new();
    sd.insert(
        "in_dense.weight",
        Tensor::new(vec![hidden, 2], fill(hidden * 2)).expect("tensor"),
    );
    sd.insert("in_dense.bias", Tensor::new(vec![hidden], fill(hidden)).expect("tensor"));
    sd.insert(
        "out_dense.weight",
        Tensor::new(vec![4, hidden], fill(4 * hidden)).expect("tensor"),
    );
    sd.insert("out_dense.bias", Tensor::new(vec![4], fill(4)).expect("tensor"));
    sd
}

#[tokio::test]
async fn three_hidden_sizes_then_rerecord() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let host = MemoryHost::new();
    let mut orch = open(&host, tmp.path()).await;

    let configs: Vec<Configuration> = [8, 16, 32]
        .iter()
        .map(|h| config(json!({"hidden_size": h})))
        .collect();
    for (i, c) in configs.iter().enumerate() {
        let h = c.get("hidden_size").and_then(|v| v.as_u64()).expect("h") as usize;
        orch.record(c, &toy_model(h, i as f32))
            .await
            .expect("record");
    }

    let lines = host.lines(&repo());
    assert_eq!(lines.len(), 4);
    assert!(lines.contains(&"main".to_string()));
    for c in &configs {
        assert!(lines.contains(&c.fingerprint().to_string()));
    }
    assert_eq!(remote_index(&host).len(), 3);

    let h8 = &configs[0];
    orch.record(h8, &toy_model(8, 10.0)).await.expect("re-record");

    let messages = host.commit_messages(&repo(), h8.fingerprint().as_str());
    assert_eq!(
        messages
            .iter()
            .filter(|m| m.as_str() == "Artifact weights updated.")
            .count(),
        2
    );
    assert_eq!(remote_index(&host).len(), 3);
    assert_eq!(host.lines(&repo()).len(), 4);

    let stored = host
        .file_at(&repo(), h8.fingerprint().as_str(), ARTIFACT_FILE)
        .expect("artifact");
    let expected = toy_model(8, 10.0).serialize_state().expect("serialize");
    assert_eq!(stored, expected);
    assert_eq!(StateDict::from_bytes(&stored).expect("decode").len(), 4);
}
