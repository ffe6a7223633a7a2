//! Markdown documents written to the working copy.
//!
//! - `render_index`: the primary line's README, one row per version with a
//!   link to its line.
//! - `render_line_report`: a version line's README, its configuration as a
//!   parameter table.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::domain::{Configuration, VersionFingerprint};
use crate::index::GlobalIndex;

/// Render a GitHub-flavoured markdown table.
pub fn markdown_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&format!("|{}\n", " --- |".repeat(header.len())));
    for row in rows {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out
}

/// URL of a version line under `repository_url`.
pub fn line_url(repository_url: &str, fingerprint: &VersionFingerprint) -> String {
    format!("{}/tree/{}", repository_url, fingerprint)
}

fn cell(value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    text.replace('|', "\\|").replace('\n', " ")
}

/// Render the global index document.
pub fn render_index(index: &GlobalIndex, repository_url: &str) -> String {
    let mut out = String::new();
    out.push_str("# Versions\n\n");
    out.push_str(&format!(
        "All recorded versions of [{0}]({0}). Each version line holds the artifact snapshots of one configuration.\n\n",
        repository_url
    ));

    if index.is_empty() {
        out.push_str("_No versions recorded yet._\n");
        return out;
    }

    let keys: BTreeSet<&String> = index.iter().flat_map(|(_, c)| c.keys()).collect();
    let mut header = vec!["version".to_string()];
    header.extend(keys.iter().map(|k| k.to_string()));

    let rows: Vec<Vec<String>> = index
        .iter()
        .map(|(fp, config)| {
            let mut row = vec![format!("[{}]({})", fp, line_url(repository_url, fp))];
            row.extend(keys.iter().map(|k| cell(config.get(k))));
            row
        })
        .collect();

    out.push_str(&markdown_table(&header, &rows));
    out
}

/// Render the report stored on one version line.
pub fn render_line_report(
    fingerprint: &VersionFingerprint,
    config: &Configuration,
    repository_url: &str,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Version `{}`\n\n", fingerprint.short()));
    out.push_str(&format!(
        "Fingerprint: `{}`. See [all versions]({}).\n\n",
        fingerprint, repository_url
    ));

    let header = vec!["parameter".to_string(), "value".to_string()];
    let rows: Vec<Vec<String>> = config
        .iter()
        .map(|(k, v)| vec![k.clone(), cell(Some(v))])
        .collect();
    out.push_str(&markdown_table(&header, &rows));
    out
}
