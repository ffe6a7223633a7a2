//! The global index: every fingerprint ever recorded and its configuration.
//!
//! Lives on the primary line as a JSON object keyed by fingerprint. Entries
//! are inserted or overwritten, never removed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Configuration, VersionFingerprint};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalIndex {
    entries: BTreeMap<VersionFingerprint, Configuration>,
}

impl GlobalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `fingerprint`, returning the
    /// configuration it replaced.
    pub fn upsert(
        &mut self,
        fingerprint: VersionFingerprint,
        config: Configuration,
    ) -> Option<Configuration> {
        self.entries.insert(fingerprint, config)
    }

    pub fn get(&self, fingerprint: &VersionFingerprint) -> Option<&Configuration> {
        self.entries.get(fingerprint)
    }

    pub fn contains(&self, fingerprint: &VersionFingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Entries ordered by fingerprint.
    pub fn iter(&self) -> impl Iterator<Item = (&VersionFingerprint, &Configuration)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> Configuration {
        Configuration::from_value(value).unwrap()
    }

    #[test]
    fn upsert_same_fingerprint_keeps_one_entry() {
        let mut index = GlobalIndex::new();
        let a = config(json!({"a": 1}));
        let b = config(json!({"b": 2}));

        assert!(index.upsert(a.fingerprint(), a.clone()).is_none());
        assert!(index.upsert(b.fingerprint(), b.clone()).is_none());
        assert_eq!(index.upsert(a.fingerprint(), a.clone()), Some(a.clone()));

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&b.fingerprint()), Some(&b));
    }

    #[test]
    fn persists_as_object_keyed_by_fingerprint() {
        let mut index = GlobalIndex::new();
        let a = config(json!({"hidden_size": 8}));
        index.upsert(a.fingerprint(), a.clone());

        let value = serde_json::to_value(&index).unwrap();
        assert_eq!(value[a.fingerprint().as_str()], json!({"hidden_size": 8}));

        let decoded: GlobalIndex = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn rejects_non_fingerprint_keys() {
        let raw = json!({"main": {"a": 1}});
        assert!(serde_json::from_value::<GlobalIndex>(raw).is_err());
    }
}
