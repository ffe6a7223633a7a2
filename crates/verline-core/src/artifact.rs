//! Artifacts: whatever a run produces and wants versioned.
//!
//! The orchestrator only needs a byte snapshot of the current state, which it
//! writes verbatim into the working copy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Result, VersioningError};

/// Something that can snapshot its state as bytes.
pub trait Artifact: Send + Sync {
    fn serialize_state(&self) -> Result<Vec<u8>>;
}

impl Artifact for [u8] {
    fn serialize_state(&self) -> Result<Vec<u8>> {
        Ok(self.to_vec())
    }
}

impl Artifact for Vec<u8> {
    fn serialize_state(&self) -> Result<Vec<u8>> {
        Ok(self.clone())
    }
}

/// A dense f32 tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(VersioningError::Artifact(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Tensor { shape, data })
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Tensor {
            shape,
            data: vec![0.0; len],
        }
    }
}

/// Named parameters of a model, e.g. `in_dense.weight`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDict {
    tensors: BTreeMap<String, Tensor>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.tensors.iter()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.tensors.values().map(|t| t.data.len()).sum()
    }

    /// Decode a snapshot written by [`Artifact::serialize_state`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl Artifact for StateDict {
    fn serialize_state(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// An artifact already on disk, passed through unchanged.
#[derive(Debug, Clone)]
pub struct FileArtifact {
    path: PathBuf,
}

impl FileArtifact {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileArtifact {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Artifact for FileArtifact {
    fn serialize_state(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| VersioningError::storage(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_shape_must_match_data() {
        assert!(Tensor::new(vec![2, 3], vec![0.0; 6]).is_ok());
        let err = Tensor::new(vec![2, 3], vec![0.0; 5]).unwrap_err();
        assert!(matches!(err, VersioningError::Artifact(_)));
    }

    #[test]
    fn state_dict_snapshot_decodes() {
        let mut sd = StateDict::new();
        sd.insert("in_dense.weight", Tensor::zeros(vec![8, 2]));
        sd.insert("in_dense.bias", Tensor::zeros(vec![8]));
        assert_eq!(sd.parameter_count(), 24);

        let bytes = sd.serialize_state().unwrap();
        assert_eq!(StateDict::from_bytes(&bytes).unwrap(), sd);
    }

    #[test]
    fn file_artifact_reads_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.pth");
        std::fs::write(&path, b"\x00\x01raw").unwrap();

        let artifact = FileArtifact::new(&path);
        assert_eq!(artifact.serialize_state().unwrap(), b"\x00\x01raw");
    }

    #[test]
    fn missing_file_is_storage_error() {
        let artifact = FileArtifact::new("/definitely/not/here.bin");
        let err = artifact.serialize_state().unwrap_err();
        assert!(matches!(err, VersioningError::StorageUnavailable { .. }));
    }
}
