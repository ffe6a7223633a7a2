//! On-disk projection of the currently checked-out line.
//!
//! Layout of the working copy directory:
//! - `params.json`: configuration of the line (version lines only)
//! - `README.md`: line report, or the index document on the primary line
//! - `model.bin`: serialized artifact (version lines only)
//! - `index.json`: global index (primary line only)

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

use crate::domain::{Configuration, Result, VersioningError};
use crate::index::GlobalIndex;

pub const CONFIG_FILE: &str = "params.json";
pub const REPORT_FILE: &str = "README.md";
pub const ARTIFACT_FILE: &str = "model.bin";
pub const INDEX_FILE: &str = "index.json";

/// Local working copy directory.
#[derive(Debug, Clone)]
pub struct LocalWorkingCopy {
    root: PathBuf,
}

impl LocalWorkingCopy {
    /// Create `root` (and parents) if needed. Existing content is left alone.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| VersioningError::storage(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join(REPORT_FILE)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.root.join(ARTIFACT_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Configuration stored on the current line, `None` when there is none.
    ///
    /// A file that holds something other than a flat configuration counts as
    /// no configuration.
    pub fn load_configuration(&self) -> Result<Option<Configuration>> {
        let path = self.config_path();
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        match Configuration::from_value(value) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                warn!("Ignoring unreadable configuration at {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    pub fn store_configuration(&self, config: &Configuration) -> Result<()> {
        let content = serde_json::to_vec_pretty(config)?;
        self.write_atomic(&self.config_path(), &content)
    }

    /// Delete the stored configuration, so the next drift check reports a
    /// change.
    pub fn forget_configuration(&self) -> Result<()> {
        remove_optional(&self.config_path())
    }

    pub fn write_report(&self, markdown: &str) -> Result<()> {
        self.write_atomic(&self.report_path(), markdown.as_bytes())
    }

    pub fn write_artifact(&self, bytes: &[u8]) -> Result<()> {
        self.write_atomic(&self.artifact_path(), bytes)
    }

    pub fn read_artifact(&self) -> Result<Option<Vec<u8>>> {
        read_optional(&self.artifact_path())
    }

    /// Global index on the current line; empty when the file is absent.
    pub fn load_index(&self) -> Result<GlobalIndex> {
        match read_optional(&self.index_path())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(GlobalIndex::new()),
        }
    }

    pub fn store_index(&self, index: &GlobalIndex) -> Result<()> {
        let content = serde_json::to_vec_pretty(index)?;
        self.write_atomic(&self.index_path(), &content)
    }

    /// Drop the index file inherited when a version line branches off the
    /// primary line.
    pub fn clear_index(&self) -> Result<()> {
        remove_optional(&self.index_path())
    }

    /// Drop configuration and artifact files, which never belong on the
    /// primary line.
    pub fn clear_line_files(&self) -> Result<()> {
        remove_optional(&self.config_path())?;
        remove_optional(&self.artifact_path())
    }

    /// Remove the whole directory. Succeeds when it is already gone.
    pub fn remove(self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VersioningError::storage(&self.root, e)),
        }
    }

    // Atomic write: temp file in the same directory, then rename.
    fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        let storage = |e: std::io::Error| VersioningError::storage(path, e);
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(storage)?;
        tmp.write_all(content).map_err(storage)?;
        tmp.persist(path).map_err(|e| storage(e.error))?;
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(VersioningError::storage(path, e)),
    }
}

fn remove_optional(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(VersioningError::storage(path, e)),
    }
}
