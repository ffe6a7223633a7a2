//! Verline Core Library
//!
//! Deterministic version lines for parameterized runs: every distinct
//! configuration gets its own line in a branch-capable store, and the
//! primary line carries an index of all of them.
//!
//! ## Layer 1 - Versioning
//!
//! - `domain`: configurations, fingerprints, errors
//! - `working_copy`: files of the checked-out line
//! - `index` / `reporting`: the global index and its markdown documents
//! - `orchestrator`: the `record` / `delete` state machine

pub mod artifact;
pub mod domain;
pub mod index;
pub mod obs;
pub mod orchestrator;
pub mod reporting;
pub mod telemetry;
pub mod working_copy;

pub use artifact::{Artifact, FileArtifact, StateDict, Tensor};
pub use domain::{fingerprint, Configuration, Result, VersionFingerprint, VersioningError};
pub use index::GlobalIndex;
pub use orchestrator::{OrchestratorOptions, RecordOutcome, VersioningOrchestrator};
pub use reporting::{markdown_table, render_index, render_line_report};
pub use telemetry::init_tracing;
pub use working_copy::LocalWorkingCopy;

pub use verline_remote::{RemoteError, RepoId, RepositoryHost};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
