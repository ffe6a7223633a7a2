//! Verline-Remote: backing versioned store for Verline
//!
//! This crate is the boundary between Verline and the service that actually
//! stores version lines. It defines the contract the orchestrator relies on
//! and ships the implementations of it.
//!
//! ## Layer 0 - Remote/Persistence
//!
//! Focus: branch-capable repositories, reconciliation of local and remote
//! state, and distinguishable failure modes.
//!
//! ## Key Components
//!
//! - `RepositoryHost` / `WorkingCopySync`: the store contract
//! - `HubClient`: Hugging Face compatible hub (HTTP API + git working copies)
//! - `LocalGitHost`: bare git repositories in a local directory
//! - `fakes::MemoryHost`: in-memory host for tests

mod error;
pub mod fakes;
pub mod git;
pub mod host_traits;
pub mod hub;

pub use error::RemoteError;
pub use git::{GitWorkingCopy, LocalGitHost};
pub use host_traits::{RemoteResult, RepoId, RepositoryHost, WorkingCopySync};
pub use hub::{HubClient, HubConfig, RepoType};
