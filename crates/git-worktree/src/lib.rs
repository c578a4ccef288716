//! Git worktree provisioning library
//!
//! This crate provides per-issue git worktree provisioning, giving each
//! issue an isolated working directory on a dedicated branch. Mutating git
//! operations are serialized per repository so concurrent provisioning
//! requests never race on the same index or ref store.

mod commands;
mod error;
mod provisioner;

pub use error::{Result, WorktreeError};
pub use provisioner::{
    ProvisionerConfig, Worktree, WorktreeProvisioner, WorktreeResult,
};
