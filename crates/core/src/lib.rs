//! Core library for Issue Pilot
//!
//! This crate contains the shared domain types, including:
//! - Agent configuration
//! - Repository registry
//! - Common error types

pub mod agent;
pub mod error;
pub mod repository;

pub use agent::AgentType;
pub use error::Error;
pub use repository::{CreateRepositoryRequest, Repository, RepositoryStore};

pub type Result<T> = std::result::Result<T, Error>;
