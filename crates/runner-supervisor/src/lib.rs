//! Runner supervision for agent processes
//!
//! This crate tracks a set of runners (spawned agent processes or attached
//! tmux sessions), classifies their lifecycle state from observed activity,
//! and fans each runner's output stream out to any number of subscribers
//! with a bounded replay history.

pub mod adapter;
mod config;
mod error;
mod event;
mod idle;
mod logs;
mod model;
mod multiplexer;
mod registry;
mod supervisor;

pub use adapter::{AdapterEvent, ProcessAdapter, SpawnedProcess, TmuxAttached, TmuxSessionInfo};
pub use config::SupervisorConfig;
pub use error::{Result, RunnerError};
pub use event::{OutputChunk, OutputMessage, OutputStream, ProcessEvent, ProcessEventType};
pub use idle::start_idle_detector;
pub use logs::{LogEntry, LogStore};
pub use model::{
    IssueContext, ProcessHandle, ProcessKind, ProcessRunner, RunnerConfig, RunnerStatus,
};
pub use multiplexer::{OutputMultiplexer, Subscription};
pub use registry::RunnerRegistry;
pub use supervisor::{LaunchRequest, Supervisor};
