//! Process adapters
//!
//! One capability contract over two variants: a process spawned on a PTY by
//! the supervisor, and a pre-existing tmux session attached by name. Both
//! emit raw byte chunks and accept writes, resizes and kill.

mod spawned;
mod tmux;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::event::OutputStream;
use crate::model::ProcessKind;

pub use spawned::SpawnedProcess;
pub use tmux::{list_sessions, tmux_available, TmuxAttached, TmuxSessionInfo};

/// Events an adapter reports to its event pump
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// The adapter is set up and accepting writes
    Ready,
    /// Raw output bytes, in production order
    Chunk { stream: OutputStream, data: Bytes },
    /// The underlying process ended (or the attached session vanished)
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

/// Capability contract shared by both adapter variants.
///
/// Writes issued before the adapter reports ready are queued, not dropped.
/// Resize after the process has exited is a silent no-op: callers routinely
/// resize a dead terminal during teardown races.
#[async_trait]
pub trait ProcessAdapter: Send + Sync {
    fn kind(&self) -> ProcessKind;

    fn pid(&self) -> Option<u32>;

    /// Send input bytes to the process
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Resize the terminal
    async fn resize(&self, rows: u16, cols: u16) -> Result<()>;

    /// Release the underlying resource. For spawned processes this
    /// terminates the child; for attached sessions it only detaches.
    async fn kill(&self) -> Result<()>;
}
