//! Attached tmux session adapter
//!
//! Binds to a pre-existing tmux session by name. Output is captured through
//! `tmux pipe-pane` into a file that a background task tails; input and
//! resize proxy to `tmux send-keys` / `tmux resize-window`. Killing the
//! adapter only detaches: the session is externally owned and may be an
//! intentionally long-lived agent outside supervisor control.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::{AdapterEvent, ProcessAdapter};
use crate::error::{Result, RunnerError};
use crate::event::OutputStream;
use crate::model::ProcessKind;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How many poll ticks between session liveness checks
const LIVENESS_EVERY_TICKS: u32 = 20;

/// An externally managed tmux session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TmuxSessionInfo {
    pub name: String,
    pub windows: u32,
    pub attached: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Check whether tmux is available on this host
pub async fn tmux_available() -> bool {
    Command::new("tmux")
        .arg("-V")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Run a tmux command, returning stdout or an adapter error
async fn tmux(args: &[&str]) -> Result<String> {
    let output = Command::new("tmux")
        .args(args)
        .output()
        .await
        .map_err(|e| RunnerError::adapter(format!("Failed to execute tmux: {}", e)))?;

    if !output.status.success() {
        return Err(RunnerError::adapter(format!(
            "tmux {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

async fn session_exists(name: &str) -> bool {
    Command::new("tmux")
        .args(["has-session", "-t", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// List sessions on the local tmux server. An unreachable server (no
/// sessions yet) yields an empty list.
pub async fn list_sessions() -> Result<Vec<TmuxSessionInfo>> {
    if !tmux_available().await {
        return Err(RunnerError::TmuxUnavailable);
    }

    let output = Command::new("tmux")
        .args([
            "list-sessions",
            "-F",
            "#{session_name}\t#{session_windows}\t#{session_attached}\t#{session_created}",
        ])
        .output()
        .await
        .map_err(|e| RunnerError::adapter(format!("Failed to execute tmux: {}", e)))?;

    if !output.status.success() {
        return Ok(Vec::new());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().filter_map(parse_session_line).collect())
}

fn parse_session_line(line: &str) -> Option<TmuxSessionInfo> {
    let mut fields = line.split('\t');
    let name = fields.next()?.to_string();
    if name.is_empty() {
        return None;
    }
    let windows = fields.next()?.trim().parse().unwrap_or(1);
    let attached = fields.next().map(|v| v.trim() != "0").unwrap_or(false);
    let created_at = fields
        .next()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Some(TmuxSessionInfo {
        name,
        windows,
        attached,
        created_at,
    })
}

/// Adapter bound to one pre-existing tmux session
pub struct TmuxAttached {
    session_name: String,
    pane_pid: Option<u32>,
    capture_path: PathBuf,
    tail_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    detached: Arc<AtomicBool>,
}

impl TmuxAttached {
    /// Attach to a session by name and start capturing its output
    pub async fn attach(
        session_name: &str,
        events_tx: mpsc::Sender<AdapterEvent>,
    ) -> Result<Self> {
        if !tmux_available().await {
            return Err(RunnerError::TmuxUnavailable);
        }
        if !session_exists(session_name).await {
            return Err(RunnerError::SessionNotFound {
                name: session_name.to_string(),
            });
        }

        let pane_pid = tmux(&["list-panes", "-t", session_name, "-F", "#{pane_pid}"])
            .await?
            .lines()
            .next()
            .and_then(|line| line.trim().parse().ok());

        let capture_path = std::env::temp_dir().join(format!(
            "pilot-tmux-{}-{}.log",
            session_name,
            Uuid::new_v4()
        ));

        // -o captures output only, appended to the file as it is produced.
        tmux(&[
            "pipe-pane",
            "-o",
            "-t",
            session_name,
            &format!("cat >> '{}'", capture_path.display()),
        ])
        .await?;

        info!("Attached to tmux session {}", session_name);

        let detached = Arc::new(AtomicBool::new(false));
        let tail_task = tokio::spawn(tail_capture(
            session_name.to_string(),
            capture_path.clone(),
            events_tx.clone(),
            Arc::clone(&detached),
        ));

        if events_tx.try_send(AdapterEvent::Ready).is_err() {
            warn!("Event channel full while reporting ready");
        }

        Ok(Self {
            session_name: session_name.to_string(),
            pane_pid,
            capture_path,
            tail_task: Mutex::new(Some(tail_task)),
            detached,
        })
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

/// Tail the pipe-pane capture file, forwarding appended bytes as chunks and
/// watching session liveness.
async fn tail_capture(
    session_name: String,
    capture_path: PathBuf,
    events_tx: mpsc::Sender<AdapterEvent>,
    detached: Arc<AtomicBool>,
) {
    let mut offset: u64 = 0;
    let mut ticks: u32 = 0;
    let mut interval = tokio::time::interval(POLL_INTERVAL);

    loop {
        interval.tick().await;
        if detached.load(Ordering::SeqCst) {
            break;
        }

        let len = match tokio::fs::metadata(&capture_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        if len > offset {
            match read_from(&capture_path, offset).await {
                Ok(data) if !data.is_empty() => {
                    offset += data.len() as u64;
                    let event = AdapterEvent::Chunk {
                        stream: OutputStream::Stdout,
                        data: Bytes::from(data),
                    };
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to read tmux capture file: {}", e);
                }
            }
        }

        ticks += 1;
        if ticks % LIVENESS_EVERY_TICKS == 0 && !session_exists(&session_name).await {
            debug!("tmux session {} is gone", session_name);
            let _ = events_tx
                .send(AdapterEvent::Exited {
                    code: None,
                    signal: None,
                })
                .await;
            break;
        }
    }
}

async fn read_from(path: &PathBuf, offset: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).await?;
    Ok(data)
}

#[async_trait]
impl ProcessAdapter for TmuxAttached {
    fn kind(&self) -> ProcessKind {
        ProcessKind::Attached
    }

    fn pid(&self) -> Option<u32> {
        self.pane_pid
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        if self.is_detached() {
            debug!("Dropping write to detached session");
            return Ok(());
        }
        let text = String::from_utf8_lossy(data);
        tmux(&["send-keys", "-t", &self.session_name, "-l", &text]).await?;
        Ok(())
    }

    async fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        if self.is_detached() || !session_exists(&self.session_name).await {
            return Ok(());
        }
        let cols = cols.to_string();
        let rows = rows.to_string();
        if let Err(e) = tmux(&[
            "resize-window",
            "-t",
            &self.session_name,
            "-x",
            &cols,
            "-y",
            &rows,
        ])
        .await
        {
            // Window resize is best-effort; detach races and older tmux
            // versions both surface here.
            warn!("Failed to resize tmux session {}: {}", self.session_name, e);
        }
        Ok(())
    }

    /// Detach from the session without terminating it
    async fn kill(&self) -> Result<()> {
        if self.detached.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // pipe-pane with no command disables the capture.
        if session_exists(&self.session_name).await {
            if let Err(e) = tmux(&["pipe-pane", "-t", &self.session_name]).await {
                warn!("Failed to disable pipe-pane: {}", e);
            }
        }

        if let Some(task) = self.tail_task.lock().await.take() {
            task.abort();
        }
        if let Err(e) = tokio::fs::remove_file(&self.capture_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove capture file: {}", e);
            }
        }

        info!("Detached from tmux session {}", self.session_name);
        Ok(())
    }
}
