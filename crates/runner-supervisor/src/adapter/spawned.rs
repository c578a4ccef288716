//! Spawned process adapter
//!
//! Runs the agent as a child process on a PTY so interactive agents behave
//! as they would in a real terminal and resize requests take effect. The
//! PTY merges the child's stdout and stderr into one stream.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use portable_pty::{
    native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize, PtySystem, SlavePty,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::adapter::{AdapterEvent, ProcessAdapter};
use crate::error::{Result, RunnerError};
use crate::event::OutputStream;
use crate::model::{ProcessKind, RunnerConfig};

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;
const READ_BUFFER_SIZE: usize = 8192;

/// A child process running on a PTY owned by this adapter
pub struct SpawnedProcess {
    pid: Option<u32>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    writer_tx: mpsc::UnboundedSender<Vec<u8>>,
    exited: Arc<AtomicBool>,
}

impl SpawnedProcess {
    /// Spawn the configured command and start pumping its output.
    ///
    /// Emits `Ready` once writes are accepted, then `Chunk` events as bytes
    /// arrive, and a final `Exited` when the child ends.
    pub fn spawn(config: &RunnerConfig, events_tx: mpsc::Sender<AdapterEvent>) -> Result<Self> {
        let (command, args) = config.resolved_command()?;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: DEFAULT_ROWS,
                cols: DEFAULT_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| RunnerError::spawn_failed(format!("Failed to open pty: {}", e)))?;

        let mut builder = CommandBuilder::new(&command);
        builder.args(&args);
        builder.cwd(config.working_directory.clone());
        if std::env::var("TERM").is_err() {
            builder.env("TERM", "xterm-256color");
        }
        for (key, value) in &config.env {
            builder.env(key, value);
        }

        debug!("Spawning {} {:?} in {:?}", command, args, config.working_directory);

        let mut child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| RunnerError::from_spawn_error(&command, e))?;
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();
        let exited = Arc::new(AtomicBool::new(false));

        // Reader: the single OS-level consumer of this process's output.
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| RunnerError::spawn_failed(format!("Failed to clone pty reader: {}", e)))?;
        let chunk_tx = events_tx.clone();
        tokio::task::spawn_blocking(move || {
            let mut buffer = [0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let event = AdapterEvent::Chunk {
                            stream: OutputStream::Stdout,
                            data: Bytes::copy_from_slice(&buffer[..n]),
                        };
                        if chunk_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Writer: input is queued through a channel, so writes issued before
        // the adapter is ready are delivered once it is.
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| RunnerError::spawn_failed(format!("Failed to take pty writer: {}", e)))?;
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::task::spawn_blocking(move || {
            while let Some(data) = writer_rx.blocking_recv() {
                if writer.write_all(&data).is_err() {
                    break;
                }
                let _ = writer.flush();
            }
        });

        // Exit watcher: child.wait() blocks, so it gets a plain thread.
        let exit_tx = events_tx.clone();
        let exited_flag = Arc::clone(&exited);
        std::thread::spawn(move || {
            let code = match child.wait() {
                Ok(status) => {
                    if status.success() {
                        Some(0)
                    } else {
                        Some(status.exit_code() as i32)
                    }
                }
                Err(_) => None,
            };
            exited_flag.store(true, Ordering::SeqCst);
            let _ = exit_tx.blocking_send(AdapterEvent::Exited { code, signal: None });
        });

        if events_tx.try_send(AdapterEvent::Ready).is_err() {
            warn!("Event channel full while reporting ready");
        }

        Ok(Self {
            pid,
            master: Mutex::new(pair.master),
            killer: Mutex::new(killer),
            writer_tx,
            exited,
        })
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessAdapter for SpawnedProcess {
    fn kind(&self) -> ProcessKind {
        ProcessKind::Spawned
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        if self.has_exited() {
            debug!("Dropping write to exited process");
            return Ok(());
        }
        self.writer_tx
            .send(data.to_vec())
            .map_err(|_| RunnerError::adapter("Process input channel closed"))
    }

    async fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        if self.has_exited() {
            return Ok(());
        }
        let master = self.master.lock().await;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| RunnerError::adapter(format!("Failed to resize pty: {}", e)))
    }

    async fn kill(&self) -> Result<()> {
        if self.has_exited() {
            return Ok(());
        }
        let mut killer = self.killer.lock().await;
        match killer.kill() {
            Ok(()) => Ok(()),
            // The child may beat us to the exit.
            Err(_) if self.has_exited() => Ok(()),
            Err(e) => Err(RunnerError::Io(e)),
        }
    }
}
