//! Runner registry - owns the set of live runners and drives their
//! lifecycle transitions
//!
//! The registry is the sole mutator of `ProcessRunner` state. Every runner
//! gets exactly one event pump consuming its adapter's events; the pump is
//! the single OS-level reader feeding the multiplexer and the log store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::{AdapterEvent, ProcessAdapter, SpawnedProcess, TmuxAttached};
use crate::error::{Result, RunnerError};
use crate::event::{OutputChunk, OutputStream, ProcessEvent};
use crate::logs::{LogEntry, LogStore};
use crate::model::{ProcessHandle, ProcessRunner, RunnerConfig, RunnerStatus};
use crate::multiplexer::OutputMultiplexer;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct RunnerEntry {
    runner: ProcessRunner,
    adapter: Arc<dyn ProcessAdapter>,
    pump: tokio::task::JoinHandle<()>,
    /// Set by an explicit stop so the subsequent adapter exit is not
    /// misread as an error
    stopping: bool,
}

/// Owns all live runners, assigns identity, mediates transitions
pub struct RunnerRegistry {
    runners: RwLock<HashMap<Uuid, RunnerEntry>>,
    multiplexer: Arc<OutputMultiplexer>,
    logs: Arc<LogStore>,
}

impl RunnerRegistry {
    pub fn new(multiplexer: Arc<OutputMultiplexer>, logs: Arc<LogStore>) -> Self {
        Self {
            runners: RwLock::new(HashMap::new()),
            multiplexer,
            logs,
        }
    }

    /// Create and track a new runner. Returns as soon as the adapter is
    /// constructed; status updates arrive through adapter events.
    pub async fn create(self: &Arc<Self>, config: RunnerConfig) -> Result<ProcessRunner> {
        self.launch(Uuid::new_v4(), config).await
    }

    /// Construct the adapter for `config` and (re)install the runner entry
    /// under `id`. The adapter is built before the map is touched, so a
    /// spawn failure leaves any existing entry intact.
    async fn launch(self: &Arc<Self>, id: Uuid, config: RunnerConfig) -> Result<ProcessRunner> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let adapter: Arc<dyn ProcessAdapter> = match &config.tmux_session {
            Some(session) => Arc::new(TmuxAttached::attach(session, events_tx).await?),
            None => Arc::new(SpawnedProcess::spawn(&config, events_tx)?),
        };

        let handle = ProcessHandle::new(adapter.kind(), adapter.pid());
        let name = config.name.clone().unwrap_or_else(|| default_name(&config, id));
        let now = Utc::now();
        let runner = ProcessRunner {
            id,
            name,
            agent_type: config.agent_type,
            handle,
            status: RunnerStatus::Starting,
            config,
            created_at: now,
            last_activity_at: now,
        };

        let pump = tokio::spawn(Self::pump_events(Arc::clone(self), id, events_rx));

        let mut runners = self.runners.write().await;
        if let Some(old) = runners.insert(
            id,
            RunnerEntry {
                runner: runner.clone(),
                adapter,
                pump,
                stopping: false,
            },
        ) {
            // Replaced on start/restart: the previous adapter must not
            // outlive its entry.
            old.pump.abort();
            let old_adapter = old.adapter;
            tokio::spawn(async move {
                let _ = old_adapter.kill().await;
            });
        }

        info!("Runner {} ({}) created", runner.name, id);
        Ok(runner)
    }

    /// The single consumer of one adapter's event stream.
    ///
    /// The exit notification races the reader thread's final chunks, so the
    /// exit transition is applied only once the channel has drained.
    async fn pump_events(
        registry: Arc<Self>,
        id: Uuid,
        mut events_rx: mpsc::Receiver<AdapterEvent>,
    ) {
        let mut exit: Option<(Option<i32>, Option<i32>)> = None;
        while let Some(event) = events_rx.recv().await {
            match event {
                AdapterEvent::Ready => registry.on_ready(id).await,
                AdapterEvent::Chunk { stream, data } => {
                    registry.on_chunk(id, stream, data).await
                }
                AdapterEvent::Exited { code, signal } => {
                    exit = Some((code, signal));
                }
            }
        }
        if let Some((code, signal)) = exit {
            registry.on_exit(id, code, signal).await;
        }
        debug!("Event pump for runner {} ended", id);
    }

    async fn on_ready(&self, id: Uuid) {
        let transitioned = {
            let mut runners = self.runners.write().await;
            match runners.get_mut(&id) {
                Some(entry) if entry.runner.status == RunnerStatus::Starting => {
                    entry.runner.status = RunnerStatus::Running;
                    true
                }
                _ => false,
            }
        };
        if transitioned {
            self.multiplexer.publish_event(ProcessEvent::started(id)).await;
        }
    }

    async fn on_chunk(&self, id: Uuid, stream: OutputStream, data: Bytes) {
        let chunk = OutputChunk::new(id, stream, String::from_utf8_lossy(&data).to_string());

        let mut started = false;
        let mut woke_up = false;
        {
            let mut runners = self.runners.write().await;
            let Some(entry) = runners.get_mut(&id) else {
                return;
            };
            entry.runner.last_activity_at = chunk.timestamp;
            match entry.runner.status {
                RunnerStatus::Starting => {
                    entry.runner.status = RunnerStatus::Running;
                    started = true;
                }
                RunnerStatus::Idle => {
                    entry.runner.status = RunnerStatus::Running;
                    woke_up = true;
                }
                _ => {}
            }
        }

        if started {
            self.multiplexer.publish_event(ProcessEvent::started(id)).await;
        }
        if woke_up {
            self.multiplexer.publish_event(ProcessEvent::active(id)).await;
        }

        if let Err(e) = self.logs.append(&LogEntry {
            process_id: id,
            timestamp: chunk.timestamp,
            stream: chunk.stream,
            message: chunk.data.clone(),
        }) {
            warn!("Failed to persist log entry for {}: {}", id, e);
        }

        self.multiplexer.publish_chunk(chunk).await;
    }

    async fn on_exit(&self, id: Uuid, code: Option<i32>, signal: Option<i32>) {
        let event = {
            let mut runners = self.runners.write().await;
            let Some(entry) = runners.get_mut(&id) else {
                return;
            };

            if entry.stopping || entry.runner.status.is_terminal() {
                // The stop path already set the status and published its
                // event.
                entry.runner.status = RunnerStatus::Stopped;
                None
            } else if code == Some(0) {
                entry.runner.status = RunnerStatus::Stopped;
                Some(ProcessEvent::stopped(id))
            } else {
                entry.runner.status = RunnerStatus::Errored;
                let message = match (code, signal) {
                    (Some(code), _) => format!("Process exited with code {}", code),
                    (None, Some(signal)) => format!("Process killed by signal {}", signal),
                    (None, None) => "Process exited abnormally".to_string(),
                };
                Some(ProcessEvent::error(id, message))
            }
        };

        if let Some(event) = event {
            info!("Runner {} exited: {:?}", id, event.event);
            self.multiplexer.publish_event(event).await;
        }
    }

    /// All tracked runners, oldest first
    pub async fn list(&self) -> Vec<ProcessRunner> {
        let runners = self.runners.read().await;
        let mut list: Vec<_> = runners.values().map(|entry| entry.runner.clone()).collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    pub async fn get(&self, id: Uuid) -> Result<ProcessRunner> {
        let runners = self.runners.read().await;
        runners
            .get(&id)
            .map(|entry| entry.runner.clone())
            .ok_or(RunnerError::RunnerNotFound { id })
    }

    /// The adapter backing a runner, for write/resize passthrough
    pub async fn adapter(&self, id: Uuid) -> Result<Arc<dyn ProcessAdapter>> {
        let runners = self.runners.read().await;
        runners
            .get(&id)
            .map(|entry| Arc::clone(&entry.adapter))
            .ok_or(RunnerError::RunnerNotFound { id })
    }

    /// Stop a runner. Terminal until started or restarted.
    pub async fn stop(&self, id: Uuid) -> Result<()> {
        let adapter = {
            let mut runners = self.runners.write().await;
            let entry = runners
                .get_mut(&id)
                .ok_or(RunnerError::RunnerNotFound { id })?;
            if entry.runner.status == RunnerStatus::Stopped {
                return Ok(());
            }
            entry.stopping = true;
            entry.runner.status = RunnerStatus::Stopped;
            Arc::clone(&entry.adapter)
        };

        if let Err(e) = adapter.kill().await {
            warn!("Failed to kill adapter for {}: {}", id, e);
        }

        info!("Runner {} stopped", id);
        self.multiplexer.publish_event(ProcessEvent::stopped(id)).await;
        Ok(())
    }

    /// Start a stopped runner again with its original config, keeping its id
    pub async fn start(self: &Arc<Self>, id: Uuid) -> Result<ProcessRunner> {
        let config = {
            let runners = self.runners.read().await;
            let entry = runners.get(&id).ok_or(RunnerError::RunnerNotFound { id })?;
            if entry.runner.status != RunnerStatus::Stopped {
                return Err(RunnerError::AlreadyRunning { id });
            }
            entry.runner.config.clone()
        };

        self.launch(id, config).await
    }

    /// Stop (if needed) and relaunch a runner, keeping its id. Unlike
    /// `start`, this is valid from any state including `errored`.
    pub async fn restart(self: &Arc<Self>, id: Uuid) -> Result<ProcessRunner> {
        let (config, active) = {
            let runners = self.runners.read().await;
            let entry = runners.get(&id).ok_or(RunnerError::RunnerNotFound { id })?;
            (entry.runner.config.clone(), entry.runner.status.is_active())
        };

        if active {
            self.stop(id).await?;
        }

        self.launch(id, config).await
    }

    /// Reclassify running runners that have been silent past `threshold`
    pub async fn mark_idle_runners(&self, threshold: Duration) {
        let now = Utc::now();
        let threshold_ms = threshold.as_millis() as i64;

        let idled: Vec<Uuid> = {
            let mut runners = self.runners.write().await;
            runners
                .values_mut()
                .filter(|entry| {
                    entry.runner.status == RunnerStatus::Running
                        && now
                            .signed_duration_since(entry.runner.last_activity_at)
                            .num_milliseconds()
                            >= threshold_ms
                })
                .map(|entry| {
                    entry.runner.status = RunnerStatus::Idle;
                    entry.runner.id
                })
                .collect()
        };

        for id in idled {
            debug!("Runner {} is idle", id);
            self.multiplexer.publish_event(ProcessEvent::idle(id)).await;
        }
    }

    /// Terminate every tracked adapter, clear every buffer and
    /// force-unsubscribe every subscription. A subscribe racing this call
    /// either fails on the registry lookup or observes a closed stream.
    pub async fn kill_all(&self) {
        let entries: Vec<RunnerEntry> = {
            let mut runners = self.runners.write().await;
            runners.drain().map(|(_, entry)| entry).collect()
        };

        info!("Killing all {} tracked runners", entries.len());

        for entry in &entries {
            entry.pump.abort();
        }
        for entry in entries {
            if let Err(e) = entry.adapter.kill().await {
                warn!("Failed to kill adapter for {}: {}", entry.runner.id, e);
            }
            if let Err(e) = self.logs.clear(entry.runner.id) {
                warn!("Failed to clear log for {}: {}", entry.runner.id, e);
            }
        }

        self.multiplexer.clear_all().await;
    }
}

fn default_name(config: &RunnerConfig, id: Uuid) -> String {
    if let Some(session) = &config.tmux_session {
        return format!("tmux-{}", session);
    }
    if let Some(context) = &config.issue_context {
        return format!("{}-issue-{}", config.agent_type.as_str(), context.issue_number);
    }
    let short_id = id.simple().to_string();
    format!("{}-{}", config.agent_type.as_str(), &short_id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use pilot_core::AgentType;
    use tempfile::TempDir;

    fn shell_config(script: &str) -> RunnerConfig {
        RunnerConfig {
            agent_type: AgentType::Custom,
            name: None,
            working_directory: PathBuf::from("."),
            command: Some("bash".to_string()),
            args: vec!["-c".to_string(), script.to_string()],
            env: vec![],
            issue_context: None,
            tmux_session: None,
        }
    }

    fn build_registry(dir: &TempDir) -> Arc<RunnerRegistry> {
        let multiplexer = Arc::new(OutputMultiplexer::new(100));
        let logs = Arc::new(LogStore::new(dir.path()));
        Arc::new(RunnerRegistry::new(multiplexer, logs))
    }

    async fn wait_for_status(
        registry: &Arc<RunnerRegistry>,
        id: Uuid,
        status: RunnerStatus,
    ) -> ProcessRunner {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let runner = registry.get(id).await.unwrap();
            if runner.status == status {
                return runner;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "runner {} never reached {:?}, stuck at {:?}",
                    id, status, runner.status
                );
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    #[tokio::test]
    async fn test_create_runs_and_stops_cleanly() {
        let dir = TempDir::new().unwrap();
        let registry = build_registry(&dir);

        let runner = registry.create(shell_config("echo hi")).await.unwrap();
        assert_eq!(runner.agent_type, AgentType::Custom);

        let stopped = wait_for_status(&registry, runner.id, RunnerStatus::Stopped).await;
        assert_eq!(stopped.id, runner.id);
    }

    #[tokio::test]
    async fn test_nonzero_exit_becomes_errored() {
        let dir = TempDir::new().unwrap();
        let registry = build_registry(&dir);

        let runner = registry.create(shell_config("exit 3")).await.unwrap();
        wait_for_status(&registry, runner.id, RunnerStatus::Errored).await;
    }

    #[tokio::test]
    async fn test_get_and_stop_unknown_runner() {
        let dir = TempDir::new().unwrap();
        let registry = build_registry(&dir);
        let unknown = Uuid::new_v4();

        assert!(matches!(
            registry.get(unknown).await,
            Err(RunnerError::RunnerNotFound { .. })
        ));
        assert!(matches!(
            registry.stop(unknown).await,
            Err(RunnerError::RunnerNotFound { .. })
        ));
        // Registry state unchanged.
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_stop_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let registry = build_registry(&dir);

        let runner = registry.create(shell_config("sleep 30")).await.unwrap();
        wait_for_status(&registry, runner.id, RunnerStatus::Running).await;

        registry.stop(runner.id).await.unwrap();
        let stopped = registry.get(runner.id).await.unwrap();
        assert_eq!(stopped.status, RunnerStatus::Stopped);

        // The adapter exit that follows the kill must not flip it to errored.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let still = registry.get(runner.id).await.unwrap();
        assert_eq!(still.status, RunnerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_start_only_valid_from_stopped() {
        let dir = TempDir::new().unwrap();
        let registry = build_registry(&dir);

        let runner = registry.create(shell_config("sleep 30")).await.unwrap();
        wait_for_status(&registry, runner.id, RunnerStatus::Running).await;

        assert!(matches!(
            registry.start(runner.id).await,
            Err(RunnerError::AlreadyRunning { .. })
        ));

        registry.stop(runner.id).await.unwrap();
        let restarted = registry.start(runner.id).await.unwrap();
        assert_eq!(restarted.id, runner.id);
        wait_for_status(&registry, runner.id, RunnerStatus::Running).await;

        registry.stop(runner.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_recovers_errored_runner() {
        let dir = TempDir::new().unwrap();
        let registry = build_registry(&dir);

        let runner = registry.create(shell_config("exit 7")).await.unwrap();
        wait_for_status(&registry, runner.id, RunnerStatus::Errored).await;

        let restarted = registry.restart(runner.id).await.unwrap();
        assert_eq!(restarted.id, runner.id);
        // The same script errors again, via a fresh adapter.
        wait_for_status(&registry, runner.id, RunnerStatus::Errored).await;
    }

    #[tokio::test]
    async fn test_idle_and_reactivation() {
        let dir = TempDir::new().unwrap();
        let registry = build_registry(&dir);

        let runner = registry.create(shell_config("cat")).await.unwrap();
        wait_for_status(&registry, runner.id, RunnerStatus::Running).await;

        // Silent past the threshold: reclassified without any explicit call.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            registry.mark_idle_runners(Duration::from_millis(200)).await;
            if registry.get(runner.id).await.unwrap().status == RunnerStatus::Idle {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "never went idle");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Any new output flips it straight back to running.
        let adapter = registry.adapter(runner.id).await.unwrap();
        adapter.write(b"ping\n").await.unwrap();
        wait_for_status(&registry, runner.id, RunnerStatus::Running).await;

        registry.stop(runner.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_output_reaches_log_store() {
        let dir = TempDir::new().unwrap();
        let multiplexer = Arc::new(OutputMultiplexer::new(100));
        let logs = Arc::new(LogStore::new(dir.path()));
        let registry = Arc::new(RunnerRegistry::new(multiplexer, Arc::clone(&logs)));

        let runner = registry.create(shell_config("echo hi")).await.unwrap();
        wait_for_status(&registry, runner.id, RunnerStatus::Stopped).await;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let entries = logs.load(runner.id, None).unwrap();
            if entries.iter().any(|entry| entry.message.contains("hi")) {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "log never captured output"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    #[tokio::test]
    async fn test_kill_all_clears_everything() {
        let dir = TempDir::new().unwrap();
        let multiplexer = Arc::new(OutputMultiplexer::new(100));
        let logs = Arc::new(LogStore::new(dir.path()));
        let registry = Arc::new(RunnerRegistry::new(Arc::clone(&multiplexer), logs));

        let a = registry.create(shell_config("sleep 30")).await.unwrap();
        let _b = registry.create(shell_config("sleep 30")).await.unwrap();
        let (_sub, mut rx) = multiplexer.subscribe(a.id).await;

        registry.kill_all().await;

        assert!(registry.list().await.is_empty());
        assert!(multiplexer.buffered_chunks(a.id).await.is_empty());
        // Force-unsubscribed: the channel drains to end-of-stream.
        loop {
            match rx.recv().await {
                Some(_) => continue,
                None => break,
            }
        }
    }

    #[test]
    fn test_default_name_shapes() {
        let config = shell_config("true");
        let id = Uuid::new_v4();
        let name = default_name(&config, id);
        assert!(name.starts_with("custom-"));

        let mut tmux = shell_config("true");
        tmux.tmux_session = Some("agents".to_string());
        assert_eq!(default_name(&tmux, id), "tmux-agents");
    }
}
