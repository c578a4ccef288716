//! Supervisor facade
//!
//! Composes the registry, multiplexer, provisioner, log store and idle
//! detector behind one surface. This is the only type exposed across the
//! process boundary; all supervisor state lives inside the instance so
//! multiple supervisors can coexist (and be torn down) independently.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use git_worktree::{WorktreeProvisioner, WorktreeResult};
use pilot_core::{AgentType, RepositoryStore};

use crate::adapter::{self, TmuxSessionInfo};
use crate::config::SupervisorConfig;
use crate::error::Result;
use crate::event::OutputMessage;
use crate::idle::start_idle_detector;
use crate::logs::{LogEntry, LogStore};
use crate::model::{IssueContext, ProcessRunner, RunnerConfig};
use crate::multiplexer::{OutputMultiplexer, Subscription};
use crate::registry::RunnerRegistry;

/// Request to launch an agent against an issue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub repository_id: Uuid,
    pub issue_number: u64,
    pub agent_type: AgentType,
    #[serde(default)]
    pub base_branch: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    #[serde(default)]
    pub issue_title: Option<String>,
}

/// The one surface the host process talks to
pub struct Supervisor {
    registry: Arc<RunnerRegistry>,
    multiplexer: Arc<OutputMultiplexer>,
    provisioner: Arc<WorktreeProvisioner>,
    repositories: Arc<RepositoryStore>,
    logs: Arc<LogStore>,
    idle_task: JoinHandle<()>,
}

impl Supervisor {
    pub async fn new(config: SupervisorConfig) -> Result<Self> {
        let repositories = Arc::new(
            RepositoryStore::new(config.data_dir.join("repositories.json")).await?,
        );
        let logs = Arc::new(LogStore::new(&config.data_dir));
        let multiplexer = Arc::new(OutputMultiplexer::new(config.max_buffer_chunks));
        let registry = Arc::new(RunnerRegistry::new(
            Arc::clone(&multiplexer),
            Arc::clone(&logs),
        ));
        let provisioner = Arc::new(WorktreeProvisioner::with_config(config.worktree.clone()));
        let idle_task = start_idle_detector(
            Arc::clone(&registry),
            config.idle_threshold,
            config.idle_poll_interval,
        );

        info!("Supervisor initialized (data dir {:?})", config.data_dir);

        Ok(Self {
            registry,
            multiplexer,
            provisioner,
            repositories,
            logs,
            idle_task,
        })
    }

    /// Create and track a runner from explicit parameters
    pub async fn create(&self, config: RunnerConfig) -> Result<ProcessRunner> {
        self.registry.create(config).await
    }

    /// Provision (or reuse) the issue worktree, then launch an agent in it
    pub async fn launch_for_issue(&self, request: LaunchRequest) -> Result<ProcessRunner> {
        let repository = self.repositories.get(request.repository_id).await?;
        let base_branch = request
            .base_branch
            .as_deref()
            .unwrap_or(&repository.default_branch);

        let worktree = self
            .provisioner
            .create_worktree_for_issue(&repository.path, request.issue_number, Some(base_branch))
            .await?;

        let config = RunnerConfig {
            agent_type: request.agent_type,
            name: request.name,
            working_directory: worktree.worktree_path,
            command: request.command,
            args: request.args,
            env: request.env,
            issue_context: Some(IssueContext {
                repository_id: request.repository_id,
                issue_number: request.issue_number,
                title: request.issue_title,
            }),
            tmux_session: None,
        };

        self.registry.create(config).await
    }

    pub async fn list(&self) -> Vec<ProcessRunner> {
        self.registry.list().await
    }

    pub async fn get(&self, id: Uuid) -> Result<ProcessRunner> {
        self.registry.get(id).await
    }

    pub async fn start(&self, id: Uuid) -> Result<ProcessRunner> {
        self.registry.start(id).await
    }

    pub async fn stop(&self, id: Uuid) -> Result<()> {
        self.registry.stop(id).await
    }

    pub async fn restart(&self, id: Uuid) -> Result<ProcessRunner> {
        self.registry.restart(id).await
    }

    /// Track a pre-existing tmux session as a runner
    pub async fn attach_tmux(&self, session_name: &str) -> Result<ProcessRunner> {
        let config = RunnerConfig {
            agent_type: AgentType::Custom,
            name: Some(format!("tmux-{}", session_name)),
            working_directory: std::env::current_dir().unwrap_or_else(|_| ".".into()),
            command: None,
            args: vec![],
            env: vec![],
            issue_context: None,
            tmux_session: Some(session_name.to_string()),
        };
        self.registry.create(config).await
    }

    pub async fn list_tmux_sessions(&self) -> Result<Vec<TmuxSessionInfo>> {
        adapter::list_sessions().await
    }

    /// Persisted output for a runner, trailing `limit` entries when given
    pub async fn get_logs(&self, id: Uuid, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        self.registry.get(id).await?;
        self.logs.load(id, limit)
    }

    /// Subscribe to a runner's output: replay history first, live after
    pub async fn subscribe(
        &self,
        id: Uuid,
    ) -> Result<(Subscription, mpsc::UnboundedReceiver<OutputMessage>)> {
        self.registry.get(id).await?;
        Ok(self.multiplexer.subscribe(id).await)
    }

    pub async fn unsubscribe(&self, subscription: &Subscription) {
        self.multiplexer.unsubscribe(subscription).await;
    }

    pub async fn write(&self, id: Uuid, data: &[u8]) -> Result<()> {
        self.registry.adapter(id).await?.write(data).await
    }

    pub async fn resize(&self, id: Uuid, rows: u16, cols: u16) -> Result<()> {
        self.registry.adapter(id).await?.resize(rows, cols).await
    }

    /// Terminate every runner, clear every buffer, drop every subscription
    pub async fn kill_all(&self) {
        self.registry.kill_all().await;
    }

    pub async fn create_worktree_for_issue(
        &self,
        repository_id: Uuid,
        issue_number: u64,
        base_branch: Option<&str>,
    ) -> Result<WorktreeResult> {
        let repository = self.repositories.get(repository_id).await?;
        let base = base_branch.unwrap_or(&repository.default_branch);
        let result = self
            .provisioner
            .create_worktree_for_issue(&repository.path, issue_number, Some(base))
            .await?;
        Ok(result)
    }

    pub async fn remove_worktree(&self, repository_id: Uuid, worktree_path: &Path) -> Result<()> {
        let repository = self.repositories.get(repository_id).await?;
        self.provisioner
            .remove_worktree(&repository.path, worktree_path)
            .await?;
        Ok(())
    }

    /// The repository registry collaborator surface
    pub fn repositories(&self) -> &Arc<RepositoryStore> {
        &self.repositories
    }

    /// Tear the supervisor down: stop idle detection and kill every runner
    pub async fn shutdown(&self) {
        self.idle_task.abort();
        self.registry.kill_all().await;
        info!("Supervisor shut down");
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.idle_task.abort();
    }
}
