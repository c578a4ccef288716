//! Supervisor configuration

use std::path::PathBuf;
use std::time::Duration;

use git_worktree::ProvisionerConfig;

/// Configuration for a supervisor instance
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory for persisted state (repositories, logs)
    pub data_dir: PathBuf,
    /// Silence duration after which a running runner is reclassified idle
    pub idle_threshold: Duration,
    /// How often the idle detector polls
    pub idle_poll_interval: Duration,
    /// Replay-buffer capacity per runner, in chunks
    pub max_buffer_chunks: usize,
    /// Worktree provisioning settings
    pub worktree: ProvisionerConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".pilot-data"),
            idle_threshold: Duration::from_secs(30),
            idle_poll_interval: Duration::from_secs(2),
            max_buffer_chunks: 1000,
            worktree: ProvisionerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.max_buffer_chunks, 1000);
        assert!(config.idle_threshold > config.idle_poll_interval);
    }
}
