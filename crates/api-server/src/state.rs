//! Application state

use std::sync::Arc;

use runner_supervisor::{Supervisor, SupervisorConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    supervisor: Arc<Supervisor>,
}

impl AppState {
    /// Create a new AppState with the given supervisor configuration
    pub async fn new(config: SupervisorConfig) -> runner_supervisor::Result<Self> {
        let supervisor = Supervisor::new(config).await?;
        Ok(Self {
            supervisor: Arc::new(supervisor),
        })
    }

    /// Get the supervisor facade
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }
}
