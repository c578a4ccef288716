//! Idle detection
//!
//! Derives running/idle classification from time since last output rather
//! than explicit start/stop calls. A background task periodically asks the
//! registry to reclassify; the registry itself flips idle runners back to
//! running inline when output arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::registry::RunnerRegistry;

/// Start the idle-detection loop.
///
/// Every `poll_interval`, running runners whose last activity is older than
/// `threshold` are reclassified as idle. The task runs until aborted.
pub fn start_idle_detector(
    registry: Arc<RunnerRegistry>,
    threshold: Duration,
    poll_interval: Duration,
) -> JoinHandle<()> {
    debug!(
        "Idle detector polling every {:?} with threshold {:?}",
        poll_interval, threshold
    );
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            registry.mark_idle_runners(threshold).await;
        }
    })
}
