use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{panic_message, ClusterError, Result};
use crate::node::NodeId;
use crate::registry::NodeRegistry;

/// Health monitor configuration.
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Time between two sweeps
    pub interval: Duration,
    /// Heartbeat age after which a node is demoted
    pub node_timeout: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            node_timeout: Duration::from_secs(30),
        }
    }
}

impl HealthMonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(ClusterError::InvalidConfig(
                "health check interval must be greater than zero".to_string(),
            ));
        }
        if self.node_timeout.is_zero() {
            return Err(ClusterError::InvalidConfig(
                "node timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of registered nodes at the time of the sweep
    pub examined: usize,
    /// Nodes flipped to inactive by this sweep
    pub demoted: Vec<NodeId>,
}

/// Callback invoked after every sweep, outside the registry lock.
pub type SweepListener = Arc<dyn Fn(&SweepReport) + Send + Sync>;

/// Background task that demotes nodes whose heartbeat went stale.
///
/// The monitor never removes a node and never re-activates one: recovery comes
/// from [`NodeRegistry::heartbeat`]. A failing sweep is logged and the loop
/// carries on at the next interval; only the shutdown signal ends it.
pub struct HealthMonitor {
    registry: Arc<RwLock<NodeRegistry>>,
    config: HealthMonitorConfig,
    listener: Option<SweepListener>,
}

impl HealthMonitor {
    /// Creates a new health monitor.
    ///
    /// # Arguments
    /// * `registry` - The registry to sweep
    /// * `config` - Sweep interval and node timeout
    pub fn new(registry: Arc<RwLock<NodeRegistry>>, config: HealthMonitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            config,
            listener: None,
        })
    }

    /// Registers a callback run after each sweep.
    pub fn with_listener(mut self, listener: SweepListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Starts the monitor task. It runs until `shutdown` fires or its sender
    /// is dropped.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    /// Main sweep loop
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.config.interval > self.config.node_timeout {
            warn!(
                "Health check interval ({:?}) exceeds node timeout ({:?}); stale nodes may report active for up to one interval",
                self.config.interval, self.config.node_timeout
            );
        }
        info!(
            "Health monitor started (interval {:?}, node timeout {:?})",
            self.config.interval, self.config.node_timeout
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Health monitor shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.guarded_sweep().await {
                        error!("{}; retrying at next interval", e);
                    }
                }
            }
        }
    }

    /// Runs one sweep over every registered node.
    pub async fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let (examined, demoted) = {
            let mut registry = self.registry.write().await;
            let demoted = registry.demote_stale(now, self.config.node_timeout);
            (registry.len(), demoted)
        };

        for id in &demoted {
            warn!("Inactive node detected: {}", id);
        }
        debug!(
            "Health sweep examined {} node(s), demoted {}",
            examined,
            demoted.len()
        );

        let report = SweepReport { examined, demoted };
        if let Some(listener) = &self.listener {
            listener(&report);
        }
        report
    }

    /// Sweep with panics turned into a transient monitor error
    async fn guarded_sweep(&self) -> Result<SweepReport> {
        AssertUnwindSafe(self.sweep())
            .catch_unwind()
            .await
            .map_err(|panic| ClusterError::Monitor(panic_message(panic.as_ref())))
    }
}
