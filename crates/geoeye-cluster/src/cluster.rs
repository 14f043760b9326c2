use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{ClusterError, Result};
use crate::executor::{DistributedExecutor, ExecutorConfig, Outcome};
use crate::health_monitor::{HealthMonitor, HealthMonitorConfig, SweepListener, SweepReport};
use crate::node::{Node, NodeId, NodeInfo};
use crate::operation::NodeOperation;
use crate::registry::NodeRegistry;
use crate::selector::NodeSelector;

/// Cluster configuration.
///
/// All values live for the lifetime of the process; nothing is persisted.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Heartbeat age after which a node stops being served and gets demoted
    ///
    /// Default: 30s
    pub node_timeout: Duration,
    /// Time between two health sweeps
    ///
    /// Default: 10s
    pub health_check_interval: Duration,
    /// Default fan-out of [`ClusterManager::dispatch`]
    ///
    /// Default: 3
    pub max_concurrency: usize,
    /// Upper bound for a single per-node invocation, `None` to disable
    ///
    /// Default: 30s
    pub operation_timeout: Option<Duration>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(10),
            max_concurrency: 3,
            operation_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        self.health_monitor_config().validate()?;
        if self.max_concurrency == 0 {
            return Err(ClusterError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn health_monitor_config(&self) -> HealthMonitorConfig {
        HealthMonitorConfig {
            interval: self.health_check_interval,
            node_timeout: self.node_timeout,
        }
    }

    fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_concurrency: self.max_concurrency,
            operation_timeout: self.operation_timeout,
        }
    }
}

/// Coordinator for a pool of worker nodes.
///
/// The manager owns the node registry and a background health monitor, and
/// exposes membership, selection and fan-out to callers:
///
/// 1. **Membership**: nodes are added and removed explicitly
/// 2. **Health Monitoring**: stale heartbeats demote nodes to inactive
/// 3. **Selection**: round-robin over live nodes
/// 4. **Dispatch**: one operation on several live nodes, failures isolated
///
/// # Consistency
///
/// Every registry operation runs under one `RwLock`. Node status can still lag
/// behind the heartbeat by up to one health check interval: until the next
/// sweep, a node whose heartbeat just expired is reported as active by
/// [`nodes`](Self::nodes). Selection and [`get_healthy_nodes`](Self::get_healthy_nodes)
/// check the heartbeat age themselves and skip such a node.
pub struct ClusterManager {
    registry: Arc<RwLock<NodeRegistry>>,
    selector: NodeSelector,
    executor: DistributedExecutor,
    config: ClusterConfig,
    shutdown_tx: broadcast::Sender<()>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterManager {
    /// Creates a manager with default configuration.
    ///
    /// # Example
    /// ```no_run
    /// # use geoeye_cluster::{ClusterManager, NodeInfo};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let cluster = ClusterManager::new(vec![
    ///     NodeInfo::new("node1.example.com", 8000, 1000),
    ///     NodeInfo::new("node2.example.com", 8001, 1500),
    /// ]).await?;
    ///
    /// let node = cluster.select_node("upload").await?;
    /// println!("uploading to {}", node.addr());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(initial_nodes: Vec<NodeInfo>) -> Result<Self> {
        Self::with_config(initial_nodes, ClusterConfig::default()).await
    }

    /// Creates a manager with custom configuration.
    pub async fn with_config(initial_nodes: Vec<NodeInfo>, config: ClusterConfig) -> Result<Self> {
        Self::with_sweep_listener(initial_nodes, config, None).await
    }

    /// Creates a manager whose health monitor reports every sweep to `listener`.
    ///
    /// # Behavior
    /// - Validates the configuration
    /// - Admits `initial_nodes` in order, all active
    /// - Spawns the background health monitor
    pub async fn with_sweep_listener(
        initial_nodes: Vec<NodeInfo>,
        config: ClusterConfig,
        listener: Option<SweepListener>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(RwLock::new(NodeRegistry::with_nodes(initial_nodes)));
        let selector = NodeSelector::new(registry.clone(), config.node_timeout);
        let executor = DistributedExecutor::new(selector.clone(), config.executor_config());

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut monitor = HealthMonitor::new(registry.clone(), config.health_monitor_config())?;
        if let Some(listener) = listener {
            monitor = monitor.with_listener(listener);
        }
        let monitor_handle = monitor.spawn(shutdown_rx);

        info!("Cluster manager initialized with health monitoring");

        Ok(Self {
            registry,
            selector,
            executor,
            config,
            shutdown_tx,
            monitor_handle: Mutex::new(Some(monitor_handle)),
        })
    }

    /// Registers a node and returns its generated id.
    pub async fn add_node(&self, info: NodeInfo) -> NodeId {
        self.registry.write().await.add(info)
    }

    /// Removes a node. Removing an unknown node is a no-op.
    pub async fn remove_node(&self, node_id: &NodeId) {
        self.registry.write().await.remove(node_id);
    }

    /// Records liveness evidence for a node and re-activates it if needed.
    ///
    /// # Returns
    /// `false` if the node is not registered
    pub async fn heartbeat(&self, node_id: &NodeId) -> bool {
        self.registry.write().await.heartbeat(node_id)
    }

    /// Live nodes in rotation order.
    ///
    /// # Errors
    /// `InsufficientCapacity` if fewer than `min_healthy` nodes are live
    pub async fn get_healthy_nodes(&self, min_healthy: usize) -> Result<Vec<Node>> {
        self.selector.healthy_nodes(min_healthy).await
    }

    /// Picks a node for one request via round-robin.
    ///
    /// `operation_type` is only used for logging.
    pub async fn select_node(&self, operation_type: &str) -> Result<Node> {
        let node = self.selector.select(1).await?;
        info!("Node selected for {}: {}", operation_type, node.id);
        Ok(node)
    }

    /// Runs `operation` on up to the configured number of live nodes.
    pub async fn dispatch<O>(
        &self,
        operation: Arc<O>,
        payload: O::Payload,
    ) -> Result<Vec<Outcome<O::Output>>>
    where
        O: NodeOperation + 'static,
    {
        self.executor.dispatch(operation, payload).await
    }

    /// Runs `operation` on up to `max_concurrency` live nodes.
    pub async fn dispatch_with_concurrency<O>(
        &self,
        operation: Arc<O>,
        payload: O::Payload,
        max_concurrency: usize,
    ) -> Result<Vec<Outcome<O::Output>>>
    where
        O: NodeOperation + 'static,
    {
        self.executor
            .dispatch_with_concurrency(operation, payload, max_concurrency)
            .await
    }

    /// Runs one health sweep immediately, independent of the background task.
    pub async fn run_health_sweep(&self) -> Result<SweepReport> {
        let monitor = HealthMonitor::new(self.registry.clone(), self.config.health_monitor_config())?;
        Ok(monitor.sweep().await)
    }

    /// Snapshot of every node with its recorded status, in rotation order.
    pub async fn nodes(&self) -> Vec<Node> {
        self.registry.read().await.snapshot()
    }

    /// Total number of nodes, including inactive ones.
    pub async fn node_count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Stops the health monitor and waits for it to exit.
    ///
    /// Registry state is left as it was; calling this twice is harmless.
    pub async fn shutdown(&self) {
        // Fails only when the monitor already exited
        let _ = self.shutdown_tx.send(());
        let handle = self.monitor_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Health monitor task ended abnormally: {}", e);
            }
            info!("Cluster manager shut down");
        }
    }
}
