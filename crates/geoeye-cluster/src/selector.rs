use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ClusterError, Result};
use crate::node::Node;
use crate::registry::NodeRegistry;

/// Round-robin selection over the live members of a registry.
///
/// A node is live when it is active and its heartbeat is younger than the node
/// timeout. The timestamp check is applied on every call, so selection never
/// hands out a node whose heartbeat expired even if the health monitor has not
/// demoted it yet.
#[derive(Clone)]
pub struct NodeSelector {
    registry: Arc<RwLock<NodeRegistry>>,
    node_timeout: Duration,
}

impl NodeSelector {
    pub fn new(registry: Arc<RwLock<NodeRegistry>>, node_timeout: Duration) -> Self {
        Self {
            registry,
            node_timeout,
        }
    }

    /// Live nodes in rotation order.
    ///
    /// # Errors
    /// `InsufficientCapacity` when fewer than `min_healthy` nodes are live.
    pub async fn healthy_nodes(&self, min_healthy: usize) -> Result<Vec<Node>> {
        let nodes = {
            let registry = self.registry.read().await;
            registry.live_nodes(Instant::now(), self.node_timeout)
        };

        if nodes.len() < min_healthy {
            warn!(
                "Healthy node count below minimum: {} < {}",
                nodes.len(),
                min_healthy
            );
            return Err(ClusterError::InsufficientCapacity {
                required: min_healthy,
                available: nodes.len(),
            });
        }
        Ok(nodes)
    }

    /// Picks the next live node and advances the rotation past it.
    ///
    /// Filtering and the cursor update happen under one write lock.
    ///
    /// # Errors
    /// `InsufficientCapacity` when fewer than `min_healthy` (at least one)
    /// nodes are live.
    pub async fn select(&self, min_healthy: usize) -> Result<Node> {
        let required = min_healthy.max(1);
        let now = Instant::now();

        let mut registry = self.registry.write().await;
        let available = registry.live_count(now, self.node_timeout);
        if available < required {
            warn!(
                "Healthy node count below minimum: {} < {}",
                available, required
            );
            return Err(ClusterError::InsufficientCapacity {
                required,
                available,
            });
        }

        let node = registry
            .next_live(now, self.node_timeout)
            .ok_or(ClusterError::InsufficientCapacity {
                required,
                available: 0,
            })?;
        debug!("Rotation picked node {}", node.id);
        Ok(node)
    }
}
