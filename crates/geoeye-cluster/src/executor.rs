use futures::FutureExt;
use serde::Serialize;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{panic_message, ClusterError, Result};
use crate::node::{Node, NodeId};
use crate::operation::NodeOperation;
use crate::selector::NodeSelector;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Default number of nodes a dispatch fans out to
    pub max_concurrency: usize,
    /// Upper bound for one invocation. `None` lets invocations run forever.
    pub operation_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            operation_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Result of running an operation on one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome<T> {
    Success { node_id: NodeId, result: T },
    Failed { node_id: NodeId, error: String },
}

impl<T> Outcome<T> {
    pub fn node_id(&self) -> &NodeId {
        match self {
            Outcome::Success { node_id, .. } | Outcome::Failed { node_id, .. } => node_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Runs one operation on several healthy nodes at once.
///
/// Every invocation runs in its own task. A failure, panic or timeout on one
/// node becomes a [`Outcome::Failed`] entry and never affects the others; the
/// dispatch itself only fails when no node is eligible.
#[derive(Clone)]
pub struct DistributedExecutor {
    selector: NodeSelector,
    config: ExecutorConfig,
}

impl DistributedExecutor {
    pub fn new(selector: NodeSelector, config: ExecutorConfig) -> Self {
        Self { selector, config }
    }

    /// Dispatches to the configured default number of nodes.
    pub async fn dispatch<O>(
        &self,
        operation: Arc<O>,
        payload: O::Payload,
    ) -> Result<Vec<Outcome<O::Output>>>
    where
        O: NodeOperation + 'static,
    {
        self.dispatch_with_concurrency(operation, payload, self.config.max_concurrency)
            .await
    }

    /// Runs `operation` on up to `max_concurrency` healthy nodes, taken in
    /// rotation order, and waits for all of them.
    ///
    /// # Returns
    /// One outcome per attempted node, in completion order.
    ///
    /// # Errors
    /// - `InvalidConfig` if `max_concurrency` is zero
    /// - `InsufficientCapacity` if no node is healthy
    pub async fn dispatch_with_concurrency<O>(
        &self,
        operation: Arc<O>,
        payload: O::Payload,
        max_concurrency: usize,
    ) -> Result<Vec<Outcome<O::Output>>>
    where
        O: NodeOperation + 'static,
    {
        if max_concurrency == 0 {
            return Err(ClusterError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        let targets: Vec<Node> = self
            .selector
            .healthy_nodes(1)
            .await
            .map_err(|e| {
                error!("Distributed operation aborted: {}", e);
                e
            })?
            .into_iter()
            .take(max_concurrency)
            .collect();

        info!("Dispatching operation to {} node(s)", targets.len());

        let payload = Arc::new(payload);
        let timeout = self.config.operation_timeout;
        let mut pending: HashSet<NodeId> = HashSet::with_capacity(targets.len());
        let mut join_set = JoinSet::new();

        for node in targets {
            pending.insert(node.id.clone());
            let operation = Arc::clone(&operation);
            let payload = Arc::clone(&payload);
            join_set.spawn(async move {
                let node_id = node.id.clone();
                let result = invoke_guarded(operation, node, payload, timeout).await;
                (node_id, result)
            });
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((node_id, Ok(result))) => {
                    pending.remove(&node_id);
                    outcomes.push(Outcome::Success { node_id, result });
                }
                Ok((node_id, Err(error))) => {
                    warn!("Operation failed on node {}: {}", node_id, error);
                    pending.remove(&node_id);
                    outcomes.push(Outcome::Failed { node_id, error });
                }
                Err(e) => {
                    error!("Dispatch task did not complete: {}", e);
                }
            }
        }

        // Tasks that never reported still get exactly one entry
        for node_id in pending {
            outcomes.push(Outcome::Failed {
                node_id,
                error: "task aborted before reporting".to_string(),
            });
        }

        Ok(outcomes)
    }
}

/// Runs one invocation, turning errors, panics and timeouts into a message.
async fn invoke_guarded<O>(
    operation: Arc<O>,
    node: Node,
    payload: Arc<O::Payload>,
    timeout: Option<Duration>,
) -> std::result::Result<O::Output, String>
where
    O: NodeOperation + 'static,
{
    let call = AssertUnwindSafe(operation.invoke(node, payload)).catch_unwind();

    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(caught) => caught,
            Err(_) => return Err(ClusterError::Timeout(limit.as_millis() as u64).to_string()),
        },
        None => call.await,
    };

    match caught {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(panic) => Err(format!("operation panicked: {}", panic_message(panic.as_ref()))),
    }
}
