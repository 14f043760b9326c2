use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Unique node identifier, generated by the registry on admission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Liveness status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Heartbeat was fresh at the last sweep
    Active,
    /// Demoted by the health monitor after the heartbeat went stale
    Inactive,
}

/// Caller-supplied description of a worker, used when admitting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub host: String,
    pub port: u16,
    /// Storage capacity reported by the worker. Opaque to the coordinator.
    pub capacity: u64,
}

impl NodeInfo {
    pub fn new(host: impl Into<String>, port: u16, capacity: u64) -> Self {
        Self {
            host: host.into(),
            port,
            capacity,
        }
    }
}

/// A registered worker with its liveness state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
    pub capacity: u64,
    pub status: NodeStatus,
    #[serde(skip)]
    pub last_heartbeat: Instant,
}

impl Node {
    /// Creates an active node whose heartbeat is `now`.
    pub fn new(id: NodeId, info: NodeInfo) -> Self {
        Self {
            id,
            host: info.host,
            port: info.port,
            capacity: info.capacity,
            status: NodeStatus::Active,
            last_heartbeat: Instant::now(),
        }
    }

    /// `host:port` form of the node address
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Time since the last heartbeat, as seen at `now`.
    pub fn heartbeat_age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heartbeat)
    }

    /// Whether the node may serve requests: active and heard from within `timeout`.
    pub fn is_live(&self, now: Instant, timeout: Duration) -> bool {
        self.status == NodeStatus::Active && self.heartbeat_age(now) < timeout
    }

    /// Whether the health monitor should demote the node at `now`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.heartbeat_age(now) > timeout
    }
}
