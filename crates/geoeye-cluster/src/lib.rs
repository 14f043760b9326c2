//! GeoEye cluster coordination core
//!
//! Tracks a small pool of storage nodes, demotes nodes whose heartbeat went
//! stale, picks one node per request and fans work out to several nodes at
//! once. State is in-memory only.
//!
//! # Components
//!
//! - [`registry`] - Membership table with a rotation cursor
//! - [`health_monitor`] - Background task demoting stale nodes
//! - [`selector`] - Round-robin selection over live nodes
//! - [`executor`] - Concurrent dispatch with per-node outcomes
//! - [`cluster`] - [`ClusterManager`], the facade tying them together

pub mod cluster;
pub mod error;
pub mod executor;
pub mod health_monitor;
pub mod node;
pub mod operation;
pub mod registry;
pub mod selector;

pub use cluster::{ClusterConfig, ClusterManager};
pub use error::{ClusterError, Result};
pub use executor::{DistributedExecutor, ExecutorConfig, Outcome};
pub use health_monitor::{HealthMonitor, HealthMonitorConfig, SweepListener, SweepReport};
pub use node::{Node, NodeId, NodeInfo, NodeStatus};
pub use operation::{operation_fn, FnOperation, NodeOperation, ProbeReport, TcpProbe};
pub use registry::NodeRegistry;
pub use selector::NodeSelector;
