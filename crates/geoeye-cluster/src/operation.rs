use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::ClusterError;
use crate::node::Node;

/// A unit of work the executor runs against one node.
///
/// The executor knows nothing about what an operation does: uploads,
/// replication and probes all plug in through this trait. The payload is
/// shared between every node of a dispatch.
#[async_trait]
pub trait NodeOperation: Send + Sync {
    type Payload: Send + Sync + 'static;
    type Output: Send + 'static;

    async fn invoke(&self, node: Node, payload: Arc<Self::Payload>) -> anyhow::Result<Self::Output>;
}

/// Adapter that turns an async closure into a [`NodeOperation`].
pub struct FnOperation<F, P, T> {
    f: F,
    _marker: PhantomData<fn(P) -> T>,
}

/// Wraps `f` as an operation.
///
/// # Example
/// ```
/// use geoeye_cluster::operation::{operation_fn, NodeOperation};
///
/// let op = operation_fn(|node, payload: std::sync::Arc<Vec<u8>>| async move {
///     Ok::<_, anyhow::Error>(format!("{} bytes to {}", payload.len(), node.addr()))
/// });
/// # fn assert_op<O: NodeOperation>(_: &O) {}
/// # assert_op(&op);
/// ```
pub fn operation_fn<F, Fut, P, T>(f: F) -> FnOperation<F, P, T>
where
    F: Fn(Node, Arc<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    FnOperation {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, P, T> NodeOperation for FnOperation<F, P, T>
where
    F: Fn(Node, Arc<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    type Payload = P;
    type Output = T;

    async fn invoke(&self, node: Node, payload: Arc<P>) -> anyhow::Result<T> {
        (self.f)(node, payload).await
    }
}

/// Result of a successful reachability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub addr: String,
    pub latency_ms: u64,
}

/// Checks that a node accepts TCP connections on its address.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}

#[async_trait]
impl NodeOperation for TcpProbe {
    type Payload = ();
    type Output = ProbeReport;

    async fn invoke(&self, node: Node, _payload: Arc<()>) -> anyhow::Result<ProbeReport> {
        let addr = node.addr();
        let start = Instant::now();

        tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| ClusterError::Timeout(self.connect_timeout.as_millis() as u64))?
            .with_context(|| format!("failed to connect to {}", addr))?;

        Ok(ProbeReport {
            addr,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
