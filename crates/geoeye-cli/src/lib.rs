// Copyright 2026 GeoEye Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # GeoEye CLI
//!
//! Command-line driver for the GeoEye cluster coordination core.
//!
//! Nodes are given on the command line as `host:port` and registered with a
//! [`geoeye_cluster::ClusterManager`]. The binary then either probes them,
//! shows how requests would be spread over them, or watches their health.
//!
//! ## Key Commands
//!
//! - `geoeye probe`: TCP reachability probe against every node, JSON outcomes
//! - `geoeye select`: round-robin selections as JSON lines
//! - `geoeye watch`: periodic probing with heartbeat refresh until Ctrl-C

use anyhow::{anyhow, bail, Context, Result};
use geoeye_cluster::{ClusterManager, NodeInfo, NodeOperation, TcpProbe};
use std::sync::Arc;

/// Parses a `host:port` node address.
///
/// The last `:` separates the port. IPv6 hosts must be bracketed, as in
/// `[::1]:9001`, and keep their brackets in the host part.
///
/// # Errors
///
/// Returns an error if the separator is missing, the host is empty or looks
/// like a URL or an unbracketed IPv6 address, or the port is not a valid `u16`.
pub fn parse_node_addr(addr: &str) -> Result<NodeInfo> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("Invalid node address '{}': expected host:port", addr))?;

    if host.is_empty() {
        bail!("Invalid node address '{}': host is empty", addr);
    }
    if host.contains('/') {
        bail!("Invalid node address '{}': expected host:port without a scheme or path", addr);
    }
    let bracketed = host.starts_with('[') && host.ends_with(']');
    if host.contains(':') && !bracketed {
        bail!("Invalid node address '{}': IPv6 hosts must be written as [addr]:port", addr);
    }

    let port: u16 = port
        .parse()
        .with_context(|| format!("Invalid node address '{}': bad port", addr))?;

    Ok(NodeInfo::new(host, port, 0))
}

/// Parses every address, failing on the first invalid one.
pub fn parse_node_addrs(addrs: &[String]) -> Result<Vec<NodeInfo>> {
    if addrs.is_empty() {
        bail!("At least one node is required (use -n host:port)");
    }
    addrs.iter().map(|addr| parse_node_addr(addr)).collect()
}

/// Probes every registered node concurrently and heartbeats the reachable ones.
///
/// Returns the number of nodes that answered.
pub async fn refresh_heartbeats(cluster: &ClusterManager, probe: &TcpProbe) -> usize {
    let checks = cluster.nodes().await.into_iter().map(|node| async move {
        let id = node.id.clone();
        (id, probe.invoke(node, Arc::new(())).await)
    });

    let mut reachable = 0;
    for (id, result) in futures::future::join_all(checks).await {
        match result {
            Ok(report) => {
                tracing::debug!("Node {} reachable at {} ({}ms)", id, report.addr, report.latency_ms);
                if cluster.heartbeat(&id).await {
                    reachable += 1;
                }
            }
            Err(e) => tracing::warn!("Probe of node {} failed: {:#}", id, e),
        }
    }
    reachable
}
