use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::node::{Node, NodeId, NodeInfo, NodeStatus};

/// Membership table for the cluster.
///
/// Nodes are indexed by id. Each member also gets a slot number on admission;
/// slots only grow, so the slot map keeps a stable member order and removal
/// never shifts other members. The rotation cursor is a slot number: the
/// member at or after it is the one selection considers first.
///
/// The rotation covers every member, including inactive ones: an inactive node
/// keeps its slot and is skipped until it is live again.
///
/// The registry itself is not synchronized. Share it as
/// `Arc<RwLock<NodeRegistry>>` so every operation runs under one lock.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<NodeId, Node>,
    slots: HashMap<NodeId, u64>,
    order: BTreeMap<u64, NodeId>,
    next_slot: u64,
    cursor: u64,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry and admit each of `infos` in order
    pub fn with_nodes(infos: impl IntoIterator<Item = NodeInfo>) -> Self {
        let mut registry = Self::new();
        for info in infos {
            registry.add(info);
        }
        registry
    }

    /// Admit a node. It starts active, with a heartbeat of now, in the last
    /// slot of the member order.
    pub fn add(&mut self, info: NodeInfo) -> NodeId {
        let mut id = NodeId::new();
        while self.nodes.contains_key(&id) {
            id = NodeId::new();
        }

        let node = Node::new(id.clone(), info);
        info!("Node added to cluster: {} ({})", id, node.addr());
        self.nodes.insert(id.clone(), node);

        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(id.clone(), slot);
        self.order.insert(slot, id.clone());

        id
    }

    /// Remove a node. Unknown ids are ignored.
    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        if let Some(slot) = self.slots.remove(id) {
            self.order.remove(&slot);
        }

        warn!("Node removed from cluster: {} ({})", id, node.addr());
        Some(node)
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Refresh a node's heartbeat and mark it active again.
    ///
    /// Returns `false` when the node is not registered.
    pub fn heartbeat(&mut self, id: &NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };

        node.last_heartbeat = Instant::now();
        if node.status == NodeStatus::Inactive {
            node.status = NodeStatus::Active;
            info!("Node {} re-activated by heartbeat", id);
        } else {
            debug!("Heartbeat from node {}", id);
        }
        true
    }

    /// Point-in-time copy of every member, in rotation order
    pub fn snapshot(&self) -> Vec<Node> {
        self.rotation().cloned().collect()
    }

    /// Copy of the members that are live at `now`, in rotation order
    pub fn live_nodes(&self, now: Instant, timeout: Duration) -> Vec<Node> {
        self.rotation()
            .filter(|node| node.is_live(now, timeout))
            .cloned()
            .collect()
    }

    pub fn live_count(&self, now: Instant, timeout: Duration) -> usize {
        self.nodes
            .values()
            .filter(|node| node.is_live(now, timeout))
            .count()
    }

    /// Return the first live member at or after the cursor and move the cursor
    /// just past it.
    pub fn next_live(&mut self, now: Instant, timeout: Duration) -> Option<Node> {
        let (slot, node) = self
            .rotation_slots()
            .find(|(_, node)| node.is_live(now, timeout))
            .map(|(slot, node)| (slot, node.clone()))?;
        self.cursor = slot + 1;
        Some(node)
    }

    /// Flip every active node whose heartbeat is older than `timeout` to
    /// inactive. Returns the ids that were demoted by this call.
    pub fn demote_stale(&mut self, now: Instant, timeout: Duration) -> Vec<NodeId> {
        let mut demoted = Vec::new();
        for node in self.nodes.values_mut() {
            if node.status == NodeStatus::Active && node.is_stale(now, timeout) {
                node.status = NodeStatus::Inactive;
                demoted.push(node.id.clone());
            }
        }
        demoted
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn rotation(&self) -> impl Iterator<Item = &Node> + '_ {
        self.rotation_slots().map(|(_, node)| node)
    }

    fn rotation_slots(&self) -> impl Iterator<Item = (u64, &Node)> + '_ {
        self.order
            .range(self.cursor..)
            .chain(self.order.range(..self.cursor))
            .filter_map(|(slot, id)| self.nodes.get(id).map(|node| (*slot, node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn info(host: &str) -> NodeInfo {
        NodeInfo::new(host, 8000, 1000)
    }

    fn hosts(nodes: &[Node]) -> Vec<String> {
        nodes.iter().map(|n| n.host.clone()).collect()
    }

    fn registry_of(names: &[&str]) -> (NodeRegistry, Vec<NodeId>) {
        let mut registry = NodeRegistry::new();
        let ids = names.iter().map(|name| registry.add(info(name))).collect();
        (registry, ids)
    }

    fn next_host(registry: &mut NodeRegistry) -> Option<String> {
        registry
            .next_live(Instant::now(), TIMEOUT)
            .map(|node| node.host)
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_creation() {
        let registry = NodeRegistry::with_nodes(vec![info("node1"), info("node2")]);
        assert_eq!(registry.len(), 2);
        assert_eq!(hosts(&registry.snapshot()), vec!["node1", "node2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_assigns_unique_ids() {
        let (registry, ids) = registry_of(&["a", "a", "a", "b"]);
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4);
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin() {
        let (mut registry, _) = registry_of(&["node1", "node2", "node3"]);

        assert_eq!(next_host(&mut registry), Some("node1".to_string()));
        assert_eq!(next_host(&mut registry), Some("node2".to_string()));
        assert_eq!(next_host(&mut registry), Some("node3".to_string()));
        // wraps around
        assert_eq!(next_host(&mut registry), Some("node1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_registry_returns_none() {
        let mut registry = NodeRegistry::new();
        assert_eq!(next_host(&mut registry), None);
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_node() {
        let (mut registry, _) = registry_of(&["only-node"]);
        assert_eq!(next_host(&mut registry), Some("only-node".to_string()));
        assert_eq!(next_host(&mut registry), Some("only-node".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_node_keeps_its_slot() {
        let (mut registry, ids) = registry_of(&["a", "b", "c"]);
        registry.nodes.get_mut(&ids[1]).unwrap().status = NodeStatus::Inactive;

        assert_eq!(next_host(&mut registry), Some("a".to_string()));
        assert_eq!(next_host(&mut registry), Some("c".to_string()));
        assert_eq!(next_host(&mut registry), Some("a".to_string()));

        // Once b is back it is picked in its original position
        assert!(registry.heartbeat(&ids[1]));
        assert_eq!(next_host(&mut registry), Some("b".to_string()));
        assert_eq!(next_host(&mut registry), Some("c".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_follows_rotation() {
        let (mut registry, _) = registry_of(&["a", "b", "c"]);
        next_host(&mut registry);
        assert_eq!(hosts(&registry.snapshot()), vec!["b", "c", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_appends_to_member_order() {
        let (mut registry, _) = registry_of(&["a", "b", "c"]);
        next_host(&mut registry);
        registry.add(info("d"));

        // d is served before the rotation wraps back to a
        assert_eq!(hosts(&registry.snapshot()), vec!["b", "c", "d", "a"]);
        assert_eq!(next_host(&mut registry), Some("b".to_string()));
        assert_eq!(next_host(&mut registry), Some("c".to_string()));
        assert_eq!(next_host(&mut registry), Some("d".to_string()));
        assert_eq!(next_host(&mut registry), Some("a".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_node() {
        let (mut registry, ids) = registry_of(&["node1", "node2", "node3"]);
        let removed = registry.remove(&ids[1]);
        assert_eq!(removed.map(|n| n.host), Some("node2".to_string()));
        assert_eq!(registry.len(), 2);
        assert_eq!(hosts(&registry.snapshot()), vec!["node1", "node3"]);
        assert!(registry.slots.get(&ids[1]).is_none());
        assert_eq!(registry.order.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_is_idempotent() {
        let (mut registry, ids) = registry_of(&["node1", "node2"]);
        assert!(registry.remove(&ids[0]).is_some());
        assert!(registry.remove(&ids[0]).is_none());
        assert!(registry.remove(&NodeId::new()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_keeps_cursor_on_next_member() {
        let (mut registry, ids) = registry_of(&["a", "b", "c", "d"]);
        next_host(&mut registry);
        next_host(&mut registry);
        // Cursor now points at c; removing an earlier member must not skip it
        registry.remove(&ids[0]);
        assert_eq!(next_host(&mut registry), Some("c".to_string()));

        // Removing the member under the cursor moves on to its successor
        registry.remove(&ids[3]);
        assert_eq!(next_host(&mut registry), Some("b".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_reusable_after_emptied() {
        let (mut registry, ids) = registry_of(&["a", "b"]);
        next_host(&mut registry);
        registry.remove(&ids[1]);
        registry.remove(&ids[0]);
        assert!(registry.is_empty());
        assert_eq!(next_host(&mut registry), None);

        registry.add(info("c"));
        assert_eq!(next_host(&mut registry), Some("c".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_unknown_node() {
        let mut registry = NodeRegistry::new();
        assert!(!registry.heartbeat(&NodeId::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_demote_stale() {
        let (mut registry, ids) = registry_of(&["a", "b"]);
        tokio::time::advance(TIMEOUT + Duration::from_secs(1)).await;
        registry.heartbeat(&ids[0]);

        let demoted = registry.demote_stale(Instant::now(), TIMEOUT);
        assert_eq!(demoted, vec![ids[1].clone()]);
        assert_eq!(registry.get(&ids[1]).unwrap().status, NodeStatus::Inactive);
        assert_eq!(registry.get(&ids[0]).unwrap().status, NodeStatus::Active);

        // Already inactive nodes are not reported twice
        assert!(registry.demote_stale(Instant::now(), TIMEOUT).is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_nodes_filters_expired_heartbeats() {
        let (mut registry, ids) = registry_of(&["a", "b"]);
        tokio::time::advance(TIMEOUT).await;
        registry.heartbeat(&ids[1]);

        let now = Instant::now();
        assert_eq!(hosts(&registry.live_nodes(now, TIMEOUT)), vec!["b"]);
        assert_eq!(registry.live_count(now, TIMEOUT), 1);
        // Status is untouched until a sweep runs
        assert_eq!(registry.get(&ids[0]).unwrap().status, NodeStatus::Active);
    }
}
