//! Writable delta (C5): the single-writer staging area for mutations not yet
//! folded into an immutable level.
//!
//! Every write the facade exposes — inserting a vertex or edge, deleting
//! either, or setting a property — lands here first. The snapshot builder
//! (C6) is the only thing that drains it, and does so under the exclusive
//! write lock the facade already serializes writers through, so the maps
//! here need no additional synchronization beyond `Mutex` for `Send + Sync`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::model::NodeId;
use crate::storage::property::PropValue;

/// Pending, not-yet-published mutations against the graph.
#[derive(Default)]
pub struct WritableDelta {
    next_node: AtomicU64,
    out_adj: Mutex<HashMap<NodeId, Vec<NodeId>>>,
    in_adj: Mutex<HashMap<NodeId, Vec<NodeId>>>,
    deleted_edges: Mutex<HashSet<(NodeId, NodeId)>>,
    deleted_nodes: Mutex<HashSet<NodeId>>,
    node_props: Mutex<HashMap<String, HashMap<NodeId, PropValue>>>,
    edge_props: Mutex<HashMap<String, HashMap<(NodeId, NodeId), PropValue>>>,
}

impl WritableDelta {
    pub fn new(base_node_count: u64) -> Self {
        Self {
            next_node: AtomicU64::new(base_node_count),
            ..Default::default()
        }
    }

    /// Allocates and returns a fresh vertex id. Isolated until an edge
    /// touches it or a checkpoint publishes it.
    pub fn add_node(&self) -> NodeId {
        NodeId(self.next_node.fetch_add(1, Ordering::Relaxed))
    }

    /// Highest vertex id allocated so far, plus one: the vertex-table length
    /// the next checkpoint must provide room for.
    pub fn node_count(&self) -> u64 {
        self.next_node.load(Ordering::Relaxed)
    }

    /// Records a directed edge `src -> dst`. Also un-tombstones the pair if
    /// it was previously deleted in this same delta (re-adding after a
    /// delete within one writable window is a no-op deletion).
    pub fn add_edge(&self, src: NodeId, dst: NodeId) {
        self.deleted_edges.lock().remove(&(src, dst));
        self.out_adj.lock().entry(src).or_default().push(dst);
        self.in_adj.lock().entry(dst).or_default().push(src);
    }

    /// Marks `src -> dst` deleted. Valid whether the edge lives in a
    /// published level or only in this delta's pending `out_adj`/`in_adj`.
    pub fn delete_edge(&self, src: NodeId, dst: NodeId) {
        let mut out = self.out_adj.lock();
        if let Some(targets) = out.get_mut(&src) {
            targets.retain(|&t| t != dst);
        }
        drop(out);
        let mut inn = self.in_adj.lock();
        if let Some(sources) = inn.get_mut(&dst) {
            sources.retain(|&s| s != src);
        }
        drop(inn);
        self.deleted_edges.lock().insert((src, dst));
    }

    /// Marks an entire vertex tombstoned. The builder treats its adjacency
    /// (in both directions) as fully deleted when flattening.
    pub fn delete_node(&self, node: NodeId) {
        self.deleted_nodes.lock().insert(node);
        self.out_adj.lock().remove(&node);
        self.in_adj.lock().remove(&node);
    }

    pub fn set_node_property(&self, name: &str, node: NodeId, value: PropValue) {
        self.node_props
            .lock()
            .entry(name.to_string())
            .or_default()
            .insert(node, value);
    }

    pub fn set_edge_property(&self, name: &str, src: NodeId, dst: NodeId, value: PropValue) {
        self.edge_props
            .lock()
            .entry(name.to_string())
            .or_default()
            .insert((src, dst), value);
    }

    /// Pending out-neighbors of `node` not yet in any published level.
    pub fn pending_out(&self, node: NodeId) -> Vec<NodeId> {
        self.out_adj.lock().get(&node).cloned().unwrap_or_default()
    }

    /// Pending in-neighbors of `node` not yet in any published level.
    pub fn pending_in(&self, node: NodeId) -> Vec<NodeId> {
        self.in_adj.lock().get(&node).cloned().unwrap_or_default()
    }

    pub fn is_edge_deleted(&self, src: NodeId, dst: NodeId) -> bool {
        self.deleted_edges.lock().contains(&(src, dst))
    }

    pub fn is_node_deleted(&self, node: NodeId) -> bool {
        self.deleted_nodes.lock().contains(&node)
    }

    pub fn pending_node_property(&self, name: &str, node: NodeId) -> Option<PropValue> {
        self.node_props.lock().get(name)?.get(&node).copied()
    }

    pub fn pending_edge_property(&self, name: &str, src: NodeId, dst: NodeId) -> Option<PropValue> {
        self.edge_props.lock().get(name)?.get(&(src, dst)).copied()
    }

    /// Drains every pending mutation for the snapshot builder, resetting the
    /// delta to empty (`next_node` is left untouched — vertex ids never
    /// reset). Called with the facade's writer lock held.
    ///
    /// `delete_node` only clears the deleted vertex's *own* `out_adj`/`in_adj`
    /// entries as it's called; a pending `add_edge(u, v)` recorded before
    /// `delete_node(v)` in the same writer session would otherwise still
    /// leave `v` reachable through `u`'s pending adjacency. So on drain,
    /// every other vertex's pending adjacency is swept for the deleted set
    /// too — a deleted node must disappear from both sides of every pending
    /// edge, not just its own.
    pub(crate) fn drain(&self) -> DrainedDelta {
        let mut out_adj = std::mem::take(&mut *self.out_adj.lock());
        let mut in_adj = std::mem::take(&mut *self.in_adj.lock());
        let deleted_edges = std::mem::take(&mut *self.deleted_edges.lock());
        let deleted_nodes = std::mem::take(&mut *self.deleted_nodes.lock());
        let node_props = std::mem::take(&mut *self.node_props.lock());
        let edge_props = std::mem::take(&mut *self.edge_props.lock());

        if !deleted_nodes.is_empty() {
            for targets in out_adj.values_mut() {
                targets.retain(|dst| !deleted_nodes.contains(dst));
            }
            for sources in in_adj.values_mut() {
                sources.retain(|src| !deleted_nodes.contains(src));
            }
        }

        DrainedDelta {
            out_adj,
            in_adj,
            deleted_edges,
            deleted_nodes,
            node_props,
            edge_props,
            node_count: self.next_node.load(Ordering::Relaxed),
        }
    }
}

/// A consistent snapshot of everything pending, handed to the snapshot
/// builder. If the builder fails partway through, the facade reinstates this
/// back into the live delta rather than losing the writes (see
/// [`crate::storage::builder::SnapshotBuilder`]).
pub struct DrainedDelta {
    pub out_adj: HashMap<NodeId, Vec<NodeId>>,
    pub in_adj: HashMap<NodeId, Vec<NodeId>>,
    pub deleted_edges: HashSet<(NodeId, NodeId)>,
    pub deleted_nodes: HashSet<NodeId>,
    pub node_props: HashMap<String, HashMap<NodeId, PropValue>>,
    pub edge_props: HashMap<String, HashMap<(NodeId, NodeId), PropValue>>,
    pub node_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_delete_edge_clears_pending_adjacency() {
        let delta = WritableDelta::new(2);
        delta.add_edge(NodeId(0), NodeId(1));
        assert_eq!(delta.pending_out(NodeId(0)), vec![NodeId(1)]);
        delta.delete_edge(NodeId(0), NodeId(1));
        assert!(delta.pending_out(NodeId(0)).is_empty());
        assert!(delta.is_edge_deleted(NodeId(0), NodeId(1)));
    }

    #[test]
    fn re_adding_after_delete_clears_tombstone() {
        let delta = WritableDelta::new(2);
        delta.add_edge(NodeId(0), NodeId(1));
        delta.delete_edge(NodeId(0), NodeId(1));
        delta.add_edge(NodeId(0), NodeId(1));
        assert!(!delta.is_edge_deleted(NodeId(0), NodeId(1)));
        assert_eq!(delta.pending_out(NodeId(0)), vec![NodeId(1)]);
    }

    #[test]
    fn drain_strips_deleted_node_from_other_vertices_pending_adjacency() {
        let delta = WritableDelta::new(3);
        delta.add_edge(NodeId(0), NodeId(1)); // u -> v
        delta.delete_node(NodeId(1)); // v deleted in the same session
        let drained = delta.drain();
        assert!(
            drained.out_adj.get(&NodeId(0)).map_or(true, |t| t.is_empty()),
            "u's pending out-adjacency must not still list the deleted v"
        );
        assert!(drained.deleted_nodes.contains(&NodeId(1)));
    }

    #[test]
    fn node_ids_allocate_monotonically() {
        let delta = WritableDelta::new(0);
        assert_eq!(delta.add_node(), NodeId(0));
        assert_eq!(delta.add_node(), NodeId(1));
        assert_eq!(delta.node_count(), 2);
    }

    #[test]
    fn drain_empties_pending_state() {
        let delta = WritableDelta::new(0);
        delta.add_edge(NodeId(0), NodeId(1));
        let drained = delta.drain();
        assert_eq!(drained.out_adj.len(), 1);
        assert!(delta.pending_out(NodeId(0)).is_empty());
    }
}
