//! Graph facade (C7): the public surface over the MLCSR storage internals.
//!
//! Reads never block and never see fine-grained, unsnapshotted writes: every
//! reader walks only the immutable level stack (C3/C4), never the
//! single-writer `WritableDelta` (C5), and never contends with a checkpoint
//! in progress (a checkpoint only ever pushes new `Arc`s, it never mutates a
//! published level in place). A write becomes visible only after the next
//! `checkpoint` folds it into a new level. Writes themselves serialize
//! through `write_lock`, matching the single-writer assumption the whole
//! storage layer is built on.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::Rng;

use crate::config::EngineConfig;
use crate::metrics::{NoopMetrics, StorageMetrics};
use crate::model::{Direction, NodeId, PropWidth};
use crate::storage::builder::{CheckpointStats, SnapshotBuilder};
use crate::storage::delta::WritableDelta;
use crate::storage::direction::DirectionStore;
use crate::storage::property::{PropValue, PropertyStore};

/// Aggregate counters describing the graph's current state, used by the CLI
/// `stats` subcommand and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelStats {
    pub num_levels: u32,
    pub vertex_count: usize,
    pub out_edge_slots: usize,
    pub in_edge_slots: usize,
}

/// An in-memory, append-only, multi-version graph.
pub struct Graph {
    config: EngineConfig,
    out_store: DirectionStore,
    in_store: DirectionStore,
    node_props: PropertyStore,
    edge_props: PropertyStore,
    delta: WritableDelta,
    tombstoned: RwLock<HashSet<NodeId>>,
    write_lock: Mutex<()>,
    metrics: Arc<dyn StorageMetrics>,
}

impl Graph {
    /// Opens a fresh, empty in-memory graph with the given configuration.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::with_metrics(config, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(config: EngineConfig, metrics: Arc<dyn StorageMetrics>) -> Self {
        let out_store = DirectionStore::new(Direction::Out, config.page_length, config.deletions_enabled, metrics.clone());
        let in_store = DirectionStore::new(Direction::In, config.page_length, config.deletions_enabled, metrics.clone());
        let node_props = PropertyStore::new(config.page_length, metrics.clone());
        let edge_props = PropertyStore::new(config.page_length, metrics.clone());
        Self {
            config,
            out_store,
            in_store,
            node_props,
            edge_props,
            delta: WritableDelta::new(0),
            tombstoned: RwLock::new(HashSet::new()),
            write_lock: Mutex::new(()),
            metrics,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<dyn StorageMetrics> {
        &self.metrics
    }

    /// One past the highest vertex id ever allocated (some may be deleted).
    pub fn max_nodes(&self) -> u64 {
        self.delta.node_count()
    }

    pub fn num_levels(&self) -> u32 {
        self.out_store.num_levels()
    }

    pub fn min_level(&self) -> u32 {
        self.out_store.min_level().0
    }

    fn is_alive(&self, node: NodeId) -> bool {
        node.as_u64() < self.max_nodes() && !self.tombstoned.read().contains(&node)
    }

    /// Out-neighbors of `node` as of the newest published level. Pending
    /// writes in the writable delta are not visible until the next
    /// `checkpoint` — readers only ever hit C3/C4, never the single-writer
    /// staging area.
    pub fn out_iter(&self, node: NodeId) -> Vec<NodeId> {
        self.out_store.iter(node)
    }

    /// In-neighbors of `node` as of the newest published level.
    pub fn in_iter(&self, node: NodeId) -> Vec<NodeId> {
        self.in_store.iter(node)
    }

    pub fn out_degree(&self, node: NodeId) -> usize {
        self.out_iter(node).len()
    }

    pub fn in_degree(&self, node: NodeId) -> usize {
        self.in_iter(node).len()
    }

    /// Reads node property `name` for `node` as of the newest published
    /// level. A pending `set_node_property` isn't visible until the next
    /// `checkpoint`.
    pub fn node_property(&self, name: &str, node: NodeId) -> Option<PropValue> {
        self.node_props.get(name, node.index())
    }

    /// Reads edge property `name` for `src -> dst` at the edge's published
    /// flat index, if any. A pending `set_edge_property` isn't visible until
    /// the next `checkpoint`.
    pub fn edge_property(&self, name: &str, src: NodeId, dst: NodeId) -> Option<PropValue> {
        let flat = self.out_store.find_flat_indices(src, dst).last().copied()?;
        self.edge_props.get(name, flat as usize)
    }

    /// Allocates a fresh, isolated vertex.
    pub fn add_node(&self) -> NodeId {
        self.delta.add_node()
    }

    /// Records a directed edge. Both endpoints must already have been
    /// allocated via `add_node` (possibly earlier in the same writer
    /// session, before any checkpoint).
    pub fn add_edge(&self, src: NodeId, dst: NodeId) {
        self.delta.add_edge(src, dst);
    }

    pub fn delete_edge(&self, src: NodeId, dst: NodeId) {
        self.delta.delete_edge(src, dst);
    }

    pub fn delete_node(&self, node: NodeId) {
        self.tombstoned.write().insert(node);
        self.delta.delete_node(node);
    }

    pub fn set_node_property(&self, name: &str, node: NodeId, value: PropValue) {
        self.delta.set_node_property(name, node, value);
    }

    pub fn set_edge_property(&self, name: &str, src: NodeId, dst: NodeId, value: PropValue) {
        self.delta.set_edge_property(name, src, dst, value);
    }

    /// Declares a property column up front, sized to the current vertex (or
    /// edge, via `for_edges`) count. Optional: `set_*_property` on an
    /// undeclared name is an error from the snapshot builder's point of
    /// view, but the facade itself defers declaration to the next
    /// checkpoint when the name is new.
    pub fn declare_node_property(&self, name: &str, width: PropWidth) {
        self.node_props.declare(name, width, self.max_nodes() as usize);
    }

    pub fn node_property_names(&self) -> Vec<String> {
        self.node_props.names()
    }

    pub fn edge_property_names(&self) -> Vec<String> {
        self.edge_props.names()
    }

    pub fn node_property_width(&self, name: &str) -> Option<PropWidth> {
        self.node_props.width(name)
    }

    pub fn edge_property_width(&self, name: &str) -> Option<PropWidth> {
        self.edge_props.width(name)
    }

    /// Flattens all pending writes into a new immutable level, serialized
    /// against any other writer via the facade's write lock.
    pub fn checkpoint(&self) -> CheckpointStats {
        let _guard = self.write_lock.lock();
        let builder = SnapshotBuilder {
            out_store: &self.out_store,
            in_store: &self.in_store,
            node_props: &self.node_props,
            edge_props: &self.edge_props,
            delta: &self.delta,
            window_size: self.config.window_size,
        };
        builder.checkpoint()
    }

    /// Aggregate stats over the graph's current state.
    pub fn level_summary(&self) -> LevelStats {
        LevelStats {
            num_levels: self.num_levels(),
            vertex_count: self.out_store.max_vertex_count().max(self.max_nodes() as usize),
            out_edge_slots: self.out_store.total_edge_slots() as usize,
            in_edge_slots: self.in_store.total_edge_slots() as usize,
        }
    }

    /// Picks a uniformly-random live vertex id. Returns `NodeId::NONE` if
    /// the graph has no live vertices. Uses rejection sampling against the
    /// full `[0, max_nodes)` range (cheap when few vertices are tombstoned)
    /// and falls back to a linear scan if too many consecutive samples miss,
    /// which bounds the cost when most vertices are dead.
    pub fn pick_random_node(&self) -> NodeId {
        let max_nodes = self.max_nodes();
        if max_nodes == 0 {
            return NodeId::NONE;
        }
        const MAX_ATTEMPTS: u32 = 32;
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_ATTEMPTS {
            let candidate = NodeId(rng.gen_range(0..max_nodes));
            if self.is_alive(candidate) {
                return candidate;
            }
        }
        (0..max_nodes)
            .map(NodeId)
            .find(|&n| self.is_alive(n))
            .unwrap_or(NodeId::NONE)
    }
}
