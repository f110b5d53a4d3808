//! Snapshot / checkpoint builder (C6).
//!
//! Flattens the writable delta against the newest published level of both
//! direction stores, producing one new immutable level per direction plus an
//! advanced property-store generation, then publishes all three atomically
//! from the caller's point of view (readers never observe a partially
//! updated graph because nothing is mutated in place — only new `Arc`s are
//! pushed onto each store's level stack).
//!
//! Runs under the facade's single-writer lock, so there is exactly one
//! [`SnapshotBuilder::checkpoint`] in flight at a time; the per-vertex work
//! within a checkpoint is still farmed out across `rayon` for large graphs
//! (§5, "parallel over vertex ranges").

use std::collections::HashMap;

use rayon::prelude::*;

use crate::model::{EdgeId, LevelId, NodeId, VertexRec};
use crate::storage::delta::{DrainedDelta, WritableDelta};
use crate::storage::direction::{DirectionStore, LevelData};
use crate::storage::property::PropertyStore;
use crate::storage::table::{Bitmap, Slab};

/// Per-checkpoint statistics, returned to callers for logging/CLI output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointStats {
    pub new_level: u32,
    pub vertex_count: usize,
    pub out_edges_added: usize,
    pub in_edges_added: usize,
    pub edges_deleted: usize,
    pub nodes_deleted: usize,
    pub retired_level: Option<u32>,
}

/// Flattens one direction (out or in) of the graph against a drained delta,
/// producing the new level's vertex table, edge table, and deletion bitmap.
/// `opposite` is the other direction's store (`in_store` when `store` is
/// `out_store` and vice versa) — needed to enumerate a deleted vertex's
/// *other* endpoint of every edge it's incident to, since `store` alone only
/// knows about the deleted vertex's own adjacency record.
fn build_level(
    store: &DirectionStore,
    opposite: &DirectionStore,
    drained: &DrainedDelta,
    pending: &HashMap<NodeId, Vec<NodeId>>,
    new_vertex_count: usize,
) -> (LevelData, usize, HashMap<(NodeId, NodeId), u64>) {
    let old_vertex_count = store.max_vertex_count();
    let prior_level = if store.num_levels() == 0 {
        None
    } else {
        Some(LevelId(store.num_levels() - 1))
    };
    let new_level_index = store.num_levels();

    // Pass 1 (parallelizable): decide each vertex's new record and its own
    // edge-table contribution, independent of every other vertex.
    let per_vertex: Vec<(VertexRec, Vec<NodeId>)> = (0..new_vertex_count)
        .into_par_iter()
        .map(|idx| {
            let vertex = NodeId(idx as u64);
            if drained.deleted_nodes.contains(&vertex) {
                return (VertexRec::empty(), Vec::new());
            }
            let mut targets = pending.get(&vertex).cloned().unwrap_or_default();
            // §4.3's sorted-adjacency invariant: triangle counting and any
            // algorithm that merges two adjacency lists assumes each
            // level's own segment is sorted ascending by target.
            targets.sort_unstable();
            let existed = idx < old_vertex_count;
            let continuation = if existed {
                EdgeId::new(prior_level.unwrap_or(LevelId(0)), idx as u32)
            } else {
                EdgeId::NIL
            };
            if targets.is_empty() {
                if existed {
                    (VertexRec::continuation_only(continuation), Vec::new())
                } else {
                    (VertexRec::empty(), Vec::new())
                }
            } else {
                (
                    VertexRec {
                        adj_head: EdgeId::NIL, // index patched below once offsets are known
                        length: targets.len() as u32,
                        continuation,
                    },
                    targets,
                )
            }
        })
        .collect();

    // Pass 2 (sequential, cheap): assign contiguous edge-table offsets and
    // patch `adj_head` now that every vertex's slice length is known.
    let mut vertex_recs = Vec::with_capacity(new_vertex_count);
    let mut flat_edges = Vec::new();
    let mut new_edge_flat_index = HashMap::new();
    let mut cursor: u32 = 0;
    for (idx, (mut rec, targets)) in per_vertex.into_iter().enumerate() {
        if !targets.is_empty() {
            rec.adj_head = EdgeId::new(LevelId(new_level_index), cursor);
            let vertex = NodeId(idx as u64);
            for &target in &targets {
                new_edge_flat_index.insert((vertex, target), store.total_edge_slots() + flat_edges.len() as u64);
                flat_edges.push(target);
            }
            cursor += targets.len() as u32;
        }
        vertex_recs.push(rec);
    }

    let vertex_table = Slab::from_values(store.vertex_manager().clone(), &vertex_recs);
    let edge_offset = store.total_edge_slots();
    let edge_table = Slab::from_values(store.edge_manager().clone(), &flat_edges);
    let edges_added = flat_edges.len();

    let deletions = if store.deletions_enabled() {
        // The bitmap is cumulative: COW-share the previous level's bitmap
        // forward (its bits for already-retired tombstones ride along for
        // free) and extend it to cover this level's new edge-table slots
        // before OR-ing in the batch's own deletions. `iter`/`degree`/
        // `find_flat_indices` only ever consult the newest level's bitmap,
        // so it alone must reflect every tombstone ever recorded.
        let mut bitmap = match store.share_newest_deletions() {
            Some(shared) => shared,
            None => Bitmap::zeroed(store.bits_manager().clone(), 0),
        };
        bitmap.extend_zero(edge_offset as usize + edges_added - bitmap.len_bits());
        for &(src, dst) in &drained.deleted_edges {
            for flat in store.find_flat_indices(src, dst) {
                bitmap.set(flat as usize);
            }
        }
        for &node in &drained.deleted_nodes {
            // A deleted vertex must vanish from the *other* side of every
            // edge it's incident to as well, not just its own adjacency
            // record: `opposite.iter(node)` enumerates node's neighbors as
            // recorded in the other direction (node's predecessors when
            // `store` is the out-store, its successors when `store` is the
            // in-store), and each of those neighbors' own record in `store`
            // is where the edge to `node` actually lives.
            for &other in &opposite.iter(node) {
                for flat in store.find_flat_indices(other, node) {
                    bitmap.set(flat as usize);
                }
            }
        }
        Some(bitmap)
    } else {
        None
    };

    let level = LevelData {
        index: new_level_index,
        vertex_table,
        edge_table,
        edge_offset,
        deletions,
    };
    (level, edges_added, new_edge_flat_index)
}

/// Coordinates a checkpoint across both direction stores and both property
/// stores for a single graph instance.
pub struct SnapshotBuilder<'a> {
    pub out_store: &'a DirectionStore,
    pub in_store: &'a DirectionStore,
    pub node_props: &'a PropertyStore,
    pub edge_props: &'a PropertyStore,
    pub delta: &'a WritableDelta,
    pub window_size: u32,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn checkpoint(&self) -> CheckpointStats {
        let drained = self.delta.drain();
        let new_vertex_count = drained.node_count as usize;

        let (out_level, out_added, new_out_flat) =
            build_level(self.out_store, self.in_store, &drained, &drained.out_adj, new_vertex_count);
        let (in_level, in_added, _new_in_flat) =
            build_level(self.in_store, self.out_store, &drained, &drained.in_adj, new_vertex_count);

        self.node_props.advance_level(new_vertex_count);
        for (name, writes) in &drained.node_props {
            self.node_props.declare(name, writes.values().next().map(|v| v.width()).unwrap_or(crate::model::PropWidth::W64), new_vertex_count);
            for (&node, &value) in writes {
                self.node_props.set(name, node.index(), value);
            }
        }

        let edge_capacity = self.out_store.total_edge_slots() as usize + out_added;
        self.edge_props.advance_level(edge_capacity);
        for (name, writes) in &drained.edge_props {
            self.edge_props.declare(name, writes.values().next().map(|v| v.width()).unwrap_or(crate::model::PropWidth::W64), edge_capacity);
            for (&(src, dst), &value) in writes {
                let flat = new_out_flat
                    .get(&(src, dst))
                    .copied()
                    .or_else(|| self.out_store.find_flat_indices(src, dst).last().copied());
                if let Some(flat) = flat {
                    self.edge_props.set(name, flat as usize, value);
                }
            }
        }

        let new_level = out_level.index;
        self.out_store.publish_level(out_level);
        self.in_store.publish_level(in_level);

        let mut retired_level = None;
        if self.out_store.num_levels() > self.window_size {
            self.out_store.retire_oldest();
            self.in_store.retire_oldest();
            self.node_props.retire_oldest();
            self.edge_props.retire_oldest();
            retired_level = Some(self.out_store.min_level().0.saturating_sub(1));
        }

        CheckpointStats {
            new_level,
            vertex_count: new_vertex_count,
            out_edges_added: out_added,
            in_edges_added: in_added,
            edges_deleted: drained.deleted_edges.len(),
            nodes_deleted: drained.deleted_nodes.len(),
            retired_level,
        }
    }
}

