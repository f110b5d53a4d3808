//! MLCSR direction store (C3): one instance per adjacency direction
//! (out-edges, in-edges), each holding a stack of immutable levels plus a
//! cursor marking the oldest level still visible to readers.
//!
//! Resolving a vertex's adjacency means walking its `continuation` chain from
//! the newest level backward, collecting each level's own contribution (the
//! slice of that level's edge table described by `adj_head`/`length`) and
//! consulting the direction's deletion bitmap (if enabled) for each
//! candidate edge before it's returned.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::metrics::StorageMetrics;
use crate::model::{Direction, EdgeId, LevelId, NodeId, VertexRec};
use crate::page::PageManager;
use crate::storage::table::{Bitmap, Slab};

/// One immutable, published snapshot within a direction store.
pub(crate) struct LevelData {
    pub index: u32,
    pub vertex_table: Slab<VertexRec>,
    pub edge_table: Slab<NodeId>,
    /// Cumulative count of edge-table slots across this and all older
    /// levels, for flat-indexing the cumulative deletion bitmap.
    pub edge_offset: u64,
    pub deletions: Option<Bitmap>,
}

impl LevelData {
    fn edge_slot_count(&self) -> u64 {
        self.edge_offset + self.edge_table.len() as u64
    }

    fn is_deleted(&self, flat_index: u64) -> bool {
        match &self.deletions {
            Some(bitmap) => bitmap.get(flat_index as usize),
            None => false,
        }
    }
}

/// The out-edge or in-edge half of a graph's MLCSR storage.
pub struct DirectionStore {
    direction: Direction,
    vertex_manager: Arc<PageManager<VertexRec>>,
    edge_manager: Arc<PageManager<NodeId>>,
    bits_manager: Arc<PageManager<u64>>,
    levels: RwLock<Vec<Arc<LevelData>>>,
    min_level: AtomicU32,
    deletions_enabled: bool,
    metrics: Arc<dyn StorageMetrics>,
}

impl DirectionStore {
    pub fn new(
        direction: Direction,
        page_length: usize,
        deletions_enabled: bool,
        metrics: Arc<dyn StorageMetrics>,
    ) -> Self {
        Self {
            direction,
            vertex_manager: Arc::new(PageManager::new(
                crate::page::PageManagerConfig {
                    page_length,
                    zero_pages: false,
                },
                metrics.clone(),
            )),
            edge_manager: Arc::new(PageManager::new(
                crate::page::PageManagerConfig {
                    page_length,
                    zero_pages: false,
                },
                metrics.clone(),
            )),
            bits_manager: Arc::new(PageManager::new(
                crate::page::PageManagerConfig {
                    page_length,
                    zero_pages: false,
                },
                metrics.clone(),
            )),
            levels: RwLock::new(Vec::new()),
            min_level: AtomicU32::new(0),
            deletions_enabled,
            metrics,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn vertex_manager(&self) -> &Arc<PageManager<VertexRec>> {
        &self.vertex_manager
    }

    pub fn edge_manager(&self) -> &Arc<PageManager<NodeId>> {
        &self.edge_manager
    }

    pub fn bits_manager(&self) -> &Arc<PageManager<u64>> {
        &self.bits_manager
    }

    pub fn deletions_enabled(&self) -> bool {
        self.deletions_enabled
    }

    pub fn num_levels(&self) -> u32 {
        self.levels.read().len() as u32
    }

    pub fn min_level(&self) -> LevelId {
        LevelId(self.min_level.load(Ordering::Acquire))
    }

    /// Publishes a freshly-built level on top of the stack. Called by the
    /// snapshot builder (C6) after it finishes flattening the writable
    /// delta. The store takes ownership of the level's page references; the
    /// builder must not release them itself.
    pub(crate) fn publish_level(&self, level: LevelData) {
        let idx = level.index;
        self.levels.write().push(Arc::new(level));
        self.metrics.level_published(idx);
    }

    /// Drops the oldest live level, releasing its pages, and advances the
    /// visibility cursor. The level being retired must have no readers
    /// holding a `LevelId` older than the new minimum — the facade enforces
    /// this by only ever handing out levels `>= min_level`.
    pub(crate) fn retire_oldest(&self) {
        let mut levels = self.levels.write();
        if levels.is_empty() {
            return;
        }
        let retired = levels.remove(0);
        self.min_level.store(retired.index + 1, Ordering::Release);
        self.metrics.level_retired(retired.index);
    }

    fn levels_snapshot(&self) -> Vec<Arc<LevelData>> {
        self.levels.read().clone()
    }

    /// Returns the vertex's head record at the newest published level, or
    /// `None` if the vertex has never been seen by this direction (i.e. it
    /// lies entirely in the writable delta).
    fn head_record(levels: &[Arc<LevelData>], vertex: NodeId) -> Option<(usize, VertexRec)> {
        let newest = levels.last()?;
        let idx = vertex.index();
        if idx >= newest.vertex_table.len() {
            return None;
        }
        Some((levels.len() - 1, newest.vertex_table.get(idx)))
    }

    /// Full adjacency for `vertex` as of the newest published level, newest
    /// targets first, with tombstoned edges filtered out.
    ///
    /// Each level's deletion bitmap is cumulative (the snapshot builder
    /// COWs the previous level's bitmap forward and ORs in new tombstones),
    /// so a flat edge-table index is checked against the *anchor* level's
    /// bitmap — the newest live level — regardless of which older level in
    /// the continuation chain actually owns that edge-table slot. Checking
    /// the owning level's own bitmap instead would miss any deletion
    /// recorded after that level was built.
    pub fn iter(&self, vertex: NodeId) -> Vec<NodeId> {
        self.metrics.adjacency_scan(self.direction);
        let levels = self.levels_snapshot();
        let mut out = Vec::new();
        let Some((mut level_pos, mut rec)) = Self::head_record(&levels, vertex) else {
            return out;
        };
        let anchor = &levels[levels.len() - 1];
        loop {
            let level = &levels[level_pos];
            if !rec.adj_head.is_nil() && rec.length > 0 {
                let start = rec.adj_head.index as usize;
                for i in 0..rec.length as usize {
                    let slot = start + i;
                    let flat = level.edge_offset + slot as u64;
                    if !anchor.is_deleted(flat) {
                        out.push(level.edge_table.get(slot));
                    }
                }
            }
            if rec.continuation.is_nil() {
                break;
            }
            let Some(next_pos) = levels
                .iter()
                .position(|l| l.index == rec.continuation.level.0)
            else {
                break;
            };
            let next_level = &levels[next_pos];
            let next_idx = rec.continuation.index as usize;
            if next_idx >= next_level.vertex_table.len() {
                break;
            }
            rec = next_level.vertex_table.get(next_idx);
            level_pos = next_pos;
        }
        out
    }

    /// Degree of `vertex` as of the newest published level — walks the same
    /// continuation chain as `iter` but only counts, skipping tombstoned
    /// slots so the result matches `iter().len()` exactly.
    pub fn degree(&self, vertex: NodeId) -> usize {
        self.metrics.degree_query(self.direction, false);
        let levels = self.levels_snapshot();
        let Some((mut level_pos, mut rec)) = Self::head_record(&levels, vertex) else {
            return 0;
        };
        let anchor = &levels[levels.len() - 1];
        let mut total = 0usize;
        loop {
            let level = &levels[level_pos];
            if !rec.adj_head.is_nil() && rec.length > 0 {
                let start = rec.adj_head.index as usize;
                for i in 0..rec.length as usize {
                    let flat = level.edge_offset + (start + i) as u64;
                    if !anchor.is_deleted(flat) {
                        total += 1;
                    }
                }
            }
            if rec.continuation.is_nil() {
                break;
            }
            let Some(next_pos) = levels
                .iter()
                .position(|l| l.index == rec.continuation.level.0)
            else {
                break;
            };
            let next_level = &levels[next_pos];
            let next_idx = rec.continuation.index as usize;
            if next_idx >= next_level.vertex_table.len() {
                break;
            }
            rec = next_level.vertex_table.get(next_idx);
            level_pos = next_pos;
        }
        total
    }

    /// Total number of edge-table slots materialized across all live levels,
    /// including tombstoned ones — the flat index space deletion bitmaps
    /// are defined over.
    pub fn total_edge_slots(&self) -> u64 {
        self.levels
            .read()
            .last()
            .map(LevelData::edge_slot_count)
            .unwrap_or(0)
    }

    /// Flat edge-table indices (across all live levels) of every live,
    /// not-yet-deleted `vertex -> target` edge. Used by the snapshot
    /// builder to locate the slots a pending deletion or property write must
    /// land on.
    pub(crate) fn find_flat_indices(&self, vertex: NodeId, target: NodeId) -> Vec<u64> {
        let levels = self.levels_snapshot();
        let mut out = Vec::new();
        let Some((mut level_pos, mut rec)) = Self::head_record(&levels, vertex) else {
            return out;
        };
        let anchor = &levels[levels.len() - 1];
        loop {
            let level = &levels[level_pos];
            if !rec.adj_head.is_nil() && rec.length > 0 {
                let start = rec.adj_head.index as usize;
                for i in 0..rec.length as usize {
                    let slot = start + i;
                    let flat = level.edge_offset + slot as u64;
                    if !anchor.is_deleted(flat) && level.edge_table.get(slot) == target {
                        out.push(flat);
                    }
                }
            }
            if rec.continuation.is_nil() {
                break;
            }
            let Some(next_pos) = levels
                .iter()
                .position(|l| l.index == rec.continuation.level.0)
            else {
                break;
            };
            let next_level = &levels[next_pos];
            let next_idx = rec.continuation.index as usize;
            if next_idx >= next_level.vertex_table.len() {
                break;
            }
            rec = next_level.vertex_table.get(next_idx);
            level_pos = next_pos;
        }
        out
    }

    /// COW-shares the newest live level's deletion bitmap, for the snapshot
    /// builder to extend and OR new tombstones into when building the next
    /// level's cumulative bitmap. `None` if there is no level yet, or the
    /// newest level has no bitmap (deletions disabled).
    pub(crate) fn share_newest_deletions(&self) -> Option<Bitmap> {
        self.levels.read().last()?.deletions.as_ref().map(Bitmap::share)
    }

    /// Greatest vertex count across live levels, for sizing a new level's
    /// vertex table in the snapshot builder.
    pub fn max_vertex_count(&self) -> usize {
        self.levels
            .read()
            .last()
            .map(|l| l.vertex_table.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn level_count_for_test(&self) -> usize {
        self.levels.read().len()
    }
}
