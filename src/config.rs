//! Engine-wide tunables.
//!
//! Shaped after the teacher's `db::config::Config`: a `Default` plus a
//! handful of named presets. The adaptive BFS thresholds (§4.8/§9 of the
//! design) are deliberately exposed here rather than hard-coded, since the
//! design notes require correctness to be independent of their exact values.

/// Tunable parameters for a [`crate::graph::Graph`] instance.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Number of elements per page handed out by the page manager (C1).
    pub page_length: usize,
    /// Force zeroing of pages on allocation and reuse (C1).
    pub zero_pages: bool,
    /// Number of newest levels kept live under the sliding-window retention
    /// policy; levels older than `num_levels - window_size` are retired.
    pub window_size: u32,
    /// Whether deletion bitmaps are maintained per level (C2/C3). Disabling
    /// this saves memory for append-only workloads that never delete.
    pub deletions_enabled: bool,
    /// Maximum worker threads for the traversal substrate and snapshot
    /// builder's parallel vertex-range pass.
    pub max_threads: usize,
    /// Node-range chunk size used when partitioning parallel work (§5).
    pub node_chunk_size: usize,
    /// SMALL -> QUEUE frontier transition threshold.
    pub bfs_small_threshold: usize,
    /// QUEUE -> RD frontier transition absolute threshold.
    pub bfs_queue_threshold: usize,
    /// QUEUE -> RD frontier transition ratio factor (`next >= ratio * curr`).
    pub bfs_queue_ratio: usize,
    /// RD -> QUEUE frontier transition ratio factor (`next <= curr / ratio`).
    pub bfs_rd_ratio: usize,
    /// Number of locks in the fixed-size, hash-partitioned per-vertex
    /// spinlock table used by relaxation-style analytics (§5).
    pub spinlock_table_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_length: 4096,
            zero_pages: false,
            window_size: 8,
            deletions_enabled: true,
            max_threads: num_cpus(),
            node_chunk_size: 4096,
            bfs_small_threshold: 128,
            bfs_queue_threshold: 1024,
            bfs_queue_ratio: 5,
            bfs_rd_ratio: 2,
            spinlock_table_size: 4096,
        }
    }
}

impl EngineConfig {
    /// A config tuned for small graphs and unit tests: tiny pages, a short
    /// window, a single worker thread, and low frontier thresholds so the
    /// adaptive state machine can be exercised without huge graphs.
    pub fn small() -> Self {
        Self {
            page_length: 64,
            window_size: 4,
            max_threads: 1,
            node_chunk_size: 64,
            bfs_small_threshold: 4,
            bfs_queue_threshold: 16,
            ..Self::default()
        }
    }

    /// A config tuned for very large graphs: bigger pages, a deep window,
    /// and all available cores.
    pub fn large_graph() -> Self {
        Self {
            page_length: 1 << 16,
            window_size: 32,
            max_threads: num_cpus(),
            node_chunk_size: 1 << 16,
            ..Self::default()
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
