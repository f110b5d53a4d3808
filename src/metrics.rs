//! Observability hooks for the storage engine.
//!
//! Shaped after the teacher's `StorageMetrics` trait: a `Noop` implementation
//! for production defaults and an atomic-counter implementation for tests and
//! benchmarks. The [`crate::graph::Graph`] facade and [`crate::storage::builder::SnapshotBuilder`]
//! both take `Arc<dyn StorageMetrics>` so callers can swap in their own
//! collector (e.g. a `prometheus` exporter) without touching engine code.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::Direction;

/// Tracks operations against the MLCSR store and the traversal substrate.
///
/// Implementations must be `Send + Sync`: the same handle is shared across
/// reader threads and the single writer.
pub trait StorageMetrics: Send + Sync {
    /// A new immutable level was published.
    fn level_published(&self, level: u32);
    /// The oldest level was retired under the sliding window.
    fn level_retired(&self, level: u32);
    /// A page was allocated (fresh or from a free list).
    fn page_allocated(&self);
    /// A page's refcount reached zero and it returned to a free list.
    fn page_released(&self);
    /// An adjacency scan (`out_iter`/`in_iter`) was issued.
    fn adjacency_scan(&self, direction: Direction);
    /// A degree query was served, either from the cached summary or by
    /// walking the continuation chain.
    fn degree_query(&self, direction: Direction, cached: bool);
    /// The BFS/DFS frontier state machine transitioned to a new state.
    fn frontier_transition(&self, state: &'static str);
}

/// Discards everything; zero overhead when metrics aren't wanted.
#[derive(Default)]
pub struct NoopMetrics;

impl StorageMetrics for NoopMetrics {
    fn level_published(&self, _level: u32) {}
    fn level_retired(&self, _level: u32) {}
    fn page_allocated(&self) {}
    fn page_released(&self) {}
    fn adjacency_scan(&self, _direction: Direction) {}
    fn degree_query(&self, _direction: Direction, _cached: bool) {}
    fn frontier_transition(&self, _state: &'static str) {}
}

/// Thread-safe atomic counters, suitable for tests, benchmarks, and simple
/// production dashboards.
#[derive(Default)]
pub struct CounterMetrics {
    pub levels_published: AtomicU64,
    pub levels_retired: AtomicU64,
    pub pages_allocated: AtomicU64,
    pub pages_released: AtomicU64,
    pub adjacency_scans_out: AtomicU64,
    pub adjacency_scans_in: AtomicU64,
    pub degree_queries_cached: AtomicU64,
    pub degree_queries_walked: AtomicU64,
    pub frontier_small: AtomicU64,
    pub frontier_queue: AtomicU64,
    pub frontier_rd: AtomicU64,
}

impl StorageMetrics for CounterMetrics {
    fn level_published(&self, _level: u32) {
        self.levels_published.fetch_add(1, Ordering::Relaxed);
    }

    fn level_retired(&self, _level: u32) {
        self.levels_retired.fetch_add(1, Ordering::Relaxed);
    }

    fn page_allocated(&self) {
        self.pages_allocated.fetch_add(1, Ordering::Relaxed);
    }

    fn page_released(&self) {
        self.pages_released.fetch_add(1, Ordering::Relaxed);
    }

    fn adjacency_scan(&self, direction: Direction) {
        match direction {
            Direction::Out => self.adjacency_scans_out.fetch_add(1, Ordering::Relaxed),
            Direction::In => self.adjacency_scans_in.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn degree_query(&self, _direction: Direction, cached: bool) {
        if cached {
            self.degree_queries_cached.fetch_add(1, Ordering::Relaxed);
        } else {
            self.degree_queries_walked.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn frontier_transition(&self, state: &'static str) {
        let counter = match state {
            "SMALL" => &self.frontier_small,
            "QUEUE" | "Q2R" | "R2Q" => &self.frontier_queue,
            "RD" => &self.frontier_rd,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
