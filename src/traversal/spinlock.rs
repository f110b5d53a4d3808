//! Fixed-size, hash-partitioned per-vertex spinlock table (§5).
//!
//! Relaxation-style analytics (SSSP, PageRank-style accumulation) touch one
//! vertex's accumulator at a time from many worker threads. A lock per
//! vertex would be wasteful for graphs with millions of vertices, so
//! instead vertices hash down into a small, fixed number of spinlock
//! buckets — contention is possible between two unrelated vertices that
//! land in the same bucket, but the table stays a constant size regardless
//! of graph size.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::model::NodeId;

/// A fixed pool of spinlocks, indexed by a hashed vertex id.
pub struct SpinlockTable {
    locks: Vec<AtomicBool>,
}

impl SpinlockTable {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            locks: (0..size).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    fn bucket(&self, node: NodeId) -> usize {
        (node.as_u64() as usize) % self.locks.len()
    }

    /// Spins until the bucket owning `node` is acquired, then returns a
    /// guard that releases it on drop.
    pub fn lock(&self, node: NodeId) -> SpinlockGuard<'_> {
        let idx = self.bucket(node);
        loop {
            if self.locks[idx]
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
            std::hint::spin_loop();
        }
        SpinlockGuard { table: self, idx }
    }

    /// Runs `f` with `node`'s bucket held, for the common
    /// read-modify-write relaxation pattern.
    pub fn relax<R>(&self, node: NodeId, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock(node);
        f()
    }
}

pub struct SpinlockGuard<'a> {
    table: &'a SpinlockTable,
    idx: usize,
}

impl Drop for SpinlockGuard<'_> {
    fn drop(&mut self) {
        self.table.locks[self.idx].store(false, Ordering::Release);
    }
}

/// Convenience constructor matching `EngineConfig::spinlock_table_size`.
pub fn shared_table(size: usize) -> Arc<SpinlockTable> {
    Arc::new(SpinlockTable::new(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;
    use std::sync::Arc;

    #[test]
    fn relax_serializes_same_bucket_updates() {
        let table = Arc::new(SpinlockTable::new(1));
        let counter = Arc::new(AtomicI64::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let counter = counter.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    table.relax(NodeId(0), || {
                        let v = counter.load(Ordering::Relaxed);
                        counter.store(v + 1, Ordering::Relaxed);
                    });
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }

    #[test]
    fn different_nodes_can_hash_to_different_buckets() {
        let table = SpinlockTable::new(16);
        let _g0 = table.lock(NodeId(0));
        let _g1 = table.lock(NodeId(1));
    }
}
