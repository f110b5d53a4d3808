//! Dense, page-sharded arrays (C2): the building block behind vertex tables,
//! edge tables, property columns, and deletion bitmaps alike.
//!
//! A [`Slab<T>`] is a logically contiguous `[T]` built from one or more
//! fixed-size pages handed out by a [`PageManager`]. Levels share unchanged
//! regions of a slab with their predecessor by acquiring the same page ids
//! (`share`) rather than copying; a write to a shared page first
//! copy-on-writes it (`cow_write`) so older levels' pages stay bit-for-bit
//! immutable, per §3's invariants.

use std::sync::Arc;

use crate::page::{PageId, PageManager};

/// A logically contiguous, page-sharded dense array.
pub struct Slab<T: Copy + Default + Send + Sync + 'static> {
    manager: Arc<PageManager<T>>,
    pages: Vec<PageId>,
    len: usize,
}

impl<T: Copy + Default + Send + Sync + 'static> Slab<T> {
    fn page_len(&self) -> usize {
        self.manager.page_length()
    }

    /// Builds a slab holding exactly `values`, freshly allocated (refcount 1
    /// per page, owned solely by the returned slab).
    pub fn from_values(manager: Arc<PageManager<T>>, values: &[T]) -> Self {
        let page_len = manager.page_length();
        let page_count = values.len().div_ceil(page_len.max(1)).max(if values.is_empty() { 0 } else { 1 });
        let mut pages = Vec::with_capacity(page_count);
        for chunk in values.chunks(page_len) {
            let (id, slot) = manager.allocate();
            {
                let mut guard = slot.write();
                guard[..chunk.len()].copy_from_slice(chunk);
            }
            pages.push(id);
        }
        Self {
            manager,
            pages,
            len: values.len(),
        }
    }

    /// Builds an empty slab (no pages, length zero).
    pub fn empty(manager: Arc<PageManager<T>>) -> Self {
        Self {
            manager,
            pages: Vec::new(),
            len: 0,
        }
    }

    /// Builds a slab of `len` zero/default values entirely backed by the
    /// manager's shared zero page — used for cumulative deletion bitmaps
    /// and fresh property columns, which start life all-default without
    /// touching a single fresh page.
    pub fn zeroed(manager: Arc<PageManager<T>>, len: usize) -> Self {
        let page_len = manager.page_length().max(1);
        let page_count = len.div_ceil(page_len);
        let zero_id = manager.zero_page(page_count as u32);
        Self {
            manager,
            pages: vec![zero_id; page_count],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, idx: usize) -> T {
        assert!(idx < self.len, "slab index {idx} out of bounds ({})", self.len);
        let page_len = self.page_len();
        let page = self.pages[idx / page_len];
        let within = idx % page_len;
        self.manager.slot(page).read()[within]
    }

    /// Shares this slab with a new owner: acquires one reference on every
    /// backing page and returns an independent `Slab` handle pointing at the
    /// same pages. This is the COW "unchanged vertex/segment" path — no data
    /// is copied, only refcounts move.
    pub fn share(&self) -> Self {
        for &page in &self.pages {
            self.manager.acquire(page, 1);
        }
        Self {
            manager: self.manager.clone(),
            pages: self.pages.clone(),
            len: self.len,
        }
    }

    /// Writes `value` at `idx`, copy-on-writing the backing page first if it
    /// is shared with another level (refcount > 1).
    pub fn cow_write(&mut self, idx: usize, value: T) {
        assert!(idx < self.len, "slab index {idx} out of bounds ({})", self.len);
        let page_len = self.page_len();
        let page_idx = idx / page_len;
        let within = idx % page_len;
        let page = self.pages[page_idx];
        if self.manager.refcount(page) > 1 {
            let (new_page, slot) = self.manager.cow(page);
            slot.write()[within] = value;
            self.pages[page_idx] = new_page;
        } else {
            self.manager.slot(page).write()[within] = value;
        }
    }

    /// Appends `extra` default/zero-valued slots, reusing the manager's
    /// shared zero page for any wholly-fresh page this creates. Used when a
    /// checkpoint grows the vertex count or the cumulative deletion bitmap's
    /// bit-length without yet writing into the new region.
    pub fn extend_with_default(&mut self, extra: usize) {
        if extra == 0 {
            return;
        }
        let page_len = self.page_len();
        let mut remaining = extra;
        let mut used_in_last_page = self.len % page_len;
        if used_in_last_page != 0 && !self.pages.is_empty() {
            // The current last page may be shared; nothing to do until a
            // write actually lands in its tail, which `cow_write` handles.
            let room = page_len - used_in_last_page;
            let take = room.min(remaining);
            remaining -= take;
            used_in_last_page += take;
            let _ = used_in_last_page;
        }
        if remaining > 0 {
            let whole_pages = remaining.div_ceil(page_len);
            let zero_id = self.manager.zero_page(whole_pages as u32);
            for _ in 0..whole_pages {
                self.pages.push(zero_id);
            }
        }
        self.len += extra;
    }

    /// Appends `values`, allocating fresh pages as needed (never shares with
    /// the zero page, since the caller has real content to write).
    pub fn extend_with_values(&mut self, values: &[T]) {
        if values.is_empty() {
            return;
        }
        let page_len = self.page_len();
        let mut offset = 0;
        let used_in_last_page = self.len % page_len;
        if used_in_last_page != 0 {
            let last_page_idx = self.pages.len() - 1;
            let last_page = self.pages[last_page_idx];
            let room = page_len - used_in_last_page;
            let take = room.min(values.len());
            if self.manager.refcount(last_page) > 1 {
                let (new_page, slot) = self.manager.cow(last_page);
                slot.write()[used_in_last_page..used_in_last_page + take]
                    .copy_from_slice(&values[..take]);
                self.pages[last_page_idx] = new_page;
            } else {
                self.manager.slot(last_page).write()[used_in_last_page..used_in_last_page + take]
                    .copy_from_slice(&values[..take]);
            }
            offset = take;
        }
        for chunk in values[offset..].chunks(page_len) {
            let (id, slot) = self.manager.allocate();
            slot.write()[..chunk.len()].copy_from_slice(chunk);
            self.pages.push(id);
        }
        self.len += values.len();
    }

    /// Snapshot of the backing page ids, for tests/diagnostics.
    pub fn page_ids(&self) -> &[PageId] {
        &self.pages
    }

    pub(crate) fn manager(&self) -> &Arc<PageManager<T>> {
        &self.manager
    }
}

impl<T: Copy + Default + Send + Sync + 'static> Drop for Slab<T> {
    fn drop(&mut self) {
        for &page in &self.pages {
            self.manager.release(page);
        }
    }
}

/// 64-bit-word bitmap built on a `Slab<u64>`, used for deletion tracking.
pub struct Bitmap {
    words: Slab<u64>,
    bits: usize,
}

impl Bitmap {
    pub fn zeroed(manager: Arc<PageManager<u64>>, bits: usize) -> Self {
        let words = bits.div_ceil(64);
        Self {
            words: Slab::zeroed(manager, words),
            bits,
        }
    }

    pub fn share(&self) -> Self {
        Self {
            words: self.words.share(),
            bits: self.bits,
        }
    }

    pub fn len_bits(&self) -> usize {
        self.bits
    }

    pub fn extend_zero(&mut self, extra_bits: usize) {
        if extra_bits == 0 {
            return;
        }
        let old_words = self.bits.div_ceil(64);
        let new_bits = self.bits + extra_bits;
        let new_words = new_bits.div_ceil(64);
        if new_words > old_words {
            self.words.extend_with_default(new_words - old_words);
        }
        self.bits = new_bits;
    }

    pub fn get(&self, bit: usize) -> bool {
        if bit >= self.bits {
            return false;
        }
        let word = self.words.get(bit / 64);
        (word >> (bit % 64)) & 1 != 0
    }

    pub fn set(&mut self, bit: usize) {
        assert!(bit < self.bits, "bitmap bit {bit} out of range ({})", self.bits);
        let word_idx = bit / 64;
        let mut word = self.words.get(word_idx);
        word |= 1u64 << (bit % 64);
        self.words.cow_write(word_idx, word);
    }

    pub(crate) fn manager(&self) -> &Arc<PageManager<u64>> {
        self.words.manager()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::page::PageManagerConfig;

    fn manager<T: Copy + Default + Send + Sync + 'static>() -> Arc<PageManager<T>> {
        Arc::new(PageManager::new(
            PageManagerConfig {
                page_length: 4,
                zero_pages: false,
            },
            Arc::new(NoopMetrics),
        ))
    }

    #[test]
    fn slab_roundtrips_values_across_page_boundary() {
        let mgr = manager::<u32>();
        let values: Vec<u32> = (0..10).collect();
        let slab = Slab::from_values(mgr, &values);
        assert_eq!(slab.len(), 10);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(slab.get(i), *v);
        }
    }

    #[test]
    fn share_then_cow_write_does_not_mutate_original() {
        let mgr = manager::<u32>();
        let slab = Slab::from_values(mgr, &[1, 2, 3, 4, 5]);
        let mut shared = slab.share();
        shared.cow_write(0, 99);
        assert_eq!(slab.get(0), 1, "original page must stay immutable after COW");
        assert_eq!(shared.get(0), 99);
    }

    #[test]
    fn bitmap_set_and_extend() {
        let mgr = manager::<u64>();
        let mut bm = Bitmap::zeroed(mgr, 10);
        assert!(!bm.get(3));
        bm.set(3);
        assert!(bm.get(3));
        bm.extend_zero(100);
        assert_eq!(bm.len_bits(), 110);
        assert!(bm.get(3));
        assert!(!bm.get(70));
    }

    #[test]
    fn bitmap_share_is_independent_after_cow() {
        let mgr = manager::<u64>();
        let bm = Bitmap::zeroed(mgr, 64);
        let mut shared = bm.share();
        shared.set(5);
        assert!(!bm.get(5));
        assert!(shared.get(5));
    }
}
