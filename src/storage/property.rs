//! Versioned property columns (C4).
//!
//! A property column is a dense array, one cell per node (or per edge-table
//! slot), stored per level exactly like a vertex table: a new level starts
//! as a `share()` of its predecessor's column and only the cells actually
//! written at that level get `cow_write`, so unchanged segments stay
//! physically shared across levels. Columns come in two widths (`u32`,
//! `u64`) per §4.4; `u64` doubles as an opaque 64-bit handle for interned
//! strings or other out-of-line values.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::metrics::StorageMetrics;
use crate::model::PropWidth;
use crate::page::PageManager;
use crate::storage::table::Slab;

/// One property's value, tagged by width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropValue {
    U32(u32),
    U64(u64),
}

impl PropValue {
    pub fn width(self) -> PropWidth {
        match self {
            PropValue::U32(_) => PropWidth::W32,
            PropValue::U64(_) => PropWidth::W64,
        }
    }
}

enum Column {
    W32(Slab<u32>),
    W64(Slab<u64>),
}

impl Column {
    fn len(&self) -> usize {
        match self {
            Column::W32(s) => s.len(),
            Column::W64(s) => s.len(),
        }
    }

    fn get(&self, idx: usize) -> PropValue {
        match self {
            Column::W32(s) => PropValue::U32(s.get(idx)),
            Column::W64(s) => PropValue::U64(s.get(idx)),
        }
    }

    fn share(&self) -> Column {
        match self {
            Column::W32(s) => Column::W32(s.share()),
            Column::W64(s) => Column::W64(s.share()),
        }
    }

    fn cow_write(&mut self, idx: usize, value: PropValue) {
        match (self, value) {
            (Column::W32(s), PropValue::U32(v)) => s.cow_write(idx, v),
            (Column::W64(s), PropValue::U64(v)) => s.cow_write(idx, v),
            (col, value) => crate::error::fatal(
                "property width mismatch",
                format_args!("column is {:?}, value is {:?}", col.width_tag(), value.width()),
            ),
        }
    }

    fn extend_with_default(&mut self, extra: usize) {
        match self {
            Column::W32(s) => s.extend_with_default(extra),
            Column::W64(s) => s.extend_with_default(extra),
        }
    }

    fn width_tag(&self) -> PropWidth {
        match self {
            Column::W32(_) => PropWidth::W32,
            Column::W64(_) => PropWidth::W64,
        }
    }
}

/// One named property's value across every level published so far. Only the
/// newest level is ever read or written through [`PropertyStore`]; older
/// `Column`s are retained purely so their pages can be released in order
/// when a level retires (dropping a `Column` releases its own pages, and
/// shared pages simply see their refcount fall).
struct PropertyHistory {
    width: PropWidth,
    levels: Vec<Column>,
}

/// Keyed collection of versioned property columns for either nodes or edges.
pub struct PropertyStore {
    manager_32: Arc<PageManager<u32>>,
    manager_64: Arc<PageManager<u64>>,
    columns: RwLock<HashMap<String, PropertyHistory>>,
    metrics: Arc<dyn StorageMetrics>,
}

impl PropertyStore {
    pub fn new(page_length: usize, metrics: Arc<dyn StorageMetrics>) -> Self {
        Self {
            manager_32: Arc::new(PageManager::new(
                crate::page::PageManagerConfig {
                    page_length,
                    zero_pages: false,
                },
                metrics.clone(),
            )),
            manager_64: Arc::new(PageManager::new(
                crate::page::PageManagerConfig {
                    page_length,
                    zero_pages: false,
                },
                metrics.clone(),
            )),
            columns: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Declares (or looks up) a column of the given width, sized to hold at
    /// least `len` cells, all initialized to zero/default. Declaring an
    /// existing column with a different width is a fatal error.
    pub fn declare(&self, name: &str, width: PropWidth, len: usize) {
        let mut columns = self.columns.write();
        if let Some(existing) = columns.get_mut(name) {
            if existing.width != width {
                crate::error::fatal(
                    "property column width conflict",
                    format_args!("column {name:?} already declared as {:?}", existing.width),
                );
            }
            if let Some(last) = existing.levels.last_mut() {
                if len > last.len() {
                    last.extend_with_default(len - last.len());
                }
            }
            return;
        }
        let column = match width {
            PropWidth::W32 => Column::W32(Slab::zeroed(self.manager_32.clone(), len)),
            PropWidth::W64 => Column::W64(Slab::zeroed(self.manager_64.clone(), len)),
        };
        columns.insert(
            name.to_string(),
            PropertyHistory {
                width,
                levels: vec![column],
            },
        );
    }

    /// Reads cell `idx` of `name` at the current (newest) level.
    pub fn get(&self, name: &str, idx: usize) -> Option<PropValue> {
        let columns = self.columns.read();
        let history = columns.get(name)?;
        let current = history.levels.last()?;
        if idx >= current.len() {
            return None;
        }
        Some(current.get(idx))
    }

    /// Writes cell `idx` of `name` at the current level, copy-on-writing its
    /// backing page as needed. `declare` must have been called first.
    pub fn set(&self, name: &str, idx: usize, value: PropValue) {
        let mut columns = self.columns.write();
        let Some(history) = columns.get_mut(name) else {
            crate::error::fatal("unknown property column", format_args!("{name:?} was never declared"));
        };
        if history.width != value.width() {
            crate::error::fatal(
                "property width mismatch",
                format_args!("column {name:?} is {:?}, value is {:?}", history.width, value.width()),
            );
        }
        let current = history.levels.last_mut().expect("column always has a level");
        if idx >= current.len() {
            crate::error::fatal(
                "property index out of range",
                format_args!("column {name:?} has {} cells, wrote {idx}", current.len()),
            );
        }
        current.cow_write(idx, value);
    }

    /// Called by the snapshot builder (C6) when publishing a new level: every
    /// declared column gets a shared copy of its current state, grown to
    /// `new_len` with zero-valued new cells, becoming the column each future
    /// `get`/`set` sees until the next checkpoint.
    pub(crate) fn advance_level(&self, new_len: usize) {
        let mut columns = self.columns.write();
        for history in columns.values_mut() {
            let mut next = history.levels.last().expect("column always has a level").share();
            if new_len > next.len() {
                next.extend_with_default(new_len - next.len());
            }
            history.levels.push(next);
        }
    }

    /// Drops the oldest retained `Column` for every property, mirroring
    /// direction-store level retirement so superseded pages can return to
    /// their free lists once no live level references them.
    pub(crate) fn retire_oldest(&self) {
        let mut columns = self.columns.write();
        for history in columns.values_mut() {
            if history.levels.len() > 1 {
                history.levels.remove(0);
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.read().keys().cloned().collect()
    }

    /// The width a column was declared with, if it exists.
    pub fn width(&self, name: &str) -> Option<PropWidth> {
        self.columns.read().get(name).map(|h| h.width)
    }
}
