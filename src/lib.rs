//! # LevelGraph — a multi-level compressed-sparse-row graph storage engine
//!
//! LevelGraph is an in-memory, append-only, multi-version graph store for
//! analytics on large directed graphs. Every ingestion batch is flattened
//! into a new immutable *level* (a snapshot); levels chain together through
//! per-vertex continuation pointers so a single adjacency list can span
//! several snapshots without copying unchanged data.
//!
//! ## Quick start
//!
//! ```rust
//! use levelgraph::config::EngineConfig;
//! use levelgraph::graph::Graph;
//!
//! let graph = Graph::in_memory(EngineConfig::default());
//! let a = graph.add_node();
//! let b = graph.add_node();
//! graph.add_edge(a, b);
//! graph.checkpoint();
//!
//! assert_eq!(graph.out_iter(a), vec![b]);
//! assert_eq!(graph.num_levels(), 1);
//! ```
//!
//! ## Architecture
//!
//! - [`page`] — fixed-size, refcounted page allocator underlying every large
//!   array in the engine.
//! - [`storage`] — the MLCSR data model: dense per-level tables
//!   ([`storage::table`]), the per-direction level stack
//!   ([`storage::direction`]), versioned property columns
//!   ([`storage::property`]), the writable delta ([`storage::delta`]), and
//!   the snapshot builder that flattens one into the next
//!   ([`storage::builder`]).
//! - [`graph`] — the public, read-mostly facade analytics drive.
//! - [`traversal`] — the adaptive parallel BFS/DFS substrate all graph
//!   algorithms are built on, plus the fixed-size spinlock table relaxation
//!   kernels use to serialize per-vertex updates.
//! - [`persist`] — directory-based snapshot dump/load.
//! - [`config`], [`error`], [`metrics`] — the ambient engineering stack.

pub mod config;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod page;
pub mod persist;
pub mod storage;
pub mod traversal;

pub use config::EngineConfig;
pub use error::{GraphError, Result};
pub use graph::Graph;
pub use model::{Direction, EdgeId, LevelId, NodeId, PropWidth};
