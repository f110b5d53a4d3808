//! Parallel, adaptive BFS/DFS traversal substrate (C8).
//!
//! The frontier processing strategy adapts to the frontier's size relative
//! to the graph, the way direction-optimizing BFS implementations do:
//!
//! - `Small`  — sequential expansion; not worth spinning up rayon for a
//!   handful of vertices.
//! - `Queue`  — classic top-down: parallel expansion of the frontier's own
//!   out-edges (or in-edges, for a reverse pass).
//! - `Rd`     — bottom-up ("read-driven"): when the frontier has grown large
//!   relative to the whole graph, it's cheaper to scan every still-unvisited
//!   vertex and ask "is one of your predecessors in the frontier?" than to
//!   expand the frontier's own (possibly much larger) edge set.
//!
//! `Q2R`/`R2Q` aren't separate code paths — they're just the edges of this
//! state machine logged through [`crate::metrics::StorageMetrics::frontier_transition`]
//! when a round switches between `Queue` and `Rd`.

pub mod spinlock;

use std::sync::atomic::{AtomicI64, Ordering};

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::graph::Graph;
use crate::model::{Direction, NodeId};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum FrontierState {
    Small,
    Queue,
    Rd,
}

impl FrontierState {
    fn as_str(self) -> &'static str {
        match self {
            FrontierState::Small => "SMALL",
            FrontierState::Queue => "QUEUE",
            FrontierState::Rd => "RD",
        }
    }
}

/// Distances (and, optionally, parent pointers) from a BFS traversal. Index
/// `i` holds vertex `NodeId(i)`'s result; `-1` means unreached.
pub struct TraversalResult {
    pub distance: Vec<i64>,
    pub parent: Vec<i64>,
}

impl TraversalResult {
    pub fn distance_of(&self, node: NodeId) -> Option<i64> {
        self.distance.get(node.index()).copied().filter(|&d| d >= 0)
    }
}

/// Client-supplied predicate filtering an edge before its target may join the
/// next frontier (§4.8 `check_navigator`/`has_navigator`). Called as
/// `(from, to)`; returning `false` hides the edge from this traversal as if
/// it didn't exist.
pub type Navigator<'a> = dyn Fn(NodeId, NodeId) -> bool + Sync + 'a;

/// Per-run configuration mirroring §4.8's compile-time flags. Kept as plain
/// runtime fields rather than type-level markers — the substrate here is
/// monomorphized once over `Graph`, not over a family of graph
/// representations, so there's no inlining benefit to a type parameter per
/// flag (see `DESIGN.md`).
pub struct BfsConfig<'a> {
    pub direction: Direction,
    pub multi_thread: bool,
    /// Record each tree ("down") edge discovered during the forward pass so
    /// a caller can later walk the BFS DAG back-to-front (e.g. Brandes'
    /// betweenness-centrality dependency accumulation).
    pub save_children: bool,
    pub navigator: Option<&'a Navigator<'a>>,
}

impl<'a> BfsConfig<'a> {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            multi_thread: true,
            save_children: false,
            navigator: None,
        }
    }
}

/// Result of a configured BFS run: distances/parents like [`TraversalResult`],
/// plus — when `save_children` was set — every level's down edges, newest
/// level last, ready for a reverse (leaves-to-root) pass.
pub struct BfsOutcome {
    pub distance: Vec<i64>,
    pub parent: Vec<i64>,
    down_edges: Option<Vec<Vec<(NodeId, NodeId)>>>,
}

impl BfsOutcome {
    pub fn distance_of(&self, node: NodeId) -> Option<i64> {
        self.distance.get(node.index()).copied().filter(|&d| d >= 0)
    }

    /// Whether `(from, to)` was recorded as a tree edge during the forward
    /// pass. `false` both when the edge wasn't a tree edge and when
    /// `save_children` wasn't requested for this run.
    pub fn is_down_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.down_edges
            .as_ref()
            .is_some_and(|levels| levels.iter().any(|level| level.contains(&(from, to))))
    }

    /// Walks the recorded down edges from the last BFS level back to the
    /// first, calling `visit_rv` once per `(parent, child)` tree edge — the
    /// reverse pass §4.8 describes for DAG-only algorithms like
    /// betweenness centrality. A no-op if `save_children` wasn't set.
    pub fn reverse_pass(&self, mut visit_rv: impl FnMut(NodeId, NodeId)) {
        let Some(down_edges) = &self.down_edges else { return };
        for level in down_edges.iter().rev() {
            for &(parent, child) in level {
                visit_rv(parent, child);
            }
        }
    }
}

fn opposite(direction: Direction) -> Direction {
    match direction {
        Direction::Out => Direction::In,
        Direction::In => Direction::Out,
    }
}

fn neighbors(graph: &Graph, node: NodeId, direction: Direction) -> Vec<NodeId> {
    match direction {
        Direction::Out => graph.out_iter(node),
        Direction::In => graph.in_iter(node),
    }
}

/// Picks the state the *next* frontier (size `next_count`, produced by
/// expanding a frontier of size `curr_count` while in state `prev`) should be
/// processed in, per §4.8's transition table:
///
/// - QUEUE/SMALL -> RD needs `next_count >= bfs_queue_threshold` (1024) *and*
///   `next_count >= bfs_queue_ratio * curr_count` (5x growth) — both the
///   frontier's absolute size and its growth rate must justify the bottom-up
///   scan's fixed `O(n)` cost.
/// - RD -> QUEUE needs `next_count <= bfs_rd_ratio * curr_count` (back within
///   2x) — once growth has leveled off, top-down is cheaper again.
fn next_state(prev: FrontierState, next_count: usize, curr_count: usize, config: &EngineConfig) -> FrontierState {
    if next_count < config.bfs_small_threshold {
        return FrontierState::Small;
    }
    match prev {
        FrontierState::Rd => {
            if next_count <= curr_count.saturating_mul(config.bfs_rd_ratio) {
                FrontierState::Queue
            } else {
                FrontierState::Rd
            }
        }
        _ => {
            if next_count >= config.bfs_queue_threshold && next_count >= curr_count.saturating_mul(config.bfs_queue_ratio) {
                FrontierState::Rd
            } else {
                FrontierState::Queue
            }
        }
    }
}

/// Breadth-first traversal from `sources`, following `direction` edges
/// (`Out` for a standard forward BFS, `In` to explore predecessors).
pub fn bfs(graph: &Graph, sources: &[NodeId], direction: Direction) -> TraversalResult {
    let outcome = bfs_configured(graph, sources, &BfsConfig::new(direction), |_| {});
    TraversalResult {
        distance: outcome.distance,
        parent: outcome.parent,
    }
}

/// Configurable BFS entry point: §4.8's `multi_thread`/`has_navigator`/
/// `save_children` flags plus the `visit_fw` client callback, called once per
/// vertex the instant it's claimed into the frontier (from whichever worker
/// claimed it, so `visit_fw` must be `Sync` and side-effect-safe under
/// concurrent calls — e.g. writing into a pre-sized atomic array, the way
/// SSSP relaxation and betweenness-centrality dependency counters do).
pub fn bfs_configured(
    graph: &Graph,
    sources: &[NodeId],
    config: &BfsConfig<'_>,
    visit_fw: impl Fn(NodeId) + Sync,
) -> BfsOutcome {
    let n = graph.max_nodes() as usize;
    let distance: Vec<AtomicI64> = (0..n).map(|_| AtomicI64::new(-1)).collect();
    let parent: Vec<AtomicI64> = (0..n).map(|_| AtomicI64::new(-1)).collect();

    let mut frontier: Vec<NodeId> = Vec::new();
    for &s in sources {
        if s.index() < n
            && distance[s.index()]
                .compare_exchange(-1, 0, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            visit_fw(s);
            frontier.push(s);
        }
    }

    let metrics = graph.metrics();
    let engine_config = graph.config();
    let mut level: i64 = 0;
    let mut state = FrontierState::Small;
    let mut curr_count = frontier.len();
    let multi_thread = config.multi_thread && engine_config.max_threads > 1;
    let mut down_edges: Option<Vec<Vec<(NodeId, NodeId)>>> = config.save_children.then(Vec::new);

    while !frontier.is_empty() {
        metrics.frontier_transition(state.as_str());

        let tree_edges: Vec<(NodeId, NodeId)> = match state {
            FrontierState::Small => {
                expand_top_down_sequential(graph, &frontier, config, &distance, &parent, level, &visit_fw)
            }
            FrontierState::Queue if multi_thread => {
                expand_top_down_parallel(graph, &frontier, config, &distance, &parent, level, &visit_fw)
            }
            FrontierState::Queue => {
                expand_top_down_sequential(graph, &frontier, config, &distance, &parent, level, &visit_fw)
            }
            FrontierState::Rd => {
                expand_bottom_up(graph, &frontier, config, &distance, &parent, level, n, multi_thread, &visit_fw)
            }
        };
        frontier = tree_edges.iter().map(|&(_, child)| child).collect();
        if let Some(levels) = down_edges.as_mut() {
            levels.push(tree_edges);
        }
        level += 1;

        let next_count = frontier.len();
        state = next_state(state, next_count, curr_count, engine_config);
        curr_count = next_count;
    }

    BfsOutcome {
        distance: distance.into_iter().map(AtomicI64::into_inner).collect(),
        parent: parent.into_iter().map(AtomicI64::into_inner).collect(),
        down_edges,
    }
}

fn passes_navigator(config: &BfsConfig<'_>, from: NodeId, to: NodeId) -> bool {
    match config.navigator {
        Some(nav) => nav(from, to),
        None => true,
    }
}

fn expand_top_down_sequential(
    graph: &Graph,
    frontier: &[NodeId],
    config: &BfsConfig<'_>,
    distance: &[AtomicI64],
    parent: &[AtomicI64],
    level: i64,
    visit_fw: &impl Fn(NodeId),
) -> Vec<(NodeId, NodeId)> {
    let mut next = Vec::new();
    for &v in frontier {
        for target in neighbors(graph, v, config.direction) {
            if !passes_navigator(config, v, target) {
                continue;
            }
            if distance[target.index()]
                .compare_exchange(-1, level + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                parent[target.index()].store(v.as_u64() as i64, Ordering::Relaxed);
                visit_fw(target);
                next.push((v, target));
            }
        }
    }
    next
}

fn expand_top_down_parallel(
    graph: &Graph,
    frontier: &[NodeId],
    config: &BfsConfig<'_>,
    distance: &[AtomicI64],
    parent: &[AtomicI64],
    level: i64,
    visit_fw: &(impl Fn(NodeId) + Sync),
) -> Vec<(NodeId, NodeId)> {
    frontier
        .par_iter()
        .flat_map_iter(|&v| {
            neighbors(graph, v, config.direction).into_iter().filter_map(move |target| {
                if !passes_navigator(config, v, target) {
                    return None;
                }
                let claimed = distance[target.index()]
                    .compare_exchange(-1, level + 1, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok();
                if claimed {
                    parent[target.index()].store(v.as_u64() as i64, Ordering::Relaxed);
                    visit_fw(target);
                    Some((v, target))
                } else {
                    None
                }
            })
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn expand_bottom_up(
    graph: &Graph,
    frontier: &[NodeId],
    config: &BfsConfig<'_>,
    distance: &[AtomicI64],
    parent: &[AtomicI64],
    level: i64,
    n: usize,
    multi_thread: bool,
    visit_fw: &(impl Fn(NodeId) + Sync),
) -> Vec<(NodeId, NodeId)> {
    let frontier_set: std::collections::HashSet<NodeId> = frontier.iter().copied().collect();
    let reverse = opposite(config.direction);
    let candidates: Vec<usize> = (0..n).filter(|&i| distance[i].load(Ordering::Acquire) == -1).collect();

    let discover = |idx: usize| -> Option<(NodeId, NodeId)> {
        let node = NodeId(idx as u64);
        for predecessor in neighbors(graph, node, reverse) {
            // Bottom-up direction: the live edge runs predecessor -> node in
            // the forward sense, so the navigator sees the same (from, to)
            // pair it would in a top-down expansion.
            if frontier_set.contains(&predecessor) && passes_navigator(config, predecessor, node) {
                distance[idx].store(level + 1, Ordering::Release);
                parent[idx].store(predecessor.as_u64() as i64, Ordering::Relaxed);
                visit_fw(node);
                return Some((predecessor, node));
            }
        }
        None
    };

    if multi_thread {
        candidates.into_par_iter().filter_map(discover).collect()
    } else {
        candidates.into_iter().filter_map(discover).collect()
    }
}

/// Sequential depth-first traversal from `sources`; always single-threaded,
/// since DFS's inherently sequential frontier (a stack, not a level-by-level
/// wave) doesn't benefit from the adaptive parallel machinery above.
pub fn dfs(graph: &Graph, sources: &[NodeId], direction: Direction) -> TraversalResult {
    let n = graph.max_nodes() as usize;
    let mut distance = vec![-1i64; n];
    let mut parent = vec![-1i64; n];
    let mut order = 0i64;
    let mut stack: Vec<(NodeId, Option<NodeId>)> = Vec::new();
    for &s in sources.iter().rev() {
        if s.index() < n {
            stack.push((s, None));
        }
    }
    while let Some((node, from)) = stack.pop() {
        if distance[node.index()] != -1 {
            continue;
        }
        distance[node.index()] = order;
        order += 1;
        if let Some(p) = from {
            parent[node.index()] = p.as_u64() as i64;
        }
        for neighbor in neighbors(graph, node, direction).into_iter().rev() {
            if distance[neighbor.index()] == -1 {
                stack.push((neighbor, Some(node)));
            }
        }
    }
    TraversalResult { distance, parent }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn line_graph(n: u64) -> Graph {
        let graph = Graph::in_memory(EngineConfig::small());
        for _ in 0..n {
            graph.add_node();
        }
        for i in 0..n.saturating_sub(1) {
            graph.add_edge(NodeId(i), NodeId(i + 1));
        }
        graph.checkpoint();
        graph
    }

    #[test]
    fn bfs_distances_on_a_line() {
        let graph = line_graph(6);
        let result = bfs(&graph, &[NodeId(0)], Direction::Out);
        for i in 0..6u64 {
            assert_eq!(result.distance_of(NodeId(i)), Some(i as i64));
        }
    }

    #[test]
    fn bfs_unreachable_vertex_has_no_distance() {
        let graph = Graph::in_memory(EngineConfig::small());
        let a = graph.add_node();
        let b = graph.add_node();
        graph.checkpoint();
        let result = bfs(&graph, &[a], Direction::Out);
        assert_eq!(result.distance_of(a), Some(0));
        assert_eq!(result.distance_of(b), None);
    }

    #[test]
    fn dfs_visits_every_reachable_vertex() {
        let graph = line_graph(5);
        let result = dfs(&graph, &[NodeId(0)], Direction::Out);
        for i in 0..5u64 {
            assert!(result.distance_of(NodeId(i)).is_some());
        }
    }

    #[test]
    fn navigator_hides_filtered_edges() {
        let graph = line_graph(4); // 0 -> 1 -> 2 -> 3
        let blocked = (NodeId(1), NodeId(2));
        let navigator = move |from: NodeId, to: NodeId| (from, to) != blocked;
        let mut config = BfsConfig::new(Direction::Out);
        config.navigator = Some(&navigator);
        let outcome = bfs_configured(&graph, &[NodeId(0)], &config, |_| {});
        assert_eq!(outcome.distance_of(NodeId(1)), Some(1));
        assert_eq!(outcome.distance_of(NodeId(2)), None, "edge 1->2 was navigated away");
        assert_eq!(outcome.distance_of(NodeId(3)), None);
    }

    #[test]
    fn save_children_records_tree_edges_for_a_reverse_pass() {
        let graph = line_graph(4); // 0 -> 1 -> 2 -> 3
        let mut config = BfsConfig::new(Direction::Out);
        config.save_children = true;
        let outcome = bfs_configured(&graph, &[NodeId(0)], &config, |_| {});

        assert!(outcome.is_down_edge(NodeId(0), NodeId(1)));
        assert!(outcome.is_down_edge(NodeId(1), NodeId(2)));
        assert!(!outcome.is_down_edge(NodeId(0), NodeId(2)), "not a direct tree edge");

        let mut visited_order = Vec::new();
        outcome.reverse_pass(|_parent, child| visited_order.push(child));
        // Leaves-to-root: the deepest level's children come first.
        assert_eq!(visited_order, vec![NodeId(3), NodeId(2), NodeId(1)]);
    }

    #[test]
    fn large_frontier_exercises_parallel_and_bottom_up_states() {
        // bfs_small_threshold/queue_threshold are tiny under `small()`, so a
        // modest star graph forces the state machine through Queue and Rd.
        let graph = Graph::in_memory(EngineConfig::small());
        let center = graph.add_node();
        for _ in 0..40 {
            let leaf = graph.add_node();
            graph.add_edge(center, leaf);
        }
        graph.checkpoint();
        let result = bfs(&graph, &[center], Direction::Out);
        assert_eq!(result.distance_of(center), Some(0));
        for i in 1..41u64 {
            assert_eq!(result.distance_of(NodeId(i)), Some(1));
        }
    }
}
