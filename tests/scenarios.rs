//! End-to-end scenarios from the design's testable-properties section,
//! implemented as client code driving only the public `Graph`/`traversal`/
//! property APIs — per the design, PageRank/SSSP/SCC/triangle-counting are
//! analytic kernels external to the storage engine core, so they're
//! implemented here rather than under `src/`.

use std::collections::HashMap;

use levelgraph::config::EngineConfig;
use levelgraph::graph::Graph;
use levelgraph::model::{Direction, NodeId, PropWidth};
use levelgraph::storage::property::PropValue;
use levelgraph::traversal;

fn small_graph() -> Graph {
    Graph::in_memory(EngineConfig::small())
}

fn nodes(graph: &Graph, n: u64) -> Vec<NodeId> {
    (0..n).map(|_| graph.add_node()).collect()
}

/// S1 — two-snapshot BFS distance.
#[test]
fn s1_two_snapshot_bfs_distance() {
    let graph = small_graph();
    let v = nodes(&graph, 5);

    graph.add_edge(v[0], v[1]);
    graph.add_edge(v[1], v[2]);
    graph.add_edge(v[2], v[3]);
    graph.checkpoint();

    graph.add_edge(v[3], v[4]);
    graph.checkpoint();

    let result = traversal::bfs(&graph, &[v[0]], Direction::Out);
    let expected = [0i64, 1, 2, 3, 4];
    let mut visited = 0;
    for (i, &want) in expected.iter().enumerate() {
        let got = result.distance_of(v[i]);
        assert_eq!(got, Some(want), "distance to node {i}");
        if got.is_some() {
            visited += 1;
        }
    }
    assert_eq!(visited, 5);
}

/// S2 — PageRank pull, 4-node directed cycle converges to a uniform 0.25.
#[test]
fn s2_pagerank_pull_on_a_cycle() {
    let graph = small_graph();
    let v = nodes(&graph, 4);
    for i in 0..4usize {
        graph.add_edge(v[i], v[(i + 1) % 4]);
    }
    graph.checkpoint();

    let d = 0.85_f64;
    let n = 4usize;
    let mut rank = vec![1.0 / n as f64; n];
    for _ in 0..20 {
        let mut next = vec![(1.0 - d) / n as f64; n];
        for (i, &node) in v.iter().enumerate() {
            let out_degree = graph.out_degree(node).max(1) as f64;
            let contribution = d * rank[i] / out_degree;
            for target in graph.out_iter(node) {
                let j = v.iter().position(|&x| x == target).unwrap();
                next[j] += contribution;
            }
        }
        rank = next;
    }

    for (i, r) in rank.iter().enumerate() {
        assert!((r - 0.25).abs() < 1e-9, "node {i} rank {r} not within tolerance of 0.25");
    }
}

/// S3 — weighted single-source shortest paths via edge-property weights and
/// the fixed-size spinlock table analytics use for relaxation updates.
#[test]
fn s3_weighted_sssp() {
    let graph = small_graph();
    let v = nodes(&graph, 4);
    graph.declare_node_property("unused", PropWidth::W32); // exercise declare path
    let edges = [(0usize, 1usize, 2u64), (0, 2, 5), (1, 2, 1), (2, 3, 1)];
    for &(s, t, _) in &edges {
        graph.add_edge(v[s], v[t]);
    }
    graph.checkpoint();
    for &(s, t, w) in &edges {
        graph.set_edge_property("weight", v[s], v[t], PropValue::U64(w));
    }
    graph.checkpoint();

    let weight = |graph: &Graph, src: NodeId, dst: NodeId| -> u64 {
        match graph.edge_property("weight", src, dst) {
            Some(PropValue::U64(w)) => w,
            Some(PropValue::U32(w)) => w as u64,
            None => 1,
        }
    };

    const INF: u64 = u64::MAX;
    let mut dist = vec![INF; v.len()];
    dist[0] = 0;
    let spinlocks = levelgraph::traversal::spinlock::shared_table(16);
    // Bellman-Ford-style relaxation: small graph, so a fixed number of
    // full passes over every edge suffices and exercises the shared
    // per-vertex spinlock table the way SSSP-style kernels are expected to.
    for _ in 0..v.len() {
        for (i, &src) in v.iter().enumerate() {
            if dist[i] == INF {
                continue;
            }
            for dst in graph.out_iter(src) {
                let j = v.iter().position(|&x| x == dst).unwrap();
                let candidate = dist[i] + weight(&graph, src, dst);
                spinlocks.relax(dst, || {
                    if candidate < dist[j] {
                        dist[j] = candidate;
                    }
                });
            }
        }
    }

    assert_eq!(dist, vec![0, 2, 3, 4]);
    assert_eq!(*dist.iter().max().unwrap(), 4);
}

/// S4 — triangle counting on a complete graph of 5 vertices loaded
/// undirected-ordered (`src <= dst`), using the sorted-adjacency merge
/// invariant the snapshot builder guarantees.
#[test]
fn s4_triangle_counting_undirected_ordered() {
    let graph = small_graph();
    let v = nodes(&graph, 5);
    for i in 0..5usize {
        for j in (i + 1)..5usize {
            graph.add_edge(v[i], v[j]); // src <= dst: undirected_ordered encoding
        }
    }
    graph.checkpoint();

    let index_of: HashMap<NodeId, usize> = v.iter().enumerate().map(|(i, &n)| (n, i)).collect();
    let mut triangle_count = 0u64;
    for (u_idx, &u) in v.iter().enumerate() {
        let u_adj: Vec<usize> = graph.out_iter(u).iter().map(|n| index_of[n]).collect();
        debug_assert!(u_adj.windows(2).all(|w| w[0] < w[1]), "adjacency must be sorted ascending");
        for &w_idx in &u_adj {
            if w_idx <= u_idx {
                continue;
            }
            let w_node = v[w_idx];
            let w_adj: Vec<usize> = graph.out_iter(w_node).iter().map(|n| index_of[n]).collect();
            // merge-intersect u_adj and w_adj, both sorted ascending
            let (mut a, mut b) = (0, 0);
            while a < u_adj.len() && b < w_adj.len() {
                match u_adj[a].cmp(&w_adj[b]) {
                    std::cmp::Ordering::Equal => {
                        if u_adj[a] > w_idx {
                            triangle_count += 1;
                        }
                        a += 1;
                        b += 1;
                    }
                    std::cmp::Ordering::Less => a += 1,
                    std::cmp::Ordering::Greater => b += 1,
                }
            }
        }
    }

    assert_eq!(triangle_count, 10, "C(5,3) triangles in K5");
}

/// S5 — edge deletion across a snapshot boundary.
#[test]
fn s5_edge_deletion_across_snapshot() {
    let graph = small_graph();
    let v = nodes(&graph, 4);
    graph.add_edge(v[0], v[1]);
    graph.add_edge(v[0], v[2]);
    graph.add_edge(v[0], v[3]);
    graph.checkpoint();

    graph.delete_edge(v[0], v[2]);
    graph.checkpoint();

    let mut targets = graph.out_iter(v[0]);
    targets.sort();
    assert_eq!(targets, vec![v[1], v[3]]);
}

/// Deleting a node must hide it from the *other* endpoint of every edge it
/// was part of, not just its own adjacency record — both across a checkpoint
/// boundary and within the same pending writer session.
#[test]
fn s5b_delete_node_hides_it_from_other_endpoints_adjacency() {
    let graph = small_graph();
    let v = nodes(&graph, 3);
    graph.add_edge(v[0], v[1]);
    graph.add_edge(v[1], v[2]);
    graph.checkpoint();

    graph.delete_node(v[1]);
    graph.checkpoint();

    assert!(!graph.out_iter(v[0]).contains(&v[1]), "u's out-edges must not still list a deleted v");
    assert!(!graph.in_iter(v[2]).contains(&v[1]), "w's in-edges must not still list a deleted v");
}

/// Same as above, but the edge and the delete land in the same writer
/// session, before any checkpoint has flattened either.
#[test]
fn s5c_delete_node_same_session_as_pending_edge() {
    let graph = small_graph();
    let v = nodes(&graph, 2);
    graph.add_edge(v[0], v[1]);
    graph.delete_node(v[1]);
    graph.checkpoint();

    assert!(!graph.out_iter(v[0]).contains(&v[1]));
}

/// S6 — Tarjan's algorithm identifies the expected strongly-connected
/// components.
#[test]
fn s6_tarjan_scc() {
    let graph = small_graph();
    let v = nodes(&graph, 6);
    let edges = [(0, 1), (1, 2), (2, 0), (3, 4), (4, 3), (5, 3)];
    for &(s, t) in &edges {
        graph.add_edge(v[s], v[t]);
    }
    graph.checkpoint();

    let components = tarjan_scc(&graph, &v);
    let mut grouped: Vec<Vec<usize>> = components
        .into_iter()
        .map(|group| {
            let mut idxs: Vec<usize> = group.into_iter().map(|n| v.iter().position(|&x| x == n).unwrap()).collect();
            idxs.sort();
            idxs
        })
        .collect();
    grouped.sort();

    assert_eq!(grouped, vec![vec![0, 1, 2], vec![3, 4], vec![5]]);
}

/// Textbook recursive Tarjan SCC over the public out-edge iterator. The
/// graphs this is tested against are small (test fixtures, not production
/// inputs), so the DFS recursion here is plain and easy to check against the
/// algorithm's standard presentation, matching the design's framing of SCC
/// as a client-side consumer of the traversal/property APIs rather than a
/// core module with its own performance requirements.
fn tarjan_scc(graph: &Graph, vertices: &[NodeId]) -> Vec<Vec<NodeId>> {
    struct State {
        index: HashMap<NodeId, usize>,
        lowlink: HashMap<NodeId, usize>,
        on_stack: HashMap<NodeId, bool>,
        stack: Vec<NodeId>,
        next_index: usize,
        components: Vec<Vec<NodeId>>,
    }

    fn strongconnect(graph: &Graph, v: NodeId, state: &mut State) {
        state.index.insert(v, state.next_index);
        state.lowlink.insert(v, state.next_index);
        state.next_index += 1;
        state.stack.push(v);
        state.on_stack.insert(v, true);

        for w in graph.out_iter(v) {
            if !state.index.contains_key(&w) {
                strongconnect(graph, w, state);
                let w_low = state.lowlink[&w];
                let v_low = state.lowlink[&v];
                state.lowlink.insert(v, v_low.min(w_low));
            } else if *state.on_stack.get(&w).unwrap_or(&false) {
                let w_index = state.index[&w];
                let v_low = state.lowlink[&v];
                state.lowlink.insert(v, v_low.min(w_index));
            }
        }

        if state.lowlink[&v] == state.index[&v] {
            let mut component = Vec::new();
            loop {
                let w = state.stack.pop().unwrap();
                state.on_stack.insert(w, false);
                component.push(w);
                if w == v {
                    break;
                }
            }
            state.components.push(component);
        }
    }

    let mut state = State {
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashMap::new(),
        stack: Vec::new(),
        next_index: 0,
        components: Vec::new(),
    };
    for &v in vertices {
        if !state.index.contains_key(&v) {
            strongconnect(graph, v, &mut state);
        }
    }
    state.components
}

/// Boundary behavior: empty graph.
#[test]
fn boundary_empty_graph() {
    let graph = small_graph();
    assert_eq!(graph.max_nodes(), 0);
    assert_eq!(graph.num_levels(), 0);
    assert_eq!(graph.pick_random_node(), NodeId::NONE);
}

/// Boundary behavior: single vertex, no edges.
#[test]
fn boundary_single_vertex() {
    let graph = small_graph();
    let a = graph.add_node();
    graph.checkpoint();
    assert_eq!(graph.out_degree(a), 0);
    assert_eq!(graph.in_degree(a), 0);
}

/// Boundary behavior: sliding window of size 1 keeps only the newest level.
#[test]
fn boundary_sliding_window_size_one() {
    let config = EngineConfig {
        window_size: 1,
        ..EngineConfig::small()
    };
    let graph = Graph::in_memory(config);
    let v = nodes(&graph, 2);
    graph.add_edge(v[0], v[1]);
    graph.checkpoint();
    graph.checkpoint();
    graph.checkpoint();
    assert_eq!(graph.num_levels(), 1, "only the newest level stays live under window_size=1");
}
