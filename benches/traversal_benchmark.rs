#![allow(clippy::uninlined_format_args)]

use std::time::Instant;

use levelgraph::config::EngineConfig;
use levelgraph::graph::Graph;
use levelgraph::model::{Direction, NodeId};
use levelgraph::traversal;

fn setup_chain_graph(length: u64) -> Graph {
    let graph = Graph::in_memory(EngineConfig::large_graph());
    for _ in 0..length {
        graph.add_node();
    }
    for i in 0..length.saturating_sub(1) {
        graph.add_edge(NodeId(i), NodeId(i + 1));
    }
    graph.checkpoint();
    graph
}

fn setup_star_graph(neighbor_count: u64) -> (Graph, NodeId) {
    let graph = Graph::in_memory(EngineConfig::large_graph());
    let center = graph.add_node();
    for _ in 0..neighbor_count {
        let leaf = graph.add_node();
        graph.add_edge(center, leaf);
    }
    graph.checkpoint();
    (graph, center)
}

fn setup_social_graph(user_count: usize, avg_friends: usize) -> (Graph, Vec<NodeId>) {
    let graph = Graph::in_memory(EngineConfig::large_graph());
    let mut user_ids = Vec::with_capacity(user_count);
    for _ in 0..user_count {
        user_ids.push(graph.add_node());
    }

    use rand::Rng;
    let mut rng = rand::thread_rng();
    for i in 0..user_count {
        let friend_count = rng.gen_range(avg_friends / 2..avg_friends * 2);
        for _ in 0..friend_count {
            let friend_idx = rng.gen_range(0..user_count);
            if friend_idx != i {
                graph.add_edge(user_ids[i], user_ids[friend_idx]);
            }
        }
    }
    graph.checkpoint();
    (graph, user_ids)
}

fn bench_out_iter() {
    println!("\n=== out_iter Benchmark ===");
    for neighbor_count in [10, 100, 1000] {
        let (graph, center) = setup_star_graph(neighbor_count);
        let iterations = 1000;
        let start = Instant::now();
        for _ in 0..iterations {
            let _ = graph.out_iter(center);
        }
        let duration = start.elapsed();
        println!(
            "  {} neighbors: {:.3}ms per op ({:.0} ops/sec)",
            neighbor_count,
            duration.as_secs_f64() * 1000.0 / iterations as f64,
            iterations as f64 / duration.as_secs_f64()
        );
    }
}

fn bench_bfs() {
    println!("\n=== BFS Traversal Benchmark ===");
    for (user_count, avg_friends) in [(100, 10), (1000, 10), (5000, 20)] {
        let (graph, user_ids) = setup_social_graph(user_count, avg_friends);
        let iterations = 20;
        let start = Instant::now();
        for _ in 0..iterations {
            let _ = traversal::bfs(&graph, &[user_ids[0]], Direction::Out);
        }
        let duration = start.elapsed();
        println!(
            "  {} users / avg {}: {:.3}ms per op ({:.0} ops/sec)",
            user_count,
            avg_friends,
            duration.as_secs_f64() * 1000.0 / iterations as f64,
            iterations as f64 / duration.as_secs_f64()
        );
    }
}

fn bench_dfs() {
    println!("\n=== DFS Traversal Benchmark ===");
    for length in [100, 1000, 10_000] {
        let graph = setup_chain_graph(length);
        let iterations = 50;
        let start = Instant::now();
        for _ in 0..iterations {
            let _ = traversal::dfs(&graph, &[NodeId(0)], Direction::Out);
        }
        let duration = start.elapsed();
        println!(
            "  chain length {}: {:.3}ms per op ({:.0} ops/sec)",
            length,
            duration.as_secs_f64() * 1000.0 / iterations as f64,
            iterations as f64 / duration.as_secs_f64()
        );
    }
}

fn bench_frontier_state_transitions() {
    println!("\n=== Adaptive Frontier State Machine Benchmark ===");
    for neighbor_count in [50, 2000, 50_000] {
        let (graph, center) = setup_star_graph(neighbor_count);
        let iterations = 20;
        let start = Instant::now();
        for _ in 0..iterations {
            let _ = traversal::bfs(&graph, &[center], Direction::Out);
        }
        let duration = start.elapsed();
        println!(
            "  star with {} leaves: {:.3}ms per op ({:.0} ops/sec)",
            neighbor_count,
            duration.as_secs_f64() * 1000.0 / iterations as f64,
            iterations as f64 / duration.as_secs_f64()
        );
    }
}

fn main() {
    println!("LevelGraph Traversal Benchmarks");
    println!("================================");

    bench_out_iter();
    bench_bfs();
    bench_dfs();
    bench_frontier_state_transitions();

    println!("\nAll traversal benchmarks completed");
}
