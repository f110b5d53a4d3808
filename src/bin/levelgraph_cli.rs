//! Administrative CLI for the LevelGraph storage engine.
//!
//! This binary is an out-of-scope collaborator (§6/§9 of the design): it
//! exercises the public `Graph`/`Traversal`/`persist` APIs with a handful of
//! subcommands, but none of its flags or output formats are part of the
//! core engine's contract.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use levelgraph::config::EngineConfig;
use levelgraph::graph::Graph;
use levelgraph::model::{Direction, NodeId};
use levelgraph::traversal;

#[derive(Parser, Debug)]
#[command(name = "levelgraph-cli", version, about = "Administrative CLI for the LevelGraph storage engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a text edge list, checkpoint it, and persist it to a directory.
    Ingest(IngestCmd),
    /// Print level/vertex/edge counts for a persisted graph.
    Stats(StatsCmd),
    /// Run a BFS from a source vertex and print per-vertex distances.
    Bfs(BfsCmd),
}

#[derive(clap::Args, Debug)]
struct IngestCmd {
    /// Text file of whitespace-separated `src dst` pairs, one edge per line.
    #[arg(long, value_name = "FILE")]
    edges: PathBuf,

    /// Output directory for the persisted snapshot.
    #[arg(long, value_name = "DIR")]
    out: PathBuf,

    /// Ingest direction handling for each input triple.
    #[arg(long, value_enum, default_value_t = DirectionMode::Directed)]
    direction: DirectionMode,

    /// Drop duplicate edges within the ingested batch.
    #[arg(long)]
    deduplicate: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DirectionMode {
    Directed,
    UndirectedDouble,
    UndirectedOrdered,
}

#[derive(clap::Args, Debug)]
struct StatsCmd {
    /// Directory previously written by `ingest`.
    #[arg(value_name = "DIR")]
    dir: PathBuf,
}

#[derive(clap::Args, Debug)]
struct BfsCmd {
    /// Directory previously written by `ingest`.
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// Source vertex id to traverse from.
    #[arg(long)]
    source: u64,

    /// Traverse in-edges instead of out-edges.
    #[arg(long)]
    reverse: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Ingest(cmd) => run_ingest(cmd),
        Command::Stats(cmd) => run_stats(cmd),
        Command::Bfs(cmd) => run_bfs(cmd),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(msg)) => {
            eprintln!("usage error: {msg}");
            ExitCode::from(1)
        }
        Err(CliError::Io(err)) => {
            eprintln!("io error: {err}");
            ExitCode::from(1)
        }
        Err(CliError::Internal(msg)) => {
            eprintln!("internal error: {msg}");
            ExitCode::from(2)
        }
    }
}

enum CliError {
    Usage(String),
    Io(std::io::Error),
    Internal(String),
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<levelgraph::GraphError> for CliError {
    fn from(err: levelgraph::GraphError) -> Self {
        CliError::Internal(err.to_string())
    }
}

/// Parses one whitespace-separated `src dst` line, rejecting anything else.
fn parse_edge_line(line: &str) -> Result<(u64, u64), CliError> {
    let mut parts = line.split_whitespace();
    let src = parts
        .next()
        .ok_or_else(|| CliError::Usage(format!("malformed edge line: {line:?}")))?;
    let dst = parts
        .next()
        .ok_or_else(|| CliError::Usage(format!("malformed edge line: {line:?}")))?;
    let src: u64 = src
        .parse()
        .map_err(|_| CliError::Usage(format!("not a valid node id: {src:?}")))?;
    let dst: u64 = dst
        .parse()
        .map_err(|_| CliError::Usage(format!("not a valid node id: {dst:?}")))?;
    Ok((src, dst))
}

fn run_ingest(cmd: IngestCmd) -> Result<(), CliError> {
    let file = std::fs::File::open(&cmd.edges)?;
    let reader = std::io::BufReader::new(file);

    let mut raw_edges = Vec::new();
    let mut max_node = 0u64;
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (src, dst) = parse_edge_line(line)?;
        max_node = max_node.max(src).max(dst);
        raw_edges.push((src, dst));
    }

    let mut directed_edges = Vec::with_capacity(raw_edges.len() * 2);
    for (src, dst) in raw_edges {
        match cmd.direction {
            DirectionMode::Directed => directed_edges.push((src, dst)),
            DirectionMode::UndirectedDouble => {
                directed_edges.push((src, dst));
                directed_edges.push((dst, src));
            }
            DirectionMode::UndirectedOrdered => {
                let (lo, hi) = if src <= dst { (src, dst) } else { (dst, src) };
                directed_edges.push((lo, hi));
            }
        }
    }

    if cmd.deduplicate {
        let mut seen = std::collections::HashSet::new();
        directed_edges.retain(|pair| seen.insert(*pair));
    }

    let graph = Graph::in_memory(EngineConfig::default());
    for _ in 0..=max_node {
        graph.add_node();
    }
    for (src, dst) in &directed_edges {
        graph.add_edge(NodeId(*src), NodeId(*dst));
    }
    let stats = graph.checkpoint();
    tracing::info!(
        new_level = stats.new_level,
        out_edges_added = stats.out_edges_added,
        "ingest checkpoint published"
    );

    levelgraph::persist::persist(&graph, &cmd.out)?;
    println!(
        "ingested {} vertices, {} edges -> {}",
        graph.max_nodes(),
        stats.out_edges_added,
        cmd.out.display()
    );
    Ok(())
}

fn run_stats(cmd: StatsCmd) -> Result<(), CliError> {
    let graph = levelgraph::persist::open(&cmd.dir)?;
    let summary = graph.level_summary();
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "num_levels:     {}", summary.num_levels)?;
    writeln!(stdout, "vertex_count:   {}", summary.vertex_count)?;
    writeln!(stdout, "out_edge_slots: {}", summary.out_edge_slots)?;
    writeln!(stdout, "in_edge_slots:  {}", summary.in_edge_slots)?;
    writeln!(stdout, "min_level:      {}", graph.min_level())?;
    Ok(())
}

fn run_bfs(cmd: BfsCmd) -> Result<(), CliError> {
    let graph = levelgraph::persist::open(&cmd.dir)?;
    let source = NodeId(cmd.source);
    if source.as_u64() >= graph.max_nodes() {
        return Err(CliError::Usage(format!(
            "source {} out of range (max_nodes={})",
            cmd.source,
            graph.max_nodes()
        )));
    }
    let direction = if cmd.reverse { Direction::In } else { Direction::Out };
    let result = traversal::bfs(&graph, &[source], direction);

    let mut stdout = std::io::stdout().lock();
    for idx in 0..graph.max_nodes() {
        let node = NodeId(idx);
        match result.distance_of(node) {
            Some(d) => writeln!(stdout, "{idx}\t{d}")?,
            None => writeln!(stdout, "{idx}\tunreachable")?,
        }
    }
    Ok(())
}
