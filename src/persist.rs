//! Directory persistence.
//!
//! Writes a small `manifest.json` (engine config, vertex count, declared
//! property columns, and a CRC32 per binary file) alongside raw
//! little-endian binary files for the resolved edge list and property
//! values. `open` replays the manifest against a fresh [`Graph`] and issues
//! one checkpoint, so what comes back is a graph with the same visible
//! state but a single published level — this trades away the original's
//! level history for a format that doesn't need to serialize page-manager
//! internals (see `DESIGN.md`).

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::model::{NodeId, PropWidth};
use crate::storage::property::PropValue;

const FORMAT_VERSION: u32 = 1;
const EDGES_FILE: &str = "edges.bin";

#[derive(Serialize, Deserialize)]
struct PropertyManifestEntry {
    name: String,
    width: PropWidthTag,
    file: String,
    crc32: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
enum PropWidthTag {
    W32,
    W64,
}

impl From<PropWidth> for PropWidthTag {
    fn from(w: PropWidth) -> Self {
        match w {
            PropWidth::W32 => PropWidthTag::W32,
            PropWidth::W64 => PropWidthTag::W64,
        }
    }
}

impl From<PropWidthTag> for PropWidth {
    fn from(w: PropWidthTag) -> Self {
        match w {
            PropWidthTag::W32 => PropWidth::W32,
            PropWidthTag::W64 => PropWidth::W64,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    config: EngineConfig,
    max_nodes: u64,
    edge_count: u64,
    edges_crc32: u32,
    node_properties: Vec<PropertyManifestEntry>,
    edge_properties: Vec<PropertyManifestEntry>,
}

/// Appends `value` (or the zero default for the given width, if absent) to
/// `bytes` as fixed-width little-endian, so every cell in a column occupies
/// the same number of bytes regardless of whether it was ever explicitly set.
fn write_prop_cell(bytes: &mut Vec<u8>, width: PropWidth, value: Option<PropValue>) {
    match width {
        PropWidth::W32 => {
            let raw = match value {
                Some(PropValue::U32(v)) => v,
                Some(PropValue::U64(_)) => unreachable!("column width enforced at the property-store layer"),
                None => 0,
            };
            bytes.extend_from_slice(&raw.to_le_bytes());
        }
        PropWidth::W64 => {
            let raw = match value {
                Some(PropValue::U64(v)) => v,
                Some(PropValue::U32(_)) => unreachable!("column width enforced at the property-store layer"),
                None => 0,
            };
            bytes.extend_from_slice(&raw.to_le_bytes());
        }
    }
}

/// Decodes a property column's raw bytes into fixed-width cells, matching
/// whatever width [`write_prop_cell`] encoded them with.
fn read_prop_cells(bytes: &[u8], width: PropWidth) -> impl Iterator<Item = PropValue> + '_ {
    let cell_size = match width {
        PropWidth::W32 => 4,
        PropWidth::W64 => 8,
    };
    bytes.chunks_exact(cell_size).map(move |chunk| match width {
        PropWidth::W32 => PropValue::U32(u32::from_le_bytes(chunk.try_into().unwrap())),
        PropWidth::W64 => PropValue::U64(u64::from_le_bytes(chunk.try_into().unwrap())),
    })
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

fn write_checked(path: &Path, bytes: &[u8]) -> Result<u32> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    Ok(checksum(bytes))
}

fn read_checked(path: &Path, expected_crc32: u32) -> Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let actual = checksum(&bytes);
    if actual != expected_crc32 {
        return Err(GraphError::Corruption(format!(
            "{}: crc32 mismatch (expected {expected_crc32:#x}, got {actual:#x})",
            path.display()
        )));
    }
    Ok(bytes)
}

/// Writes a consistent snapshot of `graph`'s current resolved state (all
/// published levels flattened with any pending writes) to `dir`, creating it
/// if necessary.
pub fn persist(graph: &Graph, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;

    let max_nodes = graph.max_nodes();
    let mut edge_bytes = Vec::with_capacity(max_nodes as usize * 8);
    let mut edge_count: u64 = 0;
    for idx in 0..max_nodes {
        let node = NodeId(idx);
        for target in graph.out_iter(node) {
            edge_bytes.extend_from_slice(&node.as_u64().to_le_bytes());
            edge_bytes.extend_from_slice(&target.as_u64().to_le_bytes());
            edge_count += 1;
        }
    }
    let edges_crc32 = write_checked(&dir.join(EDGES_FILE), &edge_bytes)?;

    let mut node_properties = Vec::new();
    for name in graph.node_property_names() {
        let entry = persist_node_column(graph, dir, &name)?;
        node_properties.push(entry);
    }
    let mut edge_properties = Vec::new();
    for name in graph.edge_property_names() {
        let entry = persist_edge_column(graph, dir, &name, max_nodes)?;
        edge_properties.push(entry);
    }

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        config: graph.config().clone(),
        max_nodes,
        edge_count,
        edges_crc32,
        node_properties,
        edge_properties,
    };
    let json = serde_json::to_vec_pretty(&manifest).map_err(|e| GraphError::Serialization(e.to_string()))?;
    fs::write(dir.join("manifest.json"), json)?;
    Ok(())
}

fn persist_node_column(graph: &Graph, dir: &Path, name: &str) -> Result<PropertyManifestEntry> {
    let max_nodes = graph.max_nodes();
    let width = graph.node_property_width(name).unwrap_or(PropWidth::W64);
    let mut bytes = Vec::new();
    for idx in 0..max_nodes {
        write_prop_cell(&mut bytes, width, graph.node_property(name, NodeId(idx)));
    }
    let file_name = format!("node_prop_{name}.bin");
    let crc32 = write_checked(&dir.join(&file_name), &bytes)?;
    Ok(PropertyManifestEntry {
        name: name.to_string(),
        width: width.into(),
        file: file_name,
        crc32,
    })
}

fn persist_edge_column(graph: &Graph, dir: &Path, name: &str, max_nodes: u64) -> Result<PropertyManifestEntry> {
    let width = graph.edge_property_width(name).unwrap_or(PropWidth::W64);
    let mut bytes = Vec::new();
    let mut edges = Vec::new();
    for idx in 0..max_nodes {
        let src = NodeId(idx);
        for dst in graph.out_iter(src) {
            edges.push((src, dst));
        }
    }
    for (src, dst) in &edges {
        write_prop_cell(&mut bytes, width, graph.edge_property(name, *src, *dst));
    }
    let file_name = format!("edge_prop_{name}.bin");
    let crc32 = write_checked(&dir.join(&file_name), &bytes)?;
    Ok(PropertyManifestEntry {
        name: name.to_string(),
        width: width.into(),
        file: file_name,
        crc32,
    })
}

/// Rebuilds a [`Graph`] from a directory written by [`persist`]. The result
/// has the same vertices, edges, and property values, folded into a single
/// published level via one checkpoint.
pub fn open(dir: &Path) -> Result<Graph> {
    let manifest_bytes = fs::read(dir.join("manifest.json"))?;
    let manifest: Manifest =
        serde_json::from_slice(&manifest_bytes).map_err(|e| GraphError::Serialization(e.to_string()))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(GraphError::Unsupported("persisted format version"));
    }

    let graph = Graph::in_memory(manifest.config.clone());
    for _ in 0..manifest.max_nodes {
        graph.add_node();
    }

    let edge_bytes = read_checked(&dir.join(EDGES_FILE), manifest.edges_crc32)?;
    if edge_bytes.len() as u64 != manifest.edge_count * 16 {
        return Err(GraphError::Corruption(format!(
            "edges.bin length {} does not match manifest edge_count {}",
            edge_bytes.len(),
            manifest.edge_count
        )));
    }
    let mut edges = Vec::with_capacity(manifest.edge_count as usize);
    for chunk in edge_bytes.chunks_exact(16) {
        let src = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
        let dst = u64::from_le_bytes(chunk[8..16].try_into().unwrap());
        let src = NodeId(src);
        let dst = NodeId(dst);
        graph.add_edge(src, dst);
        edges.push((src, dst));
    }

    for entry in &manifest.node_properties {
        let bytes = read_checked(&dir.join(&entry.file), entry.crc32)?;
        let width: PropWidth = entry.width.into();
        graph.declare_node_property(&entry.name, width);
        for (idx, value) in read_prop_cells(&bytes, width).enumerate() {
            graph.set_node_property(&entry.name, NodeId(idx as u64), value);
        }
    }
    for entry in &manifest.edge_properties {
        let bytes = read_checked(&dir.join(&entry.file), entry.crc32)?;
        let width: PropWidth = entry.width.into();
        for (i, value) in read_prop_cells(&bytes, width).enumerate() {
            let Some(&(src, dst)) = edges.get(i) else { break };
            graph.set_edge_property(&entry.name, src, dst, value);
        }
    }

    graph.checkpoint();
    Ok(graph)
}
