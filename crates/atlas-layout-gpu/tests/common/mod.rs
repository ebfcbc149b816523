//! Shared helpers for the GPU integration tests.

#![allow(dead_code)]

use std::sync::Once;

use atlas_layout_gpu::{AttributedGraph, GpuContext, NodeRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A device, or `None` when the host exposes no adapter (the test then
/// returns early).
pub fn gpu() -> Option<GpuContext> {
    init_tracing();
    match pollster::block_on(GpuContext::new()) {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

/// Nodes uniformly spread over `[-spread, spread]²` with masses in [1, 3).
pub fn random_nodes(count: usize, seed: u64, spread: f32) -> Vec<NodeRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| NodeRecord {
            x: rng.random_range(-spread..spread),
            y: rng.random_range(-spread..spread),
            mass: rng.random_range(1.0..3.0),
            size: 1.0,
        })
        .collect()
}

/// Unit-mass node at `(x, y)`.
pub fn unit_node(x: f32, y: f32) -> NodeRecord {
    NodeRecord {
        x,
        y,
        mass: 1.0,
        size: 1.0,
    }
}

/// Random graph: a path through every node plus extra seeded edges.
pub fn random_graph(nodes: usize, extra_edges: usize, seed: u64, spread: f32) -> AttributedGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = AttributedGraph::new();
    for i in 0..nodes {
        graph
            .add_node(
                format!("n{i}"),
                rng.random_range(-spread..spread),
                rng.random_range(-spread..spread),
            )
            .unwrap();
    }
    for i in 1..nodes {
        graph
            .add_edge(format!("n{}", i - 1), format!("n{i}"), 1.0)
            .unwrap();
    }
    for _ in 0..extra_edges {
        let a = rng.random_range(0..nodes);
        let b = rng.random_range(0..nodes);
        if a != b {
            graph
                .add_edge(format!("n{a}"), format!("n{b}"), rng.random_range(0.5..2.0))
                .unwrap();
        }
    }
    graph
}

/// Two tight clusters of `per_cluster` edgeless nodes at `(±offset, 0)`,
/// listed cluster by cluster.
pub fn two_clusters(per_cluster: usize, offset: f32, seed: u64) -> AttributedGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = AttributedGraph::new();
    for (cluster, center) in [-offset, offset].into_iter().enumerate() {
        for i in 0..per_cluster {
            graph
                .add_node(
                    format!("c{cluster}_{i}"),
                    center + rng.random_range(-5.0..5.0),
                    rng.random_range(-5.0..5.0),
                )
                .unwrap();
        }
    }
    graph
}

/// `count` edgeless nodes uniformly spread over `[-spread, spread]²`.
pub fn scatter(count: usize, seed: u64, spread: f32) -> AttributedGraph {
    let mut graph = AttributedGraph::new();
    for (i, node) in random_nodes(count, seed, spread).into_iter().enumerate() {
        graph.add_node(format!("p{i}"), node.x, node.y).unwrap();
    }
    graph
}
