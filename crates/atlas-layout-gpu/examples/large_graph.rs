//! Large graph benchmark comparing repulsion strategies at 9000 nodes.
//!
//! Run with: cargo run --example large_graph --release

use std::sync::Arc;
use std::time::Instant;
use atlas_layout_gpu::{sync, AttributedGraph, ForceAtlas2, LayoutSettings, RepulsionSettings};

fn build_graph(node_count: usize, edge_count: usize) -> AttributedGraph {
    let mut graph = AttributedGraph::new();
    for i in 0..node_count {
        let angle = (i as f32) * 0.1;
        let radius = 200.0 + (i as f32) * 0.3;
        graph
            .add_node(
                format!("n{i}"),
                radius * angle.cos() + (i as f32 * 13.37).sin() * 100.0,
                radius * angle.sin() + (i as f32 * 7.13).cos() * 100.0,
            )
            .expect("unique node keys");
    }
    for i in 1..node_count {
        graph
            .add_edge(format!("n{}", i - 1), format!("n{i}"), 1.0)
            .expect("known endpoints");
    }
    for i in 0..edge_count - (node_count - 1) {
        let source = (i * 17) % node_count;
        let target = (i * 31 + 7) % node_count;
        if source != target {
            graph
                .add_edge(format!("n{source}"), format!("n{target}"), 1.0)
                .expect("known endpoints");
        }
    }
    graph
}

fn main() {
    tracing_subscriber::fmt::init();

    let node_count = 9000;
    let edge_count = 9000;

    println!("=== GPU ForceAtlas2 Benchmark ===");
    println!("Graph: {} nodes, {} edges", node_count, edge_count);
    println!();

    let ctx = Arc::new(sync::new_context().expect("Failed to create GPU context"));
    let strategies = [
        RepulsionSettings::QuadTree {
            depth: 4,
            theta: 0.5,
        },
        RepulsionSettings::KMeans {
            centroids: 64,
            steps: 1,
        },
        RepulsionSettings::KMeansGrouped {
            centroids: 64,
            steps: 1,
        },
        RepulsionSettings::AllPairs,
    ];

    for repulsion in strategies {
        let mut graph = build_graph(node_count, edge_count);
        let settings = LayoutSettings {
            repulsion: repulsion.clone(),
            iterations_per_step: 10,
            await_device: true,
            ..LayoutSettings::infer(node_count)
        };
        let mut layout =
            ForceAtlas2::with_context(ctx.clone(), settings).expect("Failed to create layout");

        // Warm up compiles every kernel.
        layout.run(&mut graph).expect("Warm-up batch failed");

        let batches = 10;
        layout.start(&graph, batches).expect("Failed to start layout");
        let start = Instant::now();
        while layout.tick(&mut graph).expect("Layout batch failed") {}
        let elapsed = start.elapsed();

        let passes = layout.iteration();
        let rate = passes as f64 / elapsed.as_secs_f64();
        let (min_x, max_x, min_y, max_y) = graph.iter().fold(
            (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
            |(min_x, max_x, min_y, max_y), n| {
                (min_x.min(n.x), max_x.max(n.x), min_y.min(n.y), max_y.max(n.y))
            },
        );

        println!("--- {} ---", repulsion.kind());
        println!("  Passes:        {}", passes);
        println!("  Total time:    {:.2?}", elapsed);
        println!("  Passes/s:      {:.1}", rate);
        println!("  Layout size:   {:.0} x {:.0}", max_x - min_x, max_y - min_y);
        println!();
    }
}
