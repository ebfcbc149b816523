//! Simple example laying out a small random graph with ForceAtlas2.
//!
//! Run with: cargo run --example simple_layout

use std::time::Instant;
use atlas_layout_gpu::{sync, AttributedGraph, LayoutSettings};

fn main() {
    tracing_subscriber::fmt::init();

    let node_count = 1000;
    let edge_count = 2000;

    println!("Creating random graph with {} nodes and {} edges...", node_count, edge_count);

    let mut graph = AttributedGraph::new();
    for i in 0..node_count {
        let angle = (i as f32) * 0.1;
        let radius = 100.0 + (i as f32) * 0.5;
        graph
            .add_node(
                format!("n{i}"),
                radius * angle.cos() + (i as f32 * 13.37).sin() * 50.0,
                radius * angle.sin() + (i as f32 * 7.13).cos() * 50.0,
            )
            .expect("unique node keys");
    }

    // A path keeps the graph connected, the rest are pseudo-random chords.
    for i in 1..node_count {
        graph
            .add_edge(format!("n{}", i - 1), format!("n{i}"), 1.0)
            .expect("known endpoints");
    }
    for i in 0..(edge_count - node_count + 1) {
        let source = (i * 17) % node_count;
        let target = (i * 31 + 7) % node_count;
        if source != target {
            graph
                .add_edge(format!("n{source}"), format!("n{target}"), 1.0)
                .expect("known endpoints");
        }
    }

    println!("Initializing GPU layout...");

    let settings = LayoutSettings {
        iterations_per_step: 5,
        ..LayoutSettings::infer(node_count)
    };
    let mut layout = sync::new_layout(settings).expect("Failed to create GPU layout");

    println!("Running layout simulation...");

    let batches = 20;
    layout.start(&graph, batches).expect("Failed to start layout");
    let start = Instant::now();

    let mut batch = 0;
    while layout.tick(&mut graph).expect("Layout batch failed") {
        if batch % 5 == 0 {
            let (min_x, max_x, min_y, max_y) = graph.iter().fold(
                (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
                |(min_x, max_x, min_y, max_y), n| {
                    (min_x.min(n.x), max_x.max(n.x), min_y.min(n.y), max_y.max(n.y))
                },
            );
            println!(
                "Batch {}: bounds = ({:.1}, {:.1}) to ({:.1}, {:.1})",
                batch, min_x, min_y, max_x, max_y
            );
        }
        batch += 1;
    }

    let elapsed = start.elapsed();
    let passes = layout.iteration();
    let rate = passes as f64 / elapsed.as_secs_f64();

    println!("\nCompleted {} physics passes in {:.2?}", passes, elapsed);
    println!("Average: {:.1} passes/sec ({:.1} ms/pass)", rate, 1000.0 / rate);

    println!("\nFinal positions (first 5 nodes):");
    for node in graph.iter().take(5) {
        println!("  {}: ({:.2}, {:.2})", node.key, node.x, node.y);
    }
}
