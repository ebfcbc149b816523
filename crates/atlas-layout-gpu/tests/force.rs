//! ForceAtlas2 force laws and integration checked against a host computation.
//!
//! Run with: `cargo test --package atlas-layout-gpu --test force`

mod common;

use std::sync::Arc;

use atlas_layout_gpu::{
    AttributedGraph, ForceAtlas2, GpuContext, GraphSnapshot, LayoutSettings, Movement, NodeData,
};

/// Five weighted nodes; `d` and `e` overlap when sizes are taken into account.
fn weighted_graph() -> AttributedGraph {
    let mut graph = AttributedGraph::new();
    for (key, x, y, size) in [
        ("a", 0.0, 0.0, 1.0),
        ("b", 5.0, 1.0, 1.5),
        ("c", -4.0, 3.0, 0.5),
        ("d", 2.0, -6.0, 1.0),
        ("e", 2.6, -6.4, 1.0),
    ] {
        graph
            .insert(NodeData {
                key: key.into(),
                x,
                y,
                size,
                fixed: false,
            })
            .unwrap();
    }
    for (a, b, weight) in [
        ("a", "b", 2.0),
        ("a", "c", 0.5),
        ("b", "d", 1.5),
        ("d", "e", 1.0),
        ("c", "e", 3.0),
    ] {
        graph.add_edge(a, b, weight).unwrap();
    }
    graph
}

fn unclamped(settings: LayoutSettings) -> LayoutSettings {
    LayoutSettings {
        max_force: 1.0e9,
        scaling_ratio: 2.0,
        ..settings
    }
}

fn repel(
    settings: &LayoutSettings,
    node: (f64, f64, f64, f64),
    other: (f64, f64, f64, f64),
) -> (f64, f64) {
    let (dx, dy) = (node.0 - other.0, node.1 - other.1);
    let dist = (dx * dx + dy * dy).sqrt();
    if dist == 0.0 {
        return (0.0, 0.0);
    }
    let strength = f64::from(settings.scaling_ratio) * node.2 * other.2;
    let factor = if settings.adjust_sizes {
        let gap = dist - node.3 - other.3;
        if gap > 0.0 {
            strength / (gap * gap)
        } else if gap < 0.0 {
            100.0 * strength
        } else {
            0.0
        }
    } else {
        strength / (dist * dist)
    };
    (dx * factor, dy * factor)
}

fn attract(
    settings: &LayoutSettings,
    compensation: f64,
    node: (f64, f64, f64, f64),
    other: (f64, f64, f64, f64),
    weight: f64,
) -> (f64, f64) {
    let (dx, dy) = (node.0 - other.0, node.1 - other.1);
    let mut dist = (dx * dx + dy * dy).sqrt();
    if settings.adjust_sizes {
        dist -= node.3 + other.3;
        if dist <= 0.0 {
            return (0.0, 0.0);
        }
    }
    let influence = f64::from(settings.edge_weight_influence);
    let mut coefficient = if influence == 0.0 {
        1.0
    } else if influence == 1.0 {
        weight
    } else {
        weight.powf(influence)
    };
    if settings.outbound_attraction_distribution {
        coefficient *= compensation / node.2;
    }
    if settings.lin_log_mode {
        if dist <= 0.0 {
            return (0.0, 0.0);
        }
        coefficient *= (1.0 + dist).ln() / dist;
    }
    (-dx * coefficient, -dy * coefficient)
}

/// Net force per node for one pass over `snapshot`, before clamping.
fn reference_forces(snapshot: &GraphSnapshot, settings: &LayoutSettings) -> Vec<(f64, f64)> {
    let bodies: Vec<(f64, f64, f64, f64)> = snapshot
        .nodes
        .iter()
        .map(|n| {
            (
                f64::from(n.x),
                f64::from(n.y),
                f64::from(n.mass),
                f64::from(n.size),
            )
        })
        .collect();
    let compensation = f64::from(snapshot.outbound_compensation);
    let gravity = f64::from(settings.gravity);

    bodies
        .iter()
        .enumerate()
        .map(|(i, &node)| {
            let mut force = (0.0, 0.0);
            for (j, &other) in bodies.iter().enumerate() {
                if i != j {
                    let f = repel(settings, node, other);
                    force = (force.0 + f.0, force.1 + f.1);
                }
            }

            let origin = (node.0 * node.0 + node.1 * node.1).sqrt();
            if settings.strong_gravity_mode {
                force.0 -= node.0 * node.2 * gravity;
                force.1 -= node.1 * node.2 * gravity;
            } else if origin > 0.0 {
                force.0 -= node.0 * node.2 * gravity / origin;
                force.1 -= node.1 * node.2 * gravity / origin;
            }

            let range = snapshot.adjacency[i];
            let first = range.offset as usize;
            for edge in &snapshot.edges[first..first + range.count as usize] {
                let other = bodies[edge.target as usize];
                let f = attract(settings, compensation, node, other, f64::from(edge.weight));
                force = (force.0 + f.0, force.1 + f.1);
            }
            force
        })
        .collect()
}

/// Adaptive speed and next convergence for one node.
fn reference_speed(
    settings: &LayoutSettings,
    mass: f64,
    previous: (f64, f64),
    force: (f64, f64),
    convergence: f64,
) -> (f64, f64) {
    let swinging = mass * ((previous.0 - force.0).powi(2) + (previous.1 - force.1).powi(2)).sqrt();
    let traction = ((previous.0 + force.0).powi(2) + (previous.1 + force.1).powi(2)).sqrt() * 0.5;
    let damping = 1.0 / (1.0 + swinging.sqrt());
    if settings.adjust_sizes {
        return (0.1 * (1.0 + traction).ln() * damping, convergence);
    }
    let speed = convergence * (1.0 + traction).ln() * damping;
    let magnitude_sq = force.0 * force.0 + force.1 * force.1;
    let next = (speed * magnitude_sq * damping).sqrt().clamp(0.0, 1.0);
    (speed, next)
}

fn assert_close(actual: f32, expected: f64, what: &str) {
    let tolerance = 1e-3 * (1.0 + expected.abs());
    assert!(
        (f64::from(actual) - expected).abs() <= tolerance,
        "{what}: gpu {actual} vs host {expected}"
    );
}

fn assert_forces_match(movements: &[Movement], expected: &[(f64, f64)], mode: &str) {
    assert_eq!(movements.len(), expected.len());
    for (i, (movement, force)) in movements.iter().zip(expected).enumerate() {
        assert_close(movement.dx, force.0, &format!("{mode} node {i} dx"));
        assert_close(movement.dy, force.1, &format!("{mode} node {i} dy"));
    }
}

fn engine(ctx: &Arc<GpuContext>, settings: LayoutSettings) -> ForceAtlas2 {
    ForceAtlas2::with_context(ctx.clone(), settings).unwrap()
}

fn modes() -> Vec<(&'static str, LayoutSettings)> {
    let base = LayoutSettings::default();
    vec![
        ("default", unclamped(base.clone())),
        (
            "linLog",
            unclamped(LayoutSettings {
                lin_log_mode: true,
                ..base.clone()
            }),
        ),
        (
            "adjustSizes",
            unclamped(LayoutSettings {
                adjust_sizes: true,
                ..base.clone()
            }),
        ),
        (
            "outbound",
            unclamped(LayoutSettings {
                outbound_attraction_distribution: true,
                ..base.clone()
            }),
        ),
        (
            "strongGravity",
            unclamped(LayoutSettings {
                strong_gravity_mode: true,
                gravity: 0.3,
                edge_weight_influence: 0.5,
                ..base.clone()
            }),
        ),
        (
            "unweighted",
            unclamped(LayoutSettings {
                edge_weight_influence: 0.0,
                ..base.clone()
            }),
        ),
        (
            "combined",
            unclamped(LayoutSettings {
                lin_log_mode: true,
                adjust_sizes: true,
                outbound_attraction_distribution: true,
                strong_gravity_mode: true,
                edge_weight_influence: 2.0,
                ..base
            }),
        ),
    ]
}

#[test]
fn test_first_pass_forces_match_host_reference() {
    let Some(ctx) = common::gpu().map(Arc::new) else { return };

    let graph = weighted_graph();
    let snapshot = GraphSnapshot::capture(&graph).unwrap();
    for (mode, settings) in modes() {
        let expected = reference_forces(&snapshot, &settings);
        let mut engine = engine(&ctx, settings);
        let mut moved = graph.clone();
        engine.run(&mut moved).unwrap();
        assert_forces_match(&engine.movements().unwrap(), &expected, mode);
    }
}

#[test]
fn test_adjust_sizes_pushes_overlapping_nodes_apart() {
    let Some(ctx) = common::gpu().map(Arc::new) else { return };

    let mut graph = weighted_graph();
    let settings = unclamped(LayoutSettings {
        adjust_sizes: true,
        ..LayoutSettings::default()
    });
    let mut engine = engine(&ctx, settings);
    engine.run(&mut graph).unwrap();

    let d = graph.node(&"d".into()).unwrap();
    let e = graph.node(&"e".into()).unwrap();
    let before = (0.6f32 * 0.6 + 0.4 * 0.4).sqrt();
    let after = ((e.x - d.x).powi(2) + (e.y - d.y).powi(2)).sqrt();
    assert!(after > before, "{after} <= {before}");
}

#[test]
fn test_second_pass_speed_and_convergence() {
    let Some(ctx) = common::gpu().map(Arc::new) else { return };

    for (mode, settings) in [
        (
            "default",
            LayoutSettings {
                slow_down: 2.0,
                ..unclamped(LayoutSettings::default())
            },
        ),
        (
            "adjustSizes",
            LayoutSettings {
                slow_down: 2.0,
                adjust_sizes: true,
                ..unclamped(LayoutSettings::default())
            },
        ),
    ] {
        let mut graph = weighted_graph();
        let mut engine = engine(&ctx, settings.clone());
        engine.start(&graph, 2).unwrap();

        assert!(engine.tick(&mut graph).unwrap());
        let first = engine.movements().unwrap();
        let snapshot = GraphSnapshot::capture(&graph).unwrap();
        let expected = reference_forces(&snapshot, &settings);

        assert!(!engine.tick(&mut graph).unwrap());
        let second = engine.movements().unwrap();
        assert_forces_match(&second, &expected, mode);

        let positions = engine.positions().unwrap();
        for (i, node) in snapshot.nodes.iter().enumerate() {
            let previous = (f64::from(first[i].dx), f64::from(first[i].dy));
            let force = (f64::from(second[i].dx), f64::from(second[i].dy));
            let (speed, convergence) = reference_speed(
                &settings,
                f64::from(node.mass),
                previous,
                force,
                f64::from(first[i].convergence),
            );
            let step = speed / f64::from(settings.slow_down);
            assert_close(
                second[i].convergence,
                convergence,
                &format!("{mode} node {i} convergence"),
            );
            assert_close(
                positions[i].x,
                f64::from(node.x) + force.0 * step,
                &format!("{mode} node {i} x"),
            );
            assert_close(
                positions[i].y,
                f64::from(node.y) + force.1 * step,
                &format!("{mode} node {i} y"),
            );
        }
    }
}
