//! Host-side packing of graph data into GPU element arrays.
//!
//! Every kernel buffer is laid out as a square grid of elements, the side
//! being the smallest integer whose square holds all elements. Kernels are
//! dispatched over that grid and discard cells past the element count.

use atlas_graph_core::LayoutGraph;

use crate::{AdjacencyRange, EdgeRecord, LayoutError, Movement, NodeRecord, Result};

/// Smallest square side whose area holds `count` elements (at least 1).
pub fn square_side(count: usize) -> u32 {
    if count <= 1 {
        return 1;
    }
    let mut side = (count as f64).sqrt() as usize;
    while side * side < count {
        side += 1;
    }
    while side > 1 && (side - 1) * (side - 1) >= count {
        side -= 1;
    }
    side as u32
}

/// Node and edge arrays captured from a host graph at layout start.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeRecord>,
    pub movement: Vec<Movement>,
    pub adjacency: Vec<AdjacencyRange>,
    /// Each undirected edge appears twice, grouped by source node.
    pub edges: Vec<EdgeRecord>,
    /// Mean node mass, used by outbound attraction distribution.
    pub outbound_compensation: f32,
}

impl GraphSnapshot {
    /// Snapshot `graph` into packed records.
    pub fn capture<G: LayoutGraph>(graph: &G) -> Result<Self> {
        let node_count = graph.node_count();
        if node_count == 0 {
            return Err(LayoutError::InvalidGraph("No nodes".into()));
        }

        let mut nodes = vec![NodeRecord::default(); node_count];
        let mut movement = vec![Movement::default(); node_count];
        let mut seen = vec![false; node_count];
        for node in graph.nodes() {
            if node.index >= node_count || seen[node.index] {
                return Err(LayoutError::InvalidGraph(format!(
                    "node index {} is out of range or repeated",
                    node.index
                )));
            }
            if !node.x.is_finite() || !node.y.is_finite() || !node.size.is_finite() {
                return Err(LayoutError::InvalidGraph(format!(
                    "node {} has a non-finite attribute",
                    node.index
                )));
            }
            seen[node.index] = true;
            nodes[node.index] = NodeRecord {
                x: node.x,
                y: node.y,
                mass: 1.0,
                size: node.size,
            };
            movement[node.index] = Movement {
                dx: 0.0,
                dy: 0.0,
                convergence: 1.0,
                fixed: if node.fixed { 1.0 } else { 0.0 },
            };
        }
        if let Some(missing) = seen.iter().position(|seen| !seen) {
            return Err(LayoutError::InvalidGraph(format!(
                "node index {missing} was never yielded"
            )));
        }

        let mut neighbors: Vec<Vec<EdgeRecord>> = vec![Vec::new(); node_count];
        for edge in graph.edges() {
            if edge.source >= node_count || edge.target >= node_count {
                return Err(LayoutError::InvalidGraph(format!(
                    "edge {} -> {} references a missing node",
                    edge.source, edge.target
                )));
            }
            if !edge.weight.is_finite() || edge.weight <= 0.0 {
                return Err(LayoutError::InvalidGraph(format!(
                    "edge {} -> {} has weight {}",
                    edge.source, edge.target, edge.weight
                )));
            }
            if edge.source == edge.target {
                tracing::debug!(node = edge.source, "Skipping self loop");
                continue;
            }
            nodes[edge.source].mass += edge.weight;
            nodes[edge.target].mass += edge.weight;
            neighbors[edge.source].push(EdgeRecord {
                target: edge.target as f32,
                weight: edge.weight,
            });
            neighbors[edge.target].push(EdgeRecord {
                target: edge.source as f32,
                weight: edge.weight,
            });
        }

        let mut adjacency = Vec::with_capacity(node_count);
        let mut edges = Vec::with_capacity(neighbors.iter().map(Vec::len).sum());
        for list in neighbors {
            adjacency.push(AdjacencyRange {
                offset: edges.len() as f32,
                count: list.len() as f32,
            });
            edges.extend(list);
        }

        let total_mass: f32 = nodes.iter().map(|node| node.mass).sum();

        Ok(Self {
            outbound_compensation: total_mass / node_count as f32,
            nodes,
            movement,
            adjacency,
            edges,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Directed edge records (twice the undirected edge count).
    pub fn edge_records(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_graph_core::AttributedGraph;

    #[test]
    fn test_square_side() {
        assert_eq!(square_side(0), 1);
        assert_eq!(square_side(1), 1);
        assert_eq!(square_side(2), 2);
        assert_eq!(square_side(4), 2);
        assert_eq!(square_side(5), 3);
        assert_eq!(square_side(10_000), 100);
        assert_eq!(square_side(10_001), 101);
    }

    #[test]
    fn test_capture_builds_symmetric_adjacency() {
        let mut graph = AttributedGraph::new();
        graph.add_node("a", 0.0, 0.0).unwrap();
        graph.add_node("b", 1.0, 0.0).unwrap();
        graph.add_node("c", 2.0, 0.0).unwrap();
        graph.add_edge("a", "b", 2.0).unwrap();
        graph.add_edge("b", "c", 1.0).unwrap();

        let snapshot = GraphSnapshot::capture(&graph).unwrap();
        assert_eq!(snapshot.edge_records(), 4);
        let masses: Vec<f32> = snapshot.nodes.iter().map(|n| n.mass).collect();
        assert_eq!(masses, vec![3.0, 4.0, 2.0]);
        assert_eq!(snapshot.outbound_compensation, 3.0);

        let b = snapshot.adjacency[1];
        assert_eq!((b.offset, b.count), (1.0, 2.0));
        let targets: Vec<f32> = snapshot.edges[1..3].iter().map(|e| e.target).collect();
        assert_eq!(targets, vec![0.0, 2.0]);
        assert!(snapshot.movement.iter().all(|m| m.convergence == 1.0));
    }

    #[test]
    fn test_capture_rejects_empty_graph() {
        let graph = AttributedGraph::new();
        assert!(matches!(
            GraphSnapshot::capture(&graph),
            Err(LayoutError::InvalidGraph(_))
        ));
    }
}
