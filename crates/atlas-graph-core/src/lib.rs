//! Graph model shared by the atlas layout crates.
//!
//! The layout engine never owns topology. It reads a graph through the
//! [`LayoutGraph`] trait (ordered nodes with a dense, stable index, ordered
//! weighted edges, counts) and writes positions back through
//! [`LayoutGraph::merge_attributes`]. [`AttributedGraph`] is the in-memory
//! implementation used by tests, examples and hosts that have no graph of
//! their own.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

// =============================================================================
// Layout-facing view
// =============================================================================

/// A node as seen by the layout engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode<Id> {
    /// Dense index in `0..node_count`, stable for the lifetime of a layout run.
    pub index: usize,
    /// Host identifier, returned by the non-mutating layout entry point.
    pub id: Id,
    pub x: f32,
    pub y: f32,
    /// Radius used by the anti-collision mode.
    pub size: f32,
    /// Fixed nodes still exert forces but never move.
    pub fixed: bool,
}

/// An undirected weighted edge between two dense node indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutEdge {
    pub source: usize,
    pub target: usize,
    pub weight: f32,
}

/// Attribute write-back produced by a layout batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    pub x: f32,
    pub y: f32,
}

/// Host graph collaborator consumed by the layout engine.
///
/// Node iteration must be ordered by `index`, and indices must cover
/// `0..node_count()` exactly once.
pub trait LayoutGraph {
    /// Identifier handed back by the pure layout function.
    type NodeId: Clone + Eq + Hash;

    fn node_count(&self) -> usize;

    fn edge_count(&self) -> usize;

    fn nodes(&self) -> impl Iterator<Item = LayoutNode<Self::NodeId>> + '_;

    fn edges(&self) -> impl Iterator<Item = LayoutEdge> + '_;

    /// Merge new layout attributes into the node at `index`.
    fn merge_attributes(&mut self, index: usize, update: PositionUpdate);
}

// =============================================================================
// In-memory graph
// =============================================================================

/// Identifier for nodes within an [`AttributedGraph`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey(pub String);

impl From<&str> for NodeKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-node attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub key: NodeKey,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default = "default_size")]
    pub size: f32,
    #[serde(default)]
    pub fixed: bool,
}

fn default_size() -> f32 {
    1.0
}

fn default_weight() -> f32 {
    1.0
}

/// Serialized edge between two node keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub source: NodeKey,
    pub target: NodeKey,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

/// JSON document form of an [`AttributedGraph`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub edges: Vec<EdgeData>,
}

/// Errors raised while building an [`AttributedGraph`].
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate node key: {0}")]
    DuplicateNode(NodeKey),

    #[error("unknown node key: {0}")]
    UnknownNode(NodeKey),

    #[error("invalid weight {weight} on edge {source_key} -> {target_key} (must be finite and > 0)")]
    InvalidWeight {
        source_key: NodeKey,
        target_key: NodeKey,
        weight: f32,
    },

    #[error("graph serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Undirected weighted graph with mutable layout attributes.
///
/// Node indices are dense because nodes are never removed, so the petgraph
/// index doubles as the layout index.
#[derive(Debug, Default, Clone)]
pub struct AttributedGraph {
    graph: UnGraph<NodeData, f32>,
    keys: HashMap<NodeKey, NodeIndex>,
}

impl AttributedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node at `(x, y)` with the default size and returns its index.
    pub fn add_node(&mut self, key: impl Into<NodeKey>, x: f32, y: f32) -> Result<usize, GraphError> {
        self.insert(NodeData {
            key: key.into(),
            x,
            y,
            size: default_size(),
            fixed: false,
        })
    }

    /// Adds a fully specified node and returns its index.
    pub fn insert(&mut self, data: NodeData) -> Result<usize, GraphError> {
        if self.keys.contains_key(&data.key) {
            return Err(GraphError::DuplicateNode(data.key));
        }
        let key = data.key.clone();
        let index = self.graph.add_node(data);
        self.keys.insert(key, index);
        Ok(index.index())
    }

    /// Connects two existing nodes.
    pub fn add_edge(
        &mut self,
        source: impl Into<NodeKey>,
        target: impl Into<NodeKey>,
        weight: f32,
    ) -> Result<(), GraphError> {
        let source = source.into();
        let target = target.into();
        if !weight.is_finite() || weight <= 0.0 {
            return Err(GraphError::InvalidWeight {
                source_key: source,
                target_key: target,
                weight,
            });
        }
        let from = *self
            .keys
            .get(&source)
            .ok_or_else(|| GraphError::UnknownNode(source.clone()))?;
        let to = *self
            .keys
            .get(&target)
            .ok_or_else(|| GraphError::UnknownNode(target.clone()))?;
        self.graph.add_edge(from, to, weight);
        Ok(())
    }

    pub fn node(&self, key: &NodeKey) -> Option<&NodeData> {
        self.keys.get(key).map(|&index| &self.graph[index])
    }

    pub fn node_mut(&mut self, key: &NodeKey) -> Option<&mut NodeData> {
        let index = *self.keys.get(key)?;
        self.graph.node_weight_mut(index)
    }

    /// Iterates over node attributes in index order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeData> + '_ {
        self.graph.node_weights()
    }

    pub fn from_document(document: GraphDocument) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for node in document.nodes {
            graph.insert(node)?;
        }
        for edge in document.edges {
            graph.add_edge(edge.source, edge.target, edge.weight)?;
        }
        Ok(graph)
    }

    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            nodes: self.graph.node_weights().cloned().collect(),
            edges: self
                .graph
                .edge_references()
                .map(|edge| EdgeData {
                    source: self.graph[edge.source()].key.clone(),
                    target: self.graph[edge.target()].key.clone(),
                    weight: *edge.weight(),
                })
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Self::from_document(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }
}

impl LayoutGraph for AttributedGraph {
    type NodeId = NodeKey;

    fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn nodes(&self) -> impl Iterator<Item = LayoutNode<NodeKey>> + '_ {
        self.graph.node_indices().map(|index| {
            let data = &self.graph[index];
            LayoutNode {
                index: index.index(),
                id: data.key.clone(),
                x: data.x,
                y: data.y,
                size: data.size,
                fixed: data.fixed,
            }
        })
    }

    fn edges(&self) -> impl Iterator<Item = LayoutEdge> + '_ {
        self.graph.edge_references().map(|edge| LayoutEdge {
            source: edge.source().index(),
            target: edge.target().index(),
            weight: *edge.weight(),
        })
    }

    fn merge_attributes(&mut self, index: usize, update: PositionUpdate) {
        if let Some(data) = self.graph.node_weight_mut(NodeIndex::new(index)) {
            data.x = update.x;
            data.y = update.y;
        }
    }
}
