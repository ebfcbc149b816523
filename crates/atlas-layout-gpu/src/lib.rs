//! GPU-resident ForceAtlas2 graph layout using WebGPU.
//!
//! Every numerical stage of the layout runs as a wgpu compute kernel, so
//! graphs with tens of thousands of nodes can be laid out at interactive
//! rates on native (Vulkan/Metal/DX12) backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CPU Side                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Host Graph  │───▶│  Snapshot   │───▶│ GPU Buffers │     │
//! │  │ (LayoutGraph│    │ (packing)   │    │  (wired)    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        GPU Side                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Spatial idx │───▶│  Bitonic    │───▶│   Force     │     │
//! │  │ or k-means  │    │   sort      │    │ integration │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Write Back                             │
//! │  One position readback per batch, merged into the host      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Repulsion strategies
//!
//! - All pairs: exact, O(n²) per pass
//! - Quad tree: bounded-depth Barnes-Hut over Morton-tagged regions
//! - K-means: one body per centroid, cheap but under-resolved inside a cluster
//! - K-means grouped: centroids for other clusters, exact pairs inside one's own

mod error;
mod force;
mod gpu;
mod kernel;
mod kmeans;
mod layout;
mod morton;
mod packing;
mod settings;
mod shaders;
mod sort;
mod spatial;
mod tree_shaders;
mod wiring;

pub use error::LayoutError;
pub use force::ForceKernel;
pub use gpu::GpuContext;
pub use kernel::{BufferSpec, ConstValue, KernelProgram, KernelSpec, ParamKind, ParamValue};
pub use kmeans::KMeans;
pub use layout::{layout, sync, ForceAtlas2, LayoutState, StopHandle};
pub use morton::{
    depth_of, level_base, parent_of, region_count, region_path, regions_at_depth, MAX_DEPTH,
};
pub use packing::{square_side, GraphSnapshot};
pub use settings::{LayoutSettings, RepulsionSettings};
pub use sort::BitonicSort;
pub use spatial::SpatialIndex;
pub use wiring::{wire, WiringReport};

pub use atlas_graph_core::{
    AttributedGraph, GraphError, LayoutEdge, LayoutGraph, LayoutNode, NodeData, NodeKey,
    PositionUpdate,
};

/// Result type for layout operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// A 2D position.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Per-node physics record (`nodes` buffer).
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct NodeRecord {
    pub x: f32,
    pub y: f32,
    /// 1 + sum of incident edge weights.
    pub mass: f32,
    pub size: f32,
}

/// Per-node integration state (`movement` buffer).
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Movement {
    /// Clamped force from the latest pass.
    pub dx: f32,
    pub dy: f32,
    /// Adaptive speed memory in [0, 1].
    pub convergence: f32,
    /// 1.0 for fixed nodes.
    pub fixed: f32,
}

/// Slice of the edge array owned by one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct AdjacencyRange {
    pub offset: f32,
    pub count: f32,
}

/// One direction of an undirected edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct EdgeRecord {
    pub target: f32,
    pub weight: f32,
}

/// Aggregated body of a spatial region or a k-means centroid.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Body {
    /// Barycenter.
    pub x: f32,
    pub y: f32,
    pub mass: f32,
    /// Member count.
    pub count: f32,
}

/// Member range of a region or centroid inside its sorted node array.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct MemberRange {
    pub count: f32,
    pub offset: f32,
}

/// Bitonic sort element.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct SortEntry {
    pub payload: f32,
    pub key: f32,
}
