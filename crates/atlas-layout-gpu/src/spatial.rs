//! Bounded-depth Barnes-Hut index built entirely on the device.
//!
//! Nothing here allocates tree nodes. Every node is tagged with its region
//! at each depth, regions are aggregated by scanning those tags, and a sort
//! by deepest tag groups node indices so each region's members occupy one
//! contiguous range of `region_sort`, addressed through `region_offsets`.

use crate::gpu::GpuContext;
use crate::kernel::{ConstValue, KernelProgram, KernelSpec};
use crate::morton::{region_count, MAX_DEPTH};
use crate::sort::BitonicSort;
use crate::tree_shaders::{
    with_morton, AGGREGATION_KERNEL, BOUNDS_KERNEL, GROUPING_KERNEL, OFFSETS_KERNEL,
    TAGGING_KERNEL,
};
use crate::wiring::wire;
use crate::{Body, LayoutError, MemberRange, NodeRecord, Result};

/// Buffer holding the grouped `(node, region)` sort entries.
pub const REGION_SORT: &str = "region_sort";

/// Spatial index over `node_count` nodes read from the `nodes` buffer.
pub struct SpatialIndex {
    depth: u32,
    node_count: usize,
    bounds: KernelProgram,
    tagging: KernelProgram,
    aggregation: KernelProgram,
    offsets: KernelProgram,
    grouping: KernelProgram,
    sort: BitonicSort,
}

impl SpatialIndex {
    pub fn new(ctx: &GpuContext, node_count: usize, depth: u32) -> Result<Self> {
        if !(1..=MAX_DEPTH).contains(&depth) {
            return Err(LayoutError::config(
                "repulsion.depth",
                format!("depth {depth} is outside [1, {MAX_DEPTH}]"),
            ));
        }
        if node_count == 0 {
            return Err(LayoutError::InvalidGraph("No nodes".into()));
        }
        let regions = region_count(depth) as usize;
        let sort = BitonicSort::new(ctx, REGION_SORT, node_count)?;

        let bounds = KernelProgram::new(
            ctx,
            KernelSpec::new("spatial_bounds", BOUNDS_KERNEL)
                .input("nodes", node_count, 4)
                .output("bounds", 1, 4),
        )?;
        let tagging = KernelProgram::new(
            ctx,
            KernelSpec::new("spatial_tagging", with_morton(TAGGING_KERNEL))
                .input("nodes", node_count, 4)
                .input("bounds", 1, 4)
                .output("regions", node_count, 4)
                .constant("DEPTH", ConstValue::U32(depth)),
        )?;
        let aggregation = KernelProgram::new(
            ctx,
            KernelSpec::new("spatial_aggregation", with_morton(AGGREGATION_KERNEL))
                .input("nodes", node_count, 4)
                .input("regions", node_count, 4)
                .output("region_stats", regions, 4),
        )?;
        let offsets = KernelProgram::new(
            ctx,
            KernelSpec::new("spatial_offsets", with_morton(OFFSETS_KERNEL))
                .input("region_stats", regions, 4)
                .output("region_offsets", regions, 2),
        )?;
        let grouping = KernelProgram::new(
            ctx,
            KernelSpec::new("spatial_grouping", GROUPING_KERNEL)
                .input("regions", node_count, 4)
                .output(REGION_SORT, sort.padded_len(), 2)
                .constant("DEPTH", ConstValue::U32(depth))
                .constant("SENTINEL", ConstValue::F32(regions as f32)),
        )?;

        let mut index = Self {
            depth,
            node_count,
            bounds,
            tagging,
            aggregation,
            offsets,
            grouping,
            sort,
        };
        wire(&mut index.programs_mut())?;

        tracing::debug!(nodes = node_count, depth, regions, "Created spatial index");
        Ok(index)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn region_count(&self) -> u32 {
        region_count(self.depth)
    }

    /// Programs in execution order, for wiring with other subsystems.
    pub fn programs_mut(&mut self) -> [&mut KernelProgram; 6] {
        [
            &mut self.bounds,
            &mut self.tagging,
            &mut self.aggregation,
            &mut self.offsets,
            &mut self.grouping,
            self.sort.program_mut(),
        ]
    }

    /// Upload node records directly, for use without a force kernel.
    pub fn set_nodes(&self, ctx: &GpuContext, nodes: &[NodeRecord]) -> Result<()> {
        self.bounds.upload(ctx, "nodes", nodes)
    }

    /// Rebuild every table from the current `nodes` buffer.
    pub fn build(&mut self, ctx: &GpuContext) -> Result<()> {
        self.bounds.execute(ctx)?;
        self.tagging.execute(ctx)?;
        self.aggregation.execute(ctx)?;
        self.offsets.execute(ctx)?;
        self.grouping.execute(ctx)?;
        self.sort.sort(ctx)
    }

    /// `[x_min, x_max, y_min, y_max]` of the squared box.
    pub fn bounds(&self, ctx: &GpuContext) -> Result<[f32; 4]> {
        let values = self.bounds.get_output(ctx, "bounds")?;
        values
            .try_into()
            .map_err(|_| LayoutError::Readback("bounds buffer has the wrong size".into()))
    }

    /// Region tag per node and depth (`-1` past the configured depth).
    pub fn regions(&self, ctx: &GpuContext) -> Result<Vec<[f32; 4]>> {
        self.tagging.read(ctx, "regions")
    }

    pub fn region_stats(&self, ctx: &GpuContext) -> Result<Vec<Body>> {
        self.aggregation.read(ctx, "region_stats")
    }

    pub fn region_offsets(&self, ctx: &GpuContext) -> Result<Vec<MemberRange>> {
        self.offsets.read(ctx, "region_offsets")
    }

    /// Node indices grouped by deepest region.
    pub fn sorted_nodes(&self, ctx: &GpuContext) -> Result<Vec<u32>> {
        self.sort.sorted_payloads(ctx)
    }
}
