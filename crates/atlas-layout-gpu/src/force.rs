//! ForceAtlas2 integration kernel.
//!
//! Reads `nodes` and `movement`, writes `nodes_out` and `movement_out`, and
//! swaps both pairs after every pass so the current state always sits under
//! the unsuffixed names. Strategy buffers (`region_*`, `centroid*`,
//! `closest`) are declared here and wired to the subsystem producing them.

use crate::gpu::GpuContext;
use crate::kernel::{ConstValue, KernelProgram, KernelSpec, ParamKind, ParamValue};
use crate::kmeans::CENTROID_SORT;
use crate::morton::region_count;
use crate::packing::GraphSnapshot;
use crate::settings::{LayoutSettings, RepulsionSettings};
use crate::shaders::{
    FORCE_COMMON, FORCE_KERNEL, REPULSION_ALL_PAIRS, REPULSION_KMEANS, REPULSION_KMEANS_GROUPED,
    REPULSION_QUAD_TREE,
};
use crate::spatial::REGION_SORT;
use crate::tree_shaders::MORTON_WGSL;
use crate::{Movement, NodeRecord, Result};

/// Assemble the kernel source for a repulsion strategy.
fn kernel_source(repulsion: &RepulsionSettings) -> String {
    let strategy = match repulsion {
        RepulsionSettings::AllPairs => REPULSION_ALL_PAIRS.to_string(),
        RepulsionSettings::QuadTree { depth, .. } => {
            let words = region_count(*depth).div_ceil(32);
            format!(
                "{MORTON_WGSL}\n{}",
                REPULSION_QUAD_TREE.replace("{{REGION_WORDS}}", &format!("{words}u"))
            )
        }
        RepulsionSettings::KMeans { .. } => REPULSION_KMEANS.to_string(),
        RepulsionSettings::KMeansGrouped { .. } => REPULSION_KMEANS_GROUPED.to_string(),
    };
    format!("{FORCE_COMMON}\n{strategy}\n{FORCE_KERNEL}")
}

/// Kernel declaration for `node_count` nodes and `edge_records` directed edges.
pub(crate) fn force_spec(
    node_count: usize,
    edge_records: usize,
    settings: &LayoutSettings,
) -> KernelSpec {
    let padded = node_count.next_power_of_two();
    let mut spec = KernelSpec::new("force", kernel_source(&settings.repulsion))
        .input("nodes", node_count, 4)
        .input("movement", node_count, 4)
        .input("adjacency", node_count, 2)
        // Never empty; an edgeless graph has all adjacency counts at zero.
        .input("edges", edge_records.max(1), 2);

    spec = match &settings.repulsion {
        RepulsionSettings::AllPairs => spec,
        RepulsionSettings::QuadTree { depth, .. } => {
            let regions = region_count(*depth) as usize;
            spec.input("bounds", 1, 4)
                .input("region_stats", regions, 4)
                .input("region_offsets", regions, 2)
                .input(REGION_SORT, padded, 2)
                .constant("DEPTH", ConstValue::U32(*depth))
        }
        RepulsionSettings::KMeans { centroids, .. } => spec.input("centroids", *centroids, 4),
        RepulsionSettings::KMeansGrouped { centroids, .. } => spec
            .input("centroids", *centroids, 4)
            .input("closest", node_count, 1)
            .input("centroid_offsets", *centroids, 2)
            .input(CENTROID_SORT, padded, 2),
    };

    spec.output("nodes_out", node_count, 4)
        .output("movement_out", node_count, 4)
        .constant("LIN_LOG", ConstValue::Bool(settings.lin_log_mode))
        .constant("STRONG_GRAVITY", ConstValue::Bool(settings.strong_gravity_mode))
        .constant("ADJUST_SIZES", ConstValue::Bool(settings.adjust_sizes))
        .constant(
            "OUTBOUND_ATTRACTION",
            ConstValue::Bool(settings.outbound_attraction_distribution),
        )
        .param("scaling_ratio", ParamKind::F32)
        .param("gravity", ParamKind::F32)
        .param("slow_down", ParamKind::F32)
        .param("max_force", ParamKind::F32)
        .param("edge_weight_influence", ParamKind::F32)
        .param("outbound_compensation", ParamKind::F32)
        .param("theta", ParamKind::F32)
}

/// The physics step as a compiled kernel.
pub struct ForceKernel {
    program: KernelProgram,
    node_count: usize,
}

impl ForceKernel {
    pub fn new(
        ctx: &GpuContext,
        node_count: usize,
        edge_records: usize,
        settings: &LayoutSettings,
    ) -> Result<Self> {
        let program = KernelProgram::new(ctx, force_spec(node_count, edge_records, settings))?;
        tracing::debug!(
            nodes = node_count,
            edges = edge_records,
            repulsion = settings.repulsion.kind(),
            "Created force kernel"
        );
        Ok(Self {
            program,
            node_count,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn program(&self) -> &KernelProgram {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut KernelProgram {
        &mut self.program
    }

    /// Upload node state and topology.
    pub fn upload(&self, ctx: &GpuContext, snapshot: &GraphSnapshot) -> Result<()> {
        self.program.upload(ctx, "nodes", &snapshot.nodes)?;
        self.program.upload(ctx, "movement", &snapshot.movement)?;
        self.program.upload(ctx, "adjacency", &snapshot.adjacency)?;
        self.program.upload(ctx, "edges", &snapshot.edges)
    }

    /// Write the scalar settings into the uniform block.
    pub fn set_parameters(
        &mut self,
        ctx: &GpuContext,
        settings: &LayoutSettings,
        outbound_compensation: f32,
    ) -> Result<()> {
        let theta = match settings.repulsion {
            RepulsionSettings::QuadTree { theta, .. } => theta,
            _ => 0.0,
        };
        self.program.set_parameters(
            ctx,
            &[
                ("scaling_ratio", ParamValue::F32(settings.scaling_ratio)),
                ("gravity", ParamValue::F32(settings.gravity)),
                ("slow_down", ParamValue::F32(settings.slow_down)),
                ("max_force", ParamValue::F32(settings.max_force)),
                (
                    "edge_weight_influence",
                    ParamValue::F32(settings.edge_weight_influence),
                ),
                (
                    "outbound_compensation",
                    ParamValue::F32(outbound_compensation),
                ),
                ("theta", ParamValue::F32(theta)),
            ],
        )
    }

    /// One integration pass over every node.
    pub fn step(&mut self, ctx: &GpuContext) -> Result<()> {
        self.program.execute(ctx)?;
        self.program.swap("nodes", "nodes_out")?;
        self.program.swap("movement", "movement_out")
    }

    pub fn nodes(&self, ctx: &GpuContext) -> Result<Vec<NodeRecord>> {
        self.program.read(ctx, "nodes")
    }

    pub fn movements(&self, ctx: &GpuContext) -> Result<Vec<Movement>> {
        self.program.read(ctx, "movement")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_tree_source_sizes_bitset() {
        let source = kernel_source(&RepulsionSettings::QuadTree {
            depth: 4,
            theta: 0.5,
        });
        assert!(source.contains("array<u32, 11u>"));
        assert!(!source.contains("{{REGION_WORDS}}"));
        assert!(source.contains("fn parent_of"));
    }

    #[test]
    fn test_spec_renders_for_every_strategy() {
        let strategies = [
            RepulsionSettings::AllPairs,
            RepulsionSettings::QuadTree {
                depth: 2,
                theta: 0.5,
            },
            RepulsionSettings::KMeans {
                centroids: 3,
                steps: 1,
            },
            RepulsionSettings::KMeansGrouped {
                centroids: 3,
                steps: 1,
            },
        ];
        for repulsion in strategies {
            let settings = LayoutSettings {
                repulsion,
                ..LayoutSettings::default()
            };
            let source = force_spec(10, 0, &settings).render().unwrap();
            assert!(source.contains("const ELEMENT_COUNT: u32 = 10u;"));
            assert!(source.contains("const EDGES_COUNT: u32 = 1u;"));
            assert!(source.contains("fn repulsion("));
        }
    }

    #[test]
    fn test_grouped_spec_binds_ten_storage_buffers() {
        let settings = LayoutSettings {
            repulsion: RepulsionSettings::KMeansGrouped {
                centroids: 2,
                steps: 1,
            },
            ..LayoutSettings::default()
        };
        let source = force_spec(5, 4, &settings).render().unwrap();
        assert!(source.contains("@binding(10) var<storage, read_write> movement_out"));
        assert!(source.contains("const CENTROID_SORT_COUNT: u32 = 8u;"));
    }
}
