//! K-means clustering of node positions on the device.
//!
//! Centroids live in `centroids` as `(x, y, mass, members)`. Each round
//! assigns every node to its nearest centroid (`closest`), recenters into
//! `centroids_next` and swaps the pair. The grouped variant then builds
//! `centroid_offsets` and sorts node indices by centroid into
//! `centroid_sort`, so a cluster's members are one contiguous range.

use crate::gpu::GpuContext;
use crate::kernel::{ConstValue, KernelProgram, KernelSpec};
use crate::shaders::{KMEANS_ASSIGN, KMEANS_GROUPING, KMEANS_INIT, KMEANS_OFFSETS, KMEANS_RECENTER};
use crate::sort::BitonicSort;
use crate::wiring::wire;
use crate::{Body, LayoutError, MemberRange, NodeRecord, Result};

/// Buffer holding the grouped `(node, centroid)` sort entries.
pub const CENTROID_SORT: &str = "centroid_sort";

struct Grouping {
    offsets: KernelProgram,
    grouping: KernelProgram,
    sort: BitonicSort,
}

/// K-means over `node_count` nodes read from the `nodes` buffer.
pub struct KMeans {
    centroids: usize,
    steps: u32,
    init: KernelProgram,
    assign: KernelProgram,
    recenter: KernelProgram,
    grouped: Option<Grouping>,
}

impl KMeans {
    /// `steps` assignment/recentering rounds run per [`Self::advance`].
    pub fn new(
        ctx: &GpuContext,
        node_count: usize,
        centroids: usize,
        steps: u32,
        grouped: bool,
    ) -> Result<Self> {
        if centroids == 0 || centroids > node_count {
            return Err(LayoutError::config(
                "repulsion.centroids",
                format!("{centroids} centroids for {node_count} nodes"),
            ));
        }
        if steps == 0 {
            return Err(LayoutError::config("repulsion.steps", "must be at least 1"));
        }

        let init = KernelProgram::new(
            ctx,
            KernelSpec::new("kmeans_init", KMEANS_INIT)
                .input("nodes", node_count, 4)
                .output("centroids", centroids, 4)
                .constant("GROUPED", ConstValue::Bool(grouped)),
        )?;
        let assign = KernelProgram::new(
            ctx,
            KernelSpec::new("kmeans_assign", KMEANS_ASSIGN)
                .input("nodes", node_count, 4)
                .input("centroids", centroids, 4)
                .output("closest", node_count, 1),
        )?;
        let recenter = KernelProgram::new(
            ctx,
            KernelSpec::new("kmeans_recenter", KMEANS_RECENTER)
                .input("nodes", node_count, 4)
                .input("closest", node_count, 1)
                .input("centroids", centroids, 4)
                .output("centroids_next", centroids, 4),
        )?;

        let grouped = if grouped {
            let sort = BitonicSort::new(ctx, CENTROID_SORT, node_count)?;
            let offsets = KernelProgram::new(
                ctx,
                KernelSpec::new("kmeans_offsets", KMEANS_OFFSETS)
                    .input("centroids", centroids, 4)
                    .output("centroid_offsets", centroids, 2),
            )?;
            let grouping = KernelProgram::new(
                ctx,
                KernelSpec::new("kmeans_grouping", KMEANS_GROUPING)
                    .input("closest", node_count, 1)
                    .output(CENTROID_SORT, sort.padded_len(), 2)
                    .constant("SENTINEL", ConstValue::F32(centroids as f32)),
            )?;
            Some(Grouping {
                offsets,
                grouping,
                sort,
            })
        } else {
            None
        };

        let mut kmeans = Self {
            centroids,
            steps,
            init,
            assign,
            recenter,
            grouped,
        };
        wire(&mut kmeans.programs_mut())?;

        tracing::debug!(
            nodes = node_count,
            centroids,
            steps,
            grouped = kmeans.is_grouped(),
            "Created k-means"
        );
        Ok(kmeans)
    }

    pub fn centroid_count(&self) -> usize {
        self.centroids
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn is_grouped(&self) -> bool {
        self.grouped.is_some()
    }

    /// Programs in execution order, for wiring with other subsystems.
    pub fn programs_mut(&mut self) -> Vec<&mut KernelProgram> {
        let mut programs = vec![&mut self.init, &mut self.assign, &mut self.recenter];
        if let Some(grouping) = &mut self.grouped {
            programs.push(&mut grouping.offsets);
            programs.push(&mut grouping.grouping);
            programs.push(grouping.sort.program_mut());
        }
        programs
    }

    /// Upload node records directly, for use without a force kernel.
    pub fn set_nodes(&self, ctx: &GpuContext, nodes: &[NodeRecord]) -> Result<()> {
        self.init.upload(ctx, "nodes", nodes)
    }

    /// Seed centroids from node positions, with zero mass and members.
    pub fn initialize(&mut self, ctx: &GpuContext) -> Result<()> {
        self.init.execute(ctx)
    }

    /// Run `steps` rounds from the current centroids, then regroup.
    pub fn advance(&mut self, ctx: &GpuContext) -> Result<()> {
        for _ in 0..self.steps {
            self.assign.execute(ctx)?;
            self.recenter.execute(ctx)?;
            self.recenter.swap("centroids", "centroids_next")?;
        }
        if let Some(grouping) = &mut self.grouped {
            grouping.offsets.execute(ctx)?;
            grouping.grouping.execute(ctx)?;
            grouping.sort.sort(ctx)?;
        }
        Ok(())
    }

    /// Centroids as `(x, y, mass, members)`.
    pub fn centroids(&self, ctx: &GpuContext) -> Result<Vec<Body>> {
        self.recenter.read(ctx, "centroids")
    }

    /// Assigned centroid per node.
    pub fn closest(&self, ctx: &GpuContext) -> Result<Vec<u32>> {
        Ok(self
            .assign
            .get_output(ctx, "closest")?
            .into_iter()
            .map(|id| id as u32)
            .collect())
    }

    /// Grouped variant only.
    pub fn centroid_offsets(&self, ctx: &GpuContext) -> Result<Vec<MemberRange>> {
        match &self.grouped {
            Some(grouping) => grouping.offsets.read(ctx, "centroid_offsets"),
            None => Err(LayoutError::NotInitialized),
        }
    }

    /// Node indices grouped by centroid. Grouped variant only.
    pub fn sorted_nodes(&self, ctx: &GpuContext) -> Result<Vec<u32>> {
        match &self.grouped {
            Some(grouping) => grouping.sort.sorted_payloads(ctx),
            None => Err(LayoutError::NotInitialized),
        }
    }
}
