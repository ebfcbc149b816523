//! High-level layout driver.
//!
//! [`ForceAtlas2`] snapshots a host graph into device buffers, runs batches
//! of physics passes when the host calls [`ForceAtlas2::tick`], and merges
//! positions back once per batch. The host owns scheduling: returning from
//! `tick` is the yield point, and a stop request is only observed before the
//! next batch is launched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::force::ForceKernel;
use crate::gpu::GpuContext;
use crate::kernel::KernelProgram;
use crate::kmeans::KMeans;
use crate::packing::GraphSnapshot;
use crate::settings::{LayoutSettings, RepulsionSettings};
use crate::spatial::SpatialIndex;
use crate::wiring::wire;
use crate::{
    Body, LayoutError, LayoutGraph, MemberRange, Movement, NodeRecord, Position, PositionUpdate,
    Result,
};

/// Current state of the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutState {
    /// Not started, finished, or stopped by the owner.
    #[default]
    Idle,
    /// Batches run on every tick.
    Running,
    /// Cancelled through a [`StopHandle`].
    Stopped,
}

/// Cloneable cancellation flag, usable from other threads.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request cancellation; observed before the next batch.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Strategy {
    AllPairs,
    QuadTree(SpatialIndex),
    KMeans(KMeans),
}

/// Compiled and wired kernels for one graph shape and one set of modes.
struct Pipeline {
    node_count: usize,
    edge_records: usize,
    compiled_for: LayoutSettings,
    outbound_compensation: f32,
    force: ForceKernel,
    strategy: Strategy,
}

impl Pipeline {
    fn new(
        ctx: &GpuContext,
        node_count: usize,
        edge_records: usize,
        settings: &LayoutSettings,
    ) -> Result<Self> {
        let mut force = ForceKernel::new(ctx, node_count, edge_records, settings)?;
        let mut strategy = match &settings.repulsion {
            RepulsionSettings::AllPairs => Strategy::AllPairs,
            RepulsionSettings::QuadTree { depth, .. } => {
                Strategy::QuadTree(SpatialIndex::new(ctx, node_count, *depth)?)
            }
            RepulsionSettings::KMeans { centroids, steps } => {
                Strategy::KMeans(KMeans::new(ctx, node_count, *centroids, *steps, false)?)
            }
            RepulsionSettings::KMeansGrouped { centroids, steps } => {
                Strategy::KMeans(KMeans::new(ctx, node_count, *centroids, *steps, true)?)
            }
        };

        // Producers first so the force kernel consumes their buffers.
        let mut programs: Vec<&mut KernelProgram> = match &mut strategy {
            Strategy::AllPairs => Vec::new(),
            Strategy::QuadTree(index) => index.programs_mut().into_iter().collect(),
            Strategy::KMeans(kmeans) => kmeans.programs_mut(),
        };
        programs.push(force.program_mut());
        let report = wire(&mut programs)?;
        tracing::debug!(
            sources = report.sources.len(),
            rebound = report.rebound.len(),
            "Wired layout pipeline"
        );

        Ok(Self {
            node_count,
            edge_records,
            compiled_for: settings.clone(),
            outbound_compensation: 1.0,
            force,
            strategy,
        })
    }

    /// Whether `settings` only changes runtime parameters of this pipeline.
    fn accepts(&self, settings: &LayoutSettings) -> bool {
        let compiled = &self.compiled_for;
        compiled.lin_log_mode == settings.lin_log_mode
            && compiled.strong_gravity_mode == settings.strong_gravity_mode
            && compiled.adjust_sizes == settings.adjust_sizes
            && compiled.outbound_attraction_distribution
                == settings.outbound_attraction_distribution
            && compiled.repulsion == settings.repulsion
    }

    fn load(
        &mut self,
        ctx: &GpuContext,
        snapshot: &GraphSnapshot,
        settings: &LayoutSettings,
    ) -> Result<()> {
        self.outbound_compensation = snapshot.outbound_compensation;
        self.force.upload(ctx, snapshot)?;
        self.force
            .set_parameters(ctx, settings, self.outbound_compensation)?;
        if let Strategy::KMeans(kmeans) = &mut self.strategy {
            kmeans.initialize(ctx)?;
        }
        Ok(())
    }

    fn batch(&mut self, ctx: &GpuContext, settings: &LayoutSettings) -> Result<()> {
        match &mut self.strategy {
            Strategy::AllPairs => {}
            Strategy::QuadTree(index) => index.build(ctx)?,
            Strategy::KMeans(kmeans) => kmeans.advance(ctx)?,
        }
        for _ in 0..settings.iterations_per_step {
            self.force.step(ctx)?;
        }
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Buffers not shared with another pipeline are destroyed with their slots.
        tracing::debug!(
            nodes = self.node_count,
            repulsion = self.compiled_for.repulsion.kind(),
            "Released layout pipeline"
        );
    }
}

/// GPU ForceAtlas2 layout engine.
///
/// Device buffers are shared between kernels through single-threaded
/// handles, so an engine stays on the thread that created it. Cancel it
/// from elsewhere through [`ForceAtlas2::stop_handle`].
pub struct ForceAtlas2 {
    ctx: Arc<GpuContext>,
    settings: LayoutSettings,
    pipeline: Option<Pipeline>,
    state: LayoutState,
    /// Batches left; `None` runs until stopped.
    remaining: Option<u32>,
    iteration: u64,
    stop: StopHandle,
}

impl ForceAtlas2 {
    /// Create an engine on a fresh GPU context.
    pub async fn new(settings: LayoutSettings) -> Result<Self> {
        settings.validate()?;
        let ctx = GpuContext::new().await?;
        Self::with_context(Arc::new(ctx), settings)
    }

    /// Create an engine sharing an existing GPU context.
    pub fn with_context(ctx: Arc<GpuContext>, settings: LayoutSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            ctx,
            settings,
            pipeline: None,
            state: LayoutState::Idle,
            remaining: None,
            iteration: 0,
            stop: StopHandle::default(),
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn settings(&self) -> &LayoutSettings {
        &self.settings
    }

    /// Replace the settings. Scalar changes apply to the next batch; mode or
    /// strategy changes rebuild the kernels from a fresh snapshot.
    pub fn configure(&mut self, settings: LayoutSettings) -> Result<()> {
        settings.validate()?;
        if let Some(pipeline) = &mut self.pipeline {
            settings.validate_for(pipeline.node_count)?;
            if pipeline.accepts(&settings) {
                let compensation = pipeline.outbound_compensation;
                pipeline
                    .force
                    .set_parameters(&self.ctx, &settings, compensation)?;
            } else {
                tracing::debug!(
                    repulsion = settings.repulsion.kind(),
                    "Settings changed compiled modes, dropping pipeline"
                );
                self.pipeline = None;
            }
        }
        self.settings = settings;
        Ok(())
    }

    /// Snapshot `graph` and enter `Running` for `steps` batches (`0` runs
    /// until stopped). Calling again re-snapshots, picking up external edits.
    pub fn start<G: LayoutGraph>(&mut self, graph: &G, steps: u32) -> Result<()> {
        self.load(graph)?;
        self.iteration = 0;
        self.remaining = (steps > 0).then_some(steps);
        self.stop.reset();
        self.state = LayoutState::Running;
        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            steps,
            repulsion = self.settings.repulsion.kind(),
            "Layout started"
        );
        Ok(())
    }

    fn load<G: LayoutGraph>(&mut self, graph: &G) -> Result<()> {
        let snapshot = GraphSnapshot::capture(graph)?;
        let node_count = snapshot.node_count();
        self.settings.validate_for(node_count)?;
        if snapshot.edge_records() == 0 {
            tracing::warn!(nodes = node_count, "Graph has no edges; only repulsion and gravity apply");
        }

        let reusable = self.pipeline.as_ref().is_some_and(|pipeline| {
            pipeline.node_count == node_count
                && pipeline.edge_records == snapshot.edge_records()
                && pipeline.accepts(&self.settings)
        });
        if !reusable {
            // Release the old kernels before allocating new ones.
            self.pipeline = None;
            self.pipeline = Some(Pipeline::new(
                &self.ctx,
                node_count,
                snapshot.edge_records(),
                &self.settings,
            )?);
        }

        let pipeline = self.pipeline.as_mut().ok_or(LayoutError::NotInitialized)?;
        pipeline.load(&self.ctx, &snapshot, &self.settings)
    }

    /// Run one batch and merge positions into `graph`. Returns whether the
    /// layout is still running afterwards.
    pub fn tick<G: LayoutGraph>(&mut self, graph: &mut G) -> Result<bool> {
        if self.state == LayoutState::Running && self.pipeline.is_none() {
            self.load(&*graph)?;
        }
        if let Some(pipeline) = &self.pipeline {
            if self.state == LayoutState::Running && graph.node_count() != pipeline.node_count {
                return Err(LayoutError::InvalidGraph(format!(
                    "graph has {} nodes, layout was started with {}",
                    graph.node_count(),
                    pipeline.node_count
                )));
            }
        }

        if let Some(nodes) = self.advance()? {
            for (index, node) in nodes.iter().enumerate() {
                graph.merge_attributes(index, PositionUpdate { x: node.x, y: node.y });
            }
        }
        Ok(self.is_running())
    }

    /// One batch without write-back; `None` when nothing ran.
    fn advance(&mut self) -> Result<Option<Vec<NodeRecord>>> {
        if self.state != LayoutState::Running {
            return Ok(None);
        }
        if self.stop.is_stop_requested() {
            self.state = LayoutState::Stopped;
            tracing::info!(iteration = self.iteration, "Layout stopped by handle");
            return Ok(None);
        }

        let pipeline = self.pipeline.as_mut().ok_or(LayoutError::NotInitialized)?;
        pipeline.batch(&self.ctx, &self.settings)?;
        self.iteration += u64::from(self.settings.iterations_per_step);
        if self.settings.await_device {
            self.ctx.wait_idle();
        }
        let nodes = pipeline.force.nodes(&self.ctx)?;

        if let Some(remaining) = &mut self.remaining {
            *remaining -= 1;
            if *remaining == 0 {
                self.state = LayoutState::Idle;
                tracing::info!(iteration = self.iteration, "Layout finished");
            }
        }
        Ok(Some(nodes))
    }

    /// Leave `Running`. Safe to call at any time.
    pub fn stop(&mut self) {
        if self.state == LayoutState::Running {
            self.state = LayoutState::Idle;
            tracing::info!(iteration = self.iteration, "Layout stopped");
        } else {
            tracing::warn!(state = ?self.state, "Stop requested while not running");
        }
    }

    /// A single synchronous batch: start, tick, stop.
    pub fn run<G: LayoutGraph>(&mut self, graph: &mut G) -> Result<()> {
        self.start(&*graph, 1)?;
        self.tick(graph)?;
        if self.is_running() {
            self.stop();
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state == LayoutState::Running
    }

    pub fn state(&self) -> LayoutState {
        self.state
    }

    /// Physics passes since the last start.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Handle for cancelling from outside the owning scope.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn pipeline(&self) -> Result<&Pipeline> {
        self.pipeline.as_ref().ok_or(LayoutError::NotInitialized)
    }

    fn spatial_index(&self) -> Result<&SpatialIndex> {
        match &self.pipeline()?.strategy {
            Strategy::QuadTree(index) => Ok(index),
            _ => Err(LayoutError::config(
                "repulsion",
                "region diagnostics need the quadTree strategy",
            )),
        }
    }

    fn kmeans(&self) -> Result<&KMeans> {
        match &self.pipeline()?.strategy {
            Strategy::KMeans(kmeans) => Ok(kmeans),
            _ => Err(LayoutError::config(
                "repulsion",
                "centroid diagnostics need a k-means strategy",
            )),
        }
    }

    /// Current device positions.
    pub fn positions(&self) -> Result<Vec<Position>> {
        Ok(self
            .pipeline()?
            .force
            .nodes(&self.ctx)?
            .into_iter()
            .map(|node| Position::new(node.x, node.y))
            .collect())
    }

    /// Latest force and convergence per node.
    pub fn movements(&self) -> Result<Vec<Movement>> {
        self.pipeline()?.force.movements(&self.ctx)
    }

    pub fn centroids(&self) -> Result<Vec<Body>> {
        self.kmeans()?.centroids(&self.ctx)
    }

    pub fn closest_centroids(&self) -> Result<Vec<u32>> {
        self.kmeans()?.closest(&self.ctx)
    }

    pub fn regions(&self) -> Result<Vec<[f32; 4]>> {
        self.spatial_index()?.regions(&self.ctx)
    }

    pub fn region_stats(&self) -> Result<Vec<Body>> {
        self.spatial_index()?.region_stats(&self.ctx)
    }

    pub fn region_offsets(&self) -> Result<Vec<MemberRange>> {
        self.spatial_index()?.region_offsets(&self.ctx)
    }

    /// Node indices grouped by leaf region or centroid.
    pub fn sorted_nodes(&self) -> Result<Vec<u32>> {
        match &self.pipeline()?.strategy {
            Strategy::QuadTree(index) => index.sorted_nodes(&self.ctx),
            Strategy::KMeans(kmeans) => kmeans.sorted_nodes(&self.ctx),
            Strategy::AllPairs => Err(LayoutError::config(
                "repulsion",
                "allPairs does not group nodes",
            )),
        }
    }
}

/// Lay out `graph` for `batches` batches without mutating it.
pub fn layout<G: LayoutGraph>(
    ctx: Arc<GpuContext>,
    graph: &G,
    settings: &LayoutSettings,
    batches: u32,
) -> Result<HashMap<G::NodeId, Position>> {
    let mut positions: Vec<Position> = Vec::new();
    if batches > 0 {
        let mut engine = ForceAtlas2::with_context(ctx, settings.clone())?;
        engine.start(graph, batches)?;
        while let Some(nodes) = engine.advance()? {
            positions = nodes
                .into_iter()
                .map(|node| Position::new(node.x, node.y))
                .collect();
        }
    }

    Ok(graph
        .nodes()
        .map(|node| {
            let position = positions
                .get(node.index)
                .copied()
                .unwrap_or(Position::new(node.x, node.y));
            (node.id, position)
        })
        .collect())
}

/// Synchronous constructors for hosts without an async runtime.
pub mod sync {
    use super::*;

    pub fn new_layout(settings: LayoutSettings) -> Result<ForceAtlas2> {
        pollster::block_on(ForceAtlas2::new(settings))
    }

    pub fn new_context() -> Result<GpuContext> {
        pollster::block_on(GpuContext::new())
    }
}
