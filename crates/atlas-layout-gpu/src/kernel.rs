//! Generic multi-input / multi-output compute kernel.
//!
//! A [`KernelProgram`] is compiled from a [`KernelSpec`]: named input
//! buffers (read-only), named output buffers (all written by one dispatch),
//! named uniform parameters and compile-time constants, plus a WGSL body
//! defining `fn kernel(index: u32)`. The prelude generated around the body
//! declares every binding, a `Params` uniform struct, an `<NAME>_COUNT`
//! constant per buffer and the entry point that walks the square element
//! grid.
//!
//! Buffers live in shared [`BufferSlot`]s. After [`crate::wire`] a name maps
//! to exactly one slot across all programs, and [`KernelProgram::swap`]
//! exchanges slot contents, so every consumer of a name observes the swap.

use std::cell::{Cell, Ref, RefCell};
use std::fmt::Write as _;
use std::rc::Rc;

use crate::gpu::GpuContext;
use crate::packing::square_side;
use crate::{LayoutError, Result};

/// Workgroup edge; kernels run 16x16 invocations per workgroup.
const WORKGROUP_SIDE: u32 = 16;

/// Identifiers the generated prelude owns, plus WGSL reserved words that
/// read like natural buffer names.
const RESERVED: &[&str] = &[
    "params", "index", "gid", "main", "kernel", "unused", "pass", "target", "set", "get",
    "type", "filter", "layout", "shared", "common", "match", "mod", "move", "from", "self",
    "partition", "resource", "module", "use", "static", "struct", "var", "let", "const", "fn",
    "return", "loop", "for", "if", "else", "break", "continue", "switch", "case", "default",
    "true", "false", "array", "bool", "f32", "u32", "i32",
];

/// Declared shape of a named kernel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSpec {
    pub name: String,
    /// Logical element count.
    pub count: u32,
    /// Floats per element: 1, 2 or 4.
    pub components: u32,
}

impl BufferSpec {
    pub fn new(name: impl Into<String>, count: usize, components: u32) -> Self {
        Self {
            name: name.into(),
            count: count as u32,
            components,
        }
    }

    /// Elements actually allocated: the full square grid.
    pub fn capacity(&self) -> u32 {
        let side = square_side(self.count as usize);
        side * side
    }

    fn stride(&self) -> u64 {
        self.components as u64 * std::mem::size_of::<f32>() as u64
    }

    fn wgsl_element(&self) -> &'static str {
        match self.components {
            1 => "f32",
            2 => "vec2<f32>",
            _ => "vec4<f32>",
        }
    }

    fn shape(&self) -> String {
        format!("{} x {} floats", self.count, self.components)
    }
}

/// Uniform parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    F32,
    U32,
    I32,
    Vec2,
    Vec4,
}

impl ParamKind {
    fn size(self) -> usize {
        match self {
            ParamKind::F32 | ParamKind::U32 | ParamKind::I32 => 4,
            ParamKind::Vec2 => 8,
            ParamKind::Vec4 => 16,
        }
    }

    fn wgsl(self) -> &'static str {
        match self {
            ParamKind::F32 => "f32",
            ParamKind::U32 => "u32",
            ParamKind::I32 => "i32",
            ParamKind::Vec2 => "vec2<f32>",
            ParamKind::Vec4 => "vec4<f32>",
        }
    }
}

/// Uniform parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    F32(f32),
    U32(u32),
    I32(i32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::F32(_) => ParamKind::F32,
            ParamValue::U32(_) => ParamKind::U32,
            ParamValue::I32(_) => ParamKind::I32,
            ParamValue::Vec2(_) => ParamKind::Vec2,
            ParamValue::Vec4(_) => ParamKind::Vec4,
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            ParamValue::F32(v) => bytemuck::bytes_of(v),
            ParamValue::U32(v) => bytemuck::bytes_of(v),
            ParamValue::I32(v) => bytemuck::bytes_of(v),
            ParamValue::Vec2(v) => bytemuck::bytes_of(v),
            ParamValue::Vec4(v) => bytemuck::bytes_of(v),
        }
    }
}

/// Compile-time constant baked into the kernel source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    U32(u32),
    F32(f32),
}

impl ConstValue {
    fn render(&self, name: &str) -> Result<String> {
        Ok(match self {
            ConstValue::Bool(v) => format!("const {name}: bool = {v};"),
            ConstValue::U32(v) => format!("const {name}: u32 = {v}u;"),
            ConstValue::F32(v) => {
                if !v.is_finite() {
                    return Err(LayoutError::config(
                        "constants",
                        format!("`{name}` must be finite, got {v}"),
                    ));
                }
                format!("const {name}: f32 = {v:?};")
            }
        })
    }
}

/// Byte layout of the `Params` uniform struct (WGSL natural alignment).
#[derive(Debug, Clone, Default)]
pub(crate) struct ParamLayout {
    fields: Vec<(String, ParamKind, usize)>,
    size: usize,
}

impl ParamLayout {
    pub(crate) fn new(params: &[(String, ParamKind)]) -> Self {
        let mut offset: usize = 0;
        let mut align: usize = 4;
        let mut fields = Vec::with_capacity(params.len());
        for (name, kind) in params {
            let field_align = kind.size();
            offset = offset.next_multiple_of(field_align);
            fields.push((name.clone(), *kind, offset));
            offset += kind.size();
            align = align.max(field_align);
        }
        let size = offset.max(4).next_multiple_of(align);
        Self { fields, size }
    }

    fn field(&self, name: &str) -> Option<(ParamKind, usize)> {
        self.fields
            .iter()
            .find(|(field, _, _)| field == name)
            .map(|(_, kind, offset)| (*kind, *offset))
    }

    /// Uniform buffer bytes, padded to the 16-byte uniform granularity.
    pub(crate) fn buffer_size(&self) -> usize {
        self.size.next_multiple_of(16)
    }

    fn render(&self) -> String {
        let mut out = String::from("struct Params {\n");
        if self.fields.is_empty() {
            out.push_str("    unused: u32,\n");
        }
        for (name, kind, _) in &self.fields {
            let _ = writeln!(out, "    {name}: {},", kind.wgsl());
        }
        out.push_str("}\n");
        out
    }
}

/// Declaration of one kernel program.
#[derive(Debug, Clone)]
pub struct KernelSpec {
    label: String,
    body: String,
    inputs: Vec<BufferSpec>,
    outputs: Vec<BufferSpec>,
    params: Vec<(String, ParamKind)>,
    constants: Vec<(String, ConstValue)>,
}

impl KernelSpec {
    /// `body` must define `fn kernel(index: u32)`.
    pub fn new(label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: body.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: Vec::new(),
            constants: Vec::new(),
        }
    }

    pub fn input(mut self, name: impl Into<String>, count: usize, components: u32) -> Self {
        self.inputs.push(BufferSpec::new(name, count, components));
        self
    }

    pub fn output(mut self, name: impl Into<String>, count: usize, components: u32) -> Self {
        self.outputs.push(BufferSpec::new(name, count, components));
        self
    }

    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push((name.into(), kind));
        self
    }

    pub fn constant(mut self, name: impl Into<String>, value: ConstValue) -> Self {
        self.constants.push((name.into(), value));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Elements one dispatch covers; every output shares this count.
    pub fn element_count(&self) -> Result<u32> {
        let first = self.outputs.first().ok_or_else(|| {
            LayoutError::config("outputs", format!("kernel `{}` declares no outputs", self.label))
        })?;
        for output in &self.outputs[1..] {
            if output.count != first.count {
                return Err(LayoutError::BufferMismatch {
                    name: output.name.clone(),
                    expected: format!("{} elements (shared output count)", first.count),
                    found: format!("{} elements", output.count),
                });
            }
        }
        Ok(first.count)
    }

    fn validate(&self) -> Result<()> {
        let mut names: Vec<&str> = Vec::new();
        for buffer in self.inputs.iter().chain(&self.outputs) {
            validate_identifier(&buffer.name)?;
            if !matches!(buffer.components, 1 | 2 | 4) {
                return Err(LayoutError::config(
                    "components",
                    format!(
                        "buffer `{}` has {} components (1, 2 or 4 supported)",
                        buffer.name, buffer.components
                    ),
                ));
            }
            if names.contains(&buffer.name.as_str()) {
                return Err(LayoutError::config(
                    "buffers",
                    format!("kernel `{}` binds `{}` twice", self.label, buffer.name),
                ));
            }
            names.push(&buffer.name);
        }
        for (name, _) in &self.params {
            validate_identifier(name)?;
        }
        Ok(())
    }

    /// Full WGSL source: generated prelude, body, entry point.
    pub fn render(&self) -> Result<String> {
        self.validate()?;
        let element_count = self.element_count()?;
        let layout = ParamLayout::new(&self.params);

        let mut src = String::new();
        let _ = writeln!(src, "// kernel: {}", self.label);
        let _ = writeln!(src, "const ELEMENT_COUNT: u32 = {element_count}u;");
        let _ = writeln!(
            src,
            "const GRID_SIDE: u32 = {}u;",
            square_side(element_count as usize)
        );

        let mut const_names = vec!["ELEMENT_COUNT".to_string(), "GRID_SIDE".to_string()];
        for buffer in self.inputs.iter().chain(&self.outputs) {
            let name = count_constant(&buffer.name);
            let _ = writeln!(src, "const {name}: u32 = {}u;", buffer.count);
            const_names.push(name);
        }
        for (name, value) in &self.constants {
            if const_names.contains(name) {
                return Err(LayoutError::config(
                    "constants",
                    format!("`{name}` collides with a generated constant"),
                ));
            }
            src.push_str(&value.render(name)?);
            src.push('\n');
            const_names.push(name.clone());
        }

        src.push('\n');
        src.push_str(&layout.render());
        src.push_str("@group(0) @binding(0) var<uniform> params: Params;\n");

        let mut binding = 1;
        for input in &self.inputs {
            let _ = writeln!(
                src,
                "@group(0) @binding({binding}) var<storage, read> {}: array<{}>;",
                input.name,
                input.wgsl_element()
            );
            binding += 1;
        }
        for output in &self.outputs {
            let _ = writeln!(
                src,
                "@group(0) @binding({binding}) var<storage, read_write> {}: array<{}>;",
                output.name,
                output.wgsl_element()
            );
            binding += 1;
        }

        src.push('\n');
        src.push_str(&self.body);
        src.push_str(
            r#"

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= GRID_SIDE) {
        return;
    }
    let index = gid.y * GRID_SIDE + gid.x;
    if (index >= ELEMENT_COUNT) {
        return;
    }
    kernel(index);
}
"#,
        );
        Ok(src)
    }
}

fn count_constant(name: &str) -> String {
    format!("{}_COUNT", name.to_ascii_uppercase())
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.contains("__")
        && !RESERVED.contains(&name);
    if valid {
        Ok(())
    } else {
        Err(LayoutError::config(
            "names",
            format!("`{name}` is not a usable kernel identifier"),
        ))
    }
}

/// Shared handle to one GPU storage buffer.
#[derive(Clone)]
pub(crate) struct BufferSlot {
    inner: Rc<SlotInner>,
}

struct SlotInner {
    spec: BufferSpec,
    buffer: RefCell<wgpu::Buffer>,
    version: Cell<u64>,
}

impl Drop for SlotInner {
    fn drop(&mut self) {
        self.buffer.get_mut().destroy();
    }
}

impl BufferSlot {
    fn allocate(ctx: &GpuContext, spec: &BufferSpec) -> Self {
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&spec.name),
            size: spec.capacity() as u64 * spec.stride(),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            inner: Rc::new(SlotInner {
                spec: spec.clone(),
                buffer: RefCell::new(buffer),
                version: Cell::new(0),
            }),
        }
    }

    pub(crate) fn spec(&self) -> &BufferSpec {
        &self.inner.spec
    }

    pub(crate) fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub(crate) fn handle(&self) -> Ref<'_, wgpu::Buffer> {
        self.inner.buffer.borrow()
    }

    fn version(&self) -> u64 {
        self.inner.version.get()
    }

    pub(crate) fn same_slot(&self, other: &BufferSlot) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Error unless `other` has this slot's name-independent shape.
    pub(crate) fn check_shape(&self, other: &BufferSpec) -> Result<()> {
        let spec = self.spec();
        if spec.count != other.count || spec.components != other.components {
            return Err(LayoutError::BufferMismatch {
                name: other.name.clone(),
                expected: spec.shape(),
                found: other.shape(),
            });
        }
        Ok(())
    }

    fn swap_contents(&self, other: &BufferSlot) -> Result<()> {
        if self.same_slot(other) {
            return Err(LayoutError::config(
                "swap",
                format!("`{}` and `{}` share one buffer", self.name(), other.name()),
            ));
        }
        self.check_shape(other.spec())?;
        self.inner.buffer.swap(&other.inner.buffer);
        self.inner.version.set(self.version() + 1);
        other.inner.version.set(other.version() + 1);
        Ok(())
    }
}

struct BoundGroup {
    group: wgpu::BindGroup,
    versions: Vec<u64>,
}

/// A compiled compute kernel and its buffer bindings.
pub struct KernelProgram {
    label: String,
    inputs: Vec<BufferSlot>,
    outputs: Vec<BufferSlot>,
    params: ParamLayout,
    param_bytes: Vec<u8>,
    uniform: wgpu::Buffer,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    element_count: u32,
    bound: Option<BoundGroup>,
}

impl KernelProgram {
    /// Compile `spec` and allocate its buffers.
    pub fn new(ctx: &GpuContext, spec: KernelSpec) -> Result<Self> {
        let source = spec.render()?;
        let element_count = spec.element_count()?;

        let storage = (spec.inputs.len() + spec.outputs.len()) as u32;
        if storage > ctx.max_storage_buffers() {
            return Err(LayoutError::MissingCapability(format!(
                "kernel `{}` binds {storage} storage buffers, device allows {}",
                spec.label,
                ctx.max_storage_buffers()
            )));
        }

        let params = ParamLayout::new(&spec.params);
        let uniform = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Params Buffer"),
            size: params.buffer_size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        let read_only = spec
            .inputs
            .iter()
            .map(|_| true)
            .chain(spec.outputs.iter().map(|_| false));
        for (i, read_only) in read_only.enumerate() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: i as u32 + 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        let (bind_group_layout, pipeline) = ctx.validated(&spec.label, || {
            let shader = ctx
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&spec.label),
                    source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
                });

            let bind_group_layout =
                ctx.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(&spec.label),
                        entries: &entries,
                    });

            let pipeline_layout =
                ctx.device
                    .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some(&spec.label),
                        bind_group_layouts: &[&bind_group_layout],
                        push_constant_ranges: &[],
                    });

            let pipeline =
                ctx.device
                    .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(&spec.label),
                        layout: Some(&pipeline_layout),
                        module: &shader,
                        entry_point: Some("main"),
                        compilation_options: Default::default(),
                        cache: None,
                    });
            (bind_group_layout, pipeline)
        })?;

        tracing::debug!(
            kernel = %spec.label,
            elements = element_count,
            inputs = spec.inputs.len(),
            outputs = spec.outputs.len(),
            "Compiled kernel"
        );

        Ok(Self {
            inputs: spec
                .inputs
                .iter()
                .map(|b| BufferSlot::allocate(ctx, b))
                .collect(),
            outputs: spec
                .outputs
                .iter()
                .map(|b| BufferSlot::allocate(ctx, b))
                .collect(),
            param_bytes: vec![0; params.buffer_size()],
            params,
            uniform,
            pipeline,
            bind_group_layout,
            element_count,
            label: spec.label,
            bound: None,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inputs.iter().map(BufferSlot::name)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.outputs.iter().map(BufferSlot::name)
    }

    pub(crate) fn inputs(&self) -> &[BufferSlot] {
        &self.inputs
    }

    pub(crate) fn outputs(&self) -> &[BufferSlot] {
        &self.outputs
    }

    fn slots(&self) -> impl Iterator<Item = &BufferSlot> + '_ {
        self.inputs.iter().chain(&self.outputs)
    }

    pub(crate) fn slot(&self, name: &str) -> Result<&BufferSlot> {
        self.slots()
            .find(|slot| slot.name() == name)
            .ok_or_else(|| LayoutError::UnknownBuffer {
                program: self.label.clone(),
                name: name.to_string(),
            })
    }

    /// Point `name` at `slot`, dropping this program's previous buffer.
    pub(crate) fn rebind(&mut self, name: &str, slot: &BufferSlot) -> Result<()> {
        let label = &self.label;
        let current = self
            .inputs
            .iter_mut()
            .chain(self.outputs.iter_mut())
            .find(|current| current.name() == name)
            .ok_or_else(|| LayoutError::UnknownBuffer {
                program: label.clone(),
                name: name.to_string(),
            })?;
        if current.same_slot(slot) {
            return Ok(());
        }
        slot.check_shape(current.spec())?;
        *current = slot.clone();
        self.bound = None;
        Ok(())
    }

    /// Build (or refresh) the bind group over the current slot contents.
    pub fn prepare(&mut self, ctx: &GpuContext) {
        let versions: Vec<u64> = self.slots().map(BufferSlot::version).collect();
        if matches!(&self.bound, Some(bound) if bound.versions == versions) {
            return;
        }

        let group = {
            let buffers: Vec<Ref<'_, wgpu::Buffer>> =
                self.slots().map(BufferSlot::handle).collect();
            let mut entries = vec![wgpu::BindGroupEntry {
                binding: 0,
                resource: self.uniform.as_entire_binding(),
            }];
            entries.extend(
                buffers
                    .iter()
                    .enumerate()
                    .map(|(i, buffer)| wgpu::BindGroupEntry {
                        binding: i as u32 + 1,
                        resource: buffer.as_entire_binding(),
                    }),
            );
            let group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&self.label),
                layout: &self.bind_group_layout,
                entries: &entries,
            });
            group
        };
        self.bound = Some(BoundGroup { group, versions });
    }

    /// Bind pipeline and buffers on `pass`. Requires [`Self::prepare`].
    pub fn activate(&self, pass: &mut wgpu::ComputePass<'_>) -> Result<()> {
        let bound = self.bound.as_ref().ok_or(LayoutError::NotInitialized)?;
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bound.group, &[]);
        Ok(())
    }

    /// Write named uniform parameters.
    pub fn set_parameters(&mut self, ctx: &GpuContext, values: &[(&str, ParamValue)]) -> Result<()> {
        for (name, value) in values {
            let (kind, offset) =
                self.params
                    .field(name)
                    .ok_or_else(|| LayoutError::UnknownParameter {
                        program: self.label.clone(),
                        name: name.to_string(),
                    })?;
            if kind != value.kind() {
                return Err(LayoutError::config(
                    "parameters",
                    format!(
                        "`{name}` on `{}` is {kind:?}, got {:?}",
                        self.label,
                        value.kind()
                    ),
                ));
            }
            let bytes = value.bytes();
            self.param_bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        ctx.queue.write_buffer(&self.uniform, 0, &self.param_bytes);
        Ok(())
    }

    /// Upload `count` elements of raw floats into buffer `name`.
    pub fn set_buffer_data(
        &self,
        ctx: &GpuContext,
        name: &str,
        data: &[f32],
        count: usize,
    ) -> Result<()> {
        let slot = self.slot(name)?;
        let spec = slot.spec();
        if count > spec.count as usize || data.len() != count * spec.components as usize {
            return Err(LayoutError::BufferMismatch {
                name: name.to_string(),
                expected: format!("at most {}", spec.shape()),
                found: format!("{} floats for {count} elements", data.len()),
            });
        }
        if !data.is_empty() {
            ctx.queue
                .write_buffer(&slot.handle(), 0, bytemuck::cast_slice(data));
        }
        Ok(())
    }

    /// Upload typed records; the element count follows from the record size.
    pub fn upload<T: bytemuck::Pod>(&self, ctx: &GpuContext, name: &str, data: &[T]) -> Result<()> {
        let floats: &[f32] = bytemuck::cast_slice(data);
        let components = self.slot(name)?.spec().components as usize;
        self.set_buffer_data(ctx, name, floats, floats.len() / components)
    }

    /// Run the kernel once over every element, as its own submission.
    pub fn execute(&mut self, ctx: &GpuContext) -> Result<()> {
        self.prepare(ctx);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&self.label),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&self.label),
                timestamp_writes: None,
            });
            self.activate(&mut pass)?;
            let groups = square_side(self.element_count as usize).div_ceil(WORKGROUP_SIDE);
            pass.dispatch_workgroups(groups, groups, 1);
        }
        ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    /// Exchange the buffers behind an input and an output (no copy).
    pub fn swap(&mut self, input: &str, output: &str) -> Result<()> {
        let find = |slots: &[BufferSlot], name: &str| {
            slots
                .iter()
                .find(|slot| slot.name() == name)
                .cloned()
                .ok_or_else(|| LayoutError::UnknownBuffer {
                    program: self.label.clone(),
                    name: name.to_string(),
                })
        };
        let input = find(&self.inputs, input)?;
        let output = find(&self.outputs, output)?;
        input.swap_contents(&output)
    }

    /// Read buffer `name` back (logical elements only).
    pub fn get_output(&self, ctx: &GpuContext, name: &str) -> Result<Vec<f32>> {
        let slot = self.slot(name)?;
        let spec = slot.spec();
        ctx.read_buffer(&slot.handle(), (spec.count * spec.components) as usize)
    }

    /// Typed variant of [`Self::get_output`].
    pub fn read<T: bytemuck::Pod>(&self, ctx: &GpuContext, name: &str) -> Result<Vec<T>> {
        let floats = self.get_output(ctx, name)?;
        Ok(bytemuck::cast_slice::<f32, T>(&floats).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_layout_follows_wgsl_alignment() {
        let layout = ParamLayout::new(&[
            ("a".into(), ParamKind::F32),
            ("b".into(), ParamKind::Vec2),
            ("c".into(), ParamKind::U32),
            ("d".into(), ParamKind::Vec4),
        ]);
        assert_eq!(layout.field("a"), Some((ParamKind::F32, 0)));
        assert_eq!(layout.field("b"), Some((ParamKind::Vec2, 8)));
        assert_eq!(layout.field("c"), Some((ParamKind::U32, 16)));
        assert_eq!(layout.field("d"), Some((ParamKind::Vec4, 32)));
        assert_eq!(layout.buffer_size(), 48);
    }

    #[test]
    fn test_empty_param_layout_still_allocates() {
        let layout = ParamLayout::new(&[]);
        assert_eq!(layout.buffer_size(), 16);
        assert!(layout.render().contains("unused: u32"));
    }

    #[test]
    fn test_render_declares_bindings_and_counts() {
        let spec = KernelSpec::new("demo", "fn kernel(index: u32) {}")
            .input("nodes", 10, 4)
            .input("edges", 3, 2)
            .output("nodes_out", 10, 4)
            .param("gravity", ParamKind::F32)
            .constant("LIN_LOG", ConstValue::Bool(true))
            .constant("THETA", ConstValue::F32(0.5));
        let src = spec.render().unwrap();
        assert!(src.contains("const ELEMENT_COUNT: u32 = 10u;"));
        assert!(src.contains("const GRID_SIDE: u32 = 4u;"));
        assert!(src.contains("const EDGES_COUNT: u32 = 3u;"));
        assert!(src.contains("const LIN_LOG: bool = true;"));
        assert!(src.contains("const THETA: f32 = 0.5;"));
        assert!(src.contains("@binding(1) var<storage, read> nodes: array<vec4<f32>>;"));
        assert!(src.contains("@binding(2) var<storage, read> edges: array<vec2<f32>>;"));
        assert!(src.contains("@binding(3) var<storage, read_write> nodes_out: array<vec4<f32>>;"));
        assert!(src.contains("gravity: f32,"));
    }

    #[test]
    fn test_outputs_must_share_count() {
        let spec = KernelSpec::new("bad", "")
            .output("a", 4, 1)
            .output("b", 5, 1);
        assert!(matches!(
            spec.element_count(),
            Err(LayoutError::BufferMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_names_and_widths() {
        let reserved = KernelSpec::new("bad", "").output("target", 4, 1);
        assert!(reserved.render().is_err());
        let upper = KernelSpec::new("bad", "").output("Nodes", 4, 1);
        assert!(upper.render().is_err());
        let width = KernelSpec::new("bad", "").output("nodes", 4, 3);
        assert!(width.render().is_err());
        let twice = KernelSpec::new("bad", "")
            .input("nodes", 4, 4)
            .output("nodes", 4, 4);
        assert!(twice.render().is_err());
    }

    #[test]
    fn test_constant_collision_is_rejected() {
        let spec = KernelSpec::new("bad", "")
            .output("nodes", 4, 4)
            .constant("NODES_COUNT", ConstValue::U32(1));
        assert!(spec.render().is_err());
    }

    #[test]
    fn test_capacity_is_square() {
        assert_eq!(BufferSpec::new("a", 10, 1).capacity(), 16);
        assert_eq!(BufferSpec::new("a", 0, 1).capacity(), 1);
    }
}
