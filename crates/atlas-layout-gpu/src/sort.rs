//! Bitonic sort of `(payload, key)` pairs on the GPU.
//!
//! The sorter reads and writes buffer `<name>` (with `<name>_out` as its
//! ping-pong partner). Producers wired to `<name>` fill it, including the
//! padding up to the next power of two, then [`BitonicSort::sort`] leaves
//! the ordered entries back under `<name>`.

use crate::gpu::GpuContext;
use crate::kernel::{KernelProgram, KernelSpec, ParamKind, ParamValue};
use crate::{LayoutError, Result, SortEntry};

const SORT_PASS_WGSL: &str = r#"
fn ordered_before(a: vec2<f32>, b: vec2<f32>) -> bool {
    return a.y < b.y || (a.y == b.y && a.x < b.x);
}

fn kernel(index: u32) {
    let partner = index ^ (1u << params.partner_bit);
    let own = {{NAME}}[index];
    let other = {{NAME}}[partner];
    let ascending = ((index >> (params.stage + 1u)) & 1u) == 0u;
    let keep_lower = (index < partner) == ascending;

    var lower = own;
    var upper = other;
    if (ordered_before(other, own)) {
        lower = other;
        upper = own;
    }
    if (keep_lower) {
        {{NAME}}_out[index] = lower;
    } else {
        {{NAME}}_out[index] = upper;
    }
}
"#;

/// `(stage, partner_bit)` for every pass of the merge network over `padded`
/// elements. Stage `s` runs `s + 1` passes with partner bits `s, s-1, .., 0`.
pub(crate) fn pass_plan(padded: usize) -> Vec<(u32, u32)> {
    let stages = padded.max(1).trailing_zeros();
    (0..stages)
        .flat_map(|stage| (0..=stage).map(move |step| (stage, stage - step)))
        .collect()
}

/// Generic key/payload sorter over a power-of-two buffer.
pub struct BitonicSort {
    program: KernelProgram,
    name: String,
    len: usize,
    padded: usize,
}

impl BitonicSort {
    /// Sorter for `len` logical entries stored under buffer `name`.
    pub fn new(ctx: &GpuContext, name: &str, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(LayoutError::config("sort", "cannot sort zero entries"));
        }
        let padded = len.next_power_of_two();
        let output = format!("{name}_out");
        let spec = KernelSpec::new(
            format!("bitonic_{name}"),
            SORT_PASS_WGSL.replace("{{NAME}}", name),
        )
        .input(name, padded, 2)
        .output(output, padded, 2)
        .param("stage", ParamKind::U32)
        .param("partner_bit", ParamKind::U32);

        Ok(Self {
            program: KernelProgram::new(ctx, spec)?,
            name: name.to_string(),
            len,
            padded,
        })
    }

    /// Logical entry count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated entry count (next power of two).
    pub fn padded_len(&self) -> usize {
        self.padded
    }

    pub fn buffer_name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &KernelProgram {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut KernelProgram {
        &mut self.program
    }

    /// Upload entries from the host, padding with `(index, sentinel)`.
    pub fn set_entries(&self, ctx: &GpuContext, entries: &[SortEntry], sentinel: f32) -> Result<()> {
        if entries.len() != self.len {
            return Err(LayoutError::BufferMismatch {
                name: self.name.clone(),
                expected: format!("{} entries", self.len),
                found: format!("{} entries", entries.len()),
            });
        }
        if let Some(bad) = entries.iter().find(|entry| entry.key >= sentinel) {
            return Err(LayoutError::config(
                "sentinel",
                format!("key {} is not below sentinel {sentinel}", bad.key),
            ));
        }
        let mut padded = entries.to_vec();
        padded.extend((self.len..self.padded).map(|index| SortEntry {
            payload: index as f32,
            key: sentinel,
        }));
        self.program.upload(ctx, &self.name, &padded)
    }

    /// Run the full merge network; the result lands back in the input buffer.
    pub fn sort(&mut self, ctx: &GpuContext) -> Result<()> {
        let plan = pass_plan(self.padded);
        tracing::debug!(buffer = %self.name, entries = self.padded, passes = plan.len(), "Bitonic sort");
        let output = format!("{}_out", self.name);
        for (stage, partner_bit) in plan {
            self.program.set_parameters(
                ctx,
                &[
                    ("stage", ParamValue::U32(stage)),
                    ("partner_bit", ParamValue::U32(partner_bit)),
                ],
            )?;
            self.program.execute(ctx)?;
            self.program.swap(&self.name, &output)?;
        }
        Ok(())
    }

    /// Sorted entries truncated to the logical length.
    pub fn sorted_entries(&self, ctx: &GpuContext) -> Result<Vec<SortEntry>> {
        let mut entries: Vec<SortEntry> = self.program.read(ctx, &self.name)?;
        entries.truncate(self.len);
        Ok(entries)
    }

    /// Payloads in key order, truncated to the logical length.
    pub fn sorted_payloads(&self, ctx: &GpuContext) -> Result<Vec<u32>> {
        Ok(self
            .sorted_entries(ctx)?
            .into_iter()
            .map(|entry| entry.payload as u32)
            .collect())
    }
}
