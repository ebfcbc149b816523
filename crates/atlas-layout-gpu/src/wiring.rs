//! Global buffer-name resolution across kernel programs.
//!
//! Programs are visited in order. The first program to declare a name owns
//! its buffer, whether the declaration is an input (a new source) or an
//! output (a producer). Every later declaration of that name is rebound to
//! the owner's buffer after a shape check, and the duplicate allocation is
//! released. Wiring an already wired set is a no-op.

use crate::kernel::{BufferSpec, KernelProgram};
use crate::{LayoutError, Result};

/// What [`wire`] decided, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WiringReport {
    /// Names published by their first declaring program: `(program, name)`.
    pub sources: Vec<(String, String)>,
    /// Later declarations pointed at an existing buffer: `(program, name)`.
    pub rebound: Vec<(String, String)>,
}

impl WiringReport {
    pub fn is_source(&self, name: &str) -> bool {
        self.sources.iter().any(|(_, source)| source == name)
    }

    fn merge(&mut self, other: WiringReport) {
        self.sources.extend(other.sources);
        self.rebound.extend(other.rebound);
    }
}

/// Buffers one program declares, inputs first.
struct Declaration<'a> {
    label: &'a str,
    buffers: Vec<&'a BufferSpec>,
}

/// For every program and buffer, the index of the program owning the name.
fn resolve(declarations: &[Declaration<'_>]) -> Result<Vec<Vec<usize>>> {
    let mut owners: Vec<(&str, usize, &BufferSpec)> = Vec::new();
    let mut plan = Vec::with_capacity(declarations.len());

    for (index, declaration) in declarations.iter().enumerate() {
        let mut row = Vec::with_capacity(declaration.buffers.len());
        for buffer in &declaration.buffers {
            match owners.iter().find(|(name, _, _)| *name == buffer.name) {
                Some((_, owner, spec)) => {
                    if spec.count != buffer.count || spec.components != buffer.components {
                        return Err(LayoutError::BufferMismatch {
                            name: buffer.name.clone(),
                            expected: format!(
                                "{} x {} from `{}`",
                                spec.count, spec.components, declarations[*owner].label
                            ),
                            found: format!(
                                "{} x {} in `{}`",
                                buffer.count, buffer.components, declaration.label
                            ),
                        });
                    }
                    row.push(*owner);
                }
                None => {
                    owners.push((&buffer.name, index, buffer));
                    row.push(index);
                }
            }
        }
        plan.push(row);
    }
    Ok(plan)
}

/// Resolve buffer names across `programs` so each name has one buffer.
pub fn wire(programs: &mut [&mut KernelProgram]) -> Result<WiringReport> {
    let plan = {
        let declarations: Vec<Declaration<'_>> = programs
            .iter()
            .map(|program| Declaration {
                label: program.label(),
                buffers: program
                    .inputs()
                    .iter()
                    .chain(program.outputs())
                    .map(|slot| slot.spec())
                    .collect(),
            })
            .collect();
        resolve(&declarations)?
    };

    let mut report = WiringReport::default();
    for (index, owners) in plan.iter().enumerate() {
        let names: Vec<String> = programs[index]
            .input_names()
            .chain(programs[index].output_names())
            .map(str::to_string)
            .collect();
        let mut step = WiringReport::default();
        for (name, &owner) in names.iter().zip(owners) {
            let label = programs[index].label().to_string();
            if owner == index {
                step.sources.push((label, name.clone()));
                continue;
            }
            let slot = programs[owner].slot(name)?.clone();
            programs[index].rebind(name, &slot)?;
            tracing::debug!(
                program = %label,
                buffer = %name,
                owner = %programs[owner].label(),
                "Rebound buffer"
            );
            step.rebound.push((label, name.clone()));
        }

        let program = &programs[index];
        for input in program.inputs() {
            if program.outputs().iter().any(|output| output.same_slot(input)) {
                return Err(LayoutError::config(
                    "wiring",
                    format!(
                        "`{}` reads and writes `{}` through one buffer",
                        program.label(),
                        input.name()
                    ),
                ));
            }
        }
        report.merge(step);
    }
    Ok(report)
}
