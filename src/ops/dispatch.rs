//! Launch Dispatch Layer
//!
//! This module selects the launch implementation for a runtime's [`Arch`] and
//! owns the only code paths that mutate fields on behalf of a kernel.
//!
//! # Design Highlights
//! - **Two-phase**: trace everything against an immutable snapshot, then merge
//! - **Ordered merge**: stores overwrite and atomic adds accumulate in
//!   iteration order, regardless of which thread traced them

use log::trace;

use crate::backend::Arch;
use crate::error::Result;
use crate::field::Field;
use crate::kernel::{Kernel, WriteMode};

/// Runs `kernel` forward and applies its writes.
///
/// # Returns
/// Number of iterations executed.
pub fn launch(arch: Arch, kernel: &Kernel, fields: &mut [Field]) -> Result<usize> {
    let traces = match arch {
        Arch::Cpu => super::cpu::forward(kernel, fields)?,
        Arch::Serial => super::serial::forward(kernel, fields)?,
    };

    let mut writes = 0usize;
    for t in &traces {
        for (w, value) in t.writes() {
            let slot = &mut fields[w.field].value.data[w.index];
            match w.mode {
                WriteMode::Store => *slot = value,
                WriteMode::AtomicAdd => *slot += value,
            }
            writes += 1;
        }
    }
    trace!(
        "launched `{}` on {arch:?}: {} iterations, {writes} writes",
        kernel.name(),
        traces.len()
    );
    Ok(traces.len())
}

/// Runs the reverse sweep of `kernel` and accumulates into gradient buffers.
///
/// # Returns
/// Number of gradient contributions applied.
pub fn launch_grad(arch: Arch, kernel: &Kernel, fields: &mut [Field]) -> Result<usize> {
    let contributions = match arch {
        Arch::Cpu => super::cpu::backward(kernel, fields)?,
        Arch::Serial => super::serial::backward(kernel, fields)?,
    };

    for c in &contributions {
        if let Some(grad) = &mut fields[c.field].grad {
            grad.data[c.index] += c.value;
        }
    }
    trace!(
        "launched `{}.grad` on {arch:?}: {} contributions",
        kernel.name(),
        contributions.len()
    );
    Ok(contributions.len())
}
