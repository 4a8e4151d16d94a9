//! Parallel CPU launches.
//!
//! # CPU Arch
//!
//! The default when a runtime is created with [`Arch::Cpu`](crate::backend::Arch::Cpu).
//! Every iteration of a kernel is traced independently, so iterations fan out
//! over the rayon pool with no synchronization beyond the final collect.
//!
//! ## Design Goals
//!
//! - Deterministic results: traces are collected in index order and merged
//!   sequentially by the dispatcher
//! - Zero dependencies beyond `rayon`

use rayon::prelude::*;

use crate::error::Result;
use crate::field::Field;
use crate::kernel::{Contribution, Kernel, Trace};

/// Traces every iteration of `kernel` in parallel.
///
/// # Returns
/// - One trace per iteration, in iteration order
/// - A fault from one of the iterations if any faulted
pub(crate) fn forward(kernel: &Kernel, fields: &[Field]) -> Result<Vec<Trace>> {
    let n = kernel.extent(fields)?;
    (0..n)
        .into_par_iter()
        .map(|i| kernel.trace(fields, i))
        .collect()
}

/// Re-traces and reverse-sweeps every iteration of `kernel` in parallel.
///
/// # Returns
/// Gradient contributions of all iterations, grouped by iteration in order.
pub(crate) fn backward(kernel: &Kernel, fields: &[Field]) -> Result<Vec<Contribution>> {
    let n = kernel.extent(fields)?;
    let per_iteration: Vec<Vec<Contribution>> = (0..n)
        .into_par_iter()
        .map(|i| kernel.trace(fields, i).map(|t| t.backward(fields)))
        .collect::<Result<_>>()?;
    Ok(per_iteration.into_iter().flatten().collect())
}
