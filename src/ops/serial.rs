//! Single-threaded launches.
//!
//! Mirrors [`cpu`](super::cpu) without the rayon pool; useful for debugging
//! kernel bodies and for environments where spawning threads is undesirable.

use crate::error::Result;
use crate::field::Field;
use crate::kernel::{Contribution, Kernel, Trace};

/// Traces every iteration of `kernel` in order.
pub(crate) fn forward(kernel: &Kernel, fields: &[Field]) -> Result<Vec<Trace>> {
    let n = kernel.extent(fields)?;
    (0..n).map(|i| kernel.trace(fields, i)).collect()
}

/// Re-traces every iteration of `kernel` and sweeps it in reverse.
pub(crate) fn backward(kernel: &Kernel, fields: &[Field]) -> Result<Vec<Contribution>> {
    let n = kernel.extent(fields)?;
    let mut out = Vec::new();
    for i in 0..n {
        out.extend(kernel.trace(fields, i)?.backward(fields));
    }
    Ok(out)
}
