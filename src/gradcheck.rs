//! Finite-difference validation of tape gradients.
//!
//! Computes `dL/dparam` once through [`Runtime::tape`] and once per element by
//! central differences, re-running the forward kernels with `loss` reset to
//! zero before each evaluation. The loss must be the only field the forward
//! kernels accumulate into.

use log::debug;

use crate::error::Result;
use crate::field::FieldId;
use crate::kernel::Kernel;
use crate::runtime::Runtime;

/// Outcome of [`check_gradients`].
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckReport {
    pub analytic: Vec<f32>,
    pub numeric: Vec<f32>,
    /// Largest `|analytic - numeric|`.
    pub max_abs_error: f32,
    /// Element where `max_abs_error` occurs.
    pub worst_index: usize,
}

impl GradCheckReport {
    /// Every element agrees within `tolerance`, scaled by the gradient magnitude when above 1.
    pub fn passed(&self, tolerance: f32) -> bool {
        self.analytic
            .iter()
            .zip(&self.numeric)
            .all(|(&a, &n)| (a - n).abs() <= tolerance * a.abs().max(n.abs()).max(1.0))
    }
}

/// Compares tape gradients of `loss` w.r.t. `param` with central differences.
///
/// `param` is restored to its original values before returning, but the
/// gradients left behind are the tape's.
pub fn check_gradients(
    rt: &mut Runtime,
    loss: FieldId,
    param: FieldId,
    forward: &[Kernel],
    epsilon: f32,
) -> Result<GradCheckReport> {
    let original = rt.to_vec(param)?;

    let mut numeric = Vec::with_capacity(original.len());
    for (i, &v) in original.iter().enumerate() {
        rt.set(param, i, v + epsilon)?;
        let plus = evaluate(rt, loss, forward)?;
        rt.set(param, i, v - epsilon)?;
        let minus = evaluate(rt, loss, forward)?;
        rt.set(param, i, v)?;
        numeric.push((plus - minus) / (2.0 * epsilon));
    }

    rt.tape(loss, |rt| {
        for kernel in forward {
            rt.launch(kernel)?;
        }
        Ok(())
    })?;
    let analytic = rt.grad_to_vec(param)?;

    let (worst_index, max_abs_error) = analytic
        .iter()
        .zip(&numeric)
        .map(|(a, n)| (a - n).abs())
        .enumerate()
        .fold((0, 0.0f32), |best, (i, e)| if e > best.1 { (i, e) } else { best });
    debug!("gradient check: max error {max_abs_error} at element {worst_index}");

    Ok(GradCheckReport {
        analytic,
        numeric,
        max_abs_error,
        worst_index,
    })
}

fn evaluate(rt: &mut Runtime, loss: FieldId, forward: &[Kernel]) -> Result<f32> {
    rt.set(loss, 0, 0.0)?;
    for kernel in forward {
        rt.launch(kernel)?;
    }
    rt.get(loss, 0)
}
