//! The two gradient descent drivers.
//!
//! - [`minimization`] — pulls a random vector onto a random target
//! - [`regression`] — fits polynomial coefficients to noisy cubic samples
//!
//! Both build their fields and kernels on a fresh [`Runtime`](crate::runtime::Runtime),
//! alternate a differentiated loss launch with an update launch, and snapshot
//! panels into a [`Figure`] at a fixed interval.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::plot::{Figure, Panel};

pub mod minimization;
pub mod regression;

/// Numbers collected during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Loss of every iteration, measured before that iteration's update.
    pub losses: Vec<f32>,
    /// `(iteration, loss)` pairs at each report.
    pub reported: Vec<(usize, f32)>,
    /// Parameters after the final update.
    pub params: Vec<f32>,
}

impl RunReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.losses.last().copied()
    }
}

/// A finished run: its numbers and the figure still to be saved.
#[derive(Debug, Clone)]
pub struct Run {
    pub report: RunReport,
    pub figure: Figure,
}

/// Formats a loss the way a report line prints it: plain decimals in
/// `[1e-4, 1e16)`, scientific notation outside that range.
pub fn format_loss(loss: f32) -> String {
    let magnitude = loss.abs();
    if magnitude != 0.0 && magnitude.is_finite() && !(1e-4..1e16).contains(&magnitude) {
        format!("{loss:e}")
    } else {
        format!("{loss}")
    }
}

pub(crate) fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

pub(crate) fn check_finite(iteration: usize, loss: f32) -> Result<()> {
    if !loss.is_finite() {
        return Err(Error::Diverged { iteration, loss });
    }
    Ok(())
}

/// Places snapshot number `slot` column-major into `figure`, skipping overflow.
pub(crate) fn place_snapshot(figure: &mut Figure, slot: usize, panel: Panel) -> Result<()> {
    let (row, col) = (slot % figure.rows(), slot / figure.rows());
    if !figure.contains(row, col) {
        log::warn!(
            "snapshot {slot} does not fit the {}x{} grid, skipping",
            figure.rows(),
            figure.cols()
        );
        return Ok(());
    }
    figure.set(row, col, panel)
}
