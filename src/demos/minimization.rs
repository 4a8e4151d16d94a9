//! Vector minimization.
//!
//! `x` and `y` start uniform in `[0, 1)`. Each iteration differentiates
//! `L = Σ 0.5 (x[i] - y[i])²` through a tape and steps `x` against `dL/dx`,
//! which is `x - y`, so `x` converges geometrically onto `y`.

use log::info;
use rand::Rng;

use crate::config::MinimizationConfig;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::optim::GradientDescent;
use crate::plot::{BLACK_RGB, BLUE_RGB, Figure, Panel, Series};
use crate::runtime::Runtime;

use super::{Run, RunReport, check_finite, place_snapshot, rng_from};

/// Runs the minimization without reporting progress.
pub fn run(config: &MinimizationConfig) -> Result<Run> {
    run_with(config, |_, _| {})
}

/// Runs the minimization, calling `on_report(iteration, loss)` at every report.
pub fn run_with<F>(config: &MinimizationConfig, mut on_report: F) -> Result<Run>
where
    F: FnMut(usize, f32),
{
    config.validate()?;
    let n = config.n;
    let mut rng = rng_from(config.seed);

    let mut rt = Runtime::new(config.arch);
    let x = rt.vector("x", n, true)?;
    let y = rt.vector("y", n, false)?;
    let loss = rt.scalar("loss", true);

    for i in 0..n {
        rt.set(x, i, rng.random())?;
        rt.set(y, i, rng.random())?;
    }

    let compute_loss = Kernel::range("compute_loss", n, move |s, i| {
        let d = s.load(x, i) - s.load(y, i);
        s.atomic_add(loss, 0, 0.5 * d.powi(2));
    });
    let update = GradientDescent::new(config.learning_rate).kernel(x);

    info!(
        "minimizing {n} elements for {} iterations on {:?}",
        config.iterations,
        rt.arch()
    );
    let target = rt.to_vec(y)?;
    let mut figure = Figure::new(config.panel_rows, config.panel_cols, config.figure_size);
    let mut report = RunReport {
        losses: Vec::with_capacity(config.iterations),
        ..RunReport::default()
    };

    for k in 0..config.iterations {
        rt.tape(loss, |rt| rt.launch(&compute_loss))?;
        rt.launch(&update)?;

        let value = rt.get(loss, 0)?;
        check_finite(k, value)?;
        report.losses.push(value);

        if k % config.report_every == 0 {
            on_report(k, value);
            report.reported.push((k, value));
            let panel = Panel::new(format!("Step {k}"))
                .with_series(Series::indexed("Prediction", BLUE_RGB, &rt.to_vec(x)?))
                .with_series(Series::indexed("Target", BLACK_RGB, &target));
            place_snapshot(&mut figure, k / config.report_every, panel)?;
        }
    }

    report.params = rt.to_vec(x)?;
    info!(
        "minimization finished after {} launches, final loss {:?}",
        rt.launch_count(),
        report.final_loss()
    );
    Ok(Run { report, figure })
}
