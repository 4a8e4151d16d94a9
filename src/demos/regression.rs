//! Polynomial regression.
//!
//! Samples `v` uniform in `[-2.5, 2.5)` with targets
//! `(v - 1)(v - 2)(v + 2)` plus uniform noise in `[-0.5, 0.5)`, then fits
//! `est(v) = Σ_j coeffs[j] · v^j` by gradient descent on
//! `loss = Σ 0.5 (y[i] - est(x[i]))²`.

use log::info;
use rand::Rng;

use crate::config::RegressionConfig;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::optim::GradientDescent;
use crate::plot::{BLUE_RGB, Figure, Panel, RED_RGB, Series};
use crate::runtime::Runtime;

use super::{Run, RunReport, check_finite, place_snapshot, rng_from};

/// Points the prediction curve is sampled at.
const CURVE_POINTS: usize = 200;
const CURVE_SPAN: (f64, f64) = (-3.0, 3.0);

/// The noiseless curve the samples are drawn around.
pub fn target_curve(v: f32) -> f32 {
    (v - 1.0) * (v - 2.0) * (v + 2.0)
}

/// Evaluates `Σ_j coeffs[j] · v^j`.
pub fn polynomial(v: f64, coeffs: &[f32]) -> f64 {
    coeffs
        .iter()
        .rev()
        .fold(0.0, |acc, &c| acc * v + f64::from(c))
}

/// Runs the regression without reporting progress.
pub fn run(config: &RegressionConfig) -> Result<Run> {
    run_with(config, |_, _| {})
}

/// Runs the regression, calling `on_report(iteration, loss)` at every report.
pub fn run_with<F>(config: &RegressionConfig, mut on_report: F) -> Result<Run>
where
    F: FnMut(usize, f32),
{
    config.validate()?;
    let mut rng = rng_from(config.seed);

    let mut rt = Runtime::new(config.arch);
    let x = rt.vector("x", config.samples, true)?;
    let y = rt.vector("y", config.samples, true)?;
    let coeffs = rt.vector("coeffs", config.coeffs, true)?;
    let loss = rt.scalar("loss", true);

    let mut data = Vec::with_capacity(config.samples);
    for i in 0..config.samples {
        let v = rng.random::<f32>() * 5.0 - 2.5;
        let t = target_curve(v) + rng.random::<f32>() - 0.5;
        rt.set(x, i, v)?;
        rt.set(y, i, t)?;
        data.push((f64::from(v), f64::from(t)));
    }

    // validated to fit an i32 exponent
    let degree = config.coeffs as i32;
    let regress = Kernel::over("regress", x, move |s, i| {
        let v = s.load(x, i);
        let mut est = s.constant(0.0);
        for j in 0..degree {
            est = est + s.load(coeffs, j as usize) * v.powi(j);
        }
        let d = s.load(y, i) - est;
        s.atomic_add(loss, 0, 0.5 * d.powi(2));
    });
    let update = GradientDescent::new(config.learning_rate).kernel(coeffs);

    info!(
        "fitting {} coefficients to {} samples for {} iterations on {:?} ({})",
        config.coeffs,
        config.samples,
        config.iterations,
        rt.arch(),
        if config.use_tape { "tape" } else { "manual gradients" }
    );
    let mut figure = Figure::new(config.panel_rows, config.panel_cols, config.figure_size);
    let mut report = RunReport {
        losses: Vec::with_capacity(config.iterations),
        ..RunReport::default()
    };

    for i in 0..config.iterations {
        if config.use_tape {
            rt.tape(loss, |rt| rt.launch(&regress))?;
        } else {
            rt.clear_all_gradients();
            rt.set(loss, 0, 0.0)?;
            rt.set_grad(loss, 0, 1.0)?;
            rt.launch(&regress)?;
            rt.launch_grad(&regress)?;
        }
        rt.launch(&update)?;

        let value = rt.get(loss, 0)?;
        check_finite(i, value)?;
        report.losses.push(value);

        if i % config.report_every == 0 {
            on_report(i, value);
            report.reported.push((i, value));
            let panel = snapshot(i, &data, &rt.to_vec(coeffs)?);
            place_snapshot(&mut figure, i / config.report_every, panel)?;
        }
    }

    report.params = rt.to_vec(coeffs)?;
    info!(
        "regression finished after {} launches, coefficients {:?}",
        rt.launch_count(),
        report.params
    );
    Ok(Run { report, figure })
}

fn snapshot(step: usize, data: &[(f64, f64)], coeffs: &[f32]) -> Panel {
    let (lo, hi) = CURVE_SPAN;
    let step_size = (hi - lo) / (CURVE_POINTS - 1) as f64;
    let curve = (0..CURVE_POINTS)
        .map(|k| {
            let v = lo + step_size * k as f64;
            (v, polynomial(v, coeffs))
        })
        .collect();

    Panel::new(format!("Step {step}"))
        .with_series(Series::scatter("Data", RED_RGB, data.to_vec()))
        .with_series(Series::line("Prediction", BLUE_RGB, curve))
        .with_limits((-3.5, 3.5), (-4.0, 8.0))
        .with_grid()
        .with_legend()
        .with_zero_axes()
}
