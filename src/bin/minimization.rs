use anyhow::Context;
use log::info;
use tapegrad::config::MinimizationConfig;
use tapegrad::demos::{format_loss, minimization};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => MinimizationConfig::load(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => MinimizationConfig::default(),
    };
    info!("config: {config:?}");

    let run = minimization::run_with(&config, |k, loss| {
        println!("Iteration {k:03}: Loss = {}", format_loss(loss));
    })?;
    run.figure
        .save(&config.output)
        .with_context(|| format!("saving figure to {}", config.output.display()))?;
    Ok(())
}
