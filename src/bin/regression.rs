use anyhow::Context;
use log::info;
use tapegrad::config::RegressionConfig;
use tapegrad::demos::{format_loss, regression};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => RegressionConfig::load(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => RegressionConfig::default(),
    };
    info!("config: {config:?}");

    let run = regression::run_with(&config, |_, loss| {
        println!("Loss = {}", format_loss(loss));
    })?;
    run.figure
        .save(&config.output)
        .with_context(|| format!("saving figure to {}", config.output.display()))?;
    info!("fitted coefficients: {:?}", run.report.params);
    Ok(())
}
