//! Run configuration for the two drivers.
//!
//! Every field has a default, so a JSON file only needs the keys it changes:
//!
//! ```rust
//! use tapegrad::config::RegressionConfig;
//!
//! let config = RegressionConfig::from_json(r#"{ "iterations": 1001, "seed": 7 }"#).unwrap();
//! assert_eq!(config.iterations, 1001);
//! assert_eq!(config.samples, 32);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::backend::Arch;
use crate::error::{Error, Result};

/// Upper bound on `panel_rows * panel_cols`.
pub const MAX_PANELS: usize = 64;

/// Vector minimization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinimizationConfig {
    /// Length of `x` and `y`.
    pub n: usize,
    pub iterations: usize,
    pub learning_rate: f32,
    /// Print and snapshot every this many iterations.
    pub report_every: usize,
    /// RNG seed; drawn from the OS when absent.
    pub seed: Option<u64>,
    pub arch: Arch,
    pub output: PathBuf,
    pub panel_rows: usize,
    pub panel_cols: usize,
    /// Figure size in pixels.
    pub figure_size: (u32, u32),
}

impl Default for MinimizationConfig {
    fn default() -> Self {
        Self {
            n: 10,
            iterations: 100,
            learning_rate: 0.1,
            report_every: 11,
            seed: None,
            arch: Arch::default(),
            output: PathBuf::from("minimization_result.svg"),
            panel_rows: 5,
            panel_cols: 2,
            figure_size: (1000, 2500),
        }
    }
}

impl MinimizationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        positive("n", self.n)?;
        positive("iterations", self.iterations)?;
        positive("report_every", self.report_every)?;
        panel_grid(self.panel_rows, self.panel_cols)?;
        learning_rate(self.learning_rate)
    }
}

/// Polynomial regression settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegressionConfig {
    /// Number of noisy samples.
    pub samples: usize,
    /// Number of polynomial coefficients (degree + 1).
    pub coeffs: usize,
    pub learning_rate: f32,
    pub iterations: usize,
    pub report_every: usize,
    /// Differentiate through a tape; otherwise seed and launch the reverse sweep by hand.
    pub use_tape: bool,
    pub seed: Option<u64>,
    pub arch: Arch,
    pub output: PathBuf,
    pub panel_rows: usize,
    pub panel_cols: usize,
    pub figure_size: (u32, u32),
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            samples: 32,
            coeffs: 4,
            learning_rate: 1e-4,
            iterations: 2501,
            report_every: 500,
            use_tape: true,
            seed: None,
            arch: Arch::default(),
            output: PathBuf::from("regression_result.svg"),
            panel_rows: 2,
            panel_cols: 3,
            figure_size: (1500, 1000),
        }
    }
}

impl RegressionConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        positive("samples", self.samples)?;
        positive("coeffs", self.coeffs)?;
        positive("iterations", self.iterations)?;
        positive("report_every", self.report_every)?;
        panel_grid(self.panel_rows, self.panel_cols)?;
        if self.coeffs > i32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "coeffs must fit a polynomial exponent, got {}",
                self.coeffs
            )));
        }
        learning_rate(self.learning_rate)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(Error::InvalidConfig(format!("{name} must be positive")));
    }
    Ok(())
}

fn panel_grid(rows: usize, cols: usize) -> Result<()> {
    positive("panel_rows", rows)?;
    positive("panel_cols", cols)?;
    match rows.checked_mul(cols) {
        Some(cells) if cells <= MAX_PANELS => Ok(()),
        _ => Err(Error::InvalidConfig(format!(
            "a {rows}x{cols} panel grid exceeds {MAX_PANELS} panels"
        ))),
    }
}

fn learning_rate(lr: f32) -> Result<()> {
    if !lr.is_finite() || lr <= 0.0 {
        return Err(Error::InvalidConfig(format!(
            "learning_rate must be finite and positive, got {lr}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(MinimizationConfig::default().validate().is_ok());
        assert!(RegressionConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_report_interval() {
        let err = MinimizationConfig::from_json(r#"{ "report_every": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = RegressionConfig::from_json(r#"{ "epochs": 3 }"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn parses_arch_and_output() {
        let config =
            MinimizationConfig::from_json(r#"{ "arch": "serial", "output": "out/min.svg" }"#)
                .unwrap();
        assert_eq!(config.arch, Arch::Serial);
        assert_eq!(config.output, PathBuf::from("out/min.svg"));
        assert_eq!(config.n, 10);
    }

    #[test]
    fn rejects_overflowing_panel_grid() {
        let err = MinimizationConfig::from_json(
            r#"{ "panel_rows": 4294967296, "panel_cols": 4294967296, "seed": 1 }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = RegressionConfig::from_json(r#"{ "panel_rows": 1000, "panel_cols": 1000 }"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let config = RegressionConfig::from_json(r#"{ "panel_rows": 8, "panel_cols": 8 }"#).unwrap();
        assert_eq!(config.panel_rows * config.panel_cols, MAX_PANELS);
    }

    #[test]
    fn loads_from_file() {
        let dir = std::env::temp_dir().join(format!("tapegrad-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("regression.json");
        std::fs::write(&path, r#"{ "coeffs": 3, "use_tape": false, "arch": "serial" }"#).unwrap();

        let config = RegressionConfig::load(&path).unwrap();
        assert_eq!(config.coeffs, 3);
        assert!(!config.use_tape);
        assert_eq!(config.arch, Arch::Serial);
        assert_eq!(config.samples, 32);

        std::fs::write(&path, r#"{ "coeffs": 0 }"#).unwrap();
        assert!(matches!(RegressionConfig::load(&path), Err(Error::InvalidConfig(_))));
        assert!(matches!(
            MinimizationConfig::load(dir.join("missing.json")),
            Err(Error::Io(_))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
