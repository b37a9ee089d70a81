//! Run configuration loaded from TOML.
//!
//! ```toml
//! start_freq = 1e6
//! end_freq = 0.1
//! freq_points = 22
//! delta_v = 1e-3
//! bc = "fixed-majority"
//! sequential = false
//!
//! [device]
//! series_resistance = 2.0
//! ion_mobility = 1e-10
//!
//! [[intensity]]
//! name = "1 sun"
//! intensity = 1.0
//! ```

use crate::analysis::SweepOptions;
use crate::device::{BoundaryCondition, IntensityEntry};
use crate::error::{IsweepError, Result};
use crate::simulator::lumped::{LumpedDevice, LumpedParams};
use serde_derive::Deserialize;
use std::path::Path;

fn default_freq_points() -> usize {
    8
}

fn default_delta_v() -> f64 {
    1e-3
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    pub start_freq: f64,
    pub end_freq: f64,
    #[serde(default = "default_freq_points")]
    pub freq_points: usize,
    #[serde(default = "default_delta_v")]
    pub delta_v: f64,
    #[serde(default)]
    pub bc: BoundaryCondition,
    #[serde(default)]
    pub sequential: bool,
    #[serde(default)]
    pub frozen_ions: bool,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub do_graphics: bool,
    #[serde(default)]
    pub save_solutions: bool,
    #[serde(default)]
    pub save_results: bool,
    #[serde(default)]
    pub device: LumpedParams,
    #[serde(rename = "intensity")]
    pub intensities: Vec<IntensityConfig>,
}

/// One `[[intensity]]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntensityConfig {
    pub name: String,
    pub intensity: f64,
    /// Prepare the device at open circuit and let the sweep split it.
    #[serde(default = "default_true")]
    pub open_circuit: bool,
    /// Applied DC bias when not at open circuit (V).
    #[serde(default)]
    pub bias: f64,
}

impl SweepConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SweepConfig = toml::from_str(s).map_err(|e| IsweepError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        self.device.validate()?;
        if self.intensities.is_empty() {
            return Err(IsweepError::Config("at least one [[intensity]] entry is required".into()));
        }
        for entry in &self.intensities {
            if !(entry.intensity.is_finite() && entry.intensity >= 0.0) {
                return Err(IsweepError::Config(format!(
                    "intensity '{}' must be non-negative, got {}",
                    entry.name, entry.intensity
                )));
            }
        }
        if !self.delta_v.is_finite() {
            return Err(IsweepError::Config(format!("delta_v must be finite, got {}", self.delta_v)));
        }
        Ok(())
    }

    pub fn options(&self) -> SweepOptions {
        SweepOptions {
            start_freq: self.start_freq,
            end_freq: self.end_freq,
            freq_points: self.freq_points,
            delta_v: self.delta_v,
            bc: self.bc,
            sequential: self.sequential,
            frozen_ions: self.frozen_ions,
            parallel: self.parallel,
            do_graphics: self.do_graphics,
            save_solutions: self.save_solutions,
            save_results: self.save_results,
        }
    }

    /// Prepare one lumped device per `[[intensity]]` entry, in file order.
    pub fn entries(&self) -> Vec<IntensityEntry<LumpedDevice>> {
        self.intensities
            .iter()
            .map(|c| {
                let state = if c.open_circuit {
                    LumpedDevice::at_open_circuit(self.device.clone(), c.intensity)
                } else {
                    LumpedDevice::at_bias(self.device.clone(), c.intensity, c.bias)
                };
                IntensityEntry::new(state, c.name.clone(), c.intensity)
            })
            .collect()
    }
}
