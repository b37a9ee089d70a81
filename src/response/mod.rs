//! Extraction of bias, amplitude and phase from an oscillating response.
//!
//! Signals are described as `bias + amplitude * sin(ωt + phase)`, with `t`
//! measured from the start of the oscillation. For the devices swept here a
//! positive voltage perturbation gives a negative current amplitude, and the
//! phase of a capacitive response lies in [0, π/2].

pub mod demodulate;
pub mod fit;

use crate::error::{IsweepError, Result};
use crate::simulator::ResponseTrace;
use std::ops::Range;

/// Bias, amplitude and phase (radians) of a sinusoidal signal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SinusoidFit {
    pub bias: f64,
    pub amplitude: f64,
    pub phase: f64,
}

impl SinusoidFit {
    pub fn evaluate(&self, omega: f64, t: f64) -> f64 {
        self.bias + self.amplitude * (omega * t + self.phase).sin()
    }
}

/// How a [`ResponseFit`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Demodulation,
    LeastSquares,
}

/// Extracted response of the total and ionic drift currents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseFit {
    pub total: SinusoidFit,
    pub ionic: SinusoidFit,
    pub method: ExtractionMethod,
    /// RMS deviation of the total current from its reconstruction; only
    /// computed outside minimal mode.
    pub residual_rms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Skip diagnostics that are not needed by the sweep.
    pub minimal: bool,
    /// Prefer lock-in demodulation over least-squares fitting.
    pub demodulate: bool,
}

/// Extracts a [`ResponseFit`] from the terminal currents of a solution.
pub trait ResponseAnalyzer: Sync {
    fn analyze(&self, trace: &ResponseTrace, options: AnalysisOptions) -> Result<ResponseFit>;
}

/// Analyzer that ignores the first part of the oscillation as start-up
/// transient and extracts the response over the remaining whole periods.
#[derive(Debug, Clone)]
pub struct StandardAnalyzer {
    /// Fraction of the periods discarded before extraction.
    pub discard_fraction: f64,
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self {
            discard_fraction: 0.5,
        }
    }
}

impl StandardAnalyzer {
    /// Sample range covering the whole periods kept for extraction.
    pub fn window(&self, trace: &ResponseTrace) -> Result<Range<usize>> {
        let tpp = trace.tpoints_per_period;
        if trace.periods == 0 || tpp == 0 {
            return Err(IsweepError::Analysis("trace has no complete period".into()));
        }
        let expected = 1 + trace.periods * tpp;
        if trace.len() != expected
            || trace.current.len() != expected
            || trace.ionic_current.len() != expected
        {
            return Err(IsweepError::Analysis(format!(
                "trace has {} samples, expected {} ({} periods x {} points)",
                trace.len(),
                expected,
                trace.periods,
                tpp
            )));
        }
        let discarded = ((trace.periods as f64 * self.discard_fraction).floor() as usize)
            .min(trace.periods - 1);
        Ok(discarded * tpp..expected)
    }

    fn extract(&self, times: &[f64], signal: &[f64], frequency: f64, demodulate: bool) -> Result<SinusoidFit> {
        if demodulate {
            demodulate::demodulate(times, signal, frequency)
        } else {
            Ok(fit::fit_sinusoid(times, signal, frequency)?.sinusoid)
        }
    }
}

impl ResponseAnalyzer for StandardAnalyzer {
    fn analyze(&self, trace: &ResponseTrace, options: AnalysisOptions) -> Result<ResponseFit> {
        let window = self.window(trace)?;
        let times = &trace.times[window.clone()];
        let f = trace.frequency;

        let total = self.extract(times, &trace.current[window.clone()], f, options.demodulate)?;
        let ionic = self.extract(times, &trace.ionic_current[window.clone()], f, options.demodulate)?;

        let residual_rms = if options.minimal {
            None
        } else {
            let omega = 2.0 * std::f64::consts::PI * f;
            Some(fit::residual_rms(times, &trace.current[window], |t| {
                total.evaluate(omega, t)
            }))
        };

        Ok(ResponseFit {
            total,
            ionic,
            method: if options.demodulate {
                ExtractionMethod::Demodulation
            } else {
                ExtractionMethod::LeastSquares
            },
            residual_rms,
        })
    }
}
