//! Impedance spectroscopy sweep: planning, per-cell validation, spectral
//! derivation and aggregation into an [`ImpedanceSpectra`] record.

pub mod ladder;
pub mod plan;
pub mod spectral;
pub mod sweep;

pub use sweep::run;

use crate::device::BoundaryCondition;
use crate::matrix::Matrix;
use plan::{FitMatrices, SweepMatrices};
use std::fmt;

/// Oscillation periods simulated per frequency.
pub const PERIODS: usize = 20;
/// Samples recorded per oscillation period.
pub const TPOINTS_PER_PERIOD: usize = 40;
/// Relative simulator tolerance of the first attempt at every cell.
pub const BASE_TOLERANCE: f64 = 1e-6;
/// Tolerance reduction applied at each re-simulation.
pub const TOLERANCE_RETRY_FACTOR: f64 = 100.0;
/// Distance from the edges of [0, π/2] below which a phase is re-checked (rad).
pub const PHASE_MARGIN: f64 = 0.006;

/// Parameters of a sweep run.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepOptions {
    pub start_freq: f64,
    pub end_freq: f64,
    pub freq_points: usize,
    /// Oscillation amplitude (V).
    pub delta_v: f64,
    pub bc: BoundaryCondition,
    /// Start each frequency from the previous frequency's solution.
    pub sequential: bool,
    /// Zero the ion mobility before sweeping.
    pub frozen_ions: bool,
    /// Sweep intensity entries concurrently (ignored when sequential).
    pub parallel: bool,
    pub do_graphics: bool,
    pub save_solutions: bool,
    pub save_results: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            start_freq: 1e6,
            end_freq: 1e-1,
            freq_points: 8,
            delta_v: 1e-3,
            bc: BoundaryCondition::default(),
            sequential: false,
            frozen_ions: false,
            parallel: false,
            do_graphics: false,
            save_solutions: false,
            save_results: false,
        }
    }
}

/// A cell whose phase stayed outside [0, π/2] after every validation stage.
/// The value is still recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseOutOfRangeWarning {
    /// Row of the intensity entry.
    pub entry: usize,
    pub name: String,
    pub frequency: f64,
    /// Phase in radians.
    pub phase: f64,
}

impl fmt::Display for PhaseOutOfRangeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "phase {:.2}° at {:.3e} Hz for '{}' is outside [0°, 90°]",
            self.phase.to_degrees(),
            self.frequency,
            self.name
        )
    }
}

/// Measured and derived spectra of one current.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentSpectra {
    pub bias: Matrix,
    pub amplitude: Matrix,
    pub phase: Matrix,
    pub impedance_abs: Matrix,
    pub impedance_re: Matrix,
    pub impedance_im: Matrix,
    pub capacitance: Matrix,
}

impl CurrentSpectra {
    fn derive(fits: FitMatrices, delta_v: f64, frequencies: &Matrix) -> Self {
        let d = spectral::derive(delta_v, &fits.amplitude, &fits.phase, frequencies);
        Self {
            bias: fits.bias,
            amplitude: fits.amplitude,
            phase: fits.phase,
            impedance_abs: d.impedance_abs,
            impedance_re: d.impedance_re,
            impedance_im: d.impedance_im,
            capacitance: d.capacitance,
        }
    }
}

/// Complete result of a sweep. Rows follow the input entries, columns the
/// planned frequencies.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpedanceSpectra {
    pub names: Vec<String>,
    pub intensities: Vec<f64>,
    pub vdc: Vec<f64>,
    /// Row whose light intensity is exactly one sun.
    pub sun_index: Option<usize>,
    pub frequencies: Matrix,
    pub t_max: Matrix,
    pub total: CurrentSpectra,
    pub ionic: CurrentSpectra,
    pub periods: usize,
    pub tpoints_per_period: usize,
    pub bc: BoundaryCondition,
    pub delta_v: f64,
    pub warnings: Vec<PhaseOutOfRangeWarning>,
}

impl ImpedanceSpectra {
    /// Derive impedance and capacitance and package everything.
    pub fn assemble(
        names: Vec<String>,
        intensities: Vec<f64>,
        vdc: Vec<f64>,
        frequencies: &[f64],
        matrices: SweepMatrices,
        options: &SweepOptions,
        warnings: Vec<PhaseOutOfRangeWarning>,
    ) -> Self {
        let freq_matrix = Matrix::from_repeated_row(intensities.len(), frequencies);
        let sun_index = intensities.iter().position(|&i| i == 1.0);
        let total = CurrentSpectra::derive(matrices.total, options.delta_v, &freq_matrix);
        let ionic = CurrentSpectra::derive(matrices.ionic, options.delta_v, &freq_matrix);
        Self {
            names,
            intensities,
            vdc,
            sun_index,
            frequencies: freq_matrix,
            t_max: matrices.t_max,
            total,
            ionic,
            periods: PERIODS,
            tpoints_per_period: TPOINTS_PER_PERIOD,
            bc: options.bc,
            delta_v: options.delta_v,
            warnings,
        }
    }

    pub fn n_entries(&self) -> usize {
        self.intensities.len()
    }

    pub fn n_frequencies(&self) -> usize {
        self.frequencies.ncols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(intensities: Vec<f64>) -> ImpedanceSpectra {
        let n = intensities.len();
        let names = (0..n).map(|i| format!("e{i}")).collect();
        let mut m = SweepMatrices::zeros(n, 2);
        for i in 0..n {
            for j in 0..2 {
                m.total.amplitude[(i, j)] = -1e-5;
                m.total.phase[(i, j)] = 0.5;
            }
        }
        ImpedanceSpectra::assemble(
            names,
            intensities,
            vec![0.0; n],
            &[1e3, 1e2],
            m,
            &SweepOptions::default(),
            Vec::new(),
        )
    }

    #[test]
    fn sun_index_finds_exact_one() {
        assert_eq!(assemble(vec![0.1, 1.0, 2.0]).sun_index, Some(1));
        assert_eq!(assemble(vec![0.1, 0.999_999]).sun_index, None);
    }

    #[test]
    fn every_matrix_has_entry_by_frequency_shape() {
        let s = assemble(vec![0.5, 1.0, 3.0]);
        for m in [
            &s.frequencies,
            &s.t_max,
            &s.total.bias,
            &s.total.impedance_abs,
            &s.total.capacitance,
            &s.ionic.phase,
            &s.ionic.impedance_im,
        ] {
            assert_eq!(m.shape(), (3, 2));
        }
        assert_eq!(s.frequencies.row(2), &[1e3, 1e2]);
        assert_eq!(s.periods, 20);
        assert_eq!(s.tpoints_per_period, 40);
    }

    #[test]
    fn warning_reports_degrees() {
        let w = PhaseOutOfRangeWarning {
            entry: 0,
            name: "dark".into(),
            frequency: 1e3,
            phase: -std::f64::consts::FRAC_PI_4,
        };
        assert_eq!(w.to_string(), "phase -45.00° at 1.000e3 Hz for 'dark' is outside [0°, 90°]");
    }
}
