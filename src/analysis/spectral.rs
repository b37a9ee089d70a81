//! Impedance and capacitance spectra from extracted amplitude and phase.
//!
//! ```text
//!   |Z| = -ΔV / amplitude
//!   Z'  = |Z| cos(phase)
//!   Z'' = |Z| sin(phase)
//!   C   = sin(phase) / (2πf |Z|)
//! ```
//!
//! A zero amplitude yields infinite or NaN values, which are kept as-is.

use crate::matrix::Matrix;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Derived spectra of one current.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSpectra {
    pub impedance_abs: Matrix,
    pub impedance_re: Matrix,
    pub impedance_im: Matrix,
    pub capacitance: Matrix,
}

/// Spectral quantities of a single cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSpectrum {
    pub impedance: Complex64,
    pub impedance_abs: f64,
    pub capacitance: f64,
}

pub fn cell_spectrum(delta_v: f64, amplitude: f64, phase: f64, frequency: f64) -> CellSpectrum {
    let impedance_abs = -delta_v / amplitude;
    let pulsatance = 2.0 * PI * frequency;
    CellSpectrum {
        impedance: Complex64::from_polar(impedance_abs, phase),
        impedance_abs,
        capacitance: phase.sin() / (pulsatance * impedance_abs),
    }
}

/// Apply [`cell_spectrum`] to every cell. All matrices must share a shape.
pub fn derive(delta_v: f64, amplitude: &Matrix, phase: &Matrix, frequency: &Matrix) -> DerivedSpectra {
    assert_eq!(amplitude.shape(), phase.shape(), "amplitude/phase shape mismatch");
    assert_eq!(amplitude.shape(), frequency.shape(), "amplitude/frequency shape mismatch");
    let (nrows, ncols) = amplitude.shape();
    let mut out = DerivedSpectra {
        impedance_abs: Matrix::zeros(nrows, ncols),
        impedance_re: Matrix::zeros(nrows, ncols),
        impedance_im: Matrix::zeros(nrows, ncols),
        capacitance: Matrix::zeros(nrows, ncols),
    };
    for k in 0..amplitude.values.len() {
        let cell = cell_spectrum(
            delta_v,
            amplitude.values[k],
            phase.values[k],
            frequency.values[k],
        );
        out.impedance_abs.values[k] = cell.impedance_abs;
        out.impedance_re.values[k] = cell.impedance.re;
        out.impedance_im.values[k] = cell.impedance.im;
        out.capacitance.values[k] = cell.capacitance;
    }
    out
}
