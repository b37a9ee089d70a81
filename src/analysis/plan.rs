//! Frequency sweep planning.
//!
//! Frequencies are spaced evenly in log-space from the start to the end
//! frequency; a start above the end gives a descending sweep. All per-cell
//! quantities are pre-allocated as (entries × frequencies) zero matrices.

use crate::error::{IsweepError, Result};
use crate::matrix::Matrix;
use crate::response::SinusoidFit;

/// Generate `points` log-spaced frequencies from `start` to `end`.
///
/// The endpoints are reproduced exactly. A single point yields `[end]`.
pub fn log_frequencies(start: f64, end: f64, points: usize) -> Result<Vec<f64>> {
    if !(start.is_finite() && start > 0.0) || !(end.is_finite() && end > 0.0) {
        return Err(IsweepError::InvalidRange(format!(
            "frequency bounds must be positive and finite, got start={start}, end={end}"
        )));
    }
    if points < 1 {
        return Err(IsweepError::InvalidRange(
            "at least one frequency point is required".into(),
        ));
    }
    if points == 1 {
        return Ok(vec![end]);
    }

    let log_start = start.log10();
    let step = (end.log10() - log_start) / (points - 1) as f64;
    let mut frequencies: Vec<f64> = (0..points)
        .map(|i| 10.0_f64.powf(log_start + step * i as f64))
        .collect();
    frequencies[0] = start;
    frequencies[points - 1] = end;
    Ok(frequencies)
}

/// Bias, amplitude and phase matrices of one current.
#[derive(Debug, Clone, PartialEq)]
pub struct FitMatrices {
    pub bias: Matrix,
    pub amplitude: Matrix,
    pub phase: Matrix,
}

impl FitMatrices {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            bias: Matrix::zeros(nrows, ncols),
            amplitude: Matrix::zeros(nrows, ncols),
            phase: Matrix::zeros(nrows, ncols),
        }
    }

    pub fn record(&mut self, row: usize, col: usize, fit: &SinusoidFit) {
        self.bias[(row, col)] = fit.bias;
        self.amplitude[(row, col)] = fit.amplitude;
        self.phase[(row, col)] = fit.phase;
    }
}

/// Raw per-cell measurements of a sweep, before spectral derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepMatrices {
    pub total: FitMatrices,
    pub ionic: FitMatrices,
    /// Final simulated time of each cell's oscillating solution.
    pub t_max: Matrix,
}

impl SweepMatrices {
    pub fn zeros(n_entries: usize, n_frequencies: usize) -> Self {
        Self {
            total: FitMatrices::zeros(n_entries, n_frequencies),
            ionic: FitMatrices::zeros(n_entries, n_frequencies),
            t_max: Matrix::zeros(n_entries, n_frequencies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn descending_decades() {
        let f = log_frequencies(1e6, 1e2, 3).unwrap();
        assert_eq!(f.len(), 3);
        assert_eq!(f[0], 1e6);
        assert_relative_eq!(f[1], 1e4, max_relative = 1e-12);
        assert_eq!(f[2], 1e2);
    }

    #[test]
    fn ascending_sweep_is_monotonic_with_exact_endpoints() {
        let f = log_frequencies(0.1, 3.3e5, 17).unwrap();
        assert_eq!(f.len(), 17);
        assert_eq!(f[0], 0.1);
        assert_eq!(f[16], 3.3e5);
        assert!(f.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn log_spacing_has_constant_ratio() {
        let f = log_frequencies(1e5, 1e-1, 13).unwrap();
        let r0 = f[1] / f[0];
        for w in f.windows(2) {
            assert_relative_eq!(w[1] / w[0], r0, max_relative = 1e-9);
        }
    }

    #[test]
    fn single_point_is_end_frequency() {
        assert_eq!(log_frequencies(1e3, 10.0, 1).unwrap(), vec![10.0]);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        for (start, end, points) in [
            (0.0, 1e3, 5),
            (1e3, -1.0, 5),
            (f64::NAN, 1e3, 5),
            (1e3, f64::INFINITY, 5),
            (1e3, 1.0, 0),
        ] {
            let err = log_frequencies(start, end, points).unwrap_err();
            assert!(matches!(err, IsweepError::InvalidRange(_)), "{start} {end} {points}");
        }
    }

    #[test]
    fn matrices_are_zero_filled() {
        let m = SweepMatrices::zeros(2, 4);
        assert_eq!(m.total.phase.shape(), (2, 4));
        assert_eq!(m.ionic.bias.shape(), (2, 4));
        assert!(m.t_max.values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn record_writes_one_cell() {
        let mut m = FitMatrices::zeros(2, 2);
        m.record(1, 0, &SinusoidFit { bias: 1.0, amplitude: -2.0, phase: 0.5 });
        assert_eq!(m.bias[(1, 0)], 1.0);
        assert_eq!(m.amplitude[(1, 0)], -2.0);
        assert_eq!(m.phase[(1, 0)], 0.5);
        assert_eq!(m.phase[(0, 0)], 0.0);
    }
}
