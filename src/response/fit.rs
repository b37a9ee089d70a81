//! Least-squares sinusoid fit at a known frequency.
//!
//! Model: `y(t) = b + d·τ + S·sin(ωt) + C·cos(ωt)` with `τ` the time from the
//! window centre normalised by the window length. The linear drift term
//! absorbs slow relaxation left over from the start-up transient, which is
//! what makes the fit more robust than demodulation.

use super::SinusoidFit;
use crate::error::{IsweepError, Result};
use std::f64::consts::PI;

const N_BASIS: usize = 4;

/// Result of a least-squares fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeastSquaresFit {
    /// Sinusoid normalised to a non-positive amplitude.
    pub sinusoid: SinusoidFit,
    /// Drift of the signal across the window.
    pub drift: f64,
}

pub fn fit_sinusoid(times: &[f64], signal: &[f64], frequency: f64) -> Result<LeastSquaresFit> {
    let n = times.len();
    if signal.len() != n || n < N_BASIS {
        return Err(IsweepError::Analysis(format!(
            "sinusoid fit needs at least {N_BASIS} matching samples, got {} times and {} values",
            n,
            signal.len()
        )));
    }
    let t0 = times[0];
    let span = times[n - 1] - t0;
    if span <= 0.0 {
        return Err(IsweepError::Analysis("fit window has zero length".into()));
    }
    let t_mid = t0 + 0.5 * span;
    let omega = 2.0 * PI * frequency;
    let basis = |t: f64| -> [f64; N_BASIS] {
        let (s, c) = (omega * t).sin_cos();
        [1.0, (t - t_mid) / span, s, c]
    };

    // Normal equations AᵀA p = Aᵀy
    let mut ata = [[0.0; N_BASIS]; N_BASIS];
    let mut aty = [0.0; N_BASIS];
    for (&t, &y) in times.iter().zip(signal) {
        let phi = basis(t);
        for i in 0..N_BASIS {
            aty[i] += phi[i] * y;
            for j in 0..N_BASIS {
                ata[i][j] += phi[i] * phi[j];
            }
        }
    }
    let p = solve_dense(ata, aty)?;
    let (bias, drift, s, c) = (p[0], p[1], p[2], p[3]);

    // a·sin(ωt + φ) with a ≤ 0: S = a·cos φ, C = a·sin φ
    let sinusoid = if s == 0.0 && c == 0.0 {
        SinusoidFit { bias, amplitude: 0.0, phase: 0.0 }
    } else {
        SinusoidFit {
            bias,
            amplitude: -s.hypot(c),
            phase: (-c).atan2(-s),
        }
    };
    Ok(LeastSquaresFit { sinusoid, drift })
}

/// RMS difference between `signal` and `model` over the sample times.
pub fn residual_rms(times: &[f64], signal: &[f64], model: impl Fn(f64) -> f64) -> f64 {
    if times.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = times
        .iter()
        .zip(signal)
        .map(|(&t, &y)| (y - model(t)).powi(2))
        .sum();
    (sum_sq / times.len() as f64).sqrt()
}

/// Gaussian elimination with partial pivoting on a small dense system.
fn solve_dense(mut a: [[f64; N_BASIS]; N_BASIS], mut b: [f64; N_BASIS]) -> Result<[f64; N_BASIS]> {
    let n = N_BASIS;
    let scale = a.iter().flatten().fold(0.0_f64, |m, v| m.max(v.abs()));

    for k in 0..n {
        let mut max_val = a[k][k].abs();
        let mut max_row = k;
        for i in (k + 1)..n {
            let v = a[i][k].abs();
            if v > max_val {
                max_val = v;
                max_row = i;
            }
        }

        if max_val <= 1e-14 * scale || max_val == 0.0 {
            return Err(IsweepError::Analysis("singular normal equations in sinusoid fit".into()));
        }

        if max_row != k {
            a.swap(k, max_row);
            b.swap(k, max_row);
        }

        let pivot = a[k][k];
        for i in (k + 1)..n {
            let factor = a[i][k] / pivot;
            a[i][k] = 0.0;
            for j in (k + 1)..n {
                a[i][j] -= factor * a[k][j];
            }
            b[i] -= factor * b[k];
        }
    }

    let mut x = [0.0; N_BASIS];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }
    Ok(x)
}
