//! Lock-in demodulation.
//!
//! Multiplies the signal with reference sine and cosine waves and integrates
//! over the window (trapezoidal rule, exact for whole periods of uniformly
//! sampled harmonics). The phase is taken as the principal value of
//! `atan(Y/X)`, so a response outside (-π/2, π/2) is folded back with the
//! opposite amplitude sign.

use super::SinusoidFit;
use crate::error::{IsweepError, Result};
use std::f64::consts::PI;

pub fn demodulate(times: &[f64], signal: &[f64], frequency: f64) -> Result<SinusoidFit> {
    if times.len() != signal.len() || times.len() < 2 {
        return Err(IsweepError::Analysis(format!(
            "demodulation needs at least two matching samples, got {} times and {} values",
            times.len(),
            signal.len()
        )));
    }
    let span = times[times.len() - 1] - times[0];
    if span <= 0.0 {
        return Err(IsweepError::Analysis("demodulation window has zero length".into()));
    }
    let omega = 2.0 * PI * frequency;

    let mut mean = 0.0;
    let mut in_phase = 0.0;
    let mut quadrature = 0.0;
    for k in 1..times.len() {
        let h = times[k] - times[k - 1];
        let (s0, c0) = (omega * times[k - 1]).sin_cos();
        let (s1, c1) = (omega * times[k]).sin_cos();
        let (y0, y1) = (signal[k - 1], signal[k]);
        mean += 0.5 * h * (y0 + y1);
        in_phase += 0.5 * h * (y0 * s0 + y1 * s1);
        quadrature += 0.5 * h * (y0 * c0 + y1 * c1);
    }
    let bias = mean / span;
    let x = 2.0 * in_phase / span;
    let y = 2.0 * quadrature / span;

    if x == 0.0 && y == 0.0 {
        return Ok(SinusoidFit { bias, amplitude: 0.0, phase: 0.0 });
    }
    let phase = (y / x).atan();
    let amplitude = if x != 0.0 { x / phase.cos() } else { y / phase.sin() };
    Ok(SinusoidFit { bias, amplitude, phase })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample(fit: SinusoidFit, frequency: f64, periods: usize, tpp: usize) -> (Vec<f64>, Vec<f64>) {
        let omega = 2.0 * PI * frequency;
        let t: Vec<f64> = (0..=periods * tpp)
            .map(|k| k as f64 / (frequency * tpp as f64))
            .collect();
        let y = t.iter().map(|&t| fit.evaluate(omega, t)).collect();
        (t, y)
    }

    #[test]
    fn recovers_first_quadrant_response() {
        let truth = SinusoidFit { bias: 1.5, amplitude: -3.0, phase: 0.4 };
        let (t, y) = sample(truth, 10.0, 4, 40);
        let r = demodulate(&t, &y, 10.0).unwrap();
        assert_abs_diff_eq!(r.bias, 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(r.amplitude, -3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r.phase, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn pure_quadrature_signal_gives_right_angle() {
        let truth = SinusoidFit { bias: 0.0, amplitude: -1.0, phase: PI / 2.0 };
        let (t, y) = sample(truth, 1.0, 2, 16);
        let r = demodulate(&t, &y, 1.0).unwrap();
        // Rounding leaves the sign of the in-phase part undetermined
        assert_abs_diff_eq!(r.phase.abs(), PI / 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r.amplitude.abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn flat_signal_has_zero_amplitude() {
        let t = vec![0.0, 0.5, 1.0];
        let y = vec![2.0, 2.0, 2.0];
        let r = demodulate(&t, &y, 1.0).unwrap();
        assert_abs_diff_eq!(r.bias, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r.amplitude, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        assert!(demodulate(&[0.0, 1.0], &[1.0], 1.0).is_err());
    }
}
