//! Lumped-element photovoltaic device model.
//!
//! Equivalent circuit, per unit area:
//!
//! ```text
//!   V(t) ── Rs ──┬──────────┬──────────┬────────────┐
//!                │          │          │            │
//!               Cg        Rrec      Jph·Int      g_ion
//!                │          │          │            │
//!                │          │          │          Cion
//!               gnd        gnd        gnd          gnd
//! ```
//!
//! State variables are the voltage across the geometric capacitance `v_g`
//! and across the ionic double-layer capacitance `v_ion`:
//!
//! ```text
//!   Cg   dv_g/dt   = (V - v_g)/Rs - v_g/Rrec + Jph - g_ion (v_g - v_ion)
//!   Cion dv_ion/dt = g_ion (v_g - v_ion)
//! ```
//!
//! The ionic branch conductance is proportional to the ion mobility, so
//! frozen ions open the branch. Time integration uses Backward Euler for
//! the first step and after rejections, Trapezoidal otherwise, with step
//! size control from the BE/TRAP difference.

use super::{OscillatingSolution, OscillationRequest, ResponseTrace, Simulator, StartingPoint, StateSplitter};
use crate::device::{BoundaryCondition, DeviceState};
use crate::error::{IsweepError, Result};
use num_complex::Complex64;
use serde_derive::Deserialize;
use std::f64::consts::PI;

/// Circuit parameters of the lumped device, per cm².
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LumpedParams {
    /// Series (contact + transport) resistance, Ω·cm².
    pub series_resistance: f64,
    /// Recombination resistance, Ω·cm².
    pub recombination_resistance: f64,
    /// Geometric capacitance, F/cm².
    pub geometric_capacitance: f64,
    /// Ionic double-layer capacitance, F/cm².
    pub ionic_capacitance: f64,
    /// Ion mobility, cm²/(V·s).
    pub ion_mobility: f64,
    /// Ionic branch conductance per unit mobility, S/cm² per cm²/(V·s).
    pub ion_conductance_per_mobility: f64,
    /// Photocurrent density at one sun, A/cm².
    pub photocurrent: f64,
}

impl Default for LumpedParams {
    fn default() -> Self {
        Self {
            series_resistance: 2.0,
            recombination_resistance: 50.0,
            geometric_capacitance: 2e-8,
            ionic_capacitance: 1e-5,
            ion_mobility: 1e-10,
            ion_conductance_per_mobility: 1e8,
            photocurrent: 0.02,
        }
    }
}

impl LumpedParams {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("series_resistance", self.series_resistance),
            ("recombination_resistance", self.recombination_resistance),
            ("geometric_capacitance", self.geometric_capacitance),
            ("ionic_capacitance", self.ionic_capacitance),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(IsweepError::Config(format!(
                    "device parameter {name} must be positive, got {value}"
                )));
            }
        }
        let non_negative = [
            ("ion_mobility", self.ion_mobility),
            ("ion_conductance_per_mobility", self.ion_conductance_per_mobility),
            ("photocurrent", self.photocurrent),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(IsweepError::Config(format!(
                    "device parameter {name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Small-signal impedance of the circuit at `frequency` for a given ion
    /// mobility. Capacitive response has negative imaginary part.
    pub fn impedance(&self, frequency: f64, ion_mobility: f64) -> Complex64 {
        let jw = Complex64::new(0.0, 2.0 * PI * frequency);
        let g_ion = ion_mobility * self.ion_conductance_per_mobility;
        let mut y = Complex64::new(1.0 / self.recombination_resistance, 0.0)
            + jw * self.geometric_capacitance;
        if g_ion > 0.0 {
            let z_ion = Complex64::new(1.0 / g_ion, 0.0) + 1.0 / (jw * self.ionic_capacitance);
            y += 1.0 / z_ion;
        }
        Complex64::new(self.series_resistance, 0.0) + 1.0 / y
    }
}

/// Snapshot of the lumped device.
#[derive(Debug, Clone, PartialEq)]
pub struct LumpedDevice {
    pub params: LumpedParams,
    /// Light intensity in suns.
    pub light_intensity: f64,
    /// Symmetric open-circuit device, not yet split into a half cell.
    pub open_circuit: bool,
    pub contacts: BoundaryCondition,
    /// Electrostatic potential at the anode and cathode boundaries.
    pub contact_potential: [f64; 2],
    pub v_geometric: f64,
    pub v_ionic: f64,
    /// Time of the snapshot within the run that produced it.
    pub time: f64,
}

impl LumpedDevice {
    /// Steady state under an applied DC bias.
    pub fn at_bias(params: LumpedParams, light_intensity: f64, applied: f64) -> Self {
        let mut device = Self {
            params,
            light_intensity,
            open_circuit: false,
            contacts: BoundaryCondition::default(),
            contact_potential: [0.0, applied],
            v_geometric: 0.0,
            v_ionic: 0.0,
            time: 0.0,
        };
        device.settle(applied);
        device
    }

    /// Symmetric open-circuit steady state. Both contacts sit at the same
    /// potential; the photovoltage is carried internally.
    pub fn at_open_circuit(params: LumpedParams, light_intensity: f64) -> Self {
        let voc = params.photocurrent * light_intensity * params.recombination_resistance;
        Self {
            params,
            light_intensity,
            open_circuit: true,
            contacts: BoundaryCondition::default(),
            contact_potential: [0.0, 0.0],
            v_geometric: voc,
            v_ionic: voc,
            time: 0.0,
        }
    }

    pub fn photocurrent(&self) -> f64 {
        self.params.photocurrent * self.light_intensity
    }

    pub fn ion_conductance(&self) -> f64 {
        self.params.ion_mobility * self.params.ion_conductance_per_mobility
    }

    /// Move both state variables to the DC operating point at `applied`.
    fn settle(&mut self, applied: f64) {
        let gs = 1.0 / self.params.series_resistance;
        let grec = 1.0 / self.params.recombination_resistance;
        let v = (applied * gs + self.photocurrent()) / (gs + grec);
        self.v_geometric = v;
        self.v_ionic = v;
    }
}

impl DeviceState for LumpedDevice {
    fn is_open_circuit(&self) -> bool {
        self.open_circuit
    }

    fn ion_mobility(&self) -> f64 {
        self.params.ion_mobility
    }

    fn freeze_ions(&mut self) {
        self.params.ion_mobility = 0.0;
    }

    fn dc_bias(&self) -> f64 {
        self.contact_potential[1] - self.contact_potential[0]
    }

    fn light_intensity(&self) -> f64 {
        self.light_intensity
    }
}

/// Splits an open-circuit lumped device into a biased half cell.
#[derive(Debug, Default, Clone, Copy)]
pub struct LumpedSplitter;

impl StateSplitter<LumpedDevice> for LumpedSplitter {
    fn split(&self, state: &LumpedDevice, bc: BoundaryCondition) -> Result<(LumpedDevice, f64)> {
        if !state.open_circuit {
            return Err(IsweepError::Simulation(
                "cannot split a state that is not at open circuit".into(),
            ));
        }
        let vdc = state.v_geometric;
        let mut half = state.clone();
        half.open_circuit = false;
        half.contacts = bc;
        half.contact_potential = [0.0, vdc];
        half.v_ionic = vdc;
        half.time = 0.0;
        Ok((half, vdc))
    }
}

/// Adaptive BE/TRAP integrator for the lumped device.
#[derive(Debug, Clone)]
pub struct LumpedSimulator {
    /// Smallest step as a fraction of the output sample spacing.
    pub min_step_fraction: f64,
    pub max_consecutive_failures: usize,
}

impl Default for LumpedSimulator {
    fn default() -> Self {
        Self {
            min_step_fraction: 1e-8,
            max_consecutive_failures: 10,
        }
    }
}

/// Linear system C dx/dt = -G x + b(t) of the lumped circuit.
struct CircuitSystem {
    c: [f64; 2],
    g: [[f64; 2]; 2],
    gs: f64,
    jph: f64,
}

impl CircuitSystem {
    fn new(device: &LumpedDevice) -> Self {
        let p = &device.params;
        let gs = 1.0 / p.series_resistance;
        let grec = 1.0 / p.recombination_resistance;
        let gi = device.ion_conductance();
        Self {
            c: [p.geometric_capacitance, p.ionic_capacitance],
            g: [[gs + grec + gi, -gi], [-gi, gi]],
            gs,
            jph: device.photocurrent(),
        }
    }

    fn b(&self, applied: f64) -> [f64; 2] {
        [applied * self.gs + self.jph, 0.0]
    }

    /// Companion matrix A = G + alpha * C / h (diagonal C).
    fn companion(&self, h: f64, alpha: f64) -> [[f64; 2]; 2] {
        let mut a = self.g;
        a[0][0] += alpha * self.c[0] / h;
        a[1][1] += alpha * self.c[1] / h;
        a
    }

    fn g_times(&self, x: &[f64; 2]) -> [f64; 2] {
        [
            self.g[0][0] * x[0] + self.g[0][1] * x[1],
            self.g[1][0] * x[0] + self.g[1][1] * x[1],
        ]
    }

    /// BE step: (G + C/h) x_{n+1} = b_{n+1} + (C/h) x_n
    fn step_be(&self, x: &[f64; 2], b_next: &[f64; 2], h: f64) -> Result<[f64; 2]> {
        let a = self.companion(h, 1.0);
        let rhs = [
            b_next[0] + self.c[0] / h * x[0],
            b_next[1] + self.c[1] / h * x[1],
        ];
        solve_2x2(&a, &rhs)
    }

    /// TRAP step: (G + 2C/h) x_{n+1} = b_{n+1} + b_n + (2C/h - G) x_n
    fn step_trap(&self, x: &[f64; 2], b_next: &[f64; 2], b_prev: &[f64; 2], h: f64) -> Result<[f64; 2]> {
        let a = self.companion(h, 2.0);
        let gx = self.g_times(x);
        let rhs = [
            b_next[0] + b_prev[0] + 2.0 * self.c[0] / h * x[0] - gx[0],
            b_next[1] + b_prev[1] + 2.0 * self.c[1] / h * x[1] - gx[1],
        ];
        solve_2x2(&a, &rhs)
    }

    /// Current flowing into the device at its terminal.
    fn terminal_current(&self, x: &[f64; 2], applied: f64) -> f64 {
        (applied - x[0]) * self.gs
    }

    /// Current through the ionic branch.
    fn ionic_current(&self, x: &[f64; 2]) -> f64 {
        -self.g[0][1] * (x[0] - x[1])
    }
}

fn solve_2x2(a: &[[f64; 2]; 2], b: &[f64; 2]) -> Result<[f64; 2]> {
    let det = a[0][0] * a[1][1] - a[0][1] * a[1][0];
    if det.abs() < 1e-300 || !det.is_finite() {
        return Err(IsweepError::Simulation("singular companion matrix".into()));
    }
    Ok([
        (b[0] * a[1][1] - a[0][1] * b[1]) / det,
        (a[0][0] * b[1] - b[0] * a[1][0]) / det,
    ])
}

impl LumpedSimulator {
    fn validate(request: &OscillationRequest) -> Result<()> {
        if !(request.frequency.is_finite() && request.frequency > 0.0) {
            return Err(IsweepError::Simulation(format!(
                "oscillation frequency must be positive, got {}",
                request.frequency
            )));
        }
        if request.periods == 0 || request.tpoints_per_period == 0 {
            return Err(IsweepError::Simulation(
                "oscillation needs at least one period and one point per period".into(),
            ));
        }
        if !(request.tolerance.is_finite() && request.tolerance > 0.0) {
            return Err(IsweepError::Simulation(format!(
                "tolerance must be positive, got {}",
                request.tolerance
            )));
        }
        Ok(())
    }
}

impl Simulator<LumpedDevice> for LumpedSimulator {
    fn simulate(
        &self,
        start: &StartingPoint<LumpedDevice>,
        request: &OscillationRequest,
    ) -> Result<OscillatingSolution<LumpedDevice>> {
        Self::validate(request)?;
        let _span = tracing::debug_span!(
            "lumped_oscillation",
            frequency = request.frequency,
            tolerance = request.tolerance
        )
        .entered();

        let mut device = start
            .final_state()
            .ok_or_else(|| IsweepError::Simulation("starting point has no frames".into()))?
            .clone();
        let vdc = device.dc_bias();
        if request.use_last_point_as_start {
            device.settle(vdc);
        }
        device.time = 0.0;

        let system = CircuitSystem::new(&device);
        let omega = 2.0 * PI * request.frequency;
        let applied = |t: f64| vdc + request.delta_v * (omega * t).sin();

        let dt_out = 1.0 / (request.frequency * request.tpoints_per_period as f64);
        let h_max = dt_out;
        let h_min = dt_out * self.min_step_fraction;
        let lte_tol = request.tolerance * (1.0 + vdc.abs());
        let n_samples = request.sample_count();

        let mut trace = ResponseTrace {
            frequency: request.frequency,
            delta_v: request.delta_v,
            periods: request.periods,
            tpoints_per_period: request.tpoints_per_period,
            times: Vec::with_capacity(n_samples),
            voltage: Vec::with_capacity(n_samples),
            current: Vec::with_capacity(n_samples),
            ionic_current: Vec::with_capacity(n_samples),
        };
        let mut frames = Vec::with_capacity(if request.minimal { 2 } else { n_samples });

        let mut x = [device.v_geometric, device.v_ionic];
        record_sample(&mut trace, &system, &x, 0.0, applied(0.0));
        frames.push(device.clone());

        let mut t = 0.0;
        let mut h = h_max;
        let mut b_prev = system.b(applied(0.0));
        let mut use_be = true;
        let mut consecutive_failures = 0;

        for k in 1..n_samples {
            let t_target = k as f64 * dt_out;
            while t < t_target {
                // Land exactly on the output sample
                let h_step = h.min(t_target - t);
                let last_in_sample = t + h_step >= t_target;
                let t_next = if last_in_sample { t_target } else { t + h_step };
                let b_next = system.b(applied(t_next));

                let (x_trap, x_be) = if use_be {
                    let x_be = system.step_be(&x, &b_next, h_step)?;
                    (x_be, x_be)
                } else {
                    (
                        system.step_trap(&x, &b_next, &b_prev, h_step)?,
                        system.step_be(&x, &b_next, h_step)?,
                    )
                };

                if !use_be {
                    let lte = (x_trap[0] - x_be[0]).abs().max((x_trap[1] - x_be[1]).abs());
                    if lte > lte_tol {
                        h = (h_step * (0.9 * (lte_tol / lte).sqrt()).clamp(0.5, 2.0)).max(h_min);
                        consecutive_failures += 1;
                        if consecutive_failures >= self.max_consecutive_failures && h <= h_min * 1.01 {
                            return Err(IsweepError::Simulation(format!(
                                "{consecutive_failures} consecutive step rejections at minimum step {h_min:.2e}s near t={t:.3e}s"
                            )));
                        }
                        use_be = true;
                        continue;
                    }
                    if !last_in_sample {
                        let factor = if lte > 0.0 {
                            (0.9 * (lte_tol / lte).sqrt()).clamp(0.5, 2.0)
                        } else {
                            2.0
                        };
                        h = (h_step * factor).clamp(h_min, h_max);
                    }
                } else {
                    use_be = false;
                }

                consecutive_failures = 0;
                x = x_trap;
                b_prev = b_next;
                t = t_next;
            }

            let v = applied(t_target);
            record_sample(&mut trace, &system, &x, t_target, v);
            if !request.minimal || k + 1 == n_samples {
                let mut frame = device.clone();
                frame.v_geometric = x[0];
                frame.v_ionic = x[1];
                frame.time = t_target;
                frames.push(frame);
            }
        }

        Ok(OscillatingSolution {
            frames,
            trace,
            tolerance: request.tolerance,
        })
    }
}

fn record_sample(trace: &mut ResponseTrace, system: &CircuitSystem, x: &[f64; 2], t: f64, applied: f64) {
    trace.times.push(t);
    trace.voltage.push(applied);
    // Reported currents are extracted (out of the device): a positive voltage
    // step gives a negative response.
    trace.current.push(-system.terminal_current(x, applied));
    trace.ionic_current.push(-system.ionic_current(x));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn request(frequency: f64) -> OscillationRequest {
        OscillationRequest {
            bc: BoundaryCondition::FixedMajority,
            delta_v: 1e-3,
            frequency,
            periods: 4,
            tpoints_per_period: 20,
            use_last_point_as_start: true,
            minimal: false,
            tolerance: 1e-6,
        }
    }

    #[test]
    fn dc_operating_point_balances_currents() {
        let params = LumpedParams::default();
        let d = LumpedDevice::at_bias(params.clone(), 1.0, 0.5);
        let i_in = (0.5 - d.v_geometric) / params.series_resistance;
        let i_out = d.v_geometric / params.recombination_resistance - params.photocurrent;
        assert_relative_eq!(i_in, i_out, epsilon = 1e-12);
        assert_eq!(d.v_ionic, d.v_geometric);
        assert_eq!(d.dc_bias(), 0.5);
    }

    #[test]
    fn open_circuit_state_has_zero_contact_difference() {
        let d = LumpedDevice::at_open_circuit(LumpedParams::default(), 1.0);
        assert!(d.is_open_circuit());
        assert_eq!(d.dc_bias(), 0.0);
        assert_relative_eq!(d.v_geometric, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn splitter_returns_photovoltage() {
        let d = LumpedDevice::at_open_circuit(LumpedParams::default(), 0.5);
        let (half, vdc) = LumpedSplitter.split(&d, BoundaryCondition::ZeroFlux).unwrap();
        assert_relative_eq!(vdc, 0.5, epsilon = 1e-12);
        assert!(!half.is_open_circuit());
        assert_eq!(half.contacts, BoundaryCondition::ZeroFlux);
        assert_relative_eq!(half.dc_bias(), vdc, epsilon = 1e-12);
    }

    #[test]
    fn splitter_rejects_closed_circuit_state() {
        let d = LumpedDevice::at_bias(LumpedParams::default(), 1.0, 0.0);
        assert!(LumpedSplitter.split(&d, BoundaryCondition::ZeroFlux).is_err());
    }

    #[test]
    fn freezing_ions_opens_ionic_branch() {
        let mut d = LumpedDevice::at_bias(LumpedParams::default(), 1.0, 0.0);
        d.freeze_ions();
        assert_eq!(d.ion_mobility(), 0.0);
        assert_eq!(d.ion_conductance(), 0.0);
    }

    #[test]
    fn solution_has_expected_sample_count() {
        let d = LumpedDevice::at_bias(LumpedParams::default(), 1.0, 0.0);
        let start = StartingPoint::Steady(Arc::new(d));
        let req = request(1e3);
        let sol = LumpedSimulator::default().simulate(&start, &req).unwrap();
        assert_eq!(sol.trace.len(), 1 + 4 * 20);
        assert_eq!(sol.frames.len(), 1 + 4 * 20);
        assert_relative_eq!(sol.t_max(), 4.0 / 1e3, epsilon = 1e-12);
    }

    #[test]
    fn minimal_mode_keeps_first_and_last_frames() {
        let d = LumpedDevice::at_bias(LumpedParams::default(), 1.0, 0.0);
        let start = StartingPoint::Steady(Arc::new(d));
        let req = OscillationRequest {
            minimal: true,
            ..request(1e3)
        };
        let sol = LumpedSimulator::default().simulate(&start, &req).unwrap();
        assert_eq!(sol.frames.len(), 2);
        assert_relative_eq!(sol.last_frame().unwrap().time, sol.t_max(), epsilon = 1e-15);
    }

    #[test]
    fn zero_perturbation_stays_at_steady_state() {
        let d = LumpedDevice::at_bias(LumpedParams::default(), 1.0, 0.3);
        let expected = d.v_geometric;
        let start = StartingPoint::Steady(Arc::new(d));
        let req = OscillationRequest {
            delta_v: 0.0,
            ..request(1e4)
        };
        let sol = LumpedSimulator::default().simulate(&start, &req).unwrap();
        let last = sol.last_frame().unwrap();
        assert_relative_eq!(last.v_geometric, expected, epsilon = 1e-12);
        let j0 = sol.trace.current[0];
        assert!(sol.trace.current.iter().all(|&j| (j - j0).abs() < 1e-12));
    }

    #[test]
    fn rejects_non_positive_frequency() {
        let d = LumpedDevice::at_bias(LumpedParams::default(), 1.0, 0.0);
        let start = StartingPoint::Steady(Arc::new(d));
        let err = LumpedSimulator::default().simulate(&start, &request(0.0)).unwrap_err();
        assert!(format!("{err}").contains("Simulation error"));
    }

    #[test]
    fn impedance_is_capacitive() {
        let p = LumpedParams::default();
        let z = p.impedance(1e5, p.ion_mobility);
        assert!(z.re > 0.0);
        assert!(z.im < 0.0);
        // DC limit: ionic branch blocks, Rs + Rrec
        let z_dc = p.impedance(1e-9, p.ion_mobility);
        assert_relative_eq!(z_dc.re, 52.0, max_relative = 1e-3);
    }

    #[test]
    fn invalid_params_are_reported() {
        let p = LumpedParams {
            series_resistance: 0.0,
            ..LumpedParams::default()
        };
        assert!(p.validate().is_err());
        assert!(LumpedParams::default().validate().is_ok());
    }
}
