//! Phase-validity ladder for a single (intensity, frequency) cell.
//!
//! Demodulation is cheap but may report a phase outside the quadrant of a
//! capacitive response. The ladder escalates only while the total-current
//! phase fails its range check:
//!
//! 1. `Demodulated`: simulate at the base tolerance, demodulate.
//! 2. `ToleranceRetried`: phase within `PHASE_MARGIN` of [0, π/2] or outside
//!    it: re-simulate at tolerance / 100, demodulate again.
//! 3. `FittedFallback`: phase outside [0, π/2]: least-squares fit on the
//!    existing solution.
//! 4. `ToleranceRetriedFitted`: still outside: re-simulate at a further
//!    tolerance / 100, least-squares fit.
//!
//! Whatever the last stage produces is accepted.

use super::{PHASE_MARGIN, TOLERANCE_RETRY_FACTOR};
use crate::device::DeviceState;
use crate::error::Result;
use crate::response::{AnalysisOptions, ResponseAnalyzer, ResponseFit};
use crate::simulator::{OscillatingSolution, OscillationRequest, Simulator, StartingPoint};
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LadderStage {
    Demodulated,
    ToleranceRetried,
    FittedFallback,
    ToleranceRetriedFitted,
}

const DEMODULATE: AnalysisOptions = AnalysisOptions {
    minimal: true,
    demodulate: true,
};

const FIT_ONLY: AnalysisOptions = AnalysisOptions {
    minimal: true,
    demodulate: false,
};

/// Phase too close to (or beyond) the edges of [0, π/2] to trust.
pub fn needs_tolerance_retry(phase: f64) -> bool {
    !(PHASE_MARGIN..=FRAC_PI_2 - PHASE_MARGIN).contains(&phase)
}

/// Phase outside [0, π/2].
pub fn phase_out_of_bounds(phase: f64) -> bool {
    !(0.0..=FRAC_PI_2).contains(&phase)
}

/// Final outcome of a cell.
#[derive(Debug)]
pub struct CellOutcome<S> {
    pub fit: ResponseFit,
    pub solution: Arc<OscillatingSolution<S>>,
    pub stage: LadderStage,
    /// Tolerance of the accepted solution.
    pub tolerance: f64,
    pub simulations: usize,
    pub analyses: usize,
}

impl<S> CellOutcome<S> {
    /// Phase was still invalid after the last stage.
    pub fn out_of_range(&self) -> bool {
        phase_out_of_bounds(self.fit.total.phase)
    }
}

struct Cell<'a, S: DeviceState> {
    simulator: &'a dyn Simulator<S>,
    analyzer: &'a dyn ResponseAnalyzer,
    start: &'a StartingPoint<S>,
    sequential: bool,
    request: OscillationRequest,
    simulations: usize,
    analyses: usize,
}

impl<S: DeviceState> Cell<'_, S> {
    fn simulate(&mut self, start: &StartingPoint<S>) -> Result<Arc<OscillatingSolution<S>>> {
        self.simulations += 1;
        Ok(Arc::new(self.simulator.simulate(start, &self.request)?))
    }

    fn analyze(&mut self, solution: &OscillatingSolution<S>, options: AnalysisOptions) -> Result<ResponseFit> {
        self.analyses += 1;
        self.analyzer.analyze(&solution.trace, options)
    }

    /// Restart point for a tighter-tolerance re-run: the pre-oscillation
    /// state in sequential mode, the latest solution otherwise.
    fn restart_point(&self, latest: &Arc<OscillatingSolution<S>>) -> StartingPoint<S> {
        if self.sequential {
            self.start.clone()
        } else {
            StartingPoint::Oscillating(Arc::clone(latest))
        }
    }

    fn tighten(&mut self) {
        self.request.tolerance /= TOLERANCE_RETRY_FACTOR;
    }
}

/// Run the ladder for one cell.
///
/// `request` carries the base tolerance and the frequency; `start` is the
/// starting point chosen by the sweep for this frequency.
pub fn measure_cell<S: DeviceState>(
    simulator: &dyn Simulator<S>,
    analyzer: &dyn ResponseAnalyzer,
    start: &StartingPoint<S>,
    request: &OscillationRequest,
    sequential: bool,
) -> Result<CellOutcome<S>> {
    let frequency = request.frequency;
    let mut cell = Cell {
        simulator,
        analyzer,
        start,
        sequential,
        request: request.clone(),
        simulations: 0,
        analyses: 0,
    };

    let mut solution = cell.simulate(start)?;
    let mut fit = cell.analyze(&solution, DEMODULATE)?;
    let mut stage = LadderStage::Demodulated;

    if needs_tolerance_retry(fit.total.phase) {
        cell.tighten();
        tracing::info!(
            frequency,
            phase_deg = fit.total.phase.to_degrees(),
            tolerance = cell.request.tolerance,
            "phase near quadrant edge, re-simulating with tighter tolerance"
        );
        let restart = cell.restart_point(&solution);
        solution = cell.simulate(&restart)?;
        fit = cell.analyze(&solution, DEMODULATE)?;
        stage = LadderStage::ToleranceRetried;
    }

    if phase_out_of_bounds(fit.total.phase) {
        tracing::info!(
            frequency,
            phase_deg = fit.total.phase.to_degrees(),
            "demodulated phase out of range, falling back to least-squares fit"
        );
        fit = cell.analyze(&solution, FIT_ONLY)?;
        stage = LadderStage::FittedFallback;
    }

    if phase_out_of_bounds(fit.total.phase) {
        cell.tighten();
        tracing::warn!(
            frequency,
            phase_deg = fit.total.phase.to_degrees(),
            tolerance = cell.request.tolerance,
            "fitted phase out of range, re-simulating with tighter tolerance"
        );
        let restart = cell.restart_point(&solution);
        solution = cell.simulate(&restart)?;
        fit = cell.analyze(&solution, FIT_ONLY)?;
        stage = LadderStage::ToleranceRetriedFitted;
    }

    Ok(CellOutcome {
        fit,
        solution,
        stage,
        tolerance: cell.request.tolerance,
        simulations: cell.simulations,
        analyses: cell.analyses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BoundaryCondition;
    use crate::response::{ExtractionMethod, SinusoidFit};
    use crate::simulator::ResponseTrace;
    use std::sync::Mutex;

    /// Device stand-in; the id tags where a simulation started from.
    #[derive(Debug, Clone, PartialEq)]
    struct Probe {
        id: u32,
    }

    impl DeviceState for Probe {
        fn is_open_circuit(&self) -> bool {
            false
        }
        fn ion_mobility(&self) -> f64 {
            1.0
        }
        fn freeze_ions(&mut self) {}
        fn dc_bias(&self) -> f64 {
            0.0
        }
        fn light_intensity(&self) -> f64 {
            1.0
        }
    }

    /// Records every call and numbers the produced solutions 100, 101, ...
    #[derive(Default)]
    struct RecordingSimulator {
        calls: Mutex<Vec<(Option<u32>, f64)>>,
    }

    impl Simulator<Probe> for RecordingSimulator {
        fn simulate(&self, start: &StartingPoint<Probe>, request: &OscillationRequest) -> Result<OscillatingSolution<Probe>> {
            let mut calls = self.calls.lock().unwrap();
            let started_from = start.final_state().map(|p| p.id);
            calls.push((started_from, request.tolerance));
            let id = 100 + calls.len() as u32 - 1;
            Ok(OscillatingSolution {
                frames: vec![Probe { id }],
                trace: ResponseTrace {
                    frequency: request.frequency,
                    times: vec![id as f64],
                    ..ResponseTrace::default()
                },
                tolerance: request.tolerance,
            })
        }
    }

    /// Returns scripted phases: one script for demodulation, one for fitting.
    struct ScriptedAnalyzer {
        demodulated: Mutex<Vec<f64>>,
        fitted: Mutex<Vec<f64>>,
    }

    impl ScriptedAnalyzer {
        fn new(demodulated: &[f64], fitted: &[f64]) -> Self {
            Self {
                demodulated: Mutex::new(demodulated.iter().rev().copied().collect()),
                fitted: Mutex::new(fitted.iter().rev().copied().collect()),
            }
        }
    }

    impl ResponseAnalyzer for ScriptedAnalyzer {
        fn analyze(&self, _trace: &ResponseTrace, options: AnalysisOptions) -> Result<ResponseFit> {
            let script = if options.demodulate { &self.demodulated } else { &self.fitted };
            let phase = script.lock().unwrap().pop().expect("analyzer called more often than scripted");
            let total = SinusoidFit { bias: 0.0, amplitude: -1e-5, phase };
            Ok(ResponseFit {
                total,
                ionic: total,
                method: if options.demodulate {
                    ExtractionMethod::Demodulation
                } else {
                    ExtractionMethod::LeastSquares
                },
                residual_rms: None,
            })
        }
    }

    fn request() -> OscillationRequest {
        OscillationRequest {
            bc: BoundaryCondition::FixedMajority,
            delta_v: 1e-3,
            frequency: 1e3,
            periods: 20,
            tpoints_per_period: 40,
            use_last_point_as_start: true,
            minimal: true,
            tolerance: 1e-6,
        }
    }

    fn start() -> StartingPoint<Probe> {
        StartingPoint::Steady(Arc::new(Probe { id: 1 }))
    }

    #[test]
    fn predicates() {
        assert!(!needs_tolerance_retry(0.5));
        assert!(needs_tolerance_retry(0.005));
        assert!(needs_tolerance_retry(FRAC_PI_2 - 0.001));
        assert!(needs_tolerance_retry(f64::NAN));
        assert!(!phase_out_of_bounds(0.0));
        assert!(!phase_out_of_bounds(FRAC_PI_2));
        assert!(phase_out_of_bounds(-1e-9));
        assert!(phase_out_of_bounds(FRAC_PI_2 + 1e-9));
        assert!(phase_out_of_bounds(f64::NAN));
    }

    #[test]
    fn valid_phase_needs_one_simulation() {
        let sim = RecordingSimulator::default();
        let ana = ScriptedAnalyzer::new(&[0.8], &[]);
        let out = measure_cell(&sim, &ana, &start(), &request(), false).unwrap();
        assert_eq!(out.stage, LadderStage::Demodulated);
        assert_eq!(out.simulations, 1);
        assert_eq!(out.analyses, 1);
        assert_eq!(out.fit.total.phase, 0.8);
        assert!(!out.out_of_range());
    }

    #[test]
    fn edge_phase_retries_from_latest_solution_when_not_sequential() {
        let sim = RecordingSimulator::default();
        let ana = ScriptedAnalyzer::new(&[0.001, 0.4], &[]);
        let out = measure_cell(&sim, &ana, &start(), &request(), false).unwrap();
        assert_eq!(out.stage, LadderStage::ToleranceRetried);
        let calls = sim.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (Some(1), 1e-6));
        // Restarted from the first oscillating solution, tolerance / 100
        assert_eq!(calls[1].0, Some(100));
        assert_eq!(calls[1].1, 1e-6 / 100.0);
        assert_eq!(out.solution.frames[0].id, 101);
    }

    #[test]
    fn edge_phase_retries_from_pre_oscillation_state_when_sequential() {
        let sim = RecordingSimulator::default();
        let ana = ScriptedAnalyzer::new(&[FRAC_PI_2 - 0.001, 1.0], &[]);
        let out = measure_cell(&sim, &ana, &start(), &request(), true).unwrap();
        assert_eq!(out.stage, LadderStage::ToleranceRetried);
        let calls = sim.calls.lock().unwrap();
        assert_eq!(calls[1], (Some(1), 1e-6 / 100.0));
    }

    #[test]
    fn out_of_range_falls_back_to_fit_without_resimulating() {
        let sim = RecordingSimulator::default();
        let ana = ScriptedAnalyzer::new(&[-0.2, -0.1], &[0.3]);
        let out = measure_cell(&sim, &ana, &start(), &request(), false).unwrap();
        assert_eq!(out.stage, LadderStage::FittedFallback);
        assert_eq!(out.simulations, 2);
        assert_eq!(out.analyses, 3);
        assert_eq!(out.fit.method, ExtractionMethod::LeastSquares);
        assert_eq!(out.fit.total.phase, 0.3);
        // Fit ran on the retried solution
        assert_eq!(out.solution.frames[0].id, 101);
    }

    #[test]
    fn persistent_failure_compounds_tolerance_and_is_accepted() {
        let sim = RecordingSimulator::default();
        let ana = ScriptedAnalyzer::new(&[2.0, 2.0], &[1.9, 1.8]);
        let out = measure_cell(&sim, &ana, &start(), &request(), false).unwrap();
        assert_eq!(out.stage, LadderStage::ToleranceRetriedFitted);
        assert_eq!(out.simulations, 3);
        assert_eq!(out.analyses, 4);
        assert_eq!(out.fit.total.phase, 1.8);
        assert!(out.out_of_range());
        let calls = sim.calls.lock().unwrap();
        let tolerances: Vec<f64> = calls.iter().map(|c| c.1).collect();
        assert_eq!(tolerances, vec![1e-6, 1e-6 / 100.0, 1e-6 / 100.0 / 100.0]);
        // Third run restarts from the second solution
        assert_eq!(calls[2].0, Some(101));
        assert_eq!(out.tolerance, 1e-6 / 100.0 / 100.0);
    }

    #[test]
    fn sequential_third_pass_restarts_from_pre_oscillation_state() {
        let sim = RecordingSimulator::default();
        let ana = ScriptedAnalyzer::new(&[-1.0, -1.0], &[-1.0, 0.2]);
        let out = measure_cell(&sim, &ana, &start(), &request(), true).unwrap();
        assert_eq!(out.stage, LadderStage::ToleranceRetriedFitted);
        assert!(!out.out_of_range());
        let calls = sim.calls.lock().unwrap();
        assert!(calls.iter().all(|c| c.0 == Some(1)));
    }
}
