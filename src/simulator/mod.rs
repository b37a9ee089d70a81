//! Collaborator contracts for the time-domain device simulator.
//!
//! The sweep treats the simulator as a black box: it hands over a starting
//! point plus an [`OscillationRequest`] and receives an
//! [`OscillatingSolution`] covering the requested number of periods.

pub mod lumped;

use crate::device::{BoundaryCondition, DeviceState};
use crate::error::Result;
use std::sync::Arc;

/// Parameters of one small-signal oscillation run.
#[derive(Debug, Clone, PartialEq)]
pub struct OscillationRequest {
    pub bc: BoundaryCondition,
    /// Oscillation amplitude (V).
    pub delta_v: f64,
    /// Oscillation frequency (Hz).
    pub frequency: f64,
    pub periods: usize,
    pub tpoints_per_period: usize,
    /// Treat the final point of the start as a quiescent DC state and settle
    /// it before oscillating. When false the start is continued as-is.
    pub use_last_point_as_start: bool,
    /// Keep only the first and last frames of the solution.
    pub minimal: bool,
    /// Relative integration tolerance.
    pub tolerance: f64,
}

impl OscillationRequest {
    /// Number of recorded samples, including t = 0.
    pub fn sample_count(&self) -> usize {
        1 + self.periods * self.tpoints_per_period
    }
}

/// Time series of the terminal quantities of an oscillating solution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseTrace {
    pub frequency: f64,
    pub delta_v: f64,
    pub periods: usize,
    pub tpoints_per_period: usize,
    /// Sample times, starting at 0 when the oscillation starts.
    pub times: Vec<f64>,
    /// Applied voltage at each sample.
    pub voltage: Vec<f64>,
    /// Total current density at each sample.
    pub current: Vec<f64>,
    /// Ionic drift current density at each sample.
    pub ionic_current: Vec<f64>,
}

impl ResponseTrace {
    /// Largest simulated time.
    pub fn t_max(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Time-resolved output of the simulator for one frequency.
#[derive(Debug, Clone)]
pub struct OscillatingSolution<S> {
    /// Device snapshots; only the first and last in minimal mode.
    pub frames: Vec<S>,
    pub trace: ResponseTrace,
    /// Tolerance the solution was produced with.
    pub tolerance: f64,
}

impl<S> OscillatingSolution<S> {
    pub fn last_frame(&self) -> Option<&S> {
        self.frames.last()
    }

    pub fn t_max(&self) -> f64 {
        self.trace.t_max()
    }
}

/// Where a simulation starts from.
///
/// Shared through `Arc` so that carrying a solution into the next frequency
/// hands over the very same solution instead of a copy.
#[derive(Debug)]
pub enum StartingPoint<S> {
    /// A prepared steady-state device.
    Steady(Arc<S>),
    /// A previously produced oscillating solution.
    Oscillating(Arc<OscillatingSolution<S>>),
}

impl<S> Clone for StartingPoint<S> {
    fn clone(&self) -> Self {
        match self {
            StartingPoint::Steady(s) => StartingPoint::Steady(Arc::clone(s)),
            StartingPoint::Oscillating(sol) => StartingPoint::Oscillating(Arc::clone(sol)),
        }
    }
}

impl<S> StartingPoint<S> {
    /// Final device snapshot of the starting point.
    pub fn final_state(&self) -> Option<&S> {
        match self {
            StartingPoint::Steady(s) => Some(s.as_ref()),
            StartingPoint::Oscillating(sol) => sol.last_frame(),
        }
    }

    /// True if both starting points share the same underlying allocation.
    pub fn ptr_eq(&self, other: &StartingPoint<S>) -> bool {
        match (self, other) {
            (StartingPoint::Steady(a), StartingPoint::Steady(b)) => Arc::ptr_eq(a, b),
            (StartingPoint::Oscillating(a), StartingPoint::Oscillating(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Integrates the device equations under a sinusoidal voltage perturbation.
pub trait Simulator<S: DeviceState>: Sync {
    fn simulate(
        &self,
        start: &StartingPoint<S>,
        request: &OscillationRequest,
    ) -> Result<OscillatingSolution<S>>;
}

/// Splits a symmetric open-circuit state into an equivalent half cell.
pub trait StateSplitter<S: DeviceState>: Sync {
    /// Returns the half-cell state and the DC bias it sits at.
    fn split(&self, state: &S, bc: BoundaryCondition) -> Result<(S, f64)>;
}
