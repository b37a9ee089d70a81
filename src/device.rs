//! Device states and the light-intensity entries that drive a sweep.

use serde_derive::Deserialize;
use std::fmt;

/// A snapshot of a simulated device.
///
/// The sweep never looks inside a state beyond these accessors; everything
/// else belongs to the simulator that produced it.
pub trait DeviceState: Clone + Send + Sync {
    /// Whether the state describes a symmetric open-circuit device that must be
    /// split into a half cell before an impedance measurement.
    fn is_open_circuit(&self) -> bool;

    /// Mobility coefficient of the mobile ionic species.
    fn ion_mobility(&self) -> f64;

    /// Force the ionic mobility to zero.
    fn freeze_ions(&mut self);

    /// DC bias across the device, taken as the potential difference between
    /// its two boundaries.
    fn dc_bias(&self) -> f64;

    /// Light intensity the state was equilibrated at, in suns.
    fn light_intensity(&self) -> f64;
}

/// Contact boundary-condition mode used when splitting an open-circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryCondition {
    /// Blocking contacts, no carrier flux through the boundary.
    ZeroFlux,
    /// Majority carrier densities pinned at each contact.
    #[default]
    FixedMajority,
    /// Both carrier types extracted at both contacts.
    NonSelective,
    /// Finite surface recombination velocities at the contacts.
    Recombining,
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BoundaryCondition::ZeroFlux => "zero-flux",
            BoundaryCondition::FixedMajority => "fixed-majority",
            BoundaryCondition::NonSelective => "non-selective",
            BoundaryCondition::Recombining => "recombining",
        };
        f.write_str(s)
    }
}

/// One illumination condition of the sweep: a prepared state, a display name
/// and the light intensity it corresponds to.
#[derive(Debug, Clone)]
pub struct IntensityEntry<S> {
    pub state: S,
    pub name: String,
    pub intensity: f64,
}

impl<S: DeviceState> IntensityEntry<S> {
    pub fn new(state: S, name: impl Into<String>, intensity: f64) -> Self {
        Self {
            state,
            name: name.into(),
            intensity,
        }
    }

    /// Entry whose intensity is read from the state itself.
    pub fn from_state(state: S, name: impl Into<String>) -> Self {
        let intensity = state.light_intensity();
        Self::new(state, name, intensity)
    }
}
