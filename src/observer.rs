//! Hooks for exposing intermediate solutions and final results.
//!
//! The sweep calls an observer only when the matching flag is set in
//! [`SweepOptions`](crate::analysis::SweepOptions); its return value does
//! not depend on the observer.

use crate::analysis::ImpedanceSpectra;
use crate::device::DeviceState;
use crate::error::Result;
use crate::output;
use crate::simulator::OscillatingSolution;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

pub trait SweepObserver<S: DeviceState>: Sync {
    /// An oscillating solution was accepted for a cell (`save_solutions`).
    fn solution_produced(&self, _name: &str, _solution: &OscillatingSolution<S>) -> Result<()> {
        Ok(())
    }

    /// The result record is complete (`save_results`).
    fn results_produced(&self, _name: &str, _spectra: &ImpedanceSpectra) -> Result<()> {
        Ok(())
    }

    /// Plotting was requested (`do_graphics`).
    fn graphics_requested(&self, _spectra: &ImpedanceSpectra) -> Result<()> {
        Ok(())
    }
}

/// Observer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl<S: DeviceState> SweepObserver<S> for NullObserver {}

/// Writes every observed solution and result as CSV into a directory.
#[derive(Debug, Clone)]
pub struct CsvDirectoryObserver {
    pub dir: PathBuf,
}

impl CsvDirectoryObserver {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn create(&self, name: &str) -> Result<BufWriter<File>> {
        let path = self.dir.join(format!("{}.csv", sanitize(name)));
        Ok(BufWriter::new(File::create(path)?))
    }
}

impl<S: DeviceState> SweepObserver<S> for CsvDirectoryObserver {
    fn solution_produced(&self, name: &str, solution: &OscillatingSolution<S>) -> Result<()> {
        let mut w = self.create(name)?;
        output::write_trace_csv(&solution.trace, &mut w)
    }

    fn results_produced(&self, name: &str, spectra: &ImpedanceSpectra) -> Result<()> {
        let mut w = self.create(name)?;
        output::write_spectra_csv(spectra, &mut w)
    }

    fn graphics_requested(&self, spectra: &ImpedanceSpectra) -> Result<()> {
        tracing::info!(
            entries = spectra.intensities.len(),
            "plotting is not built in; spectra are written as CSV for external plotting"
        );
        Ok(())
    }
}

/// Replace characters that are awkward in file names.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+') { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_scientific_notation() {
        assert_eq!(sanitize("1 sun_is_1.000e+03Hz"), "1_sun_is_1.000e+03Hz");
        assert_eq!(sanitize("a/b"), "a_b");
    }
}
