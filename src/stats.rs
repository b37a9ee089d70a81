//! Performance statistics collection for `--stats` output.

use crate::analysis::ladder::LadderStage;
use std::time::{Duration, Instant};

/// Collects sweep counters and phase timings.
///
/// Created when `--stats` is passed, threaded as `Option<&mut SweepStats>`.
pub struct SweepStats {
    total_start: Instant,
    phases: Vec<(&'static str, Duration)>,
    pub cells: u32,
    pub simulations: u32,
    pub analyses: u32,
    // Highest ladder stage reached per cell
    pub tolerance_retries: u32,
    pub fit_fallbacks: u32,
    pub fitted_tolerance_retries: u32,
    pub phase_warnings: u32,
}

impl Default for SweepStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepStats {
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            phases: Vec::new(),
            cells: 0,
            simulations: 0,
            analyses: 0,
            tolerance_retries: 0,
            fit_fallbacks: 0,
            fitted_tolerance_retries: 0,
            phase_warnings: 0,
        }
    }

    /// Record a completed phase with its duration.
    pub fn add_phase(&mut self, name: &'static str, duration: Duration) {
        self.phases.push((name, duration));
    }

    /// Account for one finished cell.
    pub fn record_cell(&mut self, stage: LadderStage, simulations: usize, analyses: usize) {
        self.cells += 1;
        self.simulations += simulations as u32;
        self.analyses += analyses as u32;
        match stage {
            LadderStage::Demodulated => {}
            LadderStage::ToleranceRetried => self.tolerance_retries += 1,
            LadderStage::FittedFallback => {
                self.tolerance_retries += 1;
                self.fit_fallbacks += 1;
            }
            LadderStage::ToleranceRetriedFitted => {
                self.tolerance_retries += 1;
                self.fit_fallbacks += 1;
                self.fitted_tolerance_retries += 1;
            }
        }
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== isweep Performance Stats ===");

        for (name, dur) in &self.phases {
            eprintln!("  {:<24} {:>8.3}s", name, dur.as_secs_f64());
        }

        eprintln!("  Cells:                  {}", self.cells);
        eprintln!("  Simulations:            {}", self.simulations);
        eprintln!("  Analyses:               {}", self.analyses);
        if self.tolerance_retries > 0 {
            eprintln!("    Tolerance retries:    {}", self.tolerance_retries);
            eprintln!("    Fit fallbacks:        {}", self.fit_fallbacks);
            eprintln!("    Fitted retries:       {}", self.fitted_tolerance_retries);
        }
        if self.phase_warnings > 0 {
            eprintln!("  Phase warnings:         {}", self.phase_warnings);
        }

        eprintln!("  ─────────────────────────────────");
        eprintln!("  Total:                  {:>8.3}s", total.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_accumulate_cumulatively() {
        let mut s = SweepStats::new();
        s.record_cell(LadderStage::Demodulated, 1, 1);
        s.record_cell(LadderStage::FittedFallback, 2, 3);
        s.record_cell(LadderStage::ToleranceRetriedFitted, 3, 4);
        assert_eq!(s.cells, 3);
        assert_eq!(s.simulations, 6);
        assert_eq!(s.analyses, 8);
        assert_eq!(s.tolerance_retries, 2);
        assert_eq!(s.fit_fallbacks, 2);
        assert_eq!(s.fitted_tolerance_retries, 1);
    }
}
