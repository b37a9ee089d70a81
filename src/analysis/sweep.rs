//! Sweep orchestration over intensity entries and frequencies.
//!
//! For each entry:
//!   1. Split open-circuit states into a half cell at the returned Vdc,
//!      otherwise take Vdc from the state's boundary potentials.
//!   2. Freeze ions if requested.
//!   3. For each frequency run the validity ladder, starting from the
//!      entry's prepared state, or from the previous frequency's solution in
//!      sequential mode.
//!
//! Rows are independent unless sequential mode is on, so they may be swept
//! concurrently; results are always written back in input order.

use super::ladder::{self, LadderStage};
use super::plan::{self, SweepMatrices};
use super::{ImpedanceSpectra, PhaseOutOfRangeWarning, SweepOptions};
use super::{BASE_TOLERANCE, PERIODS, TPOINTS_PER_PERIOD};
use crate::device::{DeviceState, IntensityEntry};
use crate::error::Result;
use crate::observer::SweepObserver;
use crate::response::{ResponseAnalyzer, ResponseFit};
use crate::simulator::{OscillationRequest, Simulator, StartingPoint, StateSplitter};
use crate::stats::SweepStats;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

/// Name under which a cell's solution is handed to the observer.
pub fn solution_name(entry_name: &str, frequency: f64) -> String {
    format!("{entry_name}_is_{frequency:.3e}Hz")
}

/// Name under which the result record is handed to the observer.
pub fn result_name<S>(entries: &[IntensityEntry<S>]) -> String {
    match entries.first() {
        Some(e) => format!("is_{}", e.name),
        None => "is_sweep".to_string(),
    }
}

/// One swept frequency of one entry.
struct CellRecord {
    fit: ResponseFit,
    t_max: f64,
    stage: LadderStage,
    simulations: usize,
    analyses: usize,
    out_of_range: bool,
}

struct RowOutcome {
    vdc: f64,
    cells: Vec<CellRecord>,
}

/// Run the impedance sweep over `entries`.
///
/// Only collaborator failures are returned as errors; cells whose phase
/// cannot be validated are recorded and reported in
/// [`ImpedanceSpectra::warnings`].
pub fn run<S: DeviceState>(
    entries: &[IntensityEntry<S>],
    options: &SweepOptions,
    simulator: &dyn Simulator<S>,
    analyzer: &dyn ResponseAnalyzer,
    splitter: &dyn StateSplitter<S>,
    observer: &dyn SweepObserver<S>,
    mut stats: Option<&mut SweepStats>,
) -> Result<ImpedanceSpectra> {
    let frequencies = plan::log_frequencies(options.start_freq, options.end_freq, options.freq_points)?;
    let _span = tracing::info_span!(
        "impedance_sweep",
        entries = entries.len(),
        n_freqs = frequencies.len(),
        sequential = options.sequential
    )
    .entered();

    let t = Instant::now();
    let sweep_row = |(i, entry): (usize, &IntensityEntry<S>)| {
        sweep_entry(i, entry, &frequencies, options, simulator, analyzer, splitter, observer)
    };
    let rows: Vec<RowOutcome> = if options.parallel && !options.sequential {
        entries.par_iter().enumerate().map(sweep_row).collect::<Result<_>>()?
    } else {
        entries.iter().enumerate().map(sweep_row).collect::<Result<_>>()?
    };
    if let Some(ref mut s) = stats {
        s.add_phase("Sweep", t.elapsed());
    }

    let mut matrices = SweepMatrices::zeros(entries.len(), frequencies.len());
    let mut vdc = Vec::with_capacity(entries.len());
    let mut warnings = Vec::new();
    for (i, row) in rows.into_iter().enumerate() {
        vdc.push(row.vdc);
        for (j, cell) in row.cells.iter().enumerate() {
            matrices.total.record(i, j, &cell.fit.total);
            matrices.ionic.record(i, j, &cell.fit.ionic);
            matrices.t_max[(i, j)] = cell.t_max;
            if cell.out_of_range {
                let warning = PhaseOutOfRangeWarning {
                    entry: i,
                    name: entries[i].name.clone(),
                    frequency: frequencies[j],
                    phase: cell.fit.total.phase,
                };
                tracing::warn!("{warning}");
                warnings.push(warning);
            }
            if let Some(ref mut s) = stats {
                s.record_cell(cell.stage, cell.simulations, cell.analyses);
                if cell.out_of_range {
                    s.phase_warnings += 1;
                }
            }
        }
    }

    let spectra = ImpedanceSpectra::assemble(
        entries.iter().map(|e| e.name.clone()).collect(),
        entries.iter().map(|e| e.intensity).collect(),
        vdc,
        &frequencies,
        matrices,
        options,
        warnings,
    );

    if options.save_results {
        observer.results_produced(&result_name(entries), &spectra)?;
    }
    if options.do_graphics {
        observer.graphics_requested(&spectra)?;
    }
    Ok(spectra)
}

#[allow(clippy::too_many_arguments)]
fn sweep_entry<S: DeviceState>(
    index: usize,
    entry: &IntensityEntry<S>,
    frequencies: &[f64],
    options: &SweepOptions,
    simulator: &dyn Simulator<S>,
    analyzer: &dyn ResponseAnalyzer,
    splitter: &dyn StateSplitter<S>,
    observer: &dyn SweepObserver<S>,
) -> Result<RowOutcome> {
    let _span = tracing::debug_span!(
        "intensity_entry",
        index,
        name = %entry.name,
        intensity = entry.intensity
    )
    .entered();

    let (mut state, vdc) = if entry.state.is_open_circuit() {
        splitter.split(&entry.state, options.bc)?
    } else {
        (entry.state.clone(), entry.state.dc_bias())
    };
    if options.frozen_ions {
        state.freeze_ions();
    }
    tracing::debug!(vdc, ion_mobility = state.ion_mobility(), "prepared starting state");

    let initial = StartingPoint::Steady(Arc::new(state));
    let mut current_start = initial.clone();
    let base = OscillationRequest {
        bc: options.bc,
        delta_v: options.delta_v,
        frequency: 0.0,
        periods: PERIODS,
        tpoints_per_period: TPOINTS_PER_PERIOD,
        use_last_point_as_start: !options.sequential,
        minimal: !options.save_solutions,
        tolerance: BASE_TOLERANCE,
    };

    let mut cells = Vec::with_capacity(frequencies.len());
    for &frequency in frequencies {
        let start = if options.sequential { &current_start } else { &initial };
        let request = OscillationRequest {
            frequency,
            ..base.clone()
        };
        let outcome = ladder::measure_cell(simulator, analyzer, start, &request, options.sequential)?;
        tracing::debug!(
            frequency,
            phase_deg = outcome.fit.total.phase.to_degrees(),
            amplitude = outcome.fit.total.amplitude,
            stage = ?outcome.stage,
            "cell measured"
        );

        if options.save_solutions {
            observer.solution_produced(&solution_name(&entry.name, frequency), &outcome.solution)?;
        }

        cells.push(CellRecord {
            fit: outcome.fit,
            t_max: outcome.solution.t_max(),
            stage: outcome.stage,
            simulations: outcome.simulations,
            analyses: outcome.analyses,
            out_of_range: outcome.out_of_range(),
        });

        if options.sequential {
            current_start = StartingPoint::Oscillating(outcome.solution);
        }
    }

    Ok(RowOutcome { vdc, cells })
}
