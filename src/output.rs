//! Results output formatting (CSV).

use crate::analysis::ImpedanceSpectra;
use crate::error::Result;
use crate::simulator::ResponseTrace;
use std::io::Write;

/// Write impedance spectra as CSV, one row per (intensity, frequency) cell.
///
/// Format:
/// ```csv
/// Intensity,Vdc,Frequency,Tmax,J_bias,J_amp,J_phase_deg,Z_abs,Z_re,Z_im,C,Jion_bias,Jion_amp,Jion_phase_deg,Zion_abs,Zion_re,Zion_im,Cion
/// 1,0.98,1000000,2e-5,-0.0096,-0.00045,12.3,2.2,2.1,0.47,3.4e-8,...
/// ```
pub fn write_spectra_csv<W: Write>(spectra: &ImpedanceSpectra, writer: &mut W) -> Result<()> {
    writeln!(
        writer,
        "Intensity,Vdc,Frequency,Tmax,\
         J_bias,J_amp,J_phase_deg,Z_abs,Z_re,Z_im,C,\
         Jion_bias,Jion_amp,Jion_phase_deg,Zion_abs,Zion_re,Zion_im,Cion"
    )?;
    for i in 0..spectra.n_entries() {
        for j in 0..spectra.n_frequencies() {
            let cell = (i, j);
            write!(
                writer,
                "{},{},{},{}",
                spectra.intensities[i], spectra.vdc[i], spectra.frequencies[cell], spectra.t_max[cell]
            )?;
            for c in [&spectra.total, &spectra.ionic] {
                write!(
                    writer,
                    ",{},{},{},{},{},{},{}",
                    c.bias[cell],
                    c.amplitude[cell],
                    c.phase[cell].to_degrees(),
                    c.impedance_abs[cell],
                    c.impedance_re[cell],
                    c.impedance_im[cell],
                    c.capacitance[cell]
                )?;
            }
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Write the terminal time series of an oscillating solution as CSV.
///
/// Format:
/// ```csv
/// Time,V,J,Jion
/// 0,0.98,-0.0096,0
/// 2.5e-8,0.98016,-0.0097,-1e-9
/// ```
pub fn write_trace_csv<W: Write>(trace: &ResponseTrace, writer: &mut W) -> Result<()> {
    writeln!(writer, "Time,V,J,Jion")?;
    for k in 0..trace.len() {
        writeln!(
            writer,
            "{},{},{},{}",
            trace.times[k], trace.voltage[k], trace.current[k], trace.ionic_current[k]
        )?;
    }
    Ok(())
}
