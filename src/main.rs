use clap::Parser;
use isweep::analysis;
use isweep::config::SweepConfig;
use isweep::observer::{CsvDirectoryObserver, NullObserver, SweepObserver};
use isweep::output;
use isweep::response::StandardAnalyzer;
use isweep::simulator::lumped::{LumpedDevice, LumpedSimulator, LumpedSplitter};
use isweep::stats::SweepStats;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::time::Instant;

/// Impedance spectroscopy sweep over a lumped photovoltaic device model
#[derive(Parser)]
#[command(name = "isweep", version)]
struct Cli {
    /// TOML run configuration
    config: String,

    /// Write the spectra CSV to this file instead of stdout
    #[arg(long, short)]
    output: Option<String>,

    /// Directory receiving solution and result CSVs requested by the config
    #[arg(long)]
    solutions_dir: Option<String>,

    /// Print performance stats to stderr
    #[arg(long)]
    stats: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut stats = if cli.stats { Some(SweepStats::new()) } else { None };

    let t = Instant::now();
    let config = SweepConfig::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", cli.config, e);
        std::process::exit(1);
    });
    let entries = config.entries();
    let options = config.options();
    if let Some(ref mut s) = stats {
        s.add_phase("Config", t.elapsed());
    }

    let observer: Box<dyn SweepObserver<LumpedDevice>> = match &cli.solutions_dir {
        Some(dir) => Box::new(CsvDirectoryObserver::new(dir).unwrap_or_else(|e| {
            eprintln!("Error creating {}: {}", dir, e);
            std::process::exit(1);
        })),
        None => Box::new(NullObserver),
    };

    let spectra = analysis::run(
        &entries,
        &options,
        &LumpedSimulator::default(),
        &StandardAnalyzer::default(),
        &LumpedSplitter,
        observer.as_ref(),
        stats.as_mut(),
    )
    .unwrap_or_else(|e| {
        eprintln!("Sweep error: {}", e);
        std::process::exit(1);
    });

    let written: isweep::error::Result<()> = match &cli.output {
        Some(path) => File::create(path).map_err(Into::into).and_then(|f| {
            let mut w = BufWriter::new(f);
            output::write_spectra_csv(&spectra, &mut w)?;
            w.flush()?;
            Ok(())
        }),
        None => output::write_spectra_csv(&spectra, &mut io::stdout()),
    };
    written.unwrap_or_else(|e| {
        eprintln!("Output error: {}", e);
        std::process::exit(1);
    });

    if let Some(ref stats) = stats {
        stats.display();
    }
}
