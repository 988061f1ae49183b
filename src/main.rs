use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rusty_peaks::config::AnalysisConfig;
use rusty_peaks::data::store::read_saved_spectrum_from_json;
use rusty_peaks::session::{run_analysis, run_with_known, write_figure};

/// Fit peaks and calibrate single-channel-analyzer spectra.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read, fit and calibrate the spectrum described by a configuration file.
    Analyze {
        config: PathBuf,
    },
    /// Read a spectrum using the calibration of a saved, calibrated one.
    Apply {
        /// A `*_calibrated.json` written by `analyze`.
        #[arg(long)]
        known: PathBuf,
        config: PathBuf,
    },
    /// Write the figure description of a saved spectrum.
    Figure {
        saved: PathBuf,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long, default_value_t = 2048)]
        stop: usize,
        /// Defaults to `<saved>_figure.json`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze { config } => {
            let config = AnalysisConfig::load(&config)
                .with_context(|| format!("loading configuration {}", config.display()))?;
            let (_, report) = run_analysis(&config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Apply { known, config } => {
            let config = AnalysisConfig::load(&config)
                .with_context(|| format!("loading configuration {}", config.display()))?;
            let (_, report) = run_with_known(&known, &config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Figure {
            saved,
            start,
            stop,
            output,
        } => {
            let spectrum = read_saved_spectrum_from_json(&saved)
                .with_context(|| format!("loading {}", saved.display()))?;
            let output = output.unwrap_or_else(|| {
                let stem = saved
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("spectrum");
                saved.with_file_name(format!("{stem}_figure.json"))
            });
            write_figure(&spectrum, &output, start, stop)?;
            println!("{}", output.display());
        }
    }
    Ok(())
}
