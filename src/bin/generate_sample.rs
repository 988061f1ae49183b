use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::Normal;

use rusty_peaks::analysis::gaussian::Peak;

/// Write a synthetic MCA export and a matching analysis configuration.
#[derive(Parser)]
struct Args {
    /// Directory for `sample.mca` and `sample.json`.
    #[arg(long, default_value = "sample")]
    output: PathBuf,
    #[arg(long, default_value_t = 2048)]
    channels: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    // Am-241 like: Np L-alpha and the 59.5 keV gamma line at ~10 eV per channel.
    let n = args.channels as f64;
    let lines = [
        (Peak::new(900.0, 0.068 * n, 6.0)?, 13.95, "Np L-alpha"),
        (Peak::new(400.0, 0.29 * n, 12.0)?, 59.54, "Am-241 gamma"),
    ];

    let mut text = String::from("<<PMCA SPECTRUM>>\r\nTAG - live_data\r\n<<DATA>>\r\n");
    for channel in 0..args.channels {
        let c = channel as f64;
        let signal: f64 = lines.iter().map(|(p, _, _)| p.value_at(c)).sum::<f64>() + 5.0;
        // Poisson-like counting noise.
        let noise = Normal::new(0.0, signal.sqrt())?.sample(&mut rng);
        let counts = (signal + noise).round().max(0.0);
        writeln!(text, "{counts}\r").context("formatting counts")?;
    }
    text.push_str("<<END>>\r\n");

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mca = args.output.join("sample.mca");
    std::fs::write(&mca, text).with_context(|| format!("writing {}", mca.display()))?;

    let config = serde_json::json!({
        "name": "Am-241 sample",
        "filepath": "sample.mca",
        "start_str": "<<DATA>>",
        "stop_str": "<<END>>",
        "peaks_keV": lines.iter().map(|(_, kev, _)| kev).collect::<Vec<_>>(),
        "peaks_names": lines.iter().map(|(_, _, name)| name).collect::<Vec<_>>(),
        "peaks_channel": lines.iter().map(|(p, _, _)| p.mean.round()).collect::<Vec<_>>(),
        "guessed_std": 8,
        "export_csv": true,
        "export_figure": true
    });
    let json = args.output.join("sample.json");
    std::fs::write(&json, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("writing {}", json.display()))?;

    println!("Generated {} channels: {}", args.channels, mca.display());
    println!("Configuration: {}", json.display());
    Ok(())
}
