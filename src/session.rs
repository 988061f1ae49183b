use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::data::model::Spectrum;
use crate::data::store::{export_csv, read_saved_spectrum_from_json, save_spectrum_to_json};
use crate::figure::figure_for_spectrum;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One fitted peak, in channels and (when calibrated) in keV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakReport {
    pub name: Option<String>,
    pub expected_kev: Option<f64>,
    pub channel: f64,
    pub std_channel: f64,
    pub kev: Option<f64>,
    pub std_kev: Option<f64>,
    pub amplitude: f64,
    pub area: f64,
}

/// Summary of one analysed spectrum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub name: String,
    pub channels: usize,
    pub dispersion: Option<f64>,
    pub offset: Option<f64>,
    pub rms_error: Option<f64>,
    pub peaks: Vec<PeakReport>,
    pub saved_to: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure: Option<PathBuf>,
}

impl AnalysisReport {
    fn from_spectrum(spectrum: &Spectrum, saved_to: PathBuf) -> Result<Self> {
        let cal = spectrum.calibration();
        let mut peaks = Vec::new();
        let mut rms_error = None;

        if let Some(fit) = spectrum.fit() {
            let areas = spectrum.peak_areas()?;
            for (i, (peak, area)) in fit.peaks()?.into_iter().zip(areas).enumerate() {
                let std = peak.std.abs();
                peaks.push(PeakReport {
                    name: spectrum.peaks.name(i).map(str::to_string),
                    expected_kev: spectrum.peaks.kev.as_ref().and_then(|k| k.get(i).copied()),
                    channel: peak.mean,
                    std_channel: std,
                    kev: cal.map(|c| c.to_kev(peak.mean, true)),
                    std_kev: cal.map(|c| c.to_kev(std, false).abs()),
                    amplitude: peak.amplitude,
                    area,
                });
            }
            rms_error = Some(spectrum.rms_error()?);
        }

        Ok(Self {
            name: spectrum.name().to_string(),
            channels: spectrum.len(),
            dispersion: cal.map(|c| c.dispersion),
            offset: cal.map(|c| c.offset),
            rms_error,
            peaks,
            saved_to,
            csv: None,
            figure: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// Read, fit, refine the peak channels, calibrate and save one spectrum.
///
/// Without `peaks_channel` the spectrum is only read and saved; without
/// `peaks_keV` it is fitted but not calibrated.
pub fn run_analysis(config: &AnalysisConfig) -> Result<(Spectrum, AnalysisReport)> {
    let mut spectrum = Spectrum::read(config.source())
        .with_context(|| format!("reading '{}' from {}", config.name, config.filepath.display()))?;

    if let Some(guesses) = config.guesses() {
        spectrum
            .fit_peaks(&guesses)
            .with_context(|| format!("fitting peaks of '{}'", config.name))?;
        spectrum.refine_peak_channels()?;

        if spectrum.peaks.kev.is_some() {
            spectrum
                .calibrate()
                .with_context(|| format!("calibrating '{}'", config.name))?;
        } else {
            log::info!("'{}' has no reference energies, skipping calibration", config.name);
        }
    } else {
        log::info!("'{}' has no peak guesses, skipping the fit", config.name);
    }

    finish(spectrum, config)
}

/// Read a spectrum with the calibration of a previously saved one.
pub fn run_with_known(known_path: &Path, config: &AnalysisConfig) -> Result<(Spectrum, AnalysisReport)> {
    let known = read_saved_spectrum_from_json(known_path)
        .with_context(|| format!("loading calibrated spectrum {}", known_path.display()))?;
    let mut spectrum = Spectrum::read_with_calibration(&known, config.source())
        .with_context(|| format!("reading '{}' with the calibration of '{}'", config.name, known.name()))?;

    if let Some(guesses) = config.guesses() {
        spectrum
            .fit_peaks(&guesses)
            .with_context(|| format!("fitting peaks of '{}'", config.name))?;
        spectrum.refine_peak_channels()?;
    }

    finish(spectrum, config)
}

fn finish(spectrum: Spectrum, config: &AnalysisConfig) -> Result<(Spectrum, AnalysisReport)> {
    let saved_to = save_spectrum_to_json(&spectrum, &config.output_dir)?;
    let mut report = AnalysisReport::from_spectrum(&spectrum, saved_to.clone())?;

    if config.export_csv {
        let path = saved_to.with_extension("csv");
        export_csv(&spectrum, &path)?;
        report.csv = Some(path);
    }
    if config.export_figure {
        let path = saved_to.with_file_name(format!(
            "{}_figure.json",
            saved_to
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("spectrum")
        ));
        write_figure(&spectrum, &path, 0, usize::MAX)?;
        report.figure = Some(path);
    }

    Ok((spectrum, report))
}

/// Write the figure description of a spectrum as JSON.
pub fn write_figure(spectrum: &Spectrum, path: &Path, start: usize, stop: usize) -> Result<()> {
    let figure = figure_for_spectrum(spectrum, start, stop)?;
    let json = serde_json::to_string_pretty(&figure)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    log::info!("Wrote figure with {} traces to {}", figure.traces.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fit::InitialGuess;
    use crate::data::reader::TextEncoding;
    use std::fs;
    use tempfile::tempdir;

    /// A synthetic MCA export with lines at channels 30 and 70.
    fn write_mca(dir: &Path, name: &str) -> PathBuf {
        let body: String = (0..100)
            .map(|c| {
                let c = c as f64;
                let line = |mu: f64, amp: f64, s: f64| amp * (-(c - mu).powi(2) / (2.0 * s * s)).exp();
                format!("{}\r\n", (line(30.0, 800.0, 3.0) + line(70.0, 300.0, 4.0)).round())
            })
            .collect();
        let path = dir.join(name);
        fs::write(
            &path,
            format!("<<PMCA SPECTRUM>>\r\nTAG - live_data\r\n<<DATA>>\r\n{body}<<END>>\r\n"),
        )
        .unwrap();
        path
    }

    fn config(dir: &Path, file: &Path) -> AnalysisConfig {
        AnalysisConfig {
            name: "reference".into(),
            filepath: file.to_path_buf(),
            start_str: "<<DATA>>".into(),
            stop_str: "<<END>>".into(),
            line_endings: None,
            delimiter: None,
            encoding: TextEncoding::Windows1252,
            peaks_kev: Some(vec![6.0, 14.0]),
            peaks_names: Some(vec!["low".into(), "high".into()]),
            peaks_channel: Some(vec![31.0, 68.0]),
            guessed_std: InitialGuess::Scalar(2.0),
            guessed_amp: InitialGuess::default(),
            output_dir: dir.join("out"),
            export_csv: true,
            export_figure: true,
        }
    }

    #[test]
    fn full_analysis_calibrates_and_saves() {
        let dir = tempdir().unwrap();
        let file = write_mca(dir.path(), "ref.mca");
        let (spectrum, report) = run_analysis(&config(dir.path(), &file)).unwrap();

        // 8 keV over 40 channels, zero energy at channel 0.
        let dispersion = report.dispersion.unwrap();
        assert!((dispersion - 0.2).abs() < 1e-3, "{report:?}");
        assert!(report.offset.unwrap().abs() < 0.1, "{report:?}");

        assert_eq!(report.peaks.len(), 2);
        assert_eq!(report.peaks[0].name.as_deref(), Some("low"));
        assert!((report.peaks[1].kev.unwrap() - 14.0).abs() < 1e-9);
        assert!((report.peaks[1].std_kev.unwrap() - 4.0 * dispersion).abs() < 0.01);

        assert!(report.saved_to.exists());
        assert!(report.csv.as_ref().unwrap().exists());
        assert!(report.figure.as_ref().unwrap().exists());

        let reloaded = read_saved_spectrum_from_json(&report.saved_to).unwrap();
        assert_eq!(reloaded, spectrum);
    }

    #[test]
    fn unknown_spectrum_reuses_saved_calibration() {
        let dir = tempdir().unwrap();
        let reference = write_mca(dir.path(), "ref.mca");
        let (_, report) = run_analysis(&config(dir.path(), &reference)).unwrap();

        let sample = write_mca(dir.path(), "sample.mca");
        let mut sample_config = config(dir.path(), &sample);
        sample_config.name = "sample".into();
        sample_config.peaks_kev = None;
        sample_config.peaks_names = None;

        let (spectrum, sample_report) = run_with_known(&report.saved_to, &sample_config).unwrap();
        assert_eq!(sample_report.dispersion, report.dispersion);
        assert!(spectrum.fit().is_some());
        assert!(sample_report.peaks[0].kev.is_some());
    }

    #[test]
    fn read_only_config_skips_fit() {
        let dir = tempdir().unwrap();
        let file = write_mca(dir.path(), "plain.mca");
        let mut cfg = config(dir.path(), &file);
        cfg.peaks_channel = None;
        cfg.peaks_kev = None;
        cfg.peaks_names = None;
        cfg.export_figure = false;

        let (spectrum, report) = run_analysis(&cfg).unwrap();
        assert!(spectrum.fit().is_none());
        assert!(report.peaks.is_empty());
        assert_eq!(report.channels, 100);
        assert!(report.figure.is_none());
    }

    #[test]
    fn bad_markers_surface_as_error() {
        let dir = tempdir().unwrap();
        let file = write_mca(dir.path(), "ref.mca");
        let mut cfg = config(dir.path(), &file);
        cfg.stop_str = "<<STOP>>".into();

        let err = run_analysis(&cfg).unwrap_err();
        assert!(format!("{err:#}").contains("<<STOP>>"));
    }
}
