use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::model::{AppliedCalibration, PeakFit, ReferencePeaks, Spectrum};
use super::reader::{DataLayout, ReadOptions, TextEncoding};
use crate::analysis::calibration::Calibration;
use crate::error::SpectrumError;

// ---------------------------------------------------------------------------
// Flat on-disk record
// ---------------------------------------------------------------------------

/// Flat form of a [`Spectrum`]: arrays and plain values only.
///
/// Unset groups are written as `null`. Field names are part of the file
/// format and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumRecord {
    pub name: String,
    pub filepath: PathBuf,
    pub channel: Vec<u32>,
    pub intensity: Vec<f64>,
    pub counts: Vec<f64>,
    #[serde(rename = "peaks_keV")]
    pub peaks_kev: Option<Vec<f64>>,
    pub peaks_names: Option<Vec<String>>,
    pub peaks_channel: Option<Vec<f64>>,
    pub dispersion: Option<f64>,
    pub offset: Option<f64>,
    pub kev_calibrated: Option<Vec<f64>>,
    pub fit_params: Option<Vec<f64>>,
    /// Row-major.
    pub fit_cov: Option<Vec<Vec<f64>>>,
    pub intensity_fit: Option<Vec<f64>>,
    pub start_str: String,
    pub stop_str: String,
    pub line_endings: Option<String>,
    pub delimiter: Option<String>,
    #[serde(default)]
    pub encoding: TextEncoding,
}

impl From<&Spectrum> for SpectrumRecord {
    fn from(s: &Spectrum) -> Self {
        let cal = s.calibration.as_ref();
        let fit = s.fit.as_ref();
        let options = &s.read_options;

        SpectrumRecord {
            name: s.name.clone(),
            filepath: s.filepath.clone(),
            channel: s.channel.clone(),
            intensity: s.intensity.clone(),
            counts: s.counts.clone(),
            peaks_kev: s.peaks.kev.clone(),
            peaks_names: s.peaks.names.clone(),
            peaks_channel: s.peaks.channel.clone(),
            dispersion: cal.map(|c| c.calibration.dispersion),
            offset: cal.map(|c| c.calibration.offset),
            kev_calibrated: cal.map(|c| c.kev_calibrated.clone()),
            fit_params: fit.map(|f| f.params.clone()),
            fit_cov: fit.map(|f| {
                f.covariance
                    .row_iter()
                    .map(|row| row.iter().copied().collect())
                    .collect()
            }),
            intensity_fit: fit.map(|f| f.intensity_fit.clone()),
            start_str: options.start_marker.clone(),
            stop_str: options.stop_marker.clone(),
            line_endings: options.line_endings.clone(),
            delimiter: options.layout.delimiter().map(str::to_string),
            encoding: options.encoding,
        }
    }
}

impl TryFrom<SpectrumRecord> for Spectrum {
    type Error = SpectrumError;

    fn try_from(r: SpectrumRecord) -> Result<Self, Self::Error> {
        let n = r.channel.len();
        check_len("counts", n, r.counts.len())?;
        check_len("intensity", n, r.intensity.len())?;

        let peaks = ReferencePeaks {
            kev: r.peaks_kev,
            names: r.peaks_names,
            channel: r.peaks_channel,
        };
        peaks.validate()?;

        let calibration = match (r.dispersion, r.offset, r.kev_calibrated) {
            (None, None, None) => None,
            (Some(dispersion), Some(offset), Some(kev_calibrated)) => {
                check_len("kev_calibrated", n, kev_calibrated.len())?;
                Some(AppliedCalibration {
                    calibration: Calibration { dispersion, offset },
                    kev_calibrated,
                })
            }
            _ => return Err(SpectrumError::Missing(r.name, "complete calibration")),
        };

        let fit = match (r.fit_params, r.fit_cov, r.intensity_fit) {
            (None, None, None) => None,
            (Some(params), Some(cov), Some(intensity_fit)) => {
                check_len("intensity_fit", n, intensity_fit.len())?;
                Some(PeakFit {
                    covariance: matrix_from_rows(&cov, params.len())?,
                    params,
                    intensity_fit,
                })
            }
            _ => return Err(SpectrumError::Missing(r.name, "complete fit")),
        };

        Ok(Spectrum {
            name: r.name,
            filepath: r.filepath,
            channel: r.channel,
            counts: r.counts,
            intensity: r.intensity,
            peaks,
            calibration,
            fit,
            read_options: ReadOptions {
                start_marker: r.start_str,
                stop_marker: r.stop_str,
                line_endings: r.line_endings,
                layout: DataLayout::from_delimiter(r.delimiter),
                encoding: r.encoding,
            },
        })
    }
}

fn check_len(field: &'static str, expected: usize, found: usize) -> Result<(), SpectrumError> {
    if expected != found {
        return Err(SpectrumError::FieldLength {
            field,
            expected,
            found,
        });
    }
    Ok(())
}

fn matrix_from_rows(rows: &[Vec<f64>], n: usize) -> Result<DMatrix<f64>, SpectrumError> {
    check_len("fit_cov", n, rows.len())?;
    for row in rows {
        check_len("fit_cov row", n, row.len())?;
    }
    Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
}

// ---------------------------------------------------------------------------
// JSON persistence
// ---------------------------------------------------------------------------

/// Path a spectrum is saved under: `<dir>/<file stem>_calibrated.json`.
pub fn saved_path(spectrum: &Spectrum, out_dir: &Path) -> PathBuf {
    let stem = spectrum
        .filepath()
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(spectrum.name());
    out_dir.join(format!("{stem}_calibrated.json"))
}

/// Write the spectrum as pretty JSON into `out_dir` and return the path.
pub fn save_spectrum_to_json(spectrum: &Spectrum, out_dir: &Path) -> Result<PathBuf, SpectrumError> {
    fs::create_dir_all(out_dir).map_err(|source| SpectrumError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;
    let path = saved_path(spectrum, out_dir);
    let json = serde_json::to_string_pretty(&SpectrumRecord::from(spectrum))?;
    fs::write(&path, json).map_err(|source| SpectrumError::Io {
        path: path.clone(),
        source,
    })?;

    log::info!("Saved the spectrum to: {}", path.display());
    Ok(path)
}

/// Read a spectrum written by [`save_spectrum_to_json`].
pub fn read_saved_spectrum_from_json(path: &Path) -> Result<Spectrum, SpectrumError> {
    let text = fs::read_to_string(path).map_err(|source| SpectrumError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let record: SpectrumRecord = serde_json::from_str(&text)?;
    let spectrum = Spectrum::try_from(record)?;

    log::info!("Read the spectrum from: {}", path.display());
    Ok(spectrum)
}

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CsvRow {
    channel: u32,
    counts: f64,
    intensity: f64,
    kev_calibrated: Option<f64>,
    intensity_fit: Option<f64>,
}

/// One row per channel; columns that are not computed yet stay empty.
pub fn export_csv(spectrum: &Spectrum, path: &Path) -> Result<(), SpectrumError> {
    let mut writer = csv::Writer::from_path(path)?;
    let kev = spectrum.kev_calibrated();
    let fit = spectrum.fit().map(|f| f.intensity_fit.as_slice());

    for i in 0..spectrum.len() {
        writer.serialize(CsvRow {
            channel: spectrum.channel()[i],
            counts: spectrum.counts()[i],
            intensity: spectrum.intensity()[i],
            kev_calibrated: kev.map(|k| k[i]),
            intensity_fit: fit.map(|f| f[i]),
        })?;
    }
    writer.flush().map_err(|source| SpectrumError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    log::info!("Exported {} rows to {}", spectrum.len(), path.display());
    Ok(())
}
