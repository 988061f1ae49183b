use std::path::{Path, PathBuf};

use nalgebra::DMatrix;

use super::reader::{read_data, ReadOptions};
use crate::analysis::area::area_under_peak;
use crate::analysis::calibration::{calibrate_two_peaks, Calibration};
use crate::analysis::fit::{fit_peaks, rms_error, PeakFitResult, PeakGuesses};
use crate::analysis::gaussian::{peaks_from_params, sum_of_gaussians, Peak};
use crate::error::{CalibrationError, SpectrumError};

// ---------------------------------------------------------------------------
// Reference peaks
// ---------------------------------------------------------------------------

/// Known lines used for calibration; the lists run in parallel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferencePeaks {
    pub kev: Option<Vec<f64>>,
    pub names: Option<Vec<String>>,
    /// First a guess, later the fitted centers.
    pub channel: Option<Vec<f64>>,
}

impl ReferencePeaks {
    /// Check that every list that is present has the same length.
    pub fn validate(&self) -> Result<(), SpectrumError> {
        let lengths: Vec<(&str, usize)> = [
            ("peaks_keV", self.kev.as_ref().map(Vec::len)),
            ("peaks_names", self.names.as_ref().map(Vec::len)),
            ("peaks_channel", self.channel.as_ref().map(Vec::len)),
        ]
        .into_iter()
        .filter_map(|(name, len)| len.map(|l| (name, l)))
        .collect();

        if lengths.windows(2).any(|w| w[0].1 != w[1].1) {
            let detail = lengths
                .iter()
                .map(|(name, len)| format!("{name}={len}"))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SpectrumError::PeakListMismatch(detail));
        }
        Ok(())
    }

    /// Name of peak `i`, if names were given.
    pub fn name(&self, i: usize) -> Option<&str> {
        self.names.as_ref()?.get(i).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Calibration and fit groups
// ---------------------------------------------------------------------------

/// A calibration applied to a spectrum, with the resulting energy axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedCalibration {
    pub calibration: Calibration,
    pub kev_calibrated: Vec<f64>,
}

/// A stored multi-gaussian fit.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakFit {
    pub params: Vec<f64>,
    pub covariance: DMatrix<f64>,
    /// Fitted curve evaluated on the channel axis.
    pub intensity_fit: Vec<f64>,
}

impl PeakFit {
    pub fn peaks(&self) -> Result<Vec<Peak>, SpectrumError> {
        Ok(peaks_from_params(&self.params)?)
    }
}

// ---------------------------------------------------------------------------
// Spectrum – one measured dataset
// ---------------------------------------------------------------------------

/// Where to read a spectrum from and what is known about it.
#[derive(Debug, Clone)]
pub struct SpectrumSource {
    pub name: String,
    pub filepath: PathBuf,
    pub read: ReadOptions,
    pub peaks: ReferencePeaks,
}

/// One dataset with its raw data, calibration and fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub(crate) name: String,
    pub(crate) filepath: PathBuf,
    pub(crate) channel: Vec<u32>,
    pub(crate) counts: Vec<f64>,
    pub(crate) intensity: Vec<f64>,
    pub peaks: ReferencePeaks,
    pub(crate) calibration: Option<AppliedCalibration>,
    pub(crate) fit: Option<PeakFit>,
    pub(crate) read_options: ReadOptions,
}

impl Spectrum {
    /// Read a spectrum from its source file.
    pub fn read(source: SpectrumSource) -> Result<Self, SpectrumError> {
        let raw = read_data(&source.filepath, &source.read)?;
        let spectrum = Self::from_counts(
            source.name,
            source.filepath,
            raw.counts,
            source.read,
            source.peaks,
        )?;
        log::info!(
            "'{}' read with {} channels",
            spectrum.name,
            spectrum.channel.len()
        );
        Ok(spectrum)
    }

    /// Read a new spectrum and give it the calibration of `known`.
    ///
    /// Both spectra must have the same number of channels.
    pub fn read_with_calibration(known: &Spectrum, source: SpectrumSource) -> Result<Self, SpectrumError> {
        let Some(applied) = known.calibration.clone() else {
            return Err(SpectrumError::NotCalibrated {
                name: known.name.clone(),
            });
        };
        log::info!(
            "Calibrating '{}' with '{}': dispersion = {}, offset = {}",
            source.name,
            known.name,
            applied.calibration.dispersion,
            applied.calibration.offset
        );

        let mut spectrum = Self::read(source)?;
        if spectrum.len() != known.len() {
            return Err(SpectrumError::ChannelCountMismatch {
                known: known.name.clone(),
                expected: known.len(),
                found: spectrum.len(),
            });
        }
        spectrum.calibration = Some(applied);
        Ok(spectrum)
    }

    /// Build a spectrum from counts already in memory.
    pub fn from_counts(
        name: String,
        filepath: PathBuf,
        counts: Vec<f64>,
        read_options: ReadOptions,
        peaks: ReferencePeaks,
    ) -> Result<Self, SpectrumError> {
        peaks.validate()?;
        let intensity = normalise(&counts)?;
        let channel = (0..counts.len() as u32).collect();

        Ok(Self {
            name,
            filepath,
            channel,
            counts,
            intensity,
            peaks,
            calibration: None,
            fit: None,
            read_options,
        })
    }

    // -- accessors --

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    pub fn channel(&self) -> &[u32] {
        &self.channel
    }

    /// Channel axis as floats, for fitting and plotting.
    pub fn channel_axis(&self) -> Vec<f64> {
        self.channel.iter().map(|&c| f64::from(c)).collect()
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    pub fn read_options(&self) -> &ReadOptions {
        &self.read_options
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref().map(|c| &c.calibration)
    }

    pub fn kev_calibrated(&self) -> Option<&[f64]> {
        self.calibration.as_ref().map(|c| c.kev_calibrated.as_slice())
    }

    pub fn fit(&self) -> Option<&PeakFit> {
        self.fit.as_ref()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    // -- analysis steps --

    /// Fit gaussians to the normalised intensity and store the result.
    pub fn fit_peaks(&mut self, guesses: &PeakGuesses) -> Result<&PeakFit, SpectrumError> {
        self.ensure_unset(self.fit.is_some(), "fit")?;

        let x = self.channel_axis();
        let PeakFitResult {
            params, covariance, ..
        } = fit_peaks(&x, &self.intensity, guesses)?;
        let intensity_fit = sum_of_gaussians(&x, &params)?;

        Ok(self.fit.insert(PeakFit {
            params,
            covariance,
            intensity_fit,
        }))
    }

    /// Replace the guessed peak channels with the fitted centers.
    pub fn refine_peak_channels(&mut self) -> Result<&[f64], SpectrumError> {
        let Some(fit) = &self.fit else {
            return Err(SpectrumError::Missing(self.name.clone(), "fit"));
        };
        let means: Vec<f64> = fit.peaks()?.iter().map(|p| p.mean).collect();

        if let Some(current) = &self.peaks.channel {
            if current.len() != means.len() {
                return Err(SpectrumError::PeakListMismatch(format!(
                    "peaks_channel={}, fitted peaks={}",
                    current.len(),
                    means.len()
                )));
            }
        }
        let refined = ReferencePeaks {
            channel: Some(means),
            ..self.peaks.clone()
        };
        refined.validate()?;
        self.peaks = refined;

        Ok(self.peaks.channel.as_deref().unwrap_or_default())
    }

    /// Calibrate from the first two `peaks_channel` / `peaks_keV` entries.
    pub fn calibrate(&mut self) -> Result<&Calibration, SpectrumError> {
        let channels = self
            .peaks
            .channel
            .as_deref()
            .ok_or_else(|| SpectrumError::Missing(self.name.clone(), "peaks_channel"))?;
        let energies = self
            .peaks
            .kev
            .as_deref()
            .ok_or_else(|| SpectrumError::Missing(self.name.clone(), "peaks_keV"))?;

        let calibration = calibrate_two_peaks(channels, energies)?;
        self.apply_calibration(calibration)
    }

    /// Store a calibration and the energy axis it produces.
    pub fn apply_calibration(&mut self, calibration: Calibration) -> Result<&Calibration, SpectrumError> {
        self.ensure_unset(self.calibration.is_some(), "calibration")?;
        let Calibration { dispersion, offset } = calibration;
        if !(dispersion.is_finite() && offset.is_finite()) || dispersion == 0.0 {
            return Err(CalibrationError::NonFinite.into());
        }

        let kev_calibrated = calibration.to_kev_all(&self.channel_axis(), true);
        let applied = self.calibration.insert(AppliedCalibration {
            calibration,
            kev_calibrated,
        });
        Ok(&applied.calibration)
    }

    /// Area of every fitted peak.
    ///
    /// Widths enter by magnitude since the fit leaves their sign free.
    pub fn peak_areas(&self) -> Result<Vec<f64>, SpectrumError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| SpectrumError::Missing(self.name.clone(), "fit"))?;
        fit.peaks()?
            .iter()
            .map(|p| area_under_peak(p.mean, p.std.abs(), p.amplitude).map_err(SpectrumError::from))
            .collect()
    }

    /// Root mean square difference between intensity and fitted curve.
    pub fn rms_error(&self) -> Result<f64, SpectrumError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| SpectrumError::Missing(self.name.clone(), "fit"))?;
        Ok(rms_error(&self.intensity, &fit.intensity_fit)?)
    }

    fn ensure_unset(&self, is_set: bool, what: &'static str) -> Result<(), SpectrumError> {
        if is_set {
            return Err(SpectrumError::AlreadySet {
                name: self.name.clone(),
                what,
            });
        }
        Ok(())
    }
}

/// `counts / max(counts)`.
fn normalise(counts: &[f64]) -> Result<Vec<f64>, SpectrumError> {
    if let Some(bad) = counts.iter().find(|c| !c.is_finite() || **c < 0.0) {
        return Err(SpectrumError::InvalidCounts(format!("found {bad}")));
    }
    let max = counts.iter().copied().fold(0.0, f64::max);
    if max <= 0.0 {
        return Err(SpectrumError::InvalidCounts(format!(
            "maximum of {} counts is {max}",
            counts.len()
        )));
    }
    Ok(counts.iter().map(|c| c / max).collect())
}
