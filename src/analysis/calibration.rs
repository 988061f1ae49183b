use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// Linear channel → energy mapping, `E = (channel − offset) · dispersion`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// keV per channel.
    pub dispersion: f64,
    /// Channel that corresponds to 0 keV.
    pub offset: f64,
}

impl Calibration {
    /// Absolute position (`use_offset = true`) or width (`false`) in keV.
    pub fn to_kev(&self, channel: f64, use_offset: bool) -> f64 {
        channel_to_kev(channel, self.dispersion, self.offset, use_offset)
    }

    pub fn to_kev_all(&self, channels: &[f64], use_offset: bool) -> Vec<f64> {
        channels_to_kev(channels, self.dispersion, self.offset, use_offset)
    }
}

/// Derive dispersion and offset from the first two reference peaks.
///
/// Extra peaks beyond the first two are ignored.
pub fn calibrate_two_peaks(
    peak_channels: &[f64],
    peak_energies_kev: &[f64],
) -> Result<Calibration, CalibrationError> {
    if peak_channels.len() != peak_energies_kev.len() {
        return Err(CalibrationError::LengthMismatch {
            channels: peak_channels.len(),
            energies: peak_energies_kev.len(),
        });
    }
    let (&[c0, c1, ..], &[e0, e1, ..]) = (peak_channels, peak_energies_kev) else {
        return Err(CalibrationError::TooFewPeaks {
            found: peak_channels.len(),
        });
    };
    if peak_channels.len() > 2 {
        log::warn!(
            "{} reference peaks given, calibrating with the first two only",
            peak_channels.len()
        );
    }
    if ![c0, c1, e0, e1].iter().all(|v| v.is_finite()) {
        return Err(CalibrationError::NonFinite);
    }
    if c1 == c0 {
        return Err(CalibrationError::IdenticalChannels(c0));
    }
    if e1 == e0 {
        return Err(CalibrationError::IdenticalEnergies(e0));
    }

    let dispersion = (e1 - e0) / (c1 - c0);
    let offset = c0 - e0 / dispersion;

    log::info!(
        "The calibration factor is: {dispersion:.7} keV/channel, with {offset:.3} channels zero offset"
    );

    Ok(Calibration { dispersion, offset })
}

/// `(value − offset) · dispersion`, or `value · dispersion` for widths.
#[inline]
pub fn channel_to_kev(value: f64, dispersion: f64, offset: f64, use_offset: bool) -> f64 {
    let shift = if use_offset { offset } else { 0.0 };
    (value - shift) * dispersion
}

pub fn channels_to_kev(values: &[f64], dispersion: f64, offset: f64, use_offset: bool) -> Vec<f64> {
    values
        .iter()
        .map(|&v| channel_to_kev(v, dispersion, offset, use_offset))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_known_lines() {
        let cal = calibrate_two_peaks(&[2.0, 6.0], &[10.0, 30.0]).unwrap();
        assert_eq!(cal.dispersion, 5.0);
        assert_eq!(cal.offset, 0.0);
    }

    #[test]
    fn round_trip_recovers_mapping() {
        let (dispersion, offset) = (0.010_27, 13.4);
        let energies = [5.899, 17.479];
        let channels: Vec<f64> = energies.iter().map(|e| e / dispersion + offset).collect();

        let cal = calibrate_two_peaks(&channels, &energies).unwrap();
        assert!((cal.dispersion - dispersion).abs() < 1e-12);
        assert!((cal.offset - offset).abs() < 1e-9);

        for (c, e) in channels.iter().zip(energies) {
            assert!((cal.to_kev(*c, true) - e).abs() < 1e-9);
        }
    }

    #[test]
    fn widths_ignore_offset() {
        let cal = Calibration {
            dispersion: 0.02,
            offset: 40.0,
        };
        let widths = [1.0, 2.0, 7.5];
        let kev = cal.to_kev_all(&widths, false);
        for (w, k) in widths.iter().zip(&kev) {
            assert!((k / w - 0.02).abs() < 1e-15);
        }
        assert_eq!(cal.to_kev(40.0, true), 0.0);
    }

    #[test]
    fn degenerate_references_are_rejected() {
        assert_eq!(
            calibrate_two_peaks(&[4.0, 4.0], &[1.0, 2.0]),
            Err(CalibrationError::IdenticalChannels(4.0))
        );
        assert_eq!(
            calibrate_two_peaks(&[4.0, 9.0], &[2.0, 2.0]),
            Err(CalibrationError::IdenticalEnergies(2.0))
        );
        assert_eq!(
            calibrate_two_peaks(&[4.0], &[1.0]),
            Err(CalibrationError::TooFewPeaks { found: 1 })
        );
        assert_eq!(
            calibrate_two_peaks(&[4.0, 5.0], &[1.0]),
            Err(CalibrationError::LengthMismatch {
                channels: 2,
                energies: 1
            })
        );
        assert_eq!(
            calibrate_two_peaks(&[4.0, f64::NAN], &[1.0, 2.0]),
            Err(CalibrationError::NonFinite)
        );
    }

    #[test]
    fn extra_peaks_use_first_two() {
        let cal = calibrate_two_peaks(&[2.0, 6.0, 100.0], &[10.0, 30.0, 1.0]).unwrap();
        assert_eq!(cal.dispersion, 5.0);
    }
}
